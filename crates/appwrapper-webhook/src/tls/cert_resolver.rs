use std::sync::Arc;

use appwrapper_certs::{CertificatePairError, ca::CertificateAuthority, keys::ecdsa};
use arc_swap::ArcSwap;
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::sync::mpsc;
use tokio_rustls::rustls::{
    crypto::CryptoProvider, server::ResolvesServerCert, sign::CertifiedKey,
};
use x509_cert::Certificate;

use super::{WEBHOOK_CA_LIFETIME, WEBHOOK_CERTIFICATE_LIFETIME};

type Result<T, E = CertificateResolverError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum CertificateResolverError {
    #[snafu(display("failed send certificate to channel"))]
    SendCertificateToChannel,

    #[snafu(display("failed to create CA to sign the webhook leaf certificate"))]
    CreateCertificateAuthority {
        source: appwrapper_certs::ca::CreateCertificateAuthorityError<ecdsa::Error>,
    },

    #[snafu(display("failed to generate webhook leaf certificate"))]
    GenerateLeafCertificate {
        source: appwrapper_certs::cert_builder::CreateCertificateError<ecdsa::Error>,
    },

    #[snafu(display("failed to encode leaf certificate as DER"))]
    EncodeCertificateDer {
        source: CertificatePairError<ecdsa::Error>,
    },

    #[snafu(display("failed to encode private key as DER"))]
    EncodePrivateKeyDer {
        source: CertificatePairError<ecdsa::Error>,
    },

    #[snafu(display("failed to create packaged certificate chain from DER"))]
    DecodeCertifiedKeyFromDer { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to run task in blocking thread"))]
    TokioSpawnBlocking { source: tokio::task::JoinError },

    #[snafu(display("no default rustls CryptoProvider installed"))]
    NoDefaultCryptoProviderInstalled,
}

/// This struct serves as [`ResolvesServerCert`] to always hand out the current certificate for TLS
/// client connections.
///
/// It offers the [`Self::rotate_certificate`] function to create a fresh certificate and basically
/// hot-reload the certificate in the running webhook.
#[derive(Debug)]
pub struct CertificateResolver {
    /// Using a [`ArcSwap`] (over e.g. [`tokio::sync::RwLock`]), so that we can easily
    /// (and performant) bridge between async write and sync read.
    current_certified_key: ArcSwap<CertifiedKey>,
    subject_alterative_dns_names: Arc<Vec<String>>,

    certificate_tx: mpsc::Sender<Certificate>,
}

impl CertificateResolver {
    pub async fn new(
        subject_alterative_dns_names: Vec<String>,
        certificate_tx: mpsc::Sender<Certificate>,
    ) -> Result<Self> {
        let subject_alterative_dns_names = Arc::new(subject_alterative_dns_names);
        let certified_key = Self::generate_new_certificate_inner(
            subject_alterative_dns_names.clone(),
            &certificate_tx,
        )
        .await?;

        Ok(Self {
            subject_alterative_dns_names,
            current_certified_key: ArcSwap::new(certified_key),
            certificate_tx,
        })
    }

    pub async fn rotate_certificate(&self) -> Result<()> {
        let certified_key = self.generate_new_certificate().await?;
        self.current_certified_key.store(certified_key);

        Ok(())
    }

    async fn generate_new_certificate(&self) -> Result<Arc<CertifiedKey>> {
        let subject_alterative_dns_names = self.subject_alterative_dns_names.clone();
        Self::generate_new_certificate_inner(subject_alterative_dns_names, &self.certificate_tx)
            .await
    }

    /// Creates a new self-signed CA and a leaf certificate signed by it, then hands the leaf
    /// certificate out over `cert_tx` so the certificate resolver's CA bundle patching task can
    /// keep downstream `ValidatingWebhookConfiguration`/`MutatingWebhookConfiguration` CA bundles
    /// in sync.
    async fn generate_new_certificate_inner(
        subject_alterative_dns_names: Arc<Vec<String>>,
        certificate_tx: &mpsc::Sender<Certificate>,
    ) -> Result<Arc<CertifiedKey>> {
        // The certificate generation can take a while, so we use `spawn_blocking`
        let (cert, certified_key) = tokio::task::spawn_blocking(move || {
            let tls_provider =
                CryptoProvider::get_default().context(NoDefaultCryptoProviderInstalledSnafu)?;

            let ca = CertificateAuthority::builder_with_ecdsa()
                .validity(WEBHOOK_CA_LIFETIME)
                .build()
                .context(CreateCertificateAuthoritySnafu)?;

            let sans: Vec<&str> = subject_alterative_dns_names
                .iter()
                .map(String::as_str)
                .collect();

            let certificate_pair = appwrapper_certs::cert_builder::CertificateBuilder::builder()
                .subject("CN=webhook")
                .subject_alterative_dns_names(&sans)
                .validity(WEBHOOK_CERTIFICATE_LIFETIME)
                .signed_by(&ca)
                .build()
                .build_certificate()
                .context(GenerateLeafCertificateSnafu)?;

            let certificate_der = certificate_pair
                .certificate_der()
                .context(EncodeCertificateDerSnafu)?;
            let private_key_der = certificate_pair
                .private_key_der()
                .context(EncodePrivateKeyDerSnafu)?;
            let certificate_key =
                CertifiedKey::from_der(vec![certificate_der], private_key_der, tls_provider)
                    .context(DecodeCertifiedKeyFromDerSnafu)?;

            // The CA cert (not the leaf) is what Kubernetes needs to trust the webhook's TLS
            // connection, so that's what is handed out over `certificate_tx`.
            Ok((ca.ca_cert().clone(), Arc::new(certificate_key)))
        })
        .await
        .context(TokioSpawnBlockingSnafu)??;

        certificate_tx
            .send(cert)
            .await
            .map_err(|_err| CertificateResolverError::SendCertificateToChannel)?;

        Ok(certified_key)
    }
}

impl ResolvesServerCert for CertificateResolver {
    fn resolve(
        &self,
        _client_hello: tokio_rustls::rustls::server::ClientHello<'_>,
    ) -> Option<Arc<tokio_rustls::rustls::sign::CertifiedKey>> {
        Some(self.current_certified_key.load().clone())
    }
}
