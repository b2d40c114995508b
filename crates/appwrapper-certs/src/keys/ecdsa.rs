//! Abstraction layer around the [`ecdsa`]/[`p256`] crates. This module provides types which
//! abstract away the generation of ECDSA keys (NIST P-256) used for signing of CAs and other
//! certificates.
use p256::NistP256;
use rand_core::{CryptoRngCore, OsRng};
use signature::Keypair;
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::keys::CertificateKeypair;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("failed to deserialize the signing (private) key from PEM-encoded PKCS8"))]
    DeserializeSigningKey { source: p256::pkcs8::Error },
}

#[derive(Debug)]
pub struct SigningKey(::ecdsa::SigningKey<NistP256>);

impl CertificateKeypair for SigningKey {
    type Error = Error;
    type Signature = ::ecdsa::Signature<NistP256>;
    type SigningKey = ::ecdsa::SigningKey<NistP256>;
    type VerifyingKey = ::ecdsa::VerifyingKey<NistP256>;

    /// Generates a new ECDSA key with the default random-number generator [`OsRng`].
    #[instrument(name = "create_ecdsa_signing_key")]
    fn new() -> Result<Self> {
        let mut csprng = OsRng;
        Self::new_with_rng(&mut csprng)
    }

    /// Generates a new ECDSA key with a custom random-number generator.
    #[instrument(name = "create_ecdsa_signing_key_custom_rng", skip_all)]
    fn new_with_rng<Rng>(rng: &mut Rng) -> Result<Self>
    where
        Rng: CryptoRngCore + ?Sized,
    {
        let signing_key = ::ecdsa::SigningKey::<NistP256>::random(rng);
        Ok(Self(signing_key))
    }

    fn signing_key(&self) -> &Self::SigningKey {
        &self.0
    }

    fn verifying_key(&self) -> Self::VerifyingKey {
        *self.0.verifying_key()
    }

    #[instrument(name = "create_ecdsa_signing_key_from_pkcs8_pem")]
    fn from_pkcs8_pem(input: &str) -> Result<Self, Self::Error> {
        use p256::pkcs8::DecodePrivateKey;

        let signing_key =
            ::ecdsa::SigningKey::<NistP256>::from_pkcs8_pem(input).context(DeserializeSigningKeySnafu)?;
        Ok(Self(signing_key))
    }

    fn algorithm_name() -> &'static str {
        "ECDSA (P-256)"
    }

    fn key_size() -> usize {
        256
    }
}
