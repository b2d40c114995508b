//! Utility types and functions to easily create ready-to-use admission webhook servers. All
//! webhook servers use HTTPS by default and take care of generating and rotating a self-signed
//! TLS certificate, as well as keeping the `caBundle` of the registered
//! `MutatingWebhookConfiguration`/`ValidatingWebhookConfiguration` objects in sync with it.
//!
//! Most users will only use the top-level exported generic [`WebhookServer`], which takes a list
//! of [`Webhook`][webhooks::Webhook] trait objects and combines them into a single HTTPS server.
//!
//! ```
//! use appwrapper_webhook::WebhookServerOptions;
//!
//! let options = WebhookServerOptions::builder()
//!     .bind_address([0, 0, 0, 0], 8443)
//!     .webhook_service_name("appwrapper-webhook")
//!     .webhook_namespace("appwrapper-system")
//!     .build();
//! ```
//!
//! This library is fully compatible with the [`tracing`] crate and emits debug level tracing
//! data.
use axum::{Router, routing::get};
use futures_util::{FutureExt as _, pin_mut, select};
use k8s_openapi::ByteString;
use snafu::{ResultExt, Snafu};
use tokio::signal::unix::{SignalKind, signal};

use crate::{
    tls::TlsServer,
    webhooks::{Webhook, WebhookError},
};

pub mod constants;
pub mod options;
pub mod tls;
pub mod webhooks;

// Selected re-exports
pub use crate::options::{WebhookServerOptions, WebhookServerOptionsBuilder};

/// A result type alias with the [`WebhookServerError`] type as the default error type.
pub type Result<T, E = WebhookServerError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum WebhookServerError {
    #[snafu(display("failed to create TLS server"))]
    CreateTlsServer { source: tls::TlsServerError },

    #[snafu(display("failed to run TLS server"))]
    RunTlsServer { source: tls::TlsServerError },

    #[snafu(display("failed to reconcile webhook configuration after certificate rotation"))]
    HandleCertificateRotation { source: WebhookError },
}

/// A ready-to-use webhook server.
///
/// This server abstracts away lower-level details like TLS termination, certificate generation
/// and rotation, and keeping the `caBundle` of the registered webhook configuration objects up to
/// date. Routes and their handlers are contributed by the list of [`Webhook`]s passed to
/// [`WebhookServer::new`].
pub struct WebhookServer {
    tls_server: TlsServer,
    webhooks: Vec<Box<dyn Webhook>>,
    cert_rx: tokio::sync::mpsc::Receiver<x509_cert::Certificate>,
}

impl WebhookServer {
    /// Creates a new ready-to-use webhook server from a list of [`Webhook`]s.
    ///
    /// The server listens on `options.socket_addr` and registers the routes of every webhook in
    /// `webhooks` into a single Axum [`Router`]. To start the server, use
    /// [`WebhookServer::run()`].
    pub async fn new(webhooks: Vec<Box<dyn Webhook>>, options: WebhookServerOptions) -> Result<Self> {
        tracing::trace!("create new webhook server");

        let mut router = Router::new().route("/health", get(|| async { "ok" }));
        for webhook in &webhooks {
            router = webhook.register_routes(router);
        }

        tracing::debug!("create TLS server");
        let (tls_server, cert_rx) = TlsServer::new(
            options.socket_addr,
            router,
            options.subject_alterative_dns_names.clone(),
        )
        .await
        .context(CreateTlsServerSnafu)?;

        Ok(Self {
            tls_server,
            webhooks,
            cert_rx,
        })
    }

    /// Runs the webhook server and sets up signal handlers for shutting down.
    ///
    /// This does not implement graceful shutdown of the underlying server.
    pub async fn run(self, options: WebhookServerOptions) -> Result<()> {
        let Self {
            tls_server,
            mut webhooks,
            mut cert_rx,
        } = self;

        let reconcile_ca_bundle = async move {
            while let Some(ca_cert) = cert_rx.recv().await {
                let ca_bundle = match der_encode_ca_bundle(&ca_cert) {
                    Ok(ca_bundle) => ca_bundle,
                    Err(error) => {
                        tracing::error!(%error, "failed to DER-encode rotated CA certificate");
                        continue;
                    }
                };

                for webhook in webhooks.iter_mut() {
                    if webhook.ignore_certificate_rotation() {
                        continue;
                    }

                    if let Err(error) = webhook
                        .handle_certificate_rotation(&ca_bundle, &options)
                        .await
                    {
                        tracing::error!(%error, "failed to reconcile webhook configuration after certificate rotation");
                    }
                }
            }
        };

        let future_server = tls_server.run();
        let future_signal = async {
            let mut sigint = signal(SignalKind::interrupt()).expect("create SIGINT listener");
            let mut sigterm = signal(SignalKind::terminate()).expect("create SIGTERM listener");

            tracing::debug!("created unix signal handlers");

            select! {
                signal = sigint.recv().fuse() => {
                    if signal.is_some() {
                        tracing::debug!("received SIGINT");
                    }
                },
                signal = sigterm.recv().fuse() => {
                    if signal.is_some() {
                        tracing::debug!("received SIGTERM");
                    }
                },
            };
        };

        pin_mut!(future_server);
        pin_mut!(future_signal);
        pin_mut!(reconcile_ca_bundle);

        futures_util::select! {
            result = future_server => result.context(RunTlsServerSnafu)?,
            _ = future_signal => {},
            _ = reconcile_ca_bundle => {},
        };

        Ok(())
    }
}

fn der_encode_ca_bundle(
    ca_cert: &x509_cert::Certificate,
) -> std::result::Result<ByteString, x509_cert::der::Error> {
    use x509_cert::der::Encode;

    Ok(ByteString(ca_cert.to_der()?))
}
