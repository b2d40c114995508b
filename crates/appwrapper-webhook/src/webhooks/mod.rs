use async_trait::async_trait;
use axum::Router;
use k8s_openapi::{
    ByteString,
    api::admissionregistration::v1::{ServiceReference, WebhookClientConfig},
};
pub use mutating_webhook::{MutatingWebhook, MutatingWebhookError, MutatingWebhookOptions};
use snafu::Snafu;
pub use validating_webhook::{ValidatingWebhook, ValidatingWebhookError};

use crate::WebhookServerOptions;

mod mutating_webhook;
mod validating_webhook;

#[derive(Snafu, Debug)]
pub enum WebhookError {
    #[snafu(display("mutating webhook error"), context(false))]
    MutatingWebhookError {
        source: mutating_webhook::MutatingWebhookError,
    },

    #[snafu(display("validating webhook error"), context(false))]
    ValidatingWebhookError {
        source: validating_webhook::ValidatingWebhookError,
    },
}

/// A webhook (such as a mutating or validating admission webhook) needs to implement this trait.
//
// We still need to use the async-trait crate, as dynamic dispatch is needed to run a
// heterogeneous list of webhooks inside [`crate::WebhookServer`].
#[async_trait]
pub trait Webhook: Send + Sync {
    /// The webhook can add arbitrary routes to the passed [`Router`] and needs to return the
    /// resulting [`Router`].
    fn register_routes(&self, router: Router) -> Router;

    /// Whether [`Self::handle_certificate_rotation`] should be called or not.
    fn ignore_certificate_rotation(&self) -> bool;

    /// The HTTPS server periodically rotates its certificate.
    ///
    /// Kubernetes needs to know the CA bundle to trust when calling the webhook, so each webhook
    /// gets a chance to patch its own `*WebhookConfiguration` whenever a new certificate has been
    /// generated.
    async fn handle_certificate_rotation(
        &mut self,
        ca_bundle: &ByteString,
        options: &WebhookServerOptions,
    ) -> Result<(), WebhookError>;
}

/// Returns the client config that can be used in admission webhook configurations.
///
/// It is used to contact the correct HTTP endpoint, which is determined from the given
/// parameters.
pub(crate) fn create_webhook_client_config(
    options: &WebhookServerOptions,
    ca_bundle: ByteString,
    http_path: impl Into<String>,
) -> WebhookClientConfig {
    WebhookClientConfig {
        service: Some(ServiceReference {
            name: options.webhook_service_name.to_owned(),
            namespace: options.webhook_namespace.to_owned(),
            path: Some(http_path.into()),
            port: Some(options.socket_addr.port().into()),
        }),
        // `ByteString` takes care of encoding the provided content as base64.
        ca_bundle: Some(ca_bundle),
        url: None,
    }
}
