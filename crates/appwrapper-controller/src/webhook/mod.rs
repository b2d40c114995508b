//! Admission webhook handlers for `AppWrapper`: defaulting on create, and structural,
//! semantic and authorization validation on create and update.
//!
//! These are plain async functions matching the `Fn(Arc<S>, AdmissionRequest<R>) ->
//! AdmissionResponse` shape `appwrapper-webhook`'s `MutatingWebhook` and `ValidatingWebhook`
//! expect; `cmd/operator` wires them up alongside the webhook configurations built in
//! [`configuration`].

pub mod configuration;
pub mod defaulting;
pub mod validation;

use crate::client::Client;

/// State shared by both handlers.
pub struct Context {
    pub client: Client,
}
