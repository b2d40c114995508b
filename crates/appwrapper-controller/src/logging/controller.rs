//! Facilities for reporting controller reconcile outcomes: a structured log line plus, for
//! reconcile failures, a Kubernetes [`Event`] on the offending object.
//!
//! [`Event`]: k8s_openapi::api::core::v1::Event

use std::error::Error;

use kube::{
    Resource,
    core::DynamicObject,
    runtime::{
        controller::{self, Action},
        reflector::ObjectRef,
    },
};

use crate::{client::Client, logging::k8s_events::publish_controller_error_as_k8s_event};

/// `Error` extension implemented by reconciler error types so that failures can be reported
/// both to tracing and as Kubernetes events.
pub trait ReconcilerError: Error {
    /// A short, `PascalCase` category name, used as the Kubernetes event `reason` and typically
    /// implemented via `strum::EnumDiscriminants` + `strum::IntoStaticStr` on the error enum.
    fn category(&self) -> &'static str;

    /// A reference to a secondary object the error occurred while acting on, if any.
    fn secondary_object(&self) -> Option<ObjectRef<DynamicObject>> {
        None
    }

    /// Whether the framework should retry this reconcile with backoff (`true`), or whether the
    /// error has already been folded into a terminal phase transition and persisted (`false`).
    fn is_transient(&self) -> bool {
        true
    }
}

/// Reports a reconcile result: an info log line on success, or an error log line plus a
/// Kubernetes event on failure.
pub fn report_controller_reconciled<K, ReconcileErr, QueueErr>(
    client: &Client,
    controller_name: &str,
    result: &Result<(ObjectRef<K>, Action), controller::Error<ReconcileErr, QueueErr>>,
) where
    K: Resource,
    ReconcileErr: ReconcilerError,
    QueueErr: std::error::Error,
{
    match result {
        Ok((obj, _)) => {
            tracing::info!(controller.name = controller_name, object = %obj, "reconciled object");
        }
        Err(err) => report_controller_error(client, controller_name, err),
    }
}

fn report_controller_error<ReconcileErr, QueueErr>(
    client: &Client,
    controller_name: &str,
    error: &controller::Error<ReconcileErr, QueueErr>,
) where
    ReconcileErr: ReconcilerError,
    QueueErr: std::error::Error,
{
    tracing::error!(
        controller.name = controller_name,
        error = &*error as &dyn std::error::Error,
        "failed to reconcile object",
    );
    publish_controller_error_as_k8s_event(client, controller_name, error);
}
