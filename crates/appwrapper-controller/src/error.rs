//! The reconciler's top-level error type.
//!
//! Variants are split along the taxonomy: transient variants (wrapping I/O failures) are
//! returned from `reconcile` so the framework retries with backoff; fatal variants are instead
//! caught inside `reconcile` and folded into a transition to `Failed`, and never escape as an
//! `Err`. [`Error::is_transient`] tells the two apart.

use kube::{core::DynamicObject, runtime::reflector::ObjectRef};
use snafu::Snafu;
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::logging::controller::ReconcilerError;

#[derive(Debug, Snafu, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("failed to talk to the Kubernetes API"))]
    Client { source: crate::client::Error },

    #[snafu(display("failed to decode component template as a Kubernetes object"))]
    DecodeComponent { source: serde_json::Error },

    #[snafu(display("component template's namespace does not match the AppWrapper's namespace"))]
    ForeignNamespace,

    #[snafu(display("failed to resolve pod-set path"))]
    PodSetPath { source: appwrapper_template::PathError },

    #[snafu(display("failed to extract pod template"))]
    PodSetSpec { source: appwrapper_template::SpecError },

    #[snafu(display("failed to infer pod-sets for component"))]
    InferPodSets { source: appwrapper_template::InferenceError },

    #[snafu(display("failed to inject pod-set info into component template"))]
    Mutate { source: appwrapper_template::MutateError },

    #[snafu(display("component template has no `kind`/`apiVersion`, cannot create it"))]
    MissingObjectKind,

    #[snafu(display("number of pod-set infos does not match the number of effective pod-sets"))]
    PodSetInfoCountMismatch { expected: usize, got: usize },

    #[snafu(display("failed to create component object {name:?}"))]
    CreateComponent {
        source: kube::Error,
        name: String,
        transient: bool,
    },

    #[snafu(display("failed to delete component object {name:?}"))]
    DeleteComponent { source: kube::Error, name: String },

    #[snafu(display("failed to manage finalizer"))]
    Finalizer { source: crate::finalizer::Error },
}

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }

    fn secondary_object(&self) -> Option<ObjectRef<DynamicObject>> {
        None
    }

    fn is_transient(&self) -> bool {
        match self {
            Error::Client { .. } | Error::Finalizer { .. } => true,
            Error::CreateComponent { transient, .. } => *transient,
            _ => false,
        }
    }
}
