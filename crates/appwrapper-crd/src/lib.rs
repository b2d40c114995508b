//! Custom resource types for `AppWrapper`, the cluster-level controller that bundles
//! heterogeneous workload resources into a single unit of admission, deployment and lifecycle
//! management.

pub mod conditions;
pub mod constants;
pub mod phase;
pub mod wrapper;

pub use conditions::{ConditionStatus, ConditionType};
pub use phase::WrapperPhase;
pub use wrapper::{
    AppWrapper, AppWrapperComponent, AppWrapperSpec, AppWrapperStatus, PodSet, PodSetInfo,
};

pub use appwrapper_shared::crd::CustomResourceExt;
