pub mod aggregator;
pub mod client;
pub mod error;
pub mod finalizer;
pub mod logging;
pub mod materializer;
pub mod propagation;
pub mod queue_adaptor;
pub mod reconciler;
pub mod webhook;

pub use crate::error::Error;
pub use crate::reconciler::Context;

pub use ::kube;
