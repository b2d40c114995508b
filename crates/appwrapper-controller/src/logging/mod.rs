pub mod controller;
pub mod k8s_events;

pub use controller::{ReconcilerError, report_controller_reconciled};
