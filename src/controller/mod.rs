//! Controller module for cluster network operator status
//!
//! Watches the operator's workloads and machine config objects and drives
//! the [`crate::status::StatusManager`] from a single reconcile key.

pub mod discovery;
#[cfg(feature = "metrics")]
pub mod metrics;
mod reconciler;
#[cfg(test)]
mod reconciler_test;

pub use discovery::{
    discover_workloads, DiscoveredWorkloads, GENERATES_OPERATOR_STATUS_LABEL, RENDERED_BY_LABEL,
};
pub use reconciler::{run_controller, ControllerState, CONTROLLER_NAME};
