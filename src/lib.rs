//! Network status: status aggregation for a Kubernetes cluster network operator
//!
//! This crate tracks the rollout of the operator's workloads and rendered
//! machine configs and publishes the resulting Degraded, Progressing,
//! Available and Upgradeable conditions on the operator's status records.

pub mod controller;
pub mod crd;
pub mod error;
pub mod status;
pub mod telemetry;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
