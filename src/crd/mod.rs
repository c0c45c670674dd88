//! Custom Resource Definitions consumed and produced by the status core
//!
//! The operator writes conditions to two records: the operator config
//! (`Network`) and the cluster-wide `ClusterOperator`. Machine configs and
//! machine config pools are read to track node-level rollouts.

mod cluster_operator;
mod machine_config;
mod network;
pub mod types;


pub use cluster_operator::{ClusterOperator, ClusterOperatorSpec, ClusterOperatorStatus};
pub use machine_config::{
    ConfigSourceReference, MachineConfig, MachineConfigPool, MachineConfigPoolSpec,
    MachineConfigPoolStatus, MachineConfigPoolStatusConfiguration, MachineConfigSpec,
    POOL_CONDITION_DEGRADED, POOL_CONDITION_UPDATING,
};
pub use network::{Network, NetworkSpec, NetworkStatus};
pub use types::*;
