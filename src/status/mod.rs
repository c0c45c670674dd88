//! Status aggregation for the cluster network operator
//!
//! Turns the live state of the operator's workloads and machine config pools
//! into the Degraded, Progressing, Available and Upgradeable conditions
//! published on the `ClusterOperator` and operator config records.

pub mod conditions;
mod crashloop;
#[cfg(test)]
pub(crate) mod fake;
mod kube_store;
pub mod ledger;
mod machine_config_status;
mod manager;
pub mod persist;
mod pod_status;
mod publisher;
pub mod rollout;
pub mod selector;
mod store;
pub mod workload;

pub use crashloop::pod_in_crash_loop;
pub use kube_store::KubeStore;
pub use ledger::{ConditionLedger, FailureDomain, LedgerEntry};
pub use machine_config_status::{
    evaluate_pools, group_by_role, pools_for_role, MachineConfigState, PoolOutcome, PoolReport,
    MACHINE_CONFIG_ROLE_LABEL,
};
pub use manager::{DomainEntry, StatusConfig, StatusManager, StatusSnapshot};
pub use persist::{PodState, StateStore, PROGRESS_TIMEOUT};
pub use pod_status::{hung_message, MAX_HUNG_MESSAGES};
pub use publisher::{
    is_protected, merge_conditions, retry_on_conflict, stale_related_objects, Backoff,
    CONFLICT_BACKOFF, OPERAND_VERSION_NAME,
};
pub use store::ClusterStore;
pub use workload::{
    ClusteredName, Workload, WorkloadKey, WorkloadKind, NON_CRITICAL_ANNOTATION,
    RELEASE_VERSION_ANNOTATION, ROLLOUT_HUNG_ANNOTATION,
};
