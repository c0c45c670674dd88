//! Watched workloads and the counters read from them

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetStatus, Deployment, DeploymentStatus, StatefulSet, StatefulSetStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Marks a workload whose rollout should not block availability
pub const NON_CRITICAL_ANNOTATION: &str = "networkoperator.openshift.io/non-critical";
/// Set (empty value) on workloads whose rollout stopped making progress
pub const ROLLOUT_HUNG_ANNOTATION: &str = "network.operator.openshift.io/rollout-hung";
/// Release version the workload was rendered for
pub const RELEASE_VERSION_ANNOTATION: &str = "release.openshift.io/version";

/// A workload qualified by the managed cluster it lives in
///
/// An empty `cluster_name` refers to the management cluster.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ClusteredName {
    #[serde(default, rename = "ClusterName")]
    pub cluster_name: String,
    #[serde(rename = "Namespace")]
    pub namespace: String,
    #[serde(rename = "Name")]
    pub name: String,
}

impl ClusteredName {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            cluster_name: String::new(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn in_cluster(cluster_name: &str, namespace: &str, name: &str) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ClusteredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cluster_name.is_empty() {
            write!(f, "{}/{}", self.namespace, self.name)
        } else {
            write!(f, "{}/{}/{}", self.cluster_name, self.namespace, self.name)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkloadKind {
    DaemonSet,
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    /// Plural resource name in the `apps` group
    pub fn resource(&self) -> &'static str {
        match self {
            WorkloadKind::DaemonSet => "daemonsets",
            WorkloadKind::Deployment => "deployments",
            WorkloadKind::StatefulSet => "statefulsets",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity of a tracked workload; names are only unique per kind
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkloadKey {
    pub kind: WorkloadKind,
    pub name: ClusteredName,
}

impl WorkloadKey {
    pub fn new(kind: WorkloadKind, name: ClusteredName) -> Self {
        Self { kind, name }
    }
}

/// Replica and generation counters, normalized across workload kinds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RolloutCounters {
    pub desired: i32,
    pub updated: i32,
    pub unavailable: i32,
    pub available: i32,
    pub ready: i32,
    pub generation: i64,
    pub observed_generation: i64,
}

/// Last observed status of a workload, kept for hung-rollout detection
#[derive(Clone, Debug, PartialEq)]
pub enum LastSeenStatus {
    DaemonSet(DaemonSetStatus),
    Deployment(DeploymentStatus),
    StatefulSet(StatefulSetStatus),
}

/// A live workload object fetched from the cluster
#[derive(Clone, Debug)]
pub enum Workload {
    DaemonSet(DaemonSet),
    Deployment(Deployment),
    StatefulSet(StatefulSet),
}

impl Workload {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::DaemonSet(_) => WorkloadKind::DaemonSet,
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::StatefulSet(_) => WorkloadKind::StatefulSet,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Workload::DaemonSet(ds) => &ds.metadata,
            Workload::Deployment(dep) => &dep.metadata,
            Workload::StatefulSet(ss) => &ss.metadata,
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata()
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    pub fn is_non_critical(&self) -> bool {
        self.annotation(NON_CRITICAL_ANNOTATION).is_some()
    }

    pub fn release_version(&self) -> &str {
        self.annotation(RELEASE_VERSION_ANNOTATION).unwrap_or_default()
    }

    /// Labels from the pod selector's `matchLabels`
    pub fn match_labels(&self) -> BTreeMap<String, String> {
        let selector = match self {
            Workload::DaemonSet(ds) => ds.spec.as_ref().map(|s| &s.selector),
            Workload::Deployment(dep) => dep.spec.as_ref().map(|s| &s.selector),
            Workload::StatefulSet(ss) => ss.spec.as_ref().map(|s| &s.selector),
        };
        selector
            .and_then(|s| s.match_labels.clone())
            .unwrap_or_default()
    }

    pub fn last_seen_status(&self) -> LastSeenStatus {
        match self {
            Workload::DaemonSet(ds) => LastSeenStatus::DaemonSet(ds.status.clone().unwrap_or_default()),
            Workload::Deployment(dep) => {
                LastSeenStatus::Deployment(dep.status.clone().unwrap_or_default())
            }
            Workload::StatefulSet(ss) => {
                LastSeenStatus::StatefulSet(ss.status.clone().unwrap_or_default())
            }
        }
    }

    pub fn rollout_counters(&self) -> RolloutCounters {
        let generation = self.metadata().generation.unwrap_or(0);
        match self {
            Workload::DaemonSet(ds) => {
                let status = ds.status.clone().unwrap_or_default();
                RolloutCounters {
                    desired: status.desired_number_scheduled,
                    updated: status.updated_number_scheduled.unwrap_or(0),
                    unavailable: status.number_unavailable.unwrap_or(0),
                    available: status.number_available.unwrap_or(0),
                    ready: status.number_ready,
                    generation,
                    observed_generation: status.observed_generation.unwrap_or(0),
                }
            }
            Workload::Deployment(dep) => {
                let status = dep.status.clone().unwrap_or_default();
                let desired = dep.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                RolloutCounters {
                    desired,
                    updated: status.updated_replicas.unwrap_or(0),
                    unavailable: status.unavailable_replicas.unwrap_or(0),
                    available: status.available_replicas.unwrap_or(0),
                    ready: status.ready_replicas.unwrap_or(0),
                    generation,
                    observed_generation: status.observed_generation.unwrap_or(0),
                }
            }
            Workload::StatefulSet(ss) => {
                let status = ss.status.clone().unwrap_or_default();
                let desired = ss.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                let ready = status.ready_replicas.unwrap_or(0);
                RolloutCounters {
                    desired,
                    updated: status.updated_replicas.unwrap_or(0),
                    // statefulsets report no unavailable counter
                    unavailable: (status.replicas - ready).max(0),
                    available: status.available_replicas.unwrap_or(0),
                    ready,
                    generation,
                    observed_generation: status.observed_generation.unwrap_or(0),
                }
            }
        }
    }
}
