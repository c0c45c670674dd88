//! Tracking state that must survive operator restarts
//!
//! State is stored as JSON blobs keyed by name. The production store keeps
//! them as annotations on the cluster operator record; tests use an in-memory
//! map. Loading is best-effort: a missing or unreadable blob yields empty
//! state and tracking is rebuilt from scratch.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSetStatus, DeploymentStatus, StatefulSetStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::workload::{ClusteredName, LastSeenStatus, WorkloadKey, WorkloadKind};
use crate::error::Result;

/// Annotation holding the serialized [`PodState`]
pub const LAST_SEEN_STATE_ANNOTATION: &str = "network.operator.openshift.io/last-seen-state";
/// Annotation holding the serialized machine config tracking state
pub const RENDERED_MACHINE_CONFIG_STATE_ANNOTATION: &str =
    "network.operator.openshift.io/rendered-machine-config-state";

/// How long a progressing workload may go without any status change
pub const PROGRESS_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Narrow load/save interface for persisted blobs
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, blob: String) -> Result<()>;
}

/// Load and decode a blob, falling back to the default on any failure
pub async fn load_state<T, S>(store: &S, key: &str) -> T
where
    T: DeserializeOwned + Default,
    S: StateStore + ?Sized,
{
    match store.load(key).await {
        Ok(Some(blob)) => match serde_json::from_str(&blob) {
            Ok(state) => state,
            Err(e) => {
                warn!("Discarding unreadable state in {}: {}", key, e);
                T::default()
            }
        },
        Ok(None) => {
            debug!("No persisted state in {}", key);
            T::default()
        }
        Err(e) => {
            warn!("Failed to load persisted state {}: {}", key, e);
            T::default()
        }
    }
}

pub async fn save_state<T, S>(store: &S, key: &str, state: &T) -> Result<()>
where
    T: Serialize,
    S: StateStore + ?Sized,
{
    let blob = serde_json::to_string(state)?;
    store.save(key, blob).await
}

/// A workload's last observed status and when it last changed
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadSnapshot {
    pub last_seen_status: LastSeenStatus,
    pub last_change_time: DateTime<Utc>,
}

/// Snapshots of every workload currently progressing
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PodStateBlob", into = "PodStateBlob")]
pub struct PodState {
    snapshots: BTreeMap<WorkloadKey, WorkloadSnapshot>,
}

impl PodState {
    pub fn get(&self, key: &WorkloadKey) -> Option<&WorkloadSnapshot> {
        self.snapshots.get(key)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn insert(&mut self, key: WorkloadKey, snapshot: WorkloadSnapshot) {
        self.snapshots.insert(key, snapshot);
    }

    /// Drop tracking for a workload that is no longer progressing
    pub fn forget(&mut self, key: &WorkloadKey) -> bool {
        self.snapshots.remove(key).is_some()
    }

    /// Keep only the workloads for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&WorkloadKey) -> bool) {
        self.snapshots.retain(|key, _| keep(key));
    }

    /// Record the live status of a progressing workload
    ///
    /// Returns the time of the last status change when the workload was
    /// already tracked and has not changed for longer than `timeout`.
    pub fn observe(
        &mut self,
        key: &WorkloadKey,
        status: LastSeenStatus,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Option<DateTime<Utc>> {
        match self.snapshots.get_mut(key) {
            Some(snapshot) => {
                if snapshot.last_seen_status != status {
                    snapshot.last_seen_status = status;
                    snapshot.last_change_time = now;
                }
                let stalled = (now - snapshot.last_change_time)
                    .to_std()
                    .map(|elapsed| elapsed > timeout)
                    .unwrap_or(false);
                stalled.then_some(snapshot.last_change_time)
            }
            None => {
                self.snapshots.insert(
                    key.clone(),
                    WorkloadSnapshot {
                        last_seen_status: status,
                        last_change_time: now,
                    },
                );
                None
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SnapshotEntry<S> {
    #[serde(flatten)]
    name: ClusteredName,
    last_seen_status: S,
    last_change_time: DateTime<Utc>,
}

/// On-the-wire layout, grouped by workload kind
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PodStateBlob {
    #[serde(default)]
    daemonset_states: Vec<SnapshotEntry<DaemonSetStatus>>,
    #[serde(default)]
    deployment_states: Vec<SnapshotEntry<DeploymentStatus>>,
    #[serde(default)]
    statefulset_states: Vec<SnapshotEntry<StatefulSetStatus>>,
}

impl From<PodStateBlob> for PodState {
    fn from(blob: PodStateBlob) -> Self {
        let mut state = PodState::default();
        let mut add = |kind, name, status, last_change_time| {
            state.insert(
                WorkloadKey::new(kind, name),
                WorkloadSnapshot {
                    last_seen_status: status,
                    last_change_time,
                },
            );
        };
        for e in blob.daemonset_states {
            add(
                WorkloadKind::DaemonSet,
                e.name,
                LastSeenStatus::DaemonSet(e.last_seen_status),
                e.last_change_time,
            );
        }
        for e in blob.deployment_states {
            add(
                WorkloadKind::Deployment,
                e.name,
                LastSeenStatus::Deployment(e.last_seen_status),
                e.last_change_time,
            );
        }
        for e in blob.statefulset_states {
            add(
                WorkloadKind::StatefulSet,
                e.name,
                LastSeenStatus::StatefulSet(e.last_seen_status),
                e.last_change_time,
            );
        }
        state
    }
}

impl From<PodState> for PodStateBlob {
    fn from(state: PodState) -> Self {
        let mut blob = PodStateBlob::default();
        for (key, snapshot) in state.snapshots {
            let name = key.name;
            let last_change_time = snapshot.last_change_time;
            match snapshot.last_seen_status {
                LastSeenStatus::DaemonSet(status) => blob.daemonset_states.push(SnapshotEntry {
                    name,
                    last_seen_status: status,
                    last_change_time,
                }),
                LastSeenStatus::Deployment(status) => {
                    blob.deployment_states.push(SnapshotEntry {
                        name,
                        last_seen_status: status,
                        last_change_time,
                    })
                }
                LastSeenStatus::StatefulSet(status) => {
                    blob.statefulset_states.push(SnapshotEntry {
                        name,
                        last_seen_status: status,
                        last_change_time,
                    })
                }
            }
        }
        blob
    }
}
