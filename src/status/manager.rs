//! The status aggregator shared by every reconciler
//!
//! All mutators take the same async mutex for their full duration, including
//! the writes to the status records, so concurrently triggered reconciles are
//! serialized and never publish a half-updated ledger.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, instrument, warn};

use super::conditions::{is_condition_true, CONDITION_TYPE_AVAILABLE};
use super::ledger::{ConditionLedger, FailureDomain, LedgerEntry};
use super::machine_config_status::MachineConfigState;
use super::store::ClusterStore;
use super::workload::{ClusteredName, WorkloadKey, WorkloadKind};
use crate::crd::ObjectReference;
use crate::error::Result;

/// Names and versions the manager publishes under
#[derive(Clone, Debug)]
pub struct StatusConfig {
    /// Name of the cluster operator record
    pub cluster_operator_name: String,
    /// Name of the operator config record
    pub operator_config_name: String,
    /// Release version workloads must carry before the operator is Available
    pub target_version: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            cluster_operator_name: "network".to_string(),
            operator_config_name: "cluster".to_string(),
            target_version: String::new(),
        }
    }
}

/// Mutable state guarded by the manager's mutex
#[derive(Debug, Default)]
pub(crate) struct StatusState {
    pub(crate) ledger: ConditionLedger,
    /// Sticky once the operator first reached its available level
    pub(crate) install_complete: bool,
    pub(crate) daemon_sets: Vec<ClusteredName>,
    pub(crate) deployments: Vec<ClusteredName>,
    pub(crate) stateful_sets: Vec<ClusteredName>,
    /// Hosted clusters whose workloads could not be listed on the last pass
    pub(crate) unreachable_clusters: BTreeSet<String>,
    /// `None` until the render pipeline reports; disables related-object cleanup
    pub(crate) related_objects: Option<Vec<ObjectReference>>,
    pub(crate) machine_configs: MachineConfigState,
    pub(crate) machine_configs_loaded: bool,
    pub(crate) hung_workloads: usize,
}

impl StatusState {
    pub(crate) fn watched_workloads(&self) -> Vec<WorkloadKey> {
        let tagged = |kind: WorkloadKind, names: &[ClusteredName]| {
            names
                .iter()
                .map(move |n| WorkloadKey::new(kind, n.clone()))
                .collect::<Vec<_>>()
        };
        let mut all = tagged(WorkloadKind::DaemonSet, &self.daemon_sets);
        all.extend(tagged(WorkloadKind::Deployment, &self.deployments));
        all.extend(tagged(WorkloadKind::StatefulSet, &self.stateful_sets));
        all
    }
}

/// Read-only view of the manager, served by the REST API
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub degraded: Vec<DomainEntry>,
    pub progressing: Vec<DomainEntry>,
    pub install_complete: bool,
    pub watched_workloads: usize,
    pub hung_workloads: usize,
    pub rendered_machine_configs: BTreeMap<String, BTreeSet<String>>,
    pub pending_machine_config_removals: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DomainEntry {
    pub domain: FailureDomain,
    #[serde(flatten)]
    pub entry: LedgerEntry,
}

pub struct StatusManager {
    pub(crate) store: Arc<dyn ClusterStore>,
    pub(crate) config: StatusConfig,
    state: Mutex<StatusState>,
}

impl StatusManager {
    pub fn new(store: Arc<dyn ClusterStore>, config: StatusConfig) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(StatusState::default()),
        }
    }

    pub fn cluster_operator_name(&self) -> &str {
        &self.config.cluster_operator_name
    }

    pub fn operator_config_name(&self) -> &str {
        &self.config.operator_config_name
    }

    pub fn target_version(&self) -> &str {
        &self.config.target_version
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, StatusState> {
        self.state.lock().await
    }

    /// Pick up where a previous process left off and publish once
    ///
    /// Creates the cluster operator record if it does not exist yet.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<()> {
        let mut state = self.lock().await;
        if let Some(co) = self
            .store
            .get_cluster_operator(&self.config.cluster_operator_name)
            .await?
        {
            let available = co
                .status
                .as_ref()
                .map(|s| is_condition_true(&s.conditions, CONDITION_TYPE_AVAILABLE))
                .unwrap_or(false);
            if available {
                info!("Cluster operator already Available; treating install as complete");
                state.install_complete = true;
            }
        }
        self.publish(&state, &[], false).await;
        Ok(())
    }

    /// Register a Degraded condition for `domain`
    pub async fn set_degraded(&self, domain: FailureDomain, reason: &str, message: &str) {
        let mut state = self.lock().await;
        state.ledger.set_degraded(domain, reason, message);
        self.publish(&state, &[], false).await;
    }

    /// Clear the Degraded condition for `domain`
    pub async fn set_not_degraded(&self, domain: FailureDomain) {
        let mut state = self.lock().await;
        state.ledger.clear_degraded(domain);
        self.publish(&state, &[], false).await;
    }

    /// Register a Progressing condition for `domain`
    pub async fn set_progressing(&self, domain: FailureDomain, reason: &str, message: &str) {
        let mut state = self.lock().await;
        state.ledger.set_progressing(domain, reason, message);
        self.publish(&state, &[], false).await;
    }

    /// Clear the Progressing condition for `domain`
    pub async fn unset_progressing(&self, domain: FailureDomain) {
        let mut state = self.lock().await;
        state.ledger.clear_progressing(domain);
        self.publish(&state, &[], false).await;
    }

    /// Replace the set of daemon sets whose rollout is tracked
    pub async fn set_daemon_sets(&self, names: Vec<ClusteredName>) {
        self.lock().await.daemon_sets = names;
    }

    pub async fn set_deployments(&self, names: Vec<ClusteredName>) {
        self.lock().await.deployments = names;
    }

    pub async fn set_stateful_sets(&self, names: Vec<ClusteredName>) {
        self.lock().await.stateful_sets = names;
    }

    /// Record the hosted clusters whose workloads could not be listed
    ///
    /// Rollout snapshots for workloads in these clusters are kept, and the
    /// operator does not reach its available level until they list again.
    pub async fn set_unreachable_clusters(&self, clusters: BTreeSet<String>) {
        self.lock().await.unreachable_clusters = clusters;
    }

    /// Replace the objects advertised on the cluster operator record
    ///
    /// Objects dropped from this list are deleted from the cluster on the next
    /// publish, except namespaces and the operator's own configuration.
    pub async fn set_related_objects(&self, objects: Vec<ObjectReference>) {
        let mut state = self.lock().await;
        state.related_objects = Some(objects);
        self.publish(&state, &[], false).await;
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let state = self.lock().await;
        let entries = |active: Vec<(FailureDomain, LedgerEntry)>| {
            active
                .into_iter()
                .map(|(domain, entry)| DomainEntry { domain, entry })
                .collect()
        };
        StatusSnapshot {
            degraded: entries(state.ledger.active_degraded()),
            progressing: entries(state.ledger.active_progressing()),
            install_complete: state.install_complete,
            watched_workloads: state.watched_workloads().len(),
            hung_workloads: state.hung_workloads,
            rendered_machine_configs: state.machine_configs.rendered.clone(),
            pending_machine_config_removals: state.machine_configs.pending_removal.clone(),
        }
    }

    pub(crate) async fn persist<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = super::persist::save_state(&*self.store, key, value).await {
            warn!("Failed to persist {}: {}", key, e);
        }
    }
}
