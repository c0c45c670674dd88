//! Writing resolved conditions to the two status records
//!
//! Every publish is a read-modify-write of the status subresource. Writes are
//! skipped when nothing changed, and conflicts are retried with a short
//! jittered backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::conditions::{
    find_condition, is_condition_true, set_condition, unavailable_condition,
    upgradeable_condition, CONDITION_TYPE_AVAILABLE, CONDITION_TYPE_PROGRESSING,
    CONDITION_TYPE_UPGRADEABLE,
};
use super::manager::{StatusManager, StatusState};
use crate::crd::{
    ClusterOperator, ClusterOperatorSpec, Condition, ObjectReference, OperandVersion,
};
use crate::error::Result;

/// Operand name used for the version stamp
pub const OPERAND_VERSION_NAME: &str = "operator";

/// Exponential backoff with multiplicative jitter
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    /// Total number of attempts
    pub steps: u32,
    pub duration: Duration,
    pub factor: f64,
    pub jitter: f64,
}

/// Backoff used for optimistic-concurrency conflicts on status writes
pub const CONFLICT_BACKOFF: Backoff = Backoff {
    steps: 4,
    duration: Duration::from_millis(10),
    factor: 5.0,
    jitter: 0.1,
};

impl Backoff {
    /// Delay before retry number `attempt` (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.duration.as_secs_f64() * self.factor.powi(attempt as i32);
        let jitter = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64(base * (1.0 + jitter))
    }
}

/// Run `op` until it succeeds, fails with a non-conflict error, or the backoff
/// runs out of steps
pub async fn retry_on_conflict<T, F, Fut>(record: &str, backoff: Backoff, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt + 1 < backoff.steps => {
                #[cfg(feature = "metrics")]
                crate::controller::metrics::inc_publish_conflict(record);
                let delay = backoff.delay(attempt);
                debug!("Conflict writing {} status, retrying in {:?}", record, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Apply resolved conditions on top of the ones already published
///
/// Adds `Available=False` while the network is still starting up, and
/// `Upgradeable=True` when nothing registered an Upgradeable condition.
pub fn merge_conditions(existing: &mut Vec<Condition>, updates: &[Condition]) {
    for condition in updates {
        set_condition(existing, condition.clone());
    }
    if find_condition(existing, CONDITION_TYPE_AVAILABLE).is_none()
        && is_condition_true(existing, CONDITION_TYPE_PROGRESSING)
    {
        set_condition(
            existing,
            unavailable_condition("Startup", "The network is starting up"),
        );
    }
    if find_condition(existing, CONDITION_TYPE_UPGRADEABLE).is_none() {
        set_condition(existing, upgradeable_condition());
    }
}

/// Related objects that must never be garbage collected
pub fn is_protected(object: &ObjectReference) -> bool {
    match (object.group.as_str(), object.resource.as_str()) {
        ("", "namespaces") => true,
        ("operator.openshift.io", "networks") | ("config.openshift.io", "networks") => true,
        _ => false,
    }
}

/// Objects advertised before but not anymore, minus the protected ones
pub fn stale_related_objects(
    previous: &[ObjectReference],
    current: &[ObjectReference],
) -> Vec<ObjectReference> {
    previous
        .iter()
        .filter(|o| !current.contains(o) && !is_protected(o))
        .cloned()
        .collect()
}

impl StatusManager {
    /// Publish the ledger plus `extra` conditions to both records
    ///
    /// Failures are logged; the next triggered reconcile publishes again.
    pub(crate) async fn publish(
        &self,
        state: &StatusState,
        extra: &[Condition],
        reached_available_level: bool,
    ) {
        let mut conditions = vec![
            state.ledger.resolve_degraded(),
            state.ledger.resolve_progressing(),
        ];
        conditions.extend_from_slice(extra);

        let name = &self.config.cluster_operator_name;
        match retry_on_conflict("ClusterOperator", CONFLICT_BACKOFF, || {
            self.write_cluster_operator(state, &conditions, reached_available_level)
        })
        .await
        {
            Ok(stale) => {
                for object in stale {
                    info!("Deleting related object {} that is no longer rendered", object);
                    if let Err(e) = self.store.delete_related_object(&object).await {
                        warn!("Failed to delete related object {}: {}", object, e);
                    }
                }
            }
            Err(e) => warn!("Failed to set ClusterOperator {} status: {}", name, e),
        }

        if let Err(e) = retry_on_conflict("Network", CONFLICT_BACKOFF, || {
            self.write_operator_config(&conditions, reached_available_level)
        })
        .await
        {
            warn!(
                "Failed to set operator config {} status: {}",
                self.config.operator_config_name, e
            );
        }
    }

    /// One attempt at the cluster operator; returns objects to garbage collect
    async fn write_cluster_operator(
        &self,
        state: &StatusState,
        conditions: &[Condition],
        reached_available_level: bool,
    ) -> Result<Vec<ObjectReference>> {
        let name = &self.config.cluster_operator_name;
        let mut co = match self.store.get_cluster_operator(name).await? {
            Some(co) => co,
            None => {
                info!("Creating ClusterOperator {}", name);
                let co = ClusterOperator::new(name, ClusterOperatorSpec::default());
                self.store.create_cluster_operator(&co).await?
            }
        };

        let previous = co.status.clone().unwrap_or_default();
        let mut status = previous.clone();
        merge_conditions(&mut status.conditions, conditions);

        let mut stale = Vec::new();
        if let Some(related) = &state.related_objects {
            stale = stale_related_objects(&previous.related_objects, related);
            status.related_objects = related.clone();
        }
        if reached_available_level && !self.config.target_version.is_empty() {
            status.versions = vec![OperandVersion {
                name: OPERAND_VERSION_NAME.to_string(),
                version: self.config.target_version.clone(),
            }];
        }

        if co.status.is_some() && status == previous {
            debug!("ClusterOperator {} status unchanged", name);
            return Ok(Vec::new());
        }

        match serde_yaml::to_string(&status.conditions) {
            Ok(yaml) => info!("Set ClusterOperator conditions:\n{}", yaml),
            Err(e) => debug!("Could not render conditions as YAML: {}", e),
        }

        co.status = Some(status);
        let updated = self.store.replace_cluster_operator_status(&co).await?;

        #[cfg(feature = "metrics")]
        if let Some(status) = &updated.status {
            for condition in &status.conditions {
                crate::controller::metrics::set_condition_status(
                    name,
                    &condition.type_,
                    condition.is_true(),
                );
            }
        }
        #[cfg(not(feature = "metrics"))]
        let _ = updated;

        Ok(stale)
    }

    async fn write_operator_config(
        &self,
        conditions: &[Condition],
        reached_available_level: bool,
    ) -> Result<()> {
        let name = &self.config.operator_config_name;
        let Some(mut config) = self.store.get_operator_config(name).await? else {
            debug!("Operator config {} does not exist yet", name);
            return Ok(());
        };

        let previous = config.status.clone().unwrap_or_default();
        let mut status = previous.clone();
        merge_conditions(&mut status.conditions, conditions);
        if reached_available_level && !self.config.target_version.is_empty() {
            status.version = Some(self.config.target_version.clone());
        }

        if config.status.is_some() && status == previous {
            return Ok(());
        }

        config.status = Some(status);
        self.store.replace_operator_config_status(&config).await?;
        Ok(())
    }
}
