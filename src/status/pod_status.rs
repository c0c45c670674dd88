//! Rollout status of the watched workloads
//!
//! Each pass classifies every watched workload, tracks how long progressing
//! workloads have gone without a status change, and folds the result into
//! the PodDeployment (Progressing) and RolloutHung (Degraded) domains plus
//! the Available condition.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use super::conditions::{available_condition, unavailable_condition};
use super::ledger::FailureDomain;
use super::manager::StatusManager;
use super::persist::{load_state, PodState, LAST_SEEN_STATE_ANNOTATION, PROGRESS_TIMEOUT};
use super::rollout::{classify, RolloutInput, RolloutVerdict};
use super::workload::{WorkloadKey, ROLLOUT_HUNG_ANNOTATION};

/// Hung workloads listed individually in the Degraded message
pub const MAX_HUNG_MESSAGES: usize = 10;

const DEPLOYING_REASON: &str = "Deploying";
const ROLLOUT_HUNG_REASON: &str = "RolloutHung";
const UNAVAILABLE_REASON: &str = "Unavailable";

/// Join hung messages, listing at most [`MAX_HUNG_MESSAGES`] of them
pub fn hung_message(mut hung: Vec<String>) -> String {
    if hung.len() > MAX_HUNG_MESSAGES {
        let more = hung.len() - MAX_HUNG_MESSAGES;
        hung.truncate(MAX_HUNG_MESSAGES);
        hung.push(format!("... and {} more", more));
    }
    hung.join("\n")
}

fn quoted(key: &WorkloadKey) -> String {
    format!("{} {:?}", key.kind, key.name.to_string())
}

impl StatusManager {
    /// Evaluate every watched workload and publish the result
    pub async fn set_from_pods(&self) {
        self.set_from_pods_at(Utc::now()).await
    }

    #[instrument(skip(self), fields(name = %self.config.cluster_operator_name))]
    pub(crate) async fn set_from_pods_at(&self, now: DateTime<Utc>) {
        let mut state = self.lock().await;
        let loaded: PodState = load_state(&*self.store, LAST_SEEN_STATE_ANNOTATION).await;
        let mut pod_state = loaded.clone();

        let watched = state.watched_workloads();
        let target_version = &self.config.target_version;

        let mut progressing = Vec::new();
        let mut hung = Vec::new();
        let mut unavailable = Vec::new();
        let mut reached_available_level = !watched.is_empty();

        if watched.is_empty() {
            progressing.push("Deploying".to_string());
        }
        for cluster_name in &state.unreachable_clusters {
            progressing.push(format!(
                "Failed to list workloads in hosted cluster {:?}",
                cluster_name
            ));
            reached_available_level = false;
        }

        for key in &watched {
            let workload = match self.store.get_workload(key.kind, &key.name).await {
                Ok(Some(workload)) => workload,
                Ok(None) => {
                    let message = format!("Waiting for {} to be created", quoted(key));
                    unavailable.push(message.clone());
                    progressing.push(message);
                    reached_available_level = false;
                    continue;
                }
                Err(e) => {
                    warn!("Failed to get {} {}: {}", key.kind, key.name, e);
                    progressing.push(format!("Failed to read {}", quoted(key)));
                    reached_available_level = false;
                    continue;
                }
            };

            let counters = workload.rollout_counters();
            let non_critical = workload.is_non_critical();
            let verdict = classify(&RolloutInput {
                kind: key.kind,
                name: &key.name,
                counters,
                non_critical,
                install_complete: state.install_complete,
            });

            if !non_critical && counters.available == 0 {
                unavailable.push(format!("{} has no available replicas", quoted(key)));
            }
            if workload.release_version() != target_version.as_str() {
                debug!(
                    "{} {} is at version {:?}, want {:?}",
                    key.kind,
                    key.name,
                    workload.release_version(),
                    target_version
                );
                reached_available_level = false;
            }

            let mut is_hung = false;
            match verdict {
                RolloutVerdict::Progressing {
                    reason,
                    blocks_availability,
                    scan_crash_loops,
                } => {
                    progressing.push(reason);
                    if blocks_availability {
                        reached_available_level = false;
                    }
                    if scan_crash_loops {
                        hung.extend(
                            self.check_crash_loop_back_off_pods(
                                &key.name,
                                &workload.match_labels(),
                                key.kind,
                            )
                            .await,
                        );
                    }
                    if non_critical {
                        pod_state.forget(key);
                    } else if let Some(since) = pod_state.observe(
                        key,
                        workload.last_seen_status(),
                        now,
                        PROGRESS_TIMEOUT,
                    ) {
                        hung.push(format!(
                            "{} rollout is not making progress - last change {}",
                            quoted(key),
                            since.to_rfc3339()
                        ));
                        is_hung = true;
                    }
                }
                RolloutVerdict::Settled => {
                    pod_state.forget(key);
                }
            }

            let wanted = is_hung.then_some("");
            if workload.annotation(ROLLOUT_HUNG_ANNOTATION) != wanted {
                if let Err(e) = self
                    .store
                    .set_workload_annotation(key.kind, &key.name, ROLLOUT_HUNG_ANNOTATION, wanted)
                    .await
                {
                    warn!("Failed to update rollout-hung annotation on {}: {}", key.name, e);
                }
            }
        }

        let unreachable = &state.unreachable_clusters;
        pod_state.retain(|key| {
            watched.contains(key) || unreachable.contains(&key.name.cluster_name)
        });

        state.hung_workloads = hung.len();
        #[cfg(feature = "metrics")]
        crate::controller::metrics::set_hung_workloads(hung.len());

        if progressing.is_empty() {
            state.ledger.clear_progressing(FailureDomain::PodDeployment);
        } else {
            state.ledger.set_progressing(
                FailureDomain::PodDeployment,
                DEPLOYING_REASON,
                &progressing.join("\n"),
            );
        }
        if hung.is_empty() {
            state.ledger.clear_degraded(FailureDomain::RolloutHung);
        } else {
            state.ledger.set_degraded(
                FailureDomain::RolloutHung,
                ROLLOUT_HUNG_REASON,
                &hung_message(hung),
            );
        }

        let available = if reached_available_level {
            Some(available_condition())
        } else if state.install_complete {
            Some(if unavailable.is_empty() {
                available_condition()
            } else {
                unavailable_condition(UNAVAILABLE_REASON, &unavailable.join("\n"))
            })
        } else {
            None
        };

        if reached_available_level && progressing.is_empty() && !state.install_complete {
            info!("Network rollout complete");
            state.install_complete = true;
        }

        self.publish(&state, available.as_slice(), reached_available_level)
            .await;

        if pod_state != loaded {
            self.persist(LAST_SEEN_STATE_ANNOTATION, &pod_state).await;
        }
    }
}
