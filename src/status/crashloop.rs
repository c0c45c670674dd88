//! Crash-loop detection for unavailable workloads

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::warn;

use super::manager::StatusManager;
use super::workload::{ClusteredName, WorkloadKind};

const CRASH_LOOP_BACK_OFF: &str = "CrashLoopBackOff";

/// Whether any container of the pod is waiting in CrashLoopBackOff
pub fn pod_in_crash_loop(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|cs| cs.state.as_ref()?.waiting.as_ref())
        .any(|waiting| waiting.reason.as_deref() == Some(CRASH_LOOP_BACK_OFF))
}

impl StatusManager {
    /// One message per crash-looping pod of the workload
    ///
    /// Listing failures are logged and reported as no crash loops.
    pub async fn check_crash_loop_back_off_pods(
        &self,
        name: &ClusteredName,
        match_labels: &BTreeMap<String, String>,
        kind: WorkloadKind,
    ) -> Vec<String> {
        if match_labels.is_empty() {
            return Vec::new();
        }

        let pods = match self
            .store
            .list_pods(&name.cluster_name, &name.namespace, match_labels)
            .await
        {
            Ok(pods) => pods,
            Err(e) => {
                warn!("Failed to list pods of {} {}: {}", kind, name, e);
                return Vec::new();
            }
        };

        pods.iter()
            .filter(|pod| pod_in_crash_loop(pod))
            .map(|pod| {
                format!(
                    "{} {:?} rollout is not making progress - pod {} is in CrashLoopBackOff State",
                    kind,
                    name.to_string(),
                    pod.name_any()
                )
            })
            .collect()
    }
}
