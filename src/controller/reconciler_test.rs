//! Tests for the reconciler module
//!
//! These tests verify the panic guard around a status pass:
//! - A panic becomes a Degraded InternalError condition
//! - The next successful pass clears it
//! - Ordinary errors are handed to the error policy untouched
//! - A failing machine config fetch does not skip workload evaluation

#[cfg(test)]
mod tests {
    use super::super::reconciler::*;
    use crate::error::{Error, Result};
    use crate::crd::{MachineConfig, MachineConfigPool};
    use crate::status::conditions::{
        find_condition, CONDITION_TYPE_DEGRADED, CONDITION_TYPE_PROGRESSING,
    };
    use crate::status::fake::FakeCluster;
    use crate::status::{StatusConfig, StatusManager};
    use kube::runtime::controller::Action;
    use std::time::Duration;

    const RESYNC: Duration = Duration::from_secs(300);

    async fn passing() -> Result<()> {
        Ok(())
    }

    async fn panicking() -> Result<()> {
        panic!("index out of range")
    }

    async fn failing() -> Result<()> {
        Err(Error::ConfigError("bad selector".to_string()))
    }

    async fn no_pools() -> Result<Vec<MachineConfigPool>> {
        panic!("pools listed after a failed machine config fetch")
    }

    async fn empty_pools() -> Result<Vec<MachineConfigPool>> {
        Ok(Vec::new())
    }

    fn degraded(cluster: &FakeCluster) -> (bool, String, String) {
        let status = cluster.cluster_operator().unwrap().status.unwrap();
        let degraded = find_condition(&status.conditions, CONDITION_TYPE_DEGRADED)
            .cloned()
            .unwrap();
        (degraded.is_true(), degraded.reason, degraded.message)
    }

    #[tokio::test]
    async fn test_successful_pass_requeues_after_resync() {
        let cluster = FakeCluster::new();
        let status = StatusManager::new(cluster.clone(), StatusConfig::default());

        let action = run_guarded(&status, RESYNC, passing()).await.unwrap();

        assert_eq!(action, Action::requeue(RESYNC));
        assert!(!degraded(&cluster).0);
    }

    #[tokio::test]
    async fn test_panic_degrades_until_next_success() {
        let cluster = FakeCluster::new();
        let status = StatusManager::new(cluster.clone(), StatusConfig::default());

        let action = run_guarded(&status, RESYNC, panicking()).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(15)));
        let (is_true, reason, message) = degraded(&cluster);
        assert!(is_true);
        assert_eq!(reason, "InternalError");
        assert!(message.contains("index out of range"));

        run_guarded(&status, RESYNC, passing()).await.unwrap();
        assert!(!degraded(&cluster).0);
    }

    #[tokio::test]
    async fn test_errors_are_returned_to_error_policy() {
        let cluster = FakeCluster::new();
        let status = StatusManager::new(cluster.clone(), StatusConfig::default());

        let result = run_guarded(&status, RESYNC, failing()).await;

        assert!(matches!(result, Err(Error::ConfigError(_))));
        assert!(cluster.cluster_operator().is_none());
    }

    #[test]
    fn test_requeue_interval_follows_retriability() {
        assert_eq!(
            requeue_after(&Error::Conflict("clusteroperator/network".to_string())),
            Duration::from_secs(15)
        );
        assert_eq!(
            requeue_after(&Error::SelectorError("bad operator".to_string())),
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_machine_config_error_still_evaluates_workloads() {
        let cluster = FakeCluster::new();
        let status = StatusManager::new(cluster.clone(), StatusConfig::default());
        let configs: Result<Vec<MachineConfig>> =
            Err(Error::Conflict("machineconfigs".to_string()));

        let result = evaluate(&status, configs, no_pools()).await;

        assert!(matches!(result, Err(Error::Conflict(_))));
        let co_status = cluster.cluster_operator().unwrap().status.unwrap();
        let progressing =
            find_condition(&co_status.conditions, CONDITION_TYPE_PROGRESSING).unwrap();
        assert!(progressing.is_true());
        assert_eq!(progressing.message, "Deploying");
    }

    #[tokio::test]
    async fn test_evaluate_checks_pools_after_configs() {
        let cluster = FakeCluster::new();
        let status = StatusManager::new(cluster.clone(), StatusConfig::default());

        evaluate(&status, Ok(Vec::new()), empty_pools())
            .await
            .unwrap();

        assert!(status.snapshot().await.rendered_machine_configs.is_empty());
        assert!(!degraded(&cluster).0);
    }
}
