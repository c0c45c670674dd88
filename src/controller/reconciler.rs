//! Status reconciler
//!
//! Every watched event maps to the single cluster operator key, so the
//! controller runtime coalesces bursts of workload, pod-owner and machine
//! config changes into one status pass at a time.

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{FutureExt, StreamExt};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller},
        reflector::ObjectRef,
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use super::discovery::{self, GENERATES_OPERATOR_STATUS_LABEL, RENDERED_BY_LABEL};
use crate::crd::{ClusterOperator, MachineConfig, MachineConfigPool};
use crate::error::{Error, Result};
use crate::status::{FailureDomain, StatusManager};

/// Name used for reconcile metrics
pub const CONTROLLER_NAME: &str = "network-status";

const INTERNAL_ERROR_REASON: &str = "InternalError";
const RETRY_INTERVAL: Duration = Duration::from_secs(15);
const ERROR_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state for the controller
pub struct ControllerState {
    /// Management cluster client
    pub client: Client,
    /// Clients for hosted clusters, keyed by cluster name
    pub hosted: BTreeMap<String, Client>,
    pub status: Arc<StatusManager>,
    /// Namespace the operator runs in; always listed as a related object
    pub operator_namespace: String,
    /// Periodic resync after a successful pass
    pub resync: Duration,
}

fn to_cluster_operator<K>(
    name: &str,
) -> impl Fn(K) -> Option<ObjectRef<ClusterOperator>> + Send + Sync + 'static {
    let name = name.to_string();
    move |_| Some(ObjectRef::new(&name))
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let co_name = state.status.cluster_operator_name().to_string();

    info!("Publishing initial status for ClusterOperator {}", co_name);
    state.status.bootstrap().await?;

    let cluster_operators: Api<ClusterOperator> = Api::all(client.clone());
    let primary = Config::default().fields(&format!("metadata.name={}", co_name));
    let status_workloads = Config::default().labels(GENERATES_OPERATOR_STATUS_LABEL);

    let mut controller = Controller::new(cluster_operators, primary)
        .watches(
            Api::<DaemonSet>::all(client.clone()),
            status_workloads.clone(),
            to_cluster_operator(&co_name),
        )
        .watches(
            Api::<Deployment>::all(client.clone()),
            status_workloads.clone(),
            to_cluster_operator(&co_name),
        )
        .watches(
            Api::<StatefulSet>::all(client.clone()),
            status_workloads.clone(),
            to_cluster_operator(&co_name),
        )
        .watches(
            Api::<MachineConfig>::all(client.clone()),
            Config::default().labels(RENDERED_BY_LABEL),
            to_cluster_operator(&co_name),
        )
        .watches(
            Api::<MachineConfigPool>::all(client.clone()),
            Config::default(),
            to_cluster_operator(&co_name),
        );

    for (cluster_name, hosted_client) in &state.hosted {
        info!("Watching workloads in hosted cluster {}", cluster_name);
        controller = controller
            .watches(
                Api::<DaemonSet>::all(hosted_client.clone()),
                status_workloads.clone(),
                to_cluster_operator(&co_name),
            )
            .watches(
                Api::<Deployment>::all(hosted_client.clone()),
                status_workloads.clone(),
                to_cluster_operator(&co_name),
            )
            .watches(
                Api::<StatefulSet>::all(hosted_client.clone()),
                status_workloads.clone(),
                to_cluster_operator(&co_name),
            );
    }

    info!("Starting status controller for ClusterOperator {}", co_name);

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// One full status pass
///
/// Order matters: the watched workload lists must be current before pods are
/// evaluated, and machine configs must be recorded before pools are checked.
async fn sync_status(ctx: &ControllerState) -> Result<()> {
    let status = &ctx.status;

    let workloads = discovery::discover_workloads(&ctx.client, &ctx.hosted).await?;
    let related =
        workloads.related_objects(&ctx.operator_namespace, status.operator_config_name());
    status.set_daemon_sets(workloads.daemon_sets).await;
    status.set_deployments(workloads.deployments).await;
    status.set_stateful_sets(workloads.stateful_sets).await;
    status
        .set_unreachable_clusters(workloads.unreachable_clusters)
        .await;
    status.set_related_objects(related).await;

    let configs = discovery::rendered_machine_configs(&ctx.client).await;
    evaluate(status, configs, discovery::machine_config_pools(&ctx.client)).await
}

/// Evaluate workloads and machine config rendering
///
/// A failed machine config fetch skips only the render checks; workloads are
/// still evaluated and the fetch error is returned afterwards.
pub(crate) async fn evaluate<F>(
    status: &StatusManager,
    configs: Result<Vec<MachineConfig>>,
    pools: F,
) -> Result<()>
where
    F: Future<Output = Result<Vec<MachineConfigPool>>>,
{
    let configs = match configs {
        Ok(configs) => {
            status.set_machine_configs(&configs).await;
            Ok(())
        }
        Err(e) => {
            warn!("Failed to list rendered MachineConfigs: {}", e);
            Err(e)
        }
    };

    status.set_from_pods().await;

    configs?;
    let pools = pools.await?;
    status.set_from_machine_config_pools(&pools).await;
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a status pass, converting a panic into a Degraded condition
///
/// A successful pass clears any InternalError left by an earlier panic.
pub(crate) async fn run_guarded<F>(
    status: &StatusManager,
    resync: Duration,
    pass: F,
) -> Result<Action>
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(pass).catch_unwind().await {
        Ok(Ok(())) => {
            status.set_not_degraded(FailureDomain::InternalError).await;
            Ok(Action::requeue(resync))
        }
        Ok(Err(e)) => Err(e),
        Err(panic) => {
            let message = panic_message(&*panic);
            error!("Status pass panicked: {}", message);
            #[cfg(feature = "metrics")]
            super::metrics::inc_reconcile_error(CONTROLLER_NAME, "panic");
            status
                .set_degraded(
                    FailureDomain::InternalError,
                    INTERNAL_ERROR_REASON,
                    &format!("Internal error while reconciling: {}", message),
                )
                .await;
            Ok(Action::requeue(RETRY_INTERVAL))
        }
    }
}

#[instrument(skip(ctx), fields(name = %obj.name_any()))]
async fn reconcile(obj: Arc<ClusterOperator>, ctx: Arc<ControllerState>) -> Result<Action> {
    let start = Instant::now();
    let result = run_guarded(&ctx.status, ctx.resync, sync_status(&ctx)).await;

    #[cfg(feature = "metrics")]
    super::metrics::observe_reconcile_duration_seconds(
        CONTROLLER_NAME,
        start.elapsed().as_secs_f64(),
    );
    debug!("Status pass finished in {:?}", start.elapsed());

    result
}

pub(crate) fn requeue_after(error: &Error) -> Duration {
    if error.is_retriable() {
        RETRY_INTERVAL
    } else {
        ERROR_INTERVAL
    }
}

fn error_policy(obj: Arc<ClusterOperator>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    warn!("Status pass for {} failed: {:?}", obj.name_any(), error);
    #[cfg(feature = "metrics")]
    super::metrics::inc_reconcile_error(CONTROLLER_NAME, error.kind());
    Action::requeue(requeue_after(error))
}
