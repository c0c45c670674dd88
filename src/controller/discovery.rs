//! Label-based discovery of the objects whose status the operator reports
//!
//! Workloads opt in with [`GENERATES_OPERATOR_STATUS_LABEL`]; machine configs
//! rendered by the operator carry [`RENDERED_BY_LABEL`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use kube::api::{Api, ListParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::crd::{MachineConfig, MachineConfigPool, ObjectReference};
use crate::error::{Error, Result};
use crate::status::{ClusteredName, WorkloadKind};

/// Workloads carrying this label feed the operator's status
pub const GENERATES_OPERATOR_STATUS_LABEL: &str =
    "networkoperator.openshift.io/generates-operator-status";
/// Machine configs carrying this label were rendered by the operator
pub const RENDERED_BY_LABEL: &str = "networkoperator.openshift.io/rendered-by";

const OPERATOR_GROUP: &str = "operator.openshift.io";

/// Workloads found across the management and hosted clusters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiscoveredWorkloads {
    pub daemon_sets: Vec<ClusteredName>,
    pub deployments: Vec<ClusteredName>,
    pub stateful_sets: Vec<ClusteredName>,
    /// Hosted clusters whose workloads could not be listed
    pub unreachable_clusters: BTreeSet<String>,
}

impl DiscoveredWorkloads {
    fn names_mut(&mut self, kind: WorkloadKind) -> &mut Vec<ClusteredName> {
        match kind {
            WorkloadKind::DaemonSet => &mut self.daemon_sets,
            WorkloadKind::Deployment => &mut self.deployments,
            WorkloadKind::StatefulSet => &mut self.stateful_sets,
        }
    }

    fn extend(&mut self, other: DiscoveredWorkloads) {
        self.daemon_sets.extend(other.daemon_sets);
        self.deployments.extend(other.deployments);
        self.stateful_sets.extend(other.stateful_sets);
        self.unreachable_clusters.extend(other.unreachable_clusters);
    }

    fn all(&self) -> impl Iterator<Item = (WorkloadKind, &ClusteredName)> {
        let daemon_sets = self.daemon_sets.iter().map(|n| (WorkloadKind::DaemonSet, n));
        let deployments = self.deployments.iter().map(|n| (WorkloadKind::Deployment, n));
        let stateful_sets = self.stateful_sets.iter().map(|n| (WorkloadKind::StatefulSet, n));
        daemon_sets.chain(deployments).chain(stateful_sets)
    }

    pub fn len(&self) -> usize {
        self.daemon_sets.len() + self.deployments.len() + self.stateful_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Objects advertised on the cluster operator record
    ///
    /// Only management-cluster workloads are listed; hosted clusters are not
    /// reachable through the record's references.
    pub fn related_objects(
        &self,
        operator_namespace: &str,
        operator_config_name: &str,
    ) -> Vec<ObjectReference> {
        let mut namespaces = BTreeSet::new();
        namespaces.insert(operator_namespace.to_string());

        let mut workloads = Vec::new();
        for (kind, name) in self.all().filter(|(_, n)| n.cluster_name.is_empty()) {
            namespaces.insert(name.namespace.clone());
            workloads.push(ObjectReference::new(
                "apps",
                kind.resource(),
                &name.namespace,
                &name.name,
            ));
        }

        let mut related = vec![ObjectReference::new(
            OPERATOR_GROUP,
            "networks",
            "",
            operator_config_name,
        )];
        related.extend(
            namespaces
                .iter()
                .filter(|ns| !ns.is_empty())
                .map(|ns| ObjectReference::new("", "namespaces", "", ns)),
        );
        related.extend(workloads);
        related
    }
}

async fn list_labelled<K>(client: Client, label: &str) -> Result<Vec<K>>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::all(client);
    Ok(api.list(&ListParams::default().labels(label)).await?.items)
}

fn clustered_name<K: ResourceExt>(cluster_name: &str, obj: &K) -> ClusteredName {
    ClusteredName::in_cluster(
        cluster_name,
        &obj.namespace().unwrap_or_default(),
        &obj.name_any(),
    )
}

async fn discover_in(
    found: &mut DiscoveredWorkloads,
    cluster_name: &str,
    client: &Client,
) -> Result<()> {
    let label = GENERATES_OPERATOR_STATUS_LABEL;
    for ds in list_labelled::<DaemonSet>(client.clone(), label).await? {
        found
            .names_mut(WorkloadKind::DaemonSet)
            .push(clustered_name(cluster_name, &ds));
    }
    for dep in list_labelled::<Deployment>(client.clone(), label).await? {
        found
            .names_mut(WorkloadKind::Deployment)
            .push(clustered_name(cluster_name, &dep));
    }
    for ss in list_labelled::<StatefulSet>(client.clone(), label).await? {
        found
            .names_mut(WorkloadKind::StatefulSet)
            .push(clustered_name(cluster_name, &ss));
    }
    Ok(())
}

/// List every opted-in workload in the management cluster and each hosted cluster
///
/// A hosted cluster that fails to list is recorded in
/// [`DiscoveredWorkloads::unreachable_clusters`] with none of its workloads.
pub async fn discover_workloads(
    client: &Client,
    hosted: &BTreeMap<String, Client>,
) -> Result<DiscoveredWorkloads> {
    let mut found = DiscoveredWorkloads::default();
    discover_in(&mut found, "", client).await?;
    for (cluster_name, hosted_client) in hosted {
        let mut in_cluster = DiscoveredWorkloads::default();
        match discover_in(&mut in_cluster, cluster_name, hosted_client).await {
            Ok(()) => found.extend(in_cluster),
            Err(e) => {
                warn!("Failed to discover workloads in hosted cluster {}: {}", cluster_name, e);
                found.unreachable_clusters.insert(cluster_name.clone());
            }
        }
    }
    debug!("Discovered {} status-generating workloads", found.len());
    Ok(found)
}

/// Treat a missing resource type as an empty list
fn empty_if_not_served<T>(result: Result<Vec<T>>, what: &str) -> Result<Vec<T>> {
    match result {
        Err(e) if e.is_not_found() => {
            debug!("{} are not served by this cluster", what);
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Machine configs the operator rendered
pub async fn rendered_machine_configs(client: &Client) -> Result<Vec<MachineConfig>> {
    empty_if_not_served(
        list_labelled::<MachineConfig>(client.clone(), RENDERED_BY_LABEL).await,
        "MachineConfigs",
    )
}

pub async fn machine_config_pools(client: &Client) -> Result<Vec<MachineConfigPool>> {
    let api: Api<MachineConfigPool> = Api::all(client.clone());
    let pools = api
        .list(&ListParams::default())
        .await
        .map(|list| list.items)
        .map_err(Error::from);
    empty_if_not_served(pools, "MachineConfigPools")
}
