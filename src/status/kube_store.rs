//! [`ClusterStore`] backed by the Kubernetes API
//!
//! Workloads and pods may live in hosted clusters; those are reached through
//! a separate client per cluster name. Status records and persisted state
//! always live in the management cluster.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::discovery::{Discovery, Scope};
use kube::{Client, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::persist::StateStore;
use super::selector::label_selector_string;
use super::store::ClusterStore;
use super::workload::{ClusteredName, Workload, WorkloadKind};
use crate::crd::{ClusterOperator, Network, ObjectReference};
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    hosted: BTreeMap<String, Client>,
    cluster_operator_name: String,
}

impl KubeStore {
    pub fn new(client: Client, cluster_operator_name: &str) -> Self {
        Self {
            client,
            hosted: BTreeMap::new(),
            cluster_operator_name: cluster_operator_name.to_string(),
        }
    }

    /// Register the client for a hosted cluster
    pub fn with_hosted_cluster(mut self, cluster_name: &str, client: Client) -> Self {
        self.hosted.insert(cluster_name.to_string(), client);
        self
    }

    fn client_for(&self, cluster_name: &str) -> Result<Client> {
        if cluster_name.is_empty() {
            return Ok(self.client.clone());
        }
        self.hosted.get(cluster_name).cloned().ok_or_else(|| {
            Error::ConfigError(format!("no client configured for cluster {:?}", cluster_name))
        })
    }

    fn cluster_operators(&self) -> Api<ClusterOperator> {
        Api::all(self.client.clone())
    }
}

async fn merge_patch<K>(api: Api<K>, name: &str, patch: &serde_json::Value) -> Result<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(())
}

fn annotation_patch(key: &str, value: Option<&str>) -> serde_json::Value {
    json!({ "metadata": { "annotations": { key: value } } })
}

#[async_trait]
impl StateStore for KubeStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        let co = self
            .cluster_operators()
            .get_opt(&self.cluster_operator_name)
            .await?;
        Ok(co.and_then(|co| co.annotations().get(key).cloned()))
    }

    async fn save(&self, key: &str, blob: String) -> Result<()> {
        merge_patch(
            self.cluster_operators(),
            &self.cluster_operator_name,
            &annotation_patch(key, Some(&blob)),
        )
        .await
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_workload(
        &self,
        kind: WorkloadKind,
        name: &ClusteredName,
    ) -> Result<Option<Workload>> {
        let client = self.client_for(&name.cluster_name)?;
        let ns = &name.namespace;
        let workload = match kind {
            WorkloadKind::DaemonSet => Api::<DaemonSet>::namespaced(client, ns)
                .get_opt(&name.name)
                .await?
                .map(Workload::DaemonSet),
            WorkloadKind::Deployment => Api::<Deployment>::namespaced(client, ns)
                .get_opt(&name.name)
                .await?
                .map(Workload::Deployment),
            WorkloadKind::StatefulSet => Api::<StatefulSet>::namespaced(client, ns)
                .get_opt(&name.name)
                .await?
                .map(Workload::StatefulSet),
        };
        Ok(workload)
    }

    async fn list_pods(
        &self,
        cluster_name: &str,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client_for(cluster_name)?, namespace);
        let lp = ListParams::default().labels(&label_selector_string(match_labels));
        Ok(pods.list(&lp).await?.items)
    }

    async fn set_workload_annotation(
        &self,
        kind: WorkloadKind,
        name: &ClusteredName,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let client = self.client_for(&name.cluster_name)?;
        let ns = &name.namespace;
        let patch = annotation_patch(key, value);
        debug!("Patching {} {} annotation {}={:?}", kind, name, key, value);
        match kind {
            WorkloadKind::DaemonSet => {
                merge_patch(Api::<DaemonSet>::namespaced(client, ns), &name.name, &patch).await
            }
            WorkloadKind::Deployment => {
                merge_patch(Api::<Deployment>::namespaced(client, ns), &name.name, &patch).await
            }
            WorkloadKind::StatefulSet => {
                merge_patch(Api::<StatefulSet>::namespaced(client, ns), &name.name, &patch).await
            }
        }
    }

    async fn get_cluster_operator(&self, name: &str) -> Result<Option<ClusterOperator>> {
        Ok(self.cluster_operators().get_opt(name).await?)
    }

    async fn create_cluster_operator(&self, co: &ClusterOperator) -> Result<ClusterOperator> {
        Ok(self
            .cluster_operators()
            .create(&PostParams::default(), co)
            .await?)
    }

    async fn replace_cluster_operator_status(
        &self,
        co: &ClusterOperator,
    ) -> Result<ClusterOperator> {
        let data = serde_json::to_vec(co)?;
        Ok(self
            .cluster_operators()
            .replace_status(&co.name_any(), &PostParams::default(), data)
            .await?)
    }

    async fn get_operator_config(&self, name: &str) -> Result<Option<Network>> {
        let api: Api<Network> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn replace_operator_config_status(&self, config: &Network) -> Result<Network> {
        let api: Api<Network> = Api::all(self.client.clone());
        let data = serde_json::to_vec(config)?;
        Ok(api
            .replace_status(&config.name_any(), &PostParams::default(), data)
            .await?)
    }

    async fn delete_related_object(&self, object: &ObjectReference) -> Result<()> {
        let discovery = Discovery::new(self.client.clone())
            .filter(&[object.group.as_str()])
            .run()
            .await?;
        let (resource, caps) = discovery
            .groups()
            .flat_map(|group| group.recommended_resources())
            .find(|(ar, _)| ar.plural == object.resource)
            .ok_or_else(|| Error::NotFound(format!("resource for {} is not served", object)))?;

        let api: Api<DynamicObject> = match caps.scope {
            Scope::Namespaced => {
                Api::namespaced_with(self.client.clone(), &object.namespace, &resource)
            }
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
        };
        match api.delete(&object.name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
