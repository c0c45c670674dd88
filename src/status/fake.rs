//! In-memory [`ClusterStore`] for tests

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use super::persist::StateStore;
use super::store::ClusterStore;
use super::workload::{ClusteredName, Workload, WorkloadKey, WorkloadKind};
use crate::crd::{ClusterOperator, Network, ObjectReference};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct FakeState {
    pub workloads: BTreeMap<WorkloadKey, Workload>,
    /// Pods with the cluster name they live in
    pub pods: Vec<(String, Pod)>,
    pub cluster_operator: Option<ClusterOperator>,
    pub operator_config: Option<Network>,
    pub cluster_operator_writes: usize,
    pub operator_config_writes: usize,
    pub annotation_writes: Vec<(WorkloadKey, String, Option<String>)>,
    pub deleted: Vec<ObjectReference>,
    pub pending_conflicts: usize,
    pub fail_pod_lists: bool,
    resource_version: u64,
}

impl FakeState {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn put_workload(&self, name: &ClusteredName, workload: Workload) {
        let key = WorkloadKey::new(workload.kind(), name.clone());
        self.with(|s| s.workloads.insert(key, workload));
    }

    pub fn workload(&self, kind: WorkloadKind, name: &ClusteredName) -> Option<Workload> {
        self.with(|s| s.workloads.get(&WorkloadKey::new(kind, name.clone())).cloned())
    }

    pub fn put_pod(&self, cluster_name: &str, pod: Pod) {
        self.with(|s| s.pods.push((cluster_name.to_string(), pod)));
    }

    pub fn put_operator_config(&self, name: &str) {
        self.with(|s| s.operator_config = Some(Network::new(name, Default::default())));
    }

    pub fn cluster_operator(&self) -> Option<ClusterOperator> {
        self.with(|s| s.cluster_operator.clone())
    }

    pub fn cluster_operator_writes(&self) -> usize {
        self.with(|s| s.cluster_operator_writes)
    }
}

fn annotate(workload: &mut Workload, key: &str, value: Option<&str>) {
    let metadata = match workload {
        Workload::DaemonSet(ds) => &mut ds.metadata,
        Workload::Deployment(dep) => &mut dep.metadata,
        Workload::StatefulSet(ss) => &mut ss.metadata,
    };
    let annotations = metadata.annotations.get_or_insert_with(BTreeMap::new);
    match value {
        Some(value) => annotations.insert(key.to_string(), value.to_string()),
        None => annotations.remove(key),
    };
}

#[async_trait]
impl StateStore for FakeCluster {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with(|s| {
            s.cluster_operator
                .as_ref()
                .and_then(|co| co.annotations().get(key).cloned())
        }))
    }

    async fn save(&self, key: &str, blob: String) -> Result<()> {
        self.with(|s| {
            let version = s.next_resource_version();
            let co = s
                .cluster_operator
                .as_mut()
                .ok_or_else(|| Error::NotFound("clusteroperator".to_string()))?;
            co.annotations_mut().insert(key.to_string(), blob);
            co.metadata.resource_version = Some(version);
            Ok(())
        })
    }
}

#[async_trait]
impl ClusterStore for FakeCluster {
    async fn get_workload(
        &self,
        kind: WorkloadKind,
        name: &ClusteredName,
    ) -> Result<Option<Workload>> {
        Ok(self.workload(kind, name))
    }

    async fn list_pods(
        &self,
        cluster_name: &str,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        self.with(|s| {
            if s.fail_pod_lists {
                return Err(Error::ConfigError("pod list unavailable".to_string()));
            }
            Ok(s.pods
                .iter()
                .filter(|(cluster, pod)| {
                    cluster == cluster_name
                        && pod.namespace().as_deref() == Some(namespace)
                        && match_labels
                            .iter()
                            .all(|(k, v)| pod.labels().get(k) == Some(v))
                })
                .map(|(_, pod)| pod.clone())
                .collect())
        })
    }

    async fn set_workload_annotation(
        &self,
        kind: WorkloadKind,
        name: &ClusteredName,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let wkey = WorkloadKey::new(kind, name.clone());
        self.with(|s| {
            let workload = s
                .workloads
                .get_mut(&wkey)
                .ok_or_else(|| Error::NotFound(name.to_string()))?;
            annotate(workload, key, value);
            s.annotation_writes
                .push((wkey.clone(), key.to_string(), value.map(str::to_string)));
            Ok(())
        })
    }

    async fn get_cluster_operator(&self, _name: &str) -> Result<Option<ClusterOperator>> {
        Ok(self.cluster_operator())
    }

    async fn create_cluster_operator(&self, co: &ClusterOperator) -> Result<ClusterOperator> {
        self.with(|s| {
            if s.cluster_operator.is_some() {
                return Err(Error::Conflict("already exists".to_string()));
            }
            let mut created = co.clone();
            created.metadata.resource_version = Some(s.next_resource_version());
            s.cluster_operator = Some(created.clone());
            Ok(created)
        })
    }

    async fn replace_cluster_operator_status(
        &self,
        co: &ClusterOperator,
    ) -> Result<ClusterOperator> {
        self.with(|s| {
            if s.pending_conflicts > 0 {
                s.pending_conflicts -= 1;
                return Err(Error::Conflict("injected".to_string()));
            }
            let stale = match &s.cluster_operator {
                Some(current) => current.metadata.resource_version != co.metadata.resource_version,
                None => return Err(Error::NotFound(co.name_any())),
            };
            if stale {
                return Err(Error::Conflict("stale resourceVersion".to_string()));
            }
            let version = s.next_resource_version();
            s.cluster_operator_writes += 1;
            let current = s
                .cluster_operator
                .as_mut()
                .ok_or_else(|| Error::NotFound(co.name_any()))?;
            current.status = co.status.clone();
            current.metadata.resource_version = Some(version);
            Ok(current.clone())
        })
    }

    async fn get_operator_config(&self, _name: &str) -> Result<Option<Network>> {
        Ok(self.with(|s| s.operator_config.clone()))
    }

    async fn replace_operator_config_status(&self, config: &Network) -> Result<Network> {
        self.with(|s| {
            let current = s
                .operator_config
                .as_mut()
                .ok_or_else(|| Error::NotFound(config.name_any()))?;
            current.status = config.status.clone();
            s.operator_config_writes += 1;
            Ok(current.clone())
        })
    }

    async fn delete_related_object(&self, object: &ObjectReference) -> Result<()> {
        self.with(|s| s.deleted.push(object.clone()));
        Ok(())
    }
}
