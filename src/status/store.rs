//! Access to the external resource store
//!
//! The status core only ever talks to the cluster through [`ClusterStore`].
//! [`super::KubeStore`] implements it against the API server; tests use an
//! in-memory fake.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

use super::persist::StateStore;
use super::workload::{ClusteredName, Workload, WorkloadKind};
use crate::crd::{ClusterOperator, Network, ObjectReference};
use crate::error::Result;

#[async_trait]
pub trait ClusterStore: StateStore {
    /// Fetch a workload; `Ok(None)` when it does not exist yet
    async fn get_workload(&self, kind: WorkloadKind, name: &ClusteredName)
        -> Result<Option<Workload>>;

    /// List pods in a namespace matching all of `match_labels`
    async fn list_pods(
        &self,
        cluster_name: &str,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>>;

    /// Merge-patch a single annotation; `None` removes it
    async fn set_workload_annotation(
        &self,
        kind: WorkloadKind,
        name: &ClusteredName,
        key: &str,
        value: Option<&str>,
    ) -> Result<()>;

    async fn get_cluster_operator(&self, name: &str) -> Result<Option<ClusterOperator>>;

    async fn create_cluster_operator(&self, co: &ClusterOperator) -> Result<ClusterOperator>;

    /// Replace the status subresource; fails with a conflict on a stale resourceVersion
    async fn replace_cluster_operator_status(&self, co: &ClusterOperator)
        -> Result<ClusterOperator>;

    async fn get_operator_config(&self, name: &str) -> Result<Option<Network>>;

    async fn replace_operator_config_status(&self, config: &Network) -> Result<Network>;

    /// Delete an object previously advertised as related
    async fn delete_related_object(&self, object: &ObjectReference) -> Result<()>;
}
