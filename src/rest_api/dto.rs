//! Response bodies served by the REST API

use serde::Serialize;

use crate::crd::ClusterOperatorStatus;
use crate::status::StatusSnapshot;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// In-memory view of the status manager
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub cluster_operator: String,
    pub target_version: String,
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
}

/// Status as last published on the cluster operator record
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedStatusResponse {
    pub name: String,
    pub resource_version: Option<String>,
    pub status: ClusterOperatorStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}
