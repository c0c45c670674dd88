//! HTTP handlers for the REST API

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use kube::api::Api;
use kube::ResourceExt;
use tracing::{error, instrument};

use crate::controller::ControllerState;
use crate::crd::ClusterOperator;

use super::dto::{ErrorResponse, HealthResponse, PublishedStatusResponse, StatusResponse};

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Ledger, install and machine config state held by the status manager
#[instrument(skip(state))]
pub async fn get_status(State(state): State<Arc<ControllerState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        cluster_operator: state.status.cluster_operator_name().to_string(),
        target_version: state.status.target_version().to_string(),
        snapshot: state.status.snapshot().await,
    })
}

/// Conditions as currently stored on the cluster operator record
#[instrument(skip(state))]
pub async fn get_published_status(
    State(state): State<Arc<ControllerState>>,
) -> Result<Json<PublishedStatusResponse>, ApiError> {
    let name = state.status.cluster_operator_name();
    let api: Api<ClusterOperator> = Api::all(state.client.clone());

    match api.get(name).await {
        Ok(co) => Ok(Json(PublishedStatusResponse {
            name: co.name_any(),
            resource_version: co.resource_version(),
            status: co.status.unwrap_or_default(),
        })),
        Err(kube::Error::Api(e)) if e.code == 404 => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "not_found",
                &format!("ClusterOperator {} not found", name),
            )),
        )),
        Err(e) => {
            error!("Failed to get ClusterOperator {}: {:?}", name, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("get_failed", &e.to_string())),
            ))
        }
    }
}
