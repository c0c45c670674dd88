//! Error types for the network status operator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Optimistic-concurrency conflict while writing a record
    #[error("Conflict while updating {0}")]
    Conflict(String),

    /// An object the caller expected was not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid or unsupported label selector
    #[error("Invalid label selector: {0}")]
    SelectorError(String),

    /// Operator configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Whether the dispatcher should retry quickly
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 409 || resp.code >= 500,
            Error::KubeError(_) | Error::Conflict(_) => true,
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::Conflict(_) => "conflict",
            Error::NotFound(_) => "not_found",
            Error::SerializationError(_) => "serialization",
            Error::SelectorError(_) => "selector",
            Error::ConfigError(_) => "config",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
