//! REST API module for inspecting operator status
//!
//! Serves the in-memory condition ledger alongside health and metrics.

mod dto;
mod handlers;
mod server;

pub use dto::{ErrorResponse, HealthResponse, PublishedStatusResponse, StatusResponse};
pub use server::run_server;
