//! Axum HTTP API server.
//!
//! This crate provides:
//! - REST endpoints for submitting, inspecting and cancelling render jobs
//! - WebSocket streaming of per-job progress events
//! - Health probes

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
