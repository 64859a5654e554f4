//! REST API server module.
//!
//! Provides HTTP endpoints for submitting inspection, transform and
//! remote-image jobs, querying their status and downloading outputs.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;
mod upload;

pub use server::{ApiServer, ApiServerConfig, AppState};
