//! Logging API routes.
//!
//! View and change the active log filter at runtime.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::logging::available_modules;

/// Request body for updating the log filter.
#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

/// Response for logging configuration.
#[derive(Debug, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
    pub available_modules: Vec<ModuleInfo>,
}

/// Information about an available logging module.
#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
}

/// Create the logging router.
pub fn router() -> Router<AppState> {
    Router::new().route("/filter", get(get_logging_config).put(update_logging_config))
}

fn config_response(filter: String) -> LoggingConfigResponse {
    let modules: Vec<ModuleInfo> = available_modules()
        .into_iter()
        .map(|(name, desc)| ModuleInfo {
            name: name.to_string(),
            description: desc.to_string(),
        })
        .collect();

    LoggingConfigResponse {
        filter,
        available_modules: modules,
    }
}

pub async fn get_logging_config(
    State(state): State<AppState>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;

    Ok(Json(config_response(logging_config.get_filter())))
}

pub async fn update_logging_config(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;

    logging_config.set_filter(&request.filter)?;

    Ok(Json(config_response(logging_config.get_filter())))
}
