use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use crate::error::Result;
use crate::models::{AllStatusResponse, OperationResponse, StatusView};
use crate::state::AppState;

/// Create install routes
pub fn install_routes(state: AppState) -> Router {
    Router::new()
        .route("/status/all", get(get_all_statuses))
        .route("/{component}", post(install_component).delete(uninstall_component))
        .route("/{component}/restart", post(restart_component))
        .route("/{component}/status", get(get_component_status))
        .with_state(state)
}

/// Start installing a component; the optional body is merged into its Helm values
async fn install_component(
    State(state): State<AppState>,
    Path(component): Path<String>,
    config: Option<Json<Value>>,
) -> Result<Json<OperationResponse>> {
    let overrides = config.map(|Json(v)| v).unwrap_or(Value::Null);
    let response = state.installer.install(&component, overrides).await?;
    Ok(Json(response))
}

async fn uninstall_component(
    State(state): State<AppState>,
    Path(component): Path<String>,
) -> Result<Json<OperationResponse>> {
    let response = state.installer.uninstall(&component).await?;
    Ok(Json(response))
}

async fn restart_component(
    State(state): State<AppState>,
    Path(component): Path<String>,
) -> Result<Json<OperationResponse>> {
    let response = state.installer.restart(&component).await?;
    Ok(Json(response))
}

/// Status of one component, refined against live pod state
async fn get_component_status(
    State(state): State<AppState>,
    Path(component): Path<String>,
) -> Result<Json<StatusView>> {
    let status = state.installer.status(&component).await?;
    Ok(Json(status))
}

async fn get_all_statuses(State(state): State<AppState>) -> Json<AllStatusResponse> {
    Json(state.installer.all_statuses())
}
