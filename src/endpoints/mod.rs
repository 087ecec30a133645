pub mod cluster;
pub mod install;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::config::CONFIG;
use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health_check))
        .route("/api/system/version", get(get_version))
        .nest("/install", install::install_routes(state.clone()))
        .merge(cluster::cluster_routes(state))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to Tharnax Web API" }))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Version info endpoint
async fn get_version() -> Json<Value> {
    Json(json!({
        "version": CONFIG.version,
        "commit_hash": CONFIG.commit_hash,
        "build_time": CONFIG.build_time,
    }))
}
