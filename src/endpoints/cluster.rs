use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::services::access::{self, AccessUrls};
use crate::services::registry::DeployStrategy;
use crate::state::AppState;

/// Create cluster overview routes
pub fn cluster_routes(state: AppState) -> Router {
    Router::new()
        .route("/apps", get(list_apps))
        .route("/status", get(cluster_status))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct AppEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    pub namespace: String,
    pub strategy: DeployStrategy,
    pub protected: bool,
    pub installed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub status_error: bool,
    #[serde(flatten)]
    pub access: AccessUrls,
}

/// Registry listing with an installed flag based on namespace presence and
/// the URLs of installed web UIs
async fn list_apps(State(state): State<AppState>) -> Json<Vec<AppEntry>> {
    let mut apps = Vec::with_capacity(state.registry.len());

    for component in state.registry.all() {
        let probed = state.probe.namespace_exists(&component.namespace).await;
        let (installed, status_error) = match probed {
            Ok(present) => (present, false),
            Err(e) => {
                tracing::warn!(component = %component.id, "Could not check namespace: {}", e);
                (false, true)
            }
        };

        let access = if installed {
            access::discover(state.probe.as_ref(), component).await
        } else {
            AccessUrls::default()
        };

        apps.push(AppEntry {
            id: component.id.clone(),
            name: component.display_name.clone(),
            description: component.description.clone(),
            namespace: component.namespace.clone(),
            strategy: component.strategy,
            protected: !component.uninstallable,
            installed,
            status_error,
            access,
        });
    }

    Json(apps)
}

/// Node and pod overview of the cluster
async fn cluster_status(State(state): State<AppState>) -> Json<Value> {
    match state.probe.cluster_summary().await {
        Ok(summary) => Json(json!({
            "status": "running",
            "node_count": summary.node_count,
            "kubelet_version": summary.kubelet_version,
            "pod_count": summary.pod_count,
        })),
        Err(e) => Json(json!({
            "status": "error",
            "message": e.to_string(),
        })),
    }
}
