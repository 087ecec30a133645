//! Application bootstrapper
//!
//! Handles all initialization and setup for the Tharnax API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use http::HeaderValue;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CONFIG;
use crate::endpoints;
use crate::services::{
    ClusterProbe, ComponentRegistry, Deployers, DisconnectedCluster, InstallationService,
    InstallerSettings, K8sClient,
};
use crate::state::AppState;

/// Bootstrap and run the application
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting Tharnax API v{}", CONFIG.version);

    let state = init_services().await;
    let app = create_app(state, &CONFIG.server.allowed_origins);

    serve(app).await
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tharnax={},tower_http=info", CONFIG.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(false))
        .init();
}

/// Initialize all application services
async fn init_services() -> AppState {
    let registry = Arc::new(ComponentRegistry::builtin());
    tracing::info!(components = registry.len(), "Component registry loaded");

    let (probe, deployers) = init_kubernetes().await;
    let installer = InstallationService::new(
        registry,
        probe.clone(),
        deployers,
        InstallerSettings::from_config(&CONFIG),
    );

    AppState::new(installer, probe)
}

/// Initialize the Kubernetes client; without one every cluster call answers 503
async fn init_kubernetes() -> (Arc<dyn ClusterProbe>, Deployers) {
    match K8sClient::new().await {
        Ok(client) => {
            tracing::info!("Kubernetes client initialized");
            let deployers = Deployers::for_cluster(client.client().clone(), &CONFIG);
            let probe: Arc<dyn ClusterProbe> = Arc::new(client);
            (probe, deployers)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize Kubernetes client: {}. Install operations will be unavailable.",
                e
            );
            let probe: Arc<dyn ClusterProbe> = Arc::new(DisconnectedCluster);
            (probe, Deployers::disconnected())
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the main application router
pub fn create_app(state: AppState, allowed_origins: &[String]) -> Router {
    endpoints::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
}

/// Start the HTTP server
async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", CONFIG.server.host, CONFIG.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
