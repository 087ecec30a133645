use std::sync::Arc;

use crate::services::installer::InstallationService;
use crate::services::k8s::ClusterProbe;
use crate::services::registry::ComponentRegistry;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub installer: InstallationService,
    pub probe: Arc<dyn ClusterProbe>,
    pub registry: Arc<ComponentRegistry>,
}

impl AppState {
    pub fn new(installer: InstallationService, probe: Arc<dyn ClusterProbe>) -> Self {
        let registry = installer.registry().clone();
        Self {
            installer,
            probe,
            registry,
        }
    }
}
