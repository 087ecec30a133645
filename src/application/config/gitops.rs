use std::env;

#[derive(Debug, Clone)]
pub struct GitOpsConfig {
    /// Namespace Argo CD watches for `Application` objects (env: `THARNAX_ARGOCD_NAMESPACE`)
    pub argocd_namespace: String,
    /// Cluster the generated applications deploy into
    pub destination_server: String,
    /// Argo CD project the generated applications belong to
    pub project: String,
}

impl GitOpsConfig {
    pub fn from_env() -> Self {
        Self {
            argocd_namespace: env::var("THARNAX_ARGOCD_NAMESPACE")
                .unwrap_or_else(|_| "argocd".to_string()),
            destination_server: env::var("THARNAX_ARGOCD_DESTINATION")
                .unwrap_or_else(|_| "https://kubernetes.default.svc".to_string()),
            project: env::var("THARNAX_ARGOCD_PROJECT").unwrap_or_else(|_| "default".to_string()),
        }
    }
}
