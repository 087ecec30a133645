use std::env;
use std::time::Duration;

/// Settings for direct Helm invocations
#[derive(Debug, Clone)]
pub struct HelmConfig {
    /// Helm executable (env: `THARNAX_HELM_BIN`)
    pub binary: String,
    /// Upper bound for a single `helm upgrade --install --wait` (env: `THARNAX_HELM_TIMEOUT_SECS`)
    pub timeout_secs: u64,
}

impl HelmConfig {
    pub fn from_env() -> Self {
        Self {
            binary: env::var("THARNAX_HELM_BIN").unwrap_or_else(|_| "helm".to_string()),
            timeout_secs: env::var("THARNAX_HELM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
