use std::env;

/// Timing knobs for the install orchestrator
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Seconds between pod readiness samples (env: `THARNAX_POLL_INTERVAL_SECS`)
    pub poll_interval_secs: u64,
    /// How long an Argo CD backed install may take to become ready
    /// (env: `THARNAX_READINESS_TIMEOUT_SECS`)
    pub readiness_timeout_secs: u64,
    /// Pause after uninstall cleanup (env: `THARNAX_UNINSTALL_SETTLE_SECS`)
    pub uninstall_settle_secs: u64,
    /// Service type exposed by generated Helm values (env: `THARNAX_SERVICE_TYPE`)
    pub service_type: String,
}

impl InstallerConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval_secs: env::var("THARNAX_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            readiness_timeout_secs: env::var("THARNAX_READINESS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900),
            uninstall_settle_secs: env::var("THARNAX_UNINSTALL_SETTLE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            service_type: env::var("THARNAX_SERVICE_TYPE")
                .unwrap_or_else(|_| "LoadBalancer".to_string()),
        }
    }
}
