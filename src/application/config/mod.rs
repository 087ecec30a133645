pub mod gitops;
pub mod helm;
pub mod installer;
pub mod kubernetes;
pub mod server;
pub mod storage;

use once_cell::sync::Lazy;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server: server::ServerConfig,
    pub kubernetes: kubernetes::KubernetesConfig,
    pub helm: helm::HelmConfig,
    pub gitops: gitops::GitOpsConfig,
    pub installer: installer::InstallerConfig,
    pub storage: storage::StorageConfig,

    // Build info
    pub commit_hash: String,
    pub build_time: String,
    pub version: String,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server: server::ServerConfig::from_env(),
            kubernetes: kubernetes::KubernetesConfig::from_env(),
            helm: helm::HelmConfig::from_env(),
            gitops: gitops::GitOpsConfig::from_env(),
            installer: installer::InstallerConfig::from_env(),
            storage: storage::StorageConfig::from_env(),

            // Build info
            commit_hash: env::var("COMMIT_HASH").unwrap_or_else(|_| "unknown".to_string()),
            build_time: env::var("BUILD_TIME").unwrap_or_else(|_| "unknown".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),

            // Logging
            log_level: env::var("THARNAX_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
