//! Tests for configuration module

use std::time::Duration;

use tharnax::config::{Config, CONFIG};
use tharnax::services::InstallerSettings;

#[test]
fn test_config_defaults() {
    // Create a config with defaults (env vars not set).
    // Config uses nested sub-configs: server, kubernetes, helm, gitops, installer, storage.
    let config = Config::from_env();

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8000);
    assert!(config.server.allowed_origins.is_empty());
    assert!(!config.kubernetes.in_cluster);
    assert_eq!(config.helm.binary, "helm");
    assert_eq!(config.helm.timeout(), Duration::from_secs(900));
    assert_eq!(config.gitops.argocd_namespace, "argocd");
    assert_eq!(config.installer.poll_interval_secs, 5);
    assert_eq!(config.installer.readiness_timeout_secs, 900);
    assert_eq!(config.installer.service_type, "LoadBalancer");
}

#[test]
fn test_storage_defaults() {
    let config = Config::from_env();

    assert_eq!(config.storage.exports_file.to_str(), Some("/etc/exports"));
    assert_eq!(config.storage.candidate_dirs.len(), 4);
    assert!(config
        .storage
        .candidate_dirs
        .iter()
        .any(|d| d.ends_with("nfs")));
}

#[test]
fn test_installer_settings_from_config() {
    let config = Config::from_env();
    let settings = InstallerSettings::from_config(&config);

    assert_eq!(settings.poll_interval, Duration::from_secs(5));
    assert_eq!(settings.readiness_timeout, Duration::from_secs(900));
    assert_eq!(settings.argocd_namespace, "argocd");
}

#[test]
fn test_version_from_cargo() {
    let config = Config::from_env();
    // Version should be set from Cargo.toml
    assert!(!config.version.is_empty());
    assert!(config.version.contains('.'));
}

#[test]
fn test_config_debug() {
    let config = Config::from_env();
    let debug_str = format!("{:?}", config);

    // Debug output should contain field names from nested sub-configs
    assert!(debug_str.contains("host"));
    assert!(debug_str.contains("argocd_namespace"));
    assert!(debug_str.contains("poll_interval_secs"));
}

#[test]
fn test_lazy_static_config() {
    // CONFIG should be initialized with a non-empty host
    assert!(!CONFIG.server.host.is_empty());
    assert!(!CONFIG.log_level.is_empty());
}
