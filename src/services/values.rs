//! Helm values and Argo CD `Application` manifests
//!
//! Everything here is a pure function of its inputs so that re-running an
//! install with the same settings produces the same release.

use serde_json::{json, Map, Value};

use crate::config::gitops::GitOpsConfig;
use crate::error::{AppError, Result};
use crate::services::registry::{ComponentConfig, ValuesProfile};
use crate::services::storage::StorageMode;

/// Retention windows for the monitoring stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retention {
    pub metrics: String,
    pub alerts: String,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            metrics: "15d".to_string(),
            alerts: "120h".to_string(),
        }
    }
}

/// Inputs that parameterize every generated values document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesContext {
    pub storage: StorageMode,
    pub service_type: String,
    pub retention: Retention,
}

impl ValuesContext {
    pub fn new(storage: StorageMode, service_type: &str) -> Self {
        Self {
            storage,
            service_type: service_type.to_string(),
            retention: Retention::default(),
        }
    }
}

fn resources(component: &ComponentConfig) -> Value {
    let r = &component.resources;
    json!({
        "requests": {"cpu": r.cpu_request, "memory": r.memory_request},
        "limits": {"cpu": r.cpu_limit, "memory": r.memory_limit},
    })
}

/// Generated values for a component, before user overrides
pub fn build_values(component: &ComponentConfig, ctx: &ValuesContext) -> Value {
    let access_mode = ctx.storage.access_mode();

    match component.values_profile {
        ValuesProfile::MonitoringStack => json!({
            "grafana": {
                "service": {"type": ctx.service_type, "port": 80},
                "persistence": {
                    "enabled": true,
                    "accessModes": [access_mode],
                    "size": "5Gi",
                },
                "resources": resources(component),
            },
            "prometheus": {
                "service": {"type": ctx.service_type},
                "prometheusSpec": {
                    "retention": ctx.retention.metrics,
                    "resources": resources(component),
                    "serviceMonitorSelectorNilUsesHelmValues": false,
                    "storageSpec": {
                        "volumeClaimTemplate": {
                            "spec": {
                                "accessModes": [access_mode],
                                "resources": {"requests": {"storage": "20Gi"}},
                            }
                        }
                    },
                },
            },
            "alertmanager": {
                "alertmanagerSpec": {
                    "retention": ctx.retention.alerts,
                    "storage": {
                        "volumeClaimTemplate": {
                            "spec": {
                                "accessModes": [access_mode],
                                "resources": {"requests": {"storage": "2Gi"}},
                            }
                        }
                    },
                },
            },
        }),
        ValuesProfile::MediaServer => json!({
            "service": {"type": ctx.service_type, "port": 8096},
            "persistence": {
                "config": {"enabled": true, "accessMode": access_mode, "size": "5Gi"},
                "media": {"enabled": true, "accessMode": access_mode, "size": "50Gi"},
            },
            "resources": resources(component),
        }),
        ValuesProfile::GitOpsController => json!({
            "server": {
                "service": {"type": ctx.service_type},
                "resources": resources(component),
            },
            "configs": {
                "params": {"server.insecure": true},
            },
        }),
        ValuesProfile::Generic => json!({
            "service": {"type": ctx.service_type},
            "resources": resources(component),
        }),
    }
}

/// Deep-merge `overrides` into `base`; objects merge key by key, anything else replaces
pub fn merge_values(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) if !overrides.is_null() => *base = overrides.clone(),
        _ => {}
    }
}

/// Generated values with the request's config map merged on top
pub fn render_values(
    component: &ComponentConfig,
    ctx: &ValuesContext,
    overrides: &Value,
) -> Value {
    let mut values = build_values(component, ctx);
    merge_values(&mut values, overrides);
    values
}

pub fn to_yaml(values: &Value) -> Result<String> {
    Ok(serde_yaml::to_string(values)?)
}

/// Argo CD `Application` that installs the component's chart with `values`
pub fn application_manifest(
    component: &ComponentConfig,
    values: &Value,
    gitops: &GitOpsConfig,
) -> Result<Value> {
    let name = component.gitops_app.as_deref().ok_or_else(|| {
        AppError::Internal(format!(
            "Component '{}' has no Argo CD application name",
            component.id
        ))
    })?;

    let mut labels = Map::new();
    labels.insert("app.kubernetes.io/managed-by".to_string(), json!("tharnax"));
    labels.insert("tharnax.io/component".to_string(), json!(component.id));

    Ok(json!({
        "apiVersion": "argoproj.io/v1alpha1",
        "kind": "Application",
        "metadata": {
            "name": name,
            "namespace": gitops.argocd_namespace,
            "labels": labels,
            "finalizers": ["resources-finalizer.argocd.argoproj.io"],
        },
        "spec": {
            "project": gitops.project,
            "source": {
                "repoURL": component.chart.repo_url,
                "chart": component.chart.chart,
                "targetRevision": component.chart.version,
                "helm": {
                    "releaseName": component.release_name,
                    "values": to_yaml(values)?,
                },
            },
            "destination": {
                "server": gitops.destination_server,
                "namespace": component.namespace,
            },
            "syncPolicy": {
                "automated": {"prune": true, "selfHeal": true},
                "syncOptions": ["CreateNamespace=true", "ServerSideApply=true"],
            },
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::registry::ComponentRegistry;

    fn gitops() -> GitOpsConfig {
        GitOpsConfig {
            argocd_namespace: "argocd".to_string(),
            destination_server: "https://kubernetes.default.svc".to_string(),
            project: "default".to_string(),
        }
    }

    #[test]
    fn test_values_are_deterministic() {
        let registry = ComponentRegistry::builtin();
        let monitoring = registry.lookup("monitoring").unwrap();
        let ctx = ValuesContext::new(StorageMode::Shared, "LoadBalancer");

        let first = to_yaml(&build_values(monitoring, &ctx)).unwrap();
        let second = to_yaml(&build_values(monitoring, &ctx)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_storage_mode_changes_access_mode() {
        let registry = ComponentRegistry::builtin();
        let jellyfin = registry.lookup("jellyfin").unwrap();

        let shared = build_values(jellyfin, &ValuesContext::new(StorageMode::Shared, "ClusterIP"));
        let single = build_values(
            jellyfin,
            &ValuesContext::new(StorageMode::SingleWriter, "ClusterIP"),
        );

        assert_eq!(shared["persistence"]["media"]["accessMode"], "ReadWriteMany");
        assert_eq!(single["persistence"]["media"]["accessMode"], "ReadWriteOnce");
        assert_eq!(shared["service"]["type"], "ClusterIP");
    }

    #[test]
    fn test_monitoring_retention() {
        let registry = ComponentRegistry::builtin();
        let monitoring = registry.lookup("monitoring").unwrap();
        let values = build_values(
            monitoring,
            &ValuesContext::new(StorageMode::SingleWriter, "LoadBalancer"),
        );

        assert_eq!(values["prometheus"]["prometheusSpec"]["retention"], "15d");
        assert_eq!(values["alertmanager"]["alertmanagerSpec"]["retention"], "120h");
        assert_eq!(
            values["prometheus"]["prometheusSpec"]["storageSpec"]["volumeClaimTemplate"]["spec"]
                ["accessModes"][0],
            "ReadWriteOnce"
        );
    }

    #[test]
    fn test_merge_values_nested() {
        let mut base = json!({"service": {"type": "LoadBalancer", "port": 80}, "keep": 1});
        merge_values(
            &mut base,
            &json!({"service": {"type": "NodePort"}, "extra": {"a": true}}),
        );

        assert_eq!(base["service"]["type"], "NodePort");
        assert_eq!(base["service"]["port"], 80);
        assert_eq!(base["keep"], 1);
        assert_eq!(base["extra"]["a"], true);
    }

    #[test]
    fn test_merge_null_overrides_is_noop() {
        let mut base = json!({"a": 1});
        merge_values(&mut base, &Value::Null);
        assert_eq!(base, json!({"a": 1}));
    }

    #[test]
    fn test_application_manifest() {
        let registry = ComponentRegistry::builtin();
        let monitoring = registry.lookup("monitoring").unwrap();
        let values = build_values(
            monitoring,
            &ValuesContext::new(StorageMode::Shared, "LoadBalancer"),
        );

        let manifest = application_manifest(monitoring, &values, &gitops()).unwrap();
        assert_eq!(manifest["kind"], "Application");
        assert_eq!(manifest["metadata"]["namespace"], "argocd");
        assert_eq!(manifest["spec"]["source"]["chart"], "kube-prometheus-stack");
        assert_eq!(manifest["spec"]["destination"]["namespace"], "monitoring");

        let embedded = manifest["spec"]["source"]["helm"]["values"].as_str().unwrap();
        let parsed: Value = serde_yaml::from_str(embedded).unwrap();
        assert_eq!(parsed, values);
    }

    #[test]
    fn test_application_manifest_requires_app_name() {
        let registry = ComponentRegistry::builtin();
        let jellyfin = registry.lookup("jellyfin").unwrap();
        let err = application_manifest(jellyfin, &json!({}), &gitops()).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
