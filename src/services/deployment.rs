use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::gitops::GitOpsConfig;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::services::helm::{self, HelmRunner};
use crate::services::k8s::{dynamic_api, DisconnectedCluster};
use crate::services::registry::{ComponentConfig, CustomResourceRef, DeployStrategy};
use crate::services::storage::StorageProbe;
use crate::services::values::{application_manifest, render_values, to_yaml, ValuesContext};

/// Field manager used for server-side apply
const FIELD_MANAGER: &str = "tharnax";
const RESTARTED_AT: &str = "kubectl.kubernetes.io/restartedAt";

/// Puts a component onto the cluster, removes it, or restarts its workloads.
///
/// Only ever called from background tasks. `Ok(false)` means the action
/// ran but had nothing to act on.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn install(&self, component: &ComponentConfig, overrides: &Value) -> Result<bool>;

    async fn uninstall(&self, component: &ComponentConfig) -> Result<bool>;

    async fn restart(&self, component: &ComponentConfig) -> Result<bool>;
}

/// Host-side inputs shared by both strategies
#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub storage: StorageProbe,
    pub service_type: String,
    pub uninstall_settle: Duration,
    pub gitops: GitOpsConfig,
}

impl DeploySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            storage: StorageProbe::from_config(&config.storage),
            service_type: config.installer.service_type.clone(),
            uninstall_settle: Duration::from_secs(config.installer.uninstall_settle_secs),
            gitops: config.gitops.clone(),
        }
    }

    fn values_context(&self) -> ValuesContext {
        ValuesContext::new(self.storage.detect(), &self.service_type)
    }
}

/// Cluster-mutating operations common to every strategy
pub struct DeployContext {
    client: Client,
    helm: HelmRunner,
    settings: DeploySettings,
}

impl DeployContext {
    pub fn new(client: Client, helm: HelmRunner, settings: DeploySettings) -> Self {
        Self {
            client,
            helm,
            settings,
        }
    }

    /// Create the namespace unless it already exists
    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([(
                    "app.kubernetes.io/managed-by".to_string(),
                    FIELD_MANAGER.to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };

        match namespaces.create(&PostParams::default(), &namespace).await {
            Ok(_) => {
                tracing::info!(namespace = %name, "Created namespace");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn render(&self, component: &ComponentConfig, overrides: &Value) -> Value {
        let ctx = self.settings.values_context();
        tracing::debug!(
            component = %component.id,
            access_mode = ctx.storage.access_mode(),
            "Rendering values"
        );
        render_values(component, &ctx, overrides)
    }

    async fn delete_application(&self, component: &ComponentConfig) {
        let Some(ref app) = component.gitops_app else {
            return;
        };

        let api = dynamic_api(
            self.client.clone(),
            &CustomResourceRef::argocd_application(),
            &self.settings.gitops.argocd_namespace,
        );
        match api.delete(app, &DeleteParams::default()).await {
            Ok(_) => tracing::info!(component = %component.id, app = %app, "Deleted Argo CD application"),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(e) => tracing::warn!(component = %component.id, "Failed to delete Argo CD application: {}", e),
        }
    }

    async fn delete_pvcs(&self, namespace: &str) -> Result<()> {
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        pvcs.delete_collection(&DeleteParams::default(), &ListParams::default())
            .await?;
        Ok(())
    }

    async fn delete_custom_resources(&self, component: &ComponentConfig) {
        for resource in &component.cleanup_resources {
            let api = dynamic_api(self.client.clone(), resource, &component.namespace);
            match api
                .delete_collection(&DeleteParams::default(), &ListParams::default())
                .await
            {
                Ok(_) => {}
                // CRD already gone
                Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                Err(e) => tracing::warn!(
                    component = %component.id,
                    kind = %resource.kind,
                    "Failed to delete custom resources: {}",
                    e
                ),
            }
        }
    }

    /// Best-effort removal; the namespace itself is left in place
    async fn remove(&self, component: &ComponentConfig) -> Result<bool> {
        if !component.uninstallable {
            return Err(AppError::Protected(format!(
                "{} cannot be uninstalled",
                component.display_name
            )));
        }

        self.delete_application(component).await;

        if component.strategy == DeployStrategy::Helm {
            if let Err(e) = self.helm.run(&helm::uninstall_args(component), None).await {
                tracing::warn!(component = %component.id, "helm uninstall failed: {}", e);
            }
        }

        if let Err(e) = self.delete_pvcs(&component.namespace).await {
            tracing::warn!(component = %component.id, "Failed to delete PVCs: {}", e);
        }
        self.delete_custom_resources(component).await;

        tokio::time::sleep(self.settings.uninstall_settle).await;
        Ok(true)
    }

    /// Trigger a rolling restart of every Deployment and StatefulSet
    async fn rollout_restart(&self, component: &ComponentConfig) -> Result<bool> {
        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": { RESTARTED_AT: Utc::now().to_rfc3339() }
                    }
                }
            }
        });

        let deployments =
            restart_workloads::<Deployment>(self.client.clone(), &component.namespace, &patch)
                .await?;
        let statefulsets =
            restart_workloads::<StatefulSet>(self.client.clone(), &component.namespace, &patch)
                .await?;

        let total = deployments + statefulsets;
        tracing::info!(component = %component.id, workloads = total, "Rollout restart triggered");
        Ok(total > 0)
    }
}

/// Patch every workload of kind `K`; returns how many were found
async fn restart_workloads<K>(client: Client, namespace: &str, patch: &Value) -> Result<usize>
where
    K: kube::Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client, namespace);
    let list = api.list(&ListParams::default()).await?;

    for item in &list.items {
        let Some(name) = item.meta().name.as_deref() else {
            continue;
        };
        if let Err(e) = api
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
        {
            tracing::warn!(namespace = %namespace, workload = %name, "Failed to restart: {}", e);
        }
    }

    Ok(list.items.len())
}

/// Installs with `helm upgrade --install --wait`
pub struct HelmDeployer {
    ctx: Arc<DeployContext>,
}

impl HelmDeployer {
    pub fn new(ctx: Arc<DeployContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Deployer for HelmDeployer {
    async fn install(&self, component: &ComponentConfig, overrides: &Value) -> Result<bool> {
        self.ctx.ensure_namespace(&component.namespace).await?;

        let values = to_yaml(&self.ctx.render(component, overrides))?;

        self.ctx
            .helm
            .run(&helm::repo_add_args(component), None)
            .await?;

        let timeout = self.ctx.helm.timeout();
        self.ctx
            .helm
            .run(
                &helm::upgrade_args(component, timeout),
                Some(values.as_bytes()),
            )
            .await?;

        tracing::info!(component = %component.id, release = %component.release_name, "Helm release deployed");
        Ok(true)
    }

    async fn uninstall(&self, component: &ComponentConfig) -> Result<bool> {
        self.ctx.remove(component).await
    }

    async fn restart(&self, component: &ComponentConfig) -> Result<bool> {
        self.ctx.rollout_restart(component).await
    }
}

/// Installs by applying an Argo CD `Application`; the controller does the rest
pub struct GitOpsDeployer {
    ctx: Arc<DeployContext>,
}

impl GitOpsDeployer {
    pub fn new(ctx: Arc<DeployContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Deployer for GitOpsDeployer {
    async fn install(&self, component: &ComponentConfig, overrides: &Value) -> Result<bool> {
        self.ctx.ensure_namespace(&component.namespace).await?;

        let values = self.ctx.render(component, overrides);
        let manifest = application_manifest(component, &values, &self.ctx.settings.gitops)?;
        let application: DynamicObject = serde_json::from_value(manifest)?;
        let name = application
            .metadata
            .name
            .clone()
            .ok_or_else(|| AppError::Internal("Application manifest has no name".to_string()))?;

        let api = dynamic_api(
            self.ctx.client.clone(),
            &CustomResourceRef::argocd_application(),
            &self.ctx.settings.gitops.argocd_namespace,
        );
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&application),
        )
        .await?;

        tracing::info!(component = %component.id, app = %name, "Argo CD application applied");
        Ok(true)
    }

    async fn uninstall(&self, component: &ComponentConfig) -> Result<bool> {
        self.ctx.remove(component).await
    }

    async fn restart(&self, component: &ComponentConfig) -> Result<bool> {
        self.ctx.rollout_restart(component).await
    }
}

#[async_trait]
impl Deployer for DisconnectedCluster {
    async fn install(&self, _component: &ComponentConfig, _overrides: &Value) -> Result<bool> {
        Self::unavailable()
    }

    async fn uninstall(&self, _component: &ComponentConfig) -> Result<bool> {
        Self::unavailable()
    }

    async fn restart(&self, _component: &ComponentConfig) -> Result<bool> {
        Self::unavailable()
    }
}

/// One deployer per strategy
#[derive(Clone)]
pub struct Deployers {
    helm: Arc<dyn Deployer>,
    gitops: Arc<dyn Deployer>,
}

impl Deployers {
    pub fn new(helm: Arc<dyn Deployer>, gitops: Arc<dyn Deployer>) -> Self {
        Self { helm, gitops }
    }

    /// Same deployer for both strategies
    pub fn uniform(deployer: Arc<dyn Deployer>) -> Self {
        Self::new(deployer.clone(), deployer)
    }

    pub fn for_cluster(client: Client, config: &Config) -> Self {
        let ctx = Arc::new(DeployContext::new(
            client,
            HelmRunner::from_config(&config.helm),
            DeploySettings::from_config(config),
        ));
        Self::new(
            Arc::new(HelmDeployer::new(ctx.clone())),
            Arc::new(GitOpsDeployer::new(ctx)),
        )
    }

    pub fn disconnected() -> Self {
        Self::uniform(Arc::new(DisconnectedCluster))
    }

    pub fn for_component(&self, component: &ComponentConfig) -> Arc<dyn Deployer> {
        match component.strategy {
            DeployStrategy::Helm => self.helm.clone(),
            DeployStrategy::GitOps => self.gitops.clone(),
        }
    }
}
