//! Install lifecycle orchestration
//!
//! [`InstallationService`] owns the in-memory status table. Every request is
//! validated and recorded synchronously, then the slow part (Helm, Argo CD,
//! waiting for pods) runs in a detached task that reports back into the table.
//! Status reads re-probe the cluster and refine what the task last wrote.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    AllStatusResponse, OperationKind, OperationResponse, OperationState, OperationStatus,
    PodCounts, RequestOutcome, StatusView,
};
use crate::services::deployment::Deployers;
use crate::services::k8s::{count_ready, count_running, ClusterProbe};
use crate::services::registry::{
    ComponentConfig, ComponentRegistry, CustomResourceRef, DeployStrategy,
};

/// Progress shown once the deployer has been invoked
const DEPLOY_STARTED_PROGRESS: u8 = 10;
/// Progress of an install whose pods exist but are not all ready yet
const AWAITING_PODS_PROGRESS: u8 = 90;

/// Progress while installing: 15 plus up to 70 for ready pods
pub fn pod_progress(ready: usize, expected: usize) -> u8 {
    let expected = expected.max(1);
    let share = (ready * 70 / expected).min(70);
    15 + share as u8
}

/// Progress of a completed install that has since lost ready pods; never 100
pub fn completion_progress(ready: usize, expected: usize) -> u8 {
    let expected = expected.max(1);
    let share = (ready * 14 / expected).min(14);
    85 + share as u8
}

/// Timing of background tasks
#[derive(Debug, Clone)]
pub struct InstallerSettings {
    pub poll_interval: Duration,
    /// How long a GitOps install waits for the controller to bring pods up
    pub readiness_timeout: Duration,
    /// Polls a Helm install waits after `--wait` returns
    pub helm_settle_polls: u32,
    pub argocd_namespace: String,
}

impl InstallerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.installer.poll_interval_secs.max(1)),
            readiness_timeout: Duration::from_secs(config.installer.readiness_timeout_secs),
            helm_settle_polls: 3,
            argocd_namespace: config.gitops.argocd_namespace.clone(),
        }
    }
}

/// Mutex-guarded map of the latest operation per component
#[derive(Clone, Default)]
pub struct StatusTable {
    inner: Arc<Mutex<HashMap<String, OperationStatus>>>,
}

impl StatusTable {
    pub fn get(&self, id: &str) -> Option<OperationStatus> {
        self.inner.lock().get(id).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, OperationStatus> {
        self.inner.lock().clone()
    }

    /// Entry of an operation whose task is still running
    fn active(&self, id: &str) -> Option<OperationStatus> {
        self.inner.lock().get(id).filter(|s| is_active(s)).cloned()
    }

    /// Record a new operation unless one is already running.
    ///
    /// On conflict the running entry is returned and the table is untouched.
    /// An install left `installing` by a finished task does not block.
    fn try_begin(
        &self,
        id: &str,
        kind: OperationKind,
        message: String,
    ) -> std::result::Result<Uuid, OperationStatus> {
        let mut table = self.inner.lock();
        if let Some(current) = table.get(id).filter(|s| is_active(s)) {
            return Err(current.clone());
        }

        let entry = OperationStatus::started(id, kind, message);
        let operation_id = entry.operation_id.unwrap_or_else(Uuid::new_v4);
        table.insert(id.to_string(), entry);
        Ok(operation_id)
    }

    /// Apply `f` only while the entry still belongs to `operation_id`
    fn update<F>(&self, id: &str, operation_id: Uuid, f: F) -> Option<OperationStatus>
    where
        F: FnOnce(&mut OperationStatus),
    {
        let mut table = self.inner.lock();
        let entry = table.get_mut(id)?;
        if entry.operation_id != Some(operation_id) {
            return None;
        }
        f(entry);
        Some(entry.clone())
    }
}

fn is_active(status: &OperationStatus) -> bool {
    status.status.is_in_progress() && !status.task_finished
}

/// Pods and services seen in a component's namespace
#[derive(Debug, Clone, Copy)]
struct Observation {
    ready: usize,
    running: usize,
    total: usize,
    services_ready: bool,
}

impl Observation {
    fn is_ready(&self, component: &ComponentConfig) -> bool {
        self.ready >= component.ready_threshold() && self.services_ready
    }

    fn pod_counts(&self) -> PodCounts {
        PodCounts {
            pods_running: self.running,
            total_pods: self.total,
        }
    }
}

#[derive(Clone)]
pub struct InstallationService {
    registry: Arc<ComponentRegistry>,
    probe: Arc<dyn ClusterProbe>,
    deployers: Deployers,
    table: StatusTable,
    settings: InstallerSettings,
}

impl InstallationService {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        probe: Arc<dyn ClusterProbe>,
        deployers: Deployers,
        settings: InstallerSettings,
    ) -> Self {
        Self {
            registry,
            probe,
            deployers,
            table: StatusTable::default(),
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    fn component(&self, id: &str) -> Result<ComponentConfig> {
        self.registry
            .lookup(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Unknown component: {}", id)))
    }

    fn ensure_uninstallable(&self, component: &ComponentConfig) -> Result<()> {
        if self.registry.can_uninstall(&component.id) {
            Ok(())
        } else {
            Err(AppError::Protected(format!(
                "{} is a protected component",
                component.display_name
            )))
        }
    }

    /// Start installing `id` with `overrides` merged into its values
    pub async fn install(&self, id: &str, overrides: Value) -> Result<OperationResponse> {
        let component = self.component(id)?;
        if !(overrides.is_null() || overrides.is_object()) {
            return Err(AppError::BadRequest(
                "Configuration must be a JSON object".to_string(),
            ));
        }

        let message = format!("Installation of {} started", component.display_name);
        let operation_id =
            match self
                .table
                .try_begin(id, OperationKind::Install, message.clone())
            {
                Ok(operation_id) => operation_id,
                Err(current) => return Ok(busy_response(&component, &current)),
            };

        tracing::info!(component = %id, operation_id = %operation_id, "Installation started");

        let service = self.clone();
        tokio::spawn(async move {
            service.run_install(component, operation_id, overrides).await;
        });

        Ok(started_response(id, message))
    }

    /// Start removing `id`
    pub async fn uninstall(&self, id: &str) -> Result<OperationResponse> {
        let component = self.component(id)?;
        self.ensure_uninstallable(&component)?;

        let message = format!("Uninstallation of {} started", component.display_name);
        let operation_id =
            match self
                .table
                .try_begin(id, OperationKind::Uninstall, message.clone())
            {
                Ok(operation_id) => operation_id,
                Err(current) => return Ok(busy_response(&component, &current)),
            };

        tracing::info!(component = %id, operation_id = %operation_id, "Uninstallation started");

        let service = self.clone();
        tokio::spawn(async move {
            service.run_uninstall(component, operation_id).await;
        });

        Ok(started_response(id, message))
    }

    /// Trigger a rolling restart of `id`'s workloads
    pub async fn restart(&self, id: &str) -> Result<OperationResponse> {
        let component = self.component(id)?;
        self.ensure_uninstallable(&component)?;

        // A running operation is acknowledged before the cluster is consulted
        if let Some(current) = self.table.active(id) {
            return Ok(busy_response(&component, &current));
        }

        let pods = self.probe.list_pods(&component.namespace).await?;
        if count_running(&pods) == 0 {
            return Err(AppError::BadRequest(format!(
                "{} is not installed, cannot restart",
                component.display_name
            )));
        }

        let message = format!("Restart of {} started", component.display_name);
        let operation_id =
            match self
                .table
                .try_begin(id, OperationKind::Restart, message.clone())
            {
                Ok(operation_id) => operation_id,
                Err(current) => return Ok(busy_response(&component, &current)),
            };

        tracing::info!(component = %id, operation_id = %operation_id, "Restart started");

        let service = self.clone();
        tokio::spawn(async move {
            service.run_restart(component, operation_id).await;
        });

        Ok(started_response(id, message))
    }

    /// Current status of `id`, refined against the live cluster
    pub async fn status(&self, id: &str) -> Result<StatusView> {
        let component = self.component(id)?;
        let stored = self.table.get(id);

        let observation = match self.observe(&component).await {
            Ok(observation) => observation,
            Err(e) => {
                tracing::debug!(component = %id, "Status probe failed: {}", e);
                let entry = stored.unwrap_or_else(|| {
                    OperationStatus::observed(
                        id,
                        OperationState::Error,
                        0,
                        format!("Error checking status: {}", e),
                    )
                });
                return Ok(StatusView::new(entry, None));
            }
        };
        let pods = Some(observation.pod_counts());

        let Some(entry) = stored else {
            let entry = self.observe_unmanaged(&component, &observation).await;
            return Ok(StatusView::new(entry, pods));
        };

        let state = entry.status;
        match state {
            OperationState::Installing => {
                let Some(operation_id) = entry.operation_id else {
                    return Ok(StatusView::new(entry, pods));
                };
                let progress = pod_progress(observation.ready, component.expected_pods);
                let promote = observation.is_ready(&component);
                let name = component.display_name.clone();

                let refined = self
                    .table
                    .update(id, operation_id, |s| {
                        if s.status != OperationState::Installing {
                            return;
                        }
                        if s.task_finished && promote {
                            s.status = OperationState::Completed;
                            s.progress = 100;
                            s.message = format!("{} installed successfully", name);
                            s.completed_at = Some(Utc::now());
                        } else {
                            s.progress = s.progress.max(progress);
                        }
                    })
                    .or_else(|| self.table.get(id))
                    .unwrap_or(entry);
                Ok(StatusView::new(refined, pods))
            }
            OperationState::Completed if observation.ready < component.ready_threshold() => {
                let mut shown = entry;
                shown.status = OperationState::Installing;
                shown.progress = completion_progress(observation.ready, component.expected_pods);
                shown.message = format!(
                    "{}/{} pods ready, waiting for {}",
                    observation.ready,
                    component.expected_pods,
                    component.ready_threshold()
                );
                Ok(StatusView::new(shown, pods))
            }
            _ => Ok(StatusView::new(entry, pods)),
        }
    }

    /// Every stored entry, unrefined
    pub fn all_statuses(&self) -> AllStatusResponse {
        let installations = self.table.snapshot();
        let count = installations.len();
        AllStatusResponse {
            installations,
            count,
        }
    }

    async fn observe(&self, component: &ComponentConfig) -> Result<Observation> {
        let pods = self.probe.list_pods(&component.namespace).await?;
        let ready = count_ready(&pods);

        let services_ready = if ready < component.ready_threshold() {
            false
        } else if component.service_hints.is_empty() {
            true
        } else {
            let services = self.probe.list_services(&component.namespace).await?;
            component
                .service_hints
                .iter()
                .all(|hint| services.iter().any(|s| s.contains(hint.as_str())))
        };

        Ok(Observation {
            ready,
            running: count_running(&pods),
            total: pods.len(),
            services_ready,
        })
    }

    /// Status of a component this process never touched
    async fn observe_unmanaged(
        &self,
        component: &ComponentConfig,
        observation: &Observation,
    ) -> OperationStatus {
        if let Some(ref app) = component.gitops_app {
            match self
                .probe
                .custom_resource_status(
                    &CustomResourceRef::argocd_application(),
                    &self.settings.argocd_namespace,
                    app,
                )
                .await
            {
                Ok(Some(status)) if status.is_healthy() => {
                    return OperationStatus::observed(
                        &component.id,
                        OperationState::Installed,
                        100,
                        format!("{} is installed", component.display_name),
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(component = %component.id, "Argo CD status check failed: {}", e)
                }
            }
        }

        let namespace_present = match self.probe.namespace_exists(&component.namespace).await {
            Ok(present) => present,
            Err(e) => {
                return OperationStatus::observed(
                    &component.id,
                    OperationState::Error,
                    0,
                    format!("Error checking status: {}", e),
                );
            }
        };

        if namespace_present && observation.running > 0 {
            OperationStatus::observed(
                &component.id,
                OperationState::Installed,
                100,
                format!("{} is installed", component.display_name),
            )
        } else {
            OperationStatus::observed(
                &component.id,
                OperationState::NotInstalled,
                0,
                format!("{} is not installed", component.display_name),
            )
        }
    }

    /// Write sampled pod progress; never lowers the stored value
    fn record_progress(&self, component: &ComponentConfig, operation_id: Uuid, obs: &Observation) {
        let progress = pod_progress(obs.ready, component.expected_pods);
        let message = format!("{}/{} pods ready", obs.ready, component.expected_pods);
        self.table.update(&component.id, operation_id, |s| {
            if s.status == OperationState::Installing {
                s.progress = s.progress.max(progress);
                s.message = message;
            }
        });
    }

    fn finish(
        &self,
        component: &ComponentConfig,
        operation_id: Uuid,
        status: OperationState,
        progress: u8,
        message: String,
    ) {
        tracing::info!(
            component = %component.id,
            operation_id = %operation_id,
            status = %status,
            "{}",
            message
        );
        self.table.update(&component.id, operation_id, |s| {
            s.status = status;
            s.progress = progress;
            s.message = message;
            s.completed_at = Some(Utc::now());
            s.task_finished = true;
        });
    }

    fn fail(&self, component: &ComponentConfig, operation_id: Uuid, message: String) {
        tracing::error!(component = %component.id, operation_id = %operation_id, "{}", message);
        self.finish(component, operation_id, OperationState::Error, 0, message);
    }

    async fn run_install(&self, component: ComponentConfig, operation_id: Uuid, overrides: Value) {
        self.table.update(&component.id, operation_id, |s| {
            s.progress = s.progress.max(DEPLOY_STARTED_PROGRESS);
            s.message = format!("Deploying {}", component.display_name);
        });

        let deployer = self.deployers.for_component(&component);
        let deploy = deployer.install(&component, &overrides);
        tokio::pin!(deploy);

        let mut pods_seen = false;
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        let result = loop {
            tokio::select! {
                result = &mut deploy => break result,
                _ = ticker.tick() => {
                    match self.observe(&component).await {
                        Ok(obs) => {
                            pods_seen |= obs.total > 0;
                            self.record_progress(&component, operation_id, &obs);
                        }
                        Err(e) => tracing::debug!(component = %component.id, "Progress probe failed: {}", e),
                    }
                }
            }
        };

        match result {
            Ok(true) => {}
            Ok(false) => {
                self.fail(
                    &component,
                    operation_id,
                    format!("Installation of {} failed", component.display_name),
                );
                return;
            }
            Err(e) => {
                self.fail(&component, operation_id, e.to_string());
                return;
            }
        }

        let window = match component.strategy {
            DeployStrategy::GitOps => self.settings.readiness_timeout,
            DeployStrategy::Helm => {
                self.settings.poll_interval * self.settings.helm_settle_polls
            }
        };

        if self
            .await_readiness(&component, operation_id, window, &mut pods_seen)
            .await
        {
            self.finish(
                &component,
                operation_id,
                OperationState::Completed,
                100,
                format!("{} installed successfully", component.display_name),
            );
        } else if pods_seen {
            self.table.update(&component.id, operation_id, |s| {
                s.progress = s.progress.max(AWAITING_PODS_PROGRESS);
                s.message = format!(
                    "{} deployed, waiting for pods to become ready",
                    component.display_name
                );
                s.task_finished = true;
            });
            tracing::warn!(
                component = %component.id,
                operation_id = %operation_id,
                "Deployed but not ready yet"
            );
        } else {
            self.fail(
                &component,
                operation_id,
                format!("No pods found for {} after deployment", component.display_name),
            );
        }
    }

    /// Poll until ready or `window` elapses; always checks at least once
    async fn await_readiness(
        &self,
        component: &ComponentConfig,
        operation_id: Uuid,
        window: Duration,
        pods_seen: &mut bool,
    ) -> bool {
        let deadline = Instant::now() + window;
        loop {
            match self.observe(component).await {
                Ok(obs) => {
                    *pods_seen |= obs.total > 0;
                    if obs.is_ready(component) {
                        return true;
                    }
                    self.record_progress(component, operation_id, &obs);
                }
                Err(e) => {
                    tracing::debug!(component = %component.id, "Readiness probe failed: {}", e)
                }
            }

            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn run_uninstall(&self, component: ComponentConfig, operation_id: Uuid) {
        self.table.update(&component.id, operation_id, |s| {
            s.progress = DEPLOY_STARTED_PROGRESS;
            s.message = format!("Removing {}", component.display_name);
        });

        let deployer = self.deployers.for_component(&component);
        match deployer.uninstall(&component).await {
            Ok(true) => self.finish(
                &component,
                operation_id,
                OperationState::NotInstalled,
                100,
                format!("{} uninstalled successfully", component.display_name),
            ),
            Ok(false) => self.fail(
                &component,
                operation_id,
                format!("Uninstallation of {} failed", component.display_name),
            ),
            Err(e) => self.fail(&component, operation_id, e.to_string()),
        }
    }

    async fn run_restart(&self, component: ComponentConfig, operation_id: Uuid) {
        self.table.update(&component.id, operation_id, |s| {
            s.progress = DEPLOY_STARTED_PROGRESS;
            s.message = format!("Restarting {}", component.display_name);
        });

        let deployer = self.deployers.for_component(&component);
        match deployer.restart(&component).await {
            Ok(true) => self.finish(
                &component,
                operation_id,
                OperationState::Completed,
                100,
                format!("Restart of {} triggered", component.display_name),
            ),
            Ok(false) => self.fail(
                &component,
                operation_id,
                format!("No workloads found to restart for {}", component.display_name),
            ),
            Err(e) => self.fail(&component, operation_id, e.to_string()),
        }
    }
}

fn started_response(id: &str, message: String) -> OperationResponse {
    OperationResponse {
        status: RequestOutcome::Started,
        message,
        component: id.to_string(),
        progress: 0,
    }
}

fn busy_response(component: &ComponentConfig, current: &OperationStatus) -> OperationResponse {
    let (status, message) = match current.status {
        OperationState::Installing => (
            RequestOutcome::AlreadyInstalling,
            format!("Installation of {} already in progress", component.display_name),
        ),
        other => (
            RequestOutcome::AlreadyProcessing,
            format!("{} is busy: {} in progress", component.display_name, other),
        ),
    };

    OperationResponse {
        status,
        message,
        component: component.id.clone(),
        progress: current.progress,
    }
}
