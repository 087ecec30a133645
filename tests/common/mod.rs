//! Test helpers for installer and endpoint integration tests.
//!
//! Provides a scripted in-memory cluster, a controllable deployer and a small
//! registry of test components so background tasks finish in milliseconds.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use tharnax::endpoints::create_router;
use tharnax::error::{AppError, Result};
use tharnax::models::{OperationState, StatusView};
use tharnax::services::{
    AccessPoint, ChartSource, ClusterProbe, ClusterSummary, ComponentConfig, ComponentRegistry,
    CustomResourceRef, CustomResourceStatus, Deployer, Deployers, InstallationService,
    InstallerSettings, PodState, ServiceEndpoint,
};
use tharnax::state::AppState;

// ============================================================================
// Pods
// ============================================================================

pub fn ready_pod(name: &str) -> PodState {
    PodState {
        name: name.to_string(),
        phase: "Running".to_string(),
        containers_ready: true,
    }
}

pub fn unready_pod(name: &str) -> PodState {
    PodState {
        name: name.to_string(),
        phase: "Running".to_string(),
        containers_ready: false,
    }
}

pub fn pending_pod(name: &str) -> PodState {
    PodState {
        name: name.to_string(),
        phase: "Pending".to_string(),
        containers_ready: false,
    }
}

// ============================================================================
// FakeCluster
// ============================================================================

/// In-memory cluster whose pod lists can be fixed or scripted per namespace
#[derive(Default)]
pub struct FakeCluster {
    /// Each list call pops the front; the last snapshot stays
    pods: Mutex<HashMap<String, VecDeque<Vec<PodState>>>>,
    services: Mutex<HashMap<String, Vec<ServiceEndpoint>>>,
    node_ip: Mutex<Option<String>>,
    namespaces: Mutex<HashSet<String>>,
    healthy_apps: Mutex<HashSet<String>>,
    failing: AtomicBool,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_pods(&self, namespace: &str, pods: Vec<PodState>) {
        self.pods
            .lock()
            .insert(namespace.to_string(), VecDeque::from(vec![pods]));
    }

    pub fn script_pods(&self, namespace: &str, snapshots: Vec<Vec<PodState>>) {
        self.pods
            .lock()
            .insert(namespace.to_string(), VecDeque::from(snapshots));
    }

    /// Replace the namespace's services with plain ClusterIP ones
    pub fn set_services(&self, namespace: &str, services: &[&str]) {
        self.services.lock().insert(
            namespace.to_string(),
            services
                .iter()
                .map(|name| ServiceEndpoint {
                    name: name.to_string(),
                    service_type: "ClusterIP".to_string(),
                    ingress_ip: None,
                })
                .collect(),
        );
    }

    /// Add a LoadBalancer service; `None` leaves its ingress pending
    pub fn add_load_balancer(&self, namespace: &str, name: &str, ingress_ip: Option<&str>) {
        self.services
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .push(ServiceEndpoint {
                name: name.to_string(),
                service_type: "LoadBalancer".to_string(),
                ingress_ip: ingress_ip.map(str::to_string),
            });
    }

    pub fn set_node_ip(&self, ip: &str) {
        *self.node_ip.lock() = Some(ip.to_string());
    }

    pub fn add_namespace(&self, namespace: &str) {
        self.namespaces.lock().insert(namespace.to_string());
    }

    pub fn set_app_healthy(&self, app: &str) {
        self.healthy_apps.lock().insert(app.to_string());
    }

    /// Make every probe call fail as if the API server were unreachable
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AppError::ServiceUnavailable(
                "connection refused".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClusterProbe for FakeCluster {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodState>> {
        self.check()?;
        let mut pods = self.pods.lock();
        let Some(queue) = pods.get_mut(namespace) else {
            return Ok(Vec::new());
        };
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or_default())
        } else {
            Ok(queue.front().cloned().unwrap_or_default())
        }
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<String>> {
        Ok(self
            .service_endpoints(namespace)
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    async fn service_endpoints(&self, namespace: &str) -> Result<Vec<ServiceEndpoint>> {
        self.check()?;
        Ok(self
            .services
            .lock()
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn node_internal_ip(&self) -> Result<Option<String>> {
        self.check()?;
        Ok(self.node_ip.lock().clone())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        self.check()?;
        Ok(self.namespaces.lock().contains(name))
    }

    async fn custom_resource_status(
        &self,
        _resource: &CustomResourceRef,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<CustomResourceStatus>> {
        self.check()?;
        if self.healthy_apps.lock().contains(name) {
            Ok(Some(CustomResourceStatus {
                health_status: Some("Healthy".to_string()),
                sync_status: Some("Synced".to_string()),
            }))
        } else {
            Ok(None)
        }
    }

    async fn cluster_summary(&self) -> Result<ClusterSummary> {
        self.check()?;
        let pod_count = self.pods.lock().values().filter_map(|q| q.back()).map(Vec::len).sum();
        Ok(ClusterSummary {
            node_count: 1,
            kubelet_version: "v1.31.4+k3s1".to_string(),
            pod_count,
        })
    }
}

// ============================================================================
// FakeDeployer
// ============================================================================

/// Deployer with a configurable result, call counters and an optional gate
#[derive(Default)]
pub struct FakeDeployer {
    pub install_calls: AtomicUsize,
    pub uninstall_calls: AtomicUsize,
    pub restart_calls: AtomicUsize,
    result: Mutex<Option<std::result::Result<bool, String>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    last_overrides: Mutex<Option<Value>>,
}

impl FakeDeployer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call returns `Err(AppError::Deployer(message))`
    pub fn fail_with(&self, message: &str) {
        *self.result.lock() = Some(Err(message.to_string()));
    }

    pub fn return_value(&self, value: bool) {
        *self.result.lock() = Some(Ok(value));
    }

    /// Hold every call until [`FakeDeployer::release`]
    pub fn hold(&self) {
        *self.gate.lock() = Some(Arc::new(Notify::new()));
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn installs(&self) -> usize {
        self.install_calls.load(Ordering::SeqCst)
    }

    pub fn uninstalls(&self) -> usize {
        self.uninstall_calls.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.restart_calls.load(Ordering::SeqCst)
    }

    pub fn last_overrides(&self) -> Option<Value> {
        self.last_overrides.lock().clone()
    }

    async fn outcome(&self) -> Result<bool> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.result.lock().clone() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(AppError::Deployer(message)),
            None => Ok(true),
        }
    }
}

#[async_trait]
impl Deployer for FakeDeployer {
    async fn install(&self, _component: &ComponentConfig, overrides: &Value) -> Result<bool> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_overrides.lock() = Some(overrides.clone());
        self.outcome().await
    }

    async fn uninstall(&self, _component: &ComponentConfig) -> Result<bool> {
        self.uninstall_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome().await
    }

    async fn restart(&self, _component: &ComponentConfig) -> Result<bool> {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome().await
    }
}

// ============================================================================
// Registry and service builders
// ============================================================================

fn chart(name: &str) -> ChartSource {
    ChartSource {
        repo_name: "test".to_string(),
        repo_url: "https://charts.example.invalid".to_string(),
        chart: name.to_string(),
        version: "1.0.0".to_string(),
    }
}

/// `sample` (Helm, 2 pods, one UI on `sample-web`), `sample-gitops` (GitOps,
/// 4 pods at 0.75, needs a `web` service, two UIs) and `locked` (protected)
pub fn test_registry() -> ComponentRegistry {
    ComponentRegistry::new(vec![
        ComponentConfig::helm("sample", "Sample", chart("sample"))
            .with_expected_pods(2, 1.0)
            .with_access(vec![
                AccessPoint::new("web", "sample-web", 8080).load_balancer_port(8080)
            ]),
        ComponentConfig::helm("sample-gitops", "Sample GitOps", chart("sample-gitops"))
            .via_gitops("sample-gitops")
            .with_expected_pods(4, 0.75)
            .with_service_hints(&["web"])
            .with_access(vec![
                AccessPoint::new("dashboard", "dashboard", 3000),
                AccessPoint::new("metrics", "metrics", 9090)
                    .load_balancer_port(9090)
                    .excluding("operated"),
            ]),
        ComponentConfig::helm("locked", "Locked", chart("locked")).protected(),
    ])
}

pub fn test_settings() -> InstallerSettings {
    InstallerSettings {
        poll_interval: Duration::from_millis(10),
        readiness_timeout: Duration::from_millis(200),
        helm_settle_polls: 2,
        argocd_namespace: "argocd".to_string(),
    }
}

pub fn build_service(cluster: Arc<FakeCluster>, deployer: Arc<FakeDeployer>) -> InstallationService {
    InstallationService::new(
        Arc::new(test_registry()),
        cluster,
        Deployers::uniform(deployer),
        test_settings(),
    )
}

pub fn build_app_state(cluster: Arc<FakeCluster>, deployer: Arc<FakeDeployer>) -> AppState {
    let service = build_service(cluster.clone(), deployer);
    AppState::new(service, cluster)
}

pub fn build_app(cluster: Arc<FakeCluster>, deployer: Arc<FakeDeployer>) -> Router {
    create_router(build_app_state(cluster, deployer))
}

// ============================================================================
// Waiting
// ============================================================================

/// Poll `check` until it yields a value or two seconds pass
pub async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(value) = check().await {
            return value;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the stored entry for `id` reaches `state`
pub async fn wait_for_stored(service: &InstallationService, id: &str, state: OperationState) {
    eventually(move || async move {
        service
            .all_statuses()
            .installations
            .get(id)
            .filter(|s| s.status == state)
            .map(|_| ())
    })
    .await
}

/// Wait until a status read reports `state`
pub async fn wait_for_status(
    service: &InstallationService,
    id: &str,
    state: OperationState,
) -> StatusView {
    eventually(move || async move {
        let view = service.status(id).await.ok()?;
        (view.operation.status == state).then_some(view)
    })
    .await
}
