use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service};
use kube::{
    api::{Api, ApiResource, DynamicObject, ListParams},
    config::{Config, KubeConfigOptions, Kubeconfig},
    core::GroupVersionKind,
    Client,
};
use serde::Serialize;

use crate::config::CONFIG;
use crate::error::{AppError, Result};
use crate::services::registry::CustomResourceRef;

/// Phase and readiness of a single pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodState {
    pub name: String,
    pub phase: String,
    pub containers_ready: bool,
}

impl PodState {
    pub fn is_running(&self) -> bool {
        self.phase == "Running"
    }

    /// Running with every container passing its readiness probe
    pub fn is_ready(&self) -> bool {
        self.is_running() && self.containers_ready
    }
}

/// Health and sync status reported on an Argo CD style object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomResourceStatus {
    pub health_status: Option<String>,
    pub sync_status: Option<String>,
}

impl CustomResourceStatus {
    pub fn is_healthy(&self) -> bool {
        self.health_status.as_deref() == Some("Healthy")
    }
}

/// How a service is exposed outside the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub service_type: String,
    /// First LoadBalancer ingress IP, once assigned
    pub ingress_ip: Option<String>,
}

impl ServiceEndpoint {
    pub fn is_load_balancer(&self) -> bool {
        self.service_type == "LoadBalancer"
    }
}

/// Cluster-wide overview
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub node_count: usize,
    pub kubelet_version: String,
    pub pod_count: usize,
}

/// Read-only view of cluster state.
///
/// Every call may fail while the cluster is unreachable; callers treat
/// failures as "unknown, retry later".
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodState>>;

    async fn list_services(&self, namespace: &str) -> Result<Vec<String>>;

    async fn service_endpoints(&self, namespace: &str) -> Result<Vec<ServiceEndpoint>>;

    /// `InternalIP` of the first node, used when no ingress IP is assigned
    async fn node_internal_ip(&self) -> Result<Option<String>>;

    async fn namespace_exists(&self, name: &str) -> Result<bool>;

    /// `None` when the object does not exist
    async fn custom_resource_status(
        &self,
        resource: &CustomResourceRef,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CustomResourceStatus>>;

    async fn cluster_summary(&self) -> Result<ClusterSummary>;
}

pub fn count_ready(pods: &[PodState]) -> usize {
    pods.iter().filter(|p| p.is_ready()).count()
}

pub fn count_running(pods: &[PodState]) -> usize {
    pods.iter().filter(|p| p.is_running()).count()
}

/// Kubernetes client manager
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Create a new Kubernetes client
    pub async fn new() -> Result<Self> {
        let client = if CONFIG.kubernetes.in_cluster {
            let config = Config::incluster()?;
            Client::try_from(config)?
        } else if let Some(ref kubeconfig_path) = CONFIG.kubernetes.kubeconfig_path {
            let kubeconfig = Kubeconfig::read_from(kubeconfig_path)?;
            let config =
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
            Client::try_from(config)?
        } else {
            Client::try_default().await?
        };

        Ok(Self { client })
    }

    /// Get the Kubernetes client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Dynamic API handle for a namespaced custom resource
    pub fn custom_api(&self, resource: &CustomResourceRef, namespace: &str) -> Api<DynamicObject> {
        dynamic_api(self.client.clone(), resource, namespace)
    }
}

/// Dynamic API handle for a namespaced custom resource
pub fn dynamic_api(
    client: Client,
    resource: &CustomResourceRef,
    namespace: &str,
) -> Api<DynamicObject> {
    let gvk = GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind);
    let api_resource = ApiResource::from_gvk_with_plural(&gvk, &resource.plural);
    Api::namespaced_with(client, namespace, &api_resource)
}

fn pod_state(pod: Pod) -> PodState {
    let name = pod.metadata.name.unwrap_or_default();
    let status = pod.status.unwrap_or_default();

    let containers_ready = status
        .container_statuses
        .as_ref()
        .map(|cs| !cs.is_empty() && cs.iter().all(|c| c.ready))
        .unwrap_or(false);

    PodState {
        name,
        phase: status.phase.unwrap_or_else(|| "Unknown".to_string()),
        containers_ready,
    }
}

fn service_endpoint(service: Service) -> ServiceEndpoint {
    let service_type = service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.clone())
        .unwrap_or_else(|| "ClusterIP".to_string());
    let ingress_ip = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
        .and_then(|i| i.ip.clone());

    ServiceEndpoint {
        name: service.metadata.name.unwrap_or_default(),
        service_type,
        ingress_ip,
    }
}

fn internal_ip(node: &Node) -> Option<String> {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addresses| addresses.iter().find(|a| a.type_ == "InternalIP"))
        .map(|a| a.address.clone())
}

fn custom_status(object: &DynamicObject) -> CustomResourceStatus {
    let status = object.data.get("status");
    let field = |section: &str| {
        status
            .and_then(|s| s.get(section))
            .and_then(|s| s.get("status"))
            .and_then(|s| s.as_str())
            .map(str::to_string)
    };

    CustomResourceStatus {
        health_status: field("health"),
        sync_status: field("sync"),
    }
}

#[async_trait]
impl ClusterProbe for K8sClient {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodState>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod_list = pods.list(&ListParams::default()).await?;
        Ok(pod_list.items.into_iter().map(pod_state).collect())
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<String>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service_list = services.list_metadata(&ListParams::default()).await?;
        Ok(service_list
            .items
            .into_iter()
            .filter_map(|s| s.metadata.name)
            .collect())
    }

    async fn service_endpoints(&self, namespace: &str) -> Result<Vec<ServiceEndpoint>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service_list = services.list(&ListParams::default()).await?;
        Ok(service_list.items.into_iter().map(service_endpoint).collect())
    }

    async fn node_internal_ip(&self) -> Result<Option<String>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node_list = nodes.list(&ListParams::default().limit(1)).await?;
        Ok(node_list.items.first().and_then(internal_ip))
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        Ok(namespaces.get_opt(name).await?.is_some())
    }

    async fn custom_resource_status(
        &self,
        resource: &CustomResourceRef,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CustomResourceStatus>> {
        let api = self.custom_api(resource, namespace);
        match api.get_opt(name).await {
            Ok(object) => Ok(object.as_ref().map(custom_status)),
            // The CRD itself is missing when the controller was never installed
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn cluster_summary(&self) -> Result<ClusterSummary> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node_list = nodes.list(&ListParams::default()).await?;

        let kubelet_version = node_list
            .items
            .first()
            .and_then(|n| n.status.as_ref())
            .and_then(|s| s.node_info.as_ref())
            .map(|info| info.kubelet_version.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let pods: Api<Pod> = Api::all(self.client.clone());
        let pod_list = pods.list_metadata(&ListParams::default()).await?;

        Ok(ClusterSummary {
            node_count: node_list.items.len(),
            kubelet_version,
            pod_count: pod_list.items.len(),
        })
    }
}

/// Stand-in used when no Kubernetes client could be created at startup
pub struct DisconnectedCluster;

impl DisconnectedCluster {
    pub(crate) fn unavailable<T>() -> Result<T> {
        Err(AppError::ServiceUnavailable(
            "Kubernetes client not available".to_string(),
        ))
    }
}

#[async_trait]
impl ClusterProbe for DisconnectedCluster {
    async fn list_pods(&self, _namespace: &str) -> Result<Vec<PodState>> {
        Self::unavailable()
    }

    async fn list_services(&self, _namespace: &str) -> Result<Vec<String>> {
        Self::unavailable()
    }

    async fn service_endpoints(&self, _namespace: &str) -> Result<Vec<ServiceEndpoint>> {
        Self::unavailable()
    }

    async fn node_internal_ip(&self) -> Result<Option<String>> {
        Self::unavailable()
    }

    async fn namespace_exists(&self, _name: &str) -> Result<bool> {
        Self::unavailable()
    }

    async fn custom_resource_status(
        &self,
        _resource: &CustomResourceRef,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<CustomResourceStatus>> {
        Self::unavailable()
    }

    async fn cluster_summary(&self) -> Result<ClusterSummary> {
        Self::unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerStatus, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(phase: &str, ready: &[bool]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("p".to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: Some(
                    ready
                        .iter()
                        .map(|r| ContainerStatus {
                            ready: *r,
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_pod_ready_requires_all_containers() {
        assert!(pod_state(pod("Running", &[true, true])).is_ready());
        assert!(!pod_state(pod("Running", &[true, false])).is_ready());
        assert!(!pod_state(pod("Pending", &[true])).is_ready());
        assert!(!pod_state(pod("Running", &[])).is_ready());
    }

    #[test]
    fn test_pod_without_status_is_unknown() {
        let state = pod_state(Pod::default());
        assert_eq!(state.phase, "Unknown");
        assert!(!state.is_running());
    }

    #[test]
    fn test_counts() {
        let pods = vec![
            pod_state(pod("Running", &[true])),
            pod_state(pod("Running", &[false])),
            pod_state(pod("Pending", &[false])),
        ];
        assert_eq!(count_ready(&pods), 1);
        assert_eq!(count_running(&pods), 2);
    }

    #[test]
    fn test_custom_status_parsing() {
        let object: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "monitoring"},
            "status": {
                "health": {"status": "Healthy"},
                "sync": {"status": "Synced"}
            }
        }))
        .unwrap();

        let status = custom_status(&object);
        assert!(status.is_healthy());
        assert_eq!(status.sync_status.as_deref(), Some("Synced"));
    }

    #[test]
    fn test_custom_status_missing_sections() {
        let object: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "monitoring"}
        }))
        .unwrap();

        let status = custom_status(&object);
        assert!(!status.is_healthy());
        assert!(status.health_status.is_none());
    }

    #[test]
    fn test_service_endpoint_reads_ingress_ip() {
        let service: Service = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "argocd-server"},
            "spec": {"type": "LoadBalancer"},
            "status": {"loadBalancer": {"ingress": [{"ip": "10.0.0.5"}]}}
        }))
        .unwrap();

        let endpoint = service_endpoint(service);
        assert!(endpoint.is_load_balancer());
        assert_eq!(endpoint.ingress_ip.as_deref(), Some("10.0.0.5"));

        let pending = service_endpoint(Service {
            metadata: ObjectMeta {
                name: Some("grafana".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(pending.service_type, "ClusterIP");
        assert!(pending.ingress_ip.is_none());
    }

    #[test]
    fn test_internal_ip_skips_other_addresses() {
        let node: Node = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "node-1"},
            "status": {"addresses": [
                {"type": "Hostname", "address": "node-1"},
                {"type": "InternalIP", "address": "192.168.1.10"}
            ]}
        }))
        .unwrap();

        assert_eq!(internal_ip(&node).as_deref(), Some("192.168.1.10"));
        assert!(internal_ip(&Node::default()).is_none());
    }

    #[tokio::test]
    async fn test_disconnected_cluster_is_unavailable() {
        let probe = DisconnectedCluster;
        let err = probe.list_pods("default").await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }
}
