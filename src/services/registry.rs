use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a component gets onto the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStrategy {
    /// `helm upgrade --install --wait`, synchronous
    Helm,
    /// Argo CD `Application`, reconciled asynchronously by the controller
    #[serde(rename = "gitops")]
    GitOps,
}

/// Which generated values document a component receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuesProfile {
    MonitoringStack,
    MediaServer,
    GitOpsController,
    Generic,
}

/// Remote Helm chart a component is installed from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSource {
    pub repo_name: String,
    pub repo_url: String,
    pub chart: String,
    pub version: String,
}

impl ChartSource {
    /// `<repo>/<chart>` reference understood by `helm upgrade`
    pub fn reference(&self) -> String {
        format!("{}/{}", self.repo_name, self.chart)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

/// Namespaced custom resource kind, addressed by group/version/plural
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomResourceRef {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl CustomResourceRef {
    pub fn new(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
        }
    }

    /// Argo CD `Application` kind
    pub fn argocd_application() -> Self {
        Self::new("argoproj.io", "v1alpha1", "Application", "applications")
    }
}

/// Web UI a component exposes once installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    /// Key under `urls` in the app listing
    pub name: String,
    /// Service name, or a fragment of one
    pub service: String,
    /// Matching services containing this fragment are skipped
    pub exclude: Option<String>,
    /// Port appended to a LoadBalancer ingress IP
    pub load_balancer_port: Option<u16>,
    /// Port used on the node IP while no ingress IP is assigned
    pub node_port: u16,
}

impl AccessPoint {
    pub fn new(name: &str, service: &str, node_port: u16) -> Self {
        Self {
            name: name.to_string(),
            service: service.to_string(),
            exclude: None,
            load_balancer_port: None,
            node_port,
        }
    }

    pub fn load_balancer_port(mut self, port: u16) -> Self {
        self.load_balancer_port = Some(port);
        self
    }

    pub fn excluding(mut self, fragment: &str) -> Self {
        self.exclude = Some(fragment.to_string());
        self
    }

    pub fn matches(&self, service_name: &str) -> bool {
        service_name.contains(self.service.as_str())
            && !self
                .exclude
                .as_deref()
                .is_some_and(|fragment| service_name.contains(fragment))
    }
}

/// Deployment metadata of one installable component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub namespace: String,
    pub release_name: String,
    pub chart: ChartSource,
    pub strategy: DeployStrategy,
    /// Name of the Argo CD `Application` for GitOps components
    pub gitops_app: Option<String>,
    pub uninstallable: bool,
    /// Pods a healthy install runs, used as the progress baseline
    pub expected_pods: usize,
    /// Fraction of `expected_pods` that must be ready to call the install complete
    pub completion_ratio: f64,
    /// Fragments that must each appear in some service name once installed
    pub service_hints: Vec<String>,
    pub values_profile: ValuesProfile,
    pub resources: ResourceRequirements,
    /// Custom resources removed on uninstall, in addition to PVCs
    pub cleanup_resources: Vec<CustomResourceRef>,
    /// Web UIs listed with their URLs once installed; the first is the primary one
    pub access_points: Vec<AccessPoint>,
}

impl ComponentConfig {
    /// Minimal Helm-installed component; the builder methods below fill in the rest
    pub fn helm(id: &str, display_name: &str, chart: ChartSource) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            description: String::new(),
            namespace: id.to_string(),
            release_name: id.to_string(),
            chart,
            strategy: DeployStrategy::Helm,
            gitops_app: None,
            uninstallable: true,
            expected_pods: 1,
            completion_ratio: 1.0,
            service_hints: Vec::new(),
            values_profile: ValuesProfile::Generic,
            resources: ResourceRequirements {
                cpu_request: "100m".to_string(),
                cpu_limit: "1000m".to_string(),
                memory_request: "256Mi".to_string(),
                memory_limit: "1Gi".to_string(),
            },
            cleanup_resources: Vec::new(),
            access_points: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_release(mut self, release_name: &str) -> Self {
        self.release_name = release_name.to_string();
        self
    }

    /// Switch to the Argo CD strategy with the given `Application` name
    pub fn via_gitops(mut self, app_name: &str) -> Self {
        self.strategy = DeployStrategy::GitOps;
        self.gitops_app = Some(app_name.to_string());
        self
    }

    pub fn protected(mut self) -> Self {
        self.uninstallable = false;
        self
    }

    pub fn with_expected_pods(mut self, expected_pods: usize, completion_ratio: f64) -> Self {
        self.expected_pods = expected_pods.max(1);
        self.completion_ratio = completion_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_service_hints(mut self, hints: &[&str]) -> Self {
        self.service_hints = hints.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn with_profile(mut self, profile: ValuesProfile) -> Self {
        self.values_profile = profile;
        self
    }

    pub fn with_resources(mut self, resources: ResourceRequirements) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_cleanup(mut self, resources: Vec<CustomResourceRef>) -> Self {
        self.cleanup_resources = resources;
        self
    }

    pub fn with_access(mut self, access_points: Vec<AccessPoint>) -> Self {
        self.access_points = access_points;
        self
    }

    /// Ready pods needed before an install counts as complete
    pub fn ready_threshold(&self) -> usize {
        let threshold = (self.expected_pods as f64 * self.completion_ratio).ceil() as usize;
        threshold.max(1)
    }
}

/// Registry of installable components, fixed at startup
pub struct ComponentRegistry {
    components: HashMap<String, ComponentConfig>,
    order: Vec<String>,
}

impl ComponentRegistry {
    pub fn new(components: Vec<ComponentConfig>) -> Self {
        let order = components.iter().map(|c| c.id.clone()).collect();
        let components = components.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self { components, order }
    }

    /// The components Tharnax ships with
    pub fn builtin() -> Self {
        let monitoring = ComponentConfig::helm(
            "monitoring",
            "Monitoring Stack",
            ChartSource {
                repo_name: "prometheus-community".to_string(),
                repo_url: "https://prometheus-community.github.io/helm-charts".to_string(),
                chart: "kube-prometheus-stack".to_string(),
                version: "65.1.1".to_string(),
            },
        )
        .with_description("Prometheus and Grafana monitoring stack")
        .with_release("kube-prometheus-stack")
        .via_gitops("monitoring")
        .with_expected_pods(8, 0.75)
        .with_service_hints(&["grafana", "prometheus"])
        .with_profile(ValuesProfile::MonitoringStack)
        .with_resources(ResourceRequirements {
            cpu_request: "200m".to_string(),
            cpu_limit: "1000m".to_string(),
            memory_request: "512Mi".to_string(),
            memory_limit: "2Gi".to_string(),
        })
        .with_cleanup(vec![
            CustomResourceRef::new("monitoring.coreos.com", "v1", "Prometheus", "prometheuses"),
            CustomResourceRef::new("monitoring.coreos.com", "v1", "Alertmanager", "alertmanagers"),
            CustomResourceRef::new(
                "monitoring.coreos.com",
                "v1",
                "ServiceMonitor",
                "servicemonitors",
            ),
            CustomResourceRef::new("monitoring.coreos.com", "v1", "PrometheusRule", "prometheusrules"),
        ])
        .with_access(vec![
            AccessPoint::new("grafana", "grafana", 3000),
            AccessPoint::new("prometheus", "prometheus", 9090)
                .load_balancer_port(9090)
                .excluding("operated"),
        ]);

        let jellyfin = ComponentConfig::helm(
            "jellyfin",
            "Jellyfin",
            ChartSource {
                repo_name: "jellyfin".to_string(),
                repo_url: "https://jellyfin.github.io/jellyfin-helm".to_string(),
                chart: "jellyfin".to_string(),
                version: "2.1.0".to_string(),
            },
        )
        .with_description("Free Software Media System")
        .with_service_hints(&["jellyfin"])
        .with_profile(ValuesProfile::MediaServer)
        .with_resources(ResourceRequirements {
            cpu_request: "250m".to_string(),
            cpu_limit: "2000m".to_string(),
            memory_request: "512Mi".to_string(),
            memory_limit: "2Gi".to_string(),
        });

        let argocd = ComponentConfig::helm(
            "argocd",
            "Argo CD",
            ChartSource {
                repo_name: "argo".to_string(),
                repo_url: "https://argoproj.github.io/argo-helm".to_string(),
                chart: "argo-cd".to_string(),
                version: "7.6.8".to_string(),
            },
        )
        .with_description("GitOps continuous delivery tool for Kubernetes")
        .protected()
        .with_expected_pods(7, 0.75)
        .with_service_hints(&["argocd-server"])
        .with_profile(ValuesProfile::GitOpsController)
        .with_access(vec![
            AccessPoint::new("argocd", "argocd-server", 8080).load_balancer_port(8080)
        ]);

        Self::new(vec![monitoring, jellyfin, argocd])
    }

    pub fn lookup(&self, id: &str) -> Option<&ComponentConfig> {
        self.components.get(id)
    }

    pub fn is_valid_component(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    /// False for unknown ids as well as protected components
    pub fn can_uninstall(&self, id: &str) -> bool {
        self.lookup(id).map(|c| c.uninstallable).unwrap_or(false)
    }

    /// All components in declaration order
    pub fn all(&self) -> Vec<&ComponentConfig> {
        self.order
            .iter()
            .filter_map(|id| self.components.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
