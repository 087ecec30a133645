//! Browser URLs of installed components
//!
//! A LoadBalancer ingress IP wins; otherwise the UI is assumed reachable on the
//! first node's internal IP, or `localhost` when even that is unknown.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::services::k8s::{ClusterProbe, ServiceEndpoint};
use crate::services::registry::{AccessPoint, ComponentConfig};

/// URLs attached to an app listing entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessUrls {
    /// Primary UI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Every UI by name, for components exposing more than one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<BTreeMap<String, String>>,
}

/// Service backing `point`: an exact name match first, then any match with an ingress IP
fn select<'a>(point: &AccessPoint, services: &'a [ServiceEndpoint]) -> Option<&'a ServiceEndpoint> {
    services.iter().find(|s| s.name == point.service).or_else(|| {
        services
            .iter()
            .find(|s| point.matches(&s.name) && s.is_load_balancer() && s.ingress_ip.is_some())
    })
}

pub fn resolve_url(point: &AccessPoint, services: &[ServiceEndpoint], node_ip: Option<&str>) -> String {
    let ingress = select(point, services)
        .filter(|s| s.is_load_balancer())
        .and_then(|s| s.ingress_ip.as_deref());

    match (ingress, point.load_balancer_port) {
        (Some(ip), Some(port)) => format!("http://{}:{}", ip, port),
        (Some(ip), None) => format!("http://{}", ip),
        (None, _) => format!("http://{}:{}", node_ip.unwrap_or("localhost"), point.node_port),
    }
}

pub fn resolve_access(
    component: &ComponentConfig,
    services: &[ServiceEndpoint],
    node_ip: Option<&str>,
) -> AccessUrls {
    let resolved: Vec<(String, String)> = component
        .access_points
        .iter()
        .map(|point| (point.name.clone(), resolve_url(point, services, node_ip)))
        .collect();

    let url = resolved.first().map(|(_, url)| url.clone());
    let urls = (resolved.len() > 1).then(|| resolved.into_iter().collect());
    AccessUrls { url, urls }
}

/// Look up the URLs of an installed component; probe failures fall back to `localhost`
pub async fn discover(probe: &dyn ClusterProbe, component: &ComponentConfig) -> AccessUrls {
    if component.access_points.is_empty() {
        return AccessUrls::default();
    }

    let services = match probe.service_endpoints(&component.namespace).await {
        Ok(services) => services,
        Err(e) => {
            tracing::warn!(component = %component.id, "Could not determine access URLs: {}", e);
            Vec::new()
        }
    };
    let node_ip = match probe.node_internal_ip().await {
        Ok(ip) => ip,
        Err(e) => {
            tracing::debug!("Could not read node address: {}", e);
            None
        }
    };

    resolve_access(component, &services, node_ip.as_deref())
}
