//! Read-only polling surface over cluster resource state
//!
//! The observer is the only way the engine looks at the cluster. Every
//! accessor is non-blocking and reports absence as `None` (or an empty
//! list), never as an error: during a rollout, "not there yet" is the
//! expected answer. Genuine API failures surface as transient errors that
//! the rollout waiter's poll loop may absorb.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, DynamicObject, ListParams};
use kube::discovery::ApiResource;
use kube::Client;

use crate::context::WorkloadIdentity;
use crate::{Error, Result};

/// The "Available" condition type for deployments
const CONDITION_AVAILABLE: &str = "Available";
/// The "True" status value for conditions
const STATUS_TRUE: &str = "True";
/// Pod phase for a scheduled, started pod
const PHASE_RUNNING: &str = "Running";

/// Observed deployment state, reduced to what the scenario asserts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentState {
    /// Whether the deployment reports the Available condition
    pub available: bool,
    /// Replicas reporting ready
    pub ready_replicas: i32,
}

/// Observed service state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceState {
    /// Exposed service ports
    pub ports: Vec<i32>,
}

/// Externally reachable route for a workload.
///
/// Recomputed from cluster state on every verification; never cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEndpoint {
    /// Route host (no scheme)
    pub host: String,
    /// Optional path prefix configured on the route
    pub path: Option<String>,
}

impl RouteEndpoint {
    /// Build the full probe URL for an endpoint path under this route.
    pub fn url_for(&self, endpoint_path: &str) -> String {
        format!(
            "http://{}{}{}",
            self.host,
            self.path.as_deref().unwrap_or(""),
            endpoint_path
        )
    }
}

/// Observed pod state, carrying the annotations the waiter discriminates on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodState {
    /// Pod name
    pub name: String,
    /// Whether the pod phase is Running
    pub running: bool,
    /// Pod annotations (copied from the pod template by the rollout)
    pub annotations: BTreeMap<String, String>,
}

/// Thin polling interface over cluster resource state.
///
/// Read-only; absence of a resource is `Ok(None)`, not an error. Network
/// and API failures map to [`Error::TransientCluster`].
#[async_trait]
pub trait ClusterObserver: Send + Sync {
    /// Get the deployment for the identity, if it exists
    async fn get_deployment(&self, identity: &WorkloadIdentity)
        -> Result<Option<DeploymentState>>;

    /// Get the service for the identity, if it exists
    async fn get_service(&self, identity: &WorkloadIdentity) -> Result<Option<ServiceState>>;

    /// Get the externally reachable route for the identity, if admitted
    async fn get_route(&self, identity: &WorkloadIdentity) -> Result<Option<RouteEndpoint>>;

    /// List pods belonging to the identity (matched by `app=<name>` label)
    async fn list_pods(&self, identity: &WorkloadIdentity) -> Result<Vec<PodState>>;
}

/// [`ClusterObserver`] backed by a kube client.
///
/// Deployments, services, and pods use typed APIs; the OpenShift Route is
/// a CRD and is read through `DynamicObject` with an explicit
/// `ApiResource`.
#[derive(Clone)]
pub struct KubeObserver {
    client: Client,
}

impl KubeObserver {
    /// Create an observer over the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// ApiResource for the OpenShift Route CRD.
///
/// Built statically: the group/version is stable and discovery would cost
/// an API round-trip per poll.
fn route_resource() -> ApiResource {
    ApiResource {
        group: "route.openshift.io".to_string(),
        version: "v1".to_string(),
        kind: "Route".to_string(),
        api_version: "route.openshift.io/v1".to_string(),
        plural: "routes".to_string(),
    }
}

/// Reduce a Deployment object to its observed state.
fn deployment_state(deployment: &Deployment) -> DeploymentState {
    let status = deployment.status.as_ref();
    let available = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == CONDITION_AVAILABLE && c.status == STATUS_TRUE)
        })
        .unwrap_or(false);
    let ready_replicas = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    DeploymentState {
        available,
        ready_replicas,
    }
}

/// Reduce a Service object to its observed state.
fn service_state(service: &Service) -> ServiceState {
    let ports = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .map(|ports| ports.iter().map(|p| p.port).collect())
        .unwrap_or_default();
    ServiceState { ports }
}

/// Reduce a Pod object to its observed state.
fn pod_state(pod: &Pod) -> PodState {
    PodState {
        name: pod.metadata.name.clone().unwrap_or_default(),
        running: pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(|phase| phase == PHASE_RUNNING)
            .unwrap_or(false),
        annotations: pod.metadata.annotations.clone().unwrap_or_default(),
    }
}

/// Extract the route endpoint from a dynamic Route object.
///
/// Returns `None` while the route has no host yet (not admitted).
fn route_endpoint(route: &DynamicObject) -> Option<RouteEndpoint> {
    let host = route
        .data
        .pointer("/spec/host")
        .and_then(|h| h.as_str())
        .filter(|h| !h.is_empty())?;
    let path = route
        .data
        .pointer("/spec/path")
        .and_then(|p| p.as_str())
        .map(|p| p.to_string());
    Some(RouteEndpoint {
        host: host.to_string(),
        path,
    })
}

#[async_trait]
impl ClusterObserver for KubeObserver {
    async fn get_deployment(
        &self,
        identity: &WorkloadIdentity,
    ) -> Result<Option<DeploymentState>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &identity.namespace);
        match api.get(&identity.name).await {
            Ok(deployment) => Ok(Some(deployment_state(&deployment))),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(Error::transient(format!(
                "get deployment {}: {}",
                identity, e
            ))),
        }
    }

    async fn get_service(&self, identity: &WorkloadIdentity) -> Result<Option<ServiceState>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &identity.namespace);
        match api.get(&identity.name).await {
            Ok(service) => Ok(Some(service_state(&service))),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(Error::transient(format!("get service {}: {}", identity, e))),
        }
    }

    async fn get_route(&self, identity: &WorkloadIdentity) -> Result<Option<RouteEndpoint>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &identity.namespace, &route_resource());
        match api.get(&identity.name).await {
            Ok(route) => Ok(route_endpoint(&route)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(Error::transient(format!("get route {}: {}", identity, e))),
        }
    }

    async fn list_pods(&self, identity: &WorkloadIdentity) -> Result<Vec<PodState>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &identity.namespace);
        let params = ListParams::default().labels(&format!("app={}", identity.name));
        let pods = api
            .list(&params)
            .await
            .map_err(|e| Error::transient(format!("list pods {}: {}", identity, e)))?;
        Ok(pods.items.iter().map(pod_state).collect())
    }
}
