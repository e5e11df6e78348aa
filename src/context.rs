//! Scenario-scoped context: workload identity, rollout marker, and timeouts
//!
//! Everything a scenario needs to know about *which* workload it drives and
//! *how long* it is allowed to wait lives here, passed explicitly instead of
//! read from ambient state. Two scenarios running against the same cluster
//! must use distinct identities and config names; the engine does not lock.

use std::path::PathBuf;
use std::time::Duration;

use crate::{DEFAULT_POLL_INTERVAL, DEFAULT_ROLLOUT_TIMEOUT, DEFAULT_SETTLE_DELAY};

/// Identifies the deployment/service/route triple under test.
///
/// The name is derived once from the build artifact identity and never
/// changes across redeploys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadIdentity {
    /// Workload name (shared by deployment, service, and route)
    pub name: String,
    /// Namespace the workload lives in
    pub namespace: String,
}

impl WorkloadIdentity {
    /// Create an identity from a name and namespace
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Annotation pair injected into the pod template to force a rollout.
///
/// Doubles as the readiness discriminator: a redeploy is ready only once a
/// running pod carries this exact pair, which distinguishes the new
/// generation from stale pods still terminating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RolloutMarker {
    /// Annotation key
    pub key: String,
    /// Annotation value
    pub value: String,
}

impl RolloutMarker {
    /// Create a marker from a key/value pair
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Timeouts governing the rollout wait.
#[derive(Clone, Debug)]
pub struct WaitConfig {
    /// Total budget for the rollout to converge
    pub rollout_timeout: Duration,
    /// Interval between readiness polls
    pub poll_interval: Duration,
    /// Fixed delay after readiness before dependent reads
    ///
    /// Guards against read-after-write skew: services, routes, and
    /// ConfigMap mounts lag pod readiness in eventually-consistent
    /// cluster state.
    pub settle_delay: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            rollout_timeout: DEFAULT_ROLLOUT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Everything a scenario run needs, owned for its full lifetime.
#[derive(Clone, Debug)]
pub struct ScenarioContext {
    /// The workload under test
    pub identity: WorkloadIdentity,
    /// Name of the transient ConfigMap the scenario owns
    pub config_name: String,
    /// File-name key inside the ConfigMap (e.g. "app-config.yml")
    pub config_file: String,
    /// Baseline config file content, seeded before the first deploy
    pub baseline_content: String,
    /// Mutated config file content, applied for the redeploy scenario
    pub mutated_content: String,
    /// Prepared source checkout the build runs in
    pub checkout: PathBuf,
    /// Build goal passed to the external build collaborator
    pub goal: String,
    /// Build profile passed to the external build collaborator
    pub profile: String,
    /// Application endpoint path to probe (e.g. "/api/greeting")
    pub endpoint_path: String,
    /// Response field inspected by the health check
    pub expected_field: String,
    /// Expected field value after a fresh deploy
    pub baseline_expected: String,
    /// Expected field value after a redeploy with mutated config
    pub mutated_expected: String,
    /// Marker annotation injected to force and discriminate the redeploy
    pub marker: RolloutMarker,
    /// Rollout wait configuration
    pub wait: WaitConfig,
}
