//! End-to-end scenario tests over in-memory collaborators
//!
//! The cluster, config store, and build collaborator are scripted fakes
//! sharing one piece of cluster state; the application endpoint is a real
//! HTTP server (wiremock). The build fake mimics the reference
//! collaborator's behavior faithfully: it reads the (possibly
//! annotation-injected) descriptor out of the checkout, starts pods
//! carrying those annotations, and regenerates the config object from
//! source — the quirk that forces the post-trigger config refresh.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

use rollwatch::configmap::ConfigStore;
use rollwatch::context::{RolloutMarker, ScenarioContext, WaitConfig, WorkloadIdentity};
use rollwatch::observer::{
    ClusterObserver, DeploymentState, PodState, RouteEndpoint, ServiceState,
};
use rollwatch::scenario::{Outcome, Scenario, ScenarioKind, Stage};
use rollwatch::trigger::{BuildDriver, DeploymentTrigger};
use rollwatch::verifier::EndpointVerifier;
use rollwatch::waiter::RolloutWaiter;
use rollwatch::{Error, Result};

const DESCRIPTOR_REL: &str = "src/main/fabric8/deployment.yml";
const CONFIG_NAME: &str = "app-config";
const BASELINE_GREETING: &str = "Hello, World from a ConfigMap !";
const MUTATED_GREETING: &str = "Bonjour, World from a ConfigMap !";

/// Cluster-side state shared by all fakes in one test.
#[derive(Default)]
struct ClusterState {
    deployment: Option<DeploymentState>,
    service: Option<ServiceState>,
    route: Option<RouteEndpoint>,
    pods: Vec<PodState>,
    configs: BTreeMap<String, BTreeMap<String, String>>,
    /// Ordered log of config-store and build operations
    ops: Vec<String>,
    /// Content of the last deleted config object
    last_deleted: Option<BTreeMap<String, String>>,
    pod_polls: u32,
}

type Shared = Arc<Mutex<ClusterState>>;

struct FakeObserver {
    state: Shared,
}

#[async_trait]
impl ClusterObserver for FakeObserver {
    async fn get_deployment(&self, _: &WorkloadIdentity) -> Result<Option<DeploymentState>> {
        Ok(self.state.lock().unwrap().deployment.clone())
    }
    async fn get_service(&self, _: &WorkloadIdentity) -> Result<Option<ServiceState>> {
        Ok(self.state.lock().unwrap().service.clone())
    }
    async fn get_route(&self, _: &WorkloadIdentity) -> Result<Option<RouteEndpoint>> {
        Ok(self.state.lock().unwrap().route.clone())
    }
    async fn list_pods(&self, _: &WorkloadIdentity) -> Result<Vec<PodState>> {
        let mut state = self.state.lock().unwrap();
        state.pod_polls += 1;
        Ok(state.pods.clone())
    }
}

struct FakeStore {
    state: Shared,
}

#[async_trait]
impl ConfigStore for FakeStore {
    async fn create(&self, name: &str, content: BTreeMap<String, String>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.configs.contains_key(name) {
            return Err(Error::already_exists(name));
        }
        state.ops.push(format!("create {}", name));
        state.configs.insert(name.to_string(), content);
        Ok(())
    }

    async fn replace_content(&self, name: &str, content: BTreeMap<String, String>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.configs.contains_key(name) {
            return Err(Error::not_found("ConfigMap", name));
        }
        state.ops.push(format!("replace {}", name));
        // Full-document substitution, never a merge
        state.configs.insert(name.to_string(), content);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self.state.lock().unwrap().configs.get(name).cloned())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(format!("delete {}", name));
        state.last_deleted = state.configs.remove(name);
        Ok(())
    }
}

/// Build fake: applies the descriptor it finds in the checkout to the
/// shared cluster state, like the reference build collaborator does.
struct FakeBuild {
    state: Shared,
    route_host: String,
    /// Config content the build regenerates from source at compile time
    regenerated: BTreeMap<String, String>,
    /// Simulate a rollout that leaves only stale pods running
    drop_injected_annotations: bool,
    fail: bool,
}

impl FakeBuild {
    fn descriptor_annotations(checkout: &Path) -> BTreeMap<String, String> {
        let raw = match std::fs::read_to_string(checkout.join(DESCRIPTOR_REL)) {
            Ok(raw) => raw,
            Err(_) => return BTreeMap::new(),
        };
        // Injection rewrites the descriptor as JSON; an untouched
        // descriptor is still YAML and parses to no annotations here.
        let doc: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(_) => return BTreeMap::new(),
        };
        doc.pointer("/spec/template/metadata/annotations")
            .and_then(|a| a.as_object())
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl BuildDriver for FakeBuild {
    async fn run(&self, checkout: &Path, goal: &str, _profile: &str) -> Result<()> {
        if self.fail {
            return Err(Error::build_failure(goal, "exit status 1"));
        }

        let mut annotations = Self::descriptor_annotations(checkout);
        if self.drop_injected_annotations {
            annotations.clear();
        }

        let mut state = self.state.lock().unwrap();
        state.ops.push("build".to_string());
        state.deployment = Some(DeploymentState {
            available: true,
            ready_replicas: 1,
        });
        state.service = Some(ServiceState { ports: vec![8080] });
        state.route = Some(RouteEndpoint {
            host: self.route_host.clone(),
            path: None,
        });
        let pod_name = format!("vertx-configmap-{}", state.pods.len() + 1);
        state.pods.push(PodState {
            name: pod_name,
            running: true,
            annotations,
        });
        // Compile-time config regeneration: the build overwrites whatever
        // content the scenario staged before triggering.
        state
            .configs
            .insert(CONFIG_NAME.to_string(), self.regenerated.clone());
        Ok(())
    }
}

fn config_content(greeting: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert(
        "app-config.yml".to_string(),
        format!("message: {}\n", greeting),
    );
    map
}

fn checkout_with_descriptor() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("temp checkout");
    let descriptor = dir.path().join(DESCRIPTOR_REL);
    std::fs::create_dir_all(descriptor.parent().unwrap()).expect("mkdir");
    std::fs::write(
        &descriptor,
        "spec:\n  template:\n    metadata:\n      labels:\n        app: vertx-configmap\n",
    )
    .expect("seed descriptor");
    dir
}

fn test_context(checkout: &Path) -> ScenarioContext {
    ScenarioContext {
        identity: WorkloadIdentity::new("vertx-configmap", "rollwatch-it"),
        config_name: CONFIG_NAME.to_string(),
        config_file: "app-config.yml".to_string(),
        baseline_content: format!("message: {}\n", BASELINE_GREETING),
        mutated_content: format!("message: {}\n", MUTATED_GREETING),
        checkout: checkout.to_path_buf(),
        goal: "fabric8:deploy -DskipTests".to_string(),
        profile: "openshift".to_string(),
        endpoint_path: "/api/greeting".to_string(),
        expected_field: "content".to_string(),
        baseline_expected: BASELINE_GREETING.to_string(),
        mutated_expected: MUTATED_GREETING.to_string(),
        marker: RolloutMarker::new("vertx-configmap-testKey", "vertx-configmap-testValue"),
        wait: WaitConfig {
            rollout_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(1),
            settle_delay: Duration::ZERO,
        },
    }
}

fn scenario_over(state: Shared, build: FakeBuild, ctx: ScenarioContext) -> Scenario {
    Scenario::new(
        Arc::new(FakeObserver {
            state: state.clone(),
        }),
        Arc::new(FakeStore { state }),
        DeploymentTrigger::new(Arc::new(build), DESCRIPTOR_REL),
        RolloutWaiter::new(ctx.wait.clone()),
        EndpointVerifier::new(reqwest::Client::new()),
        ctx,
    )
}

async fn greeting_server(greeting: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/api/greeting"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "content": greeting })),
        )
        .mount(&server)
        .await;
    server
}

fn build_over(state: &Shared, server: &MockServer) -> FakeBuild {
    FakeBuild {
        state: state.clone(),
        route_host: server.address().to_string(),
        regenerated: config_content(BASELINE_GREETING),
        drop_injected_annotations: false,
        fail: false,
    }
}

#[tokio::test]
async fn fresh_deploy_passes_and_cleans_up() {
    let checkout = checkout_with_descriptor();
    let state: Shared = Arc::default();
    let server = greeting_server(BASELINE_GREETING).await;

    let scenario = scenario_over(
        state.clone(),
        build_over(&state, &server),
        test_context(checkout.path()),
    );
    let report = scenario.run(ScenarioKind::FreshDeploy).await;

    assert!(report.passed(), "unexpected report: {}", report);
    let state = state.lock().unwrap();
    assert_eq!(state.ops, vec!["create app-config", "build", "delete app-config"]);
    assert!(state.configs.is_empty(), "config object must not leak");
    assert_eq!(
        state.last_deleted,
        Some(config_content(BASELINE_GREETING)),
        "fresh deploy never mutates the config"
    );
}

#[tokio::test]
async fn redeploy_passes_with_marker_wait_and_double_mutation() {
    let checkout = checkout_with_descriptor();
    let state: Shared = Arc::default();
    let server = greeting_server(MUTATED_GREETING).await;

    let scenario = scenario_over(
        state.clone(),
        build_over(&state, &server),
        test_context(checkout.path()),
    );
    let report = scenario.run(ScenarioKind::Redeploy).await;

    assert!(report.passed(), "unexpected report: {}", report);
    let state = state.lock().unwrap();
    // Mutate before the trigger, refresh after it (the build regenerated
    // the config from source), then cleanup.
    assert_eq!(
        state.ops,
        vec![
            "create app-config",
            "replace app-config",
            "build",
            "replace app-config",
            "delete app-config"
        ]
    );
    // The content deleted at cleanup is the mutated content: the
    // post-trigger refresh undid the build's regeneration.
    assert_eq!(state.last_deleted, Some(config_content(MUTATED_GREETING)));
    // The new generation's pod carries the injected marker.
    let pod = state.pods.last().expect("rollout pod");
    assert_eq!(
        pod.annotations.get("vertx-configmap-testKey").map(String::as_str),
        Some("vertx-configmap-testValue")
    );
}

#[tokio::test]
async fn redeploy_times_out_on_stale_pods_and_still_cleans_up() {
    let checkout = checkout_with_descriptor();
    let state: Shared = Arc::default();
    let server = greeting_server(MUTATED_GREETING).await;

    let mut build = build_over(&state, &server);
    // The build "succeeds" but the rollout only ever shows pods without
    // the marker, as if the old generation never got replaced.
    build.drop_injected_annotations = true;

    let scenario = scenario_over(state.clone(), build, test_context(checkout.path()));
    let report = scenario.run(ScenarioKind::Redeploy).await;

    match report.outcome {
        Outcome::Failed { stage, error } => {
            assert_eq!(stage, Stage::WaitRollout);
            assert!(matches!(error, Error::TimedOut { .. }));
        }
        Outcome::Passed => panic!("stale pods must not satisfy the marker wait"),
    }
    let state = state.lock().unwrap();
    assert!(state.configs.is_empty(), "cleanup must run after failure");
    assert!(state.pod_polls > 0);
}

#[tokio::test]
async fn build_failure_aborts_before_any_polling() {
    let checkout = checkout_with_descriptor();
    let state: Shared = Arc::default();
    let server = greeting_server(BASELINE_GREETING).await;

    let mut build = build_over(&state, &server);
    build.fail = true;

    let scenario = scenario_over(state.clone(), build, test_context(checkout.path()));
    let report = scenario.run(ScenarioKind::FreshDeploy).await;

    match report.outcome {
        Outcome::Failed { stage, error } => {
            assert_eq!(stage, Stage::Trigger);
            assert!(matches!(error, Error::BuildFailure { .. }));
        }
        Outcome::Passed => panic!("build failure must fail the scenario"),
    }
    let state = state.lock().unwrap();
    assert_eq!(state.pod_polls, 0, "waiter must not run after a failed build");
    assert!(state.configs.is_empty(), "cleanup must run after failure");
}

#[tokio::test]
async fn verification_mismatch_fails_at_verify_with_both_values() {
    let checkout = checkout_with_descriptor();
    let state: Shared = Arc::default();
    // Workload still serves the baseline greeting after a redeploy
    let server = greeting_server(BASELINE_GREETING).await;

    let scenario = scenario_over(
        state.clone(),
        build_over(&state, &server),
        test_context(checkout.path()),
    );
    let report = scenario.run(ScenarioKind::Redeploy).await;

    match report.outcome {
        Outcome::Failed { stage, error } => {
            assert_eq!(stage, Stage::Verify);
            match error {
                Error::VerificationMismatch { expected, actual, .. } => {
                    assert_eq!(expected, MUTATED_GREETING);
                    assert_eq!(actual, BASELINE_GREETING);
                }
                other => panic!("expected VerificationMismatch, got {other}"),
            }
        }
        Outcome::Passed => panic!("wrong greeting must fail verification"),
    }
}

#[tokio::test]
async fn dead_endpoint_fails_at_verify_with_probe_error_not_mismatch() {
    let checkout = checkout_with_descriptor();
    let state: Shared = Arc::default();
    // A pooled server (`MockServer::start`) keeps its socket listening after
    // drop; an exclusive one actually shuts down, leaving the port dead.
    let server = MockServer::builder().start().await;
    let host = server.address().to_string();
    drop(server);

    let build = FakeBuild {
        state: state.clone(),
        route_host: host,
        regenerated: config_content(BASELINE_GREETING),
        drop_injected_annotations: false,
        fail: false,
    };
    let scenario = scenario_over(state.clone(), build, test_context(checkout.path()));
    let report = scenario.run(ScenarioKind::FreshDeploy).await;

    match report.outcome {
        Outcome::Failed { stage, error } => {
            assert_eq!(stage, Stage::Verify);
            assert!(
                matches!(error, Error::HttpProbe { .. }),
                "probe failure must not be reported as a mismatch"
            );
        }
        Outcome::Passed => panic!("dead endpoint must fail the scenario"),
    }
}

#[tokio::test]
async fn live_config_collision_is_fatal_at_create() {
    let checkout = checkout_with_descriptor();
    let state: Shared = Arc::default();
    state
        .lock()
        .unwrap()
        .configs
        .insert(CONFIG_NAME.to_string(), config_content("leftover"));
    let server = greeting_server(BASELINE_GREETING).await;

    let scenario = scenario_over(
        state.clone(),
        build_over(&state, &server),
        test_context(checkout.path()),
    );
    let report = scenario.run(ScenarioKind::FreshDeploy).await;

    match report.outcome {
        Outcome::Failed { stage, error } => {
            assert_eq!(stage, Stage::CreateConfig);
            assert!(matches!(error, Error::AlreadyExists { .. }));
        }
        Outcome::Passed => panic!("config collision must fail the scenario"),
    }
}

#[tokio::test]
async fn config_store_contract_full_replace_and_idempotent_delete() {
    let state: Shared = Arc::default();
    let store = FakeStore {
        state: state.clone(),
    };

    // Full-replace invariant: the read returns exactly the replaced
    // content, never a merge of old and new keys.
    let mut old = config_content(BASELINE_GREETING);
    old.insert("stale.yml".to_string(), "gone after replace".to_string());
    store.create(CONFIG_NAME, old).await.expect("create");
    store
        .replace_content(CONFIG_NAME, config_content(MUTATED_GREETING))
        .await
        .expect("replace");
    assert_eq!(
        store.get(CONFIG_NAME).await.expect("get"),
        Some(config_content(MUTATED_GREETING))
    );

    // Replacing an absent object is NotFound, not an implicit create
    let err = store
        .replace_content("never-created", config_content(BASELINE_GREETING))
        .await
        .expect_err("replace absent");
    assert!(matches!(err, Error::NotFound { .. }));

    // Delete is idempotent: twice on a live object, once on a never-created one
    store.delete(CONFIG_NAME).await.expect("first delete");
    store.delete(CONFIG_NAME).await.expect("second delete");
    store.delete("never-created").await.expect("delete absent");
}
