//! Rollwatch CLI - run one deployment verification scenario to a verdict

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rollwatch::configmap::KubeConfigStore;
use rollwatch::context::{RolloutMarker, ScenarioContext, WaitConfig, WorkloadIdentity};
use rollwatch::observer::KubeObserver;
use rollwatch::scenario::{Scenario, ScenarioKind};
use rollwatch::trigger::{DeploymentTrigger, MavenDriver};
use rollwatch::verifier::EndpointVerifier;
use rollwatch::waiter::RolloutWaiter;

/// Scenario selection on the command line
#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    /// Seed config, deploy, verify the baseline greeting
    Fresh,
    /// Mutate config, force a marker-annotated rollout, verify the mutation
    Redeploy,
}

impl From<KindArg> for ScenarioKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Fresh => ScenarioKind::FreshDeploy,
            KindArg::Redeploy => ScenarioKind::Redeploy,
        }
    }
}

/// Rollwatch - deployment orchestration and verification engine
#[derive(Parser, Debug)]
#[command(name = "rollwatch", version, about, long_about = None)]
struct Cli {
    /// Scenario to run
    #[arg(value_enum)]
    scenario: KindArg,

    /// Workload name (deployment/service/route triple)
    #[arg(long)]
    name: String,

    /// Namespace the workload and config object live in
    #[arg(long, env = "ROLLWATCH_NAMESPACE")]
    namespace: String,

    /// Prepared source checkout the build runs in
    #[arg(long)]
    checkout: PathBuf,

    /// File whose content seeds the config object
    #[arg(long)]
    config_source: PathBuf,

    /// Name of the transient config object
    #[arg(long, default_value = "app-config")]
    config_name: String,

    /// File-name key inside the config object
    #[arg(long, default_value = "app-config.yml")]
    config_file: String,

    /// Substring replaced in config content and expectation for redeploys
    #[arg(long, default_value = "Hello")]
    replace_from: String,

    /// Replacement substring for redeploys
    #[arg(long, default_value = "Bonjour")]
    replace_to: String,

    /// Build goal passed to the build collaborator
    #[arg(long, default_value = "fabric8:deploy -DskipTests")]
    goal: String,

    /// Build profile
    #[arg(long, default_value = "openshift")]
    profile: String,

    /// Maven binary to invoke
    #[arg(long, default_value = "mvn")]
    maven_bin: String,

    /// Deployment descriptor path, relative to the checkout
    #[arg(long, default_value = "src/main/fabric8/deployment.yml")]
    descriptor: PathBuf,

    /// Application endpoint path to probe
    #[arg(long, default_value = "/api/greeting")]
    endpoint: String,

    /// Response field inspected by the health check
    #[arg(long, default_value = "content")]
    field: String,

    /// Expected field value after a fresh deploy
    #[arg(long)]
    expect: String,

    /// Marker annotation key (default: <name>-testKey)
    #[arg(long)]
    marker_key: Option<String>,

    /// Marker annotation value (default: <name>-testValue)
    #[arg(long)]
    marker_value: Option<String>,

    /// Path to a kubeconfig file (default: inferred from the environment)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Budget for the rollout to converge, in seconds
    #[arg(long, default_value = "300")]
    rollout_timeout_secs: u64,

    /// Interval between readiness polls, in seconds
    #[arg(long, default_value = "5")]
    poll_interval_secs: u64,

    /// Settle delay after readiness, in seconds
    #[arg(long, default_value = "20")]
    settle_secs: u64,

    /// Timeout for the build invocation, in seconds
    #[arg(long, default_value = "900")]
    build_timeout_secs: u64,

    /// Emit the scenario report as JSON instead of plain text
    #[arg(long)]
    json: bool,
}

/// Connect timeout applied to the kube client
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout applied to the kube client
///
/// Bounds every observer call so a hung API server surfaces as a transient
/// error inside the poll loop instead of stalling it.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

async fn client_config(kubeconfig: Option<&PathBuf>) -> anyhow::Result<Config> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("reading kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("loading kubeconfig")?
        }
        None => Config::infer().await.context("inferring kube config")?,
    };
    config.connect_timeout = Some(CONNECT_TIMEOUT);
    config.read_timeout = Some(READ_TIMEOUT);
    Ok(config)
}

async fn create_client(kubeconfig: Option<&PathBuf>) -> anyhow::Result<Client> {
    Client::try_from(client_config(kubeconfig).await?).context("creating kube client")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let baseline_content = std::fs::read_to_string(&cli.config_source)
        .with_context(|| format!("reading config source {}", cli.config_source.display()))?;
    let mutated_content = baseline_content.replace(&cli.replace_from, &cli.replace_to);
    let mutated_expected = cli.expect.replace(&cli.replace_from, &cli.replace_to);

    let marker = RolloutMarker::new(
        cli.marker_key
            .clone()
            .unwrap_or_else(|| format!("{}-testKey", cli.name)),
        cli.marker_value
            .clone()
            .unwrap_or_else(|| format!("{}-testValue", cli.name)),
    );

    let ctx = ScenarioContext {
        identity: WorkloadIdentity::new(cli.name.as_str(), cli.namespace.as_str()),
        config_name: cli.config_name.clone(),
        config_file: cli.config_file.clone(),
        baseline_content,
        mutated_content,
        checkout: cli.checkout.clone(),
        goal: cli.goal.clone(),
        profile: cli.profile.clone(),
        endpoint_path: cli.endpoint.clone(),
        expected_field: cli.field.clone(),
        baseline_expected: cli.expect.clone(),
        mutated_expected,
        marker,
        wait: WaitConfig {
            rollout_timeout: Duration::from_secs(cli.rollout_timeout_secs),
            poll_interval: Duration::from_secs(cli.poll_interval_secs),
            settle_delay: Duration::from_secs(cli.settle_secs),
        },
    };

    let client = create_client(cli.kubeconfig.as_ref()).await?;
    let observer = Arc::new(KubeObserver::new(client.clone()));
    let store = Arc::new(KubeConfigStore::new(client, cli.namespace.as_str()));
    let driver = Arc::new(
        MavenDriver::new(cli.maven_bin.as_str())
            .with_timeout(Duration::from_secs(cli.build_timeout_secs)),
    );
    let trigger = DeploymentTrigger::new(driver, &cli.descriptor);
    let waiter = RolloutWaiter::new(ctx.wait.clone());
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("building http client")?;
    let verifier = EndpointVerifier::new(http);

    let scenario = Scenario::new(observer, store, trigger, waiter, verifier, ctx);
    let report = scenario.run(cli.scenario.into()).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("rendering report")?
        );
    } else {
        println!("{}", report);
    }
    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}
