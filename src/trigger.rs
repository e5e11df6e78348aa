//! External build/deploy invocation
//!
//! The build collaborator (an embedded Maven-style build with a deploy
//! goal) is the only long-running external call in a scenario. It runs
//! synchronously under its own timeout, independent of the rollout budget,
//! and any non-zero outcome is fatal: the scenario aborts before the
//! rollout waiter ever runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::descriptor;
use crate::{Error, Result, DEFAULT_BUILD_TIMEOUT};

/// Outcome of a trigger invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerResult {
    /// Whether rollout-marker annotations were injected before the build
    pub annotations_injected: bool,
}

/// External build collaborator: runs a build goal in a prepared checkout.
///
/// Implementations block until the build completes or fails; they never
/// wait for the deployed workload to become ready.
#[async_trait]
pub trait BuildDriver: Send + Sync {
    /// Run the build goal with the given profile inside the checkout
    async fn run(&self, checkout: &Path, goal: &str, profile: &str) -> Result<()>;
}

/// [`BuildDriver`] that shells out to a Maven binary.
pub struct MavenDriver {
    binary: String,
    timeout: Duration,
}

impl MavenDriver {
    /// Create a driver invoking the given binary (usually "mvn")
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    /// Override the build timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Keep the last few lines of build output for the error message.
fn output_tail(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(15);
    lines[start..].join("\n")
}

#[async_trait]
impl BuildDriver for MavenDriver {
    async fn run(&self, checkout: &Path, goal: &str, profile: &str) -> Result<()> {
        let mut command = Command::new(&self.binary);
        // The goal may carry extra flags (e.g. "fabric8:deploy -DskipTests")
        for part in goal.split_whitespace() {
            command.arg(part);
        }
        command
            .arg(format!("-P{}", profile))
            .current_dir(checkout)
            .kill_on_drop(true);

        info!(goal = %goal, profile = %profile, checkout = %checkout.display(), "invoking build");

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                Error::build_failure(goal, format!("timed out after {:?}", self.timeout))
            })?
            .map_err(|e| Error::build_failure(goal, format!("failed to start build: {}", e)))?;

        if !output.status.success() {
            warn!(goal = %goal, status = %output.status, "build failed");
            return Err(Error::build_failure(
                goal,
                format!("{}\n{}", output.status, output_tail(&output.stderr)),
            ));
        }

        info!(goal = %goal, "build completed");
        Ok(())
    }
}

/// Triggers the build/deploy action, distinguishing first deploy from
/// redeploy by whether rollout-marker annotations are injected.
pub struct DeploymentTrigger {
    driver: Arc<dyn BuildDriver>,
    /// Deployment descriptor path, relative to the checkout root
    descriptor_path: PathBuf,
}

impl DeploymentTrigger {
    /// Create a trigger using the given driver and descriptor location
    pub fn new(driver: Arc<dyn BuildDriver>, descriptor_path: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            descriptor_path: descriptor_path.into(),
        }
    }

    /// Trigger the build/deploy.
    ///
    /// When `annotations` is non-empty, the deployment descriptor in the
    /// checkout is mutated first so the annotations land in the pod
    /// template metadata, forcing rolling-update semantics on an otherwise
    /// unchanged image. The call blocks until the build completes; rollout
    /// readiness is the waiter's job.
    pub async fn trigger(
        &self,
        checkout: &Path,
        goal: &str,
        profile: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<TriggerResult> {
        let annotations_injected = !annotations.is_empty();
        if annotations_injected {
            let path = checkout.join(&self.descriptor_path);
            descriptor::inject_annotations(&path, annotations).await?;
        }

        self.driver.run(checkout, goal, profile).await?;
        Ok(TriggerResult {
            annotations_injected,
        })
    }
}
