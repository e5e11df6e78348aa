//! Scenario orchestration: fresh deploy and redeploy with guaranteed cleanup
//!
//! A scenario is a strictly sequential flow — seed config, trigger,
//! wait, assert, verify — producing exactly one terminal status: `Passed`,
//! or the first fatal error together with the stage where it occurred. The
//! transient config object is deleted unconditionally at the end, even
//! after a failure, so repeated runs never trip over leaked cluster state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::configmap::ConfigStore;
use crate::context::ScenarioContext;
use crate::observer::ClusterObserver;
use crate::trigger::DeploymentTrigger;
use crate::verifier::EndpointVerifier;
use crate::waiter::{RolloutWaiter, WaitTarget};
use crate::Error;

/// The two deployment workflows the engine exercises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// First deploy: seed config, deploy, wait for any running pod
    FreshDeploy,
    /// Config-driven redeploy: mutate config, force a marker-annotated
    /// rollout, wait for the new generation
    Redeploy,
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioKind::FreshDeploy => write!(f, "fresh-deploy"),
            ScenarioKind::Redeploy => write!(f, "redeploy"),
        }
    }
}

/// Stages a scenario moves through, reported on failure for diagnosis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Creating the scenario-owned config object
    CreateConfig,
    /// Replacing config content before the redeploy trigger
    MutateConfig,
    /// Invoking the external build/deploy
    Trigger,
    /// Re-applying mutated config after the trigger
    ///
    /// The build collaborator regenerates the config object from source at
    /// compile time, silently overwriting the pre-trigger mutation; the
    /// contract is that the config reflects mutated content after rollout.
    RefreshConfig,
    /// Waiting for the rollout to converge
    WaitRollout,
    /// Asserting the deployment and service objects exist
    Assert,
    /// Application-level health check through the route
    Verify,
    /// Deleting the transient config object
    Cleanup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::CreateConfig => "create-config",
            Stage::MutateConfig => "mutate-config",
            Stage::Trigger => "trigger",
            Stage::RefreshConfig => "refresh-config",
            Stage::WaitRollout => "wait-rollout",
            Stage::Assert => "assert",
            Stage::Verify => "verify",
            Stage::Cleanup => "cleanup",
        };
        write!(f, "{}", name)
    }
}

/// Terminal status of a scenario run.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    /// Every stage completed and the health check matched
    Passed,
    /// The first fatal error, tagged with the stage it occurred in
    Failed {
        /// Stage where the scenario failed
        stage: Stage,
        /// The error that aborted it
        #[serde(serialize_with = "error_message")]
        error: Error,
    },
}

/// Render the error through its display form for structured output.
fn error_message<S: serde::Serializer>(error: &Error, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Verdict of one scenario run.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    /// Which workflow ran
    pub kind: ScenarioKind,
    /// Terminal status
    pub outcome: Outcome,
}

impl ScenarioReport {
    /// Whether the scenario passed
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed)
    }
}

impl std::fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.outcome {
            Outcome::Passed => write!(f, "{}: passed", self.kind),
            Outcome::Failed { stage, error } => {
                write!(f, "{}: failed at {}: {}", self.kind, stage, error)
            }
        }
    }
}

type StepResult = std::result::Result<(), (Stage, Error)>;

/// Composes observer, config store, trigger, waiter, and verifier into the
/// two deployment workflows.
pub struct Scenario {
    observer: Arc<dyn ClusterObserver>,
    store: Arc<dyn ConfigStore>,
    trigger: DeploymentTrigger,
    waiter: RolloutWaiter,
    verifier: EndpointVerifier,
    ctx: ScenarioContext,
}

impl Scenario {
    /// Assemble a scenario over its collaborators and context
    pub fn new(
        observer: Arc<dyn ClusterObserver>,
        store: Arc<dyn ConfigStore>,
        trigger: DeploymentTrigger,
        waiter: RolloutWaiter,
        verifier: EndpointVerifier,
        ctx: ScenarioContext,
    ) -> Self {
        Self {
            observer,
            store,
            trigger,
            waiter,
            verifier,
            ctx,
        }
    }

    /// Run one scenario to a verdict.
    ///
    /// Cleanup of the config object runs unconditionally; a cleanup failure
    /// is only reported when it is the sole failure, and never masks the
    /// primary error.
    pub async fn run(&self, kind: ScenarioKind) -> ScenarioReport {
        info!(scenario = %kind, workload = %self.ctx.identity, "starting scenario");
        let result = self.execute(kind).await;

        let cleanup = self.store.delete(&self.ctx.config_name).await;
        if let Err(e) = &cleanup {
            warn!(config = %self.ctx.config_name, error = %e, "config cleanup failed");
        }

        let outcome = match (result, cleanup) {
            (Ok(()), Ok(())) => Outcome::Passed,
            (Ok(()), Err(error)) => Outcome::Failed {
                stage: Stage::Cleanup,
                error,
            },
            (Err((stage, error)), _) => Outcome::Failed { stage, error },
        };

        let report = ScenarioReport { kind, outcome };
        match &report.outcome {
            Outcome::Passed => info!(scenario = %kind, "scenario passed"),
            Outcome::Failed { stage, error } => {
                error!(scenario = %kind, stage = %stage, error = %error, "scenario failed")
            }
        }
        report
    }

    async fn execute(&self, kind: ScenarioKind) -> StepResult {
        let ctx = &self.ctx;

        self.store
            .create(&ctx.config_name, self.content_map(&ctx.baseline_content))
            .await
            .map_err(|e| (Stage::CreateConfig, e))?;

        let annotations = match kind {
            ScenarioKind::FreshDeploy => BTreeMap::new(),
            ScenarioKind::Redeploy => {
                // Mutate ahead of the trigger so the workload picks up the
                // new content with the rollout it forces.
                self.store
                    .replace_content(&ctx.config_name, self.content_map(&ctx.mutated_content))
                    .await
                    .map_err(|e| (Stage::MutateConfig, e))?;

                let mut annotations = BTreeMap::new();
                annotations.insert(ctx.marker.key.clone(), ctx.marker.value.clone());
                annotations
            }
        };

        self.trigger
            .trigger(&ctx.checkout, &ctx.goal, &ctx.profile, &annotations)
            .await
            .map_err(|e| (Stage::Trigger, e))?;

        if kind == ScenarioKind::Redeploy {
            self.store
                .replace_content(&ctx.config_name, self.content_map(&ctx.mutated_content))
                .await
                .map_err(|e| (Stage::RefreshConfig, e))?;
        }

        let target = match kind {
            ScenarioKind::FreshDeploy => WaitTarget::PodRunning,
            ScenarioKind::Redeploy => WaitTarget::MarkerMatch(ctx.marker.clone()),
        };
        self.waiter
            .wait(self.observer.as_ref(), &ctx.identity, &target)
            .await
            .map_err(|e| (Stage::WaitRollout, e))?;

        self.assert_workload_objects().await?;

        let expected = match kind {
            ScenarioKind::FreshDeploy => &ctx.baseline_expected,
            ScenarioKind::Redeploy => &ctx.mutated_expected,
        };
        let check = self
            .verifier
            .verify(
                self.observer.as_ref(),
                &ctx.identity,
                &ctx.endpoint_path,
                &ctx.expected_field,
                expected,
            )
            .await
            .map_err(|e| (Stage::Verify, e))?;

        if !check.matched {
            return Err((
                Stage::Verify,
                Error::mismatch(&check.field, &check.expected, &check.actual),
            ));
        }

        Ok(())
    }

    /// The deployment and service are independent health signals; a
    /// responding endpoint alone does not prove the objects exist.
    async fn assert_workload_objects(&self) -> StepResult {
        let identity = &self.ctx.identity;

        let deployment = self
            .observer
            .get_deployment(identity)
            .await
            .map_err(|e| (Stage::Assert, e))?;
        if deployment.is_none() {
            return Err((
                Stage::Assert,
                Error::not_found("Deployment", &identity.name),
            ));
        }

        let service = self
            .observer
            .get_service(identity)
            .await
            .map_err(|e| (Stage::Assert, e))?;
        if service.is_none() {
            return Err((Stage::Assert, Error::not_found("Service", &identity.name)));
        }

        Ok(())
    }

    fn content_map(&self, content: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(self.ctx.config_file.clone(), content.to_string());
        map
    }
}
