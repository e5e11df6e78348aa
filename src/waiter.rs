//! Rollout readiness state machine with bounded polling
//!
//! A fresh deploy is ready once any pod of the workload is running. A
//! redeploy must not accept stale pods from the previous generation, so it
//! is ready only once a *running* pod carries the exact rollout marker that
//! was injected into the pod template before the trigger.
//!
//! On readiness the waiter holds for a fixed settle delay before returning:
//! service endpoints, route backends, and ConfigMap mounts converge behind
//! pod readiness, and a verification issued too early observes stale state.

use tracing::{debug, info, warn};

use crate::context::{RolloutMarker, WaitConfig, WorkloadIdentity};
use crate::observer::{ClusterObserver, PodState};
use crate::poll::poll_until;
use crate::{Error, Result};

/// States of the rollout wait.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitState {
    /// Fresh deploy: waiting for any running pod of the identity
    WaitingForPod,
    /// Redeploy: waiting for a running pod carrying the rollout marker
    WaitingForAnnotationMatch,
    /// A satisfying pod was observed and the settle delay has elapsed
    Ready,
    /// The poll budget elapsed without a satisfying pod; terminal and
    /// fatal, surfaced to callers as [`crate::Error::TimedOut`]
    TimedOut,
}

/// State a wait ends in when polling fails.
///
/// Budget exhaustion lands in [`WaitState::TimedOut`]; any other fatal
/// error aborts the wait in the state it started in.
fn failure_state(target: &WaitTarget, error: &Error) -> WaitState {
    match error {
        Error::TimedOut { .. } => WaitState::TimedOut,
        _ => target.initial_state(),
    }
}

/// What the waiter considers a ready rollout.
#[derive(Clone, Debug)]
pub enum WaitTarget {
    /// Any running pod satisfies the wait (fresh deploy)
    PodRunning,
    /// Only a running pod with this exact annotation pair satisfies the
    /// wait (redeploy), discriminating the new generation from stale pods
    MarkerMatch(RolloutMarker),
}

impl WaitTarget {
    /// The state the wait starts in for this target
    pub fn initial_state(&self) -> WaitState {
        match self {
            WaitTarget::PodRunning => WaitState::WaitingForPod,
            WaitTarget::MarkerMatch(_) => WaitState::WaitingForAnnotationMatch,
        }
    }

    /// Whether the given pod satisfies this target
    fn is_satisfied_by(&self, pod: &PodState) -> bool {
        if !pod.running {
            return false;
        }
        match self {
            WaitTarget::PodRunning => true,
            WaitTarget::MarkerMatch(marker) => {
                pod.annotations.get(&marker.key) == Some(&marker.value)
            }
        }
    }
}

/// Polls the observer until the target workload reaches a ready state.
#[derive(Clone, Debug)]
pub struct RolloutWaiter {
    config: WaitConfig,
}

impl RolloutWaiter {
    /// Create a waiter with the given wait configuration
    pub fn new(config: WaitConfig) -> Self {
        Self { config }
    }

    /// Block until the rollout converges, then settle.
    ///
    /// Returns [`WaitState::Ready`] on success. A budget overrun surfaces
    /// as [`crate::Error::TimedOut`] (the `TimedOut` state is terminal and
    /// never silently ignored). Transient observer failures are retried on
    /// the poll interval; fatal errors abort immediately.
    pub async fn wait(
        &self,
        observer: &dyn ClusterObserver,
        identity: &WorkloadIdentity,
        target: &WaitTarget,
    ) -> Result<WaitState> {
        let operation = format!("rollout of {}", identity);
        info!(
            workload = %identity,
            state = ?target.initial_state(),
            budget = ?self.config.rollout_timeout,
            "waiting for rollout"
        );

        let polled = poll_until(
            self.config.rollout_timeout,
            self.config.poll_interval,
            &operation,
            || async {
                let pods = observer.list_pods(identity).await?;
                Ok(pods.into_iter().find(|p| target.is_satisfied_by(p)))
            },
        )
        .await;

        let pod = match polled {
            Ok(pod) => pod,
            Err(err) => {
                let state = failure_state(target, &err);
                warn!(workload = %identity, state = ?state, error = %err, "rollout wait failed");
                return Err(err);
            }
        };

        debug!(workload = %identity, pod = %pod.name, "rollout pod observed");

        // Dependent resources (service endpoints, route backends, config
        // mounts) lag pod readiness; hold before letting verification run.
        tokio::time::sleep(self.config.settle_delay).await;

        info!(workload = %identity, pod = %pod.name, "rollout ready");
        Ok(WaitState::Ready)
    }
}
