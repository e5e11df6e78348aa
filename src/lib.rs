//! Rollwatch - deployment orchestration and verification engine
//!
//! Rollwatch drives a build-and-deploy workflow against a cluster and turns
//! the resulting asynchronous cluster state into a single pass/fail verdict:
//!
//! 1. Seed a ConfigMap the workload reads its configuration from
//! 2. Trigger the external build/deploy action (optionally forcing a fresh
//!    rollout by injecting a marker annotation into the pod template)
//! 3. Poll the cluster until the target workload is ready, discriminating
//!    the new rollout generation from stale pods when redeploying
//! 4. Verify the workload end to end: deployment and service objects exist,
//!    a route resolves, and an application-level HTTP check returns the
//!    expected content
//! 5. Clean up transient config objects unconditionally
//!
//! # Modules
//!
//! - [`context`] - Scenario-scoped identity, marker, and timeout configuration
//! - [`observer`] - Read-only polling surface over cluster resource state
//! - [`poll`] - Bounded generic polling over eventually-consistent state
//! - [`configmap`] - Versioned ConfigMap lifecycle (create/replace/delete)
//! - [`descriptor`] - Annotation injection into the build's deployment descriptor
//! - [`trigger`] - External build/deploy invocation
//! - [`waiter`] - Rollout readiness state machine with bounded polling
//! - [`verifier`] - Route resolution and application-level HTTP health check
//! - [`scenario`] - Fresh-deploy and redeploy orchestration with cleanup
//! - [`error`] - Error taxonomy for the orchestration flow

#![deny(missing_docs)]

pub mod configmap;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod observer;
pub mod poll;
pub mod scenario;
pub mod trigger;
pub mod verifier;
pub mod waiter;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

use std::time::Duration;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// Centralized so CLI defaults, scenario contexts, and test fixtures agree.

/// Default interval between readiness polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default budget for a rollout to converge
///
/// Long enough to tolerate a full rolling-update cycle on a loaded cluster.
pub const DEFAULT_ROLLOUT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default settle delay after readiness
///
/// Services, routes, and ConfigMap mounts converge eventually after the pod
/// reports running; dependent reads before this window can observe stale
/// state.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(20);

/// Default timeout for the external build/deploy invocation
///
/// Independent of the rollout budget: the build runs to completion before
/// any readiness polling starts.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(900);
