//! Error types for the orchestration engine
//!
//! Errors are structured with fields to aid diagnosis: resource names,
//! build goals, probe URLs, and elapsed waits are carried on the variant
//! rather than flattened into a message.

use std::time::Duration;

use thiserror::Error;

/// Main error type for rollwatch operations
#[derive(Debug, Error)]
pub enum Error {
    /// A cluster resource that must exist was absent
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (e.g. "ConfigMap", "Deployment")
        kind: String,
        /// Resource name
        name: String,
    },

    /// Attempted to create a config object that is already live
    #[error("config object {name} already exists")]
    AlreadyExists {
        /// Name of the conflicting object
        name: String,
    },

    /// Transient cluster/API failure (network, 5xx, throttling)
    #[error("transient cluster error: {message}")]
    TransientCluster {
        /// Description of what failed
        message: String,
    },

    /// The external build/deploy invocation failed
    #[error("build failure for goal {goal}: {detail}")]
    BuildFailure {
        /// Build goal that was invoked
        goal: String,
        /// Exit status or output excerpt
        detail: String,
    },

    /// No route exists for the deployed workload
    ///
    /// A deploy/config bug rather than a transient condition: the route is
    /// created by the deploy itself, so absence after rollout is fatal.
    #[error("no route resolved for workload {name}")]
    RouteUnresolved {
        /// Workload name the route was expected for
        name: String,
    },

    /// A bounded wait elapsed without the condition converging
    #[error("timed out waiting for {operation} after {waited:?}")]
    TimedOut {
        /// Operation that was being waited on
        operation: String,
        /// How long the wait lasted
        waited: Duration,
    },

    /// The HTTP health probe itself failed (connect, timeout, read)
    #[error("http probe to {url} failed: {message}")]
    HttpProbe {
        /// Probe URL
        url: String,
        /// Description of the transport failure
        message: String,
    },

    /// The health probe response body could not be interpreted
    #[error("malformed response from {url}: {message}")]
    MalformedResponse {
        /// Probe URL
        url: String,
        /// What was wrong with the body
        message: String,
    },

    /// Deployment descriptor read/parse/write failure
    #[error("descriptor error [{path}]: {message}")]
    Descriptor {
        /// Path to the descriptor within the checkout
        path: String,
        /// Description of what failed
        message: String,
    },

    /// The health check ran but the observed value differed
    ///
    /// Distinct from [`Error::HttpProbe`]: the workload answered, the
    /// content was wrong. Reported as an assertion failure by the scenario.
    #[error("verification mismatch on field {field}: expected {expected:?}, got {actual:?}")]
    VerificationMismatch {
        /// Response field that was inspected
        field: String,
        /// Expected value
        expected: String,
        /// Observed value
        actual: String,
    },
}

impl Error {
    /// Create a not-found error for a resource kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an already-exists error for a config object
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    /// Create a transient cluster error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientCluster {
            message: msg.into(),
        }
    }

    /// Create a build failure for the given goal
    pub fn build_failure(goal: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::BuildFailure {
            goal: goal.into(),
            detail: detail.into(),
        }
    }

    /// Create a route-unresolved error for a workload
    pub fn route_unresolved(name: impl Into<String>) -> Self {
        Self::RouteUnresolved { name: name.into() }
    }

    /// Create a timeout error for an operation
    pub fn timed_out(operation: impl Into<String>, waited: Duration) -> Self {
        Self::TimedOut {
            operation: operation.into(),
            waited,
        }
    }

    /// Create an HTTP probe transport error
    pub fn http_probe(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::HttpProbe {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a malformed-response error
    pub fn malformed_response(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a descriptor error for the given path
    pub fn descriptor(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Descriptor {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a verification mismatch from an inspected field
    pub fn mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::VerificationMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Classify a kube API error against a specific resource.
    ///
    /// 404 maps to [`Error::NotFound`], 409 to [`Error::AlreadyExists`];
    /// everything else (connection failures, 5xx, throttling) is treated as
    /// transient and may be retried by the rollout waiter's poll loop.
    pub fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::not_found(kind, name),
            kube::Error::Api(ae) if ae.code == 409 => Self::already_exists(name),
            other => Self::transient(format!("{} {}: {}", kind, name, other)),
        }
    }

    /// Check if this error is retryable
    ///
    /// Only transient cluster errors qualify, and they are retried only
    /// inside the rollout waiter's bounded poll loop. Every other variant
    /// aborts the scenario immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientCluster { .. })
    }
}
