//! Application-level health verification through the workload's route
//!
//! The last of the independent health signals: after the rollout settles,
//! resolve the externally reachable route, issue one HTTP GET, and compare
//! a single field of the JSON response against the expected value.
//!
//! Three outcomes, never conflated:
//! - the field is present but differs: `Ok` with `matched == false`
//!   (an assertion failure, reported by the scenario as a mismatch)
//! - the HTTP call fails: [`Error::HttpProbe`]
//! - the body is not JSON or lacks the field: [`Error::MalformedResponse`]

use serde::Serialize;
use tracing::{info, warn};

use crate::context::WorkloadIdentity;
use crate::observer::ClusterObserver;
use crate::{Error, Result};

/// Outcome of one health check; ephemeral, produced per verification call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    /// Response field that was inspected
    pub field: String,
    /// Expected value
    pub expected: String,
    /// Observed value
    pub actual: String,
    /// Whether observed and expected are exactly equal
    pub matched: bool,
}

/// Resolves a workload's route and probes its application endpoint.
#[derive(Clone)]
pub struct EndpointVerifier {
    http: reqwest::Client,
}

impl EndpointVerifier {
    /// Create a verifier using the given HTTP client
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Probe the workload and compare one response field.
    ///
    /// The route is re-resolved from cluster state on every call. An absent
    /// route is [`Error::RouteUnresolved`] — a deploy/config bug, not a
    /// transient condition, so callers must not retry it.
    pub async fn verify(
        &self,
        observer: &dyn ClusterObserver,
        identity: &WorkloadIdentity,
        endpoint_path: &str,
        field: &str,
        expected: &str,
    ) -> Result<HealthCheckResult> {
        let route = observer
            .get_route(identity)
            .await?
            .ok_or_else(|| Error::route_unresolved(&identity.name))?;
        let url = route.url_for(endpoint_path);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::http_probe(&url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_probe(&url, format!("status {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::http_probe(&url, format!("body read failed: {}", e)))?;

        let doc: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| Error::malformed_response(&url, format!("not a JSON document: {}", e)))?;

        let actual = doc
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::malformed_response(&url, format!("missing string field {:?}", field))
            })?
            .to_string();

        let matched = actual == expected;
        if matched {
            info!(url = %url, field = %field, "health check matched");
        } else {
            warn!(url = %url, field = %field, expected = %expected, actual = %actual, "health check mismatch");
        }

        Ok(HealthCheckResult {
            field: field.to_string(),
            expected: expected.to_string(),
            actual,
            matched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use crate::observer::{DeploymentState, PodState, RouteEndpoint, ServiceState};

    /// Observer fake that only knows how to resolve (or not resolve) a route.
    struct RouteObserver {
        route: Option<RouteEndpoint>,
    }

    #[async_trait]
    impl ClusterObserver for RouteObserver {
        async fn get_deployment(&self, _: &WorkloadIdentity) -> Result<Option<DeploymentState>> {
            Ok(None)
        }
        async fn get_service(&self, _: &WorkloadIdentity) -> Result<Option<ServiceState>> {
            Ok(None)
        }
        async fn get_route(&self, _: &WorkloadIdentity) -> Result<Option<RouteEndpoint>> {
            Ok(self.route.clone())
        }
        async fn list_pods(&self, _: &WorkloadIdentity) -> Result<Vec<PodState>> {
            Ok(Vec::new())
        }
    }

    fn identity() -> WorkloadIdentity {
        WorkloadIdentity::new("vertx-configmap", "rollwatch-test")
    }

    fn observer_for(server: &MockServer) -> RouteObserver {
        RouteObserver {
            route: Some(RouteEndpoint {
                host: server.address().to_string(),
                path: None,
            }),
        }
    }

    async fn greeting_server(body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/greeting"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_matching_field_passes() {
        let server =
            greeting_server(serde_json::json!({ "content": "Hello, World from a ConfigMap !" }))
                .await;
        let verifier = EndpointVerifier::new(reqwest::Client::new());

        let result = verifier
            .verify(
                &observer_for(&server),
                &identity(),
                "/api/greeting",
                "content",
                "Hello, World from a ConfigMap !",
            )
            .await
            .expect("probe succeeds");
        assert!(result.matched);
        assert_eq!(result.actual, "Hello, World from a ConfigMap !");
    }

    /// Story: a wrong value is a result, not an error
    ///
    /// Callers report mismatch as an assertion failure; only transport and
    /// parse problems raise errors.
    #[tokio::test]
    async fn story_mismatch_returns_false_not_error() {
        let server =
            greeting_server(serde_json::json!({ "content": "Hello, World from a ConfigMap !" }))
                .await;
        let verifier = EndpointVerifier::new(reqwest::Client::new());

        let result = verifier
            .verify(
                &observer_for(&server),
                &identity(),
                "/api/greeting",
                "content",
                "Bonjour, World from a ConfigMap !",
            )
            .await
            .expect("mismatch is not an error");
        assert!(!result.matched);
        assert_eq!(result.expected, "Bonjour, World from a ConfigMap !");
        assert_eq!(result.actual, "Hello, World from a ConfigMap !");
    }

    #[tokio::test]
    async fn test_absent_route_is_route_unresolved() {
        let verifier = EndpointVerifier::new(reqwest::Client::new());
        let err = verifier
            .verify(
                &RouteObserver { route: None },
                &identity(),
                "/api/greeting",
                "content",
                "anything",
            )
            .await
            .expect_err("no route");
        assert!(matches!(err, Error::RouteUnresolved { .. }));
    }

    #[tokio::test]
    async fn test_dead_endpoint_is_http_probe_error() {
        let server = MockServer::start().await;
        let host = server.address().to_string();
        drop(server);

        let verifier = EndpointVerifier::new(reqwest::Client::new());
        let observer = RouteObserver {
            route: Some(RouteEndpoint { host, path: None }),
        };
        let err = verifier
            .verify(&observer, &identity(), "/api/greeting", "content", "x")
            .await
            .expect_err("connection refused");
        assert!(matches!(err, Error::HttpProbe { .. }));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/greeting"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let verifier = EndpointVerifier::new(reqwest::Client::new());
        let err = verifier
            .verify(&observer_for(&server), &identity(), "/api/greeting", "content", "x")
            .await
            .expect_err("html body");
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_missing_field_is_malformed_response() {
        let server = greeting_server(serde_json::json!({ "greeting": "wrong shape" })).await;
        let verifier = EndpointVerifier::new(reqwest::Client::new());

        let err = verifier
            .verify(&observer_for(&server), &identity(), "/api/greeting", "content", "x")
            .await
            .expect_err("missing field");
        match err {
            Error::MalformedResponse { message, .. } => assert!(message.contains("content")),
            other => panic!("expected MalformedResponse, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_error_status_is_http_probe_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let verifier = EndpointVerifier::new(reqwest::Client::new());
        let err = verifier
            .verify(&observer_for(&server), &identity(), "/api/greeting", "content", "x")
            .await
            .expect_err("503 from endpoint");
        assert!(matches!(err, Error::HttpProbe { .. }));
    }
}
