//! Alba-style HTTP testing utilities for instrumented routers
//!
//! Requests run through `tower::ServiceExt::oneshot`, so no server or socket
//! is involved.
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{Router, routing};
//! use promway::testing;
//!
//! #[tokio::test]
//! async fn test_metrics_endpoint() {
//!     let app = build_app();
//!
//!     testing::get(app.clone(), "/hello").execute().await.assert_ok();
//!
//!     let snapshot = testing::get(app, "/metrics")
//!         .execute()
//!         .await
//!         .assert_ok()
//!         .exposition()
//!         .await;
//!     assert_eq!(snapshot.sum("axum_http_requests_total", &[("path", "/hello")]), 1.0);
//! }
//! ```

use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    response::Response,
};
use tower::ServiceExt;

use super::exposition::ExpositionSnapshot;

/// Alba-style test scenario builder for easy endpoint testing
pub struct Scenario {
    app: Router,
    request: Request<Body>,
}

impl Scenario {
    /// Create a new test scenario with the given app
    pub fn new(app: Router) -> Self {
        Self {
            app,
            request: Request::new(Body::empty()),
        }
    }

    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        *self.request.method_mut() = method;
        self
    }

    /// Set the URI/path
    pub fn uri(mut self, uri: &str) -> Self {
        *self.request.uri_mut() = uri
            .parse()
            .unwrap_or_else(|e| panic!("invalid test URI '{}': {}", uri, e));
        self
    }

    /// Add a header
    pub fn header(mut self, key: &str, value: &str) -> Self {
        let name = HeaderName::from_bytes(key.as_bytes())
            .unwrap_or_else(|e| panic!("invalid header name '{}': {}", key, e));
        let value = HeaderValue::from_str(value)
            .unwrap_or_else(|e| panic!("invalid header value for '{}': {}", key, e));
        self.request.headers_mut().insert(name, value);
        self
    }

    /// Set plain text body with a matching Content-Length
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.request
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        *self.request.body_mut() = Body::from(body);
        self
    }

    /// Set a body without any size header
    pub fn raw_body(mut self, body: impl Into<Body>) -> Self {
        *self.request.body_mut() = body.into();
        self
    }

    /// Execute the request and get an assertion builder
    pub async fn execute(self) -> ScenarioAssert {
        let response = match self.app.oneshot(self.request).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        };
        ScenarioAssert { response }
    }
}

/// Assertion builder for test responses
pub struct ScenarioAssert {
    response: Response,
}

impl ScenarioAssert {
    /// Assert the response status code
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.response.status(),
            expected,
            "Expected status {}, got {}",
            expected,
            self.response.status()
        );
        self
    }

    /// Assert status is 200 OK
    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    /// Assert status is 404 Not Found
    pub fn assert_not_found(self) -> Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    /// Assert status is 500 Internal Server Error
    pub fn assert_server_error(self) -> Self {
        self.assert_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Assert a header exists with the given value
    pub fn assert_header(self, key: &str, expected: &str) -> Self {
        let value = self
            .response
            .headers()
            .get(key)
            .unwrap_or_else(|| panic!("Header '{}' not found", key))
            .to_str()
            .unwrap_or_else(|_| panic!("Header '{}' is not valid UTF-8", key));
        assert_eq!(value, expected, "Header '{}' value mismatch", key);
        self
    }

    /// Get the response body as bytes
    pub async fn body_bytes(self) -> Vec<u8> {
        axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap_or_else(|e| panic!("failed to read response body: {}", e))
            .to_vec()
    }

    /// Get the response body as a string
    pub async fn body_string(self) -> String {
        String::from_utf8(self.body_bytes().await)
            .unwrap_or_else(|e| panic!("response body is not UTF-8: {}", e))
    }

    /// Assert the response body contains the given text
    pub async fn assert_contains(self, text: &str) -> Self {
        let body = self.body_string().await;
        assert!(
            body.contains(text),
            "Response body does not contain '{}'. Body: {}",
            text,
            body
        );
        Self {
            response: Response::new(Body::from(body)),
        }
    }

    /// Parse the body as Prometheus text exposition
    pub async fn exposition(self) -> ExpositionSnapshot {
        ExpositionSnapshot::parse(&self.body_string().await)
    }

    /// Get the underlying response for custom assertions
    pub fn response(self) -> Response {
        self.response
    }
}

/// Convenience function to create a GET request scenario
pub fn get(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::GET).uri(uri)
}

/// Convenience function to create a POST request scenario
pub fn post(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::POST).uri(uri)
}
