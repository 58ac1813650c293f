//! Testing utilities for instrumented applications
//!
//! - Alba-style HTTP endpoint testing without running a server
//! - A parser for the text exposition format, for asserting on metric values
//!
//! # Example
//!
//! ```rust,ignore
//! use promway::testing;
//!
//! #[tokio::test]
//! async fn test_request_is_counted() {
//!     let app = build_instrumented_app();
//!     testing::get(app.clone(), "/hello").execute().await.assert_ok();
//!
//!     let metrics = testing::get(app, "/metrics").execute().await.exposition().await;
//!     assert_eq!(metrics.metric_type("axum_http_requests_total"), Some("counter"));
//! }
//! ```

mod exposition;
mod scenario;

pub use exposition::{ExpositionSnapshot, Sample};
pub use scenario::{Scenario, ScenarioAssert, get, post};
