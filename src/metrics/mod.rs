//! Prometheus metrics for axum applications.
//!
//! The [`MetricsLayer`] records request counts, latencies, sizes and in-flight
//! requests for every route it wraps. Handlers can report LLM token usage
//! through the per-request context, count exceptions with
//! [`track_exception!`](crate::track_exception), and instrument streaming
//! bodies with [`MetricsStream`].
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use promway::metrics::{MetricsCollector, MetricsConfig, build_metrics_layer, metrics_router};
//! use std::sync::Arc;
//!
//! # fn build() -> promway::Result<Router> {
//! let config = MetricsConfig::default();
//! let collector = Arc::new(MetricsCollector::new(&config.prefix)?);
//!
//! let mut app = Router::new()
//!     .route("/hello", get(|| async { "hi" }))
//!     .merge(metrics_router(collector.clone(), &config.path));
//!
//! if let Some(layer) = build_metrics_layer(collector, &config) {
//!     app = app.layer(layer);
//! }
//! # Ok(app)
//! # }
//! ```

mod collector;
mod config;
mod context;
mod exceptions;
mod export;
mod global;
mod handler;
mod labels;
mod middleware;
mod streaming;

pub use collector::{InFlightGuard, MetricsCollector};
pub use config::{MetricsConfig, MetricsConfigBuilder};
pub use context::{RequestContext, TokenUsage, add_token_usage, set_token_usage, token_usage};
pub use exceptions::{
    HandlerFailure, track_detailed_exception, track_exception_in, track_global_exception,
};
pub use export::{FileExporter, write_snapshot, write_snapshot_blocking};
pub use global::{global, install_global, try_global};
pub use handler::{metrics_handler, metrics_router};
pub use labels::{RequestLabels, SkipList, normalize_path};
pub use middleware::{MetricsLayer, MetricsService, build_metrics_layer};
pub use streaming::{ChunkSize, MetricsStream, streaming_response, track_stream};
