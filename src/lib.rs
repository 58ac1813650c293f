//! Promway - Prometheus instrumentation for axum services
//!
//! Promway wraps an axum router with a Tower layer that records request,
//! token-usage and streaming metrics in a Prometheus registry, and exposes
//! them over HTTP or as a periodically written file.
//!
//! # Features
//!
//! - **Requests**: counts, latency, in-flight gauge and body sizes per route
//! - **Token usage**: per-request accumulator flushed when the request ends
//! - **Streaming**: chunk, byte, duration and error metrics for response streams
//! - **Exceptions**: typed exception counters and a global counter
//! - **Export**: `/metrics` endpoint and an atomic file sink
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use promway::{ConfigBuilder, MetricsCollector, build_metrics_layer, metrics_router};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> promway::Result<()> {
//!     promway::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     let collector = Arc::new(MetricsCollector::new(&config.metrics.prefix)?);
//!
//!     let mut app = Router::new()
//!         .route("/", get(|| async { "ok" }))
//!         .merge(metrics_router(collector.clone(), &config.metrics.path));
//!     if let Some(layer) = build_metrics_layer(collector, &config.metrics) {
//!         app = app.layer(layer);
//!     }
//!
//!     let addr = config.server.addr().expect("valid address");
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
pub mod metrics;
pub mod testing;
mod utils;

// Re-exports for public API
pub use config::{Config, ConfigBuilder, LoggingConfig, ServerConfig};
pub use error::{MetricsError, Result};
pub use metrics::{
    FileExporter, HandlerFailure, MetricsCollector, MetricsConfig, MetricsConfigBuilder,
    MetricsLayer, MetricsStream, RequestContext, TokenUsage, build_metrics_layer, metrics_router,
};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with sensible defaults
///
/// This sets up structured logging with:
/// - Environment-based filtering via RUST_LOG
/// - JSON formatting when PROMWAY_LOG_JSON=true
/// - Pretty formatting for development
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("PROMWAY_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing from the logging section of a [`Config`]
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
