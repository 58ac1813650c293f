//! Instrumented service with token tracking, exception tracking and a file sink.
//!
//! ```text
//! cargo run --example basic
//! curl -X POST localhost:8000/generate -d 'tell me a story'
//! curl localhost:8000/metrics
//! ```

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use promway::metrics::{
    FileExporter, HandlerFailure, MetricsCollector, TokenUsage, build_metrics_layer,
    install_global, metrics_router, set_token_usage,
};
use promway::{ConfigBuilder, init_tracing_with_config, track_exception};
use std::sync::Arc;
use std::time::Duration;

struct QuotaExceeded;

impl IntoResponse for QuotaExceeded {
    fn into_response(self) -> Response {
        HandlerFailure::of::<QuotaExceeded>()
            .in_module(module_path!())
            .attach((StatusCode::TOO_MANY_REQUESTS, "quota exceeded").into_response())
    }
}

async fn generate(prompt: String) -> Result<String, QuotaExceeded> {
    if prompt.len() > 1024 {
        return Err(QuotaExceeded);
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    let input_tokens = prompt.split_whitespace().count() as u64;
    if let Err(e) = set_token_usage(TokenUsage::new(input_tokens, 20)) {
        tracing::warn!(error = %e, "token usage not recorded");
    }

    Ok(format!("Generated text based on: {}", prompt))
}

async fn risky() -> &'static str {
    match "ten".parse::<u32>() {
        Ok(_) => "parsed",
        Err(e) => {
            track_exception!(e, 500);
            "An error occurred"
        }
    }
}

#[tokio::main]
async fn main() -> promway::Result<()> {
    let config = ConfigBuilder::new().from_env().build()?;
    init_tracing_with_config(&config);

    let collector = Arc::new(MetricsCollector::new(&config.metrics.prefix)?);
    install_global(collector.clone())?;

    let _exporter = config.metrics.export_file.as_ref().map(|path| {
        FileExporter::spawn(collector.clone(), path, config.metrics.export_interval())
    });

    let mut app = Router::new()
        .route("/", get(|| async { "Hello World" }))
        .route("/generate", post(generate))
        .route("/risky", get(risky))
        .merge(metrics_router(collector.clone(), &config.metrics.path));

    if let Some(layer) = build_metrics_layer(collector, &config.metrics) {
        app = app.layer(layer);
    }

    let addr = config
        .server
        .addr()
        .map_err(|e| promway::MetricsError::InvalidConfig(e.to_string()))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
