//! Server-sent events with stream metrics.
//!
//! ```text
//! cargo run --example streaming
//! curl -N localhost:8000/stream
//! ```

use axum::{
    Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
};
use futures::StreamExt;
use promway::metrics::{
    MetricsCollector, MetricsLayer, install_global, metrics_router, streaming_response,
    track_stream,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

fn ticks() -> impl futures::Stream<Item = Result<String, Infallible>> + Send + 'static {
    futures::stream::iter(0..10).then(|i| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(format!("data: {}\n\n", i))
    })
}

async fn stream(State(collector): State<Arc<MetricsCollector>>) -> Response {
    streaming_response(ticks(), "/stream", collector)
}

// Same stream, instrumented through the global collector
async fn stream_global() -> Response {
    match track_stream(ticks(), "/stream2") {
        Ok(stream) => stream.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "no global collector");
            Response::new(axum::body::Body::empty())
        }
    }
}

#[tokio::main]
async fn main() -> promway::Result<()> {
    promway::init_tracing();

    let collector = Arc::new(MetricsCollector::new("streaming")?);
    install_global(collector.clone())?;

    let app = Router::new()
        .route("/stream", get(stream))
        .route("/stream2", get(stream_global))
        .with_state(collector.clone())
        .merge(metrics_router(collector.clone(), "/metrics"))
        .layer(MetricsLayer::new(collector).skip_paths(["/metrics"]));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
    axum::serve(listener, app).await?;

    Ok(())
}
