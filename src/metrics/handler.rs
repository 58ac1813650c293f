use axum::{
    Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::Response,
    routing::get,
};
use std::sync::Arc;

use super::collector::MetricsCollector;

/// Handler for the /metrics endpoint
pub async fn metrics_handler(
    State(collector): State<Arc<MetricsCollector>>,
) -> Result<Response<Body>, StatusCode> {
    let body = collector.render().map_err(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)
        .body(Body::from(body))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(response)
}

/// Router serving the exposition endpoint at `path`
///
/// Merge it into the application router; it carries its own state.
pub fn metrics_router(collector: Arc<MetricsCollector>, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(collector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handler_returns_text_format() {
        let collector = Arc::new(MetricsCollector::new("handler").unwrap());
        collector.increment_global_exceptions();

        let response = metrics_handler(State(collector)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; version=0.0.4"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("handler_global_exceptions_total 1"));
    }
}
