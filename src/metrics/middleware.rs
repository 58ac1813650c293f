use axum::{
    body::HttpBody,
    extract::Request,
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::Service;

use super::collector::MetricsCollector;
use super::config::MetricsConfig;
use super::context::RequestContext;
use super::exceptions::{HandlerFailure, short_type_name};
use super::labels::{RequestLabels, SkipList};

/// Build a Tower layer for metrics collection
///
/// Returns `None` when metrics are disabled in the configuration.
pub fn build_metrics_layer(
    collector: Arc<MetricsCollector>,
    config: &MetricsConfig,
) -> Option<MetricsLayer> {
    if !config.enabled {
        return None;
    }

    Some(
        MetricsLayer::new(collector)
            .skip_paths(&config.skip_paths)
            .log_requests(config.log_requests),
    )
}

/// Tower layer for metrics collection
#[derive(Clone)]
pub struct MetricsLayer {
    collector: Arc<MetricsCollector>,
    skip: Arc<SkipList>,
    log_requests: bool,
}

impl MetricsLayer {
    /// Layer recording every request, with an empty skip-list
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self {
            collector,
            skip: Arc::new(SkipList::default()),
            log_requests: false,
        }
    }

    /// Replace the skip-list
    pub fn skip_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        self.skip = Arc::new(SkipList::new(paths));
        self
    }

    /// Log every instrumented request through `tracing`
    pub fn log_requests(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }
}

impl<S> tower::Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            collector: self.collector.clone(),
            skip: self.skip.clone(),
            log_requests: self.log_requests,
        }
    }
}

/// Tower service for metrics collection
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    collector: Arc<MetricsCollector>,
    skip: Arc<SkipList>,
    log_requests: bool,
}

impl<S, ResBody> Service<Request> for MetricsService<S>
where
    S: Service<Request, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: HttpBody + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        if self.skip.matches(req.uri().path()) {
            return Box::pin(self.inner.call(req));
        }

        let collector = self.collector.clone();
        let log_requests = self.log_requests;
        let start = Instant::now();
        let labels = RequestLabels::from_request(&req);
        let request_size = request_body_size(&req);

        // Released when the returned future completes or is dropped.
        let in_flight = collector.request_started(&labels, request_size);

        let fut = self.inner.call(req);

        Box::pin(async move {
            let _in_flight = in_flight;
            let (outcome, ctx) = RequestContext::scope(AssertUnwindSafe(fut).catch_unwind()).await;
            let duration = start.elapsed();

            let result = match outcome {
                Ok(Ok(response)) => {
                    record_response(&collector, &labels, &response, duration, log_requests);
                    Ok(response)
                }
                Ok(Err(err)) => {
                    let error_type = short_type_name::<S::Error>();
                    record_failure(&collector, &labels, error_type, duration, log_requests);
                    Err(err)
                }
                Err(panic) => {
                    tracing::error!(
                        method = %labels.method,
                        path = %labels.path,
                        panic = %panic_message(&*panic),
                        "Handler panicked"
                    );
                    record_failure(&collector, &labels, "panic", duration, log_requests);
                    flush_token_usage(&collector, &ctx);
                    std::panic::resume_unwind(panic);
                }
            };

            flush_token_usage(&collector, &ctx);
            result
        })
    }
}

fn record_response<B: HttpBody>(
    collector: &MetricsCollector,
    labels: &RequestLabels,
    response: &Response<B>,
    duration: Duration,
    log_requests: bool,
) {
    let status = response.status().as_u16();

    match response.extensions().get::<HandlerFailure>() {
        Some(failure) => {
            collector.record_request_error(labels, status, &failure.error_type, duration);
            collector.track_exception(&failure.error_type, &failure.module, Some(status));
        }
        None => collector.record_request(labels, status, duration),
    }

    if let Some(size) = response_body_size(response) {
        collector.record_response_size(labels, status, size);
    }

    if log_requests {
        log_request(labels, response.status(), duration);
    }
}

fn record_failure(
    collector: &MetricsCollector,
    labels: &RequestLabels,
    error_type: &str,
    duration: Duration,
    log_requests: bool,
) {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    collector.record_request_error(labels, status.as_u16(), error_type, duration);
    collector.track_exception(error_type, "unknown", Some(status.as_u16()));

    if log_requests {
        log_request(labels, status, duration);
    }
}

fn flush_token_usage(collector: &MetricsCollector, ctx: &RequestContext) {
    let usage = ctx.token_usage();
    if !usage.is_empty() {
        collector.track_token_usage(&usage);
    }
}

fn request_body_size(req: &Request) -> Option<u64> {
    content_length(req.headers()).or_else(|| req.body().size_hint().exact())
}

fn response_body_size<B: HttpBody>(response: &Response<B>) -> Option<u64> {
    response
        .body()
        .size_hint()
        .exact()
        .or_else(|| content_length(response.headers()))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

fn log_request(labels: &RequestLabels, status: StatusCode, duration: Duration) {
    let duration_ms = duration.as_millis();

    if status.is_server_error() {
        tracing::error!(
            method = %labels.method,
            path = %labels.path,
            status = status.as_u16(),
            duration_ms,
            "{} {} {} {}ms",
            labels.method,
            labels.path,
            status.as_u16(),
            duration_ms
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %labels.method,
            path = %labels.path,
            status = status.as_u16(),
            duration_ms,
            "{} {} {} {}ms",
            labels.method,
            labels.path,
            status.as_u16(),
            duration_ms
        );
    } else {
        tracing::info!(
            method = %labels.method,
            path = %labels.path,
            status = status.as_u16(),
            duration_ms,
            "{} {} {} {}ms",
            labels.method,
            labels.path,
            status.as_u16(),
            duration_ms
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_disabled_metrics_layer() {
        let collector = Arc::new(MetricsCollector::new("test").unwrap());
        let config = MetricsConfig::builder().enabled(false).build();
        assert!(build_metrics_layer(collector, &config).is_none());
    }

    #[test]
    fn test_metrics_layer_from_config() {
        let collector = Arc::new(MetricsCollector::new("test").unwrap());
        let config = MetricsConfig::builder()
            .skip_paths(["/health", "/internal/*"])
            .log_requests(true)
            .build();

        let layer = build_metrics_layer(collector, &config).unwrap();
        assert!(layer.skip.matches("/health"));
        assert!(layer.skip.matches("/internal/x"));
        assert!(!layer.skip.matches("/metrics"));
        assert!(layer.log_requests);
    }

    #[test]
    fn test_request_body_size_prefers_content_length() {
        let req = Request::builder()
            .uri("/upload")
            .header(header::CONTENT_LENGTH, "42")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_body_size(&req), Some(42));

        let req = Request::builder()
            .uri("/upload")
            .body(Body::from("hello"))
            .unwrap();
        assert_eq!(request_body_size(&req), Some(5));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(&*payload), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }
}
