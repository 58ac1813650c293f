use axum::{Router, body::Bytes, extract::State, response::Response, routing::get};
use futures::StreamExt;
use promway::metrics::{MetricsCollector, MetricsLayer, MetricsStream, streaming_response};
use promway::testing;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct UpstreamError(&'static str);

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for UpstreamError {}

fn collector() -> Arc<MetricsCollector> {
    Arc::new(MetricsCollector::new("st").unwrap())
}

fn five_byte_chunks(n: usize) -> impl futures::Stream<Item = Result<Bytes, UpstreamError>> {
    futures::stream::iter((0..n).map(|_| Ok(Bytes::from_static(b"chunk"))))
}

#[tokio::test]
async fn test_ten_chunks_of_five_bytes() {
    let collector = collector();
    let stream = MetricsStream::new(five_byte_chunks(10), "/generate", collector.clone());

    let chunks: Vec<_> = stream.collect().await;
    assert_eq!(chunks.len(), 10);
    assert!(chunks.iter().all(|c| c.as_deref() == Ok(&b"chunk"[..])));

    assert_eq!(
        collector.stream_chunks_total.with_label_values(&["/generate"]).get(),
        10
    );
    assert_eq!(
        collector.stream_bytes_total.with_label_values(&["/generate"]).get(),
        50
    );
    assert_eq!(
        collector.active_streams.with_label_values(&["/generate"]).get(),
        0
    );
    assert_eq!(
        collector
            .stream_duration_seconds
            .with_label_values(&["/generate"])
            .get_sample_count(),
        1
    );
}

#[tokio::test]
async fn test_error_after_three_chunks() {
    let collector = collector();
    let source = five_byte_chunks(3).chain(futures::stream::iter([
        Err(UpstreamError("model overloaded")),
        Ok(Bytes::from_static(b"never")),
    ]));
    let mut stream = MetricsStream::new(source, "/generate", collector.clone());

    for _ in 0..3 {
        assert!(stream.next().await.unwrap().is_ok());
    }
    assert_eq!(
        collector.active_streams.with_label_values(&["/generate"]).get(),
        1
    );

    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err, UpstreamError("model overloaded"));
    assert!(stream.next().await.is_none());

    assert_eq!(
        collector
            .stream_errors_total
            .with_label_values(&["/generate", "UpstreamError"])
            .get(),
        1
    );
    assert_eq!(
        collector.stream_chunks_total.with_label_values(&["/generate"]).get(),
        3
    );
    assert_eq!(
        collector.active_streams.with_label_values(&["/generate"]).get(),
        0
    );
}

#[tokio::test]
async fn test_dropped_stream_restores_gauge() {
    let collector = collector();
    let mut stream = MetricsStream::new(five_byte_chunks(10), "/abandoned", collector.clone());

    stream.next().await.unwrap().unwrap();
    assert_eq!(
        collector.active_streams.with_label_values(&["/abandoned"]).get(),
        1
    );

    drop(stream);
    assert_eq!(
        collector.active_streams.with_label_values(&["/abandoned"]).get(),
        0
    );
    assert_eq!(
        collector
            .stream_duration_seconds
            .with_label_values(&["/abandoned"])
            .get_sample_count(),
        1
    );
}

async fn sse(State(collector): State<Arc<MetricsCollector>>) -> Response {
    let events = futures::stream::iter(1..=4)
        .map(|i| Ok::<_, UpstreamError>(format!("data: {}\n\n", i)));
    streaming_response(events, "/sse", collector)
}

#[tokio::test]
async fn test_streaming_response_through_router() {
    let collector = collector();
    let app = Router::new()
        .route("/sse", get(sse))
        .with_state(collector.clone())
        .layer(MetricsLayer::new(collector.clone()));

    let body = testing::get(app, "/sse")
        .execute()
        .await
        .assert_ok()
        .assert_header("content-type", "text/event-stream")
        .body_string()
        .await;

    assert_eq!(body, "data: 1\n\ndata: 2\n\ndata: 3\n\ndata: 4\n\n");
    assert_eq!(collector.stream_chunks_total.with_label_values(&["/sse"]).get(), 4);
    assert_eq!(collector.active_streams.with_label_values(&["/sse"]).get(), 0);
    assert_eq!(
        collector
            .http_requests_total
            .with_label_values(&["GET", "/sse", "200"])
            .get(),
        1
    );
}
