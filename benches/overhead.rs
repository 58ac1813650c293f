use axum::http::Request;
use axum::{Router, extract::Path, routing::get};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use futures::StreamExt;
use promway::metrics::{MetricsCollector, MetricsLayer, MetricsStream, add_token_usage};
use std::sync::Arc;
use tower::ServiceExt;

// Raw Axum hello world
fn raw_axum_hello() -> Router {
    Router::new().route("/hello", get(|| async { "Hello, World!" }))
}

// Same route behind the metrics layer
fn instrumented_hello() -> Router {
    let collector = Arc::new(MetricsCollector::new("bench").unwrap());
    Router::new()
        .route("/hello", get(|| async { "Hello, World!" }))
        .route(
            "/users/:id",
            get(|Path(id): Path<u64>| async move {
                add_token_usage(id, 1).unwrap();
                "user"
            }),
        )
        .layer(MetricsLayer::new(collector))
}

async fn make_request(router: &Router, path: &str) {
    let req = Request::builder()
        .uri(path)
        .body(axum::body::Body::empty())
        .unwrap();

    let _response = router.clone().oneshot(req).await.unwrap();
}

fn benchmark_hello_world(c: &mut Criterion) {
    let mut group = c.benchmark_group("hello_world");

    let raw_router = raw_axum_hello();
    let instrumented_router = instrumented_hello();

    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("raw_axum", |b| {
        b.iter(|| {
            rt.block_on(make_request(black_box(&raw_router), "/hello"));
        });
    });

    group.bench_function("instrumented", |b| {
        b.iter(|| {
            rt.block_on(make_request(black_box(&instrumented_router), "/hello"));
        });
    });

    group.bench_function("instrumented_with_tokens", |b| {
        b.iter(|| {
            rt.block_on(make_request(black_box(&instrumented_router), "/users/42"));
        });
    });

    group.finish();
}

fn benchmark_stream_wrapper(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_100_chunks");

    let collector = Arc::new(MetricsCollector::new("bench_stream").unwrap());
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("raw", |b| {
        b.iter(|| {
            rt.block_on(async {
                let source = futures::stream::iter(0..100).map(|_| Ok::<_, ()>("data: x\n\n"));
                black_box(source.collect::<Vec<_>>().await);
            });
        });
    });

    group.bench_function("instrumented", |b| {
        b.iter(|| {
            rt.block_on(async {
                let source = futures::stream::iter(0..100).map(|_| Ok::<_, ()>("data: x\n\n"));
                let stream = MetricsStream::new(source, "/bench", collector.clone());
                black_box(stream.collect::<Vec<_>>().await);
            });
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_hello_world, benchmark_stream_wrapper);
criterion_main!(benches);
