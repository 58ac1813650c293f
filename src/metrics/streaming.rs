//! Streaming response instrumentation.
//!
//! [`MetricsStream`] wraps a fallible stream of chunks and records stream
//! metrics while forwarding every chunk and every error untouched.
//!
//! ```rust,ignore
//! async fn stream_tokens(State(metrics): State<Arc<MetricsCollector>>) -> Response {
//!     let chunks = futures::stream::iter(["data: 1\n\n", "data: 2\n\n"])
//!         .map(Ok::<_, std::convert::Infallible>);
//!     MetricsStream::new(chunks, "/stream", metrics).into_response()
//! }
//! ```

use axum::{
    BoxError,
    body::{Body, Bytes},
    http::header,
    response::{IntoResponse, Response},
};
use futures::{Stream, TryStream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use super::collector::MetricsCollector;
use super::exceptions::short_type_name;
use super::global::try_global;
use crate::error::Result;

/// Byte length of one streamed chunk
pub trait ChunkSize {
    fn chunk_size(&self) -> usize;
}

impl ChunkSize for Bytes {
    fn chunk_size(&self) -> usize {
        self.len()
    }
}

impl ChunkSize for Vec<u8> {
    fn chunk_size(&self) -> usize {
        self.len()
    }
}

impl ChunkSize for String {
    fn chunk_size(&self) -> usize {
        self.len()
    }
}

impl ChunkSize for &str {
    fn chunk_size(&self) -> usize {
        self.len()
    }
}

impl ChunkSize for &[u8] {
    fn chunk_size(&self) -> usize {
        self.len()
    }
}

pin_project! {
    /// Stream adapter recording chunk, byte, duration and error metrics
    ///
    /// The active-streams gauge goes up on construction and comes back down
    /// exactly once: at the end of the stream, at the first error, or when the
    /// adapter is dropped early.
    pub struct MetricsStream<S> {
        #[pin]
        inner: S,
        tracker: StreamTracker,
    }
}

impl<S> MetricsStream<S> {
    pub fn new(inner: S, endpoint: impl Into<String>, collector: Arc<MetricsCollector>) -> Self {
        Self {
            inner,
            tracker: StreamTracker::start(collector, endpoint.into()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.tracker.endpoint
    }

    /// Chunks forwarded so far
    pub fn chunks(&self) -> u64 {
        self.tracker.chunks
    }

    /// Bytes forwarded so far
    pub fn bytes(&self) -> u64 {
        self.tracker.bytes
    }
}

/// Wrap `stream` with metrics recorded in the global collector
pub fn track_stream<S>(stream: S, endpoint: impl Into<String>) -> Result<MetricsStream<S>> {
    let collector = try_global()?;
    Ok(MetricsStream::new(stream, endpoint, collector.clone()))
}

/// Build a `200 text/event-stream` response whose body is the instrumented stream
///
/// For another status, content type or extra headers, build the response
/// around [`MetricsStream::into_body`] instead:
///
/// ```rust,ignore
/// let body = MetricsStream::new(lines, "/export", collector).into_body();
/// (StatusCode::ACCEPTED, [(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
/// ```
pub fn streaming_response<S>(
    stream: S,
    endpoint: impl Into<String>,
    collector: Arc<MetricsCollector>,
) -> Response
where
    S: TryStream + Send + 'static,
    S::Ok: ChunkSize + Into<Bytes>,
    S::Error: Into<BoxError>,
{
    MetricsStream::new(stream, endpoint, collector).into_response()
}

impl<S> Stream for MetricsStream<S>
where
    S: TryStream,
    S::Ok: ChunkSize,
{
    type Item = std::result::Result<S::Ok, S::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        // A failed sequence does not resume.
        if this.tracker.finished {
            return Poll::Ready(None);
        }

        match ready!(this.inner.try_poll_next(cx)) {
            Some(Ok(chunk)) => {
                this.tracker.chunk(chunk.chunk_size() as u64);
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => {
                this.tracker.error(short_type_name::<S::Error>());
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.tracker.finish();
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.tracker.finished {
            (0, Some(0))
        } else {
            (0, None)
        }
    }
}

impl<S> MetricsStream<S>
where
    S: TryStream + Send + 'static,
    S::Ok: ChunkSize + Into<Bytes>,
    S::Error: Into<BoxError>,
{
    /// Turn the instrumented stream into a response body
    pub fn into_body(self) -> Body {
        Body::from_stream(self)
    }
}

impl<S> IntoResponse for MetricsStream<S>
where
    S: TryStream + Send + 'static,
    S::Ok: ChunkSize + Into<Bytes>,
    S::Error: Into<BoxError>,
{
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "text/event-stream")], self.into_body()).into_response()
    }
}

struct StreamTracker {
    collector: Arc<MetricsCollector>,
    endpoint: String,
    started: Instant,
    chunks: u64,
    bytes: u64,
    finished: bool,
}

impl StreamTracker {
    fn start(collector: Arc<MetricsCollector>, endpoint: String) -> Self {
        collector.stream_started(&endpoint);
        Self {
            collector,
            endpoint,
            started: Instant::now(),
            chunks: 0,
            bytes: 0,
            finished: false,
        }
    }

    fn chunk(&mut self, size: u64) {
        self.chunks += 1;
        self.bytes += size;
        self.collector.stream_chunk(&self.endpoint, size);
    }

    fn error(&mut self, error_type: &str) {
        self.collector.stream_error(&self.endpoint, error_type);
        tracing::error!(
            endpoint = %self.endpoint,
            error_type,
            chunks = self.chunks,
            "Error in streaming response"
        );
        self.finish();
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let duration = self.started.elapsed();
        self.collector.stream_finished(&self.endpoint, duration);
        tracing::debug!(
            endpoint = %self.endpoint,
            chunks = self.chunks,
            bytes = self.bytes,
            duration_ms = duration.as_millis(),
            "stream finished"
        );
    }
}

impl Drop for StreamTracker {
    fn drop(&mut self) {
        // Client went away before the stream ended.
        self.finish();
    }
}
