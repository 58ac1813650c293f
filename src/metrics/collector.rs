use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder, core::Collector,
};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use super::context::TokenUsage;
use super::labels::RequestLabels;
use crate::error::{MetricsError, Result};

const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0, 25.0, 50.0, 75.0,
    100.0,
];

const SIZE_BUCKETS: &[f64] = &[10.0, 100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0];

const STREAM_DURATION_BUCKETS: &[f64] = &[
    0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

/// Metrics collector for HTTP request, token and streaming metrics
///
/// All families share the configured prefix, so `MetricsCollector::new("api")`
/// exposes `api_http_requests_total`, `api_active_streams` and so on.
#[derive(Clone)]
pub struct MetricsCollector {
    /// Total number of HTTP requests
    pub http_requests_total: IntCounterVec,

    /// HTTP request duration in seconds
    pub http_request_duration_seconds: HistogramVec,

    /// Number of HTTP requests currently in flight
    pub active_requests: IntGaugeVec,

    /// Request body size in bytes, when known
    pub request_size_bytes: HistogramVec,

    /// Response body size in bytes, when known
    pub response_size_bytes: HistogramVec,

    /// Requests that ended in a handler failure
    pub errors_total: IntCounterVec,

    /// Token usage by type (`input`, `output`, `total`)
    pub token_usage_total: IntCounterVec,

    /// Detailed exception counter
    pub exceptions_total: IntCounterVec,

    /// Label-less exception counter for the whole application
    pub global_exceptions_total: IntCounter,

    /// Number of streaming responses currently open
    pub active_streams: IntGaugeVec,

    /// Chunks forwarded by streaming responses
    pub stream_chunks_total: IntCounterVec,

    /// Bytes forwarded by streaming responses
    pub stream_bytes_total: IntCounterVec,

    /// Streaming response duration in seconds
    pub stream_duration_seconds: HistogramVec,

    /// Streams that ended with an error
    pub stream_errors_total: IntCounterVec,

    prefix: Arc<str>,

    /// Header lines for every family this collector registered
    families: Arc<[FamilyHeader]>,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new(prefix: &str) -> Result<Self> {
        Self::with_registry(prefix, Registry::new())
    }

    /// Create a collector whose families are registered into `registry`
    ///
    /// Registering the same prefix twice into one registry fails with
    /// [`MetricsError::Registration`].
    pub fn with_registry(prefix: &str, registry: Registry) -> Result<Self> {
        validate_prefix(prefix)?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests").namespace(prefix),
            &["method", "path", "status"],
        )
        .map_err(MetricsError::Registration)?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .namespace(prefix)
            .buckets(DURATION_BUCKETS.to_vec()),
            &["method", "path", "status"],
        )
        .map_err(MetricsError::Registration)?;

        let active_requests = IntGaugeVec::new(
            Opts::new("active_requests", "Number of active requests").namespace(prefix),
            &["method", "path"],
        )
        .map_err(MetricsError::Registration)?;

        let request_size_bytes = HistogramVec::new(
            HistogramOpts::new("request_size_bytes", "Request size in bytes")
                .namespace(prefix)
                .buckets(SIZE_BUCKETS.to_vec()),
            &["method", "path"],
        )
        .map_err(MetricsError::Registration)?;

        let response_size_bytes = HistogramVec::new(
            HistogramOpts::new("response_size_bytes", "Response size in bytes")
                .namespace(prefix)
                .buckets(SIZE_BUCKETS.to_vec()),
            &["method", "path", "status"],
        )
        .map_err(MetricsError::Registration)?;

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Total number of errors").namespace(prefix),
            &["method", "path", "error_type"],
        )
        .map_err(MetricsError::Registration)?;

        let token_usage_total = IntCounterVec::new(
            Opts::new("token_usage_total", "Total number of tokens used").namespace(prefix),
            &["type"],
        )
        .map_err(MetricsError::Registration)?;

        let exceptions_total = IntCounterVec::new(
            Opts::new("exceptions_total", "Total number of exceptions").namespace(prefix),
            &["exception_type", "module", "status"],
        )
        .map_err(MetricsError::Registration)?;

        let global_exceptions_total = IntCounter::with_opts(
            Opts::new(
                "global_exceptions_total",
                "Total number of exceptions across the entire application",
            )
            .namespace(prefix),
        )
        .map_err(MetricsError::Registration)?;

        let active_streams = IntGaugeVec::new(
            Opts::new("active_streams", "Number of active streaming responses").namespace(prefix),
            &["endpoint"],
        )
        .map_err(MetricsError::Registration)?;

        let stream_chunks_total = IntCounterVec::new(
            Opts::new(
                "stream_chunks_total",
                "Total number of chunks sent in streaming responses",
            )
            .namespace(prefix),
            &["endpoint"],
        )
        .map_err(MetricsError::Registration)?;

        let stream_bytes_total = IntCounterVec::new(
            Opts::new("stream_bytes_total", "Total bytes sent in streaming responses")
                .namespace(prefix),
            &["endpoint"],
        )
        .map_err(MetricsError::Registration)?;

        let stream_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "stream_duration_seconds",
                "Duration of streaming responses in seconds",
            )
            .namespace(prefix)
            .buckets(STREAM_DURATION_BUCKETS.to_vec()),
            &["endpoint"],
        )
        .map_err(MetricsError::Registration)?;

        let stream_errors_total = IntCounterVec::new(
            Opts::new(
                "stream_errors_total",
                "Total number of errors in streaming responses",
            )
            .namespace(prefix),
            &["endpoint", "error_type"],
        )
        .map_err(MetricsError::Registration)?;

        let collectors: [(Box<dyn Collector>, &'static str); 14] = [
            (Box::new(http_requests_total.clone()), "counter"),
            (Box::new(http_request_duration_seconds.clone()), "histogram"),
            (Box::new(active_requests.clone()), "gauge"),
            (Box::new(request_size_bytes.clone()), "histogram"),
            (Box::new(response_size_bytes.clone()), "histogram"),
            (Box::new(errors_total.clone()), "counter"),
            (Box::new(token_usage_total.clone()), "counter"),
            (Box::new(exceptions_total.clone()), "counter"),
            (Box::new(global_exceptions_total.clone()), "counter"),
            (Box::new(active_streams.clone()), "gauge"),
            (Box::new(stream_chunks_total.clone()), "counter"),
            (Box::new(stream_bytes_total.clone()), "counter"),
            (Box::new(stream_duration_seconds.clone()), "histogram"),
            (Box::new(stream_errors_total.clone()), "counter"),
        ];

        let mut families = Vec::with_capacity(collectors.len());
        for (collector, kind) in collectors {
            families.extend(collector.desc().into_iter().map(|desc| FamilyHeader {
                name: desc.fq_name.clone(),
                help: desc.help.clone(),
                kind,
            }));
            registry
                .register(collector)
                .map_err(MetricsError::Registration)?;
        }

        tracing::debug!(prefix = %prefix, "metrics registered");

        Ok(Self {
            http_requests_total,
            http_request_duration_seconds,
            active_requests,
            request_size_bytes,
            response_size_bytes,
            errors_total,
            token_usage_total,
            exceptions_total,
            global_exceptions_total,
            active_streams,
            stream_chunks_total,
            stream_bytes_total,
            stream_duration_seconds,
            stream_errors_total,
            prefix: Arc::from(prefix),
            families: families.into(),
            registry: Arc::new(registry),
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prefix shared by every family name
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Encode the current registry state in the text exposition format
    ///
    /// Every registered family gets its `# HELP` and `# TYPE` lines, including
    /// vector families that have not recorded a series yet.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(MetricsError::Encode)?;

        // TextEncoder only ever writes UTF-8
        let mut text = String::from_utf8_lossy(&buffer).into_owned();

        let gathered: HashSet<&str> = metric_families.iter().map(|mf| mf.get_name()).collect();
        for family in self.families.iter() {
            if !gathered.contains(family.name.as_str()) {
                family.write_header(&mut text);
            }
        }

        Ok(text)
    }

    /// Mark a request as started and return the guard that ends it
    pub fn request_started(&self, labels: &RequestLabels, request_size: Option<u64>) -> InFlightGuard {
        if let Some(size) = request_size {
            self.request_size_bytes
                .with_label_values(&[&labels.method, &labels.path])
                .observe(size as f64);
        }

        let gauge = self
            .active_requests
            .with_label_values(&[&labels.method, &labels.path]);
        gauge.inc();
        InFlightGuard { gauge }
    }

    /// Record an HTTP request
    pub fn record_request(&self, labels: &RequestLabels, status: u16, duration: Duration) {
        let status = status.to_string();

        self.http_requests_total
            .with_label_values(&[&labels.method, &labels.path, &status])
            .inc();

        self.http_request_duration_seconds
            .with_label_values(&[&labels.method, &labels.path, &status])
            .observe(duration.as_secs_f64());
    }

    pub fn record_response_size(&self, labels: &RequestLabels, status: u16, size: u64) {
        self.response_size_bytes
            .with_label_values(&[&labels.method, &labels.path, &status.to_string()])
            .observe(size as f64);
    }

    /// Record a request that ended in a failure
    ///
    /// Counts the request like [`record_request`](Self::record_request) and
    /// additionally increments the error counter.
    pub fn record_request_error(
        &self,
        labels: &RequestLabels,
        status: u16,
        error_type: &str,
        duration: Duration,
    ) {
        self.record_request(labels, status, duration);
        self.errors_total
            .with_label_values(&[&labels.method, &labels.path, error_type])
            .inc();
    }

    /// Add token usage for LLM style workloads
    pub fn track_token_usage(&self, usage: &TokenUsage) {
        self.token_usage_total
            .with_label_values(&["input"])
            .inc_by(usage.input_tokens);
        self.token_usage_total
            .with_label_values(&["output"])
            .inc_by(usage.output_tokens);
        self.token_usage_total
            .with_label_values(&["total"])
            .inc_by(usage.total_tokens);
    }

    /// Count one exception; a missing status is recorded as `0`
    pub fn track_exception(&self, exception_type: &str, module: &str, status: Option<u16>) {
        let status = status.map(|s| s.to_string()).unwrap_or_else(|| "0".to_string());
        self.exceptions_total
            .with_label_values(&[exception_type, module, &status])
            .inc();
    }

    pub fn increment_global_exceptions(&self) {
        self.global_exceptions_total.inc();
    }

    pub fn stream_started(&self, endpoint: &str) {
        self.active_streams.with_label_values(&[endpoint]).inc();
    }

    pub fn stream_chunk(&self, endpoint: &str, chunk_size: u64) {
        self.stream_chunks_total.with_label_values(&[endpoint]).inc();
        self.stream_bytes_total
            .with_label_values(&[endpoint])
            .inc_by(chunk_size);
    }

    pub fn stream_finished(&self, endpoint: &str, duration: Duration) {
        self.active_streams.with_label_values(&[endpoint]).dec();
        self.stream_duration_seconds
            .with_label_values(&[endpoint])
            .observe(duration.as_secs_f64());
    }

    pub fn stream_error(&self, endpoint: &str, error_type: &str) {
        self.stream_errors_total
            .with_label_values(&[endpoint, error_type])
            .inc();
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// `# HELP` / `# TYPE` pair of one registered family
#[derive(Debug)]
struct FamilyHeader {
    name: String,
    help: String,
    kind: &'static str,
}

impl FamilyHeader {
    fn write_header(&self, out: &mut String) {
        let help = self.help.replace('\\', "\\\\").replace('\n', "\\n");
        let _ = writeln!(out, "# HELP {} {}", self.name, help);
        let _ = writeln!(out, "# TYPE {} {}", self.name, self.kind);
    }
}

/// Decrements the active-requests gauge exactly once, when dropped
///
/// The interceptor holds it across the inner future, so success, failure,
/// panic and cancellation all release it.
#[must_use = "dropping the guard immediately ends the in-flight request"]
pub struct InFlightGuard {
    gauge: IntGauge,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    let mut chars = prefix.chars();
    let valid = match chars.next() {
        // empty prefix means bare metric names
        None => true,
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_' || first == ':')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
    };

    if valid {
        Ok(())
    } else {
        Err(MetricsError::InvalidPrefix(prefix.to_string()))
    }
}
