/// The main error type for promway
///
/// Everything here is an instrumentation-internal failure. Handler failures
/// and stream failures are never wrapped in this type; they are recorded and
/// handed back to the caller untouched.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A metric family could not be registered (usually a duplicate name)
    #[error("Failed to register metric: {0}")]
    Registration(#[source] prometheus::Error),

    /// The registry snapshot could not be encoded in the text format
    #[error("Failed to encode metrics: {0}")]
    Encode(#[source] prometheus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid metric prefix: {0}")]
    InvalidPrefix(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("A global metrics collector is already installed")]
    AlreadyInstalled,

    #[error("No global metrics collector installed")]
    NotInstalled,

    /// Token usage was written outside of an instrumented request
    #[error("No request context is active on this task")]
    NoRequestContext,
}

impl MetricsError {
    /// True when the error comes from a duplicate metric name
    pub fn is_duplicate_registration(&self) -> bool {
        matches!(self, Self::Registration(prometheus::Error::AlreadyReg))
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
