//! Exception tracking helpers.
//!
//! These only count; they never change what the caller does with the error.
//!
//! ```rust,ignore
//! match risky_operation() {
//!     Ok(value) => value,
//!     Err(e) => {
//!         promway::track_exception!(e, 500);
//!         return fallback();
//!     }
//! }
//! ```

use axum::response::Response;
use std::borrow::Cow;
use std::fmt;

use super::collector::MetricsCollector;
use super::global::global;

/// Marks a response as the outcome of a failed handler
///
/// Application error types attach this in their `IntoResponse` impl. The
/// interceptor then counts the request under `errors_total` and
/// `exceptions_total` in addition to the regular request metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub error_type: Cow<'static, str>,
    pub module: Cow<'static, str>,
}

impl HandlerFailure {
    pub fn new(error_type: impl Into<Cow<'static, str>>) -> Self {
        Self {
            error_type: error_type.into(),
            module: Cow::Borrowed("unknown"),
        }
    }

    /// Failure named after the type `E`
    pub fn of<E: ?Sized>() -> Self {
        Self::new(short_type_name::<E>())
    }

    pub fn in_module(mut self, module: impl Into<Cow<'static, str>>) -> Self {
        self.module = module.into();
        self
    }

    /// Store the marker in the response extensions
    pub fn attach(self, mut response: Response) -> Response {
        response.extensions_mut().insert(self);
        response
    }
}

/// Record an exception against an explicit collector and log it
pub fn track_detailed_exception<E>(
    collector: &MetricsCollector,
    error: &E,
    status: Option<u16>,
    module: &str,
) where
    E: fmt::Display + ?Sized,
{
    let exception_type = short_type_name::<E>();
    collector.track_exception(exception_type, module, status);

    tracing::error!(
        exception_type,
        module,
        status = ?status,
        error = %error,
        "Exception: {}: {}",
        exception_type,
        error
    );
}

/// Record an exception against the global collector
///
/// Used by [`track_exception!`](crate::track_exception). Without an installed
/// collector the exception is only logged.
pub fn track_exception_in<E>(error: &E, status: Option<u16>, module: &str)
where
    E: fmt::Display + ?Sized,
{
    match global() {
        Some(collector) => track_detailed_exception(collector, error, status, module),
        None => tracing::warn!(
            module,
            error = %error,
            "No metrics collector installed, exception not counted"
        ),
    }
}

/// Increment the global exception counter
///
/// Use this where an error only needs counting, without type or status.
pub fn track_global_exception() {
    match global() {
        Some(collector) => collector.increment_global_exceptions(),
        None => tracing::warn!("No metrics collector installed, global exception not counted"),
    }
}

/// Track an error in the global collector, labelled with the calling module
///
/// `track_exception!(err)` records status `0`, `track_exception!(err, 500)`
/// records the given status.
#[macro_export]
macro_rules! track_exception {
    ($error:expr) => {
        $crate::metrics::track_exception_in(&$error, ::core::option::Option::None, ::core::module_path!())
    };
    ($error:expr, $status:expr) => {
        $crate::metrics::track_exception_in(
            &$error,
            ::core::option::Option::Some($status),
            ::core::module_path!(),
        )
    };
}

/// Last path segment of a type name, without generic arguments
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
