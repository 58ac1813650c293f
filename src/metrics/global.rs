//! Process-wide collector.
//!
//! Installed once at startup and read by the free-function trackers
//! ([`track_global_exception`](super::track_global_exception),
//! [`track_stream`](super::track_stream)). The identity never changes after
//! installation; only the metric values move.

use once_cell::sync::OnceCell;
use std::sync::Arc;

use super::collector::MetricsCollector;
use crate::error::{MetricsError, Result};

static GLOBAL_COLLECTOR: OnceCell<Arc<MetricsCollector>> = OnceCell::new();

/// Install the process-wide collector
///
/// Fails with [`MetricsError::AlreadyInstalled`] on a second call.
pub fn install_global(collector: Arc<MetricsCollector>) -> Result<()> {
    GLOBAL_COLLECTOR
        .set(collector)
        .map_err(|_| MetricsError::AlreadyInstalled)
}

/// The process-wide collector, if one was installed
pub fn global() -> Option<&'static Arc<MetricsCollector>> {
    GLOBAL_COLLECTOR.get()
}

/// The process-wide collector, or [`MetricsError::NotInstalled`]
pub fn try_global() -> Result<&'static Arc<MetricsCollector>> {
    global().ok_or(MetricsError::NotInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_init_once() {
        let first = Arc::new(MetricsCollector::new("global_once").unwrap());
        let second = Arc::new(MetricsCollector::new("global_twice").unwrap());

        // Other unit tests may have installed a collector already; whichever
        // came first stays installed.
        let _ = install_global(first);
        assert!(global().is_some());
        assert!(try_global().is_ok());
        assert!(matches!(
            install_global(second),
            Err(MetricsError::AlreadyInstalled)
        ));
    }
}
