//! File sink for the exposition snapshot.
//!
//! Writes go to a sibling temp file first and are renamed over the target,
//! so a scraper reading the file never sees a half-written snapshot.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::collector::MetricsCollector;
use crate::error::Result;

/// Write the current snapshot to `path`, replacing its contents
pub async fn write_snapshot(collector: &MetricsCollector, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let data = collector.render()?;
    let tmp = temp_path(path);

    tokio::fs::write(&tmp, data.as_bytes()).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Blocking variant of [`write_snapshot`] for non-async callers
pub fn write_snapshot_blocking(collector: &MetricsCollector, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let data = collector.render()?;
    let tmp = temp_path(path);

    std::fs::write(&tmp, data.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("metrics"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Background task writing a snapshot on a fixed interval
///
/// Failed writes are logged and retried on the next tick. The task stops
/// when [`shutdown`](FileExporter::shutdown) is called or the handle is
/// dropped.
pub struct FileExporter {
    handle: JoinHandle<()>,
    path: PathBuf,
}

impl FileExporter {
    /// Spawn the exporter on the current tokio runtime
    pub fn spawn(collector: Arc<MetricsCollector>, path: impl Into<PathBuf>, interval: Duration) -> Self {
        let path = path.into();
        let task_path = path.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = write_snapshot(&collector, &task_path).await {
                    tracing::error!(
                        path = %task_path.display(),
                        error = %e,
                        "Error writing Prometheus data to file"
                    );
                }
            }
        });

        tracing::info!(path = %path.display(), interval_secs = interval.as_secs(), "metrics file exporter started");

        Self { handle, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the background task
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl Drop for FileExporter {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_sibling() {
        assert_eq!(
            temp_path(Path::new("/var/lib/node/app.prom")),
            PathBuf::from("/var/lib/node/app.prom.tmp")
        );
    }

    #[tokio::test]
    async fn test_write_snapshot_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");
        std::fs::write(&path, "stale content that must disappear").unwrap();

        let collector = MetricsCollector::new("file").unwrap();
        collector.increment_global_exceptions();
        write_snapshot(&collector, &path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("stale content"));
        assert!(text.contains("file_global_exceptions_total 1"));
        assert!(!dir.path().join("metrics.prom.tmp").exists());
    }

    #[test]
    fn test_write_snapshot_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocking.prom");

        let collector = MetricsCollector::new("blocking").unwrap();
        write_snapshot_blocking(&collector, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# TYPE blocking_global_exceptions_total counter"));
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("metrics.prom");
        let collector = MetricsCollector::new("missing").unwrap();

        assert!(write_snapshot(&collector, &path).await.is_err());
    }

    #[tokio::test]
    async fn test_file_exporter_writes_periodically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("periodic.prom");
        let collector = Arc::new(MetricsCollector::new("periodic").unwrap());

        let exporter = FileExporter::spawn(collector.clone(), &path, Duration::from_millis(10));
        assert_eq!(exporter.path(), path.as_path());

        // first tick fires immediately
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(path.exists());

        exporter.shutdown();
    }
}
