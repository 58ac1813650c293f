use futures::StreamExt;
use promway::metrics::{
    FileExporter, MetricsCollector, MetricsConfig, install_global, track_global_exception,
    track_stream, write_snapshot,
};
use promway::testing::ExpositionSnapshot;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_file_sink_overwrites_with_current_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node_exporter").join("app.prom");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();

    let collector = MetricsCollector::new("sink").unwrap();
    collector.increment_global_exceptions();
    write_snapshot(&collector, &path).await.unwrap();

    collector.increment_global_exceptions();
    collector.increment_global_exceptions();
    write_snapshot(&collector, &path).await.unwrap();

    let snapshot = ExpositionSnapshot::parse(&std::fs::read_to_string(&path).unwrap());
    assert_eq!(snapshot.value("sink_global_exceptions_total", &[]), Some(3.0));
    assert_eq!(snapshot.type_counts()["sink_global_exceptions_total"], 1);
}

#[tokio::test]
async fn test_exporter_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = MetricsConfig::builder()
        .prefix("cfg")
        .export_file(dir.path().join("cfg.prom"))
        .export_interval_seconds(0)
        .build();
    assert_eq!(config.export_interval(), Duration::from_secs(1));

    let collector = Arc::new(MetricsCollector::new(&config.prefix).unwrap());
    let path = config.export_file.clone().unwrap();
    let exporter = FileExporter::spawn(collector, &path, config.export_interval());

    for _ in 0..200 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let text = std::fs::read_to_string(exporter.path()).unwrap();
    assert!(text.contains("# TYPE cfg_global_exceptions_total counter"));
    exporter.shutdown();
}

// The global collector is process-wide, so everything touching it lives in
// this one test.
#[tokio::test]
async fn test_global_trackers() {
    let collector = Arc::new(MetricsCollector::new("global").unwrap());
    install_global(collector.clone()).unwrap();
    assert!(install_global(collector.clone()).is_err());

    let err = "abc".parse::<i64>().unwrap_err();
    promway::track_exception!(err, 400);
    promway::track_exception!(err);
    track_global_exception();

    assert_eq!(
        collector
            .exceptions_total
            .with_label_values(&["ParseIntError", module_path!(), "400"])
            .get(),
        1
    );
    assert_eq!(
        collector
            .exceptions_total
            .with_label_values(&["ParseIntError", module_path!(), "0"])
            .get(),
        1
    );
    assert_eq!(collector.global_exceptions_total.get(), 1);

    let source = futures::stream::iter(["a", "bb", "ccc"]).map(Ok::<_, std::io::Error>);
    let chunks: Vec<_> = track_stream(source, "/global").unwrap().collect().await;
    assert_eq!(chunks.len(), 3);
    assert_eq!(
        collector.stream_bytes_total.with_label_values(&["/global"]).get(),
        6
    );
}
