// # Metrics Module
//
// In-process metrics registry with Prometheus-compatible text exposition.
//
// The collector is a name-indexed table of counter/gauge/histogram metrics,
// each holding a small set of label-value series. All updates serialize
// through one mutex, so readers that also go through the collector observe
// a consistent ordering.
//
// ## Example
//
// ```rust
// use opspulse::metrics::{MetricsCollector, MetricConfig};
//
// let collector = MetricsCollector::new();
// collector
//     .register(MetricConfig::counter("ingest_lines_total", "Lines accepted"))
//     .unwrap();
// collector.counter_add("ingest_lines_total", &[], 1).unwrap();
//
// let text = collector.export_prometheus();
// assert!(text.contains("ingest_lines_total 1"));
// ```

pub mod collector;

pub use collector::{
    BucketCount, MetricKind, MetricConfig, MetricValue, MetricsCollector,
};
