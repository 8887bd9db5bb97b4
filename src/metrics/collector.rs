// Metrics collector
//
// Fixed-capacity registry: up to 256 metrics, each with up to 16 label-value
// series. Registration is by unique name; updates dispatch on (name, label
// values) and fail on type mismatch. The exposition format emits `# HELP` /
// `# TYPE` directives followed by one sample line per series (histograms
// emit `_count` and `_sum`).

use std::fmt::Write as _;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Registry capacity.
const MAX_METRICS: usize = 256;
/// Distinct label-value combinations per metric.
const MAX_SERIES: usize = 16;
/// Longest accepted metric name.
const MAX_NAME_LEN: usize = 128;

/// Metric families supported by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    /// Monotonically non-decreasing integer.
    Counter,
    /// Last-write-wins floating point value.
    Gauge,
    /// Observation distribution: count, sum, and bucket fills.
    Histogram,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Declaration of a metric: name, help text, kind, label names, and (for
/// histograms) bucket boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    pub description: String,
    pub kind: MetricKind,
    pub labels: Vec<String>,
    /// Histogram bucket upper bounds; a +Inf bucket is always appended.
    pub buckets: Vec<f64>,
}

impl MetricConfig {
    pub fn counter(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: MetricKind::Counter,
            labels: Vec::new(),
            buckets: Vec::new(),
        }
    }

    pub fn gauge(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: MetricKind::Gauge,
            labels: Vec::new(),
            buckets: Vec::new(),
        }
    }

    pub fn histogram(
        name: impl Into<String>,
        description: impl Into<String>,
        buckets: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: MetricKind::Histogram,
            labels: Vec::new(),
            buckets,
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }
}

/// Per-bucket fill of a histogram series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketCount {
    pub upper_bound: f64,
    pub count: u64,
}

/// Snapshot of one series' accumulated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
    Histogram {
        count: u64,
        sum: f64,
        buckets: Vec<BucketCount>,
    },
}

struct Series {
    label_values: Vec<String>,
    value: MetricValue,
}

struct MetricEntry {
    config: MetricConfig,
    series: Vec<Series>,
}

impl MetricEntry {
    fn new_value(&self) -> MetricValue {
        match self.config.kind {
            MetricKind::Counter => MetricValue::Counter(0),
            MetricKind::Gauge => MetricValue::Gauge(0.0),
            MetricKind::Histogram => {
                let mut buckets: Vec<BucketCount> = self
                    .config
                    .buckets
                    .iter()
                    .map(|&upper_bound| BucketCount {
                        upper_bound,
                        count: 0,
                    })
                    .collect();
                buckets.push(BucketCount {
                    upper_bound: f64::INFINITY,
                    count: 0,
                });
                MetricValue::Histogram {
                    count: 0,
                    sum: 0.0,
                    buckets,
                }
            }
        }
    }

    /// Find or create the series for `label_values`. The empty label set is
    /// always series 0, so unlabeled metrics stay single-series.
    fn series_mut(&mut self, label_values: &[&str]) -> Result<&mut Series> {
        if let Some(idx) = self
            .series
            .iter()
            .position(|s| s.label_values.iter().map(String::as_str).eq(label_values.iter().copied()))
        {
            return Ok(&mut self.series[idx]);
        }

        if self.series.len() >= MAX_SERIES {
            return Err(Error::Full);
        }

        let value = self.new_value();
        self.series.push(Series {
            label_values: label_values.iter().map(|v| v.to_string()).collect(),
            value,
        });
        Ok(self.series.last_mut().expect("series just pushed"))
    }
}

/// Name-indexed registry of counters, gauges, and histograms.
pub struct MetricsCollector {
    inner: Mutex<Vec<MetricEntry>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Register a metric. Duplicate names and over-long names are rejected
    /// with [`Error::Invalid`]; a registry at capacity yields
    /// [`Error::Full`].
    pub fn register(&self, config: MetricConfig) -> Result<()> {
        if config.name.is_empty() || config.name.len() > MAX_NAME_LEN {
            return Err(Error::invalid(format!(
                "metric name must be 1..={MAX_NAME_LEN} bytes"
            )));
        }

        let mut metrics = self.inner.lock();
        if metrics.len() >= MAX_METRICS {
            warn!(name = %config.name, "metric registry saturated");
            return Err(Error::Full);
        }
        if metrics.iter().any(|m| m.config.name == config.name) {
            return Err(Error::invalid(format!(
                "metric {:?} already registered",
                config.name
            )));
        }

        debug!(name = %config.name, kind = config.kind.as_str(), "metric registered");
        metrics.push(MetricEntry {
            config,
            series: Vec::new(),
        });
        Ok(())
    }

    /// Add `delta` to a counter series.
    pub fn counter_add(&self, name: &str, label_values: &[&str], delta: u64) -> Result<()> {
        let mut metrics = self.inner.lock();
        let entry = find_entry(&mut metrics, name, MetricKind::Counter)?;
        match &mut entry.series_mut(label_values)?.value {
            MetricValue::Counter(v) => *v += delta,
            _ => unreachable!("kind checked by find_entry"),
        }
        Ok(())
    }

    /// Set a gauge series to `value`.
    pub fn gauge_set(&self, name: &str, label_values: &[&str], value: f64) -> Result<()> {
        let mut metrics = self.inner.lock();
        let entry = find_entry(&mut metrics, name, MetricKind::Gauge)?;
        match &mut entry.series_mut(label_values)?.value {
            MetricValue::Gauge(v) => *v = value,
            _ => unreachable!("kind checked by find_entry"),
        }
        Ok(())
    }

    /// Record one observation into a histogram series.
    pub fn histogram_observe(&self, name: &str, label_values: &[&str], value: f64) -> Result<()> {
        let mut metrics = self.inner.lock();
        let entry = find_entry(&mut metrics, name, MetricKind::Histogram)?;
        match &mut entry.series_mut(label_values)?.value {
            MetricValue::Histogram {
                count,
                sum,
                buckets,
            } => {
                *count += 1;
                *sum += value;
                for bucket in buckets.iter_mut() {
                    if value <= bucket.upper_bound {
                        bucket.count += 1;
                    }
                }
            }
            _ => unreachable!("kind checked by find_entry"),
        }
        Ok(())
    }

    /// Current value of a series. [`Error::Invalid`] for unknown metrics,
    /// [`Error::Empty`] when the label combination has never been updated.
    pub fn value(&self, name: &str, label_values: &[&str]) -> Result<MetricValue> {
        let metrics = self.inner.lock();
        let entry = metrics
            .iter()
            .find(|m| m.config.name == name)
            .ok_or_else(|| Error::invalid(format!("unknown metric {name:?}")))?;
        entry
            .series
            .iter()
            .find(|s| s.label_values.iter().map(String::as_str).eq(label_values.iter().copied()))
            .map(|s| s.value.clone())
            .ok_or(Error::Empty)
    }

    /// Render the full registry in the Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let metrics = self.inner.lock();
        let mut out = String::new();

        for entry in metrics.iter() {
            let name = &entry.config.name;
            let _ = writeln!(out, "# HELP {} {}", name, entry.config.description);
            let _ = writeln!(out, "# TYPE {} {}", name, entry.config.kind.as_str());

            for series in &entry.series {
                let labels = format_labels(&entry.config.labels, &series.label_values);
                match &series.value {
                    MetricValue::Counter(v) => {
                        let _ = writeln!(out, "{name}{labels} {v}");
                    }
                    MetricValue::Gauge(v) => {
                        let _ = writeln!(out, "{name}{labels} {v}");
                    }
                    MetricValue::Histogram { count, sum, .. } => {
                        let _ = writeln!(out, "{name}_count{labels} {count}");
                        let _ = writeln!(out, "{name}_sum{labels} {sum}");
                    }
                }
            }
        }

        out
    }

    /// Render into a caller-sized buffer, truncating at its boundary
    /// without partial-line repair. Returns the bytes actually written.
    pub fn export_prometheus_into(&self, buffer: &mut [u8]) -> usize {
        let rendered = self.export_prometheus();
        let n = rendered.len().min(buffer.len());
        buffer[..n].copy_from_slice(&rendered.as_bytes()[..n]);
        n
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

fn find_entry<'a>(
    metrics: &'a mut Vec<MetricEntry>,
    name: &str,
    kind: MetricKind,
) -> Result<&'a mut MetricEntry> {
    let entry = metrics
        .iter_mut()
        .find(|m| m.config.name == name)
        .ok_or_else(|| Error::invalid(format!("unknown metric {name:?}")))?;
    if entry.config.kind != kind {
        return Err(Error::invalid(format!(
            "metric {name:?} is a {}, not a {}",
            entry.config.kind.as_str(),
            kind.as_str()
        )));
    }
    Ok(entry)
}

/// `{k="v",...}` rendering; empty label sets render as nothing. Label
/// values are emitted verbatim, unescaped.
fn format_labels(names: &[String], values: &[String]) -> String {
    if values.is_empty() {
        return String::new();
    }

    let mut out = String::from("{");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let name = names.get(i).map(String::as_str).unwrap_or("label");
        let _ = write!(out, "{name}=\"{value}\"");
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_export_exact() {
        let collector = MetricsCollector::new();
        collector
            .register(MetricConfig::counter("http_requests", "n"))
            .unwrap();
        collector.counter_add("http_requests", &[], 3).unwrap();
        collector.counter_add("http_requests", &[], 2).unwrap();

        assert_eq!(
            collector.export_prometheus(),
            "# HELP http_requests n\n# TYPE http_requests counter\nhttp_requests 5\n"
        );
    }

    #[test]
    fn test_counter_is_monotonic() {
        let collector = MetricsCollector::new();
        collector
            .register(MetricConfig::counter("events", "e"))
            .unwrap();

        collector.counter_add("events", &[], 1).unwrap();
        let before = collector.value("events", &[]).unwrap();
        collector.counter_add("events", &[], 0).unwrap();
        collector.counter_add("events", &[], 7).unwrap();

        assert_eq!(before, MetricValue::Counter(1));
        assert_eq!(collector.value("events", &[]).unwrap(), MetricValue::Counter(8));
    }

    #[test]
    fn test_gauge_last_write_wins() {
        let collector = MetricsCollector::new();
        collector
            .register(MetricConfig::gauge("queue_depth", "d"))
            .unwrap();

        collector.gauge_set("queue_depth", &[], 10.0).unwrap();
        collector.gauge_set("queue_depth", &[], 2.5).unwrap();

        assert_eq!(
            collector.value("queue_depth", &[]).unwrap(),
            MetricValue::Gauge(2.5)
        );
        assert!(collector.export_prometheus().contains("queue_depth 2.5\n"));
    }

    #[test]
    fn test_histogram_count_sum_buckets() {
        let collector = MetricsCollector::new();
        collector
            .register(MetricConfig::histogram("latency", "l", vec![1.0, 10.0]))
            .unwrap();

        collector.histogram_observe("latency", &[], 0.5).unwrap();
        collector.histogram_observe("latency", &[], 5.0).unwrap();
        collector.histogram_observe("latency", &[], 50.0).unwrap();

        match collector.value("latency", &[]).unwrap() {
            MetricValue::Histogram {
                count,
                sum,
                buckets,
            } => {
                assert_eq!(count, 3);
                assert_eq!(sum, 55.5);
                assert_eq!(buckets[0].count, 1); // <= 1.0
                assert_eq!(buckets[1].count, 2); // <= 10.0
                assert_eq!(buckets[2].count, 3); // +Inf
            }
            other => panic!("unexpected value {other:?}"),
        }

        let text = collector.export_prometheus();
        assert!(text.contains("latency_count 3\n"));
        assert!(text.contains("latency_sum 55.5\n"));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let collector = MetricsCollector::new();
        collector
            .register(MetricConfig::counter("hits", "h"))
            .unwrap();

        assert!(matches!(
            collector.gauge_set("hits", &[], 1.0),
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            collector.histogram_observe("hits", &[], 1.0),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let collector = MetricsCollector::new();
        assert!(matches!(
            collector.counter_add("nope", &[], 1),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let collector = MetricsCollector::new();
        collector.register(MetricConfig::counter("dup", "a")).unwrap();
        assert!(matches!(
            collector.register(MetricConfig::gauge("dup", "b")),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_registry_capacity() {
        let collector = MetricsCollector::new();
        for i in 0..256 {
            collector
                .register(MetricConfig::counter(format!("m{i}"), "x"))
                .unwrap();
        }
        assert_eq!(
            collector.register(MetricConfig::counter("overflow", "x")),
            Err(Error::Full)
        );
    }

    #[test]
    fn test_label_dispatch() {
        let collector = MetricsCollector::new();
        collector
            .register(
                MetricConfig::counter("requests", "by method")
                    .with_labels(vec!["method".to_string()]),
            )
            .unwrap();

        collector.counter_add("requests", &["get"], 2).unwrap();
        collector.counter_add("requests", &["post"], 1).unwrap();
        collector.counter_add("requests", &["get"], 3).unwrap();

        assert_eq!(
            collector.value("requests", &["get"]).unwrap(),
            MetricValue::Counter(5)
        );
        assert_eq!(
            collector.value("requests", &["post"]).unwrap(),
            MetricValue::Counter(1)
        );

        let text = collector.export_prometheus();
        assert!(text.contains("requests{method=\"get\"} 5\n"));
        assert!(text.contains("requests{method=\"post\"} 1\n"));
    }

    #[test]
    fn test_series_capacity() {
        let collector = MetricsCollector::new();
        collector
            .register(
                MetricConfig::counter("shards", "per shard")
                    .with_labels(vec!["shard".to_string()]),
            )
            .unwrap();

        for i in 0..16 {
            collector
                .counter_add("shards", &[&format!("s{i}")], 1)
                .unwrap();
        }
        assert_eq!(
            collector.counter_add("shards", &["s16"], 1),
            Err(Error::Full)
        );
    }

    #[test]
    fn test_value_before_first_update() {
        let collector = MetricsCollector::new();
        collector
            .register(MetricConfig::counter("silent", "s"))
            .unwrap();
        assert_eq!(collector.value("silent", &[]), Err(Error::Empty));
    }

    #[test]
    fn test_export_into_truncates() {
        let collector = MetricsCollector::new();
        collector
            .register(MetricConfig::counter("http_requests", "n"))
            .unwrap();
        collector.counter_add("http_requests", &[], 5).unwrap();

        let full = collector.export_prometheus();
        let mut buf = vec![0u8; 10];
        let written = collector.export_prometheus_into(&mut buf);
        assert_eq!(written, 10);
        assert_eq!(&buf[..], &full.as_bytes()[..10]);

        let mut big = vec![0u8; 4096];
        let written = collector.export_prometheus_into(&mut big);
        assert_eq!(written, full.len());
        assert_eq!(&big[..written], full.as_bytes());
    }

    #[test]
    fn test_over_long_name_rejected() {
        let collector = MetricsCollector::new();
        let name = "x".repeat(129);
        assert!(matches!(
            collector.register(MetricConfig::counter(name, "too long")),
            Err(Error::Invalid(_))
        ));
    }
}
