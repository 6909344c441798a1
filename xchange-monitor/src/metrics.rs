//! Label-safe counters, gauges, and histograms with a Prometheus text
//! exposition format. Grounded on the corpus-wide hand-rolled-registry
//! convention (atomics/locks behind a `HashMap`, no external metrics crate)
//! rather than a dependency like `prometheus` or `metrics`, since nothing in
//! the example pack reaches for one.

use parking_lot::RwLock;
use smol_str::SmolStr;
use std::collections::{HashMap, VecDeque};
use xchange_schema::{MetricDef, MetricKind};

/// Default bucket boundaries (ms) used when [`MetricRegistry::register_histogram`]
/// doesn't supply its own; tuned for request/stream latency.
pub const DEFAULT_BUCKETS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0,
];

/// Sorted `(label key, label value)` pairs; sorting here (rather than at
/// exposition time) makes two calls with the same labels in different order
/// collide on the same series, as the contract requires.
pub type Labels = Vec<(SmolStr, SmolStr)>;

fn sorted_labels(labels: &[(&str, &str)]) -> Labels {
    let mut pairs: Labels = labels
        .iter()
        .map(|(k, v)| (SmolStr::new(*k), SmolStr::new(*v)))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

fn format_labels(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[derive(Debug, Clone, Default)]
struct HistogramState {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

struct HistogramSpec {
    buckets: Vec<f64>,
}

#[derive(Default)]
struct Series {
    counters: HashMap<Labels, f64>,
    gauges: HashMap<Labels, f64>,
    histograms: HashMap<Labels, HistogramState>,
}

pub struct MetricRegistry {
    defs: RwLock<HashMap<SmolStr, MetricDef>>,
    histogram_specs: RwLock<HashMap<SmolStr, HistogramSpec>>,
    series: RwLock<HashMap<SmolStr, Series>>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            defs: RwLock::new(HashMap::new()),
            histogram_specs: RwLock::new(HashMap::new()),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, def: MetricDef) {
        self.series.write().entry(def.name.clone()).or_default();
        self.defs.write().insert(def.name.clone(), def);
    }

    pub fn register_histogram(&self, def: MetricDef, buckets: Vec<f64>) {
        let mut buckets = buckets;
        buckets.sort_by(|a, b| a.partial_cmp(b).unwrap());
        self.histogram_specs
            .write()
            .insert(def.name.clone(), HistogramSpec { buckets });
        self.register(def);
    }

    fn buckets_for(&self, name: &str) -> Vec<f64> {
        self.histogram_specs
            .read()
            .get(name)
            .map(|s| s.buckets.clone())
            .unwrap_or_else(|| DEFAULT_BUCKETS.to_vec())
    }

    pub fn inc_counter(&self, name: &str, delta: f64, labels: &[(&str, &str)]) {
        let key = sorted_labels(labels);
        let mut series = self.series.write();
        let entry = series.entry(SmolStr::new(name)).or_default();
        *entry.counters.entry(key).or_insert(0.0) += delta;
    }

    pub fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let key = sorted_labels(labels);
        let mut series = self.series.write();
        let entry = series.entry(SmolStr::new(name)).or_default();
        entry.gauges.insert(key, value);
    }

    pub fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let buckets = self.buckets_for(name);
        let key = sorted_labels(labels);
        let mut series = self.series.write();
        let entry = series.entry(SmolStr::new(name)).or_default();
        let state = entry
            .histograms
            .entry(key)
            .or_insert_with(|| HistogramState {
                bucket_counts: vec![0; buckets.len()],
                sum: 0.0,
                count: 0,
            });
        for (i, le) in buckets.iter().enumerate() {
            if value <= *le {
                state.bucket_counts[i] += 1;
            }
        }
        state.sum += value;
        state.count += 1;
    }

    /// Renders every registered series as Prometheus text exposition.
    pub fn expose(&self) -> String {
        let defs = self.defs.read();
        let series = self.series.read();
        let mut out = String::new();

        let mut names: Vec<&SmolStr> = defs.keys().collect();
        names.sort();

        for name in names {
            let def = &defs[name];
            let type_str = match def.kind {
                MetricKind::Counter => "counter",
                MetricKind::Gauge => "gauge",
                MetricKind::Histogram => "histogram",
            };
            out.push_str(&format!("# HELP {name} {}\n", def.help));
            out.push_str(&format!("# TYPE {name} {type_str}\n"));

            let Some(s) = series.get(name) else {
                continue;
            };
            match def.kind {
                MetricKind::Counter => {
                    let mut rows: Vec<_> = s.counters.iter().collect();
                    rows.sort_by_key(|(labels, _)| format_labels(labels));
                    for (labels, value) in rows {
                        let lbl = format_labels(labels);
                        if lbl.is_empty() {
                            out.push_str(&format!("{name} {value}\n"));
                        } else {
                            out.push_str(&format!("{name}{{{lbl}}} {value}\n"));
                        }
                    }
                }
                MetricKind::Gauge => {
                    let mut rows: Vec<_> = s.gauges.iter().collect();
                    rows.sort_by_key(|(labels, _)| format_labels(labels));
                    for (labels, value) in rows {
                        let lbl = format_labels(labels);
                        if lbl.is_empty() {
                            out.push_str(&format!("{name} {value}\n"));
                        } else {
                            out.push_str(&format!("{name}{{{lbl}}} {value}\n"));
                        }
                    }
                }
                MetricKind::Histogram => {
                    let buckets = self.buckets_for(name);
                    let mut rows: Vec<_> = s.histograms.iter().collect();
                    rows.sort_by_key(|(labels, _)| format_labels(labels));
                    for (labels, state) in rows {
                        let base = format_labels(labels);
                        for (i, le) in buckets.iter().enumerate() {
                            let lbl = if base.is_empty() {
                                format!("le=\"{le}\"")
                            } else {
                                format!("{base},le=\"{le}\"")
                            };
                            out.push_str(&format!("{name}_bucket{{{lbl}}} {}\n", state.bucket_counts[i]));
                        }
                        let inf_lbl = if base.is_empty() {
                            "le=\"+Inf\"".to_string()
                        } else {
                            format!("{base},le=\"+Inf\"")
                        };
                        out.push_str(&format!("{name}_bucket{{{inf_lbl}}} {}\n", state.count));
                        if base.is_empty() {
                            out.push_str(&format!("{name}_sum {}\n", state.sum));
                            out.push_str(&format!("{name}_count {}\n", state.count));
                        } else {
                            out.push_str(&format!("{name}_sum{{{base}}} {}\n", state.sum));
                            out.push_str(&format!("{name}_count{{{base}}} {}\n", state.count));
                        }
                    }
                }
            }
        }
        out
    }
}

/// A time-stamped ring of recent samples (PnL, margin, latency, error
/// records) that prunes entries older than a configured retention window.
/// Histogram bucket state itself is never pruned — only these auxiliary
/// history buffers are.
#[derive(Debug)]
pub struct TimestampedHistory<T> {
    entries: VecDeque<(i64, T)>,
    retention_ms: i64,
}

impl<T> TimestampedHistory<T> {
    pub fn new(retention_ms: i64) -> Self {
        Self {
            entries: VecDeque::new(),
            retention_ms,
        }
    }

    pub fn push(&mut self, timestamp_ms: i64, value: T) {
        self.entries.push_back((timestamp_ms, value));
        self.prune(timestamp_ms);
    }

    pub fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.retention_ms;
        while matches!(self.entries.front(), Some((ts, _)) if *ts < cutoff) {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(i64, T)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xchange_schema::MetricKind;

    fn counter_def(name: &str) -> MetricDef {
        MetricDef {
            name: name.into(),
            kind: MetricKind::Counter,
            help: "test counter".into(),
            label_keys: vec!["venue".into()],
        }
    }

    #[test]
    fn counter_sums_deltas_across_the_same_label_tuple() {
        let registry = MetricRegistry::new();
        registry.register(counter_def("orders_total"));
        registry.inc_counter("orders_total", 1.0, &[("venue", "binance")]);
        registry.inc_counter("orders_total", 2.5, &[("venue", "binance")]);
        let exposed = registry.expose();
        assert!(exposed.contains("orders_total{venue=\"binance\"} 3.5"));
    }

    #[test]
    fn label_tuple_order_does_not_create_distinct_series() {
        let registry = MetricRegistry::new();
        registry.register(MetricDef {
            name: "requests_total".into(),
            kind: MetricKind::Counter,
            help: "requests".into(),
            label_keys: vec!["venue".into(), "method".into()],
        });
        registry.inc_counter("requests_total", 1.0, &[("venue", "binance"), ("method", "GET")]);
        registry.inc_counter("requests_total", 1.0, &[("method", "GET"), ("venue", "binance")]);
        let exposed = registry.expose();
        assert!(exposed.contains("requests_total{method=\"GET\",venue=\"binance\"} 2"));
    }

    #[test]
    fn histogram_buckets_are_monotonic_and_inf_equals_count() {
        let registry = MetricRegistry::new();
        registry.register_histogram(
            MetricDef {
                name: "latency_ms".into(),
                kind: MetricKind::Histogram,
                help: "latency".into(),
                label_keys: vec![],
            },
            vec![10.0, 50.0, 100.0],
        );
        for v in [5.0, 40.0, 75.0, 500.0] {
            registry.observe_histogram("latency_ms", v, &[]);
        }
        let exposed = registry.expose();
        assert!(exposed.contains("latency_ms_bucket{le=\"10\"} 1"));
        assert!(exposed.contains("latency_ms_bucket{le=\"50\"} 2"));
        assert!(exposed.contains("latency_ms_bucket{le=\"100\"} 3"));
        assert!(exposed.contains("latency_ms_bucket{le=\"+Inf\"} 4"));
        assert!(exposed.contains("latency_ms_count 4"));
    }

    #[test]
    fn history_prunes_entries_older_than_retention() {
        let mut history = TimestampedHistory::new(1_000);
        history.push(0, 1);
        history.push(500, 2);
        history.push(1_500, 3);
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().next().unwrap().0, 500);
    }
}
