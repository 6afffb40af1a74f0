//! In-process metrics collection.
//!
//! A registry of typed metrics (counter, gauge, bounded histogram) keyed by
//! name plus label set. Labels are sorted before key construction so the same
//! logical metric always resolves to the same entry regardless of the order
//! the caller supplies them in. The summary, health, and export views read
//! from defensive snapshots and never mutate the registry.

pub mod export;
pub mod health;
pub mod summary;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::RwLock;

/// Maximum histogram observations retained per metric. Oldest entries are
/// evicted first, biasing statistics toward recent traffic.
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

/// A single metric sample. Identity is the `(name, labels)` pair; `history`
/// is populated for histograms only.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "VecDeque::is_empty")]
    pub history: VecDeque<f64>,
    pub timestamp: u64,
}

impl Metric {
    fn new(name: &str, metric_type: MetricType, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            metric_type,
            value: 0.0,
            labels,
            history: VecDeque::new(),
            timestamp: now_secs(),
        }
    }

    /// Arithmetic mean of the retained history, 0.0 when empty.
    pub fn history_mean(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn sorted_labels(labels: &[(&str, &str)]) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Builds the registry key for a metric. Labels arrive pre-sorted via the
/// BTreeMap, so two calls with the same label set always collide here.
fn metric_key(name: &str, labels: &BTreeMap<String, String>) -> String {
    let mut key = name.to_string();
    for (k, v) in labels {
        key.push_str(&format!(":{}={}", k, v));
    }
    key
}

/// Process-wide metric store. Constructed once at startup and injected into
/// every middleware; cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    metrics: Arc<RwLock<HashMap<String, Metric>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn inc_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.add_counter(name, 1.0, labels).await;
    }

    pub async fn add_counter(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let labels = sorted_labels(labels);
        let key = metric_key(name, &labels);

        let mut metrics = self.metrics.write().await;
        let metric = metrics
            .entry(key)
            .or_insert_with(|| Metric::new(name, MetricType::Counter, labels));
        metric.value += value;
        metric.timestamp = now_secs();
    }

    pub async fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let labels = sorted_labels(labels);
        let key = metric_key(name, &labels);

        let mut metrics = self.metrics.write().await;
        let metric = metrics
            .entry(key)
            .or_insert_with(|| Metric::new(name, MetricType::Gauge, labels));
        metric.value = value;
        metric.timestamp = now_secs();
    }

    pub async fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let labels = sorted_labels(labels);
        let key = metric_key(name, &labels);

        let mut metrics = self.metrics.write().await;
        let metric = metrics
            .entry(key)
            .or_insert_with(|| Metric::new(name, MetricType::Histogram, labels));
        metric.history.push_back(value);
        while metric.history.len() > HISTORY_LIMIT {
            metric.history.pop_front();
        }
        metric.value = value;
        metric.timestamp = now_secs();
    }

    /// Defensive copy of every metric keyed by its canonical name.
    pub async fn snapshot(&self) -> HashMap<String, Metric> {
        self.metrics.read().await.clone()
    }

    /// Clears all metrics. Intended for test isolation only.
    pub async fn reset(&self) {
        self.metrics.write().await.clear();
    }

    // Recorders used by the gateway chain.

    pub async fn record_request(&self, method: &str, path: &str) {
        self.inc_counter("http_requests_total", &[("method", method), ("path", path)])
            .await;
    }

    pub async fn record_error(&self, method: &str, path: &str, status: u16) {
        self.inc_counter(
            "http_errors_total",
            &[("method", method), ("path", path), ("status", &status.to_string())],
        )
        .await;
    }

    pub async fn record_duration(&self, method: &str, path: &str, seconds: f64) {
        self.observe_histogram(
            "http_request_duration_seconds",
            seconds,
            &[("method", method), ("path", path)],
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counter_accumulates() {
        let registry = MetricsRegistry::new();

        registry.inc_counter("hits", &[]).await;
        registry.add_counter("hits", 2.5, &[]).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot["hits"].value, 3.5);
        assert_eq!(snapshot["hits"].metric_type, MetricType::Counter);
    }

    #[tokio::test]
    async fn test_gauge_overwrites() {
        let registry = MetricsRegistry::new();

        registry.set_gauge("temp", 10.0, &[]).await;
        registry.set_gauge("temp", 4.0, &[]).await;

        assert_eq!(registry.snapshot().await["temp"].value, 4.0);
    }

    #[tokio::test]
    async fn test_label_order_does_not_split_metrics() {
        let registry = MetricsRegistry::new();

        registry
            .inc_counter("reqs", &[("a", "1"), ("b", "2")])
            .await;
        registry
            .inc_counter("reqs", &[("b", "2"), ("a", "1")])
            .await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["reqs:a=1:b=2"].value, 2.0);
    }

    #[tokio::test]
    async fn test_histogram_history_bounded_fifo() {
        let registry = MetricsRegistry::new();

        for i in 0..150 {
            registry.observe_histogram("lat", i as f64, &[]).await;
        }

        let snapshot = registry.snapshot().await;
        let history = &snapshot["lat"].history;
        assert_eq!(history.len(), HISTORY_LIMIT);
        // Oldest 50 evicted: the retained window is 50..150.
        assert_eq!(*history.front().unwrap(), 50.0);
        assert_eq!(*history.back().unwrap(), 149.0);
    }

    #[tokio::test]
    async fn test_history_mean() {
        let registry = MetricsRegistry::new();

        registry.observe_histogram("lat", 1.0, &[]).await;
        registry.observe_histogram("lat", 3.0, &[]).await;

        assert_eq!(registry.snapshot().await["lat"].history_mean(), 2.0);
    }

    #[tokio::test]
    async fn test_snapshot_is_defensive() {
        let registry = MetricsRegistry::new();
        registry.inc_counter("hits", &[]).await;

        let mut snapshot = registry.snapshot().await;
        snapshot.get_mut("hits").unwrap().value = 99.0;

        assert_eq!(registry.snapshot().await["hits"].value, 1.0);
    }

    #[tokio::test]
    async fn test_reset_clears_all() {
        let registry = MetricsRegistry::new();
        registry.inc_counter("hits", &[]).await;
        registry.reset().await;
        assert!(registry.snapshot().await.is_empty());
    }
}
