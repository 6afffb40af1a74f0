//! Prometheus-style text exposition.
//!
//! Counters and gauges serialize as `name{k="v"} value`. Histograms emit
//! `_avg` and `_count` lines over the bounded history; no true Prometheus
//! buckets are produced.

use std::collections::{BTreeMap, HashMap};

use super::{Metric, MetricType};

fn format_labels(labels: &BTreeMap<String, String>) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let rendered: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{{{}}}", rendered.join(","))
}

pub fn prometheus_text(snapshot: &HashMap<String, Metric>) -> String {
    // Sort by registry key for deterministic output.
    let mut entries: Vec<(&String, &Metric)> = snapshot.iter().collect();
    entries.sort_by_key(|(key, _)| key.as_str());

    let mut out = String::new();
    for (_, metric) in entries {
        let labels = format_labels(&metric.labels);
        match metric.metric_type {
            MetricType::Counter | MetricType::Gauge => {
                out.push_str(&format!("{}{} {}\n", metric.name, labels, metric.value));
            }
            MetricType::Histogram => {
                out.push_str(&format!(
                    "{}_avg{} {}\n",
                    metric.name,
                    labels,
                    metric.history_mean()
                ));
                out.push_str(&format!(
                    "{}_count{} {}\n",
                    metric.name,
                    labels,
                    metric.history.len()
                ));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsRegistry;

    #[tokio::test]
    async fn test_counter_line_shape() {
        let registry = MetricsRegistry::new();
        registry
            .inc_counter("http_requests_total", &[("method", "GET"), ("path", "/a")])
            .await;

        let text = prometheus_text(&registry.snapshot().await);
        assert_eq!(text, "http_requests_total{method=\"GET\",path=\"/a\"} 1\n");
    }

    #[tokio::test]
    async fn test_histogram_avg_and_count_lines() {
        let registry = MetricsRegistry::new();
        registry.observe_histogram("latency", 0.2, &[]).await;
        registry.observe_histogram("latency", 0.4, &[]).await;

        let text = prometheus_text(&registry.snapshot().await);
        assert!(text.contains("latency_avg 0.3"));
        assert!(text.contains("latency_count 2"));
    }

    #[tokio::test]
    async fn test_labels_emitted_in_sorted_order() {
        let registry = MetricsRegistry::new();
        registry
            .inc_counter("reqs", &[("z", "1"), ("a", "2")])
            .await;

        let text = prometheus_text(&registry.snapshot().await);
        assert!(text.starts_with("reqs{a=\"2\",z=\"1\"}"));
    }

    #[tokio::test]
    async fn test_gauge_without_labels() {
        let registry = MetricsRegistry::new();
        registry.set_gauge("active_connections", 12.0, &[]).await;

        let text = prometheus_text(&registry.snapshot().await);
        assert_eq!(text, "active_connections 12\n");
    }
}
