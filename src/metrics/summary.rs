//! Dashboard aggregation over a metrics snapshot.

use std::collections::HashMap;

use serde::Serialize;

use super::{Metric, MetricType};

/// Aggregate view served to dashboards. Counts are summed across every label
/// combination of the matching metric family; the duration figure is the
/// arithmetic mean of retained histogram samples, not a percentile.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardSummary {
    pub total_requests: f64,
    pub total_errors: f64,
    pub db_queries: f64,
    pub cache_hits: f64,
    pub cache_misses: f64,
    pub avg_request_duration: f64,
}

pub fn dashboard(snapshot: &HashMap<String, Metric>) -> DashboardSummary {
    let mut summary = DashboardSummary::default();

    let mut duration_sum = 0.0;
    let mut duration_count = 0usize;

    for (key, metric) in snapshot {
        if key.contains("http_requests_total") {
            summary.total_requests += metric.value;
        } else if key.contains("http_errors_total") {
            summary.total_errors += metric.value;
        } else if key.contains("db_queries_total") {
            summary.db_queries += metric.value;
        } else if key.contains("cache_hits_total") {
            summary.cache_hits += metric.value;
        } else if key.contains("cache_misses_total") {
            summary.cache_misses += metric.value;
        }

        if metric.metric_type == MetricType::Histogram && key.contains("duration") {
            duration_sum += metric.history.iter().sum::<f64>();
            duration_count += metric.history.len();
        }
    }

    if duration_count > 0 {
        summary.avg_request_duration = duration_sum / duration_count as f64;
    }

    summary
}
