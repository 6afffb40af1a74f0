//! Health evaluation over a metrics snapshot.
//!
//! A threshold breach is a monitoring signal, never an error: the evaluator
//! returns `healthy: false` with human-readable issue strings and the raw
//! ratios it computed. Dimensions with no data (zero denominator) are
//! skipped rather than failed closed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::summary::dashboard;
use super::Metric;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Maximum tolerated errors/requests ratio, in [0, 1].
    pub max_error_rate: f64,
    /// Maximum tolerated mean request duration, in seconds.
    pub max_avg_duration: f64,
    /// Maximum tolerated misses/(hits+misses) ratio, in [0, 1].
    pub max_cache_miss_rate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.05,
            max_avg_duration: 1.0,
            max_cache_miss_rate: 0.5,
        }
    }
}

/// Recomputed on every check, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResult {
    pub healthy: bool,
    pub details: HashMap<String, f64>,
    pub issues: Vec<String>,
}

pub fn evaluate(snapshot: &HashMap<String, Metric>, thresholds: &HealthThresholds) -> HealthResult {
    let summary = dashboard(snapshot);

    let mut details = HashMap::new();
    let mut issues = Vec::new();

    if summary.total_requests > 0.0 {
        let error_rate = summary.total_errors / summary.total_requests;
        details.insert("error_rate".to_string(), error_rate);
        if error_rate > thresholds.max_error_rate {
            issues.push(format!(
                "error rate {:.4} exceeds threshold {:.4}",
                error_rate, thresholds.max_error_rate
            ));
        }
    }

    if summary.avg_request_duration > 0.0 {
        details.insert("avg_duration".to_string(), summary.avg_request_duration);
        if summary.avg_request_duration > thresholds.max_avg_duration {
            issues.push(format!(
                "average duration {:.4}s exceeds threshold {:.4}s",
                summary.avg_request_duration, thresholds.max_avg_duration
            ));
        }
    }

    let cache_total = summary.cache_hits + summary.cache_misses;
    if cache_total > 0.0 {
        let miss_rate = summary.cache_misses / cache_total;
        details.insert("cache_miss_rate".to_string(), miss_rate);
        if miss_rate > thresholds.max_cache_miss_rate {
            issues.push(format!(
                "cache miss rate {:.4} exceeds threshold {:.4}",
                miss_rate, thresholds.max_cache_miss_rate
            ));
        }
    }

    HealthResult {
        healthy: issues.is_empty(),
        details,
        issues,
    }
}
