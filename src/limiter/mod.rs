//! Rate limiting engine.
//!
//! Three limiter strategies built atop the counter store: the three-tier
//! fixed-window limiter used by the gateway chain, a sub-bucketed sliding
//! window, and a token bucket with lazy refill.

pub mod sliding_window;
pub mod tiered;
pub mod token_bucket;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use sliding_window::SlidingWindowLimiter;
pub use tiered::{TieredLimiter, TierUsage};
pub use token_bucket::TokenBucketLimiter;

/// Identifier charged when the request carries no `X-API-Key`.
pub const ANONYMOUS_IDENTIFIER: &str = "anonymous";

/// Per-path admission budget.
///
/// `burst == 0` means the burst tier is skipped entirely, not that every
/// request is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    /// Requests per minute.
    pub rate: u32,
    /// Requests per day.
    pub daily: u32,
    /// Requests per second; 0 disables the burst tier.
    pub burst: u32,
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            rate: 60,
            daily: 10_000,
            burst: 10,
        }
    }
}

/// Path→strategy resolution table: exact match first, then longest matching
/// prefix, then the default strategy.
#[derive(Debug, Clone, Default)]
pub struct StrategyTable {
    overrides: HashMap<String, Strategy>,
    default_strategy: Strategy,
}

impl StrategyTable {
    pub fn new(default_strategy: Strategy) -> Self {
        Self {
            overrides: HashMap::new(),
            default_strategy,
        }
    }

    pub fn insert(&mut self, path: impl Into<String>, strategy: Strategy) {
        self.overrides.insert(path.into(), strategy);
    }

    pub fn default_strategy(&self) -> Strategy {
        self.default_strategy
    }

    /// Resolves the strategy for a request path.
    pub fn resolve(&self, path: &str) -> Strategy {
        if let Some(strategy) = self.overrides.get(path) {
            return *strategy;
        }

        self.overrides
            .iter()
            .filter(|(pattern, _)| path.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, strategy)| *strategy)
            .unwrap_or(self.default_strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(rate: u32) -> Strategy {
        Strategy { rate, daily: 1000, burst: 0 }
    }

    #[test]
    fn test_exact_match_wins_over_prefix() {
        let mut table = StrategyTable::new(Strategy::default());
        table.insert("/api", strategy(5));
        table.insert("/api/upload", strategy(1));

        assert_eq!(table.resolve("/api/upload").rate, 1);
        assert_eq!(table.resolve("/api").rate, 5);
    }

    #[test]
    fn test_longest_prefix_match() {
        let mut table = StrategyTable::new(Strategy::default());
        table.insert("/api", strategy(5));
        table.insert("/api/v2", strategy(2));

        assert_eq!(table.resolve("/api/v2/items").rate, 2);
        assert_eq!(table.resolve("/api/v1/items").rate, 5);
    }

    #[test]
    fn test_fallback_to_default() {
        let table = StrategyTable::new(strategy(42));
        assert_eq!(table.resolve("/unmatched").rate, 42);
    }
}
