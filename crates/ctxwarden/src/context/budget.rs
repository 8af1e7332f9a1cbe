//! Context health: token usage against capacity, classified into a status.
//!
//! [`health`] is a pure function of the history, the budget, and the bound
//! token counter. Calling it twice on the same input yields identical
//! output and never touches the history. The [`ContextHealth`] it returns
//! is what the eviction strategies consult to decide whether to act, and
//! what a surrounding dashboard reads.

use crate::Message;
use crate::config::BudgetConfig;
use crate::context::tokens::TokenCounter;
use serde::{Deserialize, Serialize};

/// Discrete budget pressure.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Prune,
    Emergency,
}

impl HealthStatus {
    /// Classify a usage fraction against the configured thresholds.
    pub fn classify(percentage: f64, config: &BudgetConfig) -> Self {
        if percentage >= config.emergency_threshold() {
            HealthStatus::Emergency
        } else if percentage >= config.prune_threshold() {
            HealthStatus::Prune
        } else if percentage >= config.warning_threshold() {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Prune => write!(f, "prune"),
            HealthStatus::Emergency => write!(f, "emergency"),
        }
    }
}

/// Snapshot of context usage for one history.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ContextHealth {
    /// Tokens consumed by the history.
    pub tokens: usize,
    /// Budget capacity.
    pub capacity: usize,
    /// `tokens / capacity` (may exceed 1.0).
    pub percentage: f64,
    pub status: HealthStatus,
    /// True at or above the prune threshold.
    pub needs_reduction: bool,
}

impl ContextHealth {
    /// Classify an already-measured token count.
    pub fn from_tokens(tokens: usize, config: &BudgetConfig) -> Self {
        let capacity = config.capacity();
        let percentage = tokens as f64 / capacity as f64;
        Self {
            tokens,
            capacity,
            percentage,
            status: HealthStatus::classify(percentage, config),
            needs_reduction: percentage >= config.prune_threshold(),
        }
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: {} tokens ({:.0}% of {}, {})",
            self.tokens,
            self.percentage * 100.0,
            self.capacity,
            self.status,
        )
    }
}

/// Measure `history` and classify the result.
pub fn health(history: &[Message], config: &BudgetConfig, counter: &TokenCounter) -> ContextHealth {
    ContextHealth::from_tokens(counter.count_history(history), config)
}

/// Advisory notice for the current pressure, or `None` while healthy.
pub fn advisory(health: &ContextHealth) -> Option<String> {
    match health.status {
        HealthStatus::Healthy => None,
        HealthStatus::Warning => Some(format!(
            "[Context notice: ~{:.0}% of context budget used. \
             Prefer concise answers and avoid pulling in large outputs.]",
            health.percentage * 100.0,
        )),
        HealthStatus::Prune => Some(format!(
            "[Context notice: ~{:.0}% of context budget used ({} / {} tokens). \
             Older history will be pruned.]",
            health.percentage * 100.0,
            health.tokens,
            health.capacity,
        )),
        HealthStatus::Emergency => Some(format!(
            "[Context notice: ~{:.0}% of context budget used ({} / {} tokens). \
             Context is nearly exhausted; finish the current step NOW.]",
            health.percentage * 100.0,
            health.tokens,
            health.capacity,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BudgetConfig {
        BudgetConfig::builder(100)
            .with_thresholds(0.70, 0.80, 0.95)
            .build()
            .unwrap()
    }

    /// One message worth exactly `tokens` under the default counter.
    fn message_of(tokens: usize) -> Message {
        Message::user("x".repeat((tokens - 4) * 4))
    }

    #[test]
    fn eighty_five_of_hundred_is_prune() {
        let history = vec![message_of(85)];
        let h = health(&history, &config(), &TokenCounter::new());
        assert_eq!(h.tokens, 85);
        assert_eq!(h.status, HealthStatus::Prune);
        assert!(h.needs_reduction);
        assert!((h.percentage - 0.85).abs() < 1e-9);
    }

    #[test]
    fn status_boundaries_are_inclusive() {
        let config = config();
        let cases = [
            (69, HealthStatus::Healthy, false),
            (70, HealthStatus::Warning, false),
            (79, HealthStatus::Warning, false),
            (80, HealthStatus::Prune, true),
            (95, HealthStatus::Emergency, true),
            (140, HealthStatus::Emergency, true),
        ];
        for (tokens, status, needs) in cases {
            let h = ContextHealth::from_tokens(tokens, &config);
            assert_eq!(h.status, status, "{tokens} tokens");
            assert_eq!(h.needs_reduction, needs, "{tokens} tokens");
        }
    }

    #[test]
    fn health_is_idempotent_and_side_effect_free() {
        let history = vec![message_of(40), message_of(30)];
        let snapshot = history.clone();
        let config = config();
        let counter = TokenCounter::new();

        let first = health(&history, &config, &counter);
        let second = health(&history, &config, &counter);
        assert_eq!(first, second);
        assert_eq!(history, snapshot);
    }

    #[test]
    fn empty_history_is_healthy() {
        let h = health(&[], &config(), &TokenCounter::new());
        assert_eq!(h.tokens, 0);
        assert_eq!(h.status, HealthStatus::Healthy);
        assert!(advisory(&h).is_none());
    }

    #[test]
    fn advisories_escalate() {
        let config = config();
        let warning = advisory(&ContextHealth::from_tokens(72, &config)).unwrap();
        assert!(warning.contains("Prefer concise"));
        let prune = advisory(&ContextHealth::from_tokens(85, &config)).unwrap();
        assert!(prune.contains("will be pruned"));
        let emergency = advisory(&ContextHealth::from_tokens(99, &config)).unwrap();
        assert!(emergency.contains("NOW"));
    }

    #[test]
    fn log_string_format() {
        let h = ContextHealth::from_tokens(85, &config());
        let log = h.to_log_string();
        assert!(log.contains("context:"));
        assert!(log.contains("85 tokens"));
        assert!(log.contains("prune"));
    }

    #[test]
    fn statuses_are_ordered_by_severity() {
        assert!(HealthStatus::Healthy < HealthStatus::Warning);
        assert!(HealthStatus::Prune < HealthStatus::Emergency);
    }
}
