//! Error types.
//!
//! Only configuration mistakes are surfaced as hard errors. Tokenizer and
//! summarizer failures are recovered inside the crate and reported through
//! logs and [`BudgetEvent`](crate::events::BudgetEvent)s instead.

use std::time::Duration;

/// A budget or compaction configuration was rejected at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("capacity must be greater than zero")]
    ZeroCapacity,

    #[error(
        "thresholds must satisfy 0 < warning < prune < emergency <= 1 \
         (got warning={warning}, prune={prune}, emergency={emergency})"
    )]
    ThresholdOrder {
        warning: f64,
        prune: f64,
        emergency: f64,
    },

    #[error("{name} must be in (0, 1], got {value}")]
    RatioOutOfRange { name: &'static str, value: f64 },

    #[error("{name} must be at least 1")]
    ZeroCount { name: &'static str },

    #[error("{name} must be a finite, non-negative number, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("invalid critical pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Why a summarization attempt produced no usable summary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SummarizeError {
    /// The summarizer returned an error.
    #[error("summarizer failed: {0}")]
    Failed(String),

    /// The summarizer did not answer within the configured timeout.
    #[error("summarizer timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    /// The caller cancelled the handoff while the summarizer was running.
    #[error("summarization cancelled")]
    Cancelled,

    /// The summarizer answered with nothing but whitespace.
    #[error("summarizer returned an empty summary")]
    EmptySummary,
}

impl SummarizeError {
    /// Short machine-readable code for telemetry sinks.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Failed(_) => "failed",
            Self::TimedOut(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::EmptySummary => "empty_summary",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_error_names_values() {
        let err = ConfigError::ThresholdOrder {
            warning: 0.9,
            prune: 0.8,
            emergency: 0.95,
        };
        let text = err.to_string();
        assert!(text.contains("warning=0.9"));
        assert!(text.contains("prune=0.8"));
    }

    #[test]
    fn timeout_message_uses_millis() {
        let err = SummarizeError::TimedOut(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "summarizer timed out after 1500ms");
        assert_eq!(err.code(), "timeout");
    }
}
