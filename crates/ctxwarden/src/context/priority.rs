//! Relevance scoring for individual messages.
//!
//! The score of a message is
//!
//! ```text
//! roleWeight(role)
//!   + (index / len) * recency_weight
//!   - length_penalty            if serialized length > length_threshold
//!   + critical_bonus            if content matches a critical pattern
//!   - decay_rate * (len - 1 - index)
//! ```
//!
//! Scores are unbounded reals; only their relative order matters.

use crate::Message;
use crate::config::BudgetConfig;

/// Score `message` sitting at `index` in a history of `len` messages.
pub fn score(message: &Message, index: usize, len: usize, config: &BudgetConfig) -> f64 {
    let mut score = config.role_weights().weight(message.role);

    if len > 0 {
        score += (index as f64 / len as f64) * config.recency_weight();
    }

    let text = message.text();
    if text.chars().count() > config.length_threshold() {
        score -= config.length_penalty();
    }

    if config.critical_patterns().is_match(&text) {
        score += config.critical_bonus();
    }

    if config.decay_rate() > 0.0 {
        let age = len.saturating_sub(index + 1);
        score -= config.decay_rate() * age as f64;
    }

    score
}

/// Score every message of a history, index-aligned.
pub fn score_history(history: &[Message], config: &BudgetConfig) -> Vec<f64> {
    let len = history.len();
    history
        .iter()
        .enumerate()
        .map(|(i, m)| score(m, i, len, config))
        .collect()
}
