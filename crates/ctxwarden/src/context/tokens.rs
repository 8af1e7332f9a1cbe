//! Token accounting for text and message histories.
//!
//! A [`TokenCounter`] measures text with an injected [`Tokenizer`] when one
//! is bound, and falls back to `ceil(chars / 4)` when it is absent or fails.
//! The fallback is deterministic and monotonic in input length, so the
//! eviction strategies converge no matter which path measured a message.

use crate::Message;
use crate::config::{BudgetConfig, DEFAULT_PER_MESSAGE_OVERHEAD};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Characters per token assumed by the fallback approximation.
pub const FALLBACK_CHARS_PER_TOKEN: usize = 4;

/// A precise tokenizer capability, typically wrapping a model's BPE.
///
/// Returning `Err` is allowed; the counter degrades to the character
/// approximation for that call.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> Result<usize, String>;
}

impl<F> Tokenizer for F
where
    F: Fn(&str) -> Result<usize, String> + Send + Sync,
{
    fn count_tokens(&self, text: &str) -> Result<usize, String> {
        self(text)
    }
}

/// `ceil(character_count / 4)`.
pub fn approximate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(FALLBACK_CHARS_PER_TOKEN)
}

/// Measures token cost of text, messages, and whole histories.
///
/// Cheap to clone; the tokenizer is shared behind an `Arc`.
#[derive(Clone)]
pub struct TokenCounter {
    tokenizer: Option<Arc<dyn Tokenizer>>,
    per_message_overhead: usize,
}

impl TokenCounter {
    /// Approximation-only counter with the default per-message overhead.
    pub fn new() -> Self {
        Self {
            tokenizer: None,
            per_message_overhead: DEFAULT_PER_MESSAGE_OVERHEAD,
        }
    }

    /// Counter using the overhead configured on a budget.
    pub fn for_config(config: &BudgetConfig) -> Self {
        Self::new().with_per_message_overhead(config.per_message_overhead())
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn with_per_message_overhead(mut self, tokens: usize) -> Self {
        self.per_message_overhead = tokens;
        self
    }

    pub fn per_message_overhead(&self) -> usize {
        self.per_message_overhead
    }

    pub fn has_tokenizer(&self) -> bool {
        self.tokenizer.is_some()
    }

    /// Tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        match &self.tokenizer {
            Some(tokenizer) => match tokenizer.count_tokens(text) {
                Ok(tokens) => tokens,
                Err(e) => {
                    debug!("Tokenizer failed ({e}); using character approximation");
                    approximate_tokens(text)
                }
            },
            None => approximate_tokens(text),
        }
    }

    /// Tokens for one message: serialized content plus the fixed overhead.
    pub fn count_message(&self, message: &Message) -> usize {
        self.count(&message.text()) + self.per_message_overhead
    }

    /// Sum of [`count_message`](Self::count_message) over a history.
    pub fn count_history(&self, history: &[Message]) -> usize {
        history.iter().map(|m| self.count_message(m)).sum()
    }

    /// Per-message counts, index-aligned with `history`.
    pub fn count_each(&self, history: &[Message]) -> Vec<usize> {
        history.iter().map(|m| self.count_message(m)).collect()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter")
            .field("tokenizer", &self.tokenizer.as_ref().map(|_| "<dyn Tokenizer>"))
            .field("per_message_overhead", &self.per_message_overhead)
            .finish()
    }
}
