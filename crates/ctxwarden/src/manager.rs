//! Interactive budget facade.
//!
//! [`ContextManager`] binds a [`BudgetConfig`], a [`TokenCounter`], an
//! [`EvictionStrategy`], and an [`EventHandler`] so callers can measure and
//! prune a working history with one call each:
//!
//! ```
//! use ctxwarden::prelude::*;
//!
//! let config = BudgetConfig::builder(100).build().unwrap();
//! let manager = ContextManager::new(config).with_strategy(EvictionStrategy::Temporal);
//!
//! let history: Vec<Message> = (0..20)
//!     .map(|i| Message::user(format!("turn {i:02}")).at(i))
//!     .collect();
//!
//! let reduction = manager.prune(&history);
//! assert!(reduction.tokens_after <= reduction.tokens_before);
//! assert!(manager.health(&reduction.messages).tokens == reduction.tokens_after);
//! ```

use crate::Message;
use crate::config::BudgetConfig;
use crate::context::budget::{self, ContextHealth};
use crate::context::eviction::{EvictionStrategy, Reduction};
use crate::context::tokens::{TokenCounter, Tokenizer};
use crate::events::{BudgetEvent, EventHandler, NoopHandler};
use std::sync::Arc;
use tracing::debug;

/// Measures and prunes histories against one interactive budget.
///
/// Holds no per-history state, so a single manager can serve many threads.
pub struct ContextManager {
    config: BudgetConfig,
    counter: TokenCounter,
    strategy: EvictionStrategy,
    events: Arc<dyn EventHandler>,
}

impl ContextManager {
    /// Manager with the adaptive strategy and the approximate counter.
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            counter: TokenCounter::for_config(&config),
            config,
            strategy: EvictionStrategy::default(),
            events: Arc::new(NoopHandler),
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.counter = self.counter.with_tokenizer(tokenizer);
        self
    }

    pub fn with_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = handler;
        self
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    pub fn strategy(&self) -> EvictionStrategy {
        self.strategy
    }

    pub fn count_tokens(&self, history: &[Message]) -> usize {
        self.counter.count_history(history)
    }

    pub fn health(&self, history: &[Message]) -> ContextHealth {
        budget::health(history, &self.config, &self.counter)
    }

    /// Advisory notice for the model at the current pressure, if any.
    pub fn advisory(&self, history: &[Message]) -> Option<String> {
        budget::advisory(&self.health(history))
    }

    /// Reduce `history` with the bound strategy.
    ///
    /// The target is [`BudgetConfig::reduction_target`] of the current
    /// count. Below the prune threshold the history comes back unchanged
    /// and no event fires. A result above its target is reported through
    /// [`Reduction::is_satisfied`] and a
    /// [`BudgetEvent::BudgetUnsatisfied`] event.
    pub fn prune(&self, history: &[Message]) -> Reduction {
        let tokens = self.counter.count_history(history);
        let target = self.config.reduction_target(tokens);
        let reduction = self
            .strategy
            .reduce_traced(history, target, &self.config, &self.counter);

        if reduction.is_noop() {
            debug!("No reduction needed at {tokens} tokens");
            return reduction;
        }

        debug!(
            "Pruned {} messages ({} tokens) with {} strategy",
            reduction.removed_count(history.len()),
            reduction.tokens_freed(),
            self.strategy
        );
        self.events.on_event(&BudgetEvent::Reduction {
            strategy: self.strategy,
            stages: &reduction.stages,
            tokens_before: reduction.tokens_before,
            tokens_after: reduction.tokens_after,
            target,
        });
        if !reduction.is_satisfied() {
            self.events.on_event(&BudgetEvent::BudgetUnsatisfied {
                tokens: reduction.tokens_after,
                target,
            });
        }
        reduction
    }
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("config", &self.config)
            .field("counter", &self.counter)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HealthStatus;
    use crate::events::FnEventHandler;
    use std::sync::Mutex;

    fn history(n: u64, chars: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message::user(format!("{i:03}{}", "x".repeat(chars - 3))).at(i))
            .collect()
    }

    #[test]
    fn health_and_advisory_follow_config() {
        let manager = ContextManager::new(BudgetConfig::builder(100).build().unwrap());
        // 9 messages * (4 + 4) = 72 tokens.
        let history = history(9, 16);
        assert_eq!(manager.count_tokens(&history), 72);
        assert_eq!(manager.health(&history).status, HealthStatus::Warning);
        assert!(manager.advisory(&history).is_some());
        assert!(manager.advisory(&history[..1]).is_none());
    }

    #[test]
    fn prune_uses_reduction_target() {
        let config = BudgetConfig::builder(100)
            .with_target_ratio(0.5)
            .build()
            .unwrap();
        let manager = ContextManager::new(config).with_strategy(EvictionStrategy::Temporal);
        // 12 * 8 = 96 tokens; target = max(50, ceil(96 * 0.25)) = 50.
        let history = history(12, 16);
        let reduction = manager.prune(&history);
        assert_eq!(reduction.target, 50);
        assert_eq!(reduction.tokens_after, 48);
        assert_eq!(reduction.messages, &history[6..]);
        assert_eq!(reduction.tokens_freed(), 48);
        assert_eq!(reduction.removed_count(history.len()), 6);
    }

    #[test]
    fn max_compaction_ratio_limits_one_reduction() {
        let config = BudgetConfig::builder(100)
            .with_target_ratio(0.1)
            .with_max_compaction_ratio(0.5)
            .build()
            .unwrap();
        let manager = ContextManager::new(config).with_strategy(EvictionStrategy::Temporal);
        let history = history(12, 16);
        let reduction = manager.prune(&history);
        // Removing more than half of 96 tokens is not allowed.
        assert_eq!(reduction.target, 48);
        assert_eq!(reduction.tokens_after, 48);
    }

    #[test]
    fn prune_emits_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = FnEventHandler::new(move |event| {
            let label = match event {
                BudgetEvent::Reduction { .. } => "reduction",
                BudgetEvent::BudgetUnsatisfied { .. } => "unsatisfied",
                _ => "other",
            };
            sink.lock().unwrap().push(label);
            None
        });
        let manager = ContextManager::new(BudgetConfig::builder(100).build().unwrap())
            .with_strategy(EvictionStrategy::Temporal)
            .with_event_handler(Arc::new(handler));

        // Six 20-token messages: the floor of five keeps 100 tokens.
        let history = history(6, 64);
        let reduction = manager.prune(&history);
        assert!(!reduction.is_satisfied());
        assert_eq!(*seen.lock().unwrap(), vec!["reduction", "unsatisfied"]);

        seen.lock().unwrap().clear();
        manager.prune(&history[..1]);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn tokenizer_changes_measurement() {
        let words = |text: &str| -> Result<usize, String> { Ok(text.split_whitespace().count()) };
        let manager = ContextManager::new(BudgetConfig::builder(100).build().unwrap())
            .with_tokenizer(Arc::new(words));
        assert_eq!(manager.count_tokens(&[Message::user("a b c")]), 3 + 4);
    }
}
