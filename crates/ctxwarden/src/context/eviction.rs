//! History reduction: pick a subset of messages that fits a token target.
//!
//! Four interchangeable strategies share one contract,
//! `reduce(history, target_tokens) -> history`:
//!
//! - **Temporal** drops the oldest non-system messages, but never goes below
//!   a floor of recent non-system messages. The floor can leave the budget
//!   exceeded; callers re-check the returned history.
//! - **Priority** keeps the highest-scoring messages that fit the target,
//!   always keeping system messages.
//! - **Semantic dedup** keeps only the first message per normalized
//!   fingerprint. It does not aim at a token count.
//! - **Adaptive** (the default) chains dedup, then priority, then temporal,
//!   running each stage only while the history still needs reduction.
//!
//! Every strategy only removes messages and keeps survivors in their
//! original order. Below the prune threshold every strategy is a no-op.
//! All of them are deterministic for identical inputs.

use crate::Message;
use crate::config::BudgetConfig;
use crate::context::budget::{ContextHealth, health};
use crate::context::priority::score_history;
use crate::context::tokens::TokenCounter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// A history reduction algorithm.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EvictionStrategy {
    Temporal,
    Priority,
    SemanticDedup,
    #[default]
    Adaptive,
}

/// One step actually executed during a reduction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReductionStage {
    SemanticDedup,
    Priority,
    Temporal,
    /// Adaptive last resort; may drop system messages.
    HardCutoff,
}

/// Outcome of a reduction, with enough data to tell whether it worked.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    /// The reduced history, in original order.
    pub messages: Vec<Message>,
    /// Stages executed, in order. Empty when no reduction was needed.
    pub stages: Vec<ReductionStage>,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub target: usize,
}

impl Reduction {
    fn unchanged(history: &[Message], tokens: usize, target: usize) -> Self {
        Self {
            messages: history.to_vec(),
            stages: Vec::new(),
            tokens_before: tokens,
            tokens_after: tokens,
            target,
        }
    }

    /// Whether the reduced history fits the target.
    pub fn is_satisfied(&self) -> bool {
        self.tokens_after <= self.target
    }

    /// Whether any stage ran.
    pub fn is_noop(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn tokens_freed(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }

    pub fn removed_count(&self, original_len: usize) -> usize {
        original_len.saturating_sub(self.messages.len())
    }
}

impl EvictionStrategy {
    /// Reduce `history` toward `target` tokens.
    ///
    /// Returns the history unchanged when its health does not call for
    /// reduction.
    pub fn reduce(
        self,
        history: &[Message],
        target: usize,
        config: &BudgetConfig,
        counter: &TokenCounter,
    ) -> Vec<Message> {
        self.reduce_traced(history, target, config, counter).messages
    }

    /// Like [`reduce`](Self::reduce), reporting stages and token counts.
    pub fn reduce_traced(
        self,
        history: &[Message],
        target: usize,
        config: &BudgetConfig,
        counter: &TokenCounter,
    ) -> Reduction {
        let tokens_before = counter.count_history(history);
        if !ContextHealth::from_tokens(tokens_before, config).needs_reduction {
            return Reduction::unchanged(history, tokens_before, target);
        }

        let (messages, stages) = match self {
            EvictionStrategy::Temporal => (
                reduce_temporal(history, target, config, counter),
                vec![ReductionStage::Temporal],
            ),
            EvictionStrategy::Priority => (
                reduce_by_priority(history, target, config, counter),
                vec![ReductionStage::Priority],
            ),
            EvictionStrategy::SemanticDedup => (
                dedup_semantic(history, config),
                vec![ReductionStage::SemanticDedup],
            ),
            EvictionStrategy::Adaptive => adaptive_chain(history, target, config, counter),
        };

        let tokens_after = counter.count_history(&messages);
        Reduction {
            messages,
            stages,
            tokens_before,
            tokens_after,
            target,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EvictionStrategy::Temporal => "temporal",
            EvictionStrategy::Priority => "priority",
            EvictionStrategy::SemanticDedup => "semantic_dedup",
            EvictionStrategy::Adaptive => "adaptive",
        }
    }
}

impl std::fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Stages ─────────────────────────────────────────────────────────
//
// The stage functions below run unconditionally; the health guard lives in
// `EvictionStrategy::reduce_traced`.

/// Drop the oldest non-system messages until `target` is met or only
/// `temporal_floor` non-system messages remain.
pub fn reduce_temporal(
    history: &[Message],
    target: usize,
    config: &BudgetConfig,
    counter: &TokenCounter,
) -> Vec<Message> {
    let costs = counter.count_each(history);
    let mut total: usize = costs.iter().sum();
    let candidates: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| !m.is_system())
        .map(|(i, _)| i)
        .collect();

    let floor = config.temporal_floor();
    let mut keep = vec![true; history.len()];
    let mut next = 0;
    while total > target && candidates.len() - next > floor {
        let batch = config.batch_size().min(candidates.len() - next - floor);
        for &i in &candidates[next..next + batch] {
            keep[i] = false;
            total -= costs[i];
        }
        next += batch;
    }

    if total > target {
        debug!(
            "Temporal floor of {floor} message(s) reached at {total} tokens (target {target})"
        );
    }
    retain(history, &keep)
}

/// Keep system messages, then the highest-scoring messages that still fit
/// `target`. Ties go to the earlier message.
pub fn reduce_by_priority(
    history: &[Message],
    target: usize,
    config: &BudgetConfig,
    counter: &TokenCounter,
) -> Vec<Message> {
    let costs = counter.count_each(history);
    let scores = score_history(history, config);

    let mut keep = vec![false; history.len()];
    let mut used = 0usize;
    for (i, message) in history.iter().enumerate() {
        if message.is_system() {
            keep[i] = true;
            used += costs[i];
        }
    }

    let mut ranked: Vec<usize> = (0..history.len())
        .filter(|&i| !history[i].is_system())
        .collect();
    ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

    for i in ranked {
        if used + costs[i] <= target {
            keep[i] = true;
            used += costs[i];
        }
    }
    retain(history, &keep)
}

/// Normalized content fingerprint: lower-cased, whitespace-collapsed, and
/// truncated to `max_chars` characters.
pub fn fingerprint(text: &str, max_chars: usize) -> String {
    let lowered = text.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}

/// Keep the first message for each fingerprint. System messages are always
/// kept and never claim a fingerprint.
pub fn dedup_semantic(history: &[Message], config: &BudgetConfig) -> Vec<Message> {
    let mut seen = HashSet::new();
    history
        .iter()
        .filter(|m| m.is_system() || seen.insert(fingerprint(&m.text(), config.fingerprint_len())))
        .cloned()
        .collect()
}

/// Dedup, then priority, then temporal, each only while reduction is still
/// needed.
pub fn reduce_adaptive(
    history: &[Message],
    target: usize,
    config: &BudgetConfig,
    counter: &TokenCounter,
) -> Vec<Message> {
    adaptive_chain(history, target, config, counter).0
}

fn adaptive_chain(
    history: &[Message],
    target: usize,
    config: &BudgetConfig,
    counter: &TokenCounter,
) -> (Vec<Message>, Vec<ReductionStage>) {
    let still_over = |messages: &[Message]| health(messages, config, counter).needs_reduction;

    let mut stages = vec![ReductionStage::SemanticDedup];
    let mut current = dedup_semantic(history, config);

    if still_over(&current) {
        current = reduce_by_priority(&current, target, config, counter);
        stages.push(ReductionStage::Priority);
    } else {
        debug!("Dedup alone relieved context pressure");
        return (current, stages);
    }

    if still_over(&current) {
        current = reduce_temporal(&current, target, config, counter);
        stages.push(ReductionStage::Temporal);
    } else {
        return (current, stages);
    }

    if config.allow_hard_cutoff() && still_over(&current) {
        current = hard_cutoff(&current, target, counter);
        stages.push(ReductionStage::HardCutoff);
    }
    (current, stages)
}

/// Drop from the front, any role, until `target` is met or one message is
/// left.
fn hard_cutoff(history: &[Message], target: usize, counter: &TokenCounter) -> Vec<Message> {
    let costs = counter.count_each(history);
    let mut total: usize = costs.iter().sum();
    let mut start = 0;
    while total > target && history.len() - start > 1 {
        total -= costs[start];
        start += 1;
    }
    let dropped_system = history[..start].iter().filter(|m| m.is_system()).count();
    if dropped_system > 0 {
        warn!("Hard cutoff dropped {dropped_system} system message(s) to reach {total} tokens");
    }
    history[start..].to_vec()
}

fn retain(history: &[Message], keep: &[bool]) -> Vec<Message> {
    history
        .iter()
        .zip(keep)
        .filter(|(_, keep)| **keep)
        .map(|(m, _)| m.clone())
        .collect()
}
