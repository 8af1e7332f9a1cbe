//! Context window management: accounting, health, eviction, and compaction.
//!
//! Two budgets are managed here, on different time scales:
//!
//! 1. **Interactive budget.** [`tokens`] measures a history, [`budget`]
//!    classifies the pressure against a [`BudgetConfig`](crate::config::BudgetConfig),
//!    and [`eviction`] shrinks the history when it reaches the prune
//!    threshold. [`priority`] scores messages for the priority strategy.
//!
//! 2. **Session budget.** [`session`] tracks token use per session against a
//!    larger ceiling. When a sub-task is spawned past that ceiling,
//!    [`compaction`] replaces the history with a [`summarizer`]-generated
//!    summary, the latest [`critical`] messages, and the recent tail.
//!
//! Everything except compaction is synchronous and pure.

pub mod budget;
pub mod compaction;
pub mod critical;
pub mod eviction;
pub mod priority;
pub mod session;
pub mod summarizer;
pub mod tokens;

// Re-export commonly used items at the module level.
pub use budget::{ContextHealth, advisory, health};
pub use compaction::{
    CompactionCoordinator, CompactionEvent, CompactionOutcome, Handoff, HandoffOutcome,
};
pub use critical::{CriticalPatterns, extract_critical};
pub use eviction::{EvictionStrategy, Reduction, ReductionStage};
pub use session::{CompactionPhase, DEFAULT_COMPACTION_THRESHOLD, SessionRecord, SessionTracker};
pub use summarizer::{FnSummarizer, Summarizer, SummaryFuture};
pub use tokens::{TokenCounter, Tokenizer};
