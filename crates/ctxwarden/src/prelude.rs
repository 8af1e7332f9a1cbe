//! Convenience re-exports for common `ctxwarden` types.
//!
//! ```
//! use ctxwarden::prelude::*;
//! ```
//!
//! Covers messages, configuration, the interactive manager, session
//! compaction, and event handlers. Per-strategy functions and scoring
//! helpers stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Content, HealthStatus, Message, MessageRole};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{BudgetConfig, BudgetProfile, CompactionConfig, RoleWeights};
pub use crate::error::{ConfigError, SummarizeError};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{
    CompactionCoordinator, CompactionEvent, CompactionOutcome, CompactionPhase, ContextHealth,
    CriticalPatterns, EvictionStrategy, FnSummarizer, Handoff, HandoffOutcome, Reduction,
    ReductionStage, SessionRecord, SessionTracker, Summarizer, SummaryFuture, TokenCounter,
    Tokenizer,
};
pub use crate::manager::ContextManager;

// ── Events ──────────────────────────────────────────────────────────
pub use crate::events::{
    BudgetEvent, CompositeEventHandler, EventHandler, EventResponse, FnEventHandler,
    LoggingHandler, NoopHandler,
};
