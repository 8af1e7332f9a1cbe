//! Budget events and handlers.
//!
//! The [`ContextManager`](crate::manager::ContextManager) and the
//! [`CompactionCoordinator`](crate::context::CompactionCoordinator) report
//! what they do through [`BudgetEvent`] variants. Callers implement
//! [`EventHandler`] to forward them to logs, metrics, or a dashboard.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests, or when nobody is listening |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::context::compaction::CompactionEvent;
use crate::context::eviction::{EvictionStrategy, ReductionStage};
use crate::error::SummarizeError;
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted while measuring, reducing, and compacting histories.
#[derive(Debug)]
pub enum BudgetEvent<'a> {
    /// An interactive reduction ran.
    Reduction {
        strategy: EvictionStrategy,
        stages: &'a [ReductionStage],
        tokens_before: usize,
        tokens_after: usize,
        target: usize,
    },
    /// A reduction finished above its target. The history returned to the
    /// caller is still over budget.
    BudgetUnsatisfied { tokens: usize, target: usize },
    /// Fired before a session is summarized. Handlers can return
    /// [`EventResponse::PreserveNote`] to add a preservation request to the
    /// summarizer instructions.
    PreCompaction { session_id: &'a str, tokens: usize },
    /// The summarizer failed, timed out, or was cancelled. The handoff falls
    /// back to the recent tail.
    SummarizationFailed {
        session_id: &'a str,
        error: &'a SummarizeError,
    },
    /// A session compaction completed.
    Compaction(&'a CompactionEvent),
}

/// Response from an event handler for events that accept feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventResponse {
    /// Extra text for the summarizer, e.g. "keep the open PR numbers".
    PreserveNote(String),
}

/// Handler for budget events.
///
/// The default implementation ignores every event. Only
/// [`BudgetEvent::PreCompaction`] looks at the return value.
///
/// # Example
///
/// ```
/// use ctxwarden::events::{BudgetEvent, EventHandler, EventResponse};
///
/// struct KeepTickets;
///
/// impl EventHandler for KeepTickets {
///     fn on_event(&self, event: &BudgetEvent<'_>) -> Option<EventResponse> {
///         match event {
///             BudgetEvent::PreCompaction { .. } => Some(EventResponse::PreserveNote(
///                 "Keep every ticket number verbatim.".into(),
///             )),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &BudgetEvent<'_>) -> Option<EventResponse> {
        let _ = event;
        None
    }
}

/// Ignores everything.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&BudgetEvent<'_>) -> Option<EventResponse> + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&BudgetEvent<'_>) -> Option<EventResponse> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&BudgetEvent<'_>) -> Option<EventResponse> + Send + Sync,
{
    fn on_event(&self, event: &BudgetEvent<'_>) -> Option<EventResponse> {
        (self.0)(event)
    }
}

/// Dispatches to several handlers in registration order.
///
/// Every handler sees every event. The first non-`None` response is
/// returned.
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add a handler only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &BudgetEvent<'_>) -> Option<EventResponse> {
        let mut first = None;
        for handler in &self.handlers {
            let response = handler.on_event(event);
            if first.is_none() {
                first = response;
            }
        }
        first
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &BudgetEvent<'_>) -> Option<EventResponse> {
        match event {
            BudgetEvent::Reduction {
                strategy,
                stages,
                tokens_before,
                tokens_after,
                target,
            } => {
                info!(
                    "Reduced context with {strategy}: {tokens_before} -> {tokens_after} tokens \
                     (target {target}, {} stage(s))",
                    stages.len()
                );
                debug!("  stages: {stages:?}");
            }
            BudgetEvent::BudgetUnsatisfied { tokens, target } => {
                warn!("Context still over budget after reduction: {tokens} > {target} tokens");
            }
            BudgetEvent::PreCompaction { session_id, tokens } => {
                debug!("Compacting session {session_id} at {tokens} tokens");
            }
            BudgetEvent::SummarizationFailed { session_id, error } => {
                warn!(
                    "Summarization failed for session {session_id} ({}): {error}. \
                     Falling back to recent tail",
                    error.code()
                );
            }
            BudgetEvent::Compaction(event) => {
                info!(
                    "Session {} compaction #{}: {} -> {} tokens ({:.1}% reduction, {:?})",
                    event.session_id,
                    event.compaction_count,
                    event.original_tokens,
                    event.compacted_tokens,
                    event.reduction_percent,
                    event.outcome,
                );
            }
        }
        None
    }
}
