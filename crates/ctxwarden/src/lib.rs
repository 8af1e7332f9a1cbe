//! Context-window budget manager for LLM message histories.
//!
//! `ctxwarden` tracks how many tokens a growing conversation consumes against
//! a fixed capacity, classifies the pressure into a [`HealthStatus`], and
//! shrinks the history with one of several eviction strategies when the
//! pressure gets too high. A separate, session-level path compacts a long
//! history into a summary handoff when a delegated sub-task is spawned.
//!
//! # Getting started
//!
//! ```
//! use ctxwarden::prelude::*;
//!
//! let config = BudgetConfig::builder(1_000).build().unwrap();
//! let manager = ContextManager::new(config);
//!
//! let history = vec![
//!     Message::system("You are a careful assistant.").at(0),
//!     Message::user("Task: migrate the billing tables.").at(1),
//! ];
//!
//! let health = manager.health(&history);
//! assert_eq!(health.status, HealthStatus::Healthy);
//!
//! // Below the prune threshold every strategy is a no-op.
//! let reduced = manager.prune(&history);
//! assert_eq!(reduced.messages, history);
//! ```
//!
//! # Where to find things
//!
//! - **Measure tokens:** [`TokenCounter`](context::TokenCounter), with an
//!   optional injected [`Tokenizer`](context::Tokenizer) and a
//!   `ceil(chars / 4)` fallback.
//! - **Classify pressure:** [`context::budget::health`] and
//!   [`ContextManager::health`](manager::ContextManager::health).
//! - **Shrink a history:** [`EvictionStrategy`](context::EvictionStrategy)
//!   (temporal, priority, semantic dedup, adaptive chain), or
//!   [`ContextManager::prune`](manager::ContextManager::prune) which picks
//!   the target for you.
//! - **Compact a session for handoff:**
//!   [`CompactionCoordinator`](context::CompactionCoordinator) together with a
//!   [`SessionTracker`](context::SessionTracker) and a
//!   [`Summarizer`](context::Summarizer).
//! - **Observe decisions:** implement [`EventHandler`](events::EventHandler)
//!   or use [`LoggingHandler`](events::LoggingHandler).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Token accounting, scoring, health, eviction, critical extraction, compaction, sessions |
//! | [`config`] | [`BudgetConfig`](config::BudgetConfig) and [`CompactionConfig`](config::CompactionConfig) |
//! | [`events`] | [`BudgetEvent`](events::BudgetEvent) and handlers |
//! | [`manager`] | [`ContextManager`](manager::ContextManager), the interactive facade |

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod manager;
pub mod prelude;

pub use context::budget::HealthStatus;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// Tool output. Scored with the fallback role weight.
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Message payload: plain text or a structured JSON value.
///
/// Structured payloads are measured and pattern-matched through their
/// compact JSON serialization.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured(serde_json::Value),
}

impl Content {
    /// Text form used for token counting, scoring and fingerprinting.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Content::Text(text) => Cow::Borrowed(text),
            Content::Structured(value) => Cow::Owned(value.to_string()),
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Content::Structured(value)
    }
}

/// A single entry in a conversation history.
///
/// Messages are treated as immutable by every strategy in this crate: they
/// are selected, cloned, or wrapped in newly created summary messages, never
/// edited in place. `timestamp` is a logical sequence position supplied by
/// the caller and is expected to increase along the history.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: Content,
    #[serde(default)]
    pub timestamp: u64,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<Content>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: 0,
        }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn tool(content: impl Into<Content>) -> Self {
        Self::new(MessageRole::Tool, content)
    }

    /// Set the logical sequence position.
    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Serialized content, as seen by the accountant and the scorer.
    pub fn text(&self) -> Cow<'_, str> {
        self.content.as_text()
    }

    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }
}
