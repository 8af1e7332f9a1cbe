//! Session compaction for handoff to a delegated sub-task.
//!
//! When a session's history crosses the tracker's compaction threshold, the
//! [`CompactionCoordinator`] replaces it with a much smaller handoff:
//!
//! ```text
//! [summary of older messages] + [latest critical messages] + [recent tail]
//! ```
//!
//! The summarizer is the only suspension point. It runs under a timeout and
//! can be cancelled. Any failure (error, timeout, cancellation, blank
//! output) falls back to the recent tail alone, so a handoff always returns
//! a usable history and never an error. A handoff dropped mid-summary does
//! not count as a compaction and does not leave the session `Compacting`.

use crate::Message;
use crate::config::CompactionConfig;
use crate::context::critical::extract_critical;
use crate::context::session::{CompactionPhase, SessionTracker};
use crate::context::summarizer::Summarizer;
use crate::error::{ConfigError, SummarizeError};
use crate::events::{BudgetEvent, EventHandler, EventResponse, NoopHandler};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Prefix of the system message carrying the generated summary.
pub const SUMMARY_HEADER: &str = "[Session summary]";

/// How a compaction produced its history.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompactionOutcome {
    Summarized,
    TailOnly,
}

/// Telemetry record emitted after every compaction.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CompactionEvent {
    pub session_id: String,
    pub original_tokens: usize,
    pub compacted_tokens: usize,
    /// `(original - compacted) / original * 100`.
    pub reduction_percent: f64,
    pub outcome: CompactionOutcome,
    /// [`SummarizeError::code`] when the handoff fell back to the tail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<&'static str>,
    /// The session's compaction count after this one.
    pub compaction_count: u32,
}

impl CompactionEvent {
    fn reduction_percent(original: usize, compacted: usize) -> f64 {
        if original == 0 {
            0.0
        } else {
            original.saturating_sub(compacted) as f64 / original as f64 * 100.0
        }
    }
}

/// What happened to a history passed through [`CompactionCoordinator::handoff`].
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffOutcome {
    /// Below threshold, or nothing older than the tail to compact.
    Unchanged,
    Summarized,
    /// Summarization failed; only the recent tail was kept.
    TailOnly(SummarizeError),
}

/// Result of a handoff.
#[derive(Debug, Clone)]
pub struct Handoff {
    pub messages: Vec<Message>,
    pub outcome: HandoffOutcome,
    /// Present whenever a compaction ran.
    pub event: Option<CompactionEvent>,
}

impl Handoff {
    fn unchanged(history: &[Message]) -> Self {
        Self {
            messages: history.to_vec(),
            outcome: HandoffOutcome::Unchanged,
            event: None,
        }
    }

    pub fn was_compacted(&self) -> bool {
        self.event.is_some()
    }
}

/// Orchestrates critical extraction and summarization for a session.
pub struct CompactionCoordinator {
    config: CompactionConfig,
    tracker: Arc<SessionTracker>,
    summarizer: Arc<dyn Summarizer>,
    events: Arc<dyn EventHandler>,
}

impl CompactionCoordinator {
    pub fn new(
        config: CompactionConfig,
        tracker: Arc<SessionTracker>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            tracker,
            summarizer,
            events: Arc::new(NoopHandler),
        })
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = handler;
        self
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    /// Compact `history` for a sub-task if the session is over threshold.
    pub async fn prepare_for_handoff(&self, history: &[Message], session_id: &str) -> Vec<Message> {
        self.handoff(history, session_id, None).await.messages
    }

    /// Like [`prepare_for_handoff`](Self::prepare_for_handoff), with
    /// cancellation and a full report.
    pub async fn handoff(
        &self,
        history: &[Message],
        session_id: &str,
        cancel: Option<&CancellationToken>,
    ) -> Handoff {
        let original_tokens = self.tracker.track(session_id, history);
        if original_tokens < self.tracker.compaction_threshold() {
            debug!(
                "Session {session_id} at {original_tokens} tokens, below compaction threshold {}",
                self.tracker.compaction_threshold()
            );
            return Handoff::unchanged(history);
        }

        let split = history.len().saturating_sub(self.config.recent_tail);
        let (older, tail) = history.split_at(split);
        if older.is_empty() {
            debug!("Session {session_id} has nothing older than its recent tail");
            return Handoff::unchanged(history);
        }

        let critical = extract_critical(older, &self.config.critical_patterns);
        let keep = self.config.critical_keep.unwrap_or(critical.len());
        let critical = &critical[critical.len().saturating_sub(keep)..];

        let mut instructions = self.config.instructions.clone();
        let response = self.events.on_event(&BudgetEvent::PreCompaction {
            session_id,
            tokens: original_tokens,
        });
        if let Some(EventResponse::PreserveNote(note)) = response {
            instructions.push_str("\n\nAlso preserve:\n");
            instructions.push_str(&note);
        }

        let guard = CompactingGuard::enter(&self.tracker, session_id);
        let result = self.summarize(older, &instructions, cancel).await;

        let (messages, outcome) = match result {
            Ok(summary) => {
                let timestamp = older.last().map_or(0, |m| m.timestamp);
                let mut messages = Vec::with_capacity(1 + critical.len() + tail.len());
                let summary = format!("{SUMMARY_HEADER}\n{}", summary.trim());
                messages.push(Message::system(summary).at(timestamp));
                messages.extend(critical.iter().map(|m| (*m).clone()));
                messages.extend_from_slice(tail);
                (messages, HandoffOutcome::Summarized)
            }
            Err(error) => {
                warn!(
                    "Summarization for session {session_id} failed: {error}. \
                     Keeping recent tail only"
                );
                self.events.on_event(&BudgetEvent::SummarizationFailed {
                    session_id,
                    error: &error,
                });
                (tail.to_vec(), HandoffOutcome::TailOnly(error))
            }
        };

        let compacted_tokens = self.tracker.counter().count_history(&messages);
        let compaction_count = self.tracker.record_compaction(session_id, compacted_tokens);
        guard.disarm();
        let fallback_reason = match &outcome {
            HandoffOutcome::TailOnly(error) => Some(error.code()),
            _ => None,
        };

        let event = CompactionEvent {
            session_id: session_id.to_string(),
            original_tokens,
            compacted_tokens,
            reduction_percent: CompactionEvent::reduction_percent(original_tokens, compacted_tokens),
            outcome: if fallback_reason.is_some() {
                CompactionOutcome::TailOnly
            } else {
                CompactionOutcome::Summarized
            },
            fallback_reason,
            compaction_count,
        };
        self.events.on_event(&BudgetEvent::Compaction(&event));

        Handoff {
            messages,
            outcome,
            event: Some(event),
        }
    }

    async fn summarize(
        &self,
        older: &[Message],
        instructions: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, SummarizeError> {
        let timeout = self.config.summary_timeout;
        let call = tokio::time::timeout(timeout, self.summarizer.summarize(older, instructions));

        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(SummarizeError::Cancelled),
                result = call => result,
            },
            None => call.await,
        };

        match result {
            Err(_) => Err(SummarizeError::TimedOut(timeout)),
            Ok(Err(e)) => Err(SummarizeError::Failed(e)),
            Ok(Ok(summary)) if summary.trim().is_empty() => Err(SummarizeError::EmptySummary),
            Ok(Ok(summary)) => Ok(summary),
        }
    }
}

/// Holds a session in `Compacting` for the duration of a summary.
///
/// If the handoff future is dropped or unwinds before the result is
/// recorded, the phase is settled back from the last tracked count.
#[must_use = "dropping the guard immediately ends the Compacting phase"]
struct CompactingGuard<'a> {
    tracker: &'a SessionTracker,
    session_id: &'a str,
    armed: bool,
}

impl<'a> CompactingGuard<'a> {
    fn enter(tracker: &'a SessionTracker, session_id: &'a str) -> Self {
        tracker.set_phase(session_id, CompactionPhase::Compacting);
        Self {
            tracker,
            session_id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CompactingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "Compaction of session {} abandoned before completion",
                self.session_id
            );
            self.tracker.settle_phase(self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::summarizer::SummaryFuture;
    use crate::context::tokens::TokenCounter;
    use crate::events::FnEventHandler;
    use std::sync::Mutex;

    /// Replies with a fixed result and records what it was asked.
    struct Scripted {
        reply: Result<String, String>,
        calls: Mutex<Vec<(usize, String)>>,
    }

    impl Scripted {
        fn new(reply: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(String::from).map_err(String::from),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl Summarizer for Scripted {
        fn summarize<'a>(
            &'a self,
            messages: &'a [Message],
            instructions: &'a str,
        ) -> SummaryFuture<'a> {
            self.calls
                .lock()
                .unwrap()
                .push((messages.len(), instructions.to_string()));
            let reply = self.reply.clone();
            Box::pin(async move { reply })
        }
    }

    fn filler(i: u64) -> Message {
        Message::user(format!("chat line {i:02} about the weather in the valley")).at(i)
    }

    fn coordinator(config: CompactionConfig, summarizer: Arc<Scripted>) -> CompactionCoordinator {
        let tracker = Arc::new(SessionTracker::new(50, TokenCounter::new()));
        CompactionCoordinator::new(config, tracker, summarizer).unwrap()
    }

    #[test]
    fn rejects_empty_tail() {
        let tracker = Arc::new(SessionTracker::default());
        let result = CompactionCoordinator::new(
            CompactionConfig::new().with_recent_tail(0),
            tracker,
            Scripted::new(Ok("x")),
        );
        assert!(matches!(
            result,
            Err(ConfigError::ZeroCount {
                name: "recent_tail"
            })
        ));
    }

    #[tokio::test]
    async fn below_threshold_is_unchanged() {
        let summarizer = Scripted::new(Ok("summary"));
        let coordinator = coordinator(CompactionConfig::default(), summarizer.clone());
        let history = vec![filler(0)];
        let handoff = coordinator.handoff(&history, "s", None).await;
        assert_eq!(handoff.messages, history);
        assert_eq!(handoff.outcome, HandoffOutcome::Unchanged);
        assert!(summarizer.calls.lock().unwrap().is_empty());
        assert_eq!(
            coordinator.tracker().stats("s").unwrap().phase,
            CompactionPhase::BelowThreshold
        );
    }

    #[tokio::test]
    async fn short_history_over_threshold_is_unchanged() {
        let coordinator = coordinator(CompactionConfig::default(), Scripted::new(Ok("summary")));
        let history: Vec<Message> = (0..5).map(filler).collect();
        let handoff = coordinator.handoff(&history, "s", None).await;
        assert!(!handoff.was_compacted());
        assert_eq!(handoff.messages, history);
        assert_eq!(coordinator.tracker().stats("s").unwrap().compaction_count, 0);
    }

    #[tokio::test]
    async fn success_builds_summary_critical_tail() {
        let summarizer = Scripted::new(Ok("  Shipped the importer skeleton.  "));
        let coordinator = coordinator(CompactionConfig::default(), summarizer.clone());
        let mut history = vec![Message::user("Task: ship the CSV importer").at(0)];
        history.extend((1..10).map(filler));

        let handoff = coordinator.handoff(&history, "s", None).await;
        assert_eq!(handoff.outcome, HandoffOutcome::Summarized);
        assert_eq!(handoff.messages.len(), 1 + 1 + 5);

        let summary = &handoff.messages[0];
        assert!(summary.is_system());
        assert_eq!(
            summary.text(),
            "[Session summary]\nShipped the importer skeleton."
        );
        assert_eq!(summary.timestamp, 4);
        assert_eq!(handoff.messages[1], history[0]);
        assert_eq!(&handoff.messages[2..], &history[5..]);

        let calls = summarizer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 5);

        let event = handoff.event.unwrap();
        assert_eq!(event.outcome, CompactionOutcome::Summarized);
        assert_eq!(event.compaction_count, 1);
        assert!(event.compacted_tokens < event.original_tokens);
        assert!(event.fallback_reason.is_none());

        let record = coordinator.tracker().stats("s").unwrap();
        assert_eq!(record.tokens, event.compacted_tokens);
        assert_eq!(record.phase, CompactionPhase::Compacted);
    }

    #[tokio::test]
    async fn critical_keep_caps_and_keep_all_does_not() {
        let mut history: Vec<Message> = (0..5)
            .map(|i| Message::assistant(format!("We decided on option {i}")).at(i))
            .collect();
        history.extend((5..10).map(filler));

        let capped = coordinator(CompactionConfig::default(), Scripted::new(Ok("s")));
        let handoff = capped.handoff(&history, "s", None).await;
        assert_eq!(&handoff.messages[1..4], &history[2..5]);
        assert_eq!(handoff.messages.len(), 1 + 3 + 5);

        let all = coordinator(
            CompactionConfig::default().keep_all_critical(),
            Scripted::new(Ok("s")),
        );
        let handoff = all.handoff(&history, "s", None).await;
        assert_eq!(&handoff.messages[1..6], &history[0..5]);
    }

    #[tokio::test]
    async fn blank_summary_falls_back_to_tail() {
        let coordinator = coordinator(CompactionConfig::default(), Scripted::new(Ok("  \n ")));
        let history: Vec<Message> = (0..10).map(filler).collect();
        let handoff = coordinator.handoff(&history, "s", None).await;
        assert_eq!(
            handoff.outcome,
            HandoffOutcome::TailOnly(SummarizeError::EmptySummary)
        );
        assert_eq!(handoff.messages, &history[5..]);
        assert_eq!(
            handoff.event.unwrap().fallback_reason,
            Some("empty_summary")
        );
    }

    #[tokio::test]
    async fn preserve_notes_reach_the_summarizer() {
        let summarizer = Scripted::new(Ok("ok"));
        let handler = FnEventHandler::new(|event| match event {
            BudgetEvent::PreCompaction { .. } => {
                Some(EventResponse::PreserveNote("Keep ticket numbers.".into()))
            }
            _ => None,
        });
        let coordinator = coordinator(CompactionConfig::default(), summarizer.clone())
            .with_event_handler(Arc::new(handler));
        let history: Vec<Message> = (0..10).map(filler).collect();
        coordinator.handoff(&history, "s", None).await;

        let calls = summarizer.calls.lock().unwrap();
        assert!(calls[0].1.starts_with(crate::context::summarizer::DEFAULT_SUMMARY_INSTRUCTIONS));
        assert!(calls[0].1.ends_with("Also preserve:\nKeep ticket numbers."));
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_summary() {
        let coordinator = coordinator(CompactionConfig::default(), Scripted::new(Ok("summary")));
        let history: Vec<Message> = (0..10).map(filler).collect();
        let token = CancellationToken::new();
        token.cancel();
        let handoff = coordinator.handoff(&history, "s", Some(&token)).await;
        assert_eq!(
            handoff.outcome,
            HandoffOutcome::TailOnly(SummarizeError::Cancelled)
        );
        assert_eq!(handoff.messages, &history[5..]);
    }

    #[test]
    fn reduction_percent_handles_zero() {
        assert_eq!(CompactionEvent::reduction_percent(0, 0), 0.0);
        assert_eq!(CompactionEvent::reduction_percent(200, 50), 75.0);
    }
}
