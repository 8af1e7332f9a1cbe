//! Per-session token tracking for compaction decisions.
//!
//! A [`SessionTracker`] maps session ids to a [`SessionRecord`] holding the
//! last measured token count, how many compactions the session has gone
//! through, and where it sits in the compaction lifecycle. The map is a
//! [`DashMap`], so unrelated sessions never contend and updates to one
//! session are serialized by its shard lock. Token counting happens before
//! the lock is taken, and no guard is ever held across an `.await`.

use crate::Message;
use crate::context::tokens::TokenCounter;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Token count at or above which a session should be compacted.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 50_000;

/// Where a session is in the compaction lifecycle.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CompactionPhase {
    BelowThreshold,
    AtThreshold,
    Compacting,
    Compacted,
}

/// Tracked state of one session.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SessionRecord {
    /// Tokens at the last tracking or compaction.
    pub tokens: usize,
    /// Completed compactions, including tail-only fallbacks.
    pub compaction_count: u32,
    pub phase: CompactionPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    fn new(tokens: usize, phase: CompactionPhase) -> Self {
        let now = Utc::now();
        Self {
            tokens,
            compaction_count: 0,
            phase,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Concurrent map of session id to [`SessionRecord`].
#[derive(Debug)]
pub struct SessionTracker {
    sessions: DashMap<String, SessionRecord>,
    threshold: usize,
    counter: TokenCounter,
}

impl SessionTracker {
    pub fn new(threshold: usize, counter: TokenCounter) -> Self {
        Self {
            sessions: DashMap::new(),
            threshold,
            counter,
        }
    }

    pub fn compaction_threshold(&self) -> usize {
        self.threshold
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    fn phase_for(&self, tokens: usize) -> CompactionPhase {
        if tokens >= self.threshold {
            CompactionPhase::AtThreshold
        } else {
            CompactionPhase::BelowThreshold
        }
    }

    /// Measure `history`, store the count for `session_id`, and return it.
    ///
    /// Creates the record on first sight. A session that is mid-compaction
    /// keeps its `Compacting` phase.
    pub fn track(&self, session_id: &str, history: &[Message]) -> usize {
        let tokens = self.counter.count_history(history);
        let phase = self.phase_for(tokens);
        self.sessions
            .entry(session_id.to_string())
            .and_modify(|record| {
                record.tokens = tokens;
                if record.phase != CompactionPhase::Compacting {
                    record.phase = phase;
                }
                record.updated_at = Utc::now();
            })
            .or_insert_with(|| SessionRecord::new(tokens, phase));
        tokens
    }

    /// Whether the last tracked count reached the threshold. Unknown
    /// sessions never need compaction.
    pub fn needs_compaction(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|record| record.tokens >= self.threshold)
    }

    /// Snapshot of a session's record.
    pub fn stats(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get(session_id).map(|record| record.clone())
    }

    /// Forget a session, returning its last record.
    pub fn clear(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.remove(session_id).map(|(_, record)| record)
    }

    /// Ids of all tracked sessions, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub(crate) fn set_phase(&self, session_id: &str, phase: CompactionPhase) {
        if let Some(mut record) = self.sessions.get_mut(session_id) {
            record.phase = phase;
            record.updated_at = Utc::now();
        }
    }

    /// Move a session still marked `Compacting` back to the phase its last
    /// tracked count implies.
    pub(crate) fn settle_phase(&self, session_id: &str) {
        if let Some(mut record) = self.sessions.get_mut(session_id)
            && record.phase == CompactionPhase::Compacting
        {
            record.phase = self.phase_for(record.tokens);
            record.updated_at = Utc::now();
        }
    }

    /// Store the post-compaction count and bump the compaction counter.
    /// Returns the new count.
    pub(crate) fn record_compaction(&self, session_id: &str, tokens: usize) -> u32 {
        let mut record = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(tokens, CompactionPhase::Compacted));
        record.tokens = tokens;
        record.compaction_count += 1;
        record.phase = CompactionPhase::Compacted;
        record.updated_at = Utc::now();
        record.compaction_count
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COMPACTION_THRESHOLD, TokenCounter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(tokens: usize) -> Vec<Message> {
        vec![Message::user("x".repeat((tokens - 4) * 4))]
    }

    #[test]
    fn track_creates_and_updates() {
        let tracker = SessionTracker::new(100, TokenCounter::new());
        assert!(tracker.stats("s1").is_none());

        assert_eq!(tracker.track("s1", &history_of(40)), 40);
        let first = tracker.stats("s1").unwrap();
        assert_eq!(first.phase, CompactionPhase::BelowThreshold);
        assert_eq!(first.compaction_count, 0);

        tracker.track("s1", &history_of(120));
        let second = tracker.stats("s1").unwrap();
        assert_eq!(second.tokens, 120);
        assert_eq!(second.phase, CompactionPhase::AtThreshold);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn needs_compaction_is_inclusive() {
        let tracker = SessionTracker::new(100, TokenCounter::new());
        tracker.track("at", &history_of(100));
        tracker.track("below", &history_of(99));
        assert!(tracker.needs_compaction("at"));
        assert!(!tracker.needs_compaction("below"));
        assert!(!tracker.needs_compaction("unknown"));
    }

    #[test]
    fn record_compaction_increments() {
        let tracker = SessionTracker::new(100, TokenCounter::new());
        tracker.track("s", &history_of(150));
        assert_eq!(tracker.record_compaction("s", 30), 1);
        assert_eq!(tracker.record_compaction("s", 25), 2);
        let record = tracker.stats("s").unwrap();
        assert_eq!(record.tokens, 25);
        assert_eq!(record.phase, CompactionPhase::Compacted);
    }

    #[test]
    fn tracking_keeps_compacting_phase() {
        let tracker = SessionTracker::new(100, TokenCounter::new());
        tracker.track("s", &history_of(150));
        tracker.set_phase("s", CompactionPhase::Compacting);
        tracker.track("s", &history_of(20));
        assert_eq!(tracker.stats("s").unwrap().phase, CompactionPhase::Compacting);
    }

    #[test]
    fn settle_phase_resolves_compacting() {
        let tracker = SessionTracker::new(100, TokenCounter::new());
        tracker.track("s", &history_of(150));
        tracker.set_phase("s", CompactionPhase::Compacting);
        tracker.settle_phase("s");
        assert_eq!(tracker.stats("s").unwrap().phase, CompactionPhase::AtThreshold);

        tracker.track("s", &history_of(20));
        assert_eq!(tracker.stats("s").unwrap().phase, CompactionPhase::BelowThreshold);

        tracker.record_compaction("s", 10);
        tracker.settle_phase("s");
        assert_eq!(tracker.stats("s").unwrap().phase, CompactionPhase::Compacted);
    }

    #[test]
    fn clear_forgets_session() {
        let tracker = SessionTracker::default();
        tracker.track("a", &[]);
        tracker.track("b", &[]);
        assert_eq!(tracker.session_ids(), vec!["a".to_string(), "b".to_string()]);
        assert!(tracker.clear("a").is_some());
        assert!(tracker.clear("a").is_none());
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.compaction_threshold(), DEFAULT_COMPACTION_THRESHOLD);
    }

    #[test]
    fn sessions_are_independent_across_threads() {
        let tracker = std::sync::Arc::new(SessionTracker::new(100, TokenCounter::new()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        tracker.track(&format!("s{i}"), &history_of(10 + i));
                        tracker.record_compaction("shared", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.stats("shared").unwrap().compaction_count, 400);
        assert_eq!(tracker.stats("s3").unwrap().tokens, 13);
    }
}
