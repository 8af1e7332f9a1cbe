//! Must-preserve content detection.
//!
//! A message is *critical* when its serialized content matches at least one
//! configured pattern. Patterns are regular expressions matched
//! case-insensitively. The priority scorer gives critical messages a bonus,
//! and session compaction copies the most recent critical messages verbatim
//! next to the generated summary so they survive even if the summarizer
//! drops them.

use crate::Message;
use crate::error::ConfigError;
use regex::{RegexBuilder, RegexSet, RegexSetBuilder};

/// Default must-preserve patterns: task objectives, errors, decisions, and
/// must/critical keywords.
pub const DEFAULT_CRITICAL_PATTERNS: &[&str] = &[
    r"\b(task|objective|goal)\s*:",
    r"\b(error|exception|failed|failure|blocker)\b",
    r"\b(decided|decision|agreed)\b",
    r"\b(must|critical|important|required)\b",
];

/// A compiled, case-insensitive set of critical-content patterns.
#[derive(Debug, Clone)]
pub struct CriticalPatterns {
    patterns: Vec<String>,
    set: RegexSet,
}

impl CriticalPatterns {
    /// Compile a pattern set. Every pattern is checked individually so the
    /// error names the offending expression.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        for pattern in &patterns {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
        }
        let set = RegexSetBuilder::new(&patterns)
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: patterns.join(" | "),
                source,
            })?;
        Ok(Self { patterns, set })
    }

    /// A set that matches nothing.
    pub fn none() -> Self {
        Self {
            patterns: Vec::new(),
            set: RegexSet::empty(),
        }
    }

    /// Whether `text` matches any pattern.
    pub fn is_match(&self, text: &str) -> bool {
        self.set.is_match(text)
    }

    /// Whether a message's serialized content matches any pattern.
    pub fn matches(&self, message: &Message) -> bool {
        self.is_match(&message.text())
    }

    /// The source expressions, in configuration order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for CriticalPatterns {
    fn default() -> Self {
        let patterns: Vec<String> = DEFAULT_CRITICAL_PATTERNS
            .iter()
            .map(|p| (*p).to_string())
            .collect();
        let set = RegexSetBuilder::new(&patterns)
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|_| RegexSet::empty());
        Self { patterns, set }
    }
}

/// Every message matching at least one pattern, in original order.
pub fn extract_critical<'a>(history: &'a [Message], patterns: &CriticalPatterns) -> Vec<&'a Message> {
    if patterns.is_empty() {
        return Vec::new();
    }
    history.iter().filter(|m| patterns.matches(m)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_expected_keywords() {
        let patterns = CriticalPatterns::default();
        assert_eq!(patterns.len(), DEFAULT_CRITICAL_PATTERNS.len());
        assert!(patterns.is_match("Task: ship the importer"));
        assert!(patterns.is_match("got an ERROR while linking"));
        assert!(patterns.is_match("We decided to use Postgres"));
        assert!(patterns.is_match("this MUST stay backwards compatible"));
        assert!(!patterns.is_match("thanks, looks good"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let patterns = CriticalPatterns::new(["deadline"]).unwrap();
        assert!(patterns.is_match("DEADLINE is friday"));
        assert!(patterns.is_match("the Deadline moved"));
    }

    #[test]
    fn invalid_pattern_is_rejected_with_its_source() {
        let err = CriticalPatterns::new(["ok", "(unclosed"]).unwrap_err();
        match err {
            ConfigError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "(unclosed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn extract_preserves_original_order() {
        let history = vec![
            Message::user("Task: port the parser").at(0),
            Message::assistant("sure").at(1),
            Message::assistant("build failed with error E0308").at(2),
            Message::user("ok").at(3),
            Message::assistant("We decided to keep the old API").at(4),
        ];
        let critical = extract_critical(&history, &CriticalPatterns::default());
        let stamps: Vec<u64> = critical.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![0, 2, 4]);
    }

    #[test]
    fn empty_pattern_set_extracts_nothing() {
        let history = vec![Message::user("Task: anything")];
        assert!(extract_critical(&history, &CriticalPatterns::none()).is_empty());
    }

    #[test]
    fn structured_content_is_matched_through_json() {
        let history = vec![Message::tool(serde_json::json!({"status": "error", "code": 2}))];
        let critical = extract_critical(&history, &CriticalPatterns::default());
        assert_eq!(critical.len(), 1);
    }
}
