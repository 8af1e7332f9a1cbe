//! Summarization seam for session compaction.
//!
//! The crate never talks to a model itself. A [`Summarizer`] receives the
//! span of messages being compacted plus instructions and returns a short
//! summary, or an error string. Timeouts, cancellation, and the tail-only
//! fallback are handled by the
//! [`CompactionCoordinator`](crate::context::CompactionCoordinator).

use crate::Message;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;

/// Instructions passed to the summarizer unless overridden in
/// [`CompactionConfig`](crate::config::CompactionConfig).
pub const DEFAULT_SUMMARY_INSTRUCTIONS: &str = "\
Summarize the following conversation messages concisely. Preserve:
- Key decisions and their rationale
- Important facts and data (names, numbers, file paths, identifiers)
- The current task objectives
- Errors and blockers encountered, and how they were handled
- Open action items and next steps

Rules:
- Only include facts explicitly stated in the messages. Do not infer.
- Preserve error messages and identifiers verbatim.
- Be concise. The summary replaces the messages it covers.";

/// Future returned by [`Summarizer::summarize`].
pub type SummaryFuture<'a> = BoxFuture<'a, Result<String, String>>;

/// Produces a summary of a message span.
pub trait Summarizer: Send + Sync {
    fn summarize<'a>(&'a self, messages: &'a [Message], instructions: &'a str)
    -> SummaryFuture<'a>;
}

/// Render messages as `[role]: text` blocks separated by blank lines.
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&format!("[{}]: {}\n\n", message.role, message.text()));
    }
    out
}

/// Adapts an async closure taking the rendered transcript and instructions.
///
/// ```
/// use ctxwarden::context::FnSummarizer;
///
/// let summarizer = FnSummarizer::new(|transcript: String, _instructions: String| async move {
///     Ok::<_, String>(format!("{} chars summarized", transcript.len()))
/// });
/// # let _ = summarizer;
/// ```
pub struct FnSummarizer<F> {
    f: F,
}

impl<F> FnSummarizer<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Summarizer for FnSummarizer<F>
where
    F: Fn(String, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, String>> + Send + 'static,
{
    fn summarize<'a>(
        &'a self,
        messages: &'a [Message],
        instructions: &'a str,
    ) -> SummaryFuture<'a> {
        (self.f)(render_transcript(messages), instructions.to_string()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_uses_role_prefixes() {
        let messages = vec![
            Message::user("Read src/main.rs"),
            Message::assistant("It defines main()."),
        ];
        let transcript = render_transcript(&messages);
        assert_eq!(
            transcript,
            "[user]: Read src/main.rs\n\n[assistant]: It defines main().\n\n"
        );
    }

    #[test]
    fn default_instructions_cover_what_must_survive() {
        for needle in ["decisions", "facts", "task objectives", "action items"] {
            assert!(DEFAULT_SUMMARY_INSTRUCTIONS.contains(needle), "{needle}");
        }
    }

    #[tokio::test]
    async fn fn_summarizer_sees_transcript_and_instructions() {
        let summarizer = FnSummarizer::new(|transcript: String, instructions: String| async move {
            Ok(format!("{}|{}", transcript.trim_end(), instructions))
        });
        let messages = vec![Message::user("hello")];
        let summary = summarizer.summarize(&messages, "be brief").await.unwrap();
        assert_eq!(summary, "[user]: hello|be brief");
    }

    #[tokio::test]
    async fn fn_summarizer_propagates_errors() {
        let summarizer = FnSummarizer::new(|_: String, _: String| async move {
            Err::<String, _>("model unavailable".to_string())
        });
        let result = summarizer.summarize(&[], "").await;
        assert_eq!(result, Err("model unavailable".to_string()));
    }
}
