//! Walk a growing conversation through pruning and a sub-task handoff.
//!
//! Builds a synthetic history, prunes it with the adaptive strategy, then
//! compacts the session twice: once with a working summarizer and once with
//! one that always fails, to show the tail-only fallback.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example handoff_walkthrough
//! cargo run --example handoff_walkthrough -- --telemetry
//! ```
//!
//! `--telemetry` also prints each compaction event as JSON.

use std::sync::Arc;

use ctxwarden::prelude::*;

fn conversation() -> Vec<Message> {
    let mut history = vec![
        Message::system("You are a release assistant for the billing service.").at(0),
        Message::user("Task: cut release 4.2 and update the changelog.").at(1),
    ];
    for ts in 2..40 {
        let text = match ts % 7 {
            0 => "Build the changelog draft".to_string(),
            3 => format!("Step {ts} failed: integration suite timed out"),
            _ => format!("Working note {ts}: {}", "checked dependencies ".repeat(4)),
        };
        let message = if ts % 2 == 0 {
            Message::user(text)
        } else {
            Message::assistant(text)
        };
        history.push(message.at(ts));
    }
    history
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let history = conversation();
    let show_telemetry = std::env::args().any(|arg| arg == "--telemetry");
    let events: Arc<dyn EventHandler> = Arc::new(
        CompositeEventHandler::new()
            .with(LoggingHandler)
            .with_if(
                show_telemetry,
                FnEventHandler::new(|event| {
                    if let BudgetEvent::Compaction(compaction) = event
                        && let Ok(json) = serde_json::to_string(compaction)
                    {
                        println!("telemetry: {json}");
                    }
                    None
                }),
            ),
    );

    // 1. Interactive budget: measure, advise, prune.
    let config = BudgetConfig::builder(1_200)
        .build()
        .map_err(|e| e.to_string())?;
    let manager = ContextManager::new(config).with_event_handler(events.clone());

    let before = manager.health(&history);
    println!("before: {}", before.to_log_string());
    if let Some(notice) = manager.advisory(&history) {
        println!("advisory: {notice}");
    }

    let reduction = manager.prune(&history);
    println!(
        "pruned {} -> {} messages via {:?} (satisfied: {})",
        history.len(),
        reduction.messages.len(),
        reduction.stages,
        reduction.is_satisfied(),
    );

    // 2. Session budget: compact for a sub-task.
    let tracker = Arc::new(SessionTracker::new(500, TokenCounter::new()));
    let summarizer: Arc<dyn Summarizer> =
        Arc::new(FnSummarizer::new(|transcript: String, _: String| async move {
            Ok::<_, String>(format!(
                "Release 4.2 in progress; {} messages reviewed, integration suite flaky.",
                transcript.matches("\n\n").count()
            ))
        }));
    let coordinator =
        CompactionCoordinator::new(CompactionConfig::default(), tracker.clone(), summarizer)
            .map_err(|e| e.to_string())?
            .with_event_handler(events.clone());

    let handoff = coordinator.handoff(&history, "release-4.2", None).await;
    println!("\nhandoff ({:?}):", handoff.outcome);
    for message in &handoff.messages {
        let preview: String = message.text().chars().take(72).collect();
        println!("  [{}] {preview}", message.role);
    }

    // 3. Same session, summarizer down: only the recent tail survives.
    let broken: Arc<dyn Summarizer> = Arc::new(FnSummarizer::new(|_: String, _: String| async {
        Err::<String, _>("summarizer offline".to_string())
    }));
    let fallback = CompactionCoordinator::new(CompactionConfig::default(), tracker.clone(), broken)
        .map_err(|e| e.to_string())?
        .with_event_handler(events);
    let handoff = fallback.handoff(&history, "release-4.2", None).await;
    println!("\nfallback kept {} messages", handoff.messages.len());

    if let Some(record) = tracker.stats("release-4.2") {
        let json = serde_json::to_string_pretty(&record).map_err(|e| e.to_string())?;
        println!("\nsession record:\n{json}");
    }
    Ok(())
}
