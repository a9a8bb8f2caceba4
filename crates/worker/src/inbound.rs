//! Transport-independent handling of an incoming chat message.

use std::sync::Arc;

use genrelay_core::messages::MSG_USAGE;
use genrelay_events::{notify_best_effort, Notification, ProgressNotifier};
use genrelay_pipeline::Orchestrator;

/// What an incoming text asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// `/start`, `/help` or any other bot command.
    Help,
    Prompt(&'a str),
}

pub fn classify(text: &str) -> Inbound<'_> {
    if text.trim_start().starts_with('/') {
        Inbound::Help
    } else {
        Inbound::Prompt(text)
    }
}

/// Answer commands with usage text and submit everything else as a prompt.
///
/// A rejected prompt is answered with the validation message directly.
pub async fn handle_text(
    orchestrator: &Arc<Orchestrator>,
    notifier: &dyn ProgressNotifier,
    source_id: &str,
    text: &str,
) {
    match classify(text) {
        Inbound::Help => {
            notify_best_effort(notifier, source_id, &Notification::text(MSG_USAGE)).await;
        }
        Inbound::Prompt(prompt) => match orchestrator.submit_request(source_id, prompt).await {
            Ok(job_id) => tracing::debug!(%job_id, source_id, "Prompt accepted"),
            Err(e) => {
                tracing::info!(source_id, error = %e, "Prompt rejected");
                notify_best_effort(notifier, source_id, &Notification::text(e.to_string())).await;
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::testing::{echo_orchestrator, Inbox};

    use super::*;

    #[test]
    fn commands_are_help() {
        assert_eq!(classify("/start"), Inbound::Help);
        assert_eq!(classify("/help@genrelay_bot"), Inbound::Help);
        assert_eq!(classify("a cat surfing"), Inbound::Prompt("a cat surfing"));
    }

    #[tokio::test]
    async fn help_replies_with_usage() {
        let inbox = Arc::new(Inbox::default());
        let orch = echo_orchestrator(inbox.clone());
        handle_text(&orch, inbox.as_ref(), "42", "/help").await;
        assert_eq!(inbox.texts(), [MSG_USAGE]);
        assert!(orch.queue().is_empty().await);
    }

    #[tokio::test]
    async fn rejected_prompt_gets_validation_message() {
        let inbox = Arc::new(Inbox::default());
        let orch = echo_orchestrator(inbox.clone());
        handle_text(&orch, inbox.as_ref(), "42", &"x".repeat(5000)).await;
        let texts = inbox.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Invalid input"));
        assert!(orch.queue().is_empty().await);
    }
}
