//! Telegram long-poll inbound adapter.
//!
//! Pulls updates with `getUpdates`, advancing the offset past every update
//! it has seen, and hands text messages to [`handle_text`]. Messages
//! without text (stickers, photos, joins) are skipped.

use std::sync::Arc;
use std::time::Duration;

use genrelay_events::{ProgressNotifier, TelegramConfig};
use genrelay_pipeline::Orchestrator;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::inbound::handle_text;

/// Pause after a failed `getUpdates` call before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Transport or decode failure, with the token-bearing URL removed.
    #[error("HTTP error: {0}")]
    Request(reqwest::Error),

    #[error("Telegram API error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.without_url())
    }
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramPoller {
    client: reqwest::Client,
    config: TelegramConfig,
    long_poll_secs: u64,
    offset: i64,
}

impl TelegramPoller {
    pub fn new(client: reqwest::Client, config: TelegramConfig, long_poll_secs: u64) -> Self {
        Self {
            client,
            config,
            long_poll_secs,
            offset: 0,
        }
    }

    /// Poll until `cancel` fires.
    pub async fn run(
        mut self,
        orchestrator: Arc<Orchestrator>,
        notifier: Arc<dyn ProgressNotifier>,
        cancel: CancellationToken,
    ) {
        tracing::info!(long_poll_secs = self.long_poll_secs, "Telegram poller started");

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.fetch_updates() => result,
            };

            match fetched {
                Ok(updates) => {
                    for (chat_id, text) in self.accept(updates) {
                        handle_text(&orchestrator, notifier.as_ref(), &chat_id, &text).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, backoff_secs = ERROR_BACKOFF.as_secs(), "getUpdates failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!("Telegram poller stopped");
    }

    async fn fetch_updates(&self) -> Result<Vec<Update>, PollError> {
        let body = json!({
            "offset": self.offset,
            "timeout": self.long_poll_secs,
            "allowed_updates": ["message"],
        });
        let response: UpdatesResponse = self
            .client
            .post(self.config.method_url("getUpdates"))
            // Long polls outlive the shared client's request timeout.
            .timeout(Duration::from_secs(self.long_poll_secs + 10))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(PollError::Api(response.description.unwrap_or_default()));
        }
        Ok(response.result)
    }

    /// Advance the offset past `updates` and return `(chat id, text)` pairs.
    fn accept(&mut self, updates: Vec<Update>) -> Vec<(String, String)> {
        let mut texts = Vec::new();
        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);
            match update.message {
                Some(IncomingMessage {
                    chat,
                    text: Some(text),
                }) => texts.push((chat.id.to_string(), text)),
                _ => tracing::debug!(update_id = update.update_id, "Skipping non-text update"),
            }
        }
        texts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn poller() -> TelegramPoller {
        TelegramPoller::new(reqwest::Client::new(), TelegramConfig::new("123:abc"), 30)
    }

    fn parse(raw: &str) -> UpdatesResponse {
        serde_json::from_str(raw).expect("valid updates payload")
    }

    #[test]
    fn text_messages_are_extracted_and_offset_advances() {
        let response = parse(
            r#"{"ok":true,"result":[
                {"update_id":10,"message":{"message_id":1,"chat":{"id":42,"type":"private"},"text":"a red fox"}},
                {"update_id":11,"message":{"message_id":2,"chat":{"id":42,"type":"private"},"sticker":{}}},
                {"update_id":12,"edited_message":{"message_id":1,"chat":{"id":42},"text":"edit"}}
            ]}"#,
        );
        let mut poller = poller();

        let texts = poller.accept(response.result);

        assert_eq!(texts, [("42".to_string(), "a red fox".to_string())]);
        assert_eq!(poller.offset, 13);
    }

    #[test]
    fn offset_never_moves_backwards() {
        let mut poller = poller();
        poller.offset = 100;
        poller.accept(vec![Update {
            update_id: 5,
            message: None,
        }]);
        assert_eq!(poller.offset, 100);
    }

    #[test]
    fn api_error_payload_parses() {
        let response = parse(r#"{"ok":false,"error_code":409,"description":"Conflict: terminated by other getUpdates request"}"#);
        assert!(!response.ok);
        assert!(response.result.is_empty());
        assert_eq!(
            response.description.as_deref(),
            Some("Conflict: terminated by other getUpdates request")
        );
    }

    #[tokio::test]
    async fn fetch_errors_do_not_reveal_the_token() {
        let mut config = TelegramConfig::new("SECRET123:abc");
        config.api_base = "http://127.0.0.1:9".to_string();
        let poller = TelegramPoller::new(reqwest::Client::new(), config, 1);

        let err = poller.fetch_updates().await.expect_err("nothing listens on port 9");

        assert_matches!(err, PollError::Request(_));
        assert!(!err.to_string().contains("SECRET123"), "{err}");
        assert!(!format!("{err:?}").contains("SECRET123"), "{err:?}");
    }

    #[tokio::test]
    async fn cancelled_poller_returns() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let notifier: Arc<dyn ProgressNotifier> = Arc::new(genrelay_events::TracingNotifier);
        let orchestrator = crate::testing::echo_orchestrator(notifier.clone());

        let mut config = TelegramConfig::new("123:abc");
        config.api_base = "http://127.0.0.1:9".to_string();
        TelegramPoller::new(reqwest::Client::new(), config, 1)
            .run(orchestrator, notifier, cancel)
            .await;
    }
}
