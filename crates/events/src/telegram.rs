//! Telegram Bot API notifier with bounded retry.
//!
//! Text goes out through `sendMessage`; artifacts through `sendVideo`,
//! `sendAudio`, `sendPhoto` or `sendDocument`, by URL when the artifact is
//! hosted and as a multipart upload when it is inline bytes or a local file.
//! Each request is retried a fixed number of times with a fixed delay when
//! the failure looks transient (network errors, 429, 5xx).

use std::time::Duration;

use async_trait::async_trait;
use genrelay_core::{messages::truncate_chars, Artifact, MediaKind};
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};

use crate::notifier::{Notification, NotifyError, ProgressNotifier};

/// Default number of attempts per request.
const DEFAULT_ATTEMPTS: u32 = 3;

/// Default fixed delay between attempts.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Telegram rejects messages longer than this.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Telegram rejects media captions longer than this.
const MAX_CAPTION_CHARS: usize = 1024;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base: String,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: "https://api.telegram.org".to_string(),
        }
    }

    /// Full URL of a Bot API method. Contains the token; never log it.
    pub fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

// ---------------------------------------------------------------------------
// Outgoing requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Upload {
    field: &'static str,
    file_name: String,
    mime: String,
    data: Vec<u8>,
}

/// One Bot API call, ready to be (re)sent.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Outgoing {
    method: &'static str,
    fields: Vec<(&'static str, String)>,
    upload: Option<Upload>,
}

impl Outgoing {
    fn message(chat_id: &str, text: &str) -> Self {
        Self {
            method: "sendMessage",
            fields: vec![
                ("chat_id", chat_id.to_string()),
                ("text", truncate_chars(text, MAX_MESSAGE_CHARS)),
            ],
            upload: None,
        }
    }

    fn json_body(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String(v.clone())))
            .collect();
        Value::Object(map)
    }
}

/// Bot API method and media field for a media kind.
fn media_method(kind: MediaKind) -> (&'static str, &'static str) {
    match kind {
        MediaKind::Video => ("sendVideo", "video"),
        MediaKind::Audio => ("sendAudio", "audio"),
        MediaKind::Image => ("sendPhoto", "photo"),
        MediaKind::Document => ("sendDocument", "document"),
    }
}

/// Translate a notification into the Bot API calls that deliver it.
async fn plan(chat_id: &str, notification: &Notification) -> Result<Vec<Outgoing>, NotifyError> {
    let text = notification.text.as_str();
    let Some(artifact) = &notification.artifact else {
        return Ok(vec![Outgoing::message(chat_id, text)]);
    };

    let (kind, reference, upload) = match artifact {
        Artifact::Text { text: body } => {
            let combined = if text.is_empty() {
                body.clone()
            } else {
                format!("{text}\n\n{body}")
            };
            return Ok(vec![Outgoing::message(chat_id, &combined)]);
        }
        Artifact::Url { url, kind } => (*kind, Some(url.clone()), None),
        Artifact::Bytes { data, mime, kind } => (
            *kind,
            None,
            Some((format!("result.{}", kind.default_extension()), mime.clone(), data.clone())),
        ),
        Artifact::File { path, kind } => {
            let data = tokio::fs::read(path).await?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("result.{}", kind.default_extension()));
            (*kind, None, Some((file_name, kind.default_mime().to_string(), data)))
        }
    };

    let (method, field) = media_method(kind);
    let mut calls = Vec::with_capacity(2);
    let mut fields = vec![("chat_id", chat_id.to_string())];
    if text.chars().count() <= MAX_CAPTION_CHARS {
        if !text.is_empty() {
            fields.push(("caption", text.to_string()));
        }
    } else {
        calls.push(Outgoing::message(chat_id, text));
    }

    let upload = match (reference, upload) {
        (Some(url), _) => {
            fields.push((field, url));
            None
        }
        (None, Some((file_name, mime, data))) => Some(Upload {
            field,
            file_name,
            mime,
            data,
        }),
        (None, None) => None,
    };
    calls.push(Outgoing {
        method,
        fields,
        upload,
    });
    Ok(calls)
}

fn is_retryable(err: &NotifyError) -> bool {
    match err {
        NotifyError::Request(_) => true,
        NotifyError::Rejected { status, .. } => *status == 429 || *status >= 500,
        NotifyError::Io(_) => false,
    }
}

// ---------------------------------------------------------------------------
// TelegramNotifier
// ---------------------------------------------------------------------------

pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
    attempts: u32,
    retry_delay: Duration,
}

impl TelegramNotifier {
    pub fn new(client: reqwest::Client, config: TelegramConfig) -> Self {
        Self {
            client,
            config,
            attempts: DEFAULT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the retry policy. `attempts` is clamped to at least one.
    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    async fn send_with_retry(&self, outgoing: &Outgoing) -> Result<(), NotifyError> {
        let mut attempt = 1;
        loop {
            match self.try_send(outgoing).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.attempts && is_retryable(&e) => {
                    tracing::warn!(
                        attempt,
                        method = outgoing.method,
                        error = %e,
                        "Telegram delivery attempt failed, retrying",
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        attempt,
                        method = outgoing.method,
                        error = %e,
                        "Telegram delivery failed",
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Execute a single request and check the Bot API answer.
    async fn try_send(&self, outgoing: &Outgoing) -> Result<(), NotifyError> {
        let url = self.config.method_url(outgoing.method);
        let request = match &outgoing.upload {
            None => self.client.post(url).json(&outgoing.json_body()),
            Some(upload) => {
                let mut form = Form::new();
                for (name, value) in &outgoing.fields {
                    form = form.text(*name, value.clone());
                }
                let part = Part::bytes(upload.data.clone())
                    .file_name(upload.file_name.clone())
                    .mime_str(&upload.mime)?;
                self.client.post(url).multipart(form.part(upload.field, part))
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body: Value = response.json().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            description: body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description")
                .to_string(),
        })
    }
}

#[async_trait]
impl ProgressNotifier for TelegramNotifier {
    async fn notify(&self, source_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        for outgoing in plan(source_id, notification).await? {
            self.send_with_retry(&outgoing).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
