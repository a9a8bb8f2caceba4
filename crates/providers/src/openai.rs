//! OpenAI clients: chat completions for scripts, and video generation.
//!
//! Both endpoints answer synchronously, so [`submit`](RemoteJobClient::submit)
//! returns a handle that is already terminal.

use async_trait::async_trait;
use genrelay_core::{JobError, MediaKind};
use serde::Serialize;
use serde_json::Value;

use crate::client::{ProviderInput, RemoteJobClient, RemoteJobHandle};
use crate::extract;
use crate::http;

const PROVIDER: &str = "openai";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Credentials and endpoint shared by the OpenAI clients.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Base URL without the `/v1` suffix.
    pub base_url: String,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url.trim_end_matches('/'))
    }
}

// ---------------------------------------------------------------------------
// Chat completions
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

/// Generates text (e.g. a narration script) from the stage prompt.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    config: OpenAiConfig,
    model: String,
    system_prompt: String,
}

impl OpenAiChatClient {
    pub fn new(
        client: reqwest::Client,
        config: OpenAiConfig,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            client,
            config,
            model: model.into(),
            system_prompt: system_prompt.into(),
        }
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &self.system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        ChatRequest {
            model: &self.model,
            messages,
        }
    }
}

#[async_trait]
impl RemoteJobClient for OpenAiChatClient {
    fn name(&self) -> &str {
        "openai-chat"
    }

    async fn submit(&self, input: &ProviderInput) -> Result<RemoteJobHandle, JobError> {
        if input.prompt.trim().is_empty() {
            return Err(JobError::InvalidInput("chat prompt is empty".to_string()));
        }
        let response = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(&input.prompt))
            .send()
            .await
            .map_err(|e| http::request_failed(PROVIDER, e))?;

        let raw = http::read_json(PROVIDER, response).await?;
        let artifact = extract::openai_chat_text(&raw)?;
        Ok(RemoteJobHandle::succeeded(response_id(&raw), artifact).with_raw(raw))
    }
}

// ---------------------------------------------------------------------------
// Video generation
// ---------------------------------------------------------------------------

/// Tunables for the video generation request.
#[derive(Debug, Clone)]
pub struct OpenAiVideoOptions {
    pub model: String,
    /// Text prepended to every prompt to fix the visual style.
    pub style_preamble: String,
    pub size: String,
    pub duration_secs: u32,
}

impl Default for OpenAiVideoOptions {
    fn default() -> Self {
        Self {
            model: "gpt-image-1".to_string(),
            style_preamble: "Create a smooth short video in mixed-style format.".to_string(),
            size: "1024x576".to_string(),
            duration_secs: 6,
        }
    }
}

#[derive(Debug, Serialize)]
struct VideoRequest<'a> {
    model: &'a str,
    prompt: String,
    size: &'a str,
    duration: u32,
}

/// Generates a short video directly from the prompt.
pub struct OpenAiVideoClient {
    client: reqwest::Client,
    config: OpenAiConfig,
    options: OpenAiVideoOptions,
}

impl OpenAiVideoClient {
    pub fn new(client: reqwest::Client, config: OpenAiConfig, options: OpenAiVideoOptions) -> Self {
        Self {
            client,
            config,
            options,
        }
    }

    fn request_body(&self, prompt: &str) -> VideoRequest<'_> {
        let prompt = if self.options.style_preamble.is_empty() {
            prompt.to_string()
        } else {
            format!("{} {prompt}", self.options.style_preamble)
        };
        VideoRequest {
            model: &self.options.model,
            prompt,
            size: &self.options.size,
            duration: self.options.duration_secs,
        }
    }
}

#[async_trait]
impl RemoteJobClient for OpenAiVideoClient {
    fn name(&self) -> &str {
        "openai-video"
    }

    async fn submit(&self, input: &ProviderInput) -> Result<RemoteJobHandle, JobError> {
        if let Some((role, _)) = input.media.first() {
            return Err(JobError::InvalidInput(format!(
                "{PROVIDER} video generation takes no {role} input"
            )));
        }
        let response = self
            .client
            .post(self.config.endpoint("videos/generations"))
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(&input.prompt))
            .send()
            .await
            .map_err(|e| http::request_failed(PROVIDER, e))?;

        let raw = http::read_json(PROVIDER, response).await?;
        let artifact = extract::openai_media(&raw, MediaKind::Video)?;
        Ok(RemoteJobHandle::succeeded(response_id(&raw), artifact).with_raw(raw))
    }
}

/// OpenAI responses carry an `id` on most endpoints; fall back to a local one.
fn response_id(raw: &Value) -> String {
    raw.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("local-{}", uuid::Uuid::new_v4()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
