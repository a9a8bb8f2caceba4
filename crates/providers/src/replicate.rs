//! Replicate predictions client.
//!
//! Replicate is genuinely asynchronous: `POST` creates a prediction that is
//! `starting`, then `processing`, and finally `succeeded`, `failed` or
//! `canceled`. The client maps those onto [`RemoteStatus`] and leaves the
//! waiting to [`crate::poll::wait_until_terminal`].

use async_trait::async_trait;
use genrelay_core::{Artifact, JobError, MediaKind};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::client::{ProviderInput, RemoteJobClient, RemoteJobHandle, RemoteStatus};
use crate::extract;
use crate::http;

const PROVIDER: &str = "replicate";

/// How to read the prediction `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicateOutput {
    /// One or more media URLs; `suffix` picks among several.
    Media {
        suffix: Option<String>,
        kind: MediaKind,
    },
    /// Text, possibly streamed as an array of fragments.
    Text,
}

#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub base_url: String,
    /// `owner/name` for official models, or `owner/name:version`.
    pub model: String,
    /// Input field that receives the stage prompt.
    pub prompt_field: String,
    /// `(media role, input field)` pairs, e.g. `("audio", "audio_file")`.
    pub media_fields: Vec<(String, String)>,
    /// Fixed model inputs merged into every request.
    pub extra_input: Map<String, Value>,
    pub output: ReplicateOutput,
}

impl ReplicateConfig {
    pub fn new(api_token: impl Into<String>, model: impl Into<String>, output: ReplicateOutput) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: "https://api.replicate.com".to_string(),
            model: model.into(),
            prompt_field: "prompt".to_string(),
            media_fields: Vec::new(),
            extra_input: Map::new(),
            output,
        }
    }

    pub fn with_media_field(mut self, role: impl Into<String>, field: impl Into<String>) -> Self {
        self.media_fields.push((role.into(), field.into()));
        self
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
}

pub struct ReplicateClient {
    client: reqwest::Client,
    config: ReplicateConfig,
}

impl ReplicateClient {
    pub fn new(client: reqwest::Client, config: ReplicateConfig) -> Self {
        Self { client, config }
    }

    /// Endpoint and JSON body for creating a prediction.
    fn create_request(&self, input: &ProviderInput) -> Result<(String, Value), JobError> {
        let mut model_input = self.config.extra_input.clone();
        model_input.insert(
            self.config.prompt_field.clone(),
            Value::String(input.prompt.clone()),
        );
        for (role, field) in &self.config.media_fields {
            let reference = input
                .media(role)
                .and_then(Artifact::media_reference)
                .ok_or_else(|| {
                    JobError::InvalidInput(format!("missing {role} input for {}", self.config.model))
                })?;
            model_input.insert(field.clone(), Value::String(reference));
        }

        let base = self.config.base();
        let request = match self.config.model.split_once(':') {
            Some((_, version)) => (
                format!("{base}/v1/predictions"),
                serde_json::json!({ "version": version, "input": model_input }),
            ),
            None => (
                format!("{base}/v1/models/{}/predictions", self.config.model),
                serde_json::json!({ "input": model_input }),
            ),
        };
        Ok(request)
    }

    /// Convert a prediction payload into a handle, extracting the output
    /// once the prediction has succeeded.
    fn to_handle(&self, raw: Value, poll_count: u32) -> Result<RemoteJobHandle, JobError> {
        let prediction: Prediction = serde_json::from_value(raw.clone())
            .map_err(|_| extract::unrecognized(PROVIDER, &raw))?;

        let mut handle = match prediction.status.as_str() {
            "starting" | "processing" => RemoteJobHandle::pending(prediction.id),
            "succeeded" => {
                let artifact = match &self.config.output {
                    ReplicateOutput::Media { suffix, kind } => {
                        extract::replicate_media(&prediction.output, suffix.as_deref(), *kind)?
                    }
                    ReplicateOutput::Text => extract::replicate_text(&prediction.output)?,
                };
                RemoteJobHandle::succeeded(prediction.id, artifact)
            }
            "failed" | "canceled" => {
                let reason = match &prediction.error {
                    Value::String(msg) if !msg.is_empty() => msg.clone(),
                    Value::Null | Value::String(_) => format!("prediction {}", prediction.status),
                    other => other.to_string(),
                };
                RemoteJobHandle::failed(prediction.id, reason)
            }
            _ => return Err(extract::unrecognized(PROVIDER, &raw)),
        };
        handle.poll_count = poll_count;
        Ok(handle.with_raw(raw))
    }
}

#[async_trait]
impl RemoteJobClient for ReplicateClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn submit(&self, input: &ProviderInput) -> Result<RemoteJobHandle, JobError> {
        let (url, body) = self.create_request(input)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::request_failed(PROVIDER, e))?;

        let raw = http::read_json(PROVIDER, response).await?;
        self.to_handle(raw, 0)
    }

    async fn poll(&self, handle: RemoteJobHandle) -> Result<RemoteJobHandle, JobError> {
        if handle.status != RemoteStatus::Pending {
            return Ok(handle);
        }
        let url = format!(
            "{}/v1/predictions/{}",
            self.config.base(),
            handle.provider_job_id
        );
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| http::request_failed(PROVIDER, e))?;

        let raw = http::read_json(PROVIDER, response).await?;
        self.to_handle(raw, handle.poll_count)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn video_client(model: &str) -> ReplicateClient {
        let config = ReplicateConfig::new(
            "r8_test",
            model,
            ReplicateOutput::Media {
                suffix: Some(".mp4".to_string()),
                kind: MediaKind::Video,
            },
        )
        .with_media_field("audio", "audio_file");
        ReplicateClient::new(reqwest::Client::new(), config)
    }

    fn input_with_audio() -> ProviderInput {
        ProviderInput::new("a dancing robot")
            .with_media("audio", Artifact::url("https://x/s.mp3", MediaKind::Audio))
    }

    #[test]
    fn official_model_uses_model_endpoint() {
        let (url, body) = video_client("acme/talking-video")
            .create_request(&input_with_audio())
            .expect("request");
        assert_eq!(url, "https://api.replicate.com/v1/models/acme/talking-video/predictions");
        assert_eq!(
            body,
            json!({"input": {"prompt": "a dancing robot", "audio_file": "https://x/s.mp3"}})
        );
    }

    #[test]
    fn versioned_model_uses_predictions_endpoint() {
        let (url, body) = video_client("acme/talking-video:abc123")
            .create_request(&input_with_audio())
            .expect("request");
        assert_eq!(url, "https://api.replicate.com/v1/predictions");
        assert_eq!(body["version"], "abc123");
    }

    #[test]
    fn extra_input_is_merged() {
        let mut client = video_client("acme/v");
        client
            .config
            .extra_input
            .insert("fps".to_string(), json!(24));
        let (_, body) = client.create_request(&input_with_audio()).expect("request");
        assert_eq!(body["input"]["fps"], 24);
    }

    #[test]
    fn missing_media_is_invalid_input() {
        assert_matches!(
            video_client("acme/v").create_request(&ProviderInput::new("p")),
            Err(JobError::InvalidInput(msg)) if msg.contains("audio")
        );
    }

    #[test]
    fn processing_prediction_is_pending() {
        let handle = video_client("acme/v")
            .to_handle(json!({"id": "p1", "status": "processing", "output": null}), 4)
            .expect("handle");
        assert_eq!(handle.status, RemoteStatus::Pending);
        assert_eq!(handle.provider_job_id, "p1");
        assert_eq!(handle.poll_count, 4);
        assert_eq!(handle.raw.as_ref().map(|r| &r["status"]), Some(&json!("processing")));
    }

    #[test]
    fn succeeded_prediction_extracts_output() {
        let handle = video_client("acme/v")
            .to_handle(
                json!({"id": "p1", "status": "succeeded", "output": ["a.png", "b.mp4"]}),
                2,
            )
            .expect("handle");
        assert_eq!(handle.status, RemoteStatus::Succeeded);
        assert_eq!(handle.result, Some(Artifact::url("b.mp4", MediaKind::Video)));
    }

    #[test]
    fn failed_prediction_keeps_error_text() {
        let handle = video_client("acme/v")
            .to_handle(json!({"id": "p1", "status": "failed", "error": "CUDA OOM"}), 1)
            .expect("handle");
        assert_eq!(handle.status, RemoteStatus::Failed);
        assert_eq!(handle.error.as_deref(), Some("CUDA OOM"));

        let canceled = video_client("acme/v")
            .to_handle(json!({"id": "p2", "status": "canceled"}), 1)
            .expect("handle");
        assert_eq!(canceled.error.as_deref(), Some("prediction canceled"));
    }

    #[test]
    fn unknown_status_is_unrecognized() {
        assert_matches!(
            video_client("acme/v").to_handle(json!({"id": "p1", "status": "weird"}), 0),
            Err(JobError::UnrecognizedResponseShape { .. })
        );
        assert_matches!(
            video_client("acme/v").to_handle(json!({"detail": "not found"}), 0),
            Err(JobError::UnrecognizedResponseShape { .. })
        );
    }

    #[test]
    fn text_output_mode() {
        let client = ReplicateClient::new(
            reqwest::Client::new(),
            ReplicateConfig::new("t", "meta/llama", ReplicateOutput::Text),
        );
        let handle = client
            .to_handle(json!({"id": "p", "status": "succeeded", "output": ["Hi", " there"]}), 0)
            .expect("handle");
        assert_eq!(handle.result, Some(Artifact::text("Hi there")));
    }
}
