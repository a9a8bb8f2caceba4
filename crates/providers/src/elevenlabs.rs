//! ElevenLabs text-to-speech.
//!
//! The API streams the encoded audio back in the response body, so the
//! handle is terminal on submit and carries the bytes inline.

use async_trait::async_trait;
use genrelay_core::{Artifact, JobError, MediaKind};
use serde::Serialize;

use crate::client::{ProviderInput, RemoteJobClient, RemoteJobHandle};
use crate::http;

const PROVIDER: &str = "elevenlabs";

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.elevenlabs.io".to_string(),
            voice_id: voice_id.into(),
            model_id: "eleven_multilingual_v2".to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        )
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// Synthesizes speech for the stage prompt (typically a generated script).
pub struct ElevenLabsSpeechClient {
    client: reqwest::Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsSpeechClient {
    pub fn new(client: reqwest::Client, config: ElevenLabsConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl RemoteJobClient for ElevenLabsSpeechClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn submit(&self, input: &ProviderInput) -> Result<RemoteJobHandle, JobError> {
        if input.prompt.trim().is_empty() {
            return Err(JobError::InvalidInput("nothing to synthesize".to_string()));
        }

        let response = self
            .client
            .post(self.config.endpoint())
            .header("xi-api-key", &self.config.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&SpeechRequest {
                text: &input.prompt,
                model_id: &self.config.model_id,
            })
            .send()
            .await
            .map_err(|e| http::request_failed(PROVIDER, e))?;

        let response = http::ensure_success(PROVIDER, response).await?;
        let mime = audio_mime(
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let data = response
            .bytes()
            .await
            .map_err(|e| http::request_failed(PROVIDER, e))?;

        if data.is_empty() {
            return Err(JobError::UnrecognizedResponseShape {
                provider: PROVIDER.to_string(),
                raw: "empty audio body".to_string(),
            });
        }

        tracing::debug!(bytes = data.len(), mime = %mime, "Speech synthesized");
        Ok(RemoteJobHandle::succeeded(
            format!("tts-{}", uuid::Uuid::new_v4()),
            Artifact::Bytes {
                data: data.to_vec(),
                mime,
                kind: MediaKind::Audio,
            },
        ))
    }
}

/// Use the declared content type when it is audio, else assume MP3.
fn audio_mime(content_type: Option<&str>) -> String {
    content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
        .filter(|ct| ct.starts_with("audio/"))
        .unwrap_or(MediaKind::Audio.default_mime())
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
