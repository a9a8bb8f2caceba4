//! Per-provider response normalization.
//!
//! Providers return their output in different shapes. Each function here
//! is the single documented rule for one provider family; a payload that
//! matches no rule is logged with its raw JSON and reported as
//! [`JobError::UnrecognizedResponseShape`].
//!
//! | Provider          | Rule                                                         |
//! |-------------------|--------------------------------------------------------------|
//! | Replicate (media) | `output` string; or first array string ending with the       |
//! |                   | configured suffix, else the first array string; or the       |
//! |                   | `url` / `video` / `audio` / `image` field of an object       |
//! | Replicate (text)  | `output` string, or array of string fragments concatenated   |
//! | OpenAI media      | `data[0].url`, else `data[0].b64_json` decoded as bytes      |
//! | OpenAI chat       | `choices[0].message.content`                                 |

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use genrelay_core::{Artifact, JobError, MediaKind};
use serde_json::Value;

/// Object keys searched, in order, when Replicate returns an object.
const OBJECT_URL_KEYS: [&str; 4] = ["url", "video", "audio", "image"];

/// Normalize a Replicate prediction `output` holding media URLs.
///
/// `suffix` (e.g. `".mp4"`) selects among multiple outputs; without a
/// suffix, or when nothing matches it, the first string wins. The choice
/// is deterministic for a given payload.
pub fn replicate_media(
    output: &Value,
    suffix: Option<&str>,
    fallback_kind: MediaKind,
) -> Result<Artifact, JobError> {
    let url = match output {
        Value::String(url) => Some(url.as_str()),
        Value::Array(items) => {
            let urls: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            suffix
                .and_then(|s| urls.iter().copied().find(|u| has_suffix(u, s)))
                .or_else(|| urls.first().copied())
        }
        Value::Object(map) => OBJECT_URL_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str)),
        _ => None,
    };

    match url {
        Some(url) if !url.is_empty() => Ok(Artifact::url(
            url,
            MediaKind::guess_from_url(url, fallback_kind),
        )),
        _ => Err(unrecognized("replicate", output)),
    }
}

/// Normalize a Replicate prediction `output` from a language model.
pub fn replicate_text(output: &Value) -> Result<Artifact, JobError> {
    match output {
        Value::String(text) if !text.trim().is_empty() => Ok(Artifact::text(text.trim())),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_string) => {
            let text: String = items.iter().filter_map(Value::as_str).collect();
            if text.trim().is_empty() {
                Err(unrecognized("replicate", output))
            } else {
                Ok(Artifact::text(text.trim()))
            }
        }
        _ => Err(unrecognized("replicate", output)),
    }
}

/// Normalize an OpenAI image/video generation response.
pub fn openai_media(raw: &Value, kind: MediaKind) -> Result<Artifact, JobError> {
    let first = raw.pointer("/data/0");
    if let Some(url) = first.and_then(|v| v.get("url")).and_then(Value::as_str) {
        return Ok(Artifact::url(url, MediaKind::guess_from_url(url, kind)));
    }
    if let Some(encoded) = first.and_then(|v| v.get("b64_json")).and_then(Value::as_str) {
        if let Ok(data) = STANDARD.decode(encoded.as_bytes()) {
            return Ok(Artifact::Bytes {
                data,
                mime: kind.default_mime().to_string(),
                kind,
            });
        }
    }
    Err(unrecognized("openai", raw))
}

/// Normalize an OpenAI chat completion response.
pub fn openai_chat_text(raw: &Value) -> Result<Artifact, JobError> {
    match raw
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        Some(text) if !text.trim().is_empty() => Ok(Artifact::text(text.trim())),
        _ => Err(unrecognized("openai", raw)),
    }
}

/// Build the error for an unmatched payload, logging the raw JSON.
pub fn unrecognized(provider: &str, raw: &Value) -> JobError {
    let raw = raw.to_string();
    tracing::warn!(provider, raw_payload = %raw, "Unrecognized provider response shape");
    JobError::UnrecognizedResponseShape {
        provider: provider.to_string(),
        raw,
    }
}

fn has_suffix(url: &str, suffix: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase()
        .ends_with(&suffix.to_ascii_lowercase())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
