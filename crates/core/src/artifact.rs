//! Typed references to the output of a generation stage.
//!
//! Providers answer in many shapes; by the time a result leaves a
//! provider client it has been normalized into one [`Artifact`].

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::messages::truncate_chars;

/// Broad media category, used to pick the right delivery method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Document,
}

impl MediaKind {
    /// Guess the kind from a file extension (case-insensitive, no dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "mov" | "webm" | "mkv" => Self::Video,
            "mp3" | "wav" | "ogg" | "m4a" | "flac" => Self::Audio,
            "png" | "jpg" | "jpeg" | "webp" | "gif" => Self::Image,
            _ => Self::Document,
        }
    }

    /// Guess the kind from the last path segment of a URL, ignoring any
    /// query string. Falls back to `fallback` when there is no extension.
    pub fn guess_from_url(url: &str, fallback: Self) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file = path.rsplit('/').next().unwrap_or(path);
        match file.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => Self::from_extension(ext),
            _ => fallback,
        }
    }

    /// MIME type assumed when a provider does not state one.
    pub fn default_mime(self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Audio => "audio/mpeg",
            Self::Image => "image/png",
            Self::Document => "application/octet-stream",
        }
    }

    /// File extension matching [`default_mime`](Self::default_mime).
    pub fn default_extension(self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
            Self::Image => "png",
            Self::Document => "bin",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Document => "document",
        }
    }
}

/// The normalized output of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Artifact {
    /// Generated text, e.g. a narration script.
    Text { text: String },

    /// Media hosted by the provider.
    Url { url: String, kind: MediaKind },

    /// Media returned inline in the provider response.
    Bytes {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        mime: String,
        kind: MediaKind,
    },

    /// Media written to local disk (e.g. by the mux stage).
    File { path: PathBuf, kind: MediaKind },
}

impl Artifact {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn url(url: impl Into<String>, kind: MediaKind) -> Self {
        Self::Url {
            url: url.into(),
            kind,
        }
    }

    /// `None` for text artifacts.
    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            Self::Text { .. } => None,
            Self::Url { kind, .. } | Self::Bytes { kind, .. } | Self::File { kind, .. } => {
                Some(*kind)
            }
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// A string another provider can consume as a media input.
    ///
    /// URLs pass through, inline bytes become a `data:` URI, files become
    /// their path. Text has no media reference.
    pub fn media_reference(&self) -> Option<String> {
        match self {
            Self::Text { .. } => None,
            Self::Url { url, .. } => Some(url.clone()),
            Self::Bytes { data, mime, .. } => {
                Some(format!("data:{mime};base64,{}", STANDARD.encode(data)))
            }
            Self::File { path, .. } => Some(path.to_string_lossy().into_owned()),
        }
    }

    /// Short human-readable description, truncated to `max_chars`.
    pub fn summary(&self, max_chars: usize) -> String {
        let full = match self {
            Self::Text { text } => text.clone(),
            Self::Url { url, kind } => format!("{}: {url}", kind.as_str()),
            Self::Bytes { data, mime, kind } => {
                format!("{} ({} bytes, {mime})", kind.as_str(), data.len())
            }
            Self::File { path, kind } => format!("{}: {}", kind.as_str(), path.display()),
        };
        truncate_chars(&full, max_chars)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_url_ignores_query() {
        assert_eq!(
            MediaKind::guess_from_url("https://cdn.example/out/a.MP4?sig=abc", MediaKind::Document),
            MediaKind::Video
        );
        assert_eq!(
            MediaKind::guess_from_url("https://cdn.example/speech.mp3", MediaKind::Document),
            MediaKind::Audio
        );
    }

    #[test]
    fn kind_from_url_without_extension_uses_fallback() {
        assert_eq!(
            MediaKind::guess_from_url("https://cdn.example/files/abc", MediaKind::Image),
            MediaKind::Image
        );
    }

    #[test]
    fn bytes_reference_is_data_uri() {
        let artifact = Artifact::Bytes {
            data: b"hi".to_vec(),
            mime: "audio/mpeg".to_string(),
            kind: MediaKind::Audio,
        };
        assert_eq!(
            artifact.media_reference().as_deref(),
            Some("data:audio/mpeg;base64,aGk=")
        );
    }

    #[test]
    fn text_has_no_media_reference() {
        assert!(Artifact::text("script").media_reference().is_none());
        assert!(Artifact::text("script").kind().is_none());
    }

    #[test]
    fn summary_truncates_long_text() {
        let artifact = Artifact::text("x".repeat(500));
        let summary = artifact.summary(400);
        assert_eq!(summary.chars().count(), 401);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn bytes_serialize_as_base64_string() {
        let artifact = Artifact::Bytes {
            data: vec![0, 1, 2],
            mime: "audio/mpeg".to_string(),
            kind: MediaKind::Audio,
        };
        let json = serde_json::to_value(&artifact).expect("serialize");
        assert_eq!(json["type"], "bytes");
        assert_eq!(json["data"], "AAEC");

        let back: Artifact = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, artifact);
    }
}
