//! User-facing notification text.
//!
//! Kept in one place so every transport sends the same wording.

use crate::artifact::Artifact;

/// Stage output previews longer than this are cut with an ellipsis.
pub const PREVIEW_MAX_CHARS: usize = 400;

pub const MSG_STARTED: &str = "🎬 Working on your request…";
pub const MSG_SUCCEEDED: &str = "✅ Your result is ready!";
pub const MSG_INTERRUPTED: &str =
    "The service restarted while your request was running. Please send it again.";
pub const MSG_USAGE: &str =
    "Send me a text prompt and I will generate a video for it. Requests are handled one at a time.";

/// Acknowledgement sent right after a request is queued.
pub fn queued(position: usize) -> String {
    if position <= 1 {
        "📩 Request received, starting shortly.".to_string()
    } else {
        format!("📩 Request received. Position in queue: {position}.")
    }
}

/// Progress line for a completed stage, with a preview of its output.
pub fn stage_completed(stage: &str, artifact: &Artifact) -> String {
    format!("• {stage} done:\n{}", artifact.summary(PREVIEW_MAX_CHARS))
}

/// The single failure message a user receives for a failed job.
pub fn failed(error: &str) -> String {
    format!("❌ Generation failed: {error}\nNo retry is attempted; send the prompt again to retry.")
}

/// Cut `text` to at most `max_chars` characters, appending `…` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &text[..byte_idx]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
    }

    #[test]
    fn truncate_is_char_aware() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll…");
    }

    #[test]
    fn queued_mentions_position_only_when_waiting() {
        assert!(!queued(1).contains("Position"));
        assert!(queued(3).contains("Position in queue: 3"));
    }

    #[test]
    fn stage_completed_previews_artifact() {
        let msg = stage_completed("script", &Artifact::text("Once upon a time"));
        assert_eq!(msg, "• script done:\nOnce upon a time");
    }
}
