//! Prompt validation, applied before a request is enqueued.

use crate::error::JobError;

/// Longest prompt accepted, in characters.
pub const MAX_PROMPT_CHARS: usize = 2000;

/// Trim and validate a user prompt.
///
/// Rejects empty (or whitespace-only) prompts and prompts longer than
/// [`MAX_PROMPT_CHARS`]. Returns the trimmed prompt on success.
pub fn validate_prompt(text: &str) -> Result<String, JobError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(JobError::InvalidInput("the prompt is empty".to_string()));
    }
    let len = trimmed.chars().count();
    if len > MAX_PROMPT_CHARS {
        return Err(JobError::InvalidInput(format!(
            "the prompt is {len} characters long; the limit is {MAX_PROMPT_CHARS}"
        )));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
