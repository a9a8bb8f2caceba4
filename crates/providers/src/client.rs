//! The provider contract shared by every integration.

use async_trait::async_trait;
use genrelay_core::{Artifact, JobError};
use serde_json::Value;

/// Provider-side status of one remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Pending,
    Succeeded,
    Failed,
}

impl RemoteStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One outstanding call to an external provider.
///
/// Created by [`RemoteJobClient::submit`] and owned by the stage call that
/// submitted it; it is never shared between stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJobHandle {
    /// Identifier assigned by the provider (or a local id for synchronous
    /// providers that do not hand one out).
    pub provider_job_id: String,
    pub status: RemoteStatus,
    /// Normalized output; set once `status` is `Succeeded`.
    pub result: Option<Artifact>,
    /// Provider-reported failure text; set once `status` is `Failed`.
    pub error: Option<String>,
    /// Last raw payload received from the provider, kept for diagnostics.
    pub raw: Option<Value>,
    /// Number of `poll` calls made so far.
    pub poll_count: u32,
}

impl RemoteJobHandle {
    pub fn pending(provider_job_id: impl Into<String>) -> Self {
        Self {
            provider_job_id: provider_job_id.into(),
            status: RemoteStatus::Pending,
            result: None,
            error: None,
            raw: None,
            poll_count: 0,
        }
    }

    /// A handle that is terminal on creation, for synchronous providers.
    pub fn succeeded(provider_job_id: impl Into<String>, result: Artifact) -> Self {
        Self {
            status: RemoteStatus::Succeeded,
            result: Some(result),
            ..Self::pending(provider_job_id)
        }
    }

    pub fn failed(provider_job_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Failed,
            error: Some(error.into()),
            ..Self::pending(provider_job_id)
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Input handed to a provider by a chain stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderInput {
    /// The text the provider works from (user prompt, script, ...).
    pub prompt: String,
    /// Media produced by earlier stages, keyed by role (`"audio"`, `"video"`).
    pub media: Vec<(String, Artifact)>,
}

impl ProviderInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            media: Vec::new(),
        }
    }

    pub fn with_media(mut self, role: impl Into<String>, artifact: Artifact) -> Self {
        self.media.push((role.into(), artifact));
        self
    }

    pub fn media(&self, role: &str) -> Option<&Artifact> {
        self.media
            .iter()
            .find(|(r, _)| r == role)
            .map(|(_, artifact)| artifact)
    }
}

/// A single external generation capability (text, speech, video, ...).
///
/// Implementations never retry on their own: a failed call is reported and
/// the caller decides what happens next.
#[async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Short provider name used in logs and error messages.
    fn name(&self) -> &str;

    /// Start a job.
    ///
    /// Fails with [`JobError::ProviderUnavailable`] on network or auth
    /// errors and [`JobError::InvalidInput`] when the provider rejects the
    /// payload outright.
    async fn submit(&self, input: &ProviderInput) -> Result<RemoteJobHandle, JobError>;

    /// Refresh the status of a pending job.
    ///
    /// The default suits synchronous providers, whose handles are terminal
    /// from the start and therefore never polled.
    async fn poll(&self, handle: RemoteJobHandle) -> Result<RemoteJobHandle, JobError> {
        if handle.is_terminal() {
            return Ok(handle);
        }
        Err(JobError::ProviderUnavailable(format!(
            "{} does not support polling (job {})",
            self.name(),
            handle.provider_job_id
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
