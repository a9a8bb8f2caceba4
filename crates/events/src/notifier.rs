//! The notification seam between job logic and chat transports.

use async_trait::async_trait;
use genrelay_core::{Artifact, JobId};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for notification delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    ///
    /// Built through `From`, which drops the request URL: Bot API URLs
    /// carry the bot token.
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// The transport answered but refused the message.
    #[error("Transport rejected the message ({status}): {description}")]
    Rejected { status: u16, description: String },

    /// A local artifact could not be read for upload.
    #[error("Cannot read artifact: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.without_url())
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// One message for the user, optionally with media attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The job this message is about; `None` for replies such as usage help.
    pub job_id: Option<JobId>,
    pub text: String,
    pub artifact: Option<Artifact>,
}

impl Notification {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            job_id: None,
            text: text.into(),
            artifact: None,
        }
    }

    pub fn for_job(job_id: JobId, text: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id),
            ..Self::text(text)
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

// ---------------------------------------------------------------------------
// ProgressNotifier
// ---------------------------------------------------------------------------

/// Tells the user what is happening with their request.
///
/// Delivery is best effort: callers log failures through
/// [`notify_best_effort`] and never fail a job because of them.
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn notify(&self, source_id: &str, notification: &Notification) -> Result<(), NotifyError>;
}

/// Send `notification`, logging instead of returning any failure.
///
/// Returns whether delivery succeeded.
pub async fn notify_best_effort(
    notifier: &dyn ProgressNotifier,
    source_id: &str,
    notification: &Notification,
) -> bool {
    match notifier.notify(source_id, notification).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                source_id,
                job_id = ?notification.job_id,
                error = %e,
                "Notification delivery failed",
            );
            false
        }
    }
}

// ---------------------------------------------------------------------------
// TracingNotifier
// ---------------------------------------------------------------------------

/// Writes notifications to the log instead of a chat; used for dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl ProgressNotifier for TracingNotifier {
    async fn notify(&self, source_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            source_id,
            job_id = ?notification.job_id,
            text = %notification.text,
            artifact = notification
                .artifact
                .as_ref()
                .map(|a| a.summary(200))
                .unwrap_or_default(),
            "Notification",
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
