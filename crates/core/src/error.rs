use crate::job::JobStatus;

/// Violations of the job model's own invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Stage '{0}' already has a recorded result")]
    DuplicateStage(String),

    #[error("Stage results can only be recorded while running (status is {0})")]
    NotRunning(JobStatus),
}

/// Everything that can terminate a generation job.
///
/// The `Display` output of every variant is written for end users: it is
/// sent verbatim in the failure notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The prompt or a provider payload was rejected before any work ran.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network, authentication or server-side failure talking to a provider.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider accepted the job but reported it as failed.
    #[error("Provider reported failure: {0}")]
    ProviderFailed(String),

    /// The polling bound was exceeded before a terminal status was seen.
    #[error("Timed out waiting for the provider after {polls} polls ({elapsed_ms} ms)")]
    Timeout { polls: u32, elapsed_ms: u64 },

    /// The provider answered with a payload no extraction rule understands.
    #[error("Unrecognized response from {provider}")]
    UnrecognizedResponseShape {
        provider: String,
        /// Raw payload kept for diagnosis; not shown to users.
        raw: String,
    },

    /// A chain stage failed; wraps the underlying error with the stage name.
    #[error("Stage '{stage}' failed: {source}")]
    ChainStageFailure {
        stage: String,
        #[source]
        source: Box<JobError>,
    },
}

impl JobError {
    /// Wrap `self` as the failure of the named chain stage.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Self::ChainStageFailure {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, unwrapping any stage failures.
    pub fn root_cause(&self) -> &JobError {
        match self {
            Self::ChainStageFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Name of the stage that failed, if this error came out of a chain.
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            Self::ChainStageFailure { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn display_timeout() {
        let err = JobError::Timeout {
            polls: 3,
            elapsed_ms: 25,
        };
        assert_eq!(
            err.to_string(),
            "Timed out waiting for the provider after 3 polls (25 ms)"
        );
    }

    #[test]
    fn unrecognized_shape_hides_raw_payload() {
        let err = JobError::UnrecognizedResponseShape {
            provider: "replicate".to_string(),
            raw: "{\"secret\":true}".to_string(),
        };
        assert_eq!(err.to_string(), "Unrecognized response from replicate");
    }

    #[test]
    fn stage_failure_names_stage_and_cause() {
        let err = JobError::ProviderUnavailable("HTTP 503".to_string()).in_stage("speech");
        assert_eq!(
            err.to_string(),
            "Stage 'speech' failed: Provider unavailable: HTTP 503"
        );
        assert_eq!(err.failed_stage(), Some("speech"));
        assert_matches!(err.root_cause(), JobError::ProviderUnavailable(_));
    }

    #[test]
    fn stage_failure_exposes_source() {
        let err = JobError::InvalidInput("empty".to_string()).in_stage("script");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_transition_display() {
        let err = CoreError::InvalidTransition {
            from: JobStatus::Succeeded,
            to: JobStatus::Running,
        };
        assert_eq!(err.to_string(), "Invalid status transition: succeeded -> running");
    }
}
