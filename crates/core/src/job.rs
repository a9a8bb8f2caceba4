//! The generation job model and its lifecycle rules.
//!
//! A [`Job`] only moves forward through [`JobStatus`]:
//! `queued -> running -> {succeeded | failed}`. Every mutator checks the
//! transition and refuses anything else with [`CoreError`].

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::error::CoreError;
use crate::types::{JobId, SourceId, Timestamp};

/// Lifecycle status of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// `Succeeded` and `Failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `self -> next` is one of the three legal forward steps.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named, immutable intermediate output of a chain stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub artifact: Artifact,
    pub completed_at: Timestamp,
}

/// A user-initiated generation request tracked to completion or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Conversation the request came from; notifications go back here.
    pub source_id: SourceId,
    /// The user's prompt, already validated and trimmed.
    pub input: String,
    status: JobStatus,
    stage_results: Vec<StageResult>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Human-readable cause; `Some` only when `status` is `Failed`.
    error: Option<String>,
}

impl Job {
    /// Create a new queued job with a fresh id.
    pub fn new(source_id: impl Into<SourceId>, input: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            source_id: source_id.into(),
            input: input.into(),
            status: JobStatus::Queued,
            stage_results: Vec::new(),
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Stage outputs in the order they were recorded.
    pub fn stage_results(&self) -> &[StageResult] {
        &self.stage_results
    }

    pub fn stage_result(&self, stage: &str) -> Option<&StageResult> {
        self.stage_results.iter().find(|r| r.stage == stage)
    }

    /// The output of the last completed stage.
    pub fn final_artifact(&self) -> Option<&Artifact> {
        self.stage_results.last().map(|r| &r.artifact)
    }

    /// `queued -> running`.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Running)
    }

    /// `running -> succeeded`.
    pub fn succeed(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Succeeded)
    }

    /// `running -> failed`, recording the cause.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Fail a job that was interrupted before it could finish.
    ///
    /// A job that never left `queued` is walked through `running` first so
    /// that the recorded history still has no skipped states.
    pub fn interrupt(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        if self.status == JobStatus::Queued {
            self.start()?;
        }
        self.fail(reason)
    }

    /// Append the output of a completed stage.
    ///
    /// Only allowed while running; stage names must be unique because later
    /// stages look earlier outputs up by name.
    pub fn append_stage_result(
        &mut self,
        stage: impl Into<String>,
        artifact: Artifact,
    ) -> Result<&StageResult, CoreError> {
        if self.status != JobStatus::Running {
            return Err(CoreError::NotRunning(self.status));
        }
        let stage = stage.into();
        if self.stage_result(&stage).is_some() {
            return Err(CoreError::DuplicateStage(stage));
        }
        let now = Utc::now();
        self.stage_results.push(StageResult {
            stage,
            artifact,
            completed_at: now,
        });
        self.updated_at = now;
        Ok(&self.stage_results[self.stage_results.len() - 1])
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
