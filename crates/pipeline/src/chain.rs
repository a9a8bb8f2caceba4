//! Sequential, fail-fast composition of provider calls.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use genrelay_core::{Artifact, Job, JobError, StageResult};
use genrelay_providers::{run_to_completion, PollConfig, ProviderInput, RemoteJobClient};

use crate::error::PipelineError;

/// Builds a stage's provider input from the job prompt and the results of
/// the stages before it.
pub type InputBuilder =
    Box<dyn Fn(&str, &[StageResult]) -> Result<ProviderInput, JobError> + Send + Sync>;

/// One named step of a chain.
pub struct Stage {
    name: String,
    client: Arc<dyn RemoteJobClient>,
    poll: PollConfig,
    build_input: InputBuilder,
}

impl Stage {
    pub fn new<F>(name: impl Into<String>, client: Arc<dyn RemoteJobClient>, build_input: F) -> Self
    where
        F: Fn(&str, &[StageResult]) -> Result<ProviderInput, JobError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            client,
            poll: PollConfig::default(),
            build_input: Box::new(build_input),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("client", &self.client.name())
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

/// Observes stage completions while a chain runs.
#[async_trait]
pub trait ChainListener: Send + Sync {
    async fn stage_completed(&self, job: &Job, result: &StageResult);
}

/// An ordered list of uniquely named stages.
pub struct JobChain {
    name: String,
    stages: Vec<Stage>,
}

impl JobChain {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Result<Self, PipelineError> {
        let name = name.into();
        if stages.is_empty() {
            return Err(PipelineError::EmptyChain(name));
        }
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(PipelineError::DuplicateStage {
                    chain: name,
                    stage: stage.name.clone(),
                });
            }
        }
        Ok(Self { name, stages })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Run every stage against `job`, which must be running.
    ///
    /// Each stage's output is appended to the job before the next stage
    /// builds its input. The first failing stage ends the chain with
    /// [`JobError::ChainStageFailure`]; later stages are never invoked.
    /// Returns the last stage's artifact.
    pub async fn execute(
        &self,
        job: &mut Job,
        listener: &dyn ChainListener,
    ) -> Result<Artifact, JobError> {
        for stage in &self.stages {
            let input = (stage.build_input)(&job.input, job.stage_results())
                .map_err(|e| e.in_stage(&stage.name))?;

            tracing::info!(
                job_id = %job.id,
                chain = %self.name,
                stage = %stage.name,
                provider = stage.client.name(),
                "Stage started",
            );

            let artifact = run_to_completion(stage.client.as_ref(), &input, &stage.poll)
                .await
                .map_err(|e| {
                    tracing::warn!(job_id = %job.id, stage = %stage.name, error = %e, "Stage failed");
                    e.in_stage(&stage.name)
                })?;

            let result = job
                .append_stage_result(stage.name.clone(), artifact)
                .map_err(|e| JobError::InvalidInput(e.to_string()).in_stage(&stage.name))?
                .clone();

            tracing::info!(
                job_id = %job.id,
                stage = %stage.name,
                artifact = %result.artifact.summary(80),
                "Stage completed",
            );
            listener.stage_completed(job, &result).await;
        }

        job.final_artifact()
            .cloned()
            .ok_or_else(|| JobError::InvalidInput(format!("chain '{}' produced no output", self.name)))
    }
}

impl fmt::Debug for JobChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobChain")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .finish()
    }
}

/// The artifact recorded by an earlier stage.
pub fn stage_artifact<'a>(results: &'a [StageResult], stage: &str) -> Result<&'a Artifact, JobError> {
    results
        .iter()
        .find(|r| r.stage == stage)
        .map(|r| &r.artifact)
        .ok_or_else(|| JobError::InvalidInput(format!("no output from stage '{stage}'")))
}

/// The text recorded by an earlier stage.
pub fn stage_text<'a>(results: &'a [StageResult], stage: &str) -> Result<&'a str, JobError> {
    stage_artifact(results, stage)?
        .as_text()
        .ok_or_else(|| JobError::InvalidInput(format!("stage '{stage}' did not produce text")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use genrelay_core::MediaKind;
    use genrelay_providers::RemoteJobHandle;

    use super::*;

    /// Answers every submit with a fixed outcome and counts calls.
    struct FixedClient {
        outcome: Result<RemoteJobHandle, JobError>,
        calls: AtomicU32,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedClient {
        fn ok(artifact: Artifact) -> Arc<Self> {
            Self::with(Ok(RemoteJobHandle::succeeded("fixed", artifact)))
        }

        fn with(outcome: Result<RemoteJobHandle, JobError>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicU32::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RemoteJobClient for FixedClient {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn submit(&self, input: &ProviderInput) -> Result<RemoteJobHandle, JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().expect("lock").push(input.prompt.clone());
            self.outcome.clone()
        }

        async fn poll(&self, handle: RemoteJobHandle) -> Result<RemoteJobHandle, JobError> {
            Ok(handle)
        }
    }

    struct Silent;

    #[async_trait]
    impl ChainListener for Silent {
        async fn stage_completed(&self, _: &Job, _: &StageResult) {}
    }

    fn prompt_only(prompt: &str, _: &[StageResult]) -> Result<ProviderInput, JobError> {
        Ok(ProviderInput::new(prompt))
    }

    fn running_job() -> Job {
        let mut job = Job::new("chat", "a red fox");
        job.start().expect("start");
        job
    }

    // -- construction ------------------------------------------------------

    #[test]
    fn duplicate_stage_names_are_rejected() {
        let client = FixedClient::ok(Artifact::text("x"));
        let result = JobChain::new(
            "dup",
            vec![
                Stage::new("a", client.clone(), prompt_only),
                Stage::new("a", client, prompt_only),
            ],
        );
        assert_matches!(result, Err(PipelineError::DuplicateStage { stage, .. }) if stage == "a");
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert_matches!(JobChain::new("none", Vec::new()), Err(PipelineError::EmptyChain(_)));
    }

    #[test]
    fn debug_output_names_stages_and_clients() {
        let chain = JobChain::new(
            "pair",
            vec![Stage::new("script", FixedClient::ok(Artifact::text("x")), prompt_only)],
        )
        .expect("chain");
        let rendered = format!("{chain:?}");
        assert!(rendered.starts_with("JobChain { name: \"pair\""));
        assert!(rendered.contains("name: \"script\", client: \"fixed\""));
    }

    // -- execution ---------------------------------------------------------

    #[tokio::test]
    async fn later_stage_reads_earlier_output_by_name() {
        let script = FixedClient::ok(Artifact::text("Once upon a time"));
        let speech = FixedClient::ok(Artifact::url("https://x/a.mp3", MediaKind::Audio));
        let chain = JobChain::new(
            "two",
            vec![
                Stage::new("script", script.clone(), prompt_only),
                Stage::new("speech", speech.clone(), |_, results: &[StageResult]| {
                    Ok(ProviderInput::new(stage_text(results, "script")?))
                }),
            ],
        )
        .expect("chain");

        let mut job = running_job();
        let artifact = chain.execute(&mut job, &Silent).await.expect("execute");

        assert_eq!(artifact, Artifact::url("https://x/a.mp3", MediaKind::Audio));
        assert_eq!(*speech.prompts.lock().expect("lock"), ["Once upon a time"]);
        let names: Vec<_> = job.stage_results().iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(names, ["script", "speech"]);
    }

    #[tokio::test]
    async fn failing_stage_stops_the_chain() {
        let a = FixedClient::with(Err(JobError::ProviderUnavailable("503".to_string())));
        let b = FixedClient::ok(Artifact::text("never"));
        let chain = JobChain::new(
            "ab",
            vec![
                Stage::new("a", a.clone(), prompt_only),
                Stage::new("b", b.clone(), prompt_only),
            ],
        )
        .expect("chain");

        let mut job = running_job();
        let err = chain.execute(&mut job, &Silent).await.expect_err("fails");

        assert_eq!(err.failed_stage(), Some("a"));
        assert_matches!(err.root_cause(), JobError::ProviderUnavailable(_));
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
        assert!(job.stage_results().is_empty());
    }

    #[tokio::test]
    async fn provider_reported_failure_is_wrapped() {
        let a = FixedClient::with(Ok(RemoteJobHandle::failed("p", "NSFW")));
        let chain = JobChain::new("a", vec![Stage::new("video", a, prompt_only)]).expect("chain");
        let err = chain
            .execute(&mut running_job(), &Silent)
            .await
            .expect_err("fails");
        assert_eq!(err.to_string(), "Stage 'video' failed: Provider reported failure: NSFW");
    }

    #[tokio::test]
    async fn stage_timeout_is_wrapped() {
        let stuck = FixedClient::with(Ok(RemoteJobHandle::pending("p")));
        let chain = JobChain::new(
            "slow",
            vec![Stage::new("video", stuck, prompt_only).with_poll_config(PollConfig {
                interval: Duration::from_millis(10),
                max_wait: Duration::from_millis(25),
                max_polls: 3,
            })],
        )
        .expect("chain");

        let err = chain
            .execute(&mut running_job(), &Silent)
            .await
            .expect_err("times out");
        assert_matches!(err.root_cause(), JobError::Timeout { .. });
    }

    #[tokio::test]
    async fn input_builder_error_names_the_stage() {
        let client = FixedClient::ok(Artifact::text("x"));
        let chain = JobChain::new(
            "broken",
            vec![Stage::new("speech", client.clone(), |_, results: &[StageResult]| {
                Ok(ProviderInput::new(stage_text(results, "script")?))
            })],
        )
        .expect("chain");

        let err = chain
            .execute(&mut running_job(), &Silent)
            .await
            .expect_err("missing input");
        assert_eq!(err.failed_stage(), Some("speech"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stage_text_rejects_media() {
        let mut job = running_job();
        job.append_stage_result("video", Artifact::url("https://x/v.mp4", MediaKind::Video))
            .expect("append");
        assert_matches!(
            stage_text(job.stage_results(), "video"),
            Err(JobError::InvalidInput(_))
        );
        assert!(stage_artifact(job.stage_results(), "video").is_ok());
    }
}
