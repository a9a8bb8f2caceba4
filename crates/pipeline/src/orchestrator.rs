//! Job lifecycle owner: accepts requests, runs chains, reports progress.
//!
//! Translates each lifecycle step into a user notification (best effort)
//! and a [`JobEvent`] on the bus. No automatic retry is performed on
//! failure; the user gets exactly one failure message per failed job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use genrelay_core::messages::{self, MSG_INTERRUPTED, MSG_STARTED, MSG_SUCCEEDED};
use genrelay_core::validation::validate_prompt;
use genrelay_core::{Artifact, Job, JobError, JobId, StageResult};
use genrelay_events::{notify_best_effort, EventBus, JobEvent, Notification, ProgressNotifier};
use genrelay_queue::{JobQueue, JobRunner};

use crate::chain::{ChainListener, JobChain};

pub struct Orchestrator {
    queue: Arc<JobQueue>,
    chain: JobChain,
    notifier: Arc<dyn ProgressNotifier>,
    events: Arc<EventBus>,
}

impl Orchestrator {
    pub fn new(
        queue: Arc<JobQueue>,
        chain: JobChain,
        notifier: Arc<dyn ProgressNotifier>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            queue,
            chain,
            notifier,
            events,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Accept a user request.
    ///
    /// Invalid prompts are rejected before anything is enqueued. Otherwise
    /// the job is queued, acknowledged with its queue position, and the
    /// processing loop is started if idle. Never calls a provider.
    pub async fn submit_request(
        self: &Arc<Self>,
        source_id: &str,
        text: &str,
    ) -> Result<JobId, JobError> {
        let prompt = validate_prompt(text)?;
        let job = Job::new(source_id, prompt);
        let job_id = job.id;

        let position = self.queue.enqueue(job).await;
        tracing::info!(%job_id, source_id, position, "Request queued");

        self.events.publish(JobEvent::Queued {
            job_id,
            source_id: source_id.to_string(),
            position,
        });
        self.notify(
            source_id,
            Notification::for_job(job_id, messages::queued(position)),
        )
        .await;

        self.start_processing();
        Ok(job_id)
    }

    /// Spawn the processing loop unless one is already running.
    pub fn start_processing(self: &Arc<Self>) {
        if self.queue.is_processing() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.queue.process_loop(this.as_ref()).await;
        });
    }

    /// Drive one job from `queued` to a terminal state.
    pub async fn run(&self, mut job: Job) -> Job {
        if let Err(e) = job.start() {
            tracing::error!(job_id = %job.id, error = %e, "Cannot start job");
            return job;
        }
        self.events.publish(JobEvent::Started {
            job_id: job.id,
            source_id: job.source_id.clone(),
        });
        self.notify(&job.source_id, Notification::for_job(job.id, MSG_STARTED))
            .await;

        match self.chain.execute(&mut job, self).await {
            Ok(artifact) => self.finish_succeeded(&mut job, artifact).await,
            Err(e) => self.finish_failed(&mut job, &e).await,
        }
        job
    }

    /// Tell the source of each job interrupted by a restart what happened.
    pub async fn report_interrupted(&self, jobs: &[Job]) {
        for job in jobs {
            let error = job.error().unwrap_or(MSG_INTERRUPTED);
            tracing::warn!(job_id = %job.id, source_id = %job.source_id, "Reporting interrupted job");
            self.notify(
                &job.source_id,
                Notification::for_job(job.id, messages::failed(error)),
            )
            .await;
            self.events.publish(JobEvent::Failed {
                job_id: job.id,
                source_id: job.source_id.clone(),
                error: error.to_string(),
                finished_at: Utc::now(),
            });
        }
    }

    async fn finish_succeeded(&self, job: &mut Job, artifact: Artifact) {
        if let Err(e) = job.succeed() {
            tracing::error!(job_id = %job.id, error = %e, "Cannot mark job succeeded");
            return;
        }
        tracing::info!(job_id = %job.id, stages = job.stage_results().len(), "Job succeeded");

        self.notify(
            &job.source_id,
            Notification::for_job(job.id, MSG_SUCCEEDED).with_artifact(artifact.clone()),
        )
        .await;
        discard_local_output(job, &artifact).await;
        self.events.publish(JobEvent::Succeeded {
            job_id: job.id,
            source_id: job.source_id.clone(),
            artifact,
            finished_at: job.updated_at,
        });
    }

    async fn finish_failed(&self, job: &mut Job, error: &JobError) {
        let message = error.to_string();
        if let Err(e) = job.fail(message.clone()) {
            tracing::error!(job_id = %job.id, error = %e, "Cannot mark job failed");
            return;
        }
        if let JobError::UnrecognizedResponseShape { provider, raw } = error.root_cause() {
            tracing::warn!(job_id = %job.id, provider = %provider, raw_payload = %raw, "Job failed on unrecognized response");
        }
        tracing::error!(
            job_id = %job.id,
            stage = error.failed_stage().unwrap_or("-"),
            error = %message,
            "Job failed",
        );

        self.notify(
            &job.source_id,
            Notification::for_job(job.id, messages::failed(&message)),
        )
        .await;
        self.events.publish(JobEvent::Failed {
            job_id: job.id,
            source_id: job.source_id.clone(),
            error: message,
            finished_at: job.updated_at,
        });
    }

    async fn notify(&self, source_id: &str, notification: Notification) {
        notify_best_effort(self.notifier.as_ref(), source_id, &notification).await;
    }
}

/// Local files exist only to be delivered; remove them once the final
/// notification has gone out.
async fn discard_local_output(job: &Job, artifact: &Artifact) {
    let Artifact::File { path, .. } = artifact else {
        return;
    };
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(job_id = %job.id, path = %path.display(), "Removed delivered output"),
        Err(e) => tracing::warn!(job_id = %job.id, path = %path.display(), error = %e, "Cannot remove delivered output"),
    }
}

#[async_trait]
impl ChainListener for Orchestrator {
    async fn stage_completed(&self, job: &Job, result: &StageResult) {
        self.notify(
            &job.source_id,
            Notification::for_job(
                job.id,
                messages::stage_completed(&result.stage, &result.artifact),
            ),
        )
        .await;
        self.events.publish(JobEvent::StageCompleted {
            job_id: job.id,
            stage: result.stage.clone(),
            artifact: result.artifact.clone(),
        });
    }
}

#[async_trait]
impl JobRunner for Orchestrator {
    async fn run_job(&self, job: Job) -> Job {
        self.run(job).await
    }
}
