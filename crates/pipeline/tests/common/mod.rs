//! In-process fakes shared by the pipeline integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use genrelay_core::{Artifact, JobError};
use genrelay_events::{EventBus, Notification, NotifyError, ProgressNotifier};
use genrelay_pipeline::{JobChain, Orchestrator, Stage};
use genrelay_providers::{ProviderInput, RemoteJobClient, RemoteJobHandle};
use genrelay_queue::JobQueue;

/// Provider that answers every submit with the same outcome.
pub struct FakeClient {
    outcome: Result<Artifact, JobError>,
    pub calls: AtomicU32,
}

impl FakeClient {
    pub fn ok(artifact: Artifact) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(artifact),
            calls: AtomicU32::new(0),
        })
    }

    pub fn err(error: JobError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(error),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteJobClient for FakeClient {
    fn name(&self) -> &str {
        "fake"
    }

    async fn submit(&self, _input: &ProviderInput) -> Result<RemoteJobHandle, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome
            .clone()
            .map(|artifact| RemoteJobHandle::succeeded("fake-1", artifact))
    }
}

/// Notifier that records everything and can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    pub failing: bool,
    pub sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("lock")
            .iter()
            .map(|(_, n)| n.text.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<(String, Notification)> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ProgressNotifier for RecordingNotifier {
    async fn notify(&self, source_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("lock")
            .push((source_id.to_string(), notification.clone()));
        if self.failing {
            return Err(NotifyError::Rejected {
                status: 403,
                description: "bot was blocked by the user".to_string(),
            });
        }
        Ok(())
    }
}

pub fn prompt_stage(name: &str, client: Arc<dyn RemoteJobClient>) -> Stage {
    Stage::new(name, client, |prompt: &str, _: &[genrelay_core::StageResult]| {
        Ok(ProviderInput::new(prompt))
    })
}

pub fn orchestrator(chain: JobChain, notifier: Arc<RecordingNotifier>) -> Arc<Orchestrator> {
    let queue = Arc::new(JobQueue::in_memory().with_job_gap(Duration::from_millis(1)));
    Arc::new(Orchestrator::new(
        queue,
        chain,
        notifier,
        Arc::new(EventBus::default()),
    ))
}
