//! Fakes shared by the worker unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use genrelay_core::{Artifact, JobError, StageResult};
use genrelay_events::{EventBus, Notification, NotifyError, ProgressNotifier};
use genrelay_pipeline::{JobChain, Orchestrator, Stage};
use genrelay_providers::{ProviderInput, RemoteJobClient, RemoteJobHandle};
use genrelay_queue::JobQueue;

/// Provider that returns the prompt as a text artifact.
pub struct Echo;

#[async_trait]
impl RemoteJobClient for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn submit(&self, input: &ProviderInput) -> Result<RemoteJobHandle, JobError> {
        Ok(RemoteJobHandle::succeeded("echo-1", Artifact::text(input.prompt.clone())))
    }
}

#[derive(Default)]
pub struct Inbox(Mutex<Vec<(String, String)>>);

impl Inbox {
    pub fn texts(&self) -> Vec<String> {
        self.0.lock().expect("lock").iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn sources(&self) -> Vec<String> {
        self.0.lock().expect("lock").iter().map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl ProgressNotifier for Inbox {
    async fn notify(&self, source_id: &str, n: &Notification) -> Result<(), NotifyError> {
        self.0
            .lock()
            .expect("lock")
            .push((source_id.to_string(), n.text.clone()));
        Ok(())
    }
}

pub fn echo_orchestrator(notifier: Arc<dyn ProgressNotifier>) -> Arc<Orchestrator> {
    let chain = JobChain::new(
        "echo",
        vec![Stage::new("echo", Arc::new(Echo), |p: &str, _: &[StageResult]| {
            Ok(ProviderInput::new(p))
        })],
    )
    .expect("chain");
    Arc::new(Orchestrator::new(
        Arc::new(JobQueue::in_memory()),
        chain,
        notifier,
        Arc::new(EventBus::default()),
    ))
}
