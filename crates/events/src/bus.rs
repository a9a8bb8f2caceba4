//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] carries every [`JobEvent`] the orchestrator emits. It is
//! shared via `Arc<EventBus>`; callers that want the outcome of a job they
//! submitted subscribe and wait with [`wait_for_outcome`].

use genrelay_core::{Artifact, JobId, SourceId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A lifecycle step of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Queued {
        job_id: JobId,
        source_id: SourceId,
        /// 1-based position in the queue at enqueue time.
        position: usize,
    },
    Started {
        job_id: JobId,
        source_id: SourceId,
    },
    StageCompleted {
        job_id: JobId,
        stage: String,
        artifact: Artifact,
    },
    Succeeded {
        job_id: JobId,
        source_id: SourceId,
        artifact: Artifact,
        finished_at: Timestamp,
    },
    Failed {
        job_id: JobId,
        source_id: SourceId,
        error: String,
        finished_at: Timestamp,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Queued { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::StageCompleted { job_id, .. }
            | Self::Succeeded { job_id, .. }
            | Self::Failed { job_id, .. } => *job_id,
        }
    }

    /// Dot-separated event name, e.g. `"job.stage_completed"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "job.queued",
            Self::Started { .. } => "job.started",
            Self::StageCompleted { .. } => "job.stage_completed",
            Self::Succeeded { .. } => "job.succeeded",
            Self::Failed { .. } => "job.failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// ```rust
/// use genrelay_events::bus::EventBus;
///
/// let bus = EventBus::default();
/// let _rx = bus.subscribe();
/// ```
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unread events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Dropped silently when nobody is subscribed.
    pub fn publish(&self, event: JobEvent) {
        tracing::trace!(event = event.name(), job_id = %event.job_id(), "Publishing job event");
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Wait for the `Succeeded` or `Failed` event of `job_id`.
///
/// Returns `None` if the bus is dropped first. Lagging is tolerated: the
/// receiver skips ahead and keeps waiting.
pub async fn wait_for_outcome(
    rx: &mut broadcast::Receiver<JobEvent>,
    job_id: JobId,
) -> Option<JobEvent> {
    loop {
        match rx.recv().await {
            Ok(event) if event.job_id() == job_id && event.is_terminal() => return Some(event),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, %job_id, "Event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
