//! The job queue and its single-worker processing loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use genrelay_core::{messages::MSG_INTERRUPTED, Job, JobId};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::store::{QueueSnapshot, SnapshotStore};

/// Default pause between two consecutive jobs.
pub const DEFAULT_JOB_GAP: Duration = Duration::from_secs(2);

/// Processes one dequeued job to a terminal state.
///
/// Implemented by the orchestrator; the queue only needs to know when the
/// job is done, not how it went.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, job: Job) -> Job;
}

struct QueueState {
    pending: VecDeque<Job>,
    in_flight: Option<Job>,
    /// `None` once persistence has failed (or was never configured).
    store: Option<SnapshotStore>,
    /// When the processing loop last finished a job.
    last_finished: Option<Instant>,
}

impl QueueState {
    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.iter().cloned().collect(),
            in_flight: self.in_flight.clone(),
        }
    }

    /// Rewrite the snapshot; on failure fall back to memory-only operation.
    async fn persist(&mut self) {
        let result = match &self.store {
            Some(store) => store.save(&self.snapshot()).await,
            None => return,
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "Queue snapshot write failed; continuing in memory only");
            self.store = None;
        }
    }
}

/// FIFO of jobs awaiting the single worker.
///
/// All mutations, including the snapshot write, happen under one async
/// mutex, so enqueue, dequeue and complete never interleave. Share it via
/// `Arc<JobQueue>`.
pub struct JobQueue {
    state: Mutex<QueueState>,
    processing: AtomicBool,
    job_gap: Duration,
}

impl JobQueue {
    /// A queue without persistence.
    pub fn in_memory() -> Self {
        Self::from_state(QueueState {
            pending: VecDeque::new(),
            in_flight: None,
            store: None,
            last_finished: None,
        })
    }

    /// Load the queue from `store`.
    ///
    /// Pending jobs come back in their original order. The job that was in
    /// flight at shutdown cannot be resumed: it is marked failed and
    /// returned so the caller can tell its source. An unreadable snapshot
    /// is logged and the queue starts empty in memory-only mode, leaving
    /// the file untouched for inspection.
    pub async fn open(store: SnapshotStore) -> (Self, Vec<Job>) {
        let snapshot = match store.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "Cannot load queue snapshot; starting in memory only");
                return (Self::in_memory(), Vec::new());
            }
        };

        let mut interrupted = Vec::new();
        if let Some(mut job) = snapshot.in_flight {
            match job.interrupt(MSG_INTERRUPTED) {
                Ok(()) => {
                    tracing::warn!(job_id = %job.id, source_id = %job.source_id, "Recovered interrupted job");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "In-flight job was already terminal");
                }
            }
            interrupted.push(job);
        }

        tracing::info!(
            path = %store.path().display(),
            pending = snapshot.pending.len(),
            interrupted = interrupted.len(),
            "Queue restored",
        );

        let mut state = QueueState {
            pending: snapshot.pending.into(),
            in_flight: None,
            store: Some(store),
            last_finished: None,
        };
        state.persist().await;
        (Self::from_state(state), interrupted)
    }

    fn from_state(state: QueueState) -> Self {
        Self {
            state: Mutex::new(state),
            processing: AtomicBool::new(false),
            job_gap: DEFAULT_JOB_GAP,
        }
    }

    pub fn with_job_gap(mut self, job_gap: Duration) -> Self {
        self.job_gap = job_gap;
        self
    }

    /// Append `job` and persist. Returns its 1-based position, counting the
    /// job currently in flight.
    pub async fn enqueue(&self, job: Job) -> usize {
        let mut state = self.state.lock().await;
        tracing::debug!(job_id = %job.id, "Job enqueued");
        state.pending.push_back(job);
        let position = state.pending.len() + usize::from(state.in_flight.is_some());
        state.persist().await;
        position
    }

    /// Pop the head, record it as in flight, and persist.
    pub async fn dequeue(&self) -> Option<Job> {
        let mut state = self.state.lock().await;
        let job = state.pending.pop_front()?;
        if let Some(previous) = &state.in_flight {
            tracing::warn!(job_id = %previous.id, "Previous in-flight job was never completed");
        }
        state.in_flight = Some(job.clone());
        state.persist().await;
        Some(job)
    }

    /// Clear the in-flight record for `job_id` and persist.
    pub async fn complete(&self, job_id: JobId) {
        let mut state = self.state.lock().await;
        if state.in_flight.as_ref().is_some_and(|job| job.id == job_id) {
            state.in_flight = None;
            state.persist().await;
        } else {
            tracing::warn!(%job_id, "Completed job was not in flight");
        }
    }

    /// Number of pending jobs (excluding the one in flight).
    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.pending.is_empty()
    }

    pub async fn in_flight(&self) -> Option<JobId> {
        self.state.lock().await.in_flight.as_ref().map(|job| job.id)
    }

    /// Whether snapshots are still being written.
    pub async fn is_persistent(&self) -> bool {
        self.state.lock().await.store.is_some()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Process jobs one at a time until the queue is empty.
    ///
    /// Calling this while a loop is already running is a no-op. No job
    /// starts sooner than the configured gap after the previous one
    /// finished, whatever its outcome and even if the loop was restarted in
    /// between. After releasing the processing flag it checks once more for
    /// jobs enqueued while it was winding down.
    pub async fn process_loop(&self, runner: &dyn JobRunner) {
        loop {
            let Some(guard) = ProcessingGuard::acquire(&self.processing) else {
                tracing::debug!("Processing loop already running");
                return;
            };

            while !self.is_empty().await {
                self.wait_out_gap().await;
                let Some(job) = self.dequeue().await else {
                    break;
                };
                let job_id = job.id;
                tracing::info!(%job_id, source_id = %job.source_id, "Processing job");
                let finished = runner.run_job(job).await;
                tracing::info!(%job_id, status = %finished.status(), "Job finished");
                self.complete(job_id).await;
                self.state.lock().await.last_finished = Some(Instant::now());
            }

            drop(guard);
            if self.is_empty().await {
                return;
            }
        }
    }
}

impl JobQueue {
    /// Sleep out whatever remains of the gap since the last finished job.
    async fn wait_out_gap(&self) {
        let last_finished = self.state.lock().await.last_finished;
        if let Some(last_finished) = last_finished {
            tokio::time::sleep_until(last_finished + self.job_gap).await;
        }
    }
}

/// Holds the processing flag; releases it on drop, including on panic.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
