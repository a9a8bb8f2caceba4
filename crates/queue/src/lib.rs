//! Single-worker FIFO job queue with an at-rest JSON snapshot.
//!
//! [`JobQueue`] holds the pending jobs and the one job in flight, rewrites
//! its [`SnapshotStore`] after every mutation, and drives a [`JobRunner`]
//! through [`JobQueue::process_loop`] one job at a time.

pub mod error;
pub mod queue;
pub mod store;

pub use error::QueueError;
pub use queue::{JobQueue, JobRunner, DEFAULT_JOB_GAP};
pub use store::{QueueSnapshot, SnapshotStore};
