//! Domain types shared by every genrelay crate.
//!
//! Holds the [`Job`](job::Job) model and its lifecycle rules, the
//! [`Artifact`](artifact::Artifact) references that stages produce, prompt
//! validation, the [`JobError`](error::JobError) taxonomy, and the
//! user-facing message text. Nothing in here performs I/O.

pub mod artifact;
pub mod error;
pub mod job;
pub mod messages;
pub mod types;
pub mod validation;

pub use artifact::{Artifact, MediaKind};
pub use error::{CoreError, JobError};
pub use job::{Job, JobStatus, StageResult};
pub use types::{JobId, SourceId, Timestamp};
