//! Job chains and the orchestrator that drives them.
//!
//! A [`JobChain`] runs named stages strictly in order, each one a
//! [`RemoteJobClient`](genrelay_providers::RemoteJobClient) call under a
//! polling bound. The [`Orchestrator`] owns the job lifecycle: it accepts
//! requests, feeds them through the [`JobQueue`](genrelay_queue::JobQueue),
//! runs the chain and reports progress.

pub mod chain;
pub mod error;
pub mod orchestrator;
pub mod presets;

pub use chain::{stage_artifact, stage_text, ChainListener, JobChain, Stage};
pub use error::PipelineError;
pub use orchestrator::Orchestrator;
pub use presets::{narrated_video_chain, video_chain, NarratedVideoClients, Preset};
