//! Generation provider clients.
//!
//! Every provider integration implements [`RemoteJobClient`]: submit a job,
//! poll it, and hand back a normalized [`Artifact`](genrelay_core::Artifact).
//! [`poll::wait_until_terminal`] drives any client to a terminal status
//! under a mandatory wait bound, and [`extract`] holds the one response
//! normalization rule per provider.

pub mod client;
pub mod elevenlabs;
pub mod extract;
mod http;
pub mod mux;
pub mod openai;
pub mod poll;
pub mod replicate;

pub use client::{ProviderInput, RemoteJobClient, RemoteJobHandle, RemoteStatus};
pub use elevenlabs::{ElevenLabsConfig, ElevenLabsSpeechClient};
pub use mux::FfmpegMuxClient;
pub use openai::{OpenAiChatClient, OpenAiConfig, OpenAiVideoClient, OpenAiVideoOptions};
pub use poll::{run_to_completion, wait_until_terminal, PollConfig};
pub use replicate::{ReplicateClient, ReplicateConfig, ReplicateOutput};
