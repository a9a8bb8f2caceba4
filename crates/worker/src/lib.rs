//! The genrelay worker: configuration, inbound adapters and process wiring.

pub mod app;
pub mod config;
pub mod console;
pub mod inbound;
pub mod telegram;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, VideoProvider, WorkerConfig};
