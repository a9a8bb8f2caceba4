//! Job lifecycle events and user notifications.
//!
//! - [`EventBus`]: in-process publish/subscribe hub for [`JobEvent`]s,
//!   backed by `tokio::sync::broadcast`.
//! - [`ProgressNotifier`]: best-effort "tell the user what is happening"
//!   seam, independent of any chat transport.
//! - [`TelegramNotifier`] and [`TracingNotifier`]: the two notifier
//!   implementations.

pub mod bus;
pub mod notifier;
pub mod telegram;

pub use bus::{wait_for_outcome, EventBus, JobEvent};
pub use notifier::{notify_best_effort, Notification, NotifyError, ProgressNotifier, TracingNotifier};
pub use telegram::{TelegramConfig, TelegramNotifier};
