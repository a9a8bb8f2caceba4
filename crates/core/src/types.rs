/// Jobs are identified by random UUIDs; identifiers are never reused.
pub type JobId = uuid::Uuid;

/// Opaque identifier of the conversation a request came from (e.g. a
/// Telegram chat id rendered as a string).
pub type SourceId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
