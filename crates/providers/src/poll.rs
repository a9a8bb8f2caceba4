//! Bounded polling of remote jobs.
//!
//! A provider job that never reaches a terminal status must not hold the
//! worker forever, so [`wait_until_terminal`] stops after whichever comes
//! first: [`PollConfig::max_polls`] polls or [`PollConfig::max_wait`] of
//! wall-clock time.

use std::time::Duration;

use genrelay_core::{Artifact, JobError};
use tokio::time::Instant;

use crate::client::{ProviderInput, RemoteJobClient, RemoteJobHandle, RemoteStatus};

/// Polling cadence and bounds for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed delay between polls.
    pub interval: Duration,
    /// Upper bound on total time spent waiting, measured from the first wait.
    pub max_wait: Duration,
    /// Upper bound on the number of polls.
    pub max_polls: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(10 * 60),
            max_polls: 120,
        }
    }
}

/// Poll `handle` until the provider reports `succeeded` or `failed`.
///
/// Returns the terminal handle (a `failed` handle is *not* an error here;
/// see [`into_artifact`]). Fails with [`JobError::Timeout`] when either
/// bound is exceeded, and propagates poll errors unchanged.
pub async fn wait_until_terminal(
    client: &dyn RemoteJobClient,
    mut handle: RemoteJobHandle,
    config: &PollConfig,
) -> Result<RemoteJobHandle, JobError> {
    let started = Instant::now();
    let deadline = started + config.max_wait;

    loop {
        if handle.is_terminal() {
            return Ok(handle);
        }

        let polls = handle.poll_count;
        if polls >= config.max_polls {
            return Err(timeout(polls, started));
        }

        let wake = Instant::now() + config.interval;
        if wake > deadline {
            return Err(timeout(polls, started));
        }
        tokio::time::sleep_until(wake).await;

        let job_id = handle.provider_job_id.clone();
        handle = match tokio::time::timeout_at(deadline, client.poll(handle)).await {
            Ok(result) => result?,
            Err(_) => return Err(timeout(polls + 1, started)),
        };
        handle.poll_count = polls + 1;

        tracing::debug!(
            provider = client.name(),
            provider_job_id = %job_id,
            poll_count = handle.poll_count,
            status = ?handle.status,
            "Polled remote job",
        );
    }
}

/// Submit `input`, wait for a terminal status, and return the artifact.
pub async fn run_to_completion(
    client: &dyn RemoteJobClient,
    input: &ProviderInput,
    config: &PollConfig,
) -> Result<Artifact, JobError> {
    let handle = client.submit(input).await?;
    tracing::info!(
        provider = client.name(),
        provider_job_id = %handle.provider_job_id,
        status = ?handle.status,
        "Remote job submitted",
    );
    let handle = wait_until_terminal(client, handle, config).await?;
    into_artifact(client.name(), handle)
}

/// Turn a terminal handle into its artifact or the matching error.
pub fn into_artifact(provider: &str, handle: RemoteJobHandle) -> Result<Artifact, JobError> {
    match (handle.status, handle.result) {
        (RemoteStatus::Succeeded, Some(artifact)) => Ok(artifact),
        (RemoteStatus::Succeeded, None) => Err(JobError::UnrecognizedResponseShape {
            provider: provider.to_string(),
            raw: format!("job {} succeeded without output", handle.provider_job_id),
        }),
        (RemoteStatus::Failed, _) => Err(JobError::ProviderFailed(
            handle
                .error
                .unwrap_or_else(|| format!("{provider} job failed without details")),
        )),
        (RemoteStatus::Pending, _) => Err(JobError::ProviderUnavailable(format!(
            "{provider} job {} is still pending",
            handle.provider_job_id
        ))),
    }
}

fn timeout(polls: u32, started: Instant) -> JobError {
    JobError::Timeout {
        polls,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use genrelay_core::MediaKind;

    use super::*;

    /// Reports `pending` until `succeed_after` polls, then succeeds.
    struct ScriptedClient {
        succeed_after: Option<u32>,
        polls: AtomicU32,
    }

    impl ScriptedClient {
        fn never_finishes() -> Self {
            Self {
                succeed_after: None,
                polls: AtomicU32::new(0),
            }
        }

        fn finishes_after(polls: u32) -> Self {
            Self {
                succeed_after: Some(polls),
                polls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteJobClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn submit(&self, _input: &ProviderInput) -> Result<RemoteJobHandle, JobError> {
            Ok(RemoteJobHandle::pending("job-1"))
        }

        async fn poll(&self, handle: RemoteJobHandle) -> Result<RemoteJobHandle, JobError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.succeed_after {
                Some(limit) if n >= limit => Ok(RemoteJobHandle {
                    status: RemoteStatus::Succeeded,
                    result: Some(Artifact::url("https://cdn/x.mp4", MediaKind::Video)),
                    ..handle
                }),
                _ => Ok(handle),
            }
        }
    }

    fn fast(interval_ms: u64, max_wait_ms: u64, max_polls: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(interval_ms),
            max_wait: Duration::from_millis(max_wait_ms),
            max_polls,
        }
    }

    #[test]
    fn default_bounds() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.max_wait, Duration::from_secs(600));
        assert_eq!(config.max_polls, 120);
    }

    #[tokio::test]
    async fn wall_clock_bound_times_out() {
        let client = ScriptedClient::never_finishes();
        let result = wait_until_terminal(
            &client,
            RemoteJobHandle::pending("job-1"),
            &fast(10, 25, 3),
        )
        .await;
        assert_matches!(result, Err(JobError::Timeout { .. }));
        assert!(client.polls.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn poll_count_bound_times_out() {
        let client = ScriptedClient::never_finishes();
        let result = wait_until_terminal(
            &client,
            RemoteJobHandle::pending("job-1"),
            &fast(1, 10_000, 3),
        )
        .await;
        assert_matches!(result, Err(JobError::Timeout { polls: 3, .. }));
        assert_eq!(client.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_terminal_handle_with_poll_count() {
        let client = ScriptedClient::finishes_after(2);
        let handle = wait_until_terminal(
            &client,
            RemoteJobHandle::pending("job-1"),
            &fast(1, 10_000, 10),
        )
        .await
        .expect("terminal");
        assert_eq!(handle.status, RemoteStatus::Succeeded);
        assert_eq!(handle.poll_count, 2);
    }

    #[tokio::test]
    async fn terminal_handle_is_not_polled() {
        let client = ScriptedClient::never_finishes();
        let handle = RemoteJobHandle::succeeded("sync", Artifact::text("done"));
        let out = wait_until_terminal(&client, handle, &fast(1, 10, 1))
            .await
            .expect("terminal");
        assert_eq!(out.poll_count, 0);
        assert_eq!(client.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_to_completion_returns_artifact() {
        let client = ScriptedClient::finishes_after(1);
        let artifact = run_to_completion(&client, &ProviderInput::new("p"), &fast(1, 1_000, 5))
            .await
            .expect("artifact");
        assert_eq!(artifact.kind(), Some(MediaKind::Video));
    }

    #[test]
    fn failed_handle_maps_to_provider_failed() {
        let err = into_artifact("replicate", RemoteJobHandle::failed("p", "NSFW content"))
            .expect_err("failed");
        assert_eq!(err, JobError::ProviderFailed("NSFW content".to_string()));
    }

    #[test]
    fn succeeded_without_result_is_unrecognized() {
        let mut handle = RemoteJobHandle::pending("p");
        handle.status = RemoteStatus::Succeeded;
        assert_matches!(
            into_artifact("replicate", handle),
            Err(JobError::UnrecognizedResponseShape { provider, .. }) if provider == "replicate"
        );
    }
}
