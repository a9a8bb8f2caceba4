//! Dry-run inbound adapter: one prompt per line of standard input.

use std::sync::Arc;

use genrelay_events::ProgressNotifier;
use genrelay_pipeline::Orchestrator;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::inbound::handle_text;

/// Source id used for every console request.
pub const CONSOLE_SOURCE: &str = "console";

/// Read prompts from stdin until EOF or cancellation.
pub async fn run(
    orchestrator: Arc<Orchestrator>,
    notifier: Arc<dyn ProgressNotifier>,
    cancel: CancellationToken,
) {
    tracing::info!("Reading prompts from stdin");
    read_prompts(
        BufReader::new(tokio::io::stdin()),
        &orchestrator,
        notifier.as_ref(),
        &cancel,
    )
    .await;
}

async fn read_prompts<R>(
    reader: R,
    orchestrator: &Arc<Orchestrator>,
    notifier: &dyn ProgressNotifier,
    cancel: &CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(text)) if text.trim().is_empty() => continue,
            Ok(Some(text)) => handle_text(orchestrator, notifier, CONSOLE_SOURCE, &text).await,
            Ok(None) => {
                tracing::info!("stdin closed");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
