//! Builds the provider chain and notifier from [`WorkerConfig`].

use std::sync::Arc;
use std::time::Duration;

use genrelay_core::MediaKind;
use genrelay_events::{EventBus, JobEvent, ProgressNotifier, TelegramConfig, TelegramNotifier, TracingNotifier};
use genrelay_pipeline::{narrated_video_chain, video_chain, JobChain, NarratedVideoClients, Orchestrator, Preset};
use genrelay_providers::{
    ElevenLabsConfig, ElevenLabsSpeechClient, FfmpegMuxClient, OpenAiChatClient, OpenAiConfig,
    OpenAiVideoClient, OpenAiVideoOptions, RemoteJobClient, ReplicateClient, ReplicateConfig,
    ReplicateOutput,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, VideoProvider, WorkerConfig};

/// How often [`wait_until_idle`] checks the queue.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// Assemble the stage chain for the configured preset.
pub fn build_chain(config: &WorkerConfig, http: &reqwest::Client) -> Result<JobChain, ConfigError> {
    let video = video_client(config, http)?;

    let chain = match config.preset {
        Preset::Video => video_chain(video, config.poll.clone())?,
        Preset::NarratedVideo => {
            let script = OpenAiChatClient::new(
                http.clone(),
                openai_config(config)?,
                &config.openai_chat_model,
                &config.script_system_prompt,
            );
            let mut speech = ElevenLabsConfig::new(
                require(&config.elevenlabs_api_key, "ELEVENLABS_API_KEY")?,
                &config.elevenlabs_voice_id,
            );
            speech.model_id = config.elevenlabs_model_id.clone();

            let mux = config.mux_enabled.then(|| {
                Arc::new(FfmpegMuxClient::new(config.ffmpeg_bin.clone(), config.work_dir.clone()))
                    as Arc<dyn RemoteJobClient>
            });

            narrated_video_chain(
                NarratedVideoClients {
                    script: Arc::new(script),
                    speech: Arc::new(ElevenLabsSpeechClient::new(http.clone(), speech)),
                    video,
                    mux,
                },
                config.poll.clone(),
            )?
        }
    };

    tracing::info!(
        preset = %config.preset,
        stages = ?chain.stage_names(),
        "Pipeline configured",
    );
    Ok(chain)
}

fn video_client(
    config: &WorkerConfig,
    http: &reqwest::Client,
) -> Result<Arc<dyn RemoteJobClient>, ConfigError> {
    let client: Arc<dyn RemoteJobClient> = match config.video_provider {
        VideoProvider::OpenAi => Arc::new(OpenAiVideoClient::new(
            http.clone(),
            openai_config(config)?,
            OpenAiVideoOptions {
                model: config.openai_video_model.clone(),
                style_preamble: config.video_style_preamble.clone(),
                size: config.video_size.clone(),
                duration_secs: config.video_duration_secs,
            },
        )),
        VideoProvider::Replicate => {
            let suffix = Some(config.replicate_output_suffix.clone()).filter(|s| !s.is_empty());
            let mut replicate = ReplicateConfig::new(
                require(&config.replicate_api_token, "REPLICATE_API_TOKEN")?,
                require(&config.replicate_video_model, "REPLICATE_VIDEO_MODEL")?,
                ReplicateOutput::Media {
                    suffix,
                    kind: MediaKind::Video,
                },
            );
            // The narrated chain hands the video stage its speech track only when nothing muxes later.
            let takes_audio = config.preset == Preset::NarratedVideo && !config.mux_enabled;
            if let (true, Some(field)) = (takes_audio, &config.replicate_audio_field) {
                replicate = replicate.with_media_field("audio", field);
            }
            Arc::new(ReplicateClient::new(http.clone(), replicate))
        }
    };
    Ok(client)
}

fn openai_config(config: &WorkerConfig) -> Result<OpenAiConfig, ConfigError> {
    let mut openai = OpenAiConfig::new(require(&config.openai_api_key, "OPENAI_API_KEY")?);
    openai.base_url = config.openai_base_url.clone();
    Ok(openai)
}

fn require(value: &Option<String>, var: &'static str) -> Result<String, ConfigError> {
    value.clone().ok_or(ConfigError::Missing {
        var,
        reason: "required by the selected pipeline",
    })
}

pub fn telegram_config(config: &WorkerConfig) -> Result<TelegramConfig, ConfigError> {
    let mut telegram = TelegramConfig::new(require(&config.telegram_bot_token, "TELEGRAM_BOT_TOKEN")?);
    telegram.api_base = config.telegram_api_base.clone();
    Ok(telegram)
}

/// Telegram delivery, or log lines in a dry run.
pub fn build_notifier(
    config: &WorkerConfig,
    http: &reqwest::Client,
) -> Result<Arc<dyn ProgressNotifier>, ConfigError> {
    if config.dry_run {
        return Ok(Arc::new(TracingNotifier));
    }
    Ok(Arc::new(TelegramNotifier::new(http.clone(), telegram_config(config)?)))
}

/// Log every lifecycle event until the bus closes or `cancel` fires.
pub fn spawn_event_logger(events: &EventBus, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &JobEvent) {
    match event {
        JobEvent::StageCompleted { job_id, stage, .. } => {
            tracing::debug!(event = event.name(), %job_id, stage = %stage, "Job event");
        }
        _ => tracing::debug!(event = event.name(), job_id = %event.job_id(), "Job event"),
    }
}

/// Wait until nothing is queued or running, or `cancel` fires.
pub async fn wait_until_idle(orchestrator: &Orchestrator, cancel: &CancellationToken) {
    let queue = orchestrator.queue();
    while queue.is_processing() || !queue.is_empty().await {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(IDLE_CHECK_INTERVAL) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
