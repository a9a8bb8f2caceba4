//! Ready-made chains.
//!
//! - `video`: `video-generation(prompt)`.
//! - `narrated-video`: `script-generation(prompt)` →
//!   `speech-synthesis(script)` → `video-generation(prompt, speech)`, with
//!   an optional `mux(video, speech)` stage when a mux client is supplied.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use genrelay_core::StageResult;
use genrelay_providers::{PollConfig, ProviderInput, RemoteJobClient};

use crate::chain::{stage_artifact, stage_text, JobChain, Stage};
use crate::error::PipelineError;

pub const STAGE_SCRIPT: &str = "script-generation";
pub const STAGE_SPEECH: &str = "speech-synthesis";
pub const STAGE_VIDEO: &str = "video-generation";
pub const STAGE_MUX: &str = "mux";

/// Which preset chain the worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Video,
    NarratedVideo,
}

impl Preset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::NarratedVideo => "narrated-video",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "video" => Ok(Self::Video),
            "narrated-video" => Ok(Self::NarratedVideo),
            other => Err(PipelineError::UnknownPreset(other.to_string())),
        }
    }
}

pub fn video_chain(
    video: Arc<dyn RemoteJobClient>,
    poll: PollConfig,
) -> Result<JobChain, PipelineError> {
    JobChain::new(
        Preset::Video.as_str(),
        vec![Stage::new(STAGE_VIDEO, video, |prompt: &str, _: &[StageResult]| {
            Ok(ProviderInput::new(prompt))
        })
        .with_poll_config(poll)],
    )
}

/// Clients for the `narrated-video` preset.
pub struct NarratedVideoClients {
    pub script: Arc<dyn RemoteJobClient>,
    pub speech: Arc<dyn RemoteJobClient>,
    /// Must accept an `"audio"` media input unless `mux` is set.
    pub video: Arc<dyn RemoteJobClient>,
    /// Adds a final stage that lays the speech track over the video.
    pub mux: Option<Arc<dyn RemoteJobClient>>,
}

/// Script, speech and video, with the speech track joined either by the
/// video provider itself or by a trailing mux stage.
pub fn narrated_video_chain(
    clients: NarratedVideoClients,
    poll: PollConfig,
) -> Result<JobChain, PipelineError> {
    let video_takes_audio = clients.mux.is_none();
    let mut stages = vec![
        Stage::new(STAGE_SCRIPT, clients.script, |prompt: &str, _: &[StageResult]| {
            Ok(ProviderInput::new(prompt))
        })
        .with_poll_config(poll.clone()),
        Stage::new(STAGE_SPEECH, clients.speech, |_: &str, results: &[StageResult]| {
            Ok(ProviderInput::new(stage_text(results, STAGE_SCRIPT)?))
        })
        .with_poll_config(poll.clone()),
        Stage::new(STAGE_VIDEO, clients.video, move |prompt: &str, results: &[StageResult]| {
            let input = ProviderInput::new(prompt);
            if !video_takes_audio {
                return Ok(input);
            }
            let speech = stage_artifact(results, STAGE_SPEECH)?;
            Ok(input.with_media("audio", speech.clone()))
        })
        .with_poll_config(poll.clone()),
    ];

    if let Some(mux) = clients.mux {
        stages.push(
            Stage::new(STAGE_MUX, mux, |_: &str, results: &[StageResult]| {
                let video = stage_artifact(results, STAGE_VIDEO)?;
                let speech = stage_artifact(results, STAGE_SPEECH)?;
                Ok(ProviderInput::default()
                    .with_media("video", video.clone())
                    .with_media("audio", speech.clone()))
            })
            .with_poll_config(poll),
        );
    }

    JobChain::new(Preset::NarratedVideo.as_str(), stages)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use genrelay_core::{Artifact, Job, JobError, MediaKind};
    use genrelay_providers::RemoteJobHandle;

    use super::*;
    use crate::chain::ChainListener;

    /// Returns `output` and keeps every input it was given.
    struct Recorder {
        output: Artifact,
        inputs: Mutex<Vec<ProviderInput>>,
    }

    impl Recorder {
        fn new(output: Artifact) -> Arc<Self> {
            Arc::new(Self {
                output,
                inputs: Mutex::new(Vec::new()),
            })
        }

        fn last_input(&self) -> ProviderInput {
            self.inputs
                .lock()
                .expect("lock")
                .last()
                .cloned()
                .expect("was called")
        }
    }

    #[async_trait]
    impl RemoteJobClient for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn submit(&self, input: &ProviderInput) -> Result<RemoteJobHandle, JobError> {
            self.inputs.lock().expect("lock").push(input.clone());
            Ok(RemoteJobHandle::succeeded("r", self.output.clone()))
        }
    }

    struct Silent;

    #[async_trait]
    impl ChainListener for Silent {
        async fn stage_completed(&self, _: &Job, _: &StageResult) {}
    }

    #[test]
    fn preset_names_parse() {
        assert_eq!("video".parse::<Preset>(), Ok(Preset::Video));
        assert_eq!(" narrated-video ".parse::<Preset>(), Ok(Preset::NarratedVideo));
        assert_matches!("pika".parse::<Preset>(), Err(PipelineError::UnknownPreset(name)) if name == "pika");
        assert_eq!(Preset::NarratedVideo.to_string(), "narrated-video");
    }

    #[test]
    fn video_preset_is_single_stage() {
        let chain = video_chain(Recorder::new(Artifact::text("x")), PollConfig::default())
            .expect("chain");
        assert_eq!(chain.stage_names(), [STAGE_VIDEO]);
    }

    #[tokio::test]
    async fn narrated_video_threads_outputs_through_stages() {
        let script = Recorder::new(Artifact::text("A fox runs."));
        let speech = Recorder::new(Artifact::url("https://x/s.mp3", MediaKind::Audio));
        let video = Recorder::new(Artifact::url("https://x/v.mp4", MediaKind::Video));
        let mux = Recorder::new(Artifact::File {
            path: "/tmp/final.mp4".into(),
            kind: MediaKind::Video,
        });

        let chain = narrated_video_chain(
            NarratedVideoClients {
                script: script.clone(),
                speech: speech.clone(),
                video: video.clone(),
                mux: Some(mux.clone()),
            },
            PollConfig::default(),
        )
        .expect("chain");
        assert_eq!(
            chain.stage_names(),
            [STAGE_SCRIPT, STAGE_SPEECH, STAGE_VIDEO, STAGE_MUX]
        );

        let mut job = Job::new("chat", "a fox in the snow");
        job.start().expect("start");
        let artifact = chain.execute(&mut job, &Silent).await.expect("execute");

        assert_eq!(script.last_input().prompt, "a fox in the snow");
        assert_eq!(speech.last_input().prompt, "A fox runs.");

        let video_input = video.last_input();
        assert_eq!(video_input.prompt, "a fox in the snow");
        assert!(video_input.media.is_empty());

        let mux_input = mux.last_input();
        assert_eq!(
            mux_input.media("video"),
            Some(&Artifact::url("https://x/v.mp4", MediaKind::Video))
        );
        assert!(mux_input.media("audio").is_some());
        assert_eq!(artifact.kind(), Some(MediaKind::Video));
    }

    #[tokio::test]
    async fn narrated_video_without_mux_hands_speech_to_video() {
        let speech_track = Artifact::url("https://x/s.mp3", MediaKind::Audio);
        let video = Recorder::new(Artifact::url("https://x/v.mp4", MediaKind::Video));
        let chain = narrated_video_chain(
            NarratedVideoClients {
                script: Recorder::new(Artifact::text("A fox runs.")),
                speech: Recorder::new(speech_track.clone()),
                video: video.clone(),
                mux: None,
            },
            PollConfig::default(),
        )
        .expect("chain");
        assert_eq!(chain.stage_names().last(), Some(&STAGE_VIDEO));

        let mut job = Job::new("chat", "a fox in the snow");
        job.start().expect("start");
        chain.execute(&mut job, &Silent).await.expect("execute");

        assert_eq!(video.last_input().media("audio"), Some(&speech_track));
    }
}
