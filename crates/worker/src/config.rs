//! Worker configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use genrelay_pipeline::{PipelineError, Preset};
use genrelay_providers::PollConfig;

/// Error type for configuration problems found at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable the selected setup depends on is not set.
    #[error("{var} must be set ({reason})")]
    Missing { var: &'static str, reason: &'static str },

    /// A variable is set but cannot be parsed.
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// The configured stages do not form a valid chain.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Which provider generates the video stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoProvider {
    OpenAi,
    Replicate,
}

impl FromStr for VideoProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "replicate" => Ok(Self::Replicate),
            _ => Err("expected 'openai' or 'replicate'".to_string()),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bot API token; absent only in dry-run mode.
    pub telegram_bot_token: Option<String>,
    pub telegram_api_base: String,
    /// Seconds each `getUpdates` call may wait for new messages.
    pub telegram_long_poll_secs: u64,
    /// Read prompts from stdin and log notifications instead of using Telegram.
    pub dry_run: bool,

    pub preset: Preset,
    pub video_provider: VideoProvider,

    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_chat_model: String,
    pub script_system_prompt: String,
    pub openai_video_model: String,
    pub video_style_preamble: String,
    pub video_size: String,
    pub video_duration_secs: u32,

    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model_id: String,

    pub replicate_api_token: Option<String>,
    /// `owner/name` or `owner/name:version`.
    pub replicate_video_model: Option<String>,
    /// Model input field that receives the speech track, if any.
    pub replicate_audio_field: Option<String>,
    pub replicate_output_suffix: String,

    pub queue_path: PathBuf,
    pub poll: PollConfig,
    pub job_gap: Duration,
    pub http_timeout: Duration,

    pub mux_enabled: bool,
    pub ffmpeg_bin: PathBuf,
    pub work_dir: PathBuf,
}

const DEFAULT_SCRIPT_PROMPT: &str = "Write a vivid narration of about 40 words for a short video \
about the user's idea. Reply with the narration text only.";

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                         |
    /// |--------------------------------|---------------------------------|
    /// | `TELEGRAM_BOT_TOKEN`           | required unless dry run         |
    /// | `TELEGRAM_API_BASE`            | `https://api.telegram.org`      |
    /// | `TELEGRAM_LONG_POLL_SECS`      | `30`                            |
    /// | `GENRELAY_DRY_RUN`             | `false`                         |
    /// | `GENRELAY_PRESET`              | `video`                         |
    /// | `GENRELAY_VIDEO_PROVIDER`      | `openai`                        |
    /// | `OPENAI_API_KEY`               | required for OpenAI stages      |
    /// | `OPENAI_BASE_URL`              | `https://api.openai.com`        |
    /// | `OPENAI_CHAT_MODEL`            | `gpt-4o-mini`                   |
    /// | `SCRIPT_SYSTEM_PROMPT`         | built-in narration prompt       |
    /// | `OPENAI_VIDEO_MODEL`           | `gpt-image-1`                   |
    /// | `VIDEO_STYLE_PREAMBLE`         | built-in style preamble         |
    /// | `VIDEO_SIZE`                   | `1024x576`                      |
    /// | `VIDEO_DURATION_SECS`          | `6`                             |
    /// | `ELEVENLABS_API_KEY`           | required for `narrated-video`   |
    /// | `ELEVENLABS_VOICE_ID`          | `21m00Tcm4TlvDq8ikWAM`          |
    /// | `ELEVENLABS_MODEL_ID`          | `eleven_multilingual_v2`        |
    /// | `REPLICATE_API_TOKEN`          | required for Replicate video    |
    /// | `REPLICATE_VIDEO_MODEL`        | required for Replicate video    |
    /// | `REPLICATE_AUDIO_FIELD`        | unset                           |
    /// | `REPLICATE_OUTPUT_SUFFIX`      | `.mp4`                          |
    /// | `QUEUE_PATH`                   | `data/queue.json`               |
    /// | `POLL_INTERVAL_SECS`           | `5`                             |
    /// | `POLL_MAX_WAIT_SECS`           | `600`                           |
    /// | `POLL_MAX_ATTEMPTS`            | `120`                           |
    /// | `JOB_GAP_MS`                   | `2000`                          |
    /// | `HTTP_TIMEOUT_SECS`            | `120`                           |
    /// | `MUX_ENABLED`                  | `false`                         |
    /// | `FFMPEG_BIN`                   | `ffmpeg`                        |
    /// | `WORK_DIR`                     | `data/work`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let defaults = genrelay_providers::OpenAiVideoOptions::default();

        let config = Self {
            telegram_bot_token: env.optional("TELEGRAM_BOT_TOKEN"),
            telegram_api_base: env.string("TELEGRAM_API_BASE", "https://api.telegram.org"),
            telegram_long_poll_secs: env.parse("TELEGRAM_LONG_POLL_SECS", 30)?,
            dry_run: env.flag("GENRELAY_DRY_RUN")?,

            preset: env.parse("GENRELAY_PRESET", Preset::Video)?,
            video_provider: env.parse("GENRELAY_VIDEO_PROVIDER", VideoProvider::OpenAi)?,

            openai_api_key: env.optional("OPENAI_API_KEY"),
            openai_base_url: env.string("OPENAI_BASE_URL", genrelay_providers::openai::DEFAULT_BASE_URL),
            openai_chat_model: env.string("OPENAI_CHAT_MODEL", "gpt-4o-mini"),
            script_system_prompt: env.string("SCRIPT_SYSTEM_PROMPT", DEFAULT_SCRIPT_PROMPT),
            openai_video_model: env.string("OPENAI_VIDEO_MODEL", &defaults.model),
            video_style_preamble: env.string("VIDEO_STYLE_PREAMBLE", &defaults.style_preamble),
            video_size: env.string("VIDEO_SIZE", &defaults.size),
            video_duration_secs: env.parse("VIDEO_DURATION_SECS", defaults.duration_secs)?,

            elevenlabs_api_key: env.optional("ELEVENLABS_API_KEY"),
            elevenlabs_voice_id: env.string("ELEVENLABS_VOICE_ID", "21m00Tcm4TlvDq8ikWAM"),
            elevenlabs_model_id: env.string("ELEVENLABS_MODEL_ID", "eleven_multilingual_v2"),

            replicate_api_token: env.optional("REPLICATE_API_TOKEN"),
            replicate_video_model: env.optional("REPLICATE_VIDEO_MODEL"),
            replicate_audio_field: env.optional("REPLICATE_AUDIO_FIELD"),
            replicate_output_suffix: env.string("REPLICATE_OUTPUT_SUFFIX", ".mp4"),

            queue_path: env.string("QUEUE_PATH", "data/queue.json").into(),
            poll: PollConfig {
                interval: Duration::from_secs(env.positive("POLL_INTERVAL_SECS", 5)?),
                max_wait: Duration::from_secs(env.positive("POLL_MAX_WAIT_SECS", 600)?),
                max_polls: env.positive("POLL_MAX_ATTEMPTS", 120)?,
            },
            job_gap: Duration::from_millis(env.parse("JOB_GAP_MS", 2000)?),
            http_timeout: Duration::from_secs(env.parse("HTTP_TIMEOUT_SECS", 120)?),

            mux_enabled: env.flag("MUX_ENABLED")?,
            ffmpeg_bin: env.string("FFMPEG_BIN", "ffmpeg").into(),
            work_dir: env.string("WORK_DIR", "data/work").into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every credential the selected setup needs is present.
    fn validate(&self) -> Result<(), ConfigError> {
        let missing = |var, reason| Err(ConfigError::Missing { var, reason });

        if !self.dry_run && self.telegram_bot_token.is_none() {
            return missing("TELEGRAM_BOT_TOKEN", "the bot needs a token unless GENRELAY_DRY_RUN is set");
        }
        let narrated = self.preset == Preset::NarratedVideo;
        if narrated && self.openai_api_key.is_none() {
            return missing("OPENAI_API_KEY", "narrated-video generates its script with OpenAI");
        }
        if narrated && self.elevenlabs_api_key.is_none() {
            return missing("ELEVENLABS_API_KEY", "narrated-video synthesizes speech with ElevenLabs");
        }
        // Without muxing, the speech track can only reach the video through a model input.
        let video_takes_audio =
            self.video_provider == VideoProvider::Replicate && self.replicate_audio_field.is_some();
        if narrated && !self.mux_enabled && !video_takes_audio {
            return missing(
                "MUX_ENABLED",
                "narrated-video needs ffmpeg muxing or a Replicate model with REPLICATE_AUDIO_FIELD",
            );
        }
        match self.video_provider {
            VideoProvider::OpenAi if self.openai_api_key.is_none() => {
                missing("OPENAI_API_KEY", "the video provider is openai")
            }
            VideoProvider::Replicate if self.replicate_api_token.is_none() => {
                missing("REPLICATE_API_TOKEN", "the video provider is replicate")
            }
            VideoProvider::Replicate if self.replicate_video_model.is_none() => {
                missing("REPLICATE_VIDEO_MODEL", "the video provider is replicate")
            }
            _ => Ok(()),
        }
    }
}

/// Typed access to a key lookup.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// The value of `var`, treating blank values as unset.
    fn optional(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.optional(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.parse_with(var, default, |s| s.parse::<T>().map_err(|e| e.to_string()))
    }

    /// Like [`Env::parse`], but rejects zero.
    fn positive<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialEq,
        T::Err: std::fmt::Display,
    {
        self.parse_with(var, default, |s| match s.parse::<T>() {
            Ok(v) if v == T::default() => Err("must be greater than zero".to_string()),
            Ok(v) => Ok(v),
            Err(e) => Err(e.to_string()),
        })
    }

    fn parse_with<T, E>(
        &self,
        var: &'static str,
        default: T,
        parse: impl Fn(&str) -> Result<T, E>,
    ) -> Result<T, ConfigError>
    where
        E: std::fmt::Display,
    {
        match self.optional(var) {
            None => Ok(default),
            Some(value) => parse(&value).map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn flag(&self, var: &'static str) -> Result<bool, ConfigError> {
        self.parse_with(var, false, |s| match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err("expected true or false"),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
