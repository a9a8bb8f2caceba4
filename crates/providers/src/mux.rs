//! Local audio/video muxing behind the provider contract.
//!
//! [`FfmpegMuxClient`] runs a single `ffmpeg` invocation that copies the
//! video stream of the `"video"` input and encodes the `"audio"` input as
//! AAC into one mp4. It finishes before `submit` returns, so its handle is
//! terminal on creation: a zero exit code yields a `succeeded` handle with
//! an [`Artifact::File`], a non-zero exit a `failed` one carrying stderr.
//!
//! Inline inputs spilled to the work directory are removed once ffmpeg
//! exits. The muxed output stays until whoever delivers it removes it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use genrelay_core::{messages::truncate_chars, Artifact, JobError, MediaKind};

use crate::client::{ProviderInput, RemoteJobClient, RemoteJobHandle};

/// Trailing stderr kept in a failed handle.
const MAX_STDERR_CHARS: usize = 500;

pub struct FfmpegMuxClient {
    ffmpeg_bin: PathBuf,
    work_dir: PathBuf,
}

impl FfmpegMuxClient {
    /// * `ffmpeg_bin` - path or name of the ffmpeg executable.
    /// * `work_dir`   - directory for spilled inputs and muxed outputs.
    pub fn new(ffmpeg_bin: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Resolve an artifact to something ffmpeg can open with `-i`.
    ///
    /// URLs and files pass through; inline bytes are written to the work
    /// directory first and their path pushed onto `spilled`.
    async fn materialize(
        &self,
        job_id: &str,
        role: &str,
        artifact: &Artifact,
        spilled: &mut Vec<PathBuf>,
    ) -> Result<String, JobError> {
        match artifact {
            Artifact::Url { url, .. } => Ok(url.clone()),
            Artifact::File { path, .. } => Ok(path.to_string_lossy().into_owned()),
            Artifact::Bytes { data, kind, .. } => {
                let path = self
                    .work_dir
                    .join(format!("{job_id}-{role}.{}", kind.default_extension()));
                spilled.push(path.clone());
                tokio::fs::write(&path, data).await.map_err(|e| {
                    JobError::ProviderUnavailable(format!("cannot write {}: {e}", path.display()))
                })?;
                Ok(path.to_string_lossy().into_owned())
            }
            Artifact::Text { .. } => Err(JobError::InvalidInput(format!(
                "the {role} input for muxing is text, not media"
            ))),
        }
    }
}

/// Arguments for one mux run, in order.
fn mux_args(video: &str, audio: &str, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        video.to_string(),
        "-i".to_string(),
        audio.to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-shortest".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

#[async_trait]
impl RemoteJobClient for FfmpegMuxClient {
    fn name(&self) -> &str {
        "ffmpeg-mux"
    }

    async fn submit(&self, input: &ProviderInput) -> Result<RemoteJobHandle, JobError> {
        let video = input
            .media("video")
            .ok_or_else(|| JobError::InvalidInput("muxing needs a video input".to_string()))?;
        let audio = input
            .media("audio")
            .ok_or_else(|| JobError::InvalidInput("muxing needs an audio input".to_string()))?;

        tokio::fs::create_dir_all(&self.work_dir).await.map_err(|e| {
            JobError::ProviderUnavailable(format!(
                "cannot create work dir {}: {e}",
                self.work_dir.display()
            ))
        })?;

        let job_id = format!("mux-{}", uuid::Uuid::new_v4());
        let mut spilled = Vec::new();
        let result = self.mux(&job_id, video, audio, &mut spilled).await;
        for path in &spilled {
            remove_quietly(path).await;
        }
        result
    }
}

impl FfmpegMuxClient {
    async fn mux(
        &self,
        job_id: &str,
        video: &Artifact,
        audio: &Artifact,
        spilled: &mut Vec<PathBuf>,
    ) -> Result<RemoteJobHandle, JobError> {
        let video = self.materialize(job_id, "video", video, spilled).await?;
        let audio = self.materialize(job_id, "audio", audio, spilled).await?;
        let output_path = self.work_dir.join(format!("{job_id}.mp4"));

        let output = tokio::process::Command::new(&self.ffmpeg_bin)
            .args(mux_args(&video, &audio, &output_path))
            .output()
            .await
            .map_err(|e| {
                JobError::ProviderUnavailable(format!(
                    "cannot run {}: {e}",
                    self.ffmpeg_bin.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = {
                let reversed: String = stderr.trim().chars().rev().collect();
                truncate_chars(&reversed, MAX_STDERR_CHARS).chars().rev().collect()
            };
            tracing::error!(
                exit_code = ?output.status.code(),
                stderr = %stderr.trim(),
                "ffmpeg mux failed",
            );
            remove_quietly(&output_path).await;
            return Ok(RemoteJobHandle::failed(
                job_id,
                format!(
                    "ffmpeg exited with {:?}: {tail}",
                    output.status.code()
                ),
            ));
        }

        tracing::info!(output = %output_path.display(), "Muxed audio into video");
        Ok(RemoteJobHandle::succeeded(
            job_id,
            Artifact::File {
                path: output_path,
                kind: MediaKind::Video,
            },
        ))
    }
}

/// Remove a work file; a file that was never written is not an error.
async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cannot remove mux work file"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
