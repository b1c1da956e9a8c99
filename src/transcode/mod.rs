use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::utils::path_suffix;

/// Maximum input duration passed to ffmpeg, in seconds
pub const MAX_INPUT_SECONDS: u32 = 1820;

/// Output sample rate in Hz
pub const SAMPLE_RATE: u32 = 22050;

/// Output audio bitrate
pub const BITRATE: &str = "16k";

/// Number of trailing destination characters shown in status lines
const LABEL_LENGTH: usize = 9;

/// One unit of work: a downloaded segment and where its cleaned copy goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    source: PathBuf,
    destination: PathBuf,
}

impl Job {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Short identifying suffix of the destination path
    pub fn label(&self) -> String {
        path_suffix(&self.destination, LABEL_LENGTH)
    }
}

/// Reasons a single transformation can fail
#[derive(thiserror::Error, Debug)]
pub enum TranscodeError {
    #[error("Could not process audio with ffmpeg (exit code {code})")]
    Exit { code: i32 },

    #[error("Could not process audio with ffmpeg (terminated by signal)")]
    Terminated,

    #[error("Failed to run {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg did not finish within {limit:?}")]
    TimedOut { limit: Duration },
}

/// Runs one external transformation over a job
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transform `job.source()` into `job.destination()`
    async fn transform(&self, job: &Job) -> Result<(), TranscodeError>;
}

/// Transcoder backed by the ffmpeg command line tool
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    noise_profile: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, noise_profile: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            noise_profile: noise_profile.into(),
            timeout: None,
        }
    }

    /// Kill ffmpeg if a single job runs longer than `limit`.
    ///
    /// Without a limit a hung ffmpeg blocks the queue indefinitely.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Audio filter chain: band-pass, boost, denoise, trim silence, normalize
    fn filter_chain(&self) -> String {
        [
            "highpass=f=230".to_string(),
            "lowpass=f=2500".to_string(),
            "volume=25dB".to_string(),
            format!("arnndn=m={}", self.noise_profile.to_string_lossy()),
            "silenceremove=start_periods=1:start_duration=0:start_threshold=-30dB:start_silence=2:stop_periods=-1:stop_threshold=-35dB:stop_duration=4:stop_silence=0:window=0".to_string(),
            "dynaudnorm=m=15".to_string(),
        ]
        .join(", ")
    }

    /// Full ffmpeg argument list for a job
    pub fn build_args(&self, job: &Job) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-to".to_string(),
            MAX_INPUT_SECONDS.to_string(),
            "-i".to_string(),
            job.source().to_string_lossy().to_string(),
            "-ar".to_string(),
            SAMPLE_RATE.to_string(),
            "-b:a".to_string(),
            BITRATE.to_string(),
            "-af".to_string(),
            self.filter_chain(),
            job.destination().to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transform(&self, job: &Job) -> Result<(), TranscodeError> {
        tracing::debug!(
            "Running {} on {} -> {}",
            self.ffmpeg_path,
            job.source().display(),
            job.destination().display()
        );

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(self.build_args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| TranscodeError::TimedOut { limit })?,
            None => command.output().await,
        }
        .map_err(|source| TranscodeError::Launch {
            program: self.ffmpeg_path.clone(),
            source,
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let last_lines: Vec<&str> = stderr.lines().rev().take(5).collect();
        tracing::debug!(
            "ffmpeg failed on {}: {}",
            job.source().display(),
            last_lines.into_iter().rev().collect::<Vec<_>>().join("\n")
        );

        match output.status.code() {
            Some(code) => Err(TranscodeError::Exit { code }),
            None => Err(TranscodeError::Terminated),
        }
    }
}
