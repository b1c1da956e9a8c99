use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::queue::QueueSettings;
use crate::transcode::FfmpegTranscoder;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where segments are downloaded from
    pub source: SourceConfig,

    /// Where results are written
    pub output: OutputConfig,

    /// ffmpeg settings
    pub transcoder: TranscoderConfig,

    /// Progress estimation settings
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Prefix that segment names such as `Jan-05-2021-0030Z.mp3` are appended to
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root output directory; one subdirectory per day
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// ffmpeg executable
    pub ffmpeg_path: String,

    /// RNNoise model used by the arnndn filter
    pub noise_profile: PathBuf,

    /// Kill ffmpeg after this many seconds (no limit when unset)
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Progress refresh interval in milliseconds
    pub tick_interval_ms: u64,

    /// Assumed duration of a job before the first one finishes
    pub initial_estimate_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            noise_profile: PathBuf::from("profiles/sh.rnnn"),
            timeout_secs: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            initial_estimate_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location (created if missing)
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        tracing::debug!("Wrote default config to {}", config_path.display());
        Ok(())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("segment-extractor").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.queue.tick_interval_ms == 0 {
            anyhow::bail!("queue.tick_interval_ms must be greater than zero");
        }

        if self.transcoder.timeout_secs == Some(0) {
            anyhow::bail!("transcoder.timeout_secs must be greater than zero");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!(
            "  Base URL: {}",
            self.source.base_url.as_deref().unwrap_or("(not set)")
        );
        println!("  Output Directory: {}", self.output.dir.display());
        println!("  ffmpeg: {}", self.transcoder.ffmpeg_path);
        println!("  Noise Profile: {}", self.transcoder.noise_profile.display());
        match self.transcoder.timeout_secs {
            Some(secs) => println!("  Timeout: {}s", secs),
            None => println!("  Timeout: none"),
        }
        println!("  Progress Tick: {}ms", self.queue.tick_interval_ms);
    }

    /// Print where the configuration lives
    pub fn print_location(explicit: Option<&Path>) -> Result<()> {
        println!("Edit the config file to change settings:");
        println!("  {}", Self::location(explicit)?.display());
        Ok(())
    }

    /// File that `load` reads for the given `--config` value
    pub fn location(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::config_path(),
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            tick_interval: Duration::from_millis(self.queue.tick_interval_ms),
            initial_estimate: Duration::from_secs(self.queue.initial_estimate_secs),
        }
    }

    pub fn transcoder(&self) -> FfmpegTranscoder {
        let transcoder = FfmpegTranscoder::new(
            self.transcoder.ffmpeg_path.clone(),
            self.transcoder.noise_profile.clone(),
        );

        match self.transcoder.timeout_secs {
            Some(secs) => transcoder.with_timeout(Duration::from_secs(secs)),
            None => transcoder,
        }
    }
}
