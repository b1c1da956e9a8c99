//! Segment Extractor - A Rust CLI tool for downloading and cleaning timed audio segments
//!
//! This library downloads a day's worth of 30-minute audio segments and runs each one
//! through ffmpeg (noise reduction, silence trimming, normalization) on a sequential
//! transcoding queue that keeps working while downloads are still in flight.

pub mod cleanup;
pub mod cli;
pub mod config;
pub mod display;
pub mod download;
pub mod extract;
pub mod progress;
pub mod queue;
pub mod schedule;
pub mod transcode;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use display::{LogSink, ProgressDisplay, TerminalConsole};
pub use download::{Downloader, HttpDownloader};
pub use extract::{ExtractRequest, ExtractSummary, ExtractionPipeline};
pub use queue::{QueueSettings, TranscodingQueue};
pub use transcode::{FfmpegTranscoder, Job, TranscodeError, Transcoder};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the extractor
#[derive(thiserror::Error, Debug)]
pub enum ExtractorError {
    #[error("Invalid date: {0} (expected YYMMDD)")]
    InvalidDate(String),

    #[error("Invalid start time: {0} (minute must be 00 or 30)")]
    InvalidStartTime(String),

    #[error("Invalid hour count: {0} (enter a number between 1 and 24)")]
    InvalidHours(String),

    #[error("Request failed with status code {status} ({url})")]
    DownloadFailed { status: u16, url: String },

    #[error("Base URL is not configured (use --base-url, BASE_URL or source.base_url)")]
    MissingBaseUrl,
}
