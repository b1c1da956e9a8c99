use anyhow::Context;
use chrono::{NaiveDate, NaiveTime};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::display::LogSink;
use crate::download::Downloader;
use crate::queue::TranscodingQueue;
use crate::schedule::plan_segments;
use crate::transcode::Job;
use crate::Result;

/// Name of the per-day directory holding raw downloads
pub const DOWNLOAD_DIR_NAME: &str = "downloads";

/// Period of audio to download and clean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractRequest {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub hours: u32,
}

impl ExtractRequest {
    /// Directory for one day's output, e.g. `output/210105`
    pub fn extract_dir(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.date.format("%y%m%d").to_string())
    }
}

/// Outcome of one extraction run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractSummary {
    /// Segments in the requested period
    pub planned: usize,

    /// Segments downloaded and queued for processing
    pub downloaded: usize,

    /// Segments whose download failed
    pub failed_downloads: usize,

    /// Successfully processed segments, counted across the queue's lifetime
    pub transcoded: usize,
}

/// Downloads segments in order and feeds them to the transcoding queue
pub struct ExtractionPipeline<D> {
    downloader: D,
    queue: TranscodingQueue,
    log: Arc<dyn LogSink>,
    base_url: String,
    output_dir: PathBuf,
}

impl<D: Downloader> ExtractionPipeline<D> {
    pub fn new(
        downloader: D,
        queue: TranscodingQueue,
        log: Arc<dyn LogSink>,
        base_url: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            queue,
            log,
            base_url: base_url.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Download every segment of the request, queue each for processing,
    /// and wait for the queue to finish
    pub async fn run(&self, request: ExtractRequest) -> Result<ExtractSummary> {
        let segments = plan_segments(request.date, request.start_time, request.hours);
        let extract_dir = request.extract_dir(&self.output_dir);
        let download_dir = extract_dir.join(DOWNLOAD_DIR_NAME);

        fs_err::create_dir_all(&download_dir)
            .context("Failed to create download directory")?;

        let mut summary = ExtractSummary {
            planned: segments.len(),
            ..Default::default()
        };

        self.log.status("");
        self.log.status("⬇️  Starting to download...");

        for segment in &segments {
            let file_name = segment.file_name();
            let download_path = download_dir.join(&file_name);
            let extract_path = extract_dir.join(&file_name);
            let url = segment.url(&self.base_url);

            match self.downloader.download(&url, &download_path).await {
                Ok(()) => {
                    summary.downloaded += 1;
                    self.queue.enqueue(Job::new(download_path, extract_path));
                }
                Err(e) => {
                    summary.failed_downloads += 1;
                    self.log.error(&format!("{:#}", e));
                }
            }
        }

        self.queue.wait_idle().await;
        summary.transcoded = self.queue.completed_count();

        Ok(summary)
    }
}
