//! Progress estimation for the job currently being transcoded.
//!
//! ffmpeg gives no usable progress for the filter chain we run, so completion is
//! estimated from how long the previous successful job took.

use std::time::Duration;

/// Estimated completion of the current job after `ticks` progress ticks.
///
/// The result is not clamped: a job that runs longer than the estimate
/// produces values above `1.0`. An estimate shorter than one tick counts as
/// one tick.
pub fn estimate_fraction(ticks: u64, estimated_job: Duration, tick_interval: Duration) -> f64 {
    let expected_ticks = estimated_job.as_secs_f64() / tick_interval.as_secs_f64();
    ticks as f64 / expected_ticks.max(1.0)
}

/// Status line shown next to the progress bar
pub fn status_line(position: usize, total: usize, label: &str) -> String {
    format!("Processing: {} of {} ({})", position, total, label)
}
