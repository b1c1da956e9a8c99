//! Sequential transcoding queue.
//!
//! Jobs are enqueued while downloads are still running. The first enqueue on an
//! idle queue spawns a drain task that runs one transformation at a time until
//! nothing is pending, then reports a summary and goes idle again. A failed job
//! is logged and skipped; nothing propagates back to the enqueue caller.

use futures_util::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::display::{LogSink, ProgressDisplay};
use crate::progress::{estimate_fraction, status_line};
use crate::transcode::{Job, Transcoder};
use crate::utils::format_minutes_seconds;

/// Timing parameters for progress estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// How often the progress display is refreshed
    pub tick_interval: Duration,

    /// Assumed job duration until the first job succeeds
    pub initial_estimate: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            initial_estimate: Duration::from_secs(30),
        }
    }
}

struct QueueState {
    pending: VecDeque<Job>,
    draining: bool,
    /// Finished drain loops still reporting their summary
    finishing: usize,
    /// Successful jobs only
    completed: usize,
    estimated_job: Duration,
    /// Serial of the job whose ticker may still draw
    active_ticker: Option<u64>,
    next_serial: u64,
}

struct Shared {
    state: Mutex<QueueState>,
    transcoder: Arc<dyn Transcoder>,
    display: Arc<dyn ProgressDisplay>,
    log: Arc<dyn LogSink>,
    settings: QueueSettings,
    idle: Notify,
}

/// Handle to the queue; clones share the same state
#[derive(Clone)]
pub struct TranscodingQueue {
    shared: Arc<Shared>,
}

impl TranscodingQueue {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        display: Arc<dyn ProgressDisplay>,
        log: Arc<dyn LogSink>,
        settings: QueueSettings,
    ) -> Self {
        let state = QueueState {
            pending: VecDeque::new(),
            draining: false,
            finishing: 0,
            completed: 0,
            estimated_job: settings.initial_estimate,
            active_ticker: None,
            next_serial: 0,
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                transcoder,
                display,
                log,
                settings,
                idle: Notify::new(),
            }),
        }
    }

    /// Append a job and start draining if the queue is idle.
    ///
    /// Returns immediately. Must be called from within a Tokio runtime.
    pub fn enqueue(&self, job: Job) {
        tracing::debug!("Queued {}", job.source().display());

        let start_drain = {
            let mut state = self.shared.lock();
            state.pending.push_back(job);
            !std::mem::replace(&mut state.draining, true)
        };

        if start_drain {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(shared.drain());
        }
    }

    /// Wait until the queue has nothing pending and no drain loop is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let busy = {
                let state = self.shared.lock();
                state.draining || state.finishing > 0
            };
            if !busy {
                return;
            }
            notified.await;
        }
    }

    pub fn is_draining(&self) -> bool {
        self.shared.lock().draining
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Number of jobs that finished successfully
    pub fn completed_count(&self) -> usize {
        self.shared.lock().completed
    }

    /// Duration used to scale progress for the next job
    pub fn estimated_job_duration(&self) -> Duration {
        self.shared.lock().estimated_job
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drain(self: Arc<Self>) {
        self.log.status("Starting to process...");
        let started = Instant::now();

        while let Some(job) = self.next_job() {
            self.process(job).await;
        }

        self.display.hide();
        self.log.status(&format!(
            "Finished processing in {}",
            format_minutes_seconds(started.elapsed())
        ));

        self.lock().finishing -= 1;
        self.idle.notify_waiters();
    }

    /// Pop the next job, or end the drain loop when nothing is pending.
    ///
    /// The empty check and the reset of `draining` share one critical section,
    /// so a concurrent enqueue either lands here or starts a new loop. The
    /// loop stays counted in `finishing` until its summary is logged.
    fn next_job(&self) -> Option<Job> {
        let mut state = self.lock();
        if let Some(job) = state.pending.pop_front() {
            return Some(job);
        }

        state.draining = false;
        state.finishing += 1;
        None
    }

    async fn process(self: &Arc<Self>, job: Job) {
        let ticker = ProgressTicker::start(self, job.label());
        let started = Instant::now();

        let outcome = AssertUnwindSafe(self.transcoder.transform(&job))
            .catch_unwind()
            .await;
        drop(ticker);

        match outcome {
            Ok(Ok(())) => {
                let elapsed = started.elapsed();
                let mut state = self.lock();
                state.estimated_job = elapsed;
                state.completed += 1;
                tracing::debug!("Processed {} in {:?}", job.destination().display(), elapsed);
            }
            Ok(Err(e)) => {
                self.log.error(&format!("{} ({})", e, job.source().display()));
            }
            Err(panic) => {
                self.log.error(&format!(
                    "Transcoder panicked: {} ({})",
                    panic_message(panic.as_ref()),
                    job.source().display()
                ));
            }
        }
    }

    /// Show progress for ticker `serial` unless its job already finished
    fn show_progress(&self, serial: u64, label: &str, ticks: u64) {
        let state = self.lock();
        if state.active_ticker != Some(serial) {
            return;
        }

        let total = state.completed + state.pending.len() + 1;
        let fraction = estimate_fraction(ticks, state.estimated_job, self.settings.tick_interval);
        if ticks > 0 {
            self.display.pulse();
        }
        self.display
            .show(&status_line(state.completed + 1, total, label), fraction);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Periodic progress refresh for one job, stopped when dropped
struct ProgressTicker {
    shared: Arc<Shared>,
    serial: u64,
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    fn start(shared: &Arc<Shared>, label: String) -> Self {
        let serial = {
            let mut state = shared.lock();
            let serial = state.next_serial;
            state.next_serial += 1;
            state.active_ticker = Some(serial);
            serial
        };
        shared.show_progress(serial, &label, 0);

        let period = shared.settings.tick_interval;
        let task_shared = Arc::clone(shared);
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = 0;
            loop {
                interval.tick().await;
                ticks += 1;
                task_shared.show_progress(serial, &label, ticks);
            }
        });

        Self {
            shared: Arc::clone(shared),
            serial,
            handle,
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            if state.active_ticker == Some(self.serial) {
                state.active_ticker = None;
            }
        }
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::{MockTranscoder, TranscodeError};
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq)]
    enum DisplayEvent {
        Pulse,
        Show(String, f64),
        Hide,
    }

    #[derive(Default)]
    struct RecordingDisplay {
        events: Mutex<Vec<DisplayEvent>>,
    }

    impl RecordingDisplay {
        fn events(&self) -> Vec<DisplayEvent> {
            self.events.lock().unwrap().clone()
        }

        fn hide_count(&self) -> usize {
            self.events()
                .iter()
                .filter(|event| **event == DisplayEvent::Hide)
                .count()
        }

        fn shows_for(&self, label: &str) -> Vec<(String, f64)> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    DisplayEvent::Show(status, fraction) if status.ends_with(&format!("({label})")) => {
                        Some((status, fraction))
                    }
                    _ => None,
                })
                .collect()
        }
    }

    impl ProgressDisplay for RecordingDisplay {
        fn pulse(&self) {
            self.events.lock().unwrap().push(DisplayEvent::Pulse);
        }

        fn show(&self, status: &str, fraction: f64) {
            self.events
                .lock()
                .unwrap()
                .push(DisplayEvent::Show(status.to_string(), fraction));
        }

        fn hide(&self) {
            self.events.lock().unwrap().push(DisplayEvent::Hide);
        }
    }

    #[derive(Default)]
    struct RecordingLog {
        status: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl RecordingLog {
        fn status_lines(&self) -> Vec<String> {
            self.status.lock().unwrap().clone()
        }

        fn error_lines(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }
    }

    impl LogSink for RecordingLog {
        fn status(&self, line: &str) {
            self.status.lock().unwrap().push(line.to_string());
        }

        fn error(&self, line: &str) {
            self.errors.lock().unwrap().push(line.to_string());
        }
    }

    /// Sleeps for a fixed time per source path, then exits with the scripted code
    #[derive(Default)]
    struct ScriptedTranscoder {
        script: HashMap<String, (Duration, i32)>,
        calls: Mutex<Vec<Job>>,
    }

    impl ScriptedTranscoder {
        fn with(mut self, source: &str, latency: Duration, exit_code: i32) -> Self {
            self.script.insert(source.to_string(), (latency, exit_code));
            self
        }

        fn calls(&self) -> Vec<Job> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transcoder for ScriptedTranscoder {
        async fn transform(&self, job: &Job) -> Result<(), TranscodeError> {
            self.calls.lock().unwrap().push(job.clone());
            let source = job.source().to_string_lossy().to_string();
            let (latency, code) = self.script.get(&source).copied().unwrap_or_default();
            time::sleep(latency).await;
            match code {
                0 => Ok(()),
                code => Err(TranscodeError::Exit { code }),
            }
        }
    }

    /// Blocks every job until released, recording when each one starts
    struct GatedTranscoder {
        started: tokio::sync::mpsc::UnboundedSender<Job>,
        release: Notify,
    }

    #[async_trait]
    impl Transcoder for GatedTranscoder {
        async fn transform(&self, job: &Job) -> Result<(), TranscodeError> {
            let released = self.release.notified();
            self.started.send(job.clone()).unwrap();
            released.await;
            Ok(())
        }
    }

    /// Panics on one source path, succeeds on every other
    struct PanickingTranscoder {
        panic_on: &'static str,
    }

    #[async_trait]
    impl Transcoder for PanickingTranscoder {
        async fn transform(&self, job: &Job) -> Result<(), TranscodeError> {
            if job.source().ends_with(self.panic_on) {
                panic!("decoder state corrupted");
            }
            Ok(())
        }
    }

    /// Log sink that reads the queue it reports for
    struct ReentrantLog {
        queue: Mutex<Option<TranscodingQueue>>,
        seen_pending: Mutex<Vec<usize>>,
    }

    impl LogSink for ReentrantLog {
        fn status(&self, _line: &str) {
            if let Some(queue) = self.queue.lock().unwrap().as_ref() {
                self.seen_pending.lock().unwrap().push(queue.pending_len());
            }
        }

        fn error(&self, _line: &str) {}
    }

    struct Harness {
        queue: TranscodingQueue,
        display: Arc<RecordingDisplay>,
        log: Arc<RecordingLog>,
    }

    fn harness(transcoder: Arc<dyn Transcoder>) -> Harness {
        let display = Arc::new(RecordingDisplay::default());
        let log = Arc::new(RecordingLog::default());
        let queue = TranscodingQueue::new(
            transcoder,
            display.clone(),
            log.clone(),
            QueueSettings::default(),
        );
        Harness { queue, display, log }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_on_idle_queue_starts_draining_synchronously() {
        let transcoder = Arc::new(ScriptedTranscoder::default());
        let h = harness(transcoder.clone());
        assert!(!h.queue.is_draining());

        h.queue.enqueue(Job::new("a.mp3", "a.out"));
        assert!(h.queue.is_draining());
        assert_eq!(h.queue.pending_len(), 1);

        h.queue.wait_idle().await;
        assert!(!h.queue.is_draining());
        assert_eq!(h.queue.pending_len(), 0);
        assert_eq!(transcoder.calls(), vec![Job::new("a.mp3", "a.out")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_run_once_in_fifo_order() {
        let transcoder = Arc::new(
            ScriptedTranscoder::default()
                .with("a.mp3", Duration::from_secs(2), 0)
                .with("b.mp3", Duration::from_secs(1), 0)
                .with("c.mp3", Duration::from_secs(3), 0),
        );
        let h = harness(transcoder.clone());

        let jobs: Vec<Job> = ["a", "b", "c"]
            .iter()
            .map(|name| Job::new(format!("{name}.mp3"), format!("{name}.out")))
            .collect();
        for job in &jobs {
            h.queue.enqueue(job.clone());
        }
        h.queue.wait_idle().await;

        assert_eq!(transcoder.calls(), jobs);
        assert_eq!(h.queue.completed_count(), 3);
        assert_eq!(h.display.hide_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_and_failure_end_to_end() {
        let transcoder = Arc::new(
            ScriptedTranscoder::default()
                .with("a.mp3", Duration::from_secs(2), 0)
                .with("b.mp3", Duration::from_secs(1), 1),
        );
        let h = harness(transcoder.clone());

        h.queue.enqueue(Job::new("a.mp3", "a.out"));
        h.queue.enqueue(Job::new("b.mp3", "b.out"));
        h.queue.wait_idle().await;

        assert_eq!(
            transcoder.calls(),
            vec![Job::new("a.mp3", "a.out"), Job::new("b.mp3", "b.out")]
        );

        let errors = h.log.error_lines();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("exit code 1"), "{}", errors[0]);
        assert!(errors[0].contains("b.mp3"));

        // Failed jobs do not count toward completion
        assert_eq!(h.queue.completed_count(), 1);
        assert!(!h.queue.is_draining());
        assert_eq!(h.display.hide_count(), 1);
        assert_eq!(h.display.events().last(), Some(&DisplayEvent::Hide));

        let status = h.log.status_lines();
        assert_eq!(status.first().map(String::as_str), Some("Starting to process..."));
        assert_eq!(status.last().map(String::as_str), Some("Finished processing in 0m 3s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_is_replaced_by_last_measured_duration() {
        let transcoder = Arc::new(
            ScriptedTranscoder::default()
                .with("a.mp3", Duration::from_secs(3), 0)
                .with("b.mp3", Duration::from_secs(1), 0),
        );
        let h = harness(transcoder);

        h.queue.enqueue(Job::new("a.mp3", "a.out"));
        h.queue.wait_idle().await;
        assert_eq!(h.queue.estimated_job_duration(), Duration::from_secs(3));

        h.queue.enqueue(Job::new("b.mp3", "b.out"));
        h.queue.wait_idle().await;
        assert_eq!(h.queue.estimated_job_duration(), Duration::from_secs(1));

        // b was scaled against a's 3 s: the first 200 ms tick is 1/15
        let shows = h.display.shows_for("b.out");
        assert_eq!(shows[0], ("Processing: 2 of 2 (b.out)".to_string(), 0.0));
        assert_close(shows[1].1, 1.0 / 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_estimate() {
        let transcoder = Arc::new(
            ScriptedTranscoder::default()
                .with("a.mp3", Duration::from_secs(4), 0)
                .with("b.mp3", Duration::from_secs(9), 2),
        );
        let h = harness(transcoder);

        h.queue.enqueue(Job::new("a.mp3", "a.out"));
        h.queue.enqueue(Job::new("b.mp3", "b.out"));
        h.queue.wait_idle().await;

        assert_eq!(h.queue.estimated_job_duration(), Duration::from_secs(4));
        assert_eq!(h.queue.completed_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_pulse_and_report_position() {
        let transcoder = Arc::new(
            ScriptedTranscoder::default().with("a.mp3", Duration::from_millis(1100), 0),
        );
        let h = harness(transcoder);

        h.queue.enqueue(Job::new("a.mp3", "/out/210105/0030Z.mp3"));
        h.queue.enqueue(Job::new("b.mp3", "/out/210105/0100Z.mp3"));
        h.queue.wait_idle().await;

        let shows = h.display.shows_for("0030Z.mp3");
        // Job start plus five ticks before the job finished at 1.1 s
        assert_eq!(shows.len(), 6);
        assert!(shows
            .iter()
            .all(|(status, _)| status == "Processing: 1 of 2 (0030Z.mp3)"));
        // Default estimate of 30 s is 150 ticks
        assert_close(shows[5].1, 5.0 / 150.0);

        let pulses = h
            .display
            .events()
            .iter()
            .filter(|event| **event == DisplayEvent::Pulse)
            .count();
        assert_eq!(pulses, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_progress_after_job_finishes() {
        let transcoder = Arc::new(
            ScriptedTranscoder::default().with("a.mp3", Duration::from_millis(500), 0),
        );
        let h = harness(transcoder);

        h.queue.enqueue(Job::new("a.mp3", "a.out"));
        h.queue.wait_idle().await;
        let before = h.display.events();

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.display.events(), before);
        assert_eq!(before.last(), Some(&DisplayEvent::Hide));
    }

    #[tokio::test]
    async fn test_enqueue_during_transform_is_picked_up_by_same_drain() {
        let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
        let transcoder = Arc::new(GatedTranscoder {
            started: started_tx,
            release: Notify::new(),
        });
        let h = harness(transcoder.clone());

        h.queue.enqueue(Job::new("a.mp3", "a.out"));
        assert_eq!(started_rx.recv().await, Some(Job::new("a.mp3", "a.out")));

        // a is mid-transformation
        h.queue.enqueue(Job::new("b.mp3", "b.out"));
        assert!(h.queue.is_draining());
        assert_eq!(h.queue.pending_len(), 1);

        transcoder.release.notify_one();
        assert_eq!(started_rx.recv().await, Some(Job::new("b.mp3", "b.out")));
        transcoder.release.notify_one();
        h.queue.wait_idle().await;

        assert_eq!(h.queue.completed_count(), 2);
        let starts = h
            .log
            .status_lines()
            .iter()
            .filter(|line| *line == "Starting to process...")
            .count();
        assert_eq!(starts, 1);
        assert_eq!(h.display.hide_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_queue_restarts_on_later_enqueue() {
        let transcoder = Arc::new(ScriptedTranscoder::default());
        let h = harness(transcoder.clone());

        h.queue.enqueue(Job::new("a.mp3", "a.out"));
        h.queue.wait_idle().await;
        h.queue.enqueue(Job::new("b.mp3", "b.out"));
        assert!(h.queue.is_draining());
        h.queue.wait_idle().await;

        assert_eq!(transcoder.calls().len(), 2);
        assert_eq!(h.display.hide_count(), 2);
        assert_eq!(h.queue.completed_count(), 2);
    }

    #[tokio::test]
    async fn test_every_failure_is_logged_and_skipped() {
        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_transform()
            .times(3)
            .returning(|_| Err(TranscodeError::Exit { code: 1 }));
        let h = harness(Arc::new(transcoder));

        for name in ["a", "b", "c"] {
            h.queue.enqueue(Job::new(format!("{name}.mp3"), format!("{name}.out")));
        }
        h.queue.wait_idle().await;

        assert_eq!(h.log.error_lines().len(), 3);
        assert_eq!(h.queue.completed_count(), 0);
        assert_eq!(h.queue.estimated_job_duration(), Duration::from_secs(30));
        assert_eq!(h.display.hide_count(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_does_not_stop_queue() {
        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_transform()
            .withf(|job| job.source().ends_with("a.mp3"))
            .times(1)
            .returning(|_| {
                Err(TranscodeError::Launch {
                    program: "ffmpeg".to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            });
        transcoder
            .expect_transform()
            .withf(|job| job.source().ends_with("b.mp3"))
            .times(1)
            .returning(|_| Ok(()));
        let h = harness(Arc::new(transcoder));

        h.queue.enqueue(Job::new("a.mp3", "a.out"));
        h.queue.enqueue(Job::new("b.mp3", "b.out"));
        h.queue.wait_idle().await;

        let errors = h.log.error_lines();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Failed to run ffmpeg"));
        assert_eq!(h.queue.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_panicking_transform_is_reported_and_skipped() {
        let h = harness(Arc::new(PanickingTranscoder { panic_on: "a.mp3" }));

        h.queue.enqueue(Job::new("a.mp3", "a.out"));
        h.queue.enqueue(Job::new("b.mp3", "b.out"));
        tokio::time::timeout(Duration::from_secs(5), h.queue.wait_idle())
            .await
            .expect("queue did not go idle after a panic");

        let errors = h.log.error_lines();
        assert_eq!(errors, vec!["Transcoder panicked: decoder state corrupted (a.mp3)"]);
        assert_eq!(h.queue.completed_count(), 1);
        assert!(!h.queue.is_draining());

        // The queue still accepts and drains new work
        h.queue.enqueue(Job::new("c.mp3", "c.out"));
        h.queue.wait_idle().await;
        assert_eq!(h.queue.completed_count(), 2);
        assert_eq!(h.display.hide_count(), 2);
    }

    #[tokio::test]
    async fn test_log_sink_may_read_queue_state() {
        let log = Arc::new(ReentrantLog {
            queue: Mutex::new(None),
            seen_pending: Mutex::new(Vec::new()),
        });
        let queue = TranscodingQueue::new(
            Arc::new(ScriptedTranscoder::default()),
            Arc::new(RecordingDisplay::default()),
            log.clone(),
            QueueSettings::default(),
        );
        *log.queue.lock().unwrap() = Some(queue.clone());

        queue.enqueue(Job::new("a.mp3", "a.out"));
        tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
            .await
            .expect("summary deadlocked on the queue lock");

        // "Starting to process..." and the summary line
        assert_eq!(log.seen_pending.lock().unwrap().len(), 2);
        assert!(!queue.is_draining());
        *log.queue.lock().unwrap() = None;
    }
}
