use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::task_engine::task::{CancellationHandle, TaskId};

/// `{stage, progressPercent, message, rowsProcessed?, rowsTotal?, startTime,
/// estimatedRemainingMs?, currentRowsPerSec?}` (§3 "Progress").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStage {
    Preparing,
    FileReading,
    DataParsing,
    Validation,
    Insertion,
    Processing,
    Dumping,
    Compressing,
    Verifying,
    Completed,
    Error,
}

impl ProgressStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressStage::Completed | ProgressStage::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub stage: ProgressStage,
    pub progress_percent: u8,
    pub message: String,
    pub rows_processed: Option<u64>,
    pub rows_total: Option<u64>,
    #[serde(skip, default = "Instant::now")]
    pub start_time: Instant,
    pub estimated_remaining_ms: Option<u64>,
    pub current_rows_per_sec: Option<f64>,
}

impl Progress {
    pub fn starting() -> Self {
        Self {
            stage: ProgressStage::Preparing,
            progress_percent: 0,
            message: String::new(),
            rows_processed: None,
            rows_total: None,
            start_time: Instant::now(),
            estimated_remaining_ms: None,
            current_rows_per_sec: None,
        }
    }
}

/// A bound tracker an operation publishes progress into (§4.3 "Progress
/// tracking"). Publication is non-blocking: a single `parking_lot::Mutex`
/// snapshot rather than a channel, so a slow or absent subscriber never
/// backpressures the publisher.
pub struct ProgressTracker {
    pub id: TaskId,
    pub operation: String,
    pub cancellation: CancellationHandle,
    progress: Mutex<Progress>,
    terminal_since: Mutex<Option<Instant>>,
}

impl ProgressTracker {
    pub fn new(id: TaskId, operation: impl Into<String>, cancellation: CancellationHandle) -> Self {
        Self {
            id,
            operation: operation.into(),
            cancellation,
            progress: Mutex::new(Progress::starting()),
            terminal_since: Mutex::new(None),
        }
    }

    /// Best-effort, non-blocking publish. Computes a rows/sec estimate and
    /// remaining-time estimate when a row total is known.
    pub fn publish(&self, mut update: Progress) {
        let elapsed = update.start_time.elapsed().as_secs_f64().max(0.001);
        if let Some(processed) = update.rows_processed {
            let rate = processed as f64 / elapsed;
            update.current_rows_per_sec = Some(rate);
            if let Some(total) = update.rows_total {
                let remaining_rows = total.saturating_sub(processed) as f64;
                if rate > 0.0 {
                    update.estimated_remaining_ms = Some((remaining_rows / rate * 1000.0) as u64);
                }
            }
        }
        if update.stage.is_terminal() {
            let mut terminal_since = self.terminal_since.lock();
            if terminal_since.is_none() {
                *terminal_since = Some(Instant::now());
            }
        }
        *self.progress.lock() = update;
    }

    pub fn snapshot(&self) -> Progress {
        self.progress.lock().clone()
    }

    /// A tracker is reapable once it has been in a terminal stage longer
    /// than `max_age` (§4.3 "Trackers older than 5 minutes ... are reaped").
    pub fn is_reapable(&self, max_age: Duration) -> bool {
        self.terminal_since
            .lock()
            .map(|since| since.elapsed() > max_age)
            .unwrap_or(false)
    }
}

impl Clone for Progress {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage,
            progress_percent: self.progress_percent,
            message: self.message.clone(),
            rows_processed: self.rows_processed,
            rows_total: self.rows_total,
            start_time: self.start_time,
            estimated_remaining_ms: self.estimated_remaining_ms,
            current_rows_per_sec: self.current_rows_per_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_computes_rate_and_eta() {
        let tracker = ProgressTracker::new(TaskId::new(), "export", CancellationHandle::new());
        let mut update = Progress::starting();
        update.start_time = Instant::now() - Duration::from_secs(2);
        update.stage = ProgressStage::Processing;
        update.rows_processed = Some(200);
        update.rows_total = Some(1000);
        tracker.publish(update);
        let snap = tracker.snapshot();
        assert!(snap.current_rows_per_sec.unwrap() > 0.0);
        assert!(snap.estimated_remaining_ms.is_some());
    }

    #[test]
    fn terminal_stage_marks_reapable_after_max_age() {
        let tracker = ProgressTracker::new(TaskId::new(), "export", CancellationHandle::new());
        let mut update = Progress::starting();
        update.stage = ProgressStage::Completed;
        tracker.publish(update);
        assert!(!tracker.is_reapable(Duration::from_secs(300)));
        assert!(tracker.is_reapable(Duration::from_secs(0)));
    }

    #[test]
    fn non_terminal_stage_is_never_reapable() {
        let tracker = ProgressTracker::new(TaskId::new(), "export", CancellationHandle::new());
        assert!(!tracker.is_reapable(Duration::from_secs(0)));
    }
}
