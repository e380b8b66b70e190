use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of long-running operation a task performs (§3 "Task Record").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Backup,
    Export,
    Report,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Backup => "backup",
            TaskKind::Export => "export",
            TaskKind::Report => "report",
        };
        write!(f, "{s}")
    }
}

/// Status DAG: `Queued -> Running -> {Completed, Failed, Cancelled}` and
/// `Queued -> Cancelled` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Cooperative cancellation signal handed to a running operation. The
/// engine never forcibly terminates a running operation (§4.3
/// "Cancellation"); the operation is expected to poll `is_cancelled`.
#[derive(Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves immediately if already cancelled, otherwise waits for the
    /// next cancellation signal. Operations that want to suspend at a safe
    /// point rather than poll in a loop can `select!` on this.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// `{retryCount, retryDelay, exponentialBackoff, fallbackOptions?}` (§4.3
/// "Retry/fallback").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub exponential_backoff: bool,
    pub fallback_options: Option<serde_json::Value>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retry_count: 0,
            retry_delay_ms: 500,
            exponential_backoff: true,
            fallback_options: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub attempts_used: u32,
    pub recovery_applied: bool,
}

/// A long-running task record (§3 "Task Record"). `operation`/`params` are
/// the caller-supplied description; the actual callable lives separately
/// in the engine's operation table since trait objects aren't `Clone`-able
/// the way this snapshot needs to be.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub operation: String,
    pub params: Option<serde_json::Value>,
    pub progress_percent: u8,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub recovery: Option<RecoveryOutcome>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        kind: TaskKind,
        operation: impl Into<String>,
        params: Option<serde_json::Value>,
        priority: i32,
    ) -> Self {
        Self {
            id,
            kind,
            status: TaskStatus::Queued,
            priority,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            operation: operation.into(),
            params,
            progress_percent: 0,
            result: None,
            error: None,
            recovery: None,
        }
    }
}
