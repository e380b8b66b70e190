//! Task Queue & Scheduler (C3): a priority-ordered, concurrency-limited
//! engine for long-running operations (backup, export, report).

pub mod progress;
pub mod queue;
pub mod recovery;
pub mod task;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DbOpsError, Result};
use crate::pressure::{PressureBus, SystemMemoryInfo};
use crate::task_engine::progress::{Progress, ProgressTracker};
use crate::task_engine::queue::TaskQueue;
use crate::task_engine::recovery::run_with_recovery;
pub use crate::task_engine::task::{
    CancellationHandle, RecoveryConfig, RecoveryOutcome, TaskId, TaskKind, TaskRecord, TaskStatus,
};

/// The operation a task executes. Registered per-submission rather than
/// stored on `TaskRecord` itself, since a trait object isn't a plain data
/// field a caller should be able to clone or serialize.
#[async_trait]
pub trait TaskOperation: Send + Sync {
    async fn run(&self, params: Option<serde_json::Value>, ctx: &OperationContext) -> Result<serde_json::Value, String>;
}

pub struct OperationContext {
    pub cancellation: CancellationHandle,
    pub tracker: Arc<ProgressTracker>,
}

struct TaskContext {
    operation: Arc<dyn TaskOperation>,
    recovery: RecoveryConfig,
    cancellation: CancellationHandle,
    tracker: Arc<ProgressTracker>,
}

#[derive(Debug, Clone)]
pub struct TaskEngineConfig {
    pub retention: Duration,
    pub tracker_max_age: Duration,
    pub high_pressure_threshold: f64,
    pub critical_pressure_threshold: f64,
    pub tick_fast: Duration,
    pub tick_slow: Duration,
    pub initial_max_concurrency: Option<usize>,
}

impl Default for TaskEngineConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(30 * 60),
            tracker_max_age: Duration::from_secs(5 * 60),
            high_pressure_threshold: 0.85,
            critical_pressure_threshold: 0.95,
            tick_fast: Duration::from_millis(500),
            tick_slow: Duration::from_secs(1),
            initial_max_concurrency: None,
        }
    }
}

/// Initial concurrency cap from available runtime memory (§4.3
/// "Concurrency cap"): >=500MB -> 8, >=200MB -> 5, else 3.
fn default_concurrency_for(available_bytes: u64) -> usize {
    const MB: u64 = 1024 * 1024;
    if available_bytes >= 500 * MB {
        8
    } else if available_bytes >= 200 * MB {
        5
    } else {
        3
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub running: usize,
    pub queued: usize,
    pub max_concurrency: usize,
    pub completed_total: u64,
    pub failed_total: u64,
    pub cancelled_total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub stats: EngineStats,
    pub paused: bool,
    pub queue_by_kind: HashMap<String, usize>,
    pub queue_by_status: HashMap<String, usize>,
    pub throughput_last_minute: u64,
    pub success_rate: f64,
    pub avg_wait_ms: f64,
    pub avg_execution_ms: f64,
    pub current_pressure: f64,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "running={} queued={}/{} throughput/min={} success_rate={:.1}% pressure={:.2}",
            self.stats.running,
            self.stats.queued,
            self.stats.max_concurrency,
            self.throughput_last_minute,
            self.success_rate * 100.0,
            self.current_pressure,
        )
    }
}

#[derive(Default)]
struct TimingSums {
    completed_timestamps: VecDeque<Instant>,
    wait_ms_total: u64,
    execution_ms_total: u64,
    terminal_count: u64,
    completed_total: u64,
    failed_total: u64,
    cancelled_total: u64,
}

/// The scheduler/queue facade (§4.3). Owns one lock for the task table and
/// a second for the queue index, matching §5's "one lock for the task
/// table plus a second for the queue index".
pub struct TaskEngine {
    tasks: Mutex<HashMap<TaskId, TaskRecord>>,
    contexts: Mutex<HashMap<TaskId, TaskContext>>,
    queue: TaskQueue,
    running: AtomicUsize,
    max_concurrency: AtomicUsize,
    paused: AtomicBool,
    pressure: Arc<PressureBus>,
    config: TaskEngineConfig,
    timing: Mutex<TimingSums>,
    shutdown: Arc<Notify>,
    scheduler_handle: Mutex<Option<JoinHandle<()>>>,
    self_weak: Weak<TaskEngine>,
    is_retryable: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl TaskEngine {
    pub fn new(
        config: TaskEngineConfig,
        pressure: Arc<PressureBus>,
        is_retryable: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        let initial_cap = config.initial_max_concurrency.unwrap_or_else(|| {
            let info = SystemMemoryInfo::collect();
            default_concurrency_for(info.available_bytes)
        });
        Arc::new_cyclic(|weak| Self {
            tasks: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
            queue: TaskQueue::new(),
            running: AtomicUsize::new(0),
            max_concurrency: AtomicUsize::new(initial_cap.max(1)),
            paused: AtomicBool::new(false),
            pressure,
            config,
            timing: Mutex::new(TimingSums::default()),
            shutdown: Arc::new(Notify::new()),
            scheduler_handle: Mutex::new(None),
            self_weak: weak.clone(),
            is_retryable: Box::new(is_retryable),
        })
    }

    pub fn submit(
        &self,
        kind: TaskKind,
        operation_name: impl Into<String>,
        operation: Arc<dyn TaskOperation>,
        params: Option<serde_json::Value>,
        priority: i32,
        recovery: RecoveryConfig,
    ) -> TaskId {
        let id = TaskId::new();
        let operation_name = operation_name.into();
        let record = TaskRecord::new(id, kind, operation_name.clone(), params, priority);
        let cancellation = CancellationHandle::new();
        let tracker = Arc::new(ProgressTracker::new(id, operation_name, cancellation.clone()));
        self.tasks.lock().insert(id, record);
        self.contexts.lock().insert(
            id,
            TaskContext {
                operation,
                recovery,
                cancellation,
                tracker,
            },
        );
        self.queue.push(id, priority);
        debug!(task_id = %id, priority, "task submitted");
        id
    }

    pub fn get_task(&self, id: TaskId) -> Option<TaskRecord> {
        self.tasks.lock().get(&id).cloned()
    }

    pub fn get_progress(&self, id: TaskId) -> Option<Progress> {
        self.contexts.lock().get(&id).map(|c| c.tracker.snapshot())
    }

    /// Cancels a task (§4.3 "Cancellation"). A queued task is removed from
    /// the queue outright; a running task has its status flipped and its
    /// handle signalled, but the engine does not forcibly terminate it.
    pub fn cancel(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.tasks.lock();
        let record = tasks.get_mut(&id).ok_or_else(|| DbOpsError::TaskNotFound(id.to_string()))?;
        match record.status {
            TaskStatus::Queued => {
                self.queue.remove(id);
                record.status = TaskStatus::Cancelled;
                record.completed_at = Some(Utc::now());
                self.record_terminal(TaskStatus::Cancelled, None, None);
                Ok(())
            }
            TaskStatus::Running => {
                record.status = TaskStatus::Cancelled;
                record.completed_at = Some(Utc::now());
                drop(tasks);
                if let Some(ctx) = self.contexts.lock().get(&id) {
                    ctx.cancellation.cancel();
                }
                Ok(())
            }
            _ => Err(DbOpsError::TaskNotCancellable(id.to_string())),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Drops every currently queued (not running) task (§4.3 `clearQueue`).
    pub fn clear_queue(&self) -> usize {
        let cleared = self.queue.clear();
        let mut tasks = self.tasks.lock();
        for record in tasks.values_mut() {
            if record.status == TaskStatus::Queued {
                record.status = TaskStatus::Cancelled;
                record.completed_at = Some(Utc::now());
            }
        }
        drop(tasks);
        for _ in 0..cleared {
            self.record_terminal(TaskStatus::Cancelled, None, None);
        }
        cleared
    }

    pub fn set_max_concurrency(&self, n: usize) {
        self.max_concurrency.store(n.max(1), Ordering::SeqCst);
    }

    pub fn get_stats(&self) -> EngineStats {
        let timing = self.timing.lock();
        EngineStats {
            running: self.running.load(Ordering::SeqCst),
            queued: self.queue.len(),
            max_concurrency: self.max_concurrency.load(Ordering::SeqCst),
            completed_total: timing.completed_total,
            failed_total: timing.failed_total,
            cancelled_total: timing.cancelled_total,
        }
    }

    pub fn get_diagnostics(&self) -> Diagnostics {
        let stats = self.get_stats();
        let tasks = self.tasks.lock();
        let mut queue_by_kind: HashMap<String, usize> = HashMap::new();
        let mut queue_by_status: HashMap<String, usize> = HashMap::new();
        for record in tasks.values() {
            if record.status == TaskStatus::Queued {
                *queue_by_kind.entry(record.kind.to_string()).or_insert(0) += 1;
            }
            *queue_by_status.entry(record.status.to_string()).or_insert(0) += 1;
        }
        drop(tasks);
        let timing = self.timing.lock();
        let one_minute_ago = Instant::now() - Duration::from_secs(60);
        let throughput = timing
            .completed_timestamps
            .iter()
            .filter(|t| **t >= one_minute_ago)
            .count() as u64;
        let terminal = timing.terminal_count.max(1);
        let success_rate = timing.completed_total as f64 / terminal as f64;
        let avg_wait_ms = timing.wait_ms_total as f64 / terminal as f64;
        let avg_execution_ms = timing.execution_ms_total as f64 / terminal as f64;
        drop(timing);
        Diagnostics {
            stats,
            paused: self.paused.load(Ordering::SeqCst),
            queue_by_kind,
            queue_by_status,
            throughput_last_minute: throughput,
            success_rate,
            avg_wait_ms,
            avg_execution_ms,
            current_pressure: self.pressure.current_pressure(),
        }
    }

    fn record_terminal(&self, status: TaskStatus, wait_ms: Option<u64>, execution_ms: Option<u64>) {
        let mut timing = self.timing.lock();
        timing.terminal_count += 1;
        match status {
            TaskStatus::Completed => {
                timing.completed_total += 1;
                timing.completed_timestamps.push_back(Instant::now());
            }
            TaskStatus::Failed => timing.failed_total += 1,
            TaskStatus::Cancelled => timing.cancelled_total += 1,
            _ => {}
        }
        if let Some(w) = wait_ms {
            timing.wait_ms_total += w;
        }
        if let Some(e) = execution_ms {
            timing.execution_ms_total += e;
        }
        let floor = Instant::now() - Duration::from_secs(120);
        while timing
            .completed_timestamps
            .front()
            .map(|t| *t < floor)
            .unwrap_or(false)
        {
            timing.completed_timestamps.pop_front();
        }
    }

    fn next_tick_interval(&self) -> Duration {
        if self.queue.is_empty() {
            self.config.tick_slow
        } else {
            self.config.tick_fast
        }
    }

    fn reap_terminal_tasks(&self) {
        let mut tasks = self.tasks.lock();
        let retention = self.config.retention;
        let stale: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, r)| {
                r.status.is_terminal()
                    && r.completed_at
                        .map(|c| Utc::now().signed_duration_since(c).to_std().unwrap_or(Duration::ZERO) > retention)
                        .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            tasks.remove(id);
        }
        drop(tasks);
        if !stale.is_empty() {
            let mut contexts = self.contexts.lock();
            for id in &stale {
                contexts.remove(id);
            }
            debug!(count = stale.len(), "reaped terminal tasks past retention window");
        }
    }

    fn reap_stale_trackers(&self) {
        let contexts = self.contexts.lock();
        let max_age = self.config.tracker_max_age;
        let reapable: Vec<TaskId> = contexts
            .iter()
            .filter(|(_, ctx)| ctx.tracker.is_reapable(max_age))
            .map(|(id, _)| *id)
            .collect();
        drop(contexts);
        for id in reapable {
            self.contexts.lock().remove(&id);
        }
    }

    fn start_next_if_capacity(self: &Arc<Self>) {
        while self.running.load(Ordering::SeqCst) < self.max_concurrency.load(Ordering::SeqCst) {
            let Some(task_id) = self.queue.pop() else {
                break;
            };
            let Some(ctx) = self.contexts.lock().get(&task_id).map(|c| TaskContext {
                operation: Arc::clone(&c.operation),
                recovery: c.recovery.clone(),
                cancellation: c.cancellation.clone(),
                tracker: Arc::clone(&c.tracker),
            }) else {
                continue;
            };
            let (base_params, wait_ms) = {
                let mut tasks = self.tasks.lock();
                let Some(record) = tasks.get_mut(&task_id) else {
                    continue;
                };
                record.status = TaskStatus::Running;
                record.started_at = Some(Utc::now());
                let wait_ms = record
                    .started_at
                    .unwrap()
                    .signed_duration_since(record.created_at)
                    .num_milliseconds()
                    .max(0) as u64;
                (record.params.clone(), wait_ms)
            };
            self.running.fetch_add(1, Ordering::SeqCst);
            let engine = self.self_weak.upgrade().expect("engine owns this future");
            let retryable_fn_engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let operation = ctx.operation;
                let op_ctx = OperationContext {
                    cancellation: ctx.cancellation,
                    tracker: ctx.tracker,
                };
                let start = Instant::now();
                let (result, outcome) = run_with_recovery(
                    &ctx.recovery,
                    base_params,
                    |msg| (retryable_fn_engine.is_retryable)(msg),
                    |params| {
                        let operation = operation.clone();
                        let op_ctx = OperationContext {
                            cancellation: op_ctx.cancellation.clone(),
                            tracker: Arc::clone(&op_ctx.tracker),
                        };
                        async move { operation.run(params, &op_ctx).await }
                    },
                )
                .await;
                let execution_ms = start.elapsed().as_millis() as u64;
                engine.finish_task(task_id, result, outcome, wait_ms, execution_ms);
            });
        }
    }

    fn finish_task(
        &self,
        task_id: TaskId,
        result: std::result::Result<serde_json::Value, String>,
        outcome: RecoveryOutcome,
        wait_ms: u64,
        execution_ms: u64,
    ) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        let mut tasks = self.tasks.lock();
        let Some(record) = tasks.get_mut(&task_id) else {
            return;
        };
        if record.status == TaskStatus::Cancelled {
            return;
        }
        record.recovery = Some(outcome);
        record.completed_at = Some(Utc::now());
        match result {
            Ok(value) => {
                record.status = TaskStatus::Completed;
                record.result = Some(value);
                record.progress_percent = 100;
            }
            Err(err) => {
                record.status = TaskStatus::Failed;
                record.error = Some(err);
            }
        }
        let status = record.status;
        drop(tasks);
        self.record_terminal(status, Some(wait_ms), Some(execution_ms));
    }

    fn apply_pressure_coupling(&self) {
        let p = self.pressure.current_pressure();
        if p > self.config.critical_pressure_threshold {
            warn!(pressure = p, "task engine: critical memory pressure, treat as admission-control hint");
        }
        if p > self.config.high_pressure_threshold {
            self.reap_stale_trackers();
        }
    }

    pub fn start_scheduler(self: &Arc<Self>) {
        let mut handle_slot = self.scheduler_handle.lock();
        if handle_slot.is_some() {
            return;
        }
        let engine = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let handle = tokio::spawn(async move {
            loop {
                let interval = engine.next_tick_interval();
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        engine.reap_terminal_tasks();
                        engine.apply_pressure_coupling();
                        if !engine.paused.load(Ordering::SeqCst) {
                            engine.start_next_if_capacity();
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });
        *handle_slot = Some(handle);
        info!("task scheduler started");
    }

    pub fn stop_scheduler(&self) {
        if let Some(handle) = self.scheduler_handle.lock().take() {
            self.shutdown.notify_one();
            handle.abort();
        }
    }

    /// Runs one scheduling pass synchronously, for tests that don't want to
    /// wait on the background interval.
    #[cfg(test)]
    pub fn tick_once(self: &Arc<Self>) {
        self.reap_terminal_tasks();
        self.apply_pressure_coupling();
        if !self.paused.load(Ordering::SeqCst) {
            self.start_next_if_capacity();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pressure::PressureConfig;
    use std::time::Duration as StdDuration;

    struct EchoOperation;

    #[async_trait]
    impl TaskOperation for EchoOperation {
        async fn run(&self, params: Option<serde_json::Value>, _ctx: &OperationContext) -> Result<serde_json::Value, String> {
            Ok(params.unwrap_or(serde_json::Value::Null))
        }
    }

    struct AlwaysFailOperation;

    #[async_trait]
    impl TaskOperation for AlwaysFailOperation {
        async fn run(&self, _params: Option<serde_json::Value>, _ctx: &OperationContext) -> Result<serde_json::Value, String> {
            Err("deadlock found".to_string())
        }
    }

    fn engine(max_concurrency: usize) -> Arc<TaskEngine> {
        let pressure = PressureBus::new(PressureConfig::default());
        TaskEngine::new(
            TaskEngineConfig {
                initial_max_concurrency: Some(max_concurrency),
                ..TaskEngineConfig::default()
            },
            pressure,
            |msg: &str| msg.contains("deadlock") || msg.contains("timeout"),
        )
    }

    async fn wait_for_terminal(engine: &Arc<TaskEngine>, id: TaskId) -> TaskRecord {
        for _ in 0..200 {
            if let Some(record) = engine.get_task(id) {
                if record.status.is_terminal() {
                    return record;
                }
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        panic!("task did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn scenario_s5_priority_ordering() {
        let eng = engine(1);
        eng.pause();
        let low = eng.submit(TaskKind::Export, "low", Arc::new(EchoOperation), None, 1, RecoveryConfig::default());
        let high = eng.submit(TaskKind::Export, "high", Arc::new(EchoOperation), None, 9, RecoveryConfig::default());
        assert_eq!(eng.queue.len(), 2);
        eng.resume();
        eng.tick_once();
        let record = eng.get_task(high).unwrap();
        assert_eq!(record.status, TaskStatus::Running);
        let still_queued = eng.get_task(low).unwrap();
        assert_eq!(still_queued.status, TaskStatus::Queued);
        wait_for_terminal(&eng, high).await;
    }

    #[tokio::test]
    async fn submitted_task_completes() {
        let eng = engine(4);
        let id = eng.submit(
            TaskKind::Report,
            "echo",
            Arc::new(EchoOperation),
            Some(serde_json::json!({"x": 1})),
            5,
            RecoveryConfig::default(),
        );
        eng.tick_once();
        let record = wait_for_terminal(&eng, id).await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.result, Some(serde_json::json!({"x": 1})));
    }

    #[tokio::test]
    async fn scenario_s6_retry_with_fallback() {
        let eng = engine(4);
        let recovery = RecoveryConfig {
            retry_count: 1,
            retry_delay_ms: 1,
            exponential_backoff: false,
            fallback_options: None,
        };
        let id = eng.submit(TaskKind::Backup, "fail", Arc::new(AlwaysFailOperation), None, 1, recovery);
        eng.tick_once();
        let record = wait_for_terminal(&eng, id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.recovery.unwrap().attempts_used, 2);
    }

    #[tokio::test]
    async fn cancel_queued_task_removes_it() {
        let eng = engine(1);
        eng.pause();
        let id = eng.submit(TaskKind::Export, "noop", Arc::new(EchoOperation), None, 1, RecoveryConfig::default());
        eng.cancel(id).unwrap();
        let record = eng.get_task(id).unwrap();
        assert_eq!(record.status, TaskStatus::Cancelled);
        assert_eq!(eng.queue.len(), 0);
    }

    #[tokio::test]
    async fn clear_queue_only_touches_queued_tasks() {
        let eng = engine(1);
        eng.pause();
        let queued = eng.submit(TaskKind::Export, "noop", Arc::new(EchoOperation), None, 1, RecoveryConfig::default());
        let cleared = eng.clear_queue();
        assert_eq!(cleared, 1);
        assert_eq!(eng.get_task(queued).unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn diagnostics_reports_queue_composition() {
        let eng = engine(4);
        eng.pause();
        eng.submit(TaskKind::Backup, "a", Arc::new(EchoOperation), None, 1, RecoveryConfig::default());
        eng.submit(TaskKind::Export, "b", Arc::new(EchoOperation), None, 1, RecoveryConfig::default());
        let diagnostics = eng.get_diagnostics();
        assert_eq!(diagnostics.stats.queued, 2);
        assert_eq!(*diagnostics.queue_by_kind.get("backup").unwrap(), 1);
    }

    #[test]
    fn concurrency_cap_scales_with_available_memory() {
        assert_eq!(default_concurrency_for(600 * 1024 * 1024), 8);
        assert_eq!(default_concurrency_for(300 * 1024 * 1024), 5);
        assert_eq!(default_concurrency_for(10 * 1024 * 1024), 3);
    }
}
