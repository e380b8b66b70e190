//! Query execution caching core and asynchronous task engine for a
//! database-operations service.
//!
//! This crate implements six components: the Smart Cache (C1), the
//! Multi-Region Cache Manager (C2), the Task Queue & Scheduler (C3), the
//! Memory Pressure Observer Bus (C4), the Error Classifier (C5) and the
//! Sensitive-Data Handler (C6). It owns no connection or pool state, reads
//! no configuration files or environment variables, and dispatches no
//! tools itself — those are a caller's responsibility; this crate is the
//! in-process execution core they are built on top of.
//!
//! The four stateful subsystems ([`cache`], [`cache_manager`],
//! [`task_engine`], [`pressure`]) are wired together by a caller at
//! construction: a single [`pressure::PressureBus`] is injected into both
//! the cache manager and the task engine so pressure coupling can be
//! exercised without a process-wide singleton lookup. [`classifier`] and
//! [`masking`] are pure, stateless libraries invoked at the boundaries.

pub mod cache;
pub mod cache_manager;
pub mod classifier;
pub mod error;
pub mod masking;
pub mod pressure;
pub mod task_engine;

pub use cache::{CacheConfig, CacheEntry, CacheStats, SmartCache};
pub use cache_manager::{CacheManager, CacheManagerConfig, CacheManagerStats};
pub use classifier::{classify, is_retryable, ErrorCategory, ErrorClassifier, ErrorRecord, ErrorSeverity};
pub use error::{DbOpsError, Result};
pub use masking::{mask, mask_text, DetectionSummary, MaskingStrategy};
pub use pressure::{PressureBus, PressureConfig, PressureObserver};
pub use task_engine::{TaskEngine, TaskEngineConfig, TaskId, TaskKind, TaskRecord, TaskStatus};

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::cache_manager::{CacheManager, CacheManagerConfig, CachedValue, Region};
    use crate::classifier;
    use crate::masking;
    use crate::pressure::PressureConfig;
    use crate::task_engine::task::RecoveryConfig;
    use crate::task_engine::{OperationContext, TaskEngine, TaskEngineConfig, TaskKind, TaskOperation};
    use crate::PressureBus;

    struct EchoOperation;

    #[async_trait]
    impl TaskOperation for EchoOperation {
        async fn run(
            &self,
            params: Option<serde_json::Value>,
            _ctx: &OperationContext,
        ) -> std::result::Result<serde_json::Value, String> {
            Ok(params.unwrap_or_else(|| json!("done")))
        }
    }

    /// Exercises the cache manager and task engine sharing one pressure
    /// bus, with the task engine's retry predicate wired to the
    /// classifier, the way a real caller assembles the crate.
    #[tokio::test]
    async fn components_wire_together_through_a_shared_pressure_bus() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let bus = PressureBus::new(PressureConfig::default());

        let cache_manager = CacheManager::new(CacheManagerConfig::default())
            .expect("cache manager construction should not fail with default config");
        bus.subscribe(cache_manager.clone());

        let engine = TaskEngine::new(TaskEngineConfig::default(), bus.clone(), classifier::is_retryable);

        let task_id = engine.submit(
            TaskKind::Report,
            "echo",
            Arc::new(EchoOperation),
            Some(json!({"ok": true})),
            1,
            RecoveryConfig::default(),
        );

        let mut record = engine.get_task(task_id).expect("task should exist");
        for _ in 0..50 {
            if record.status.is_terminal() {
                break;
            }
            engine.tick_once();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            record = engine.get_task(task_id).expect("task should exist");
        }
        assert_eq!(record.result, Some(json!({"ok": true})));

        cache_manager.set(Region::Schema, "users", CachedValue::Json(json!(["id", "name"])));
        assert!(cache_manager.has(Region::Schema, "users"));

        let raw_error = "Deadlock found when trying to get lock; contact dba@example.com";
        let record = classifier::classify(raw_error, Some("integration test"));
        assert!(record.retryable);
        let (masked, _) = masking::mask_text(raw_error);
        assert!(!masked.contains("dba@example.com"));
    }
}
