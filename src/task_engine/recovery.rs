use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::task_engine::task::{RecoveryConfig, RecoveryOutcome};

/// Runs `op` under the retry/fallback recovery strategy (§4.3
/// "Retry/fallback"): up to `retry_count + 1` attempts, sleeping
/// `retry_delay * 2^(attempt-1)` between attempts when exponential backoff
/// is enabled, else a flat `retry_delay`. Only errors `is_retryable`
/// accepts trigger another attempt; any other error aborts the loop
/// immediately. If every attempt fails and `fallback_options` is set, one
/// final attempt runs with the merged options.
///
/// `op` takes the active attempt's params (base params merged with
/// fallback options on the final attempt, if applicable) and returns the
/// raw, unclassified error string on failure — classification happens at
/// the caller's boundary, not inside the recovery loop.
pub async fn run_with_recovery<F, Fut>(
    config: &RecoveryConfig,
    base_params: Option<serde_json::Value>,
    is_retryable: impl Fn(&str) -> bool,
    mut op: F,
) -> (Result<serde_json::Value, String>, RecoveryOutcome)
where
    F: FnMut(Option<serde_json::Value>) -> Fut,
    Fut: Future<Output = Result<serde_json::Value, String>>,
{
    let max_attempts = config.retry_count + 1;
    let mut attempts_used = 0;
    let mut last_err = String::new();

    for attempt in 1..=max_attempts {
        attempts_used = attempt;
        match op(base_params.clone()).await {
            Ok(value) => {
                return (
                    Ok(value),
                    RecoveryOutcome {
                        attempts_used,
                        recovery_applied: attempt > 1,
                    },
                );
            }
            Err(err) => {
                last_err = err;
                if attempt == max_attempts || !is_retryable(&last_err) {
                    break;
                }
                let delay = if config.exponential_backoff {
                    config.retry_delay_ms.saturating_mul(1u64 << (attempt - 1).min(20))
                } else {
                    config.retry_delay_ms
                };
                debug!(attempt, delay_ms = delay, "retrying task operation");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }

    if let Some(fallback) = &config.fallback_options {
        let merged = merge_params(base_params, fallback.clone());
        warn!("retry attempts exhausted, running fallback attempt");
        match op(Some(merged)).await {
            Ok(value) => {
                return (
                    Ok(value),
                    RecoveryOutcome {
                        attempts_used: attempts_used + 1,
                        recovery_applied: true,
                    },
                );
            }
            Err(err) => {
                return (
                    Err(err),
                    RecoveryOutcome {
                        attempts_used: attempts_used + 1,
                        recovery_applied: true,
                    },
                );
            }
        }
    }

    (
        Err(last_err),
        RecoveryOutcome {
            attempts_used,
            recovery_applied: false,
        },
    )
}

fn merge_params(base: Option<serde_json::Value>, fallback: serde_json::Value) -> serde_json::Value {
    match (base, fallback) {
        (Some(serde_json::Value::Object(mut base_map)), serde_json::Value::Object(fallback_map)) => {
            for (k, v) in fallback_map {
                base_map.insert(k, v);
            }
            serde_json::Value::Object(base_map)
        }
        (_, fallback) => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use serde_json::json;

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_recovery() {
        let config = RecoveryConfig {
            retry_count: 3,
            retry_delay_ms: 1,
            ..RecoveryConfig::default()
        };
        let (result, outcome) =
            run_with_recovery(&config, None, |_| true, |_| async { Ok(json!("ok")) }).await;
        assert_eq!(result.unwrap(), json!("ok"));
        assert_eq!(outcome.attempts_used, 1);
        assert!(!outcome.recovery_applied);
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let config = RecoveryConfig {
            retry_count: 3,
            retry_delay_ms: 1,
            ..RecoveryConfig::default()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let (result, outcome) = run_with_recovery(&config, None, |_| true, move |_| {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("timeout".to_string())
                } else {
                    Ok(json!("recovered"))
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), json!("recovered"));
        assert_eq!(outcome.attempts_used, 3);
        assert!(outcome.recovery_applied);
    }

    #[tokio::test]
    async fn non_retryable_error_aborts_immediately() {
        let config = RecoveryConfig {
            retry_count: 5,
            retry_delay_ms: 1,
            ..RecoveryConfig::default()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let (result, outcome) = run_with_recovery(&config, None, |_| false, move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<serde_json::Value, _>("syntax error".to_string())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(outcome.attempts_used, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_runs_once_after_retries_exhausted() {
        let config = RecoveryConfig {
            retry_count: 1,
            retry_delay_ms: 1,
            exponential_backoff: false,
            fallback_options: Some(json!({"mode": "safe"})),
        };
        let (result, outcome) = run_with_recovery(&config, Some(json!({"mode": "fast"})), |_| true, |params| async move {
            if params.as_ref().and_then(|p| p.get("mode")).and_then(|m| m.as_str()) == Some("safe") {
                Ok(json!("fallback worked"))
            } else {
                Err("deadlock".to_string())
            }
        })
        .await;
        assert_eq!(result.unwrap(), json!("fallback worked"));
        assert!(outcome.recovery_applied);
    }
}
