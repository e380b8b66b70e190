//! Error classification (spec §4.5, C5). Pure library: holds no
//! connection or pool state, and is invoked at every boundary where an
//! internal error meets an outside consumer (spec §4.5 "Scoping").

mod category;
mod rules;
mod types;

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

pub use category::ErrorCategory;
pub use types::{ErrorRecord, ErrorSeverity};

/// A pluggable override tried before the default substring table.
/// Grounded on the teacher's `ClassificationRule`/`ErrorClassifier::
/// add_rule`, which lets callers register matchers ahead of the default
/// classification.
pub struct ClassificationRule {
    pub name: String,
    matcher: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    category: ErrorCategory,
    severity: ErrorSeverity,
}

impl ClassificationRule {
    pub fn new<F>(name: impl Into<String>, matcher: F, category: ErrorCategory, severity: ErrorSeverity) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            matcher: Arc::new(matcher),
            category,
            severity,
        }
    }
}

/// Classifies a raw, unstructured error message into an [`ErrorRecord`]
/// (spec §4.5 "`classify(raw, context?) → ErrorRecord`"). `recoverable`
/// and `retryable` are derived purely from the resolved category.
pub fn classify(raw: &str, context: Option<&str>) -> ErrorRecord {
    classify_with_rules(raw, context, &[])
}

fn classify_with_rules(raw: &str, context: Option<&str>, custom: &[ClassificationRule]) -> ErrorRecord {
    let lowered = raw.to_lowercase();
    let (category, severity) = custom
        .iter()
        .find(|rule| (rule.matcher)(raw))
        .map(|rule| (rule.category, rule.severity))
        .unwrap_or_else(|| rules::classify_message(&lowered));

    ErrorRecord {
        message: raw.to_string(),
        category,
        severity,
        context: context.map(str::to_string),
        original_cause: None,
        recoverable: category.is_recoverable(),
        retryable: category.is_retryable(),
        timestamp: Utc::now(),
    }
}

/// Convenience predicate for wiring into [`crate::task_engine::TaskEngine::new`]'s
/// `is_retryable` parameter without constructing a full `ErrorRecord`.
pub fn is_retryable(raw: &str) -> bool {
    classify(raw, None).retryable
}

/// Stateful classifier holding caller-registered rules ahead of the
/// default table (spec §9 "avoid implicit global lookup so that tests can
/// substitute a controllable fake" — the same principle applied here: no
/// process-wide registry, callers hold their own instance).
#[derive(Default)]
pub struct ErrorClassifier {
    rules: RwLock<Vec<ClassificationRule>>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
        }
    }

    pub fn add_rule(&self, rule: ClassificationRule) {
        self.rules.write().push(rule);
    }

    pub fn classify(&self, raw: &str, context: Option<&str>) -> ErrorRecord {
        let rules = self.rules.read();
        classify_with_rules(raw, context, &rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_message_is_recoverable_and_retryable() {
        let record = classify("Deadlock found when trying to get lock", None);
        assert_eq!(record.category, ErrorCategory::Deadlock);
        assert!(record.recoverable);
        assert!(record.retryable);
    }

    #[test]
    fn syntax_error_is_neither_recoverable_nor_retryable() {
        let record = classify("You have an error in your SQL syntax", None);
        assert_eq!(record.category, ErrorCategory::Syntax);
        assert!(!record.recoverable);
        assert!(!record.retryable);
    }

    #[test]
    fn context_is_carried_through() {
        let record = classify("connection refused", Some("backup job 42"));
        assert_eq!(record.context.as_deref(), Some("backup job 42"));
    }

    #[test]
    fn custom_rule_takes_priority_over_default_table() {
        let classifier = ErrorClassifier::new();
        classifier.add_rule(ClassificationRule::new(
            "treat_custom_marker_as_fatal",
            |msg: &str| msg.contains("CUSTOM_MARKER"),
            ErrorCategory::InternalError,
            ErrorSeverity::Fatal,
        ));
        let record = classifier.classify("CUSTOM_MARKER: disk full", None);
        assert_eq!(record.severity, ErrorSeverity::Fatal);
        assert_eq!(record.category, ErrorCategory::InternalError);
    }

    #[test]
    fn is_retryable_matches_record_flag() {
        assert!(is_retryable("lock wait timeout exceeded"));
        assert!(!is_retryable("syntax error near SELECT"));
    }
}
