use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::category::ErrorCategory;

/// Six-level severity scale (spec §7: "info/low/medium/high/critical/fatal").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorSeverity::Info => "info",
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
            ErrorSeverity::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// The classifier's output (spec §4.5 "`classify(raw, context?) →
/// ErrorRecord`"). Implements [`std::error::Error`] so it composes with
/// `thiserror`/`anyhow` caller code the way [`crate::error::DbOpsError`]
/// does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub context: Option<String>,
    pub original_cause: Option<String>,
    pub recoverable: bool,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {}",
            self.severity, self.category, self.message
        )?;
        if let Some(ctx) = &self.context {
            write!(f, " (context: {ctx})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorRecord {}
