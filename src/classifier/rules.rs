use crate::classifier::category::ErrorCategory;
use crate::classifier::types::ErrorSeverity;

/// One classification rule: if the lowercased message contains any of
/// `substrings`, it is assigned `category`/`severity`. Rules are tried in
/// order and the first match wins, so more specific phrases are listed
/// ahead of the generic substrings they contain (e.g. "lock wait timeout"
/// ahead of bare "timeout").
struct Rule {
    substrings: &'static [&'static str],
    category: ErrorCategory,
    severity: ErrorSeverity,
}

macro_rules! rule {
    ([$($s:literal),+ $(,)?], $category:expr, $severity:expr) => {
        Rule { substrings: &[$($s),+], category: $category, severity: $severity }
    };
}

/// Default substring-matching table (spec §4.5: "known database
/// diagnostic substrings"). Grounded on the teacher's
/// `ErrorClassifier::default_classify`, expanded from 4 buckets to the
/// spec's named diagnostics plus the long tail.
static DEFAULT_RULES: &[Rule] = &[
    rule!(["access denied", "permission denied", "access-denied"], ErrorCategory::AccessDenied, ErrorSeverity::High),
    rule!(["authentication failed", "auth failed", "invalid password"], ErrorCategory::AuthenticationFailed, ErrorSeverity::High),
    rule!(["account is locked", "account locked"], ErrorCategory::AccountLocked, ErrorSeverity::High),
    rule!(["password expired"], ErrorCategory::PasswordExpired, ErrorSeverity::Medium),
    rule!(["insufficient privileges", "requires superuser"], ErrorCategory::InsufficientPrivileges, ErrorSeverity::High),

    rule!(["lock wait timeout", "lock_wait_timeout"], ErrorCategory::LockWait, ErrorSeverity::Medium),
    rule!(["deadlock"], ErrorCategory::Deadlock, ErrorSeverity::Medium),
    rule!(["could not serialize access", "serialization failure"], ErrorCategory::SerializationFailure, ErrorSeverity::Medium),

    rule!(["connection refused"], ErrorCategory::ConnectionRefused, ErrorSeverity::High),
    rule!(["connection reset"], ErrorCategory::ConnectionReset, ErrorSeverity::Medium),
    rule!(["connection lost", "server has gone away", "broken pipe"], ErrorCategory::ConnectionLost, ErrorSeverity::High),
    rule!(["too many connections"], ErrorCategory::TooManyConnections, ErrorSeverity::High),
    rule!(["connection pool exhausted", "pool timeout"], ErrorCategory::ConnectionPoolExhausted, ErrorSeverity::High),
    rule!(["network is unreachable"], ErrorCategory::NetworkUnreachable, ErrorSeverity::High),
    rule!(["no route to host", "host unreachable"], ErrorCategory::HostUnreachable, ErrorSeverity::High),
    rule!(["name or service not known", "dns"], ErrorCategory::DnsResolutionFailed, ErrorSeverity::High),
    rule!(["connection"], ErrorCategory::Connection, ErrorSeverity::Medium),

    rule!(["statement timeout"], ErrorCategory::StatementTimeout, ErrorSeverity::Medium),
    rule!(["query timeout", "query execution was interrupted"], ErrorCategory::QueryTimeout, ErrorSeverity::Medium),
    rule!(["timeout", "timed out"], ErrorCategory::Timeout, ErrorSeverity::Medium),
    rule!(["operation was cancelled", "operation cancelled", "canceling statement"], ErrorCategory::OperationCancelled, ErrorSeverity::Low),

    rule!(["unknown database"], ErrorCategory::UnknownDatabase, ErrorSeverity::High),
    rule!(["table or view does not exist", "no such table", "table not found"], ErrorCategory::TableNotFound, ErrorSeverity::High),
    rule!(["unknown column", "column not found"], ErrorCategory::ColumnNotFound, ErrorSeverity::High),
    rule!(["index not found", "key not found in table"], ErrorCategory::IndexNotFound, ErrorSeverity::Medium),
    rule!(["view not found", "no such view"], ErrorCategory::ViewNotFound, ErrorSeverity::Medium),
    rule!(["schema mismatch", "incompatible schema"], ErrorCategory::SchemaMismatch, ErrorSeverity::High),
    rule!(["ambiguous column"], ErrorCategory::AmbiguousColumn, ErrorSeverity::Low),
    rule!(["you have an error in your sql syntax", "syntax error", "parse error"], ErrorCategory::Syntax, ErrorSeverity::Medium),
    rule!(["unsupported operation", "not supported"], ErrorCategory::UnsupportedOperation, ErrorSeverity::Low),
    rule!(["invalid identifier"], ErrorCategory::InvalidIdentifier, ErrorSeverity::Low),

    rule!(["duplicate entry", "duplicate key value"], ErrorCategory::DuplicateEntry, ErrorSeverity::Medium),
    rule!(["foreign key constraint"], ErrorCategory::ForeignKeyViolation, ErrorSeverity::Medium),
    rule!(["check constraint"], ErrorCategory::CheckConstraintViolation, ErrorSeverity::Medium),
    rule!(["cannot be null", "null constraint", "not-null constraint"], ErrorCategory::NotNullViolation, ErrorSeverity::Medium),
    rule!(["unique constraint", "unique violation"], ErrorCategory::UniqueViolation, ErrorSeverity::Medium),
    rule!(["data truncated", "value too long"], ErrorCategory::DataTruncation, ErrorSeverity::Low),
    rule!(["incorrect data type", "type mismatch"], ErrorCategory::DataTypeMismatch, ErrorSeverity::Low),
    rule!(["constraint violation", "constraint failed"], ErrorCategory::ConstraintViolation, ErrorSeverity::Medium),
    rule!(["data integrity", "checksum mismatch"], ErrorCategory::DataIntegrity, ErrorSeverity::High),

    rule!(["disk full", "no space left on device"], ErrorCategory::DiskExhausted, ErrorSeverity::Critical),
    rule!(["out of memory", "cannot allocate memory"], ErrorCategory::MemoryExhausted, ErrorSeverity::Critical),
    rule!(["too many open files"], ErrorCategory::TooManyOpenFiles, ErrorSeverity::High),
    rule!(["quota exceeded", "disk quota"], ErrorCategory::QuotaExceeded, ErrorSeverity::High),
    rule!(["temp space exhausted", "temporary file space"], ErrorCategory::TempSpaceExhausted, ErrorSeverity::High),
    rule!(["resource exhausted", "resource temporarily unavailable"], ErrorCategory::ResourceExhausted, ErrorSeverity::High),

    rule!(["certificate verify failed", "certificate"], ErrorCategory::CertificateError, ErrorSeverity::High),
    rule!(["ssl handshake", "tls handshake"], ErrorCategory::TlsHandshakeFailed, ErrorSeverity::High),
    rule!(["ssl", "tls"], ErrorCategory::Ssl, ErrorSeverity::High),

    rule!(["binlog"], ErrorCategory::BinlogError, ErrorSeverity::High),
    rule!(["replication lag"], ErrorCategory::ReplicationLagExceeded, ErrorSeverity::Medium),
    rule!(["replica is not ready", "replica not ready"], ErrorCategory::ReplicaNotReady, ErrorSeverity::Medium),
    rule!(["replication"], ErrorCategory::Replication, ErrorSeverity::High),

    rule!(["backup failed", "backup operation failed"], ErrorCategory::BackupFailed, ErrorSeverity::High),
    rule!(["backup"], ErrorCategory::Backup, ErrorSeverity::Medium),
    rule!(["import validation failed"], ErrorCategory::ImportValidationFailed, ErrorSeverity::Medium),
    rule!(["duplicate row in import", "import duplicate"], ErrorCategory::ImportDuplicateKey, ErrorSeverity::Low),
    rule!(["import", "export"], ErrorCategory::ImportExport, ErrorSeverity::Medium),

    rule!(["rate limit"], ErrorCategory::RateLimited, ErrorSeverity::Medium),
    rule!(["throttled", "throttling"], ErrorCategory::Throttled, ErrorSeverity::Medium),
    rule!(["under maintenance", "maintenance mode"], ErrorCategory::MaintenanceMode, ErrorSeverity::Medium),
    rule!(["service unavailable", "no healthy upstream"], ErrorCategory::Unavailable, ErrorSeverity::High),
    rule!(["service is degraded"], ErrorCategory::ServiceDegraded, ErrorSeverity::Medium),
    rule!(["version mismatch", "incompatible version"], ErrorCategory::VersionMismatch, ErrorSeverity::Medium),
    rule!(["feature not supported", "not implemented"], ErrorCategory::FeatureNotSupported, ErrorSeverity::Low),
    rule!(["failed to deserialize", "deserialization error"], ErrorCategory::Deserialization, ErrorSeverity::Low),

    rule!(["invalid configuration", "configuration error"], ErrorCategory::InvalidConfiguration, ErrorSeverity::High),
    rule!(["missing required configuration", "missing configuration"], ErrorCategory::MissingConfiguration, ErrorSeverity::High),
    rule!(["configuration"], ErrorCategory::Configuration, ErrorSeverity::Medium),

    rule!(["transaction rolled back", "rollback"], ErrorCategory::TransactionRollback, ErrorSeverity::Medium),
    rule!(["transaction aborted"], ErrorCategory::TransactionAborted, ErrorSeverity::Medium),
    rule!(["optimistic lock", "stale version"], ErrorCategory::OptimisticLockFailure, ErrorSeverity::Medium),

    rule!(["object not found", "does not exist"], ErrorCategory::ObjectNotFound, ErrorSeverity::Medium),
    rule!(["security violation", "forbidden action"], ErrorCategory::SecurityViolation, ErrorSeverity::Critical),
    rule!(["validation failed", "invalid value"], ErrorCategory::Validation, ErrorSeverity::Low),
    rule!(["invalid argument"], ErrorCategory::InvalidArgument, ErrorSeverity::Low),
    rule!(["invalid parameter"], ErrorCategory::InvalidParameter, ErrorSeverity::Low),
    rule!(["authorization failed", "not authorized"], ErrorCategory::AuthorizationFailed, ErrorSeverity::High),
    rule!(["invalid credentials"], ErrorCategory::InvalidCredentials, ErrorSeverity::High),
    rule!(["internal error", "unexpected error"], ErrorCategory::InternalError, ErrorSeverity::High),
];

/// Matches `msg` (already lowercased) against [`DEFAULT_RULES`] in order,
/// falling back to [`ErrorCategory::Unknown`] at medium severity.
pub fn classify_message(msg: &str) -> (ErrorCategory, ErrorSeverity) {
    for rule in DEFAULT_RULES {
        if rule.substrings.iter().any(|s| msg.contains(s)) {
            return (rule.category, rule.severity);
        }
    }
    (ErrorCategory::Unknown, ErrorSeverity::Medium)
}
