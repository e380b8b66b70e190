use std::fmt;

use serde::{Deserialize, Serialize};

/// A closed set of diagnostic categories (spec §7: "a closed set"). The
/// named categories from §7 come first; the remainder is the "long tail
/// for observability" the spec calls for, covering diagnostics common
/// enough to be worth a dedicated label rather than falling through to
/// [`ErrorCategory::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum ErrorCategory {
    AccessDenied,
    ObjectNotFound,
    ConstraintViolation,
    Syntax,
    Connection,
    Timeout,
    Deadlock,
    LockWait,
    Network,
    ResourceExhausted,
    SecurityViolation,
    Validation,
    DataIntegrity,
    Configuration,
    Ssl,
    Replication,
    Backup,
    ImportExport,

    // --- long tail ---
    AuthenticationFailed,
    AuthorizationFailed,
    InvalidCredentials,
    PermissionDenied,
    AccountLocked,
    PasswordExpired,
    InsufficientPrivileges,

    ConnectionRefused,
    ConnectionReset,
    ConnectionLost,
    NetworkUnreachable,
    HostUnreachable,
    DnsResolutionFailed,
    TooManyConnections,
    ConnectionPoolExhausted,

    TransactionRollback,
    TransactionAborted,
    SerializationFailure,
    OptimisticLockFailure,

    ParseError,
    InvalidQuery,
    UnsupportedOperation,
    InvalidIdentifier,
    AmbiguousColumn,

    TableNotFound,
    ColumnNotFound,
    UnknownDatabase,
    SchemaMismatch,
    IndexNotFound,
    ViewNotFound,

    DuplicateEntry,
    ForeignKeyViolation,
    CheckConstraintViolation,
    NotNullViolation,
    UniqueViolation,
    DataTruncation,
    DataTypeMismatch,

    DiskExhausted,
    MemoryExhausted,
    TooManyOpenFiles,
    QuotaExceeded,
    TempSpaceExhausted,

    QueryTimeout,
    StatementTimeout,
    OperationCancelled,

    InvalidConfiguration,
    MissingConfiguration,

    CertificateError,
    TlsHandshakeFailed,

    BinlogError,
    ReplicationLagExceeded,
    ReplicaNotReady,

    BackupFailed,
    ImportValidationFailed,
    ImportDuplicateKey,

    InvalidArgument,
    InvalidParameter,

    InternalError,
    Unavailable,
    ServiceDegraded,
    RateLimited,
    Throttled,
    MaintenanceMode,
    VersionMismatch,
    FeatureNotSupported,
    Deserialization,

    Unknown,
}

impl ErrorCategory {
    /// Transient conditions that are expected to self-resolve (spec §7
    /// "recoverable"): timeout/network/connection/rate-limit/deadlock/
    /// lock-wait/resource exhaustion and certain diagnostic categories.
    pub fn is_recoverable(self) -> bool {
        use ErrorCategory::*;
        matches!(
            self,
            Timeout
                | QueryTimeout
                | StatementTimeout
                | Connection
                | ConnectionRefused
                | ConnectionReset
                | ConnectionLost
                | NetworkUnreachable
                | HostUnreachable
                | DnsResolutionFailed
                | TooManyConnections
                | ConnectionPoolExhausted
                | Network
                | Deadlock
                | LockWait
                | SerializationFailure
                | OptimisticLockFailure
                | ResourceExhausted
                | DiskExhausted
                | MemoryExhausted
                | TooManyOpenFiles
                | QuotaExceeded
                | TempSpaceExhausted
                | RateLimited
                | Throttled
                | Unavailable
                | ServiceDegraded
                | MaintenanceMode
                | ReplicaNotReady
                | ReplicationLagExceeded
        )
    }

    /// The subset of recoverable categories for which a mechanical retry
    /// is actually sensible (spec §7 "retryable"). Resource exhaustion is
    /// recoverable in principle but a bare retry rarely helps before the
    /// underlying pressure eases, so it is excluded here; the recovery
    /// wrapper's backoff is meant for transient contention, not capacity
    /// problems.
    pub fn is_retryable(self) -> bool {
        use ErrorCategory::*;
        matches!(
            self,
            Timeout
                | QueryTimeout
                | StatementTimeout
                | Connection
                | ConnectionRefused
                | ConnectionReset
                | ConnectionLost
                | NetworkUnreachable
                | HostUnreachable
                | DnsResolutionFailed
                | TooManyConnections
                | ConnectionPoolExhausted
                | Network
                | Deadlock
                | LockWait
                | SerializationFailure
                | OptimisticLockFailure
                | RateLimited
                | Throttled
                | Unavailable
                | ServiceDegraded
                | ReplicaNotReady
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::AccessDenied => "access-denied",
            ErrorCategory::ObjectNotFound => "object-not-found",
            ErrorCategory::ConstraintViolation => "constraint-violation",
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Connection => "connection",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Deadlock => "deadlock",
            ErrorCategory::LockWait => "lock-wait",
            ErrorCategory::Network => "network",
            ErrorCategory::ResourceExhausted => "resource-exhausted",
            ErrorCategory::SecurityViolation => "security-violation",
            ErrorCategory::Validation => "validation",
            ErrorCategory::DataIntegrity => "data-integrity",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Ssl => "ssl",
            ErrorCategory::Replication => "replication",
            ErrorCategory::Backup => "backup",
            ErrorCategory::ImportExport => "import-export",
            ErrorCategory::AuthenticationFailed => "authentication-failed",
            ErrorCategory::AuthorizationFailed => "authorization-failed",
            ErrorCategory::InvalidCredentials => "invalid-credentials",
            ErrorCategory::PermissionDenied => "permission-denied",
            ErrorCategory::AccountLocked => "account-locked",
            ErrorCategory::PasswordExpired => "password-expired",
            ErrorCategory::InsufficientPrivileges => "insufficient-privileges",
            ErrorCategory::ConnectionRefused => "connection-refused",
            ErrorCategory::ConnectionReset => "connection-reset",
            ErrorCategory::ConnectionLost => "connection-lost",
            ErrorCategory::NetworkUnreachable => "network-unreachable",
            ErrorCategory::HostUnreachable => "host-unreachable",
            ErrorCategory::DnsResolutionFailed => "dns-resolution-failed",
            ErrorCategory::TooManyConnections => "too-many-connections",
            ErrorCategory::ConnectionPoolExhausted => "connection-pool-exhausted",
            ErrorCategory::TransactionRollback => "transaction-rollback",
            ErrorCategory::TransactionAborted => "transaction-aborted",
            ErrorCategory::SerializationFailure => "serialization-failure",
            ErrorCategory::OptimisticLockFailure => "optimistic-lock-failure",
            ErrorCategory::ParseError => "parse-error",
            ErrorCategory::InvalidQuery => "invalid-query",
            ErrorCategory::UnsupportedOperation => "unsupported-operation",
            ErrorCategory::InvalidIdentifier => "invalid-identifier",
            ErrorCategory::AmbiguousColumn => "ambiguous-column",
            ErrorCategory::TableNotFound => "table-not-found",
            ErrorCategory::ColumnNotFound => "column-not-found",
            ErrorCategory::UnknownDatabase => "unknown-database",
            ErrorCategory::SchemaMismatch => "schema-mismatch",
            ErrorCategory::IndexNotFound => "index-not-found",
            ErrorCategory::ViewNotFound => "view-not-found",
            ErrorCategory::DuplicateEntry => "duplicate-entry",
            ErrorCategory::ForeignKeyViolation => "foreign-key-violation",
            ErrorCategory::CheckConstraintViolation => "check-constraint-violation",
            ErrorCategory::NotNullViolation => "not-null-violation",
            ErrorCategory::UniqueViolation => "unique-violation",
            ErrorCategory::DataTruncation => "data-truncation",
            ErrorCategory::DataTypeMismatch => "data-type-mismatch",
            ErrorCategory::DiskExhausted => "disk-exhausted",
            ErrorCategory::MemoryExhausted => "memory-exhausted",
            ErrorCategory::TooManyOpenFiles => "too-many-open-files",
            ErrorCategory::QuotaExceeded => "quota-exceeded",
            ErrorCategory::TempSpaceExhausted => "temp-space-exhausted",
            ErrorCategory::QueryTimeout => "query-timeout",
            ErrorCategory::StatementTimeout => "statement-timeout",
            ErrorCategory::OperationCancelled => "operation-cancelled",
            ErrorCategory::InvalidConfiguration => "invalid-configuration",
            ErrorCategory::MissingConfiguration => "missing-configuration",
            ErrorCategory::CertificateError => "certificate-error",
            ErrorCategory::TlsHandshakeFailed => "tls-handshake-failed",
            ErrorCategory::BinlogError => "binlog-error",
            ErrorCategory::ReplicationLagExceeded => "replication-lag-exceeded",
            ErrorCategory::ReplicaNotReady => "replica-not-ready",
            ErrorCategory::BackupFailed => "backup-failed",
            ErrorCategory::ImportValidationFailed => "import-validation-failed",
            ErrorCategory::ImportDuplicateKey => "import-duplicate-key",
            ErrorCategory::InvalidArgument => "invalid-argument",
            ErrorCategory::InvalidParameter => "invalid-parameter",
            ErrorCategory::InternalError => "internal-error",
            ErrorCategory::Unavailable => "unavailable",
            ErrorCategory::ServiceDegraded => "service-degraded",
            ErrorCategory::RateLimited => "rate-limited",
            ErrorCategory::Throttled => "throttled",
            ErrorCategory::MaintenanceMode => "maintenance-mode",
            ErrorCategory::VersionMismatch => "version-mismatch",
            ErrorCategory::FeatureNotSupported => "feature-not-supported",
            ErrorCategory::Deserialization => "deserialization",
            ErrorCategory::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}
