//! Unified error taxonomy for relgraph.
//!
//! Each variant names a failure kind with a fixed propagation policy (fatal
//! vs. logged-and-skipped) decided by the *caller*, not by this type. This
//! type only carries the classification and a human remediation hint.

use thiserror::Error;

/// Result type alias used throughout the relgraph crates.
pub type Result<T> = std::result::Result<T, RelGraphError>;

/// Unified error type for all relgraph operations.
#[derive(Error, Debug, Clone)]
pub enum RelGraphError {
    /// Missing required field, invalid YAML, or otherwise malformed config.
    /// Always fatal at startup.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Source or graph store unreachable. Fatal to the current operation,
    /// retryable by the caller.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Weak password, disallowed admin user, plaintext link on a public
    /// address. Fatal to connect.
    #[error("security policy violation: {0}")]
    SecurityPolicyViolation(String),

    /// Per-table introspection failure. Logged; the table is skipped and
    /// analysis continues.
    #[error("schema error: {0}")]
    SchemaError(String),

    /// Missing `id`/`name`, unresolvable relationship endpoint, invalid
    /// mapping. Logged; the item is skipped and the run continues.
    #[error("transform error: {0}")]
    TransformError(String),

    /// One instrumentation view unavailable. Logged at warn; the snapshot
    /// is emitted without that family.
    #[error("metric family error: {0}")]
    MetricFamilyError(String),

    /// External benchmark tool missing or exited non-zero.
    #[error("benchmark error: {0}")]
    BenchmarkError(String),

    /// Malformed client frame on the realtime channel. The session is
    /// closed; other sessions are unaffected.
    #[error("realtime protocol error: {0}")]
    RealtimeProtocolError(String),

    /// Transient condition that may succeed on retry (deadlock, timeout,
    /// serialization failure).
    #[error("transient error: {0}")]
    Transient(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelGraphError {
    /// Returns true if a caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelGraphError::Transient(_) | RelGraphError::ConnectionError(_)
        )
    }

    /// Returns true if the failure is fatal to the current operation and
    /// must propagate rather than be logged-and-skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelGraphError::ConfigError(_)
                | RelGraphError::ConnectionError(_)
                | RelGraphError::SecurityPolicyViolation(_)
        )
    }

    /// A short, user-facing remediation sentence, when one applies.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            RelGraphError::SecurityPolicyViolation(msg) if msg.contains("plaintext") => {
                Some("set sslmode to require or stronger, or connect over a private network")
            }
            RelGraphError::SecurityPolicyViolation(msg)
                if msg.contains("root") || msg.contains("admin") =>
            {
                Some("use a dedicated read-only database user instead of an administrative account")
            }
            RelGraphError::ConnectionError(_) => {
                Some("verify the connection string and that the server accepts connections from this host")
            }
            RelGraphError::SchemaError(_) => {
                Some("this table was skipped; rerun analysis after resolving its introspection error")
            }
            RelGraphError::TransformError(msg) if msg.contains("row_limit") => {
                Some("reduce row_limit_per_table or narrow the table's predicate filter")
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RelGraphError {
    fn from(err: serde_json::Error) -> Self {
        RelGraphError::ConfigError(format!("JSON error: {err}"))
    }
}

impl From<serde_yaml::Error> for RelGraphError {
    fn from(err: serde_yaml::Error) -> Self {
        RelGraphError::ConfigError(format!("YAML error: {err}"))
    }
}

#[cfg(feature = "sqlx-errors")]
impl From<sqlx::Error> for RelGraphError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error;
        match &err {
            Error::Configuration(_) => RelGraphError::ConfigError(err.to_string()),
            Error::Database(db_err) => {
                // Classify PostgreSQL SQLSTATE / MySQL error codes where present.
                // See https://www.postgresql.org/docs/current/errcodes-appendix.html
                if let Some(code) = db_err.code() {
                    let code_str: &str = &code;
                    match code_str {
                        "40P01" => return RelGraphError::Transient(err.to_string()),
                        "40001" => return RelGraphError::Transient(err.to_string()),
                        code if code.starts_with("40") => {
                            return RelGraphError::Transient(err.to_string())
                        }
                        code if code.starts_with("08") => {
                            return RelGraphError::ConnectionError(err.to_string())
                        }
                        "57P01" | "57P02" | "57P03" => {
                            return RelGraphError::Transient(err.to_string())
                        }
                        _ => {}
                    }
                }
                RelGraphError::SchemaError(err.to_string())
            }
            Error::Io(_) | Error::Tls(_) | Error::Protocol(_) => {
                RelGraphError::ConnectionError(err.to_string())
            }
            Error::PoolTimedOut => {
                RelGraphError::Transient("connection pool timed out".to_string())
            }
            Error::PoolClosed => {
                RelGraphError::ConnectionError("connection pool closed".to_string())
            }
            Error::RowNotFound => RelGraphError::TransformError("row not found".to_string()),
            Error::ColumnNotFound(_) | Error::ColumnIndexOutOfBounds { .. } => {
                RelGraphError::TransformError(err.to_string())
            }
            Error::ColumnDecode { .. } | Error::Decode(_) | Error::TypeNotFound { .. } => {
                RelGraphError::TransformError(err.to_string())
            }
            Error::WorkerCrashed => RelGraphError::Internal("worker thread crashed".to_string()),
            _ => RelGraphError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_and_security_errors_are_fatal() {
        assert!(RelGraphError::ConfigError("x".into()).is_fatal());
        assert!(RelGraphError::SecurityPolicyViolation("x".into()).is_fatal());
        assert!(RelGraphError::ConnectionError("x".into()).is_fatal());
        assert!(!RelGraphError::SchemaError("x".into()).is_fatal());
        assert!(!RelGraphError::TransformError("x".into()).is_fatal());
    }

    #[test]
    fn transient_and_connection_errors_are_retryable() {
        assert!(RelGraphError::Transient("x".into()).is_retryable());
        assert!(RelGraphError::ConnectionError("x".into()).is_retryable());
        assert!(!RelGraphError::SchemaError("x".into()).is_retryable());
    }

    #[test]
    fn remediation_mentions_sslmode_for_plaintext() {
        let err =
            RelGraphError::SecurityPolicyViolation("plaintext connection to public host".to_string());
        assert!(err.remediation().unwrap().contains("sslmode"));
    }

    #[test]
    fn display_matches_taxonomy_name() {
        let err = RelGraphError::SchemaError("FK introspection failed".to_string());
        assert_eq!(err.to_string(), "schema error: FK introspection failed");
    }
}
