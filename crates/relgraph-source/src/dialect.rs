//! Dialect polymorphism.
//!
//! Rather than a trait per database family, the differences between
//! MySQL and PostgreSQL are kept as *data* on a single [`Dialect`] enum:
//! catalog query text, quoting rules, and default ports. The adapters in
//! [`crate::mysql`] and [`crate::postgres`] each hold one of these.

use tracing::warn;

use relgraph_common::{OperationTimeouts, RelGraphError, Result};

/// Usernames that look like an administrative account rather than a
/// scoped, read-only role.
const ADMIN_LIKE_USERNAMES: &[&str] = &["root", "admin", "postgres", "sa", "administrator"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
}

impl Dialect {
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        }
    }
}

/// Security policy enforced before a connection is established: timeouts
/// are mandatory, SSL mode is passed through to the driver, and a
/// plaintext connection to a non-loopback host is a fatal config error
/// rather than a logged warning.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    pub timeouts: OperationTimeouts,
    pub ssl_mode: SslMode,
    pub allow_plaintext_remote: bool,
    pub read_only_user_expected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Prefer,
    Require,
}

impl SecurityPolicy {
    /// Validates the policy against a target host and, if present, the
    /// connecting username. Missing timeouts or a plaintext connection to
    /// a non-loopback host are fatal; an admin-like username is only a
    /// logged warning, never a fatal error.
    pub fn validate(&self, host: &str, username: Option<&str>) -> Result<()> {
        self.timeouts
            .validate()
            .map_err(RelGraphError::ConfigError)?;

        let is_loopback = host == "localhost" || host == "127.0.0.1" || host == "::1";
        if self.ssl_mode == SslMode::Disable && !is_loopback && !self.allow_plaintext_remote {
            return Err(RelGraphError::SecurityPolicyViolation(format!(
                "refusing plaintext connection to non-loopback host '{host}'; set \
                 allow_plaintext_remote=true to override"
            )));
        }

        if self.read_only_user_expected {
            if let Some(user) = username {
                if ADMIN_LIKE_USERNAMES.iter().any(|a| a.eq_ignore_ascii_case(user)) {
                    warn!(
                        username = user,
                        "connecting with an admin-like username; a scoped read-only user is recommended"
                    );
                }
            }
        }
        Ok(())
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            timeouts: OperationTimeouts {
                connect_secs: 10,
                statement_secs: 30,
                query_secs: 60,
            },
            ssl_mode: SslMode::Prefer,
            allow_plaintext_remote: false,
            read_only_user_expected: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_differs_by_dialect() {
        assert_eq!(Dialect::MySql.quote_ident("order"), "`order`");
        assert_eq!(Dialect::Postgres.quote_ident("order"), "\"order\"");
    }

    #[test]
    fn plaintext_to_remote_host_is_rejected() {
        let policy = SecurityPolicy {
            ssl_mode: SslMode::Disable,
            ..SecurityPolicy::default()
        };
        assert!(policy.validate("db.example.com", None).is_err());
    }

    #[test]
    fn plaintext_to_loopback_is_allowed() {
        let policy = SecurityPolicy {
            ssl_mode: SslMode::Disable,
            ..SecurityPolicy::default()
        };
        assert!(policy.validate("localhost", None).is_ok());
    }

    #[test]
    fn admin_like_username_warns_but_does_not_fail() {
        let policy = SecurityPolicy::default();
        assert!(policy.validate("localhost", Some("root")).is_ok());
        assert!(policy.validate("localhost", Some("app_reader")).is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected_regardless_of_host() {
        let policy = SecurityPolicy {
            timeouts: OperationTimeouts {
                connect_secs: 0,
                statement_secs: 30,
                query_secs: 30,
            },
            ..SecurityPolicy::default()
        };
        assert!(policy.validate("localhost", None).is_err());
    }
}
