//! Unified error model for the bootstrapper.
//! Every adapter, reconciler and the CLI frontend report failures through
//! `BootstrapError`, which carries enough context (backend, scope, resource) for an
//! operator to fix the root cause and re-run the same idempotent command.

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// The three provisioned backends, in their fixed bootstrap order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Backend {
    Database,
    Storage,
    Gis,
}

impl Backend {
    pub const ORDERED: [Backend; 3] = [Backend::Database, Backend::Storage, Backend::Gis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Database => "database",
            Backend::Storage => "storage",
            Backend::Gis => "gis",
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error [{key}]: {message}")]
    Config { key: String, message: String },

    #[error("invalid {kind} {value:?}: {reason}")]
    InvalidIdentifier { kind: &'static str, value: String, reason: String },

    #[error("could not connect to {backend}: {message}")]
    Connectivity { backend: Backend, message: String },

    #[error("{backend} rejected {operation}{}: {detail}", status_suffix(.status))]
    Rejected {
        backend: Backend,
        operation: String,
        status: Option<String>,
        detail: String,
    },

    #[error("{backend} step failed for {scope} ({kind} {name:?}): {source}")]
    Step {
        backend: Backend,
        scope: String,
        kind: String,
        name: String,
        #[source]
        source: Box<BootstrapError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;

fn status_suffix(status: &Option<String>) -> String {
    status.as_deref().map(|s| format!(" ({s})")).unwrap_or_default()
}

impl BootstrapError {
    pub fn config<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        BootstrapError::Config { key: key.into(), message: message.into() }
    }

    pub fn invalid<V: Into<String>, R: Into<String>>(kind: &'static str, value: V, reason: R) -> Self {
        BootstrapError::InvalidIdentifier { kind, value: value.into(), reason: reason.into() }
    }

    pub fn connectivity<M: Into<String>>(backend: Backend, message: M) -> Self {
        BootstrapError::Connectivity { backend, message: message.into() }
    }

    pub fn rejected<O: Into<String>, D: Into<String>>(
        backend: Backend,
        operation: O,
        status: Option<String>,
        detail: D,
    ) -> Self {
        BootstrapError::Rejected { backend, operation: operation.into(), status, detail: detail.into() }
    }

    pub fn internal<M: Into<String>>(message: M) -> Self {
        BootstrapError::Internal(message.into())
    }

    /// Wrap a failure with the reconciliation step it interrupted.
    pub fn in_step(self, backend: Backend, scope: &str, kind: &str, name: &str) -> Self {
        BootstrapError::Step {
            backend,
            scope: scope.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through `Step` wrappers.
    pub fn root(&self) -> &BootstrapError {
        match self {
            BootstrapError::Step { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn code_str(&self) -> &'static str {
        match self.root() {
            BootstrapError::Config { .. } => "config_error",
            BootstrapError::InvalidIdentifier { .. } => "invalid_identifier",
            BootstrapError::Connectivity { .. } => "connectivity_error",
            BootstrapError::Rejected { .. } => "backend_rejected",
            BootstrapError::Io(_) => "io_error",
            BootstrapError::Internal(_) | BootstrapError::Step { .. } => "internal_error",
        }
    }

    /// Process exit code for the CLI frontend.
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            BootstrapError::Config { .. } | BootstrapError::InvalidIdentifier { .. } => 2,
            BootstrapError::Connectivity { .. } => 3,
            BootstrapError::Rejected { .. } => 4,
            BootstrapError::Io(_) | BootstrapError::Internal(_) | BootstrapError::Step { .. } => 1,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self.root(), BootstrapError::Config { .. })
    }
}

impl From<tokio_postgres::Error> for BootstrapError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Server-side errors carry a SQLSTATE; everything else is the wire going away
        match err.as_db_error() {
            Some(db) => BootstrapError::Rejected {
                backend: Backend::Database,
                operation: "statement".into(),
                status: Some(db.code().code().to_string()),
                detail: db.message().to_string(),
            },
            None => BootstrapError::connectivity(Backend::Database, err.to_string()),
        }
    }
}

impl From<reqwest::Error> for BootstrapError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            return BootstrapError::connectivity(Backend::Gis, err.to_string());
        }
        BootstrapError::Rejected {
            backend: Backend::Gis,
            operation: err.url().map(|u| u.path().to_string()).unwrap_or_else(|| "request".into()),
            status: err.status().map(|s| s.as_u16().to_string()),
            detail: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BootstrapError {
    fn from(err: serde_json::Error) -> Self {
        BootstrapError::Internal(format!("malformed json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_mapping() {
        assert_eq!(BootstrapError::config("db.host", "missing").exit_code(), 2);
        assert_eq!(BootstrapError::invalid("department", "a b", "space").exit_code(), 2);
        assert_eq!(BootstrapError::connectivity(Backend::Database, "refused").exit_code(), 3);
        assert_eq!(BootstrapError::rejected(Backend::Gis, "POST /x", Some("500".into()), "boom").exit_code(), 4);
        assert_eq!(BootstrapError::internal("oops").exit_code(), 1);
    }

    #[test]
    fn step_wrapper_reports_root_cause() {
        let err = BootstrapError::config("lsd-department.geoserver_password", "missing")
            .in_step(Backend::Gis, "lsd", "datastore", "dominode_db_lsd");
        assert!(err.is_config());
        assert_eq!(err.code_str(), "config_error");
        assert_eq!(err.exit_code(), 2);
        let text = err.to_string();
        assert!(text.contains("gis step failed for lsd"), "{text}");
        assert!(text.contains("dominode_db_lsd"), "{text}");
    }

    #[test]
    fn rejected_display_includes_status_when_present() {
        let with = BootstrapError::rejected(Backend::Storage, "admin user add", Some("exit 1".into()), "denied");
        assert_eq!(with.to_string(), "storage rejected admin user add (exit 1): denied");
        let without = BootstrapError::rejected(Backend::Storage, "admin user add", None, "denied");
        assert_eq!(without.to_string(), "storage rejected admin user add: denied");
    }
}
