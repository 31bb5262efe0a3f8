//! Error types for the table synchronization engine.
//!
//! Errors are grouped by the taxonomy the engine's failure modes actually
//! fall into: bad configuration (caught before any DML side effect),
//! introspection failures (wrapped with the source/database name), and
//! transient data-access failures from the underlying driver. Rollback and
//! cleanup failures are logged alongside — never in place of — the error
//! that triggered them; see [`SyncError::Rollback`].

use thiserror::Error;

/// Result type alias for table-syncer operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Errors the engine can surface.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Bad or missing column mapping, unknown column, non-existent source,
    /// or a pre-existing live table whose schema disagrees with the
    /// configuration. Always caught before any DML runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Source classification or column introspection failed. The message
    /// names the source object and, where known, the database.
    #[error("introspection failed for `{object}`: {message}")]
    Introspection { object: String, message: String },

    /// Any database call failing for reasons other than schema or
    /// configuration. Propagated to the caller after best-effort cleanup.
    #[error("database error: {0}")]
    DataAccess(#[from] sqlx::Error),

    /// A rollback attempt itself failed while handling `cause`. `cause` is
    /// the error that is re-raised; `rollback_error` is logged alongside it
    /// and never replaces it (spec 7.5).
    #[error("{cause} (additionally, rollback failed: {rollback_error})")]
    Rollback {
        cause: Box<SyncError>,
        rollback_error: String,
    },

    /// Any failure not already one of the typed variants above, wrapped
    /// with its cause chain preserved.
    #[error("sync failed: {0}")]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Build a [`SyncError::Configuration`] from a display-able message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Build a [`SyncError::Introspection`] naming the source object.
    pub fn introspection(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Introspection {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Wrap `self` as the preserved cause of a failed rollback attempt.
    #[must_use]
    pub fn with_rollback_failure(self, rollback_error: impl Into<String>) -> Self {
        Self::Rollback {
            cause: Box::new(self),
            rollback_error: rollback_error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_message_roundtrips() {
        let err = SyncError::configuration("missing primary key mapping");
        assert_eq!(err.to_string(), "configuration error: missing primary key mapping");
    }

    #[test]
    fn rollback_failure_preserves_original_cause() {
        let original = SyncError::configuration("bad live table");
        let wrapped = original.with_rollback_failure("connection reset");
        let msg = wrapped.to_string();
        assert!(msg.contains("bad live table"));
        assert!(msg.contains("connection reset"));
    }
}
