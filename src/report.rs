//! [`SyncReport`]: the outcome of one sync run, returned on success and
//! also threaded through as errors are raised so the caller keeps whatever
//! log entries accumulated before the failure (spec 3, 8).

use serde::{Deserialize, Serialize};

/// Severity of one [`LogEntry`]. Kept as a closed enum rather than a
/// stringly-typed level so callers can match on it without parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One append-only entry in [`SyncReport::log`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
}

/// The result of a sync run: row counts per phase, view-creation outcome,
/// whether the business PK is standing in as the live table's main key
/// (spec 9 open question b), and an append-only log of notable events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Rows inserted during the incremental diff (excludes the initial
    /// bulk import path's inserts, counted separately as
    /// `initial_insert_count`).
    pub inserted_count: u64,
    pub updated_count: u64,
    pub deleted_count: u64,
    /// Rows inserted via the initial bulk import fast path, when the live
    /// table was empty at the start of the run.
    pub initial_insert_count: u64,
    /// Rows appended to the deletion log, when deletion logging is enabled.
    pub logged_deletions_count: u64,
    pub view_creation_attempted: bool,
    pub view_creation_successful: bool,
    /// Whether the pre-existing live table was accepted under the
    /// business-PK-as-main-PK exception rather than having its own
    /// `_syncer_id` column (spec 4.C, 9 open question b).
    pub is_using_business_pk_as_main_pk: bool,
    pub log: Vec<LogEntry>,
}

impl SyncReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry {
            severity: Severity::Info,
            message: message.into(),
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry {
            severity: Severity::Error,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entries_preserve_insertion_order_and_severity() {
        let mut report = SyncReport::new();
        report.info("starting sync");
        report.warn("unrecognized source type mapped to string");
        report.error("rollback attempted");

        assert_eq!(report.log.len(), 3);
        assert_eq!(report.log[0].severity, Severity::Info);
        assert_eq!(report.log[1].severity, Severity::Warning);
        assert_eq!(report.log[2].severity, Severity::Error);
        assert_eq!(report.log[1].message, "unrecognized source type mapped to string");
    }

    #[test]
    fn default_report_has_zeroed_counts() {
        let report = SyncReport::new();
        assert_eq!(report.inserted_count, 0);
        assert!(!report.is_using_business_pk_as_main_pk);
        assert!(report.log.is_empty());
    }
}
