//! The index manager (spec 4.F): idempotent index creation plus the live
//! table's deferred indexing rule — on the initial bulk import (live table
//! empty at the start of the run, rows inserted), indexes are created
//! *after* the import rather than maintained row-by-row during it.

use sha2::{Digest, Sha256};
use sqlx::any::AnyPool;
use tracing::warn;

use crate::dialect::Dialect;
use crate::error::SyncResult;

const MAX_INDEX_NAME_LEN: usize = 60;

/// Deterministically shorten a generated index name to fit common engine
/// limits (MySQL's 64-byte identifier cap, with room to spare), appending a
/// short content hash so two names that collide after truncation don't
/// collide after shortening too.
#[must_use]
pub fn truncate_index_name(name: &str) -> String {
    if name.len() <= MAX_INDEX_NAME_LEN {
        return name.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let suffix = hex::encode(&digest[..2]);
    let keep = MAX_INDEX_NAME_LEN - suffix.len() - 1;
    format!("{}_{suffix}", &name[..keep])
}

fn index_name(table: &str, columns: &[String], unique: bool) -> String {
    let prefix = if unique { "uidx" } else { "idx" };
    let cols = columns.join("_");
    truncate_index_name(&format!("{prefix}_{table}_{cols}"))
}

async fn index_exists(pool: &AnyPool, dialect: &dyn Dialect, table: &str, index_name: &str) -> SyncResult<bool> {
    let row = sqlx::query(&dialect.index_exists_sql(table, index_name))
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Create an index on `table`/`columns` unless one by the same generated
/// name already exists. Returns the (possibly truncated) name used.
///
/// # Errors
///
/// Returns [`crate::error::SyncError::DataAccess`] if the existence check
/// or the `CREATE INDEX` statement fails.
pub async fn ensure_index(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    table: &str,
    columns: &[String],
    unique: bool,
) -> SyncResult<String> {
    let name = index_name(table, columns, unique);
    if index_exists(pool, dialect, table, &name).await? {
        return Ok(name);
    }
    sqlx::query(&dialect.create_index_sql(&name, table, columns, unique))
        .execute(pool)
        .await?;
    Ok(name)
}

/// Index the freshly loaded temp table: a non-unique index on the joint
/// business-PK columns (the table's declared primary key already enforces
/// uniqueness) and a non-unique index on `contentHash`.
///
/// # Errors
///
/// Returns [`crate::error::SyncError::DataAccess`] if either index fails.
pub async fn index_temp_table(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    temp_table_name: &str,
    primary_key_columns: &[String],
    content_hash_column: &str,
) -> SyncResult<()> {
    ensure_index(pool, dialect, temp_table_name, primary_key_columns, false).await?;
    ensure_index(pool, dialect, temp_table_name, &[content_hash_column.to_string()], false).await?;
    Ok(())
}

/// Index the live table: a non-unique index on `contentHash`, and — only
/// when `metadataColumnNames.id` exists on the table — a unique index on
/// the joint business-PK columns. Called immediately when the live table
/// is non-empty at the start of a run, or deferred until after the initial
/// bulk import completes when it started empty (spec 4.F). A failure here
/// is logged on the report rather than propagated: the data is already
/// committed either way.
pub async fn index_live_table(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    live_table_name: &str,
    primary_key_columns: &[String],
    content_hash_column: &str,
    id_column_exists: bool,
    report: &mut crate::report::SyncReport,
) {
    if let Err(e) = ensure_index(pool, dialect, live_table_name, &[content_hash_column.to_string()], false).await {
        warn!(live_table = live_table_name, error = %e, "failed to create content-hash index");
        report.error(format!("failed to create content-hash index on `{live_table_name}`: {e}"));
    }
    if id_column_exists {
        if let Err(e) = ensure_index(pool, dialect, live_table_name, primary_key_columns, true).await {
            warn!(live_table = live_table_name, error = %e, "failed to create business-PK index");
            report.error(format!("failed to create business-PK index on `{live_table_name}`: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_left_untouched() {
        assert_eq!(truncate_index_name("idx_widgets_id"), "idx_widgets_id");
    }

    #[test]
    fn long_names_are_truncated_with_hash_suffix() {
        let long_table = "a".repeat(80);
        let name = index_name(&long_table, &["region".to_string(), "sku".to_string()], true);
        assert!(name.len() <= MAX_INDEX_NAME_LEN);
        assert!(name.starts_with("uidx_aaa"));
    }

    #[test]
    fn truncated_names_differing_only_past_the_cutoff_still_diverge() {
        let a = format!("idx_{}", "x".repeat(80));
        let b = format!("idx_{}", "y".repeat(80));
        assert_ne!(truncate_index_name(&a), truncate_index_name(&b));
    }
}
