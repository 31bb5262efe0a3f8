//! The schema manager (spec 4.C): ensures the live, temp, and deletion-log
//! tables exist with the shape spec.md section 3 requires, and validates —
//! never alters — a pre-existing live table.

use std::collections::HashSet;

use indexmap::IndexMap;
use sqlx::any::AnyPool;
use sqlx::Row;
use tracing::info;

use crate::column::ColumnDefinition;
use crate::config::SyncConfig;
use crate::dialect::{Dialect, Engine};
use crate::error::{SyncError, SyncResult};
use crate::introspect::{self, Introspector};

/// Columns of the live table the engine owns, split out for clarity when
/// building `CREATE TABLE` / validation logic.
fn target_primary_key_columns(config: &SyncConfig) -> Vec<String> {
    config.primary_key_map.values().cloned().collect()
}

fn target_remaining_data_columns(config: &SyncConfig) -> Vec<String> {
    let pk_cols: HashSet<&str> = config.primary_key_map.values().map(String::as_str).collect();
    config
        .data_column_map
        .values()
        .filter(|c| !pk_cols.contains(c.as_str()))
        .cloned()
        .collect()
}

fn source_definition_for_target<'a>(
    config: &SyncConfig,
    source_columns: &'a IndexMap<String, ColumnDefinition>,
    target_col: &str,
) -> SyncResult<&'a ColumnDefinition> {
    let source_col = config.source_column_for_target(target_col).ok_or_else(|| {
        SyncError::configuration(format!("no source column maps to target column `{target_col}`"))
    })?;
    source_columns.get(source_col).ok_or_else(|| {
        SyncError::configuration(format!(
            "source column `{source_col}` (for target `{target_col}`) was not returned by introspection"
        ))
    })
}

/// Ensure the live table exists, creating it if absent or validating it if
/// present. Returns whether the pre-existing table is being accepted via
/// the `isUsingBusinessPkAsMainPk` exception (spec 4.C, 9 open question b).
///
/// # Errors
///
/// Returns [`SyncError::Configuration`] for any schema mismatch; the engine
/// never attempts to alter a pre-existing live table.
pub async fn ensure_live_table(
    pool: &AnyPool,
    engine: Engine,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    source_columns: &IndexMap<String, ColumnDefinition>,
) -> SyncResult<bool> {
    if introspect::table_exists(pool, engine, &config.live_table_name).await? {
        info!(live_table = %config.live_table_name, "live table exists, validating schema");
        return validate_existing_live_table(pool, engine, config).await;
    }

    let meta = &config.metadata_column_names;
    let mut columns = vec![
        ColumnDefinition::new(&meta.id, config.id_column_type).autoincrement(),
        ColumnDefinition::new(&meta.content_hash, config.hash_column_type)
            .with_length(config.hash_column_length)
            .not_null(),
        ColumnDefinition::new(&meta.created_at, crate::column::ColumnType::DateTime).not_null(),
        ColumnDefinition::new(&meta.updated_at, crate::column::ColumnType::DateTime),
        ColumnDefinition::new(&meta.created_revision_id, crate::column::ColumnType::BigInt).not_null(),
        ColumnDefinition::new(&meta.last_modified_revision_id, crate::column::ColumnType::BigInt).not_null(),
    ];

    for target_col in target_primary_key_columns(config) {
        let src = source_definition_for_target(config, source_columns, &target_col)?;
        columns.push(ColumnDefinition {
            name: target_col,
            not_null: true,
            ..src.without_autoincrement()
        });
    }
    for target_col in target_remaining_data_columns(config) {
        let src = source_definition_for_target(config, source_columns, &target_col)?;
        columns.push(ColumnDefinition {
            name: target_col,
            ..src.without_autoincrement()
        });
    }

    let column_sql = columns
        .iter()
        .map(|c| dialect.column_ddl(c))
        .collect::<Vec<_>>()
        .join(",\n    ");

    let pk_clause = if dialect.primary_key_is_inline() {
        String::new()
    } else {
        format!(",\n    PRIMARY KEY ({})", dialect.quote_ident(&meta.id))
    };

    let sql = format!(
        "CREATE TABLE {} (\n    {column_sql}{pk_clause}\n)",
        dialect.quote_ident(&config.live_table_name)
    );
    sqlx::query(&sql).execute(pool).await?;
    info!(live_table = %config.live_table_name, "created live table");
    Ok(false)
}

async fn validate_existing_live_table(pool: &AnyPool, engine: Engine, config: &SyncConfig) -> SyncResult<bool> {
    let introspector = Introspector::new();
    let existing = introspector
        .introspect(pool, engine, &config.live_table_name)
        .await
        .map_err(|e| SyncError::configuration(format!("could not introspect existing live table: {e}")))?;
    let pk_cols = introspect::primary_key_columns(pool, engine, &config.live_table_name).await?;

    let meta = &config.metadata_column_names;
    let target_pk_cols = target_primary_key_columns(config);
    let target_data_cols: Vec<String> = config.data_column_map.values().cloned().collect();

    let has_syncer_id = existing.contains_key(&meta.id);

    if !has_syncer_id && pk_cols == target_pk_cols {
        info!(live_table = %config.live_table_name, "live table validated under business-primary-key exception");
        return Ok(true);
    }

    if pk_cols != vec![meta.id.clone()] {
        return Err(SyncError::configuration(format!(
            "live table `{}` has primary key {:?}, expected exactly [{}] (or the business PK with no `{}` column)",
            config.live_table_name, pk_cols, meta.id, meta.id
        )));
    }

    for col in target_pk_cols
        .iter()
        .chain(target_data_cols.iter())
        .chain([
            &meta.id,
            &meta.content_hash,
            &meta.created_at,
            &meta.updated_at,
            &meta.created_revision_id,
            &meta.last_modified_revision_id,
        ])
    {
        if !existing.contains_key(col) {
            return Err(SyncError::configuration(format!(
                "live table `{}` is missing expected column `{col}`",
                config.live_table_name
            )));
        }
    }

    info!(live_table = %config.live_table_name, "live table schema validated");
    Ok(false)
}

/// Drop-if-exists then (re)create the temp table for this run.
///
/// # Errors
///
/// Returns [`SyncError::DataAccess`] if either statement fails, or
/// [`SyncError::Configuration`] if a business-PK or data column has no
/// corresponding introspected source column.
pub async fn prepare_temp_table(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    source_columns: &IndexMap<String, ColumnDefinition>,
) -> SyncResult<()> {
    drop_temp_table(pool, dialect, config).await?;

    let mut columns = Vec::new();
    let pk_cols = target_primary_key_columns(config);
    for target_col in &pk_cols {
        let src = source_definition_for_target(config, source_columns, target_col)?;
        columns.push(ColumnDefinition {
            name: target_col.clone(),
            not_null: true,
            ..src.without_autoincrement()
        });
    }
    for target_col in target_remaining_data_columns(config) {
        let src = source_definition_for_target(config, source_columns, &target_col)?;
        columns.push(ColumnDefinition {
            name: target_col,
            ..src.without_autoincrement()
        });
    }

    let meta = &config.metadata_column_names;
    columns.push(ColumnDefinition::new(&meta.content_hash, config.hash_column_type).with_length(config.hash_column_length));
    columns.push(
        ColumnDefinition::new(&meta.created_at, crate::column::ColumnType::DateTime)
            .not_null()
            .with_default(dialect.now_expr().to_string()),
    );

    let column_sql = columns
        .iter()
        .map(|c| dialect.column_ddl(c))
        .collect::<Vec<_>>()
        .join(",\n    ");

    let quoted_pk = pk_cols.iter().map(|c| dialect.quote_ident(c)).collect::<Vec<_>>().join(", ");
    let sql = format!(
        "CREATE TABLE {} (\n    {column_sql},\n    PRIMARY KEY ({quoted_pk})\n)",
        dialect.quote_ident(&config.temp_table_name)
    );
    sqlx::query(&sql).execute(pool).await?;
    info!(temp_table = %config.temp_table_name, "created temp table");
    Ok(())
}

/// Idempotent: `DROP TABLE IF EXISTS` against the temp table.
///
/// # Errors
///
/// Returns [`SyncError::DataAccess`] if the drop statement fails.
pub async fn drop_temp_table(pool: &AnyPool, dialect: &dyn Dialect, config: &SyncConfig) -> SyncResult<()> {
    sqlx::query(&dialect.drop_table_if_exists_sql(&config.temp_table_name))
        .execute(pool)
        .await?;
    Ok(())
}

/// Create the deletion-log table on first need. A no-op if it already
/// exists; the engine never validates its schema (spec 1 non-goals).
///
/// # Errors
///
/// Returns [`SyncError::DataAccess`] if table or index creation fails.
pub async fn ensure_deleted_log_table(
    pool: &AnyPool,
    engine: Engine,
    dialect: &dyn Dialect,
    config: &SyncConfig,
) -> SyncResult<()> {
    if introspect::table_exists(pool, engine, &config.deletion_log_table_name).await? {
        return Ok(());
    }

    let log_id = ColumnDefinition::new("log_id", crate::column::ColumnType::BigInt).autoincrement();
    let deleted_syncer_id = ColumnDefinition::new("deleted_syncer_id", config.id_column_type).not_null();
    let deleted_at_revision_id =
        ColumnDefinition::new("deleted_at_revision_id", crate::column::ColumnType::BigInt).not_null();
    let deletion_timestamp = ColumnDefinition::new("deletion_timestamp", crate::column::ColumnType::DateTime)
        .not_null()
        .with_default(dialect.now_expr().to_string());

    let columns = [log_id, deleted_syncer_id, deleted_at_revision_id, deletion_timestamp];
    let column_sql = columns
        .iter()
        .map(|c| dialect.column_ddl(c))
        .collect::<Vec<_>>()
        .join(",\n    ");
    let pk_clause = if dialect.primary_key_is_inline() {
        String::new()
    } else {
        format!(",\n    PRIMARY KEY ({})", dialect.quote_ident("log_id"))
    };

    let sql = format!(
        "CREATE TABLE {} (\n    {column_sql}{pk_clause}\n)",
        dialect.quote_ident(&config.deletion_log_table_name)
    );
    sqlx::query(&sql).execute(pool).await?;

    for (name, cols) in [
        (
            format!("idx_{}_deleted_syncer_id", config.deletion_log_table_name),
            vec!["deleted_syncer_id".to_string()],
        ),
        (
            format!("idx_{}_deleted_at_revision_id", config.deletion_log_table_name),
            vec!["deleted_at_revision_id".to_string()],
        ),
    ] {
        let name = crate::index::truncate_index_name(&name);
        sqlx::query(&dialect.create_index_sql(&name, &config.deletion_log_table_name, &cols, false))
            .execute(pool)
            .await?;
    }

    info!(log_table = %config.deletion_log_table_name, "created deletion log table");
    Ok(())
}

/// `SELECT COUNT(*) FROM live` — used by the orchestrator to decide
/// deferred-indexing timing and by the synchronizer to choose the initial
/// bulk import path.
///
/// # Errors
///
/// Returns [`SyncError::DataAccess`] if the count query fails.
pub async fn live_table_is_empty(pool: &AnyPool, dialect: &dyn Dialect, config: &SyncConfig) -> SyncResult<bool> {
    let row = sqlx::query(&format!(
        "SELECT COUNT(*) FROM {}",
        dialect.quote_ident(&config.live_table_name)
    ))
    .fetch_one(pool)
    .await?;
    let count: i64 = row.try_get(0)?;
    Ok(count == 0)
}
