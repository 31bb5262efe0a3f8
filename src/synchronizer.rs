//! The temp-to-live synchronizer (spec 4.G): the transactional diff that
//! applies either the initial bulk import or the update/delete/insert set,
//! in that fixed order, against the live table.
//!
//! Transaction discipline follows the "did I start this?" design note
//! (spec 9): [`synchronize`] always begins and ends its own transaction;
//! [`synchronize_within_transaction`] never does, trusting the caller's
//! already-open transaction on the connection it hands in. The boolean is
//! threaded explicitly through [`run_with_transaction_control`] rather than
//! inferred from connection state.

use sqlx::any::{AnyConnection, AnyPool};
use sqlx::Row;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::dialect::{Dialect, Engine, JoinKeys};
use crate::error::{SyncError, SyncResult};
use crate::report::SyncReport;

fn all_target_data_columns(config: &SyncConfig) -> Vec<String> {
    config.data_column_map.values().cloned().collect()
}

fn target_primary_key_columns(config: &SyncConfig) -> Vec<String> {
    config.primary_key_map.values().cloned().collect()
}

async fn probe_live_is_empty(conn: &mut AnyConnection, dialect: &dyn Dialect, config: &SyncConfig) -> SyncResult<bool> {
    let row = sqlx::query(&format!(
        "SELECT COUNT(*) FROM {}",
        dialect.quote_ident(&config.live_table_name)
    ))
    .fetch_one(&mut *conn)
    .await?;
    let count: i64 = row.try_get(0)?;
    Ok(count == 0)
}

async fn run_initial_bulk_import(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    revision_id: i64,
    report: &mut SyncReport,
) -> SyncResult<()> {
    let meta = &config.metadata_column_names;
    let data_cols = all_target_data_columns(config);
    let select_cols = data_cols
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_cols = format!(
        "{select_cols}, {}, {}, {}, {}",
        dialect.quote_ident(&meta.content_hash),
        dialect.quote_ident(&meta.created_at),
        dialect.quote_ident(&meta.created_revision_id),
        dialect.quote_ident(&meta.last_modified_revision_id)
    );

    let (binds, _) = dialect.bind_placeholders(1, 2);
    let sql = format!(
        "INSERT INTO {} ({insert_cols}) SELECT {select_cols}, {}, {}, {}, {} FROM {}",
        dialect.quote_ident(&config.live_table_name),
        dialect.quote_ident(&meta.content_hash),
        dialect.quote_ident(&meta.created_at),
        binds[0],
        binds[1],
        dialect.quote_ident(&config.temp_table_name)
    );

    let result = sqlx::query(&sql)
        .bind(revision_id)
        .bind(revision_id)
        .execute(&mut *conn)
        .await?;
    report.initial_insert_count = result.rows_affected();
    info!(
        live_table = %config.live_table_name,
        rows = report.initial_insert_count,
        "initial bulk import complete"
    );
    report.info(format!(
        "initial bulk import inserted {} row(s) into `{}`",
        report.initial_insert_count, config.live_table_name
    ));
    Ok(())
}

async fn run_update(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    pk_cols: &[String],
    revision_id: i64,
    report: &mut SyncReport,
) -> SyncResult<()> {
    let meta = &config.metadata_column_names;
    let data_cols = all_target_data_columns(config);
    let join_pred = JoinKeys {
        left_alias: "live",
        right_alias: "temp",
        columns: pk_cols,
    }
    .predicate(dialect);
    let revision_bind = dialect.bind_placeholder(1);

    let sql = if dialect.supports_join_dml() {
        let set_clauses = data_cols
            .iter()
            .map(|c| format!("live.{0} = temp.{0}", dialect.quote_ident(c)))
            .chain([
                format!(
                    "live.{0} = temp.{0}",
                    dialect.quote_ident(&meta.content_hash)
                ),
                format!("live.{} = {}", dialect.quote_ident(&meta.updated_at), dialect.now_expr()),
                format!("live.{} = {revision_bind}", dialect.quote_ident(&meta.last_modified_revision_id)),
            ])
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} AS live JOIN {} AS temp ON {join_pred} SET {set_clauses} WHERE live.{} <> temp.{}",
            dialect.quote_ident(&config.live_table_name),
            dialect.quote_ident(&config.temp_table_name),
            dialect.quote_ident(&meta.content_hash),
            dialect.quote_ident(&meta.content_hash)
        )
    } else {
        let set_clauses = data_cols
            .iter()
            .map(|c| format!("{0} = temp.{0}", dialect.quote_ident(c)))
            .chain([
                format!(
                    "{0} = temp.{0}",
                    dialect.quote_ident(&meta.content_hash)
                ),
                format!("{} = {}", dialect.quote_ident(&meta.updated_at), dialect.now_expr()),
                format!("{} = {revision_bind}", dialect.quote_ident(&meta.last_modified_revision_id)),
            ])
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} AS live SET {set_clauses} FROM {} AS temp WHERE {join_pred} AND live.{} <> temp.{}",
            dialect.quote_ident(&config.live_table_name),
            dialect.quote_ident(&config.temp_table_name),
            dialect.quote_ident(&meta.content_hash),
            dialect.quote_ident(&meta.content_hash)
        )
    };

    let result = sqlx::query(&sql).bind(revision_id).execute(&mut *conn).await?;
    report.updated_count = result.rows_affected();
    info!(live_table = %config.live_table_name, rows = report.updated_count, "update phase complete");
    Ok(())
}

async fn run_deletion_logging(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    pk_cols: &[String],
    revision_id: i64,
    report: &mut SyncReport,
) -> SyncResult<()> {
    if !config.enable_deletion_logging {
        return Ok(());
    }
    let meta = &config.metadata_column_names;
    let join_pred = JoinKeys {
        left_alias: "lt",
        right_alias: "tt",
        columns: pk_cols,
    }
    .predicate(dialect);
    let first_pk = dialect.quote_ident(&pk_cols[0]);
    let revision_bind = dialect.bind_placeholder(1);

    let sql = format!(
        "INSERT INTO {} ({}, {}, {}) SELECT lt.{}, {revision_bind}, {} FROM {} AS lt LEFT JOIN {} AS tt ON {join_pred} WHERE tt.{first_pk} IS NULL",
        dialect.quote_ident(&config.deletion_log_table_name),
        dialect.quote_ident("deleted_syncer_id"),
        dialect.quote_ident("deleted_at_revision_id"),
        dialect.quote_ident("deletion_timestamp"),
        dialect.quote_ident(&meta.id),
        dialect.now_expr(),
        dialect.quote_ident(&config.live_table_name),
        dialect.quote_ident(&config.temp_table_name),
    );

    let result = sqlx::query(&sql).bind(revision_id).execute(&mut *conn).await?;
    report.logged_deletions_count = result.rows_affected();
    info!(log_table = %config.deletion_log_table_name, rows = report.logged_deletions_count, "deletion logging complete");
    Ok(())
}

async fn run_delete(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    pk_cols: &[String],
    report: &mut SyncReport,
) -> SyncResult<()> {
    let first_pk = dialect.quote_ident(&pk_cols[0]);

    let sql = if dialect.supports_join_dml() {
        let join_pred = JoinKeys {
            left_alias: "live",
            right_alias: "temp",
            columns: pk_cols,
        }
        .predicate(dialect);
        format!(
            "DELETE live FROM {} AS live LEFT JOIN {} AS temp ON {join_pred} WHERE temp.{first_pk} IS NULL",
            dialect.quote_ident(&config.live_table_name),
            dialect.quote_ident(&config.temp_table_name)
        )
    } else {
        let join_pred = JoinKeys {
            left_alias: "live",
            right_alias: "temp",
            columns: pk_cols,
        }
        .predicate(dialect);
        format!(
            "DELETE FROM {} AS live WHERE NOT EXISTS (SELECT 1 FROM {} AS temp WHERE {join_pred})",
            dialect.quote_ident(&config.live_table_name),
            dialect.quote_ident(&config.temp_table_name)
        )
    };

    let result = sqlx::query(&sql).execute(&mut *conn).await?;
    report.deleted_count = result.rows_affected();
    info!(live_table = %config.live_table_name, rows = report.deleted_count, "delete phase complete");
    Ok(())
}

async fn run_insert(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    pk_cols: &[String],
    revision_id: i64,
    report: &mut SyncReport,
) -> SyncResult<()> {
    let meta = &config.metadata_column_names;
    let data_cols = all_target_data_columns(config);
    let select_cols = data_cols
        .iter()
        .map(|c| format!("temp.{}", dialect.quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_cols = data_cols
        .iter()
        .map(|c| dialect.quote_ident(c))
        .chain([
            dialect.quote_ident(&meta.content_hash),
            dialect.quote_ident(&meta.created_at),
            dialect.quote_ident(&meta.created_revision_id),
            dialect.quote_ident(&meta.last_modified_revision_id),
        ])
        .collect::<Vec<_>>()
        .join(", ");
    let first_pk = dialect.quote_ident(&pk_cols[0]);
    let join_pred = JoinKeys {
        left_alias: "temp",
        right_alias: "live",
        columns: pk_cols,
    }
    .predicate(dialect);

    let (binds, _) = dialect.bind_placeholders(1, 2);
    let sql = format!(
        "INSERT INTO {} ({insert_cols}) SELECT {select_cols}, temp.{}, temp.{}, {}, {} FROM {} AS temp LEFT JOIN {} AS live ON {join_pred} WHERE live.{first_pk} IS NULL",
        dialect.quote_ident(&config.live_table_name),
        dialect.quote_ident(&meta.content_hash),
        dialect.quote_ident(&meta.created_at),
        binds[0],
        binds[1],
        dialect.quote_ident(&config.temp_table_name),
        dialect.quote_ident(&config.live_table_name),
    );

    let result = sqlx::query(&sql)
        .bind(revision_id)
        .bind(revision_id)
        .execute(&mut *conn)
        .await?;
    report.inserted_count = result.rows_affected();
    info!(live_table = %config.live_table_name, rows = report.inserted_count, "insert phase complete");
    Ok(())
}

async fn run_diff(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    revision_id: i64,
    is_using_business_pk_as_main_pk: bool,
    report: &mut SyncReport,
) -> SyncResult<()> {
    if is_using_business_pk_as_main_pk {
        warn!(live_table = %config.live_table_name, "refusing diff: live table uses business primary key as main key");
        return Err(SyncError::configuration(format!(
            "live table `{}` has no `{}` column; its business primary key stands in as the main key, and the synchronizer's insert paths cannot safely name `{}` in that configuration (spec open question b) — refusing to write",
            config.live_table_name, config.metadata_column_names.id, config.metadata_column_names.id
        )));
    }

    let pk_cols = target_primary_key_columns(config);

    if probe_live_is_empty(conn, dialect, config).await? {
        info!(live_table = %config.live_table_name, "live table empty, running initial bulk import");
        run_initial_bulk_import(conn, dialect, config, revision_id, report).await?;
        return Ok(());
    }

    run_update(conn, dialect, config, &pk_cols, revision_id, report).await?;
    run_deletion_logging(conn, dialect, config, &pk_cols, revision_id, report).await?;
    run_delete(conn, dialect, config, &pk_cols, report).await?;
    run_insert(conn, dialect, config, &pk_cols, revision_id, report).await?;
    Ok(())
}

async fn run_with_transaction_control(
    conn: &mut AnyConnection,
    started_transaction: bool,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    revision_id: i64,
    is_using_business_pk_as_main_pk: bool,
    report: &mut SyncReport,
) -> SyncResult<()> {
    if started_transaction {
        sqlx::query("BEGIN").execute(&mut *conn).await?;
    }

    match run_diff(conn, dialect, config, revision_id, is_using_business_pk_as_main_pk, report).await {
        Ok(()) => {
            if started_transaction {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
            }
            Ok(())
        }
        Err(err) => {
            if started_transaction {
                if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    warn!(error = %rollback_err, cause = %err, "rollback failed after sync error");
                    return Err(err.with_rollback_failure(rollback_err.to_string()));
                }
                warn!(error = %err, "rolled back transaction after sync error");
            }
            Err(err)
        }
    }
}

/// Run the diff inside a transaction the synchronizer itself begins,
/// commits on success, and rolls back on failure.
///
/// # Errors
///
/// Returns whatever [`run_diff`] returns; wraps it in
/// [`SyncError::Rollback`] if the rollback attempt itself also failed.
pub async fn synchronize(
    pool: &AnyPool,
    _engine: Engine,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    revision_id: i64,
    is_using_business_pk_as_main_pk: bool,
    report: &mut SyncReport,
) -> SyncResult<()> {
    let mut conn = pool.acquire().await?;
    run_with_transaction_control(
        &mut conn,
        true,
        dialect,
        config,
        revision_id,
        is_using_business_pk_as_main_pk,
        report,
    )
    .await
}

/// Run the diff against a connection the caller already holds inside an
/// open transaction. Never begins, commits, or rolls back — that remains
/// the caller's responsibility.
///
/// # Errors
///
/// Returns whatever [`run_diff`] returns, unwrapped by any transaction
/// control.
pub async fn synchronize_within_transaction(
    conn: &mut AnyConnection,
    _engine: Engine,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    revision_id: i64,
    is_using_business_pk_as_main_pk: bool,
    report: &mut SyncReport,
) -> SyncResult<()> {
    run_with_transaction_control(
        conn,
        false,
        dialect,
        config,
        revision_id,
        is_using_business_pk_as_main_pk,
        report,
    )
    .await
}
