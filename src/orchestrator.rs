//! The orchestrator: the public entry points, wiring the six components in
//! the exact order spec 2 prescribes and guaranteeing temp-table cleanup on
//! every exit path.

use sqlx::any::AnyConnection;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::dialect::Engine;
use crate::error::SyncResult;
use crate::introspect::Introspector;
use crate::report::SyncReport;
use crate::{hasher, index, loader, schema, synchronizer, view};

enum TxMode<'a> {
    Owned,
    Borrowed(&'a mut AnyConnection),
}

/// Run one full sync cycle against `config`'s source and target pools,
/// tagging all changes with `revision_id`.
///
/// The synchronizer manages its own transaction for the diff phase.
///
/// # Errors
///
/// Returns the first error encountered at any phase; no partial
/// `SyncReport` is returned on failure (spec 7).
pub async fn sync(config: &SyncConfig, revision_id: i64) -> SyncResult<SyncReport> {
    run(config, revision_id, TxMode::Owned).await
}

/// Run one full sync cycle, but have the diff phase run on a connection the
/// caller already holds inside an open transaction. The synchronizer will
/// not begin, commit, or roll back that transaction — the caller owns it
/// (spec 9, "did I start this transaction?").
///
/// # Errors
///
/// Returns the first error encountered at any phase.
pub async fn sync_within_transaction(
    config: &SyncConfig,
    revision_id: i64,
    tx_conn: &mut AnyConnection,
) -> SyncResult<SyncReport> {
    run(config, revision_id, TxMode::Borrowed(tx_conn)).await
}

async fn run(config: &SyncConfig, revision_id: i64, tx_mode: TxMode<'_>) -> SyncResult<SyncReport> {
    info!(
        source = %config.source_object_name,
        live_table = %config.live_table_name,
        revision_id,
        "starting sync run"
    );
    let mut report = SyncReport::new();
    let outcome = run_phases(config, revision_id, tx_mode, &mut report).await;

    // Temp-table cleanup always runs, success or failure, mirroring a
    // `finally` block (spec 2, 4.C, 9). A drop failure here is logged, not
    // propagated, so it never masks whatever `outcome` already carries.
    let engine = Engine::from_any_kind(config.target.any_kind());
    if let Ok(engine) = engine {
        let dialect = engine.dialect();
        if let Err(e) = schema::drop_temp_table(&config.target, dialect.as_ref(), config).await {
            warn!(temp_table = %config.temp_table_name, error = %e, "failed to drop temp table during cleanup");
            report.warn(format!("failed to drop temp table `{}` during cleanup: {e}", config.temp_table_name));
        }
    }

    if let Err(e) = &outcome {
        warn!(live_table = %config.live_table_name, error = %e, "sync run failed");
    } else {
        info!(live_table = %config.live_table_name, "sync run complete");
    }

    outcome?;
    Ok(report)
}

async fn run_phases(
    config: &SyncConfig,
    revision_id: i64,
    tx_mode: TxMode<'_>,
    report: &mut SyncReport,
) -> SyncResult<()> {
    let target_engine = Engine::from_any_kind(config.target.any_kind())?;
    let source_engine = Engine::from_any_kind(config.source.any_kind())?;
    let dialect = target_engine.dialect();

    view::prepare_view(&config.source, config, report).await?;

    let introspector = Introspector::new();
    let source_columns = introspector
        .introspect(&config.source, source_engine, &config.source_object_name)
        .await?;
    info!(source = %config.source_object_name, columns = source_columns.len(), "source introspection complete");

    let is_using_business_pk_as_main_pk =
        schema::ensure_live_table(&config.target, target_engine, dialect.as_ref(), config, &source_columns).await?;
    report.is_using_business_pk_as_main_pk = is_using_business_pk_as_main_pk;
    if is_using_business_pk_as_main_pk {
        info!(live_table = %config.live_table_name, "live table accepted under business-primary-key-as-main-key exception");
    }

    let live_was_empty = schema::live_table_is_empty(&config.target, dialect.as_ref(), config).await?;

    if config.enable_deletion_logging {
        schema::ensure_deleted_log_table(&config.target, target_engine, dialect.as_ref(), config).await?;
    }

    let pk_cols: Vec<String> = config.primary_key_map.values().cloned().collect();
    let content_hash_col = &config.metadata_column_names.content_hash;
    let id_column_exists = !is_using_business_pk_as_main_pk;

    if !live_was_empty {
        index::index_live_table(
            &config.target,
            dialect.as_ref(),
            &config.live_table_name,
            &pk_cols,
            content_hash_col,
            id_column_exists,
            report,
        )
        .await;
    }

    schema::prepare_temp_table(&config.target, dialect.as_ref(), config, &source_columns).await?;
    loader::load_into_temp(&config.source, &config.target, dialect.as_ref(), config, &source_columns, report).await?;
    hasher::hash_temp_table(&config.target, dialect.as_ref(), config, &source_columns).await?;
    index::index_temp_table(&config.target, dialect.as_ref(), &config.temp_table_name, &pk_cols, content_hash_col).await?;

    match tx_mode {
        TxMode::Owned => {
            synchronizer::synchronize(
                &config.target,
                target_engine,
                dialect.as_ref(),
                config,
                revision_id,
                is_using_business_pk_as_main_pk,
                report,
            )
            .await?;
        }
        TxMode::Borrowed(conn) => {
            synchronizer::synchronize_within_transaction(
                conn,
                target_engine,
                dialect.as_ref(),
                config,
                revision_id,
                is_using_business_pk_as_main_pk,
                report,
            )
            .await?;
        }
    }

    if live_was_empty && report.initial_insert_count > 0 {
        index::index_live_table(
            &config.target,
            dialect.as_ref(),
            &config.live_table_name,
            &pk_cols,
            content_hash_col,
            id_column_exists,
            report,
        )
        .await;
    }

    Ok(())
}
