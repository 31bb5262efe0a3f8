//! The view preparer (spec 4.A): when configured, (re)creates the
//! dependency views and the source view itself before anything else in a
//! run, since nothing transactional precedes it.

use sqlx::any::AnyPool;
use tracing::info;

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::report::SyncReport;

/// Execute `view_dependencies` in order, then `view_definition`, against
/// the source connection. No-op when `should_create_view` is false.
///
/// # Errors
///
/// Returns [`crate::error::SyncError::DataAccess`] if any statement fails;
/// the whole sync fails along with it (spec 4.A).
pub async fn prepare_view(source_pool: &AnyPool, config: &SyncConfig, report: &mut SyncReport) -> SyncResult<()> {
    if !config.should_create_view {
        return Ok(());
    }

    report.view_creation_attempted = true;

    for statement in &config.view_dependencies {
        sqlx::query(statement).execute(source_pool).await?;
    }
    sqlx::query(&config.view_definition).execute(source_pool).await?;

    report.view_creation_successful = true;
    info!(
        view = %config.source_object_name,
        dependency_statements = config.view_dependencies.len(),
        "recreated source view"
    );
    report.info(format!(
        "recreated view `{}` ({} dependency statement(s))",
        config.source_object_name,
        config.view_dependencies.len()
    ));
    Ok(())
}
