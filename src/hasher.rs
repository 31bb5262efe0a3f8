//! The row hasher (spec 4.E): fills in `contentHash` on every temp-table
//! row over a configured column subset. Prefers a single SQL `UPDATE` using
//! the dialect's native SHA-256 expression; falls back to computing hashes
//! application-side, batched, when the dialect has none (SQLite).

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use sqlx::any::AnyPool;
use tracing::info;

use crate::column::{ColumnDefinition, ColumnType};
use crate::config::SyncConfig;
use crate::dialect::Dialect;
use crate::error::SyncResult;
use crate::loader::{bind_value, decode_any_value};

fn hash_target_columns(config: &SyncConfig) -> Vec<String> {
    config
        .hash_columns
        .iter()
        .map(|source_col| {
            config
                .data_column_map
                .get(source_col)
                .cloned()
                .unwrap_or_else(|| source_col.clone())
        })
        .collect()
}

/// Compute and store `contentHash` for every row of the temp table.
///
/// # Errors
///
/// Returns [`crate::error::SyncError::DataAccess`] if the update (or, on
/// the application-side fallback, the row scan/rewrite) fails.
pub async fn hash_temp_table(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    source_columns: &IndexMap<String, ColumnDefinition>,
) -> SyncResult<u64> {
    let target_cols = hash_target_columns(config);
    let quoted_cols: Vec<String> = target_cols.iter().map(|c| dialect.quote_ident(c)).collect();

    match dialect.hash_expr(&quoted_cols) {
        Some(expr) => {
            let sql = format!(
                "UPDATE {} SET {} = {expr}",
                dialect.quote_ident(&config.temp_table_name),
                dialect.quote_ident(&config.metadata_column_names.content_hash)
            );
            let result = sqlx::query(&sql).execute(pool).await?;
            info!(temp_table = %config.temp_table_name, rows = result.rows_affected(), "hashed temp table rows via SQL-side expression");
            Ok(result.rows_affected())
        }
        None => hash_application_side(pool, dialect, config, &target_cols, source_columns).await,
    }
}

fn column_type_for_target(
    config: &SyncConfig,
    target_col: &str,
    source_columns: &IndexMap<String, ColumnDefinition>,
) -> ColumnType {
    config
        .source_column_for_target(target_col)
        .or_else(|| {
            config
                .primary_key_map
                .iter()
                .find(|(_, t)| t.as_str() == target_col)
                .map(|(s, _)| s.as_str())
        })
        .and_then(|source_col| source_columns.get(source_col))
        .map_or(ColumnType::String, |c| c.type_)
}

async fn hash_application_side(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    target_cols: &[String],
    source_columns: &IndexMap<String, ColumnDefinition>,
) -> SyncResult<u64> {
    let pk_cols: Vec<String> = config.primary_key_map.values().cloned().collect();

    let select_cols: Vec<String> = pk_cols
        .iter()
        .chain(target_cols.iter())
        .cloned()
        .collect();
    let quoted_select = select_cols
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let select_sql = format!(
        "SELECT {quoted_select} FROM {}",
        dialect.quote_ident(&config.temp_table_name)
    );

    let pk_types: Vec<ColumnType> = pk_cols
        .iter()
        .map(|c| column_type_for_target(config, c, source_columns))
        .collect();
    let hash_types: Vec<ColumnType> = target_cols
        .iter()
        .map(|c| column_type_for_target(config, c, source_columns))
        .collect();

    let rows = sqlx::query(&select_sql).fetch_all(pool).await?;

    let mut updated = 0u64;
    for row in &rows {
        let mut hasher = Sha256::new();
        for (idx, col_type) in hash_types.iter().enumerate() {
            let value = decode_any_value(row, pk_cols.len() + idx, *col_type)?;
            hasher.update(value.to_hash_text().as_bytes());
        }
        let digest = hex::encode(hasher.finalize());

        let pk_binds: Vec<String> = (0..pk_cols.len())
            .map(|i| dialect.bind_placeholder(i + 2))
            .collect();
        let pk_predicate = pk_cols
            .iter()
            .zip(&pk_binds)
            .map(|(c, b)| format!("{} = {b}", dialect.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let update_sql = format!(
            "UPDATE {} SET {} = {} WHERE {pk_predicate}",
            dialect.quote_ident(&config.temp_table_name),
            dialect.quote_ident(&config.metadata_column_names.content_hash),
            dialect.bind_placeholder(1)
        );
        let mut query = sqlx::query(&update_sql).bind(digest);
        for (idx, col_type) in pk_types.iter().enumerate() {
            let value = decode_any_value(row, idx, *col_type)?;
            query = bind_value(query, value);
        }
        query.execute(pool).await?;
        updated += 1;
    }

    info!(temp_table = %config.temp_table_name, rows = updated, "hashed temp table rows application-side");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_target_columns_translates_source_names_to_target_names() {
        let mut data_column_map = indexmap::IndexMap::new();
        data_column_map.insert("src_name".to_string(), "tgt_name".to_string());
        data_column_map.insert("src_age".to_string(), "tgt_age".to_string());

        let hash_columns = vec!["src_name".to_string(), "src_age".to_string()];
        let translated: Vec<String> = hash_columns
            .iter()
            .map(|c| data_column_map.get(c).cloned().unwrap_or_else(|| c.clone()))
            .collect();
        assert_eq!(translated, vec!["tgt_name".to_string(), "tgt_age".to_string()]);
    }
}
