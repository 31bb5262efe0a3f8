//! The source-to-temp loader (spec 4.D): streams rows out of the source
//! object, sanitizes configured datetime columns, and batch-inserts into
//! the already-prepared temp table.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use indexmap::IndexMap;
use sqlx::any::{AnyPool, AnyRow};
use sqlx::Row;
use tracing::info;

use crate::column::{ColumnDefinition, ColumnType};
use crate::config::SyncConfig;
use crate::dialect::Dialect;
use crate::error::SyncResult;
use crate::report::SyncReport;
use crate::value::SqlValue;

const BATCH_SIZE: usize = 500;

fn dedup_target_columns<'a>(pk: impl Iterator<Item = &'a String>, data: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut cols = Vec::new();
    for c in pk.chain(data) {
        if seen.insert(c.clone()) {
            cols.push(c.clone());
        }
    }
    cols
}

fn merged_target_columns(config: &SyncConfig) -> Vec<String> {
    dedup_target_columns(config.primary_key_map.values(), config.data_column_map.values())
}

pub(crate) fn decode_any_value(row: &AnyRow, idx: usize, col_type: ColumnType) -> SyncResult<SqlValue> {
    Ok(match col_type {
        ColumnType::Integer | ColumnType::SmallInt | ColumnType::BigInt => {
            match row.try_get::<Option<i64>, _>(idx)? {
                Some(v) => SqlValue::Int(v),
                None => SqlValue::Null,
            }
        }
        ColumnType::Boolean => match row.try_get::<Option<bool>, _>(idx)? {
            Some(v) => SqlValue::Bool(v),
            None => SqlValue::Null,
        },
        ColumnType::Decimal | ColumnType::Float => match row.try_get::<Option<f64>, _>(idx)? {
            Some(v) => SqlValue::Float(v),
            None => SqlValue::Null,
        },
        ColumnType::Date => match row.try_get::<Option<NaiveDate>, _>(idx)? {
            Some(v) => SqlValue::Date(v),
            None => SqlValue::Null,
        },
        ColumnType::DateTime | ColumnType::DateTimeTz => match row.try_get::<Option<NaiveDateTime>, _>(idx)? {
            Some(v) => SqlValue::DateTime(v),
            None => SqlValue::Null,
        },
        ColumnType::Binary | ColumnType::Blob => match row.try_get::<Option<Vec<u8>>, _>(idx)? {
            Some(v) => SqlValue::Bytes(v),
            None => SqlValue::Null,
        },
        _ => match row.try_get::<Option<String>, _>(idx)? {
            Some(v) => SqlValue::Text(v),
            None => SqlValue::Null,
        },
    })
}

/// Whether a text value falls into any of the blank/zero/unparseable forms
/// spec 4.D.a replaces with the placeholder.
fn is_invalid_datetime_text(s: &str) -> bool {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return true;
    }
    if trimmed.starts_with('-') || trimmed.starts_with("0000-") {
        return true;
    }
    if matches!(trimmed, "0000-00-00" | "0000-00-00 00:00:00" | "00:00:00") {
        return true;
    }
    let parses = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok()
        || NaiveTime::parse_from_str(trimmed, "%H:%M:%S").is_ok();
    !parses
}

fn sanitize_datetime_value(value: SqlValue, placeholder: &str, column_name: &str, report: &mut SyncReport) -> SqlValue {
    match &value {
        SqlValue::Null => SqlValue::Text(placeholder.to_string()),
        SqlValue::Text(s) => {
            if is_invalid_datetime_text(s) {
                SqlValue::Text(placeholder.to_string())
            } else {
                value
            }
        }
        SqlValue::Date(d) => {
            if is_invalid_datetime_text(&d.format("%Y-%m-%d").to_string()) {
                SqlValue::Text(placeholder.to_string())
            } else {
                value
            }
        }
        SqlValue::DateTime(dt) => {
            if is_invalid_datetime_text(&dt.format("%Y-%m-%d %H:%M:%S").to_string()) {
                SqlValue::Text(placeholder.to_string())
            } else {
                value
            }
        }
        _ => {
            report.warn(format!(
                "column `{column_name}` has a non-datetime, non-string value in a non-nullable-datetime column; left untouched"
            ));
            value
        }
    }
}

pub(crate) fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    value: SqlValue,
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::Int(i) => query.bind(i),
        SqlValue::Float(f) => query.bind(f),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Bytes(b) => query.bind(b),
        SqlValue::Date(d) => query.bind(d),
        SqlValue::DateTime(dt) => query.bind(dt),
    }
}

async fn flush_batch(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    target_columns: &[String],
    batch: Vec<Vec<SqlValue>>,
) -> SyncResult<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let quoted_cols = target_columns
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let row_count = batch.len();
    let mut next_position = 1;
    let row_templates: Vec<String> = (0..row_count)
        .map(|_| {
            let (placeholders, advanced) = dialect.bind_placeholders(next_position, target_columns.len());
            next_position = advanced;
            format!("({})", placeholders.join(", "))
        })
        .collect();
    let values_sql = row_templates.join(", ");
    let sql = format!(
        "INSERT INTO {} ({quoted_cols}) VALUES {values_sql}",
        dialect.quote_ident(&config.temp_table_name)
    );

    let mut query = sqlx::query(&sql);
    for row in batch {
        for value in row {
            query = bind_value(query, value);
        }
    }
    query.execute(pool).await?;
    info!(temp_table = %config.temp_table_name, rows = row_count, "flushed batch into temp table");
    Ok(())
}

/// Stream every row of the source object into the temp table, sanitizing
/// configured datetime columns and batching inserts 500 rows at a time.
///
/// # Errors
///
/// Returns [`crate::error::SyncError::DataAccess`] if the source stream or
/// any insert batch fails.
pub async fn load_into_temp(
    source_pool: &AnyPool,
    target_pool: &AnyPool,
    dialect: &dyn Dialect,
    config: &SyncConfig,
    source_columns: &IndexMap<String, ColumnDefinition>,
    report: &mut SyncReport,
) -> SyncResult<()> {
    let target_columns = merged_target_columns(config);
    let source_select_cols: Vec<String> = target_columns
        .iter()
        .map(|t| {
            config
                .source_column_for_target(t)
                .map(ToString::to_string)
                .unwrap_or_else(|| t.clone())
        })
        .collect();

    let select_sql = format!(
        "SELECT {} FROM {}",
        source_select_cols
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        dialect.quote_ident(&config.source_object_name)
    );

    info!(source = %config.source_object_name, temp_table = %config.temp_table_name, "loading source rows into temp table");

    let mut rows = sqlx::query(&select_sql).fetch(source_pool);
    let mut batch: Vec<Vec<SqlValue>> = Vec::with_capacity(BATCH_SIZE);
    let mut total_rows = 0u64;

    while let Some(row) = rows.try_next().await? {
        let mut values = Vec::with_capacity(target_columns.len());
        for (idx, source_col) in source_select_cols.iter().enumerate() {
            let col_type = source_columns
                .get(source_col)
                .map_or(ColumnType::String, |c| c.type_);
            let raw = decode_any_value(&row, idx, col_type)?;
            let target_col = &target_columns[idx];
            let value = if config.non_nullable_datetime_columns.contains(source_col) {
                sanitize_datetime_value(raw, &config.placeholder_datetime, target_col, report)
            } else {
                raw
            };
            values.push(value);
        }
        batch.push(values);
        total_rows += 1;
        if batch.len() == BATCH_SIZE {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
            flush_batch(target_pool, dialect, config, &target_columns, full).await?;
        }
    }
    flush_batch(target_pool, dialect, config, &target_columns, batch).await?;
    info!(source = %config.source_object_name, rows = total_rows, "source load complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_zero_forms_are_invalid() {
        assert!(is_invalid_datetime_text(""));
        assert!(is_invalid_datetime_text("   "));
        assert!(is_invalid_datetime_text("0"));
        assert!(is_invalid_datetime_text("0000-00-00"));
        assert!(is_invalid_datetime_text("0000-00-00 00:00:00"));
        assert!(is_invalid_datetime_text("00:00:00"));
        assert!(is_invalid_datetime_text("-1"));
        assert!(is_invalid_datetime_text("not a date"));
    }

    #[test]
    fn real_datetimes_are_valid() {
        assert!(!is_invalid_datetime_text("2024-05-01 10:00:00"));
        assert!(!is_invalid_datetime_text("2024-05-01"));
    }

    #[test]
    fn merged_columns_put_primary_key_first_and_dedup() {
        let mut pk = IndexMap::new();
        pk.insert("id".to_string(), "id".to_string());
        let mut data = IndexMap::new();
        data.insert("id".to_string(), "id".to_string());
        data.insert("name".to_string(), "name".to_string());

        let cols = dedup_target_columns(pk.values(), data.values());
        assert_eq!(cols, vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn null_value_is_replaced_with_placeholder() {
        let mut report = SyncReport::new();
        let out = sanitize_datetime_value(SqlValue::Null, "2222-02-22 00:00:00", "created_at", &mut report);
        assert_eq!(out, SqlValue::Text("2222-02-22 00:00:00".to_string()));
    }
}
