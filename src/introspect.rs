//! The source introspector (spec 4.B): classifies a source name as a base
//! table or a view, then yields a uniform column-definition map — falling
//! back to a custom `INFORMATION_SCHEMA.COLUMNS` read for views on engines
//! whose native table-introspection path refuses to describe them.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use sqlx::any::AnyPool;
use sqlx::Row;
use tokio::sync::Mutex;

use crate::column::{ColumnDefinition, ColumnType};
use crate::dialect::Engine;
use crate::error::{SyncError, SyncResult};

/// How the introspector classified a source name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Table,
    View,
    IntrospectableOther,
    Unknown,
}

/// Split a possibly schema-qualified name into `(namespace, base)`. Only
/// understands the unquoted `schema.name` form; a quoted full name is
/// compared verbatim by callers before this split is consulted.
#[must_use]
pub fn split_qualified_name(name: &str) -> (Option<String>, String) {
    match name.rsplit_once('.') {
        Some((namespace, base)) => (Some(namespace.to_string()), base.to_string()),
        None => (None, name.to_string()),
    }
}

/// The name-matching rule from spec 4.B: identical quoted full names
/// match; otherwise base names match case-insensitively and namespaces
/// either match exactly or one side is absent (caller omitted it, the
/// listing used the default schema, or vice versa).
#[must_use]
pub fn names_match(input: &str, listed_namespace: &str, listed_base: &str) -> bool {
    let full_listed = format!("{listed_namespace}.{listed_base}");
    if input == full_listed {
        return true;
    }
    let (in_ns, in_base) = split_qualified_name(input);
    if !in_base.eq_ignore_ascii_case(listed_base) {
        return false;
    }
    match in_ns {
        None => true,
        Some(ns) => ns.eq_ignore_ascii_case(listed_namespace),
    }
}

/// Caches the most recently introspected `(source_name, definitions)` pair
/// so repeated calls within one sync run don't re-query (spec 4.B
/// "Caching").
pub struct Introspector {
    cache: Mutex<Option<(String, IndexMap<String, ColumnDefinition>)>>,
}

impl Default for Introspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Introspector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(None),
        }
    }

    /// Introspect `source_name` against `pool`, returning its columns in
    /// source-declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Introspection`] if the source cannot be found
    /// or described by any path, and [`SyncError::DataAccess`] if a query
    /// itself fails.
    pub async fn introspect(
        &self,
        pool: &AnyPool,
        engine: Engine,
        source_name: &str,
    ) -> SyncResult<IndexMap<String, ColumnDefinition>> {
        {
            let cache = self.cache.lock().await;
            if let Some((cached_name, cached_cols)) = cache.as_ref() {
                if cached_name == source_name {
                    return Ok(cached_cols.clone());
                }
            }
        }

        let columns = match engine {
            Engine::Postgres => introspect_postgres(pool, source_name).await?,
            Engine::MySql => introspect_mysql(pool, source_name).await?,
            Engine::Sqlite => introspect_sqlite(pool, source_name).await?,
        };

        *self.cache.lock().await = Some((source_name.to_string(), columns.clone()));
        Ok(columns)
    }
}

// ---------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------

async fn classify_postgres(pool: &AnyPool, source_name: &str) -> SyncResult<(SourceKind, String, String)> {
    let (namespace, base) = split_qualified_name(source_name);

    let table_row = match &namespace {
        Some(schema) => {
            sqlx::query(
                "SELECT table_schema FROM information_schema.tables \
                 WHERE table_name = $1 AND table_schema = $2 AND table_type = 'BASE TABLE' LIMIT 1",
            )
            .bind(&base)
            .bind(schema)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT table_schema FROM information_schema.tables \
                 WHERE table_name = $1 AND table_schema = current_schema() AND table_type = 'BASE TABLE' LIMIT 1",
            )
            .bind(&base)
            .fetch_optional(pool)
            .await?
        }
    };

    if let Some(row) = table_row {
        let schema: String = row.try_get(0)?;
        return Ok((SourceKind::Table, schema, base));
    }

    let view_rows = sqlx::query("SELECT table_schema, table_name FROM information_schema.views")
        .fetch_all(pool)
        .await?;
    for row in view_rows {
        let schema: String = row.try_get(0)?;
        let name: String = row.try_get(1)?;
        if names_match(source_name, &schema, &name) {
            return Ok((SourceKind::View, schema, name));
        }
    }

    Ok((SourceKind::Unknown, namespace.unwrap_or_default(), base))
}

async fn introspect_postgres(pool: &AnyPool, source_name: &str) -> SyncResult<IndexMap<String, ColumnDefinition>> {
    let (kind, schema, base) = classify_postgres(pool, source_name).await?;

    if matches!(kind, SourceKind::View) {
        let columns = information_schema_columns(pool, &schema, &base, Engine::Postgres).await?;
        if !columns.is_empty() {
            return Ok(columns);
        }
    }

    let columns = information_schema_columns(pool, &schema, &base, Engine::Postgres).await?;
    if columns.is_empty() {
        return Err(SyncError::introspection(
            source_name,
            "source not found via information_schema (table or view)",
        ));
    }
    Ok(columns)
}

// ---------------------------------------------------------------------
// MySQL / MariaDB
// ---------------------------------------------------------------------

async fn classify_mysql(pool: &AnyPool, source_name: &str) -> SyncResult<(SourceKind, String, String)> {
    let (namespace, base) = split_qualified_name(source_name);

    let table_row = match &namespace {
        Some(schema) => {
            sqlx::query(
                "SELECT TABLE_SCHEMA FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_NAME = ? AND TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' LIMIT 1",
            )
            .bind(&base)
            .bind(schema)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT TABLE_SCHEMA FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' LIMIT 1",
            )
            .bind(&base)
            .fetch_optional(pool)
            .await?
        }
    };

    if let Some(row) = table_row {
        let schema: String = row.try_get(0)?;
        return Ok((SourceKind::Table, schema, base));
    }

    let view_rows = sqlx::query("SELECT TABLE_SCHEMA, TABLE_NAME FROM INFORMATION_SCHEMA.VIEWS")
        .fetch_all(pool)
        .await?;
    for row in view_rows {
        let schema: String = row.try_get(0)?;
        let name: String = row.try_get(1)?;
        if names_match(source_name, &schema, &name) {
            return Ok((SourceKind::View, schema, name));
        }
    }

    Ok((SourceKind::Unknown, namespace.unwrap_or_default(), base))
}

async fn introspect_mysql(pool: &AnyPool, source_name: &str) -> SyncResult<IndexMap<String, ColumnDefinition>> {
    let (kind, schema, base) = classify_mysql(pool, source_name).await?;

    let columns = information_schema_columns(pool, &schema, &base, Engine::MySql).await?;
    if columns.is_empty() {
        if matches!(kind, SourceKind::Unknown) {
            return Err(SyncError::introspection(
                source_name,
                "source not found via INFORMATION_SCHEMA (table or view)",
            ));
        }
        return Err(SyncError::introspection(
            source_name,
            "INFORMATION_SCHEMA.COLUMNS returned no rows for a classified source",
        ));
    }
    Ok(columns)
}

/// Shared `INFORMATION_SCHEMA.COLUMNS` read for Postgres and MySQL. MySQL
/// additionally reads `COLUMN_TYPE` to recover the `unsigned` flag and
/// distinguish `tinyint(1)` as boolean (spec 4.B step 2).
async fn information_schema_columns(
    pool: &AnyPool,
    schema: &str,
    table: &str,
    engine: Engine,
) -> SyncResult<IndexMap<String, ColumnDefinition>> {
    let rows = match engine {
        Engine::Postgres => {
            sqlx::query(
                "SELECT column_name, data_type, character_maximum_length, \
                 numeric_precision, numeric_scale, is_nullable, column_default, '' AS column_type \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
            )
            .bind(schema)
            .bind(table)
            .fetch_all(pool)
            .await?
        }
        Engine::MySql => {
            sqlx::query(
                "SELECT COLUMN_NAME, DATA_TYPE, CHARACTER_MAXIMUM_LENGTH, \
                 NUMERIC_PRECISION, NUMERIC_SCALE, IS_NULLABLE, COLUMN_DEFAULT, COLUMN_TYPE \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
            )
            .bind(schema)
            .bind(table)
            .fetch_all(pool)
            .await?
        }
        Engine::Sqlite => unreachable!("sqlite uses pragma-based introspection"),
    };

    let mut columns = IndexMap::new();
    for row in rows {
        let name: String = row.try_get(0)?;
        let data_type: String = row.try_get(1)?;
        let length: Option<i64> = row.try_get(2)?;
        let precision: Option<i64> = row.try_get(3)?;
        let scale: Option<i64> = row.try_get(4)?;
        let is_nullable: String = row.try_get(5)?;
        let default: Option<String> = row.try_get(6)?;
        let column_type: String = row.try_get(7)?;

        let (type_, unsigned, warn) = map_information_schema_type(engine, &data_type, &column_type, precision);
        if warn {
            tracing::warn!(column = %name, data_type = %data_type, "unrecognized information_schema type, mapped to STRING");
        }

        let mut platform_options = BTreeMap::new();
        if !column_type.is_empty() {
            platform_options.insert("column_type".to_string(), column_type);
        }

        columns.insert(
            name.clone(),
            ColumnDefinition {
                name,
                type_,
                length: length.map(|v| v as u32),
                precision: precision.map(|v| v as u32),
                scale: scale.map(|v| v as u32),
                unsigned,
                fixed: false,
                not_null: is_nullable.eq_ignore_ascii_case("NO"),
                default,
                autoincrement: false,
                platform_options,
                comment: None,
            },
        );
    }
    Ok(columns)
}

/// Map an `INFORMATION_SCHEMA`-style type string onto the portable
/// [`ColumnType`] tag set (spec 4.B "Type mapping"). Returns the mapped
/// type, the `unsigned` flag (MySQL only, read from `COLUMN_TYPE`), and
/// whether the type was unrecognized (callers log a warning).
fn map_information_schema_type(
    engine: Engine,
    data_type: &str,
    column_type: &str,
    numeric_precision: Option<i64>,
) -> (ColumnType, bool, bool) {
    let unsigned = column_type.to_ascii_lowercase().contains("unsigned");
    let lower = data_type.to_ascii_lowercase();
    let ct = match lower.as_str() {
        "char" | "varchar" | "character varying" | "nvarchar" | "nchar" | "tinytext" => ColumnType::String,
        "text" | "ntext" | "mediumtext" | "longtext" => ColumnType::Text,
        "int" | "integer" | "mediumint" => ColumnType::Integer,
        "smallint" => ColumnType::SmallInt,
        "bigint" => ColumnType::BigInt,
        "tinyint" => {
            if numeric_precision == Some(1) && column_type.to_ascii_lowercase().contains("tinyint(1)") {
                ColumnType::Boolean
            } else {
                ColumnType::SmallInt
            }
        }
        "bit" => {
            if matches!(engine, Engine::MySql) && numeric_precision == Some(1) {
                ColumnType::Boolean
            } else {
                ColumnType::String
            }
        }
        "decimal" | "numeric" | "dec" | "money" | "smallmoney" => ColumnType::Decimal,
        "float" | "real" | "double" | "double precision" => ColumnType::Float,
        "date" => ColumnType::Date,
        "datetime" | "datetime2" | "smalldatetime" | "timestamp" => ColumnType::DateTime,
        "timestamptz" | "timestamp with time zone" => ColumnType::DateTimeTz,
        "time" => ColumnType::Time,
        "year" if matches!(engine, Engine::MySql) => ColumnType::Date,
        "binary" | "varbinary" | "image" => ColumnType::Binary,
        "blob" | "tinyblob" | "mediumblob" | "longblob" | "bytea" => ColumnType::Blob,
        "json" | "jsonb" => ColumnType::Json,
        "uuid" => ColumnType::Guid,
        "enum" | "set" => ColumnType::String,
        _ => return (ColumnType::String, unsigned, true),
    };
    (ct, unsigned, false)
}

/// Whether a table (not view) by this exact name currently exists. Used by
/// the schema manager to decide create-vs-validate for the live, temp, and
/// deletion-log tables — these are always unqualified names the engine
/// itself owns, so no name-matching fuzziness is needed here.
pub async fn table_exists(pool: &AnyPool, engine: Engine, name: &str) -> SyncResult<bool> {
    let exists = match engine {
        Engine::Postgres => {
            sqlx::query(
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_name = $1 AND table_schema = current_schema() LIMIT 1",
            )
            .bind(name)
            .fetch_optional(pool)
            .await?
        }
        Engine::MySql => {
            sqlx::query(
                "SELECT 1 FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE() LIMIT 1",
            )
            .bind(name)
            .fetch_optional(pool)
            .await?
        }
        Engine::Sqlite => {
            sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_optional(pool)
                .await?
        }
    };
    Ok(exists.is_some())
}

/// The columns making up `table`'s declared primary key, in key order.
/// Used by the schema manager to validate a pre-existing live table (spec
/// 4.C: "its declared primary key equals exactly `{metadataColumnNames.id}`",
/// with the `isUsingBusinessPkAsMainPk` exception).
pub async fn primary_key_columns(pool: &AnyPool, engine: Engine, table: &str) -> SyncResult<Vec<String>> {
    let names: Vec<String> = match engine {
        Engine::Postgres => {
            sqlx::query(
                "SELECT kcu.column_name FROM information_schema.key_column_usage kcu \
                 JOIN information_schema.table_constraints tc \
                   ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 WHERE tc.table_name = $1 AND tc.constraint_type = 'PRIMARY KEY' \
                   AND tc.table_schema = current_schema() \
                 ORDER BY kcu.ordinal_position",
            )
            .bind(table)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<_, _>>()?
        }
        Engine::MySql => {
            sqlx::query(
                "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE \
                 WHERE TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' AND TABLE_SCHEMA = DATABASE() \
                 ORDER BY ORDINAL_POSITION",
            )
            .bind(table)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<_, _>>()?
        }
        Engine::Sqlite => {
            let pragma = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
            let mut pk_cols: Vec<(i64, String)> = Vec::new();
            for row in sqlx::query(&pragma).fetch_all(pool).await? {
                let pk: i64 = row.try_get("pk")?;
                if pk > 0 {
                    pk_cols.push((pk, row.try_get("name")?));
                }
            }
            pk_cols.sort_by_key(|(order, _)| *order);
            pk_cols.into_iter().map(|(_, name)| name).collect()
        }
    };
    Ok(names)
}

// ---------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------

async fn classify_sqlite(pool: &AnyPool, source_name: &str) -> SyncResult<SourceKind> {
    let (_, base) = split_qualified_name(source_name);
    let row = sqlx::query("SELECT type FROM sqlite_master WHERE name = ? AND type IN ('table', 'view')")
        .bind(&base)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let kind: String = row.try_get(0)?;
            Ok(if kind == "table" {
                SourceKind::Table
            } else {
                SourceKind::View
            })
        }
        None => Ok(SourceKind::Unknown),
    }
}

async fn introspect_sqlite(pool: &AnyPool, source_name: &str) -> SyncResult<IndexMap<String, ColumnDefinition>> {
    let kind = classify_sqlite(pool, source_name).await?;
    if matches!(kind, SourceKind::Unknown) {
        return Err(SyncError::introspection(
            source_name,
            "source not found in sqlite_master (table or view)",
        ));
    }

    let (_, base) = split_qualified_name(source_name);
    // PRAGMA does not accept bound parameters; the table name has already
    // been validated as an existing sqlite_master entry above.
    let pragma = format!("PRAGMA table_info(\"{}\")", base.replace('"', "\"\""));
    let rows = sqlx::query(&pragma).fetch_all(pool).await?;

    let mut columns = IndexMap::new();
    for row in rows {
        let name: String = row.try_get("name")?;
        let decl_type: String = row.try_get("type")?;
        let not_null: i64 = row.try_get("notnull")?;
        let default: Option<String> = row.try_get("dflt_value")?;

        let type_ = map_sqlite_decltype(&decl_type);
        columns.insert(
            name.clone(),
            ColumnDefinition {
                name,
                type_,
                length: None,
                precision: None,
                scale: None,
                unsigned: false,
                fixed: false,
                not_null: not_null != 0,
                default,
                autoincrement: false,
                platform_options: BTreeMap::new(),
                comment: None,
            },
        );
    }
    Ok(columns)
}

fn map_sqlite_decltype(decl_type: &str) -> ColumnType {
    let lower = decl_type.to_ascii_lowercase();
    if lower.contains("int") {
        ColumnType::BigInt
    } else if lower.contains("bool") {
        ColumnType::Boolean
    } else if lower.contains("char") || lower.contains("clob") || lower.contains("text") {
        ColumnType::Text
    } else if lower.contains("datetime") || lower.contains("timestamp") {
        ColumnType::DateTime
    } else if lower.contains("date") {
        ColumnType::Date
    } else if lower.contains("blob") || lower.is_empty() {
        ColumnType::Blob
    } else if lower.contains("real") || lower.contains("floa") || lower.contains("doub") {
        ColumnType::Float
    } else if lower.contains("decimal") || lower.contains("numeric") {
        ColumnType::Decimal
    } else {
        ColumnType::String
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_qualified_name_handles_schema_prefix() {
        assert_eq!(
            split_qualified_name("public.widgets"),
            (Some("public".to_string()), "widgets".to_string())
        );
        assert_eq!(split_qualified_name("widgets"), (None, "widgets".to_string()));
    }

    #[test]
    fn names_match_is_case_insensitive_on_base_name() {
        assert!(names_match("Widgets", "public", "widgets"));
        assert!(!names_match("gadgets", "public", "widgets"));
    }

    #[test]
    fn names_match_tolerates_missing_namespace_on_either_side() {
        assert!(names_match("widgets", "public", "widgets"));
        assert!(names_match("public.widgets", "public", "widgets"));
        assert!(!names_match("other.widgets", "public", "widgets"));
    }

    #[test]
    fn mysql_tinyint_one_maps_to_boolean() {
        let (ct, _, warn) = map_information_schema_type(Engine::MySql, "tinyint", "tinyint(1)", Some(1));
        assert_eq!(ct, ColumnType::Boolean);
        assert!(!warn);
    }

    #[test]
    fn mysql_tinyint_non_one_maps_to_smallint() {
        let (ct, _, _) = map_information_schema_type(Engine::MySql, "tinyint", "tinyint(4)", Some(4));
        assert_eq!(ct, ColumnType::SmallInt);
    }

    #[test]
    fn unrecognized_type_maps_to_string_with_warning() {
        let (ct, _, warn) = map_information_schema_type(Engine::Postgres, "some_future_type", "", None);
        assert_eq!(ct, ColumnType::String);
        assert!(warn);
    }

    #[test]
    fn sqlite_decltype_mapping_covers_common_affinities() {
        assert_eq!(map_sqlite_decltype("INTEGER"), ColumnType::BigInt);
        assert_eq!(map_sqlite_decltype("VARCHAR(32)"), ColumnType::Text);
        assert_eq!(map_sqlite_decltype("DATETIME"), ColumnType::DateTime);
        assert_eq!(map_sqlite_decltype(""), ColumnType::Blob);
    }
}
