//! Per-engine SQL rendering: identifier quoting, column DDL, the content
//! hash expression, and the multi-table UPDATE/DELETE-with-JOIN forms the
//! synchronizer needs (spec 4.G) versus the correlated-subquery
//! equivalent on engines that don't support multi-table join DML.
//!
//! This is the DBAL-equivalent type tag / platform-options machinery spec.md
//! sections 3, 4.B, and 9 name without prescribing a shape for; one
//! [`Dialect`] implementation per supported engine gives each engine's
//! quirks a single, tested home instead of scattering `if engine == ...`
//! checks through the orchestration components.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use sqlx::any::AnyKind;

use crate::column::{ColumnDefinition, ColumnType};

/// Which concrete engine a [`Dialect`] renders SQL for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Postgres,
    MySql,
    Sqlite,
}

impl Engine {
    /// Determine the engine backing an `sqlx::Any` pool/connection.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for any `AnyKind` this engine does not
    /// support (e.g. MSSQL, which sqlx's `Any` driver can enumerate but
    /// this crate has no [`Dialect`] implementation for).
    pub fn from_any_kind(kind: AnyKind) -> crate::error::SyncResult<Self> {
        match kind {
            AnyKind::Postgres => Ok(Self::Postgres),
            AnyKind::MySql => Ok(Self::MySql),
            AnyKind::Sqlite => Ok(Self::Sqlite),
        }
    }

    #[must_use]
    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::Postgres => Box::new(PostgresDialect),
            Self::MySql => Box::new(MySqlDialect),
            Self::Sqlite => Box::new(SqliteDialect),
        }
    }
}

/// A join predicate between two aliased tables over the business primary
/// key, e.g. `live.id = temp.id AND live.region = temp.region`.
pub struct JoinKeys<'a> {
    pub left_alias: &'a str,
    pub right_alias: &'a str,
    pub columns: &'a [String],
}

impl JoinKeys<'_> {
    #[must_use]
    pub fn predicate(&self, dialect: &dyn Dialect) -> String {
        self.columns
            .iter()
            .map(|c| {
                format!(
                    "{}.{} = {}.{}",
                    self.left_alias,
                    dialect.quote_ident(c),
                    self.right_alias,
                    dialect.quote_ident(c)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Per-engine SQL rendering. Implementations must not hold any connection
/// state — they are pure text generators, cheap to construct per call.
pub trait Dialect: Send + Sync {
    fn engine(&self) -> Engine;

    /// Quote a raw identifier using this engine's native quoting. Callers
    /// are expected to supply trusted, already-validated names (spec 6);
    /// this only applies the correct quote characters and doubles any
    /// embedded quote character.
    fn quote_ident(&self, ident: &str) -> String;

    /// Render one column's type/length/nullability/default for a
    /// `CREATE TABLE` statement, honoring `col.autoincrement` with this
    /// engine's native autoincrement syntax.
    fn column_ddl(&self, col: &ColumnDefinition) -> String;

    /// `CURRENT_TIMESTAMP`-equivalent literal for this engine.
    fn now_expr(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    /// The `SHA256_HEX(CONCAT(...))`-equivalent expression over the given
    /// already-quoted target column names, or `None` if this engine has no
    /// built-in SHA-256 function and the row hasher must fall back to
    /// computing hashes application-side (spec 4.E; SQLite).
    fn hash_expr(&self, quoted_target_cols: &[String]) -> Option<String>;

    /// Whether [`column_ddl`](Dialect::column_ddl) already embeds the
    /// `PRIMARY KEY` clause for an autoincrement column (SQLite's
    /// `INTEGER PRIMARY KEY AUTOINCREMENT` must be the table's only primary
    /// key declaration). When false, the caller must still emit a
    /// table-level `PRIMARY KEY (col)` clause for the autoincrement column.
    fn primary_key_is_inline(&self) -> bool {
        false
    }

    /// Whether this engine supports a multi-table `UPDATE ... JOIN` /
    /// `DELETE ... JOIN` directly (MySQL), as opposed to needing the
    /// correlated `UPDATE ... FROM` / `DELETE ... WHERE EXISTS` equivalent
    /// (Postgres, SQLite).
    fn supports_join_dml(&self) -> bool {
        false
    }

    /// `CREATE INDEX` (or `CREATE UNIQUE INDEX`), idempotent by construction
    /// only insofar as the caller has already checked existence — see
    /// [`crate::index`].
    fn create_index_sql(&self, index_name: &str, table: &str, columns: &[String], unique: bool) -> String {
        let kind = if unique { "UNIQUE INDEX" } else { "INDEX" };
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE {kind} {} ON {} ({cols})",
            self.quote_ident(index_name),
            self.quote_ident(table)
        )
    }

    /// A query returning exactly one row if an index by this name already
    /// exists on `table`, none otherwise.
    fn index_exists_sql(&self, table: &str, index_name: &str) -> String;

    fn drop_table_if_exists_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_ident(table))
    }

    /// Render the bind placeholder for the `position`-th (1-indexed)
    /// parameter of a statement. MySQL and SQLite both take a positionless
    /// `?`; Postgres requires the numbered `$1`, `$2`, ... form, so this is
    /// the one piece of parameter syntax the `sqlx::Any` driver does not
    /// paper over and every cross-dialect statement must render through the
    /// active dialect rather than hardcoding `?`.
    fn bind_placeholder(&self, position: usize) -> String {
        let _ = position;
        "?".to_string()
    }

    /// Render `count` sequential bind placeholders starting at `start`
    /// (1-indexed), returning the rendered list and the position
    /// immediately following the last one — so callers building a
    /// multi-clause statement can keep threading the running position
    /// through without duplicating [`bind_placeholder`](Dialect::bind_placeholder) math.
    fn bind_placeholders(&self, start: usize, count: usize) -> (Vec<String>, usize) {
        let list = (0..count).map(|i| self.bind_placeholder(start + i)).collect();
        (list, start + count)
    }
}

/// Render the portable [`ColumnType`] tag and any length/precision as a
/// base SQL type string. Shared by all three dialects since the
/// differences between engines are almost entirely about autoincrement and
/// quoting, not base type spelling, except where overridden.
pub(crate) fn base_type_sql(col: &ColumnDefinition) -> String {
    match col.type_ {
        ColumnType::String => format!("VARCHAR({})", col.length.unwrap_or(255)),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::SmallInt => "SMALLINT".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::Decimal => format!(
            "DECIMAL({},{})",
            col.precision.unwrap_or(18),
            col.scale.unwrap_or(2)
        ),
        ColumnType::Float => "DOUBLE PRECISION".to_string(),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::DateTime => "TIMESTAMP".to_string(),
        ColumnType::DateTimeTz => "TIMESTAMP WITH TIME ZONE".to_string(),
        ColumnType::Time => "TIME".to_string(),
        ColumnType::Binary => format!("VARBINARY({})", col.length.unwrap_or(255)),
        ColumnType::Blob => "BLOB".to_string(),
        ColumnType::Json => "JSON".to_string(),
        ColumnType::Guid => "CHAR(36)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_keys_predicate_uses_both_aliases() {
        let dialect = PostgresDialect;
        let keys = JoinKeys {
            left_alias: "live",
            right_alias: "temp",
            columns: &["id".to_string(), "region".to_string()],
        };
        assert_eq!(
            keys.predicate(&dialect),
            r#"live."id" = temp."id" AND live."region" = temp."region""#
        );
    }
}
