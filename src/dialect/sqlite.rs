use crate::column::ColumnDefinition;
use crate::dialect::{base_type_sql, Dialect, Engine};

/// SQLite. No SHA-256 builtin, so [`hash_expr`](Dialect::hash_expr) returns
/// `None` and the row hasher falls back to computing hashes application-side
/// (spec 4.E exception). No multi-table join DML either, so the
/// synchronizer always uses the correlated `UPDATE ... FROM` / `DELETE ...
/// WHERE EXISTS` forms against this dialect.
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn column_ddl(&self, col: &ColumnDefinition) -> String {
        let type_sql = if col.autoincrement {
            "INTEGER".to_string()
        } else {
            base_type_sql(col)
        };
        let mut sql = format!("{} {}", self.quote_ident(&col.name), type_sql);
        if col.autoincrement {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
        } else if col.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &col.default {
            sql.push_str(&format!(" DEFAULT {default}"));
        }
        sql
    }

    fn now_expr(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn hash_expr(&self, _quoted_target_cols: &[String]) -> Option<String> {
        None
    }

    fn supports_join_dml(&self) -> bool {
        false
    }

    fn primary_key_is_inline(&self) -> bool {
        true
    }

    fn index_exists_sql(&self, table: &str, index_name: &str) -> String {
        format!(
            "SELECT 1 FROM sqlite_master WHERE type = 'index' AND tbl_name = '{}' AND name = '{}'",
            table.replace('\'', "''"),
            index_name.replace('\'', "''")
        )
    }
}
