use crate::column::ColumnDefinition;
use crate::dialect::{base_type_sql, Dialect, Engine};

/// PostgreSQL. Relies on the `pgcrypto` extension's `digest()` for the
/// SQL-side content hash; identifiers are double-quoted.
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn column_ddl(&self, col: &ColumnDefinition) -> String {
        let type_sql = if col.autoincrement {
            "BIGSERIAL".to_string()
        } else {
            base_type_sql(col)
        };
        let mut sql = format!("{} {}", self.quote_ident(&col.name), type_sql);
        if col.not_null {
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

    fn hash_expr(&self, quoted_target_cols: &[String]) -> Option<String> {
        let parts = quoted_target_cols
            .iter()
            .map(|c| format!("COALESCE(CAST({c} AS TEXT), '')"))
            .collect::<Vec<_>>()
            .join(" || ");
        Some(format!("encode(digest({parts}, 'sha256'), 'hex')"))
    }

    fn supports_join_dml(&self) -> bool {
        false
    }

    fn index_exists_sql(&self, table: &str, index_name: &str) -> String {
        format!(
            "SELECT 1 FROM pg_indexes WHERE tablename = '{}' AND indexname = '{}'",
            table.replace('\'', "''"),
            index_name.replace('\'', "''")
        )
    }

    fn bind_placeholder(&self, position: usize) -> String {
        format!("${position}")
    }
}
