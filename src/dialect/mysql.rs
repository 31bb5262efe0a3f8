use crate::column::ColumnDefinition;
use crate::dialect::{base_type_sql, Dialect, Engine};

/// MySQL/MariaDB. Identifiers are backtick-quoted; supports a native
/// `SHA2()` function and real multi-table `UPDATE ... JOIN` / `DELETE ...
/// JOIN` DML, so the synchronizer does not need the correlated-subquery
/// fallback here.
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn column_ddl(&self, col: &ColumnDefinition) -> String {
        let type_sql = base_type_sql(col);
        let mut sql = format!("{} {}", self.quote_ident(&col.name), type_sql);
        if col.unsigned {
            sql.push_str(" UNSIGNED");
        }
        if col.not_null {
            sql.push_str(" NOT NULL");
        }
        if col.autoincrement {
            sql.push_str(" AUTO_INCREMENT");
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
            .map(|c| format!("COALESCE(CAST({c} AS CHAR), '')"))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("SHA2(CONCAT({parts}), 256)"))
    }

    fn supports_join_dml(&self) -> bool {
        true
    }

    fn index_exists_sql(&self, table: &str, index_name: &str) -> String {
        format!(
            "SELECT 1 FROM INFORMATION_SCHEMA.STATISTICS WHERE TABLE_NAME = '{}' AND INDEX_NAME = '{}' AND TABLE_SCHEMA = DATABASE()",
            table.replace('\'', "''"),
            index_name.replace('\'', "''")
        )
    }
}
