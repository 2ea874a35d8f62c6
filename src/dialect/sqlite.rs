//! SQLite dialect.

use super::{Dialect, like_pattern};
use crate::error::{DbError, DbResult};
use crate::models::{
    AbstractType, AlterOperation, ColumnDefinition, ConnectionConfig, DatabaseType, QueryParam,
    Statement,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn connection_string(&self, config: &ConnectionConfig) -> DbResult<String> {
        if config.database.trim().is_empty() {
            return Err(DbError::configuration(format!(
                "connection '{}': missing SQLite file path",
                config.name
            )));
        }
        Ok(format!("sqlite:{}", config.database))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn paginate(&self, mut sql: String, _ordered: bool, limit: Option<u64>, offset: u64) -> String {
        match (limit, offset) {
            (None, 0) => {}
            (Some(n), 0) => sql.push_str(&format!(" LIMIT {}", n)),
            (Some(n), m) => sql.push_str(&format!(" LIMIT {} OFFSET {}", n, m)),
            (None, m) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", m)),
        }
        sql
    }

    fn native_type(&self, abstract_type: AbstractType, _column: &ColumnDefinition) -> String {
        match abstract_type {
            AbstractType::Text => "TEXT",
            AbstractType::Integer => "INTEGER",
            AbstractType::Decimal => "NUMERIC",
            AbstractType::Boolean => "BOOLEAN",
            AbstractType::Datetime => "DATETIME",
            AbstractType::Binary => "BLOB",
        }
        .to_string()
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn build_drop_table(&self, table: &str, _cascade: bool) -> String {
        format!("DROP TABLE {}", self.quote_table(table))
    }

    fn build_alter_table(&self, table: &str, op: &AlterOperation) -> DbResult<Vec<String>> {
        let t = self.quote_table(table);
        let sql = match op {
            AlterOperation::AddColumn { column } => {
                format!("ALTER TABLE {} ADD COLUMN {}", t, self.column_definition(column, true)?)
            }
            AlterOperation::DropColumn { name } => {
                format!("ALTER TABLE {} DROP COLUMN {}", t, self.quote_column(name))
            }
            AlterOperation::ModifyColumn { column } => {
                return Err(DbError::validation(format!(
                    "SQLite cannot modify column '{}' in place; add a new column and copy the data instead",
                    column.name
                )));
            }
            AlterOperation::RenameColumn { old_name, new_name } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                t,
                self.quote_column(old_name),
                self.quote_column(new_name)
            ),
        };
        Ok(vec![sql])
    }

    fn list_tables_query(&self, pattern: Option<&str>) -> Statement {
        let mut sql = String::from(
            "SELECT name AS table_name, NULL AS table_comment FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        );
        let mut params = Vec::new();
        if let Some(p) = pattern {
            sql.push_str(" AND name LIKE ?");
            params.push(QueryParam::String(like_pattern(p)));
        }
        sql.push_str(" ORDER BY name");
        Statement::new(sql, params)
    }

    fn describe_query(&self, table: &str) -> Statement {
        Statement::new(
            "SELECT p.name AS column_name, p.type AS data_type, \
             CASE WHEN p.\"notnull\" = 1 OR p.pk > 0 THEN 'NO' ELSE 'YES' END AS is_nullable, \
             CASE WHEN p.pk > 0 THEN 'PRI' ELSE '' END AS column_key, \
             p.dflt_value AS column_default, \
             '' AS extra, \
             NULL AS max_length, \
             NULL AS column_comment \
             FROM pragma_table_info(?) p ORDER BY p.cid",
            vec![QueryParam::String(table.to_string())],
        )
    }
}
