//! Table structure management.
//!
//! Listing and describing tables runs each engine's catalog query through
//! the executor; the catalog queries alias their result columns to one
//! shape, so row parsing is shared. DDL comes from the dialect and runs
//! inside a transaction (engines with implicit DDL commit behave per engine).

use crate::db::executor::QueryExecutor;
use crate::db::pool::{ConnectionManager, DbPool};
use crate::dialect::{Dialect, dialect_for};
use crate::error::{DbError, DbResult};
use crate::models::{
    AlterOperation, ColumnDefinition, ColumnInfo, KeyRole, Statement, TableInfo, TableSchema,
};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, info};

/// Lists, describes, creates, drops and alters tables.
#[derive(Debug, Clone)]
pub struct TableManager {
    connections: Arc<ConnectionManager>,
    executor: QueryExecutor,
}

impl TableManager {
    pub fn new(connections: Arc<ConnectionManager>, executor: QueryExecutor) -> Self {
        Self {
            connections,
            executor,
        }
    }

    /// Base tables of the connection, optionally filtered by a `*`/`?` pattern.
    pub async fn list_tables(
        &self,
        connection: &str,
        pattern: Option<&str>,
    ) -> DbResult<Vec<TableInfo>> {
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let rows = self
            .executor
            .fetch(&pool, &dialect.list_tables_query(pattern))
            .await?;

        let tables: Vec<TableInfo> = rows
            .rows
            .iter()
            .filter_map(|row| {
                Some(TableInfo {
                    name: text(row, "table_name")?,
                    comment: text(row, "table_comment"),
                })
            })
            .collect();
        debug!(connection_name = %connection, count = tables.len(), "Listed tables");
        Ok(tables)
    }

    /// Column structure of `table`, optionally filtered by a column pattern.
    ///
    /// A table without columns does not exist and yields `NotFound`.
    pub async fn describe(
        &self,
        connection: &str,
        table: &str,
        column_pattern: Option<&str>,
    ) -> DbResult<TableSchema> {
        let pool = self.connections.open(connection).await?;
        let schema = self.describe_on(&pool, table).await?;
        Ok(match column_pattern {
            Some(pattern) => TableSchema {
                table: schema.table,
                columns: schema
                    .columns
                    .into_iter()
                    .filter(|c| wildcard_match(pattern, &c.name))
                    .collect(),
            },
            None => schema,
        })
    }

    /// Describe on an already opened pool.
    pub(crate) async fn describe_on(&self, pool: &DbPool, table: &str) -> DbResult<TableSchema> {
        let dialect = dialect_for(pool.db_type());
        let rows = self.executor.fetch(pool, &dialect.describe_query(table)).await?;
        let columns: Vec<ColumnInfo> = rows
            .rows
            .iter()
            .filter_map(|row| column_info(dialect, row))
            .collect();
        if columns.is_empty() {
            return Err(DbError::table_not_found(table));
        }
        Ok(TableSchema {
            table: table.to_string(),
            columns,
        })
    }

    /// Create `table` with the given columns and optional comment.
    pub async fn create(
        &self,
        connection: &str,
        table: &str,
        columns: &[ColumnDefinition],
        comment: Option<&str>,
    ) -> DbResult<()> {
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let statements = dialect.build_create_table(table, columns, comment)?;
        self.run_ddl(&pool, statements).await?;
        info!(connection_name = %connection, table = %table, columns = columns.len(), "Created table");
        Ok(())
    }

    /// Drop `table`; `cascade` is honored where the engine supports it.
    pub async fn drop(&self, connection: &str, table: &str, cascade: bool) -> DbResult<()> {
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let sql = dialect.build_drop_table(table, cascade);
        self.run_ddl(&pool, vec![sql]).await?;
        info!(connection_name = %connection, table = %table, cascade, "Dropped table");
        Ok(())
    }

    /// Apply alter operations in order inside one transaction.
    ///
    /// Returns the number of statements executed.
    pub async fn alter(
        &self,
        connection: &str,
        table: &str,
        operations: &[AlterOperation],
    ) -> DbResult<usize> {
        if operations.is_empty() {
            return Err(DbError::validation("alter_table requires at least one operation"));
        }
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());

        let mut statements = Vec::new();
        for op in operations {
            statements.extend(dialect.build_alter_table(table, op)?);
        }
        let count = statements.len();
        self.run_ddl(&pool, statements).await?;
        info!(
            connection_name = %connection,
            table = %table,
            operations = operations.len(),
            statements = count,
            "Altered table"
        );
        Ok(count)
    }

    async fn run_ddl(&self, pool: &DbPool, statements: Vec<String>) -> DbResult<()> {
        let statements: Vec<Statement> = statements.into_iter().map(Statement::raw).collect();
        for stmt in &statements {
            debug!(sql = %stmt.sql, "DDL statement");
        }
        self.executor
            .execute_in_transaction(pool, &statements)
            .await
            .map(|_| ())
            .map_err(|failure| failure.error)
    }
}

/// Read a catalog column as text; numbers are rendered, empty strings are absent.
fn text(row: &Map<String, JsonValue>, key: &str) -> Option<String> {
    match row.get(key)? {
        JsonValue::String(s) if s.is_empty() => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}

fn column_info(dialect: &dyn Dialect, row: &Map<String, JsonValue>) -> Option<ColumnInfo> {
    let name = text(row, "column_name")?;
    let native_type = text(row, "data_type").unwrap_or_default();
    let nullable = text(row, "is_nullable")
        .map(|v| v.eq_ignore_ascii_case("YES") || v == "1" || v.eq_ignore_ascii_case("Y"))
        .unwrap_or(true);
    let max_length = match row.get("max_length") {
        Some(JsonValue::Number(n)) => n.as_i64(),
        Some(JsonValue::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| *n > 0);

    Some(ColumnInfo {
        abstract_type: dialect.abstract_type(&native_type),
        name,
        native_type,
        nullable,
        key: text(row, "column_key")
            .map(|k| KeyRole::from_marker(&k))
            .unwrap_or_default(),
        default: text(row, "column_default"),
        extra: text(row, "extra"),
        max_length,
        comment: text(row, "column_comment"),
    })
}

/// Case-insensitive match with `*` (any run) and `?` (one character) wildcards.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((sp, sn)) = star {
            p = sp + 1;
            n = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AbstractType, ConnectionConfig};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("user*", "users"));
        assert!(wildcard_match("USER*", "user_roles"));
        assert!(wildcard_match("?d", "id"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("*name*", "first_name_x"));
        assert!(!wildcard_match("user?", "users_x"));
        assert!(!wildcard_match("abc", "abd"));
    }

    #[test]
    fn test_column_info_from_catalog_row() {
        let row = json!({
            "column_name": "id",
            "data_type": "INTEGER",
            "is_nullable": "NO",
            "column_key": "PRI",
            "column_default": null,
            "extra": "",
            "max_length": null,
            "column_comment": null
        });
        let info = column_info(dialect_for(crate::models::DatabaseType::SQLite), row.as_object().unwrap())
            .unwrap();
        assert_eq!(info.name, "id");
        assert_eq!(info.abstract_type, AbstractType::Integer);
        assert!(!info.nullable);
        assert_eq!(info.key, KeyRole::Primary);
        assert_eq!(info.extra, None);
    }

    #[test]
    fn test_text_renders_numbers() {
        let row = json!({"a": 5, "b": "", "c": "x"});
        let row = row.as_object().unwrap();
        assert_eq!(text(row, "a"), Some("5".to_string()));
        assert_eq!(text(row, "b"), None);
        assert_eq!(text(row, "c"), Some("x".to_string()));
        assert_eq!(text(row, "missing"), None);
    }

    async fn manager(dir: &TempDir) -> TableManager {
        let connections = Arc::new(ConnectionManager::new());
        let path = dir.path().join("schema.db");
        connections
            .register(ConnectionConfig::sqlite("s", path.to_string_lossy().to_string()))
            .await
            .unwrap();
        TableManager::new(connections, QueryExecutor::new())
    }

    #[tokio::test]
    async fn test_create_describe_alter_drop() {
        let dir = TempDir::new().unwrap();
        let tables = manager(&dir).await;
        let columns = vec![
            ColumnDefinition::of("id", AbstractType::Integer).primary_key(),
            ColumnDefinition::of("name", AbstractType::Text).with_length(50),
        ];
        tables.create("s", "people", &columns, None).await.unwrap();

        let listed = tables.list_tables("s", Some("peo*")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "people");

        let schema = tables.describe("s", "people", None).await.unwrap();
        assert_eq!(schema.columns.len(), 2);
        assert_eq!(schema.primary_key(), vec!["id"]);

        let ops = vec![
            AlterOperation::AddColumn {
                column: ColumnDefinition::of("age", AbstractType::Integer),
            },
            AlterOperation::RenameColumn {
                old_name: "name".into(),
                new_name: "full_name".into(),
            },
        ];
        tables.alter("s", "people", &ops).await.unwrap();
        let schema = tables.describe("s", "people", Some("*name")).await.unwrap();
        assert_eq!(schema.columns.len(), 1);
        assert_eq!(schema.columns[0].name, "full_name");

        tables.drop("s", "people", false).await.unwrap();
        let err = tables.describe("s", "people", None).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_drop_missing_table_is_not_found() {
        let dir = TempDir::new().unwrap();
        let tables = manager(&dir).await;
        let err = tables.drop("s", "ghost", false).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_sqlite_modify_column_rejected() {
        let dir = TempDir::new().unwrap();
        let tables = manager(&dir).await;
        tables
            .create("s", "t", &[ColumnDefinition::of("a", AbstractType::Integer)], None)
            .await
            .unwrap();
        let ops = vec![AlterOperation::ModifyColumn {
            column: ColumnDefinition::of("a", AbstractType::Text),
        }];
        let err = tables.alter("s", "t", &ops).await.unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }
}
