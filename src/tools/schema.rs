//! Table structure tools.
//!
//! This module implements `list_tables`, `get_table_structure`,
//! `create_table`, `drop_table` and `alter_table`.

use crate::db::TableManager;
use crate::error::{DbError, DbResult};
use crate::models::{AlterOperation, ColumnDefinition, ColumnInfo, TableInfo};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input for the list_tables tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    /// Table name pattern with `*` and `?` wildcards (e.g., "user*")
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Output from the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    pub tables: Vec<TableInfo>,
    pub count: usize,
}

/// Input for the get_table_structure tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableStructureInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// Column name pattern with `*` and `?` wildcards
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Output from the get_table_structure tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableStructureOutput {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    /// Column names that form the primary key
    pub primary_key: Vec<String>,
}

/// Input for the create_table tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateTableInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// Column definitions in table order
    pub columns: Vec<ColumnDefinition>,
    /// Table comment (MySQL, PostgreSQL and Oracle)
    #[serde(default)]
    pub table_comment: Option<String>,
}

/// Input for the drop_table tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DropTableInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// Also drop dependent objects where the engine supports it. Default: false
    #[serde(default)]
    pub cascade: bool,
}

/// Input for the alter_table tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AlterTableInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// Operations applied in order inside one transaction
    pub operations: Vec<AlterOperation>,
}

/// Output shared by the DDL tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DdlOutput {
    pub success: bool,
    pub message: String,
}

pub struct SchemaToolHandler {
    tables: TableManager,
}

impl SchemaToolHandler {
    pub fn new(tables: TableManager) -> Self {
        Self { tables }
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let tables = self
            .tables
            .list_tables(&input.connection_name, input.pattern.as_deref())
            .await?;
        Ok(ListTablesOutput {
            count: tables.len(),
            tables,
        })
    }

    pub async fn get_table_structure(
        &self,
        input: TableStructureInput,
    ) -> DbResult<TableStructureOutput> {
        let schema = self
            .tables
            .describe(&input.connection_name, &input.table_name, input.pattern.as_deref())
            .await?;
        Ok(TableStructureOutput {
            primary_key: schema.primary_key().into_iter().map(String::from).collect(),
            table_name: schema.table,
            columns: schema.columns,
        })
    }

    pub async fn create_table(&self, input: CreateTableInput) -> DbResult<DdlOutput> {
        if input.columns.is_empty() {
            return Err(DbError::validation("create_table requires at least one column"));
        }
        self.tables
            .create(
                &input.connection_name,
                &input.table_name,
                &input.columns,
                input.table_comment.as_deref(),
            )
            .await?;
        Ok(DdlOutput {
            success: true,
            message: format!(
                "Table '{}' created with {} columns",
                input.table_name,
                input.columns.len()
            ),
        })
    }

    pub async fn drop_table(&self, input: DropTableInput) -> DbResult<DdlOutput> {
        self.tables
            .drop(&input.connection_name, &input.table_name, input.cascade)
            .await?;
        Ok(DdlOutput {
            success: true,
            message: format!("Table '{}' dropped", input.table_name),
        })
    }

    pub async fn alter_table(&self, input: AlterTableInput) -> DbResult<DdlOutput> {
        let statements = self
            .tables
            .alter(&input.connection_name, &input.table_name, &input.operations)
            .await?;
        let names: Vec<&str> = input.operations.iter().map(AlterOperation::name).collect();
        info!(
            connection_name = %input.connection_name,
            table = %input.table_name,
            operations = %names.join(","),
            "alter_table finished"
        );
        Ok(DdlOutput {
            success: true,
            message: format!(
                "Table '{}' altered: {} operations, {} statements",
                input.table_name,
                input.operations.len(),
                statements
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConnectionManager, QueryExecutor};
    use crate::models::{AbstractType, ConnectionConfig};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn handler(dir: &TempDir) -> SchemaToolHandler {
        let connections = Arc::new(ConnectionManager::new());
        let path = dir.path().join("tools.db");
        connections
            .register(ConnectionConfig::sqlite("db", path.to_string_lossy().to_string()))
            .await
            .unwrap();
        SchemaToolHandler::new(TableManager::new(connections, QueryExecutor::new()))
    }

    #[test]
    fn test_create_input_deserializes_abstract_and_native_types() {
        let input: CreateTableInput = serde_json::from_value(json!({
            "connection_name": "db",
            "table_name": "t",
            "columns": [
                {"name": "id", "type": "integer", "primary_key": true},
                {"name": "tag", "type": "VARCHAR(16)", "nullable": false}
            ]
        }))
        .unwrap();
        assert_eq!(input.columns.len(), 2);
        assert!(!input.columns[1].nullable);
    }

    #[test]
    fn test_alter_input_uses_operation_tag() {
        let input: AlterTableInput = serde_json::from_value(json!({
            "connection_name": "db",
            "table_name": "t",
            "operations": [
                {"operation": "drop_column", "name": "old"},
                {"operation": "rename_column", "old_name": "a", "new_name": "b"}
            ]
        }))
        .unwrap();
        assert_eq!(input.operations[0].name(), "drop_column");
        assert_eq!(input.operations[1].name(), "rename_column");
    }

    #[tokio::test]
    async fn test_create_then_structure() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir).await;
        handler
            .create_table(CreateTableInput {
                connection_name: "db".into(),
                table_name: "items".into(),
                columns: vec![
                    ColumnDefinition::of("id", AbstractType::Integer).primary_key(),
                    ColumnDefinition::of("label", AbstractType::Text),
                ],
                table_comment: None,
            })
            .await
            .unwrap();

        let structure = handler
            .get_table_structure(TableStructureInput {
                connection_name: "db".into(),
                table_name: "items".into(),
                pattern: None,
            })
            .await
            .unwrap();
        assert_eq!(structure.primary_key, vec!["id"]);
        assert_eq!(structure.columns.len(), 2);

        let listed = handler
            .list_tables(ListTablesInput {
                connection_name: "db".into(),
                pattern: None,
            })
            .await
            .unwrap();
        assert_eq!(listed.count, 1);
    }

    #[tokio::test]
    async fn test_create_without_columns_rejected() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir).await;
        let err = handler
            .create_table(CreateTableInput {
                connection_name: "db".into(),
                table_name: "empty".into(),
                columns: vec![],
                table_comment: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }
}
