//! MCP service implementation using rmcp.
//!
//! This module defines the DbService struct with all database tools
//! exposed via the MCP protocol using the rmcp framework's macros.
//! Every failed tool call is written to the error log before it is
//! converted into an MCP error.

use crate::config::ConfigManager;
use crate::db::{BatchOutcome, ConnectionManager, DataManager, QueryExecutor};
use crate::error::DbResult;
use crate::error_log::ErrorLog;
use crate::tools::connection::{
    AddConnectionInput, AddConnectionOutput, ConfiguredConnectionInput, ConnectionToolHandler,
    ListConfiguredOutput, ListConnectionsOutput, ReloadOutput, RemoveConnectionInput,
    RemoveConnectionOutput, ToggleConnectionOutput,
};
use crate::tools::format::SummaryView;
use crate::tools::query::{
    ExecuteQueryInput, ExecuteQueryOutput, HtmlSelectInput, HtmlSelectOutput, PagedSelectInput,
    PagedSelectOutput, QueryToolHandler, SelectDataInput, SelectDataOutput, SmartSelectInput,
    SmartSelectOutput, SummarySelectInput,
};
use crate::tools::schema::{
    AlterTableInput, CreateTableInput, DdlOutput, DropTableInput, ListTablesInput,
    ListTablesOutput, SchemaToolHandler, TableStructureInput, TableStructureOutput,
};
use crate::tools::write::{
    AffectedOutput, BatchDeleteInput, BatchInsertInput, BatchUpdateInput, DeleteInput,
    InsertInput, InsertOutput, UpdateInput, WriteToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct DbService {
    /// Shared registry of named connection pools
    connection_manager: Arc<ConnectionManager>,
    /// Configuration file behind the config tools
    config_manager: Arc<ConfigManager>,
    /// Row and table operations
    data: DataManager,
    error_log: ErrorLog,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

/// Tool input as error-log context.
fn context_of<T: Serialize>(input: &T) -> JsonValue {
    serde_json::to_value(input).unwrap_or(JsonValue::Null)
}

impl DbService {
    /// Create a new DbService instance.
    ///
    /// # Arguments
    ///
    /// * `connection_manager` - Shared connection registry, already initialized
    /// * `config_manager` - Configuration file used by the config tools
    /// * `executor` - Statement executor carrying the statement timeout
    /// * `error_log` - Destination for per-failure error records
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        config_manager: Arc<ConfigManager>,
        executor: QueryExecutor,
        error_log: ErrorLog,
    ) -> Self {
        let data = DataManager::new(Arc::clone(&connection_manager), executor);
        Self {
            connection_manager,
            config_manager,
            data,
            error_log,
            tool_router: Self::tool_router(),
        }
    }

    /// Registry shared with the transports, which close it on shutdown.
    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.connection_manager
    }

    /// Validate connection name - ensure it is provided and non-empty.
    ///
    /// Returns the trimmed name if valid, otherwise returns an error
    /// guiding the user to call list_database_connections first.
    fn validate_connection_name(&self, provided: &str) -> Result<String, McpError> {
        let trimmed = provided.trim();
        if trimmed.is_empty() {
            Err(McpError::invalid_params(
                "connection_name is required. Call list_database_connections first to get available connection names.",
                None,
            ))
        } else {
            Ok(trimmed.to_string())
        }
    }

    /// Log a failure to the error log, then map it to an MCP error.
    fn respond<T>(
        &self,
        operation: &str,
        context: JsonValue,
        result: DbResult<T>,
    ) -> Result<Json<T>, McpError> {
        result.map(Json).map_err(|e| {
            let record = self.error_log.record(operation, &e, context);
            warn!(operation, error = %e, record = %record.display(), "Tool call failed");
            McpError::from(e)
        })
    }

    fn connections(&self) -> ConnectionToolHandler {
        ConnectionToolHandler::new(
            Arc::clone(&self.connection_manager),
            Arc::clone(&self.config_manager),
        )
    }

    fn schema(&self) -> SchemaToolHandler {
        SchemaToolHandler::new(self.data.tables().clone())
    }

    fn writer(&self) -> WriteToolHandler {
        WriteToolHandler::new(self.data.clone())
    }

    fn reader(&self) -> QueryToolHandler {
        QueryToolHandler::new(self.data.clone())
    }
}

#[tool_router]
impl DbService {
    #[tool(
        description = "Register a database connection, open its pool and test it.\nTypes: mysql, oracle, postgresql, sqlite, sqlserver. For SQLite, database is the file path.\nSet save_to_config to also write it to the configuration file."
    )]
    async fn add_database_connection(
        &self,
        Parameters(input): Parameters<AddConnectionInput>,
    ) -> Result<Json<AddConnectionOutput>, McpError> {
        let mut input = input;
        input.name = self.validate_connection_name(&input.name)?;
        let context = context_of(&input);
        let result = self.connections().add_connection(input).await;
        self.respond("add_database_connection", context, result)
    }

    #[tool(
        description = "Close and unregister a database connection.\nSet remove_from_config to also delete it from the configuration file."
    )]
    async fn remove_database_connection(
        &self,
        Parameters(input): Parameters<RemoveConnectionInput>,
    ) -> Result<Json<RemoveConnectionOutput>, McpError> {
        let context = context_of(&input);
        let result = self.connections().remove_connection(input).await;
        self.respond("remove_database_connection", context, result)
    }

    #[tool(
        description = "List registered database connections.\nReturns names, types, endpoints, whether the pool is open, and pool sizing."
    )]
    async fn list_database_connections(&self) -> Json<ListConnectionsOutput> {
        Json(self.connections().list_connections().await)
    }

    #[tool(description = "List connections in the configuration file with passwords masked.")]
    async fn list_configured_connections(&self) -> Json<ListConfiguredOutput> {
        Json(self.connections().list_configured().await)
    }

    #[tool(
        description = "Mark a configured connection as enabled.\nTakes effect on reload_configurations."
    )]
    async fn enable_configured_connection(
        &self,
        Parameters(input): Parameters<ConfiguredConnectionInput>,
    ) -> Result<Json<ToggleConnectionOutput>, McpError> {
        let context = context_of(&input);
        let result = self.connections().enable(input).await;
        self.respond("enable_configured_connection", context, result)
    }

    #[tool(
        description = "Mark a configured connection as disabled.\nRepeating the call is harmless. Takes effect on reload_configurations."
    )]
    async fn disable_configured_connection(
        &self,
        Parameters(input): Parameters<ConfiguredConnectionInput>,
    ) -> Result<Json<ToggleConnectionOutput>, McpError> {
        let context = context_of(&input);
        let result = self.connections().disable(input).await;
        self.respond("disable_configured_connection", context, result)
    }

    #[tool(
        description = "Re-read the configuration file and reconnect every enabled connection.\nReturns connection name to connected."
    )]
    async fn reload_configurations(&self) -> Result<Json<ReloadOutput>, McpError> {
        let result = self.connections().reload().await;
        self.respond("reload_configurations", JsonValue::Null, result)
    }

    #[tool(
        description = "List tables of a connection.\nOptional pattern with * and ? wildcards, e.g. \"user*\"."
    )]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.schema().list_tables(input).await;
        self.respond("list_tables", context, result)
    }

    #[tool(
        description = "Get the column structure of a table: native and abstract types, nullability, keys, defaults and comments.\nOptional column pattern with * and ? wildcards."
    )]
    async fn get_table_structure(
        &self,
        Parameters(input): Parameters<TableStructureInput>,
    ) -> Result<Json<TableStructureOutput>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.schema().get_table_structure(input).await;
        self.respond("get_table_structure", context, result)
    }

    #[tool(
        description = "Create a table.\nColumn types: text, integer, decimal, boolean, datetime, binary, or a native type such as VARCHAR(64)."
    )]
    async fn create_table(
        &self,
        Parameters(input): Parameters<CreateTableInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.schema().create_table(input).await;
        self.respond("create_table", context, result)
    }

    #[tool(description = "Drop a table.\nSet cascade to drop dependent objects where supported.")]
    async fn drop_table(
        &self,
        Parameters(input): Parameters<DropTableInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.schema().drop_table(input).await;
        self.respond("drop_table", context, result)
    }

    #[tool(
        description = "Alter a table with ordered operations: add_column, drop_column, modify_column, rename_column.\nAll operations run in one transaction."
    )]
    async fn alter_table(
        &self,
        Parameters(input): Parameters<AlterTableInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.schema().alter_table(input).await;
        self.respond("alter_table", context, result)
    }

    #[tool(
        description = "Execute a SQL statement with positional parameters in the engine's placeholder syntax.\nRow-producing statements return rows. Writes are rolled back unless commit is true."
    )]
    async fn execute_query(
        &self,
        Parameters(input): Parameters<ExecuteQueryInput>,
    ) -> Result<Json<ExecuteQueryOutput>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.reader().execute_query(input).await;
        self.respond("execute_query", context, result)
    }

    #[tool(
        description = "Select rows from a table.\nconditions: {\"col\": value}, {\"col\": [v1, v2]} or {\"col\": {\"gte\": 1, \"lt\": 9}}.\nformat: plain (default text table), json, ide or vertical. Set page/page_size for paginated results with totals."
    )]
    async fn select_data(
        &self,
        Parameters(input): Parameters<SelectDataInput>,
    ) -> Result<Json<SelectDataOutput>, McpError> {
        let mut input = input;
        input.select.connection_name =
            self.validate_connection_name(&input.select.connection_name)?;
        let context = context_of(&input);
        let result = self.reader().select_data(input).await;
        self.respond("select_data", context, result)
    }

    #[tool(description = "Insert one row. Values are converted to the column types.")]
    async fn insert_data(
        &self,
        Parameters(input): Parameters<InsertInput>,
    ) -> Result<Json<InsertOutput>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.writer().insert(input).await;
        self.respond("insert_data", context, result)
    }

    #[tool(
        description = "Insert many rows.\nBy default each row succeeds or fails on its own and failures are reported by index. Set atomic to roll back everything on any failure."
    )]
    async fn batch_insert_data(
        &self,
        Parameters(input): Parameters<BatchInsertInput>,
    ) -> Result<Json<BatchOutcome>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.writer().batch_insert(input).await;
        self.respond("batch_insert_data", context, result)
    }

    #[tool(
        description = "Update rows matching conditions.\nUpdating without conditions requires affect_all_rows=true."
    )]
    async fn update_data(
        &self,
        Parameters(input): Parameters<UpdateInput>,
    ) -> Result<Json<AffectedOutput>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.writer().update(input).await;
        self.respond("update_data", context, result)
    }

    #[tool(
        description = "Apply data_list[i] to rows matching conditions_list[i].\nSame atomic and affect_all_rows rules as batch_insert_data and update_data."
    )]
    async fn batch_update_data(
        &self,
        Parameters(input): Parameters<BatchUpdateInput>,
    ) -> Result<Json<BatchOutcome>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.writer().batch_update(input).await;
        self.respond("batch_update_data", context, result)
    }

    #[tool(
        description = "Delete rows matching conditions.\nDeleting without conditions requires affect_all_rows=true."
    )]
    async fn delete_data(
        &self,
        Parameters(input): Parameters<DeleteInput>,
    ) -> Result<Json<AffectedOutput>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.writer().delete(input).await;
        self.respond("delete_data", context, result)
    }

    #[tool(description = "Delete rows for each entry of conditions_list.")]
    async fn batch_delete_data(
        &self,
        Parameters(input): Parameters<BatchDeleteInput>,
    ) -> Result<Json<BatchOutcome>, McpError> {
        let mut input = input;
        input.connection_name = self.validate_connection_name(&input.connection_name)?;
        let context = context_of(&input);
        let result = self.writer().batch_delete(input).await;
        self.respond("batch_delete_data", context, result)
    }

    #[tool(
        description = "Select rows and show only the most informative columns.\nKey columns are always kept; other columns are ranked by distinct values. Default max_columns: 10."
    )]
    async fn select_data_smart(
        &self,
        Parameters(input): Parameters<SmartSelectInput>,
    ) -> Result<Json<SmartSelectOutput>, McpError> {
        let mut input = input;
        input.select.connection_name =
            self.validate_connection_name(&input.select.connection_name)?;
        let context = context_of(&input);
        let result = self.reader().select_data_smart(input).await;
        self.respond("select_data_smart", context, result)
    }

    #[tool(
        description = "Select rows and split the result into column pages by row pages.\npage is zero-based; omit it to render every page. A page past the end is empty."
    )]
    async fn select_data_paged(
        &self,
        Parameters(input): Parameters<PagedSelectInput>,
    ) -> Result<Json<PagedSelectOutput>, McpError> {
        let mut input = input;
        input.select.connection_name =
            self.validate_connection_name(&input.select.connection_name)?;
        let context = context_of(&input);
        let result = self.reader().select_data_paged(input).await;
        self.respond("select_data_paged", context, result)
    }

    #[tool(
        description = "Select rows and summarize them: per-column non-null, distinct, null counts and min/max, plus sample rows."
    )]
    async fn select_data_summary(
        &self,
        Parameters(input): Parameters<SummarySelectInput>,
    ) -> Result<Json<SummaryView>, McpError> {
        let mut input = input;
        input.select.connection_name =
            self.validate_connection_name(&input.select.connection_name)?;
        let context = context_of(&input);
        let result = self.reader().select_data_summary(input).await;
        self.respond("select_data_summary", context, result)
    }

    #[tool(
        description = "Select rows and write them as an HTML table to a temporary file.\nReturns the file path."
    )]
    async fn select_data_html(
        &self,
        Parameters(input): Parameters<HtmlSelectInput>,
    ) -> Result<Json<HtmlSelectOutput>, McpError> {
        let mut input = input;
        input.select.connection_name =
            self.validate_connection_name(&input.select.connection_name)?;
        let context = context_of(&input);
        let result = self.reader().select_data_html(input).await;
        self.respond("select_data_html", context, result)
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "multidb-mcp-server".to_owned(),
                title: Some("Multi-Database MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Database tools for MySQL, Oracle, PostgreSQL, SQLite and SQL Server.\n\
                \n\
                ## Workflow\n\
                1. Call `list_database_connections` to get connection names\n\
                2. Use `connection_name` from step 1 in all other tool calls\n\
                3. Call `get_table_structure` before writing so values match column types\n\
                \n\
                ## Conditions\n\
                - `{\"id\": 1}` equality, `{\"id\": [1, 2]}` membership\n\
                - `{\"age\": {\"gte\": 18, \"lt\": 65}}` ranges\n\
                - Update and delete without conditions require `affect_all_rows: true`\n\
                \n\
                ## Batches\n\
                Batch tools report failures per index. Pass `atomic: true` to roll back\n\
                the whole batch on any failure.\n\
                \n\
                ## Raw SQL\n\
                `execute_query` rolls back writes unless `commit: true`.\n\
                Placeholders: `?` (MySQL, SQLite), `$1` (PostgreSQL), `:1` (Oracle), `@P1` (SQL Server).\n\
                \n\
                ## Configuration\n\
                `add_database_connection` with `save_to_config: true` persists a connection.\n\
                Enable/disable flags take effect on `reload_configurations`."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_test_service(dir: &TempDir) -> DbService {
        let config = ConfigManager::load(dir.path().join("database_config.json"))
            .await
            .unwrap();
        DbService::new(
            Arc::new(ConnectionManager::new()),
            Arc::new(config),
            QueryExecutor::new(),
            ErrorLog::new(dir.path().join("error_logs")),
        )
    }

    #[tokio::test]
    async fn test_validate_connection_name() {
        let dir = TempDir::new().unwrap();
        let service = create_test_service(&dir).await;
        assert_eq!(service.validate_connection_name("  mydb  ").unwrap(), "mydb");
        let err = service.validate_connection_name("   ").unwrap_err();
        assert!(err.to_string().contains("connection_name is required"));
    }

    #[tokio::test]
    async fn test_server_info() {
        let dir = TempDir::new().unwrap();
        let service = create_test_service(&dir).await;
        let info = service.get_info();
        assert_eq!(info.server_info.name, "multidb-mcp-server");
        assert!(info.capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn test_failed_tool_writes_error_record() {
        let dir = TempDir::new().unwrap();
        let service = create_test_service(&dir).await;

        let err = service
            .list_tables(Parameters(ListTablesInput {
                connection_name: "missing".into(),
                pattern: None,
            }))
            .await
            .err()
            .expect("list_tables should fail for unknown connection");
        assert_eq!(err.code, rmcp::model::ErrorCode::RESOURCE_NOT_FOUND);

        let log_dir = dir.path().join("error_logs");
        let mut found = None;
        for _ in 0..50 {
            let entry = std::fs::read_dir(&log_dir)
                .ok()
                .and_then(|mut entries| entries.next())
                .and_then(Result::ok);
            if let Some(entry) = entry {
                let text = std::fs::read_to_string(entry.path()).unwrap_or_default();
                if let Ok(record) = serde_json::from_str::<JsonValue>(&text) {
                    found = Some((entry.path(), record));
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let (path, record) = found.expect("error record written");
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("list_tables_")
        );
        assert_eq!(record["error_kind"], "not_found");
        assert_eq!(record["context"]["connection_name"], "missing");
    }
}
