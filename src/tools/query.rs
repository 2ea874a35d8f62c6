//! Read and raw-statement tools.
//!
//! This module implements `execute_query`, `select_data` and the advanced
//! formatting selects (`select_data_smart`, `select_data_paged`,
//! `select_data_summary`, `select_data_html`).

use crate::db::{DataManager, PageResult, RawOutcome, SelectRequest};
use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_PAGE_SIZE, OrderBy, ResultSet};
use crate::tools::format::{
    ColumnMeta, DEFAULT_COLUMNS_PER_PAGE, DEFAULT_ROWS_PER_PAGE, DEFAULT_SAMPLE_ROWS,
    DEFAULT_SMART_COLUMNS, DEFAULT_SUMMARY_COLUMNS, DisplayStyle, FormatManager,
    FormattingOptions, PagedView, SummaryView,
};
use crate::tools::write::{Row, parse_conditions};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Input for the execute_query tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteQueryInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    /// SQL statement, with placeholders in the engine's syntax (?, $1, :1 or @P1)
    pub query: String,
    /// Positional bind values
    #[serde(default)]
    pub params: Vec<JsonValue>,
    /// Commit writes. When false, writes run in a transaction that is rolled back. Default: false
    #[serde(default)]
    pub commit: bool,
}

/// Output from the execute_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExecuteQueryOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Present for row-producing statements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    pub row_count: usize,
    /// Present for statements that do not return rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
    pub committed: bool,
}

/// Select arguments shared by every select tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SelectArgs {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// Row filter: {"col": value}, {"col": [v1, v2]} or {"col": {"gte": 1, "lt": 9}}
    #[serde(default)]
    pub conditions: Option<Row>,
    /// Columns to return. Default: all columns
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Comma-separated sort keys, e.g. "created_at DESC, id"
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl SelectArgs {
    fn request(&self) -> DbResult<SelectRequest> {
        let order_by = match &self.order_by {
            Some(spec) => spec
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(OrderBy::parse)
                .collect::<DbResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(SelectRequest::new(&self.table_name)
            .with_conditions(parse_conditions(self.conditions.as_ref())?)
            .with_columns(self.columns.clone().unwrap_or_default())
            .with_order_by(order_by)
            .with_limit(self.limit)
            .with_offset(self.offset))
    }
}

/// Output format for select_data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SelectFormat {
    /// Bordered text table (default)
    #[default]
    Plain,
    /// Structured rows
    Json,
    /// Wide bordered table with single-line cells
    Ide,
    /// One block per row
    Vertical,
}

/// Input for the select_data tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SelectDataInput {
    #[serde(flatten)]
    pub select: SelectArgs,
    #[serde(default)]
    pub format: SelectFormat,
    /// 1-based page number; switches to paginated mode with total counts
    #[serde(default)]
    pub page: Option<u64>,
    /// Rows per page in paginated mode. Default: 100
    #[serde(default)]
    pub page_size: Option<u64>,
}

/// Pagination details of a paginated select_data call.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub total_records: u64,
}

/// Output from the select_data tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SelectDataOutput {
    pub columns: Vec<String>,
    pub row_count: usize,
    /// Rows, for the json format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    /// Rendered text, for the text formats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Input for the select_data_smart tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SmartSelectInput {
    #[serde(flatten)]
    pub select: SelectArgs,
    /// Most columns to show; key columns are always kept. Default: 10
    #[serde(default = "default_smart_columns")]
    pub max_columns: usize,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SmartSelectOutput {
    pub text: String,
    pub columns_shown: Vec<String>,
    pub omitted_columns: Vec<String>,
    pub row_count: usize,
}

/// Input for the select_data_paged tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PagedSelectInput {
    #[serde(flatten)]
    pub select: SelectArgs,
    /// Default: 8
    #[serde(default = "default_columns_per_page")]
    pub columns_per_page: usize,
    /// Default: 20
    #[serde(default = "default_rows_per_page")]
    pub rows_per_page: usize,
    /// Zero-based page index. Omit to render every page
    #[serde(default)]
    pub page: Option<usize>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PagedSelectOutput {
    /// Rows returned by the select before paging
    pub total_rows: usize,
    #[serde(flatten)]
    pub view: PagedView,
}

/// Input for the select_data_summary tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SummarySelectInput {
    #[serde(flatten)]
    pub select: SelectArgs,
    /// Columns with statistics. Default: 6
    #[serde(default = "default_summary_columns")]
    pub max_columns: usize,
    /// Rows shown as a sample. Default: 5
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

/// Input for the select_data_html tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HtmlSelectInput {
    #[serde(flatten)]
    pub select: SelectArgs,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct HtmlSelectOutput {
    /// Path of the written HTML document
    pub path: String,
    pub row_count: usize,
}

fn default_smart_columns() -> usize {
    DEFAULT_SMART_COLUMNS
}

fn default_columns_per_page() -> usize {
    DEFAULT_COLUMNS_PER_PAGE
}

fn default_rows_per_page() -> usize {
    DEFAULT_ROWS_PER_PAGE
}

fn default_summary_columns() -> usize {
    DEFAULT_SUMMARY_COLUMNS
}

fn default_sample_rows() -> usize {
    DEFAULT_SAMPLE_ROWS
}

pub struct QueryToolHandler {
    data: DataManager,
    html_dir: PathBuf,
}

impl QueryToolHandler {
    /// HTML documents go to the system temporary directory.
    pub fn new(data: DataManager) -> Self {
        Self::with_html_dir(data, std::env::temp_dir())
    }

    pub fn with_html_dir(data: DataManager, html_dir: impl Into<PathBuf>) -> Self {
        Self {
            data,
            html_dir: html_dir.into(),
        }
    }

    pub async fn execute_query(&self, input: ExecuteQueryInput) -> DbResult<ExecuteQueryOutput> {
        let outcome = self
            .data
            .execute_raw(&input.connection_name, &input.query, &input.params, input.commit)
            .await?;
        Ok(match outcome {
            RawOutcome::Rows(rs) => ExecuteQueryOutput {
                row_count: rs.len(),
                columns: Some(rs.columns),
                rows: Some(rs.rows),
                rows_affected: None,
                last_insert_id: None,
                committed: input.commit,
            },
            RawOutcome::Affected(outcome) => ExecuteQueryOutput {
                columns: None,
                rows: None,
                row_count: 0,
                rows_affected: Some(outcome.rows_affected),
                last_insert_id: outcome.last_insert_id,
                committed: input.commit,
            },
        })
    }

    pub async fn select_data(&self, input: SelectDataInput) -> DbResult<SelectDataOutput> {
        let request = input.select.request()?;
        let (rs, schema, pagination) = match input.page {
            Some(page) => {
                let page_size = input.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
                let (
                    PageResult {
                        columns,
                        rows,
                        page,
                        page_size,
                        total_pages,
                        total_records,
                    },
                    schema,
                ) = self
                    .data
                    .select_page_with_schema(&input.select.connection_name, request, page, page_size)
                    .await?;
                (
                    ResultSet::new(columns, rows),
                    schema,
                    Some(Pagination {
                        page,
                        page_size,
                        total_pages,
                        total_records,
                    }),
                )
            }
            None => {
                let (rs, schema) = self
                    .data
                    .select_with_schema(&input.select.connection_name, request)
                    .await?;
                (rs, schema, None)
            }
        };

        let style = match input.format {
            SelectFormat::Json => {
                return Ok(SelectDataOutput {
                    row_count: rs.len(),
                    columns: rs.columns,
                    rows: Some(rs.rows),
                    text: None,
                    pagination,
                });
            }
            SelectFormat::Plain => DisplayStyle::Plain,
            SelectFormat::Ide => DisplayStyle::Ide,
            SelectFormat::Vertical => DisplayStyle::Vertical,
        };
        let meta = ColumnMeta::from_schema(&schema);
        let text = FormatManager::render(
            &rs,
            &FormattingOptions::style(style),
            &meta,
            &input.select.table_name,
        );
        Ok(SelectDataOutput {
            row_count: rs.len(),
            columns: rs.columns,
            rows: None,
            text: Some(text),
            pagination,
        })
    }

    pub async fn select_data_smart(&self, input: SmartSelectInput) -> DbResult<SmartSelectOutput> {
        if input.max_columns == 0 {
            return Err(DbError::validation("max_columns must be at least 1"));
        }
        let (rs, meta) = self.fetch(&input.select).await?;
        let shown = FormatManager::smart_columns(&rs, input.max_columns, &meta);
        let omitted = rs
            .columns
            .iter()
            .filter(|c| !shown.contains(c))
            .cloned()
            .collect();
        Ok(SmartSelectOutput {
            text: FormatManager::smart(&rs, input.max_columns, &meta),
            columns_shown: shown,
            omitted_columns: omitted,
            row_count: rs.len(),
        })
    }

    pub async fn select_data_paged(&self, input: PagedSelectInput) -> DbResult<PagedSelectOutput> {
        if input.columns_per_page == 0 || input.rows_per_page == 0 {
            return Err(DbError::validation(
                "columns_per_page and rows_per_page must be at least 1",
            ));
        }
        let (rs, meta) = self.fetch(&input.select).await?;
        let view = FormatManager::paged(
            &rs,
            input.columns_per_page,
            input.rows_per_page,
            input.page,
            &meta,
        );
        Ok(PagedSelectOutput {
            total_rows: rs.len(),
            view,
        })
    }

    pub async fn select_data_summary(&self, input: SummarySelectInput) -> DbResult<SummaryView> {
        let (rs, meta) = self.fetch(&input.select).await?;
        Ok(FormatManager::summary(
            &rs,
            input.max_columns,
            input.sample_rows,
            &meta,
        ))
    }

    /// Render the rows as an HTML document and write it to a new file.
    pub async fn select_data_html(&self, input: HtmlSelectInput) -> DbResult<HtmlSelectOutput> {
        let (rs, meta) = self.fetch(&input.select).await?;
        let html = FormatManager::html(&rs, &input.select.table_name, &meta);

        let file_name = format!(
            "{}_{}.html",
            file_stem(&input.select.table_name),
            Uuid::new_v4().simple()
        );
        let path = self.html_dir.join(file_name);
        write_file(&self.html_dir, &path, html)
            .await
            .map_err(|e| DbError::internal(format!("failed to write HTML file: {}", e)))?;
        info!(path = %path.display(), rows = rs.len(), "HTML table written");
        Ok(HtmlSelectOutput {
            path: path.display().to_string(),
            row_count: rs.len(),
        })
    }

    async fn fetch(&self, select: &SelectArgs) -> DbResult<(ResultSet, ColumnMeta)> {
        let (rs, schema) = self
            .data
            .select_with_schema(&select.connection_name, select.request()?)
            .await?;
        Ok((rs, ColumnMeta::from_schema(&schema)))
    }
}

async fn write_file(dir: &Path, path: &Path, contents: String) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, contents).await
}

fn file_stem(table: &str) -> String {
    let stem: String = table
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() { "table".to_string() } else { stem }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConnectionManager, QueryExecutor};
    use crate::models::{AbstractType, ColumnDefinition, ConnectionConfig};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn handler(dir: &TempDir) -> QueryToolHandler {
        let connections = Arc::new(ConnectionManager::new());
        let path = dir.path().join("query.db");
        connections
            .register(ConnectionConfig::sqlite("db", path.to_string_lossy().to_string()))
            .await
            .unwrap();
        let data = DataManager::new(connections, QueryExecutor::new());
        data.tables()
            .create(
                "db",
                "fruit",
                &[
                    ColumnDefinition::of("id", AbstractType::Integer).primary_key(),
                    ColumnDefinition::of("name", AbstractType::Text).with_comment("label"),
                    ColumnDefinition::of("price", AbstractType::Decimal),
                ],
                None,
            )
            .await
            .unwrap();
        for (id, name, price) in [(1, "apple", 1.5), (2, "pear", 2.0), (3, "fig", 3.25)] {
            data.insert(
                "db",
                "fruit",
                json!({"id": id, "name": name, "price": price}).as_object().unwrap(),
            )
            .await
            .unwrap();
        }
        QueryToolHandler::with_html_dir(data, dir.path().join("html"))
    }

    fn select(table: &str) -> SelectArgs {
        SelectArgs {
            connection_name: "db".into(),
            table_name: table.into(),
            conditions: None,
            columns: None,
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    #[test]
    fn test_select_args_parse_order_by() {
        let mut args = select("t");
        args.order_by = Some("name DESC, id".into());
        let request = args.request().unwrap();
        assert_eq!(request.order_by, vec![OrderBy::desc("name"), OrderBy::asc("id")]);

        args.order_by = Some("name SIDEWAYS".into());
        assert!(args.request().is_err());
    }

    #[test]
    fn test_flattened_input_deserializes() {
        let input: PagedSelectInput = serde_json::from_value(json!({
            "connection_name": "db",
            "table_name": "t",
            "page": 2
        }))
        .unwrap();
        assert_eq!(input.columns_per_page, 8);
        assert_eq!(input.rows_per_page, 20);
        assert_eq!(input.page, Some(2));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("orders"), "orders");
        assert_eq!(file_stem("../x y"), "___x_y");
    }

    #[tokio::test]
    async fn test_select_data_json_and_plain() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir).await;

        let mut args = select("fruit");
        args.conditions = Some(json!({"id": 2}).as_object().cloned().unwrap());
        let json_out = handler
            .select_data(SelectDataInput {
                select: args.clone(),
                format: SelectFormat::Json,
                page: None,
                page_size: None,
            })
            .await
            .unwrap();
        let rows = json_out.rows.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("pear"));

        let plain = handler
            .select_data(SelectDataInput {
                select: args,
                format: SelectFormat::Plain,
                page: None,
                page_size: None,
            })
            .await
            .unwrap();
        assert!(plain.text.unwrap().contains("name(label)"));
    }

    #[tokio::test]
    async fn test_select_data_paginated() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir).await;
        let out = handler
            .select_data(SelectDataInput {
                select: select("fruit"),
                format: SelectFormat::Json,
                page: Some(2),
                page_size: Some(2),
            })
            .await
            .unwrap();
        let pagination = out.pagination.unwrap();
        assert_eq!(pagination.total_records, 3);
        assert_eq!(pagination.total_pages, 2);
        assert_eq!(out.row_count, 1);

        // Rendered pages carry column comments from the same describe
        let plain = handler
            .select_data(SelectDataInput {
                select: select("fruit"),
                format: SelectFormat::Plain,
                page: Some(1),
                page_size: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(plain.row_count, 2);
        assert!(plain.text.unwrap().contains("name(label)"));

        let (rs, schema) = handler
            .data
            .select_with_schema("db", SelectRequest::new("fruit"))
            .await
            .unwrap();
        assert_eq!(rs.len(), 3);
        assert_eq!(schema.columns.len(), 3);
    }

    #[tokio::test]
    async fn test_execute_query_rows_and_rollback() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir).await;

        let rows = handler
            .execute_query(ExecuteQueryInput {
                connection_name: "db".into(),
                query: "SELECT name FROM fruit WHERE id = ?".into(),
                params: vec![json!(3)],
                commit: false,
            })
            .await
            .unwrap();
        assert_eq!(rows.rows.unwrap()[0]["name"], json!("fig"));

        let deleted = handler
            .execute_query(ExecuteQueryInput {
                connection_name: "db".into(),
                query: "DELETE FROM fruit".into(),
                params: vec![],
                commit: false,
            })
            .await
            .unwrap();
        assert_eq!(deleted.rows_affected, Some(3));

        let still_there = handler
            .execute_query(ExecuteQueryInput {
                connection_name: "db".into(),
                query: "SELECT COUNT(*) AS n FROM fruit".into(),
                params: vec![],
                commit: false,
            })
            .await
            .unwrap();
        assert_eq!(still_there.rows.unwrap()[0]["n"], json!(3));
    }

    #[tokio::test]
    async fn test_smart_paged_summary_html() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir).await;

        let smart = handler
            .select_data_smart(SmartSelectInput {
                select: select("fruit"),
                max_columns: 2,
            })
            .await
            .unwrap();
        assert_eq!(smart.columns_shown.len(), 2);
        assert!(smart.columns_shown.contains(&"id".to_string()));
        assert_eq!(smart.omitted_columns.len(), 1);

        let paged = handler
            .select_data_paged(PagedSelectInput {
                select: select("fruit"),
                columns_per_page: 2,
                rows_per_page: 2,
                page: Some(50),
            })
            .await
            .unwrap();
        assert_eq!(paged.view.total_pages, 4);
        assert_eq!(paged.view.pages[0].row_count, 0);

        let summary = handler
            .select_data_summary(SummarySelectInput {
                select: select("fruit"),
                max_columns: 6,
                sample_rows: 1,
            })
            .await
            .unwrap();
        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.columns[1].min, Some(json!("apple")));

        let html = handler
            .select_data_html(HtmlSelectInput {
                select: select("fruit"),
            })
            .await
            .unwrap();
        let written = std::fs::read_to_string(&html.path).unwrap();
        assert!(written.contains("<title>Table Data: fruit</title>"));
        assert_eq!(html.row_count, 3);
    }
}
