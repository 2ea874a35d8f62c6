//! Row-level operations: select, insert, update, delete and raw SQL.
//!
//! Every operation resolves the table's columns through [`TableManager`]
//! once, coerces caller JSON into typed bind values with the dialect, and
//! builds fully parameterized statements. Batches are best-effort unless
//! `atomic` is set, in which case the whole batch shares one transaction.

use crate::db::classify::returns_rows;
use crate::db::executor::{BatchFailure, QueryExecutor};
use crate::db::pool::{ConnectionManager, DbPool};
use crate::db::schema::TableManager;
use crate::dialect::{Dialect, dialect_for};
use crate::error::{DbError, DbResult};
use crate::models::{
    ExecOutcome, Filter, MAX_PAGE_SIZE, OrderBy, QueryParam, QuerySpec, ResultSet, Statement,
    TableSchema,
};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Caller-facing select parameters with untyped filter values.
#[derive(Debug, Clone, Default)]
pub struct SelectRequest {
    pub table: String,
    /// Empty selects every column in table order
    pub columns: Vec<String>,
    pub conditions: Option<Filter<JsonValue>>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn with_conditions(mut self, conditions: Option<Filter<JsonValue>>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_order_by(mut self, order_by: Vec<OrderBy>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: Option<u64>) -> Self {
        self.offset = offset;
        self
    }
}

/// One page of a paginated select.
#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct PageResult {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, JsonValue>>,
    /// 1-based page number
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub total_records: u64,
}

/// Failure of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct BatchItemFailure {
    pub index: usize,
    pub error: String,
}

/// Summary of a batch write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, schemars::JsonSchema)]
pub struct BatchOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows_affected: u64,
    pub failures: Vec<BatchItemFailure>,
    /// True when an atomic batch was rolled back
    pub rolled_back: bool,
}

/// Result of a raw statement.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutcome {
    Rows(ResultSet),
    Affected(ExecOutcome),
}

/// Which write a batch performs; used for messages.
#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Update,
    Delete,
}

impl WriteKind {
    fn verb(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Data operations on named connections.
#[derive(Debug, Clone)]
pub struct DataManager {
    connections: Arc<ConnectionManager>,
    tables: TableManager,
    executor: QueryExecutor,
}

impl DataManager {
    pub fn new(connections: Arc<ConnectionManager>, executor: QueryExecutor) -> Self {
        let tables = TableManager::new(Arc::clone(&connections), executor.clone());
        Self {
            connections,
            tables,
            executor,
        }
    }

    pub fn tables(&self) -> &TableManager {
        &self.tables
    }

    /// Rows of one table; an empty column list selects every column.
    pub async fn select(&self, connection: &str, request: SelectRequest) -> DbResult<ResultSet> {
        self.select_with_schema(connection, request)
            .await
            .map(|(rs, _)| rs)
    }

    /// Like [`select`](Self::select), also returning the described table.
    pub async fn select_with_schema(
        &self,
        connection: &str,
        request: SelectRequest,
    ) -> DbResult<(ResultSet, TableSchema)> {
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let schema = self.tables.describe_on(&pool, &request.table).await?;
        let spec = prepare_select(dialect, &schema, request)?;
        let rs = self.run_select(&pool, dialect, &schema, &spec).await?;
        Ok((rs, schema))
    }

    /// One page of rows plus total counts; `page` is 1-based.
    ///
    /// A page past the end yields no rows rather than an error.
    pub async fn select_page(
        &self,
        connection: &str,
        request: SelectRequest,
        page: u64,
        page_size: u64,
    ) -> DbResult<PageResult> {
        self.select_page_with_schema(connection, request, page, page_size)
            .await
            .map(|(page, _)| page)
    }

    pub async fn select_page_with_schema(
        &self,
        connection: &str,
        request: SelectRequest,
        page: u64,
        page_size: u64,
    ) -> DbResult<(PageResult, TableSchema)> {
        if page == 0 {
            return Err(DbError::validation("page numbers start at 1"));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(DbError::validation(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let schema = self.tables.describe_on(&pool, &request.table).await?;
        let offset = (page - 1).saturating_mul(page_size);
        let spec = prepare_select(
            dialect,
            &schema,
            request.with_limit(Some(page_size)).with_offset(Some(offset)),
        )?;

        let count = dialect.build_count(&spec.table, spec.filter.as_ref())?;
        let counted = self.executor.fetch(&pool, &count).await?;
        let total_records = first_integer(&counted).unwrap_or(0);
        let total_pages = total_records.div_ceil(page_size);

        let rows = if offset < total_records {
            self.run_select(&pool, dialect, &schema, &spec).await?
        } else {
            ResultSet::new(spec.columns.clone(), Vec::new())
        };
        debug!(
            connection_name = %connection,
            table = %spec.table,
            page,
            total_records,
            "Selected page"
        );
        let result = PageResult {
            columns: rows.columns,
            rows: rows.rows,
            page,
            page_size,
            total_pages,
            total_records,
        };
        Ok((result, schema))
    }

    async fn run_select(
        &self,
        pool: &DbPool,
        dialect: &dyn Dialect,
        schema: &TableSchema,
        spec: &QuerySpec,
    ) -> DbResult<ResultSet> {
        let stmt = dialect.build_select(spec)?;
        debug!(sql = %stmt.sql, "Select statement");
        let mut rows = self.executor.fetch(pool, &stmt).await?;
        dialect.finish_rows(&mut rows);
        decode_rows(dialect, schema, &mut rows);
        Ok(rows)
    }

    /// Insert one row.
    pub async fn insert(
        &self,
        connection: &str,
        table: &str,
        row: &Map<String, JsonValue>,
    ) -> DbResult<ExecOutcome> {
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let schema = self.tables.describe_on(&pool, table).await?;
        let stmt = dialect.build_insert(table, &coerce_row(dialect, &schema, row)?)?;
        let outcome = self.executor.execute(&pool, &stmt).await?;
        info!(connection_name = %connection, table = %table, rows_affected = outcome.rows_affected, "Inserted row");
        Ok(outcome)
    }

    /// Insert many rows; see the module docs for atomicity.
    pub async fn batch_insert(
        &self,
        connection: &str,
        table: &str,
        rows: &[Map<String, JsonValue>],
        atomic: bool,
    ) -> DbResult<BatchOutcome> {
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let schema = self.tables.describe_on(&pool, table).await?;
        let statements: Vec<DbResult<Statement>> = rows
            .iter()
            .map(|row| dialect.build_insert(table, &coerce_row(dialect, &schema, row)?))
            .collect();
        let outcome = self.run_batch(&pool, statements, atomic).await;
        info!(
            connection_name = %connection,
            table = %table,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "Batch insert finished"
        );
        Ok(outcome)
    }

    /// Update rows matching `conditions`; returns the affected row count.
    pub async fn update(
        &self,
        connection: &str,
        table: &str,
        values: &Map<String, JsonValue>,
        conditions: Option<Filter<JsonValue>>,
        affect_all_rows: bool,
    ) -> DbResult<u64> {
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let schema = self.tables.describe_on(&pool, table).await?;
        let stmt = build_update(dialect, &schema, table, values, conditions, affect_all_rows)?;
        let outcome = self.executor.execute(&pool, &stmt).await?;
        info!(connection_name = %connection, table = %table, rows_affected = outcome.rows_affected, "Updated rows");
        Ok(outcome.rows_affected)
    }

    /// Apply `data_list[i]` to rows matching `conditions_list[i]`.
    pub async fn batch_update(
        &self,
        connection: &str,
        table: &str,
        data_list: &[Map<String, JsonValue>],
        conditions_list: Vec<Option<Filter<JsonValue>>>,
        atomic: bool,
        affect_all_rows: bool,
    ) -> DbResult<BatchOutcome> {
        if data_list.len() != conditions_list.len() {
            return Err(DbError::validation(format!(
                "data_list has {} items but conditions_list has {}",
                data_list.len(),
                conditions_list.len()
            )));
        }
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let schema = self.tables.describe_on(&pool, table).await?;
        let statements: Vec<DbResult<Statement>> = data_list
            .iter()
            .zip(conditions_list)
            .map(|(values, conditions)| {
                build_update(dialect, &schema, table, values, conditions, affect_all_rows)
            })
            .collect();
        let outcome = self.run_batch(&pool, statements, atomic).await;
        log_batch(connection, table, WriteKind::Update, &outcome);
        Ok(outcome)
    }

    /// Delete rows matching `conditions`; returns the affected row count.
    pub async fn delete(
        &self,
        connection: &str,
        table: &str,
        conditions: Option<Filter<JsonValue>>,
        affect_all_rows: bool,
    ) -> DbResult<u64> {
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let schema = self.tables.describe_on(&pool, table).await?;
        let stmt = build_delete(dialect, &schema, table, conditions, affect_all_rows)?;
        let outcome = self.executor.execute(&pool, &stmt).await?;
        info!(connection_name = %connection, table = %table, rows_affected = outcome.rows_affected, "Deleted rows");
        Ok(outcome.rows_affected)
    }

    /// Delete rows for each filter in `conditions_list`.
    pub async fn batch_delete(
        &self,
        connection: &str,
        table: &str,
        conditions_list: Vec<Option<Filter<JsonValue>>>,
        atomic: bool,
        affect_all_rows: bool,
    ) -> DbResult<BatchOutcome> {
        let pool = self.connections.open(connection).await?;
        let dialect = dialect_for(pool.db_type());
        let schema = self.tables.describe_on(&pool, table).await?;
        let statements: Vec<DbResult<Statement>> = conditions_list
            .into_iter()
            .map(|conditions| build_delete(dialect, &schema, table, conditions, affect_all_rows))
            .collect();
        let outcome = self.run_batch(&pool, statements, atomic).await;
        log_batch(connection, table, WriteKind::Delete, &outcome);
        Ok(outcome)
    }

    /// Run caller SQL verbatim with positional bind values.
    ///
    /// Row-producing statements return their rows, other statements the
    /// affected count. Without `commit` every statement runs in a
    /// transaction that is rolled back, including writes with RETURNING.
    pub async fn execute_raw(
        &self,
        connection: &str,
        sql: &str,
        params: &[JsonValue],
        commit: bool,
    ) -> DbResult<RawOutcome> {
        if sql.trim().is_empty() {
            return Err(DbError::validation("query cannot be empty"));
        }
        let pool = self.connections.open(connection).await?;
        let stmt = Statement::new(sql, params.iter().map(QueryParam::from_json).collect());

        if returns_rows(sql, pool.db_type()) {
            let rows = if commit {
                self.executor.fetch_in_transaction(&pool, &stmt).await?
            } else {
                self.executor.fetch_and_rollback(&pool, &stmt).await?
            };
            debug!(connection_name = %connection, rows = rows.len(), "Raw query returned rows");
            return Ok(RawOutcome::Rows(rows));
        }

        let outcome = if commit {
            let mut outcomes = self
                .executor
                .execute_in_transaction(&pool, std::slice::from_ref(&stmt))
                .await
                .map_err(|f| f.error)?;
            outcomes.pop().unwrap_or_default()
        } else {
            self.executor.execute_and_rollback(&pool, &stmt).await?
        };
        info!(
            connection_name = %connection,
            rows_affected = outcome.rows_affected,
            committed = commit,
            "Raw statement executed"
        );
        Ok(RawOutcome::Affected(outcome))
    }

    async fn run_batch(
        &self,
        pool: &DbPool,
        statements: Vec<DbResult<Statement>>,
        atomic: bool,
    ) -> BatchOutcome {
        let total = statements.len();
        let mut outcome = BatchOutcome {
            total,
            ..BatchOutcome::default()
        };

        if atomic {
            // Nothing runs unless every item builds
            let mut ready = Vec::with_capacity(total);
            for (index, stmt) in statements.into_iter().enumerate() {
                match stmt {
                    Ok(stmt) => ready.push(stmt),
                    Err(error) => return rolled_back(total, BatchFailure { index, error }),
                }
            }
            return match self.executor.execute_in_transaction(pool, &ready).await {
                Ok(results) => {
                    outcome.succeeded = total;
                    outcome.rows_affected = results.iter().map(|r| r.rows_affected).sum();
                    outcome
                }
                Err(failure) => rolled_back(total, failure),
            };
        }

        for (index, stmt) in statements.into_iter().enumerate() {
            let result = match stmt {
                Ok(stmt) => self.executor.execute(pool, &stmt).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(r) => {
                    outcome.succeeded += 1;
                    outcome.rows_affected += r.rows_affected;
                }
                Err(e) => {
                    warn!(index, error = %e, "Batch item failed");
                    outcome.failed += 1;
                    outcome.failures.push(BatchItemFailure {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }
}

fn rolled_back(total: usize, failure: BatchFailure) -> BatchOutcome {
    warn!(index = failure.index, error = %failure.error, "Atomic batch rolled back");
    BatchOutcome {
        total,
        succeeded: 0,
        failed: total,
        rows_affected: 0,
        failures: vec![BatchItemFailure {
            index: failure.index,
            error: failure.error.to_string(),
        }],
        rolled_back: true,
    }
}

fn log_batch(connection: &str, table: &str, kind: WriteKind, outcome: &BatchOutcome) {
    info!(
        connection_name = %connection,
        table = %table,
        operation = kind.verb(),
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        rows_affected = outcome.rows_affected,
        "Batch finished"
    );
}

/// Resolve `column` against the table, returning the stored name.
fn resolve_column<'a>(schema: &'a TableSchema, column: &str) -> DbResult<&'a crate::models::ColumnInfo> {
    schema.column(column).ok_or_else(|| {
        DbError::invalid_column_value(
            column,
            format!("column does not exist in table '{}'", schema.table),
        )
    })
}

/// Coerce one row of caller JSON into typed bind values.
fn coerce_row(
    dialect: &dyn Dialect,
    schema: &TableSchema,
    row: &Map<String, JsonValue>,
) -> DbResult<Vec<(String, QueryParam)>> {
    if row.is_empty() {
        return Err(DbError::validation("row data cannot be empty"));
    }
    row.iter()
        .map(|(column, value)| {
            let info = resolve_column(schema, column)?;
            let param = dialect.coerce_value(&info.name, info.abstract_type, value)?;
            Ok((info.name.clone(), param))
        })
        .collect()
}

/// Coerce filter values by the type of the column each is compared against.
fn coerce_filter(
    dialect: &dyn Dialect,
    schema: &TableSchema,
    filter: Option<Filter<JsonValue>>,
) -> DbResult<Option<Filter>> {
    let Some(filter) = filter else {
        return Ok(None);
    };
    if filter.is_empty() {
        return Ok(None);
    }
    let typed = filter.try_map(&mut |column: &str, value: JsonValue| {
        let info = resolve_column(schema, column)?;
        dialect.coerce_value(&info.name, info.abstract_type, &value)
    })?;
    Ok(Some(typed))
}

/// Refuse table-wide writes unless explicitly requested.
fn guard_filter(
    kind: WriteKind,
    table: &str,
    filter: &Option<Filter>,
    affect_all_rows: bool,
) -> DbResult<()> {
    if filter.is_none() && !affect_all_rows {
        return Err(DbError::validation(format!(
            "refusing to {} every row of '{}' without conditions; set affect_all_rows to true",
            kind.verb(),
            table
        )));
    }
    Ok(())
}

fn build_update(
    dialect: &dyn Dialect,
    schema: &TableSchema,
    table: &str,
    values: &Map<String, JsonValue>,
    conditions: Option<Filter<JsonValue>>,
    affect_all_rows: bool,
) -> DbResult<Statement> {
    let filter = coerce_filter(dialect, schema, conditions)?;
    guard_filter(WriteKind::Update, table, &filter, affect_all_rows)?;
    let values = coerce_row(dialect, schema, values)?;
    dialect.build_update(table, &values, filter.as_ref())
}

fn build_delete(
    dialect: &dyn Dialect,
    schema: &TableSchema,
    table: &str,
    conditions: Option<Filter<JsonValue>>,
    affect_all_rows: bool,
) -> DbResult<Statement> {
    let filter = coerce_filter(dialect, schema, conditions)?;
    guard_filter(WriteKind::Delete, table, &filter, affect_all_rows)?;
    dialect.build_delete(table, filter.as_ref())
}

/// Validate names against the schema and type the filter.
fn prepare_select(
    dialect: &dyn Dialect,
    schema: &TableSchema,
    request: SelectRequest,
) -> DbResult<QuerySpec> {
    let columns = if request.columns.is_empty() {
        schema.columns.iter().map(|c| c.name.clone()).collect()
    } else {
        request
            .columns
            .iter()
            .map(|c| resolve_column(schema, c).map(|info| info.name.clone()))
            .collect::<DbResult<Vec<_>>>()?
    };
    let order_by = request
        .order_by
        .into_iter()
        .map(|o| {
            let name = resolve_column(schema, &o.column)?.name.clone();
            Ok(OrderBy {
                column: name,
                descending: o.descending,
            })
        })
        .collect::<DbResult<Vec<_>>>()?;
    let filter = coerce_filter(dialect, schema, request.conditions)?;

    Ok(QuerySpec::new(request.table)
        .with_columns(columns)
        .with_filter(filter)
        .with_order_by(order_by)
        .with_limit(request.limit)
        .with_offset(request.offset))
}

/// Normalize engine values by each column's abstract type.
fn decode_rows(dialect: &dyn Dialect, schema: &TableSchema, rows: &mut ResultSet) {
    for row in &mut rows.rows {
        for (column, value) in row.iter_mut() {
            if let Some(info) = schema.column(column) {
                let raw = std::mem::take(value);
                *value = dialect.decode_value(info.abstract_type, raw);
            }
        }
    }
}

/// First cell of the first row as an unsigned integer (count queries).
fn first_integer(rows: &ResultSet) -> Option<u64> {
    let row = rows.rows.first()?;
    let value = rows
        .columns
        .first()
        .and_then(|c| row.get(c))
        .or_else(|| row.values().next())?;
    match value {
        JsonValue::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AbstractType, ColumnInfo, DatabaseType, KeyRole};
    use serde_json::json;

    fn schema() -> TableSchema {
        let column = |name: &str, abstract_type| ColumnInfo {
            name: name.to_string(),
            native_type: String::new(),
            abstract_type,
            nullable: true,
            key: KeyRole::None,
            default: None,
            extra: None,
            max_length: None,
            comment: None,
        };
        TableSchema {
            table: "items".to_string(),
            columns: vec![
                column("id", AbstractType::Integer),
                column("name", AbstractType::Text),
                column("created", AbstractType::Datetime),
            ],
        }
    }

    fn sqlite() -> &'static dyn Dialect {
        dialect_for(DatabaseType::SQLite)
    }

    #[test]
    fn test_coerce_row_rejects_unknown_column() {
        let row = json!({"id": 1, "nope": 2});
        let err = coerce_row(sqlite(), &schema(), row.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_coerce_row_rejects_empty_row() {
        let err = coerce_row(sqlite(), &schema(), &Map::new()).unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }

    #[test]
    fn test_coerce_row_uses_column_types() {
        let row = json!({"ID": "7", "created": "2024-01-02T03:04:05Z"});
        let values = coerce_row(sqlite(), &schema(), row.as_object().unwrap()).unwrap();
        assert!(values.contains(&("id".to_string(), QueryParam::Int(7))));
        assert!(values.iter().any(|(c, v)| c == "created" && matches!(v, QueryParam::DateTime(_))));
    }

    #[test]
    fn test_empty_filter_guard() {
        let err = build_delete(sqlite(), &schema(), "items", None, false).unwrap_err();
        assert!(err.to_string().contains("affect_all_rows"));

        let empty = Some(Filter::all(Vec::new()));
        assert!(build_delete(sqlite(), &schema(), "items", empty, false).is_err());

        let stmt = build_delete(sqlite(), &schema(), "items", None, true).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"items\"");
    }

    #[test]
    fn test_prepare_select_fills_columns_and_checks_order() {
        let spec = prepare_select(sqlite(), &schema(), SelectRequest::new("items")).unwrap();
        assert_eq!(spec.columns, vec!["id", "name", "created"]);

        let bad = SelectRequest::new("items").with_order_by(vec![OrderBy::asc("ghost")]);
        assert!(prepare_select(sqlite(), &schema(), bad).is_err());
    }

    #[test]
    fn test_first_integer() {
        let rows = ResultSet::new(
            vec!["total".into()],
            vec![json!({"total": 42}).as_object().unwrap().clone()],
        );
        assert_eq!(first_integer(&rows), Some(42));
        let rows = ResultSet::new(
            vec!["TOTAL".into()],
            vec![json!({"TOTAL": "9"}).as_object().unwrap().clone()],
        );
        assert_eq!(first_integer(&rows), Some(9));
        assert_eq!(first_integer(&ResultSet::default()), None);
    }
}
