//! Row write tools.
//!
//! This module implements `insert_data`, `update_data`, `delete_data` and
//! their batch variants. Conditions objects are parsed into filters here;
//! value coercion happens in the data manager against the table structure.

use crate::db::{BatchOutcome, DataManager};
use crate::error::DbResult;
use crate::models::Filter;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub type Row = Map<String, JsonValue>;

/// Input for the insert_data tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InsertInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// Column name to value
    pub data: Row,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct InsertOutput {
    pub rows_affected: u64,
    /// Generated key, when the engine reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
}

/// Input for the batch_insert_data tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchInsertInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// Rows to insert
    pub data_list: Vec<Row>,
    /// All rows in one transaction; any failure rolls everything back. Default: false
    #[serde(default)]
    pub atomic: bool,
}

/// Input for the update_data tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// Column name to new value
    pub data: Row,
    /// Row filter: {"col": value}, {"col": [v1, v2]} or {"col": {"gte": 1, "lt": 9}}
    #[serde(default)]
    pub conditions: Option<Row>,
    /// Required to update without conditions. Default: false
    #[serde(default)]
    pub affect_all_rows: bool,
}

/// Input for the batch_update_data tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchUpdateInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// New values per item
    pub data_list: Vec<Row>,
    /// Row filter per item, same length as data_list
    pub conditions_list: Vec<Option<Row>>,
    #[serde(default)]
    pub atomic: bool,
    #[serde(default)]
    pub affect_all_rows: bool,
}

/// Input for the delete_data tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// Row filter: {"col": value}, {"col": [v1, v2]} or {"col": {"gte": 1, "lt": 9}}
    #[serde(default)]
    pub conditions: Option<Row>,
    /// Required to delete without conditions. Default: false
    #[serde(default)]
    pub affect_all_rows: bool,
}

/// Input for the batch_delete_data tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchDeleteInput {
    /// Connection name from list_database_connections
    pub connection_name: String,
    pub table_name: String,
    /// Row filter per delete
    pub conditions_list: Vec<Option<Row>>,
    #[serde(default)]
    pub atomic: bool,
    #[serde(default)]
    pub affect_all_rows: bool,
}

/// Output of update_data and delete_data.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AffectedOutput {
    pub rows_affected: u64,
}

/// Parse an optional conditions object into a filter.
pub fn parse_conditions(conditions: Option<&Row>) -> DbResult<Option<Filter<JsonValue>>> {
    match conditions {
        Some(map) => Filter::from_conditions(map),
        None => Ok(None),
    }
}

fn parse_conditions_list(list: &[Option<Row>]) -> DbResult<Vec<Option<Filter<JsonValue>>>> {
    list.iter().map(|c| parse_conditions(c.as_ref())).collect()
}

pub struct WriteToolHandler {
    data: DataManager,
}

impl WriteToolHandler {
    pub fn new(data: DataManager) -> Self {
        Self { data }
    }

    pub async fn insert(&self, input: InsertInput) -> DbResult<InsertOutput> {
        let outcome = self
            .data
            .insert(&input.connection_name, &input.table_name, &input.data)
            .await?;
        Ok(InsertOutput {
            rows_affected: outcome.rows_affected,
            last_insert_id: outcome.last_insert_id,
        })
    }

    pub async fn batch_insert(&self, input: BatchInsertInput) -> DbResult<BatchOutcome> {
        self.data
            .batch_insert(
                &input.connection_name,
                &input.table_name,
                &input.data_list,
                input.atomic,
            )
            .await
    }

    pub async fn update(&self, input: UpdateInput) -> DbResult<AffectedOutput> {
        let filter = parse_conditions(input.conditions.as_ref())?;
        let rows_affected = self
            .data
            .update(
                &input.connection_name,
                &input.table_name,
                &input.data,
                filter,
                input.affect_all_rows,
            )
            .await?;
        Ok(AffectedOutput { rows_affected })
    }

    pub async fn batch_update(&self, input: BatchUpdateInput) -> DbResult<BatchOutcome> {
        let filters = parse_conditions_list(&input.conditions_list)?;
        self.data
            .batch_update(
                &input.connection_name,
                &input.table_name,
                &input.data_list,
                filters,
                input.atomic,
                input.affect_all_rows,
            )
            .await
    }

    pub async fn delete(&self, input: DeleteInput) -> DbResult<AffectedOutput> {
        let filter = parse_conditions(input.conditions.as_ref())?;
        let rows_affected = self
            .data
            .delete(
                &input.connection_name,
                &input.table_name,
                filter,
                input.affect_all_rows,
            )
            .await?;
        Ok(AffectedOutput { rows_affected })
    }

    pub async fn batch_delete(&self, input: BatchDeleteInput) -> DbResult<BatchOutcome> {
        let filters = parse_conditions_list(&input.conditions_list)?;
        self.data
            .batch_delete(
                &input.connection_name,
                &input.table_name,
                filters,
                input.atomic,
                input.affect_all_rows,
            )
            .await
    }
}
