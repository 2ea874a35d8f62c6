//! MCP tool implementations.
//!
//! This module contains all database tool handlers:
//! - `connection`: Runtime connections and the configuration file
//! - `schema`: List, describe, create, drop and alter tables
//! - `write`: Insert, update and delete rows, singly or in batches
//! - `query`: Raw statements and the select tools
//! - `format`: Text and HTML rendering of result sets

pub mod connection;
pub mod format;
pub mod query;
pub mod schema;
pub mod write;

pub use connection::{
    AddConnectionInput, AddConnectionOutput, ConfiguredConnectionInput, ConnectionToolHandler,
    ListConfiguredOutput, ListConnectionsOutput, ReloadOutput, RemoveConnectionInput,
    RemoveConnectionOutput, ToggleConnectionOutput,
};
pub use format::{DisplayStyle, FormatManager, FormattingOptions};
pub use query::{
    ExecuteQueryInput, ExecuteQueryOutput, HtmlSelectInput, HtmlSelectOutput, PagedSelectInput,
    PagedSelectOutput, QueryToolHandler, SelectDataInput, SelectDataOutput, SmartSelectInput,
    SmartSelectOutput, SummarySelectInput,
};
pub use schema::{
    AlterTableInput, CreateTableInput, DdlOutput, DropTableInput, ListTablesInput,
    ListTablesOutput, SchemaToolHandler, TableStructureInput, TableStructureOutput,
};
pub use write::{
    AffectedOutput, BatchDeleteInput, BatchInsertInput, BatchUpdateInput, DeleteInput,
    InsertInput, InsertOutput, UpdateInput, WriteToolHandler,
};
