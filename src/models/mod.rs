//! Data models for the multi-database MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfig, DatabaseType};
pub use query::{
    Bound, DEFAULT_PAGE_SIZE, ExecOutcome, Filter, MAX_PAGE_SIZE, OrderBy, QueryParam, QuerySpec,
    ResultSet, Statement,
};
pub use schema::{
    AbstractType, AlterOperation, ColumnDefinition, ColumnInfo, ColumnType, KeyRole, TableInfo,
    TableSchema,
};
