//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection registry and pool management
//! - Statement execution with timeouts and transactions
//! - Table structure and row-level operations
//! - Row decoding into JSON
//! - SQL Server connection pooling over tiberius

pub mod classify;
pub mod data;
pub mod executor;
pub mod mssql;
pub mod pool;
pub mod schema;
pub mod types;

pub use data::{BatchItemFailure, BatchOutcome, DataManager, PageResult, RawOutcome, SelectRequest};
pub use executor::{BatchFailure, QueryExecutor};
pub use pool::{ConnectionManager, ConnectionSummary, DbPool};
pub use schema::TableManager;
