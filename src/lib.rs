//! Multi-Database MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to manage connections, tables and rows across MySQL, Oracle, PostgreSQL,
//! SQLite and SQL Server through one engine-neutral interface.

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod error_log;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::DbService;
