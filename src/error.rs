//! Error types for the multi-database MCP server.
//!
//! Every failure surfaced by the server belongs to one of a small set of
//! categories (configuration, connection, timeout, validation, query, not
//! found). Each variant carries an actionable message so that AI assistants
//! can understand and recover from the condition.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        /// Offending column, when the failure is tied to one
        column: Option<String>,
    },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42601" for a syntax error
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse error category, recorded in the error log and returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Connection,
    /// Pool acquisition or statement deadline; a connection-class failure
    Timeout,
    Validation,
    Query,
    NotFound,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Validation => "validation",
            Self::Query => "query",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a validation error that is not tied to a specific column.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            column: None,
        }
    }

    /// Create a validation error naming the offending column.
    pub fn invalid_column_value(column: impl Into<String>, message: impl AsRef<str>) -> Self {
        let column = column.into();
        Self::Validation {
            message: format!("column '{}': {}", column, message.as_ref()),
            column: Some(column),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an error for an unknown connection name.
    pub fn connection_not_found(name: impl AsRef<str>) -> Self {
        Self::not_found(format!(
            "connection '{}' is not registered",
            name.as_ref()
        ))
    }

    /// Create an error for a table that does not exist.
    pub fn table_not_found(table: impl AsRef<str>) -> Self {
        Self::not_found(format!("table '{}' does not exist", table.as_ref()))
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Query { .. } => ErrorKind::Query,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            Self::Timeout { .. } => {
                Some("Consider increasing the pool size or timeout, or retry later")
            }
            _ => None,
        }
    }

    /// Timeouts are connection-class failures.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Replace every occurrence of `secret` in the error text.
    pub fn redact(self, secret: Option<&str>) -> Self {
        let Some(secret) = secret.filter(|s| !s.is_empty()) else {
            return self;
        };
        let scrub = |s: String| s.replace(secret, "****");
        match self {
            Self::Configuration { message } => Self::Configuration {
                message: scrub(message),
            },
            Self::Connection {
                message,
                suggestion,
            } => Self::Connection {
                message: scrub(message),
                suggestion,
            },
            Self::Query {
                message,
                sql_state,
                suggestion,
            } => Self::Query {
                message: scrub(message),
                sql_state,
                suggestion,
            },
            Self::Internal { message } => Self::Internal {
                message: scrub(message),
            },
            other => other,
        }
    }
}

/// Engine error codes meaning "the referenced table does not exist".
fn is_missing_table(sql_state: Option<&str>, message: &str) -> bool {
    let lower = message.to_lowercase();
    matches!(sql_state, Some("42P01") | Some("42S02") | Some("1051") | Some("1146"))
        || lower.contains("no such table")
        || lower.contains("unknown table")
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                if is_missing_table(code.as_deref(), db_err.message()) {
                    return DbError::not_found(db_err.message());
                }
                DbError::query(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::not_found("no rows returned"),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 0),
            sqlx::Error::PoolClosed => DbError::connection(
                "Connection pool is closed",
                "Re-add the connection or reload configurations",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::validation(format!("column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert SQL Server driver errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;
        match err {
            TdsError::Server(token) => {
                let code = token.code();
                // 208: invalid object name, 3701: cannot drop, object does not exist
                if code == 208 || code == 3701 {
                    return DbError::not_found(token.message());
                }
                DbError::query(
                    token.message(),
                    Some(code.to_string()),
                    "Check the SQL syntax and referenced objects",
                )
            }
            TdsError::Io { message, .. } => DbError::connection(
                format!("I/O error: {}", message),
                "Check network connectivity and database server status",
            ),
            TdsError::Tls(message) => DbError::connection(
                format!("TLS error: {}", message),
                "Verify TLS configuration and certificates",
            ),
            TdsError::Routing { host, port } => DbError::connection(
                format!("Server requested routing to {}:{}", host, port),
                "Connect to the routed server directly",
            ),
            TdsError::Conversion(message) => {
                DbError::validation(format!("Value conversion failed: {}", message))
            }
            other => DbError::internal(format!("SQL Server driver error: {}", other)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(err: &DbError) -> Option<serde_json::Value> {
    let kind = err.kind();
    Some(match err.suggestion() {
        Some(s) => serde_json::json!({ "kind": kind, "suggestion": s }),
        None => serde_json::json!({ "kind": kind }),
    })
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// The error kind and suggestion travel in the `data` object.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(&err);
        match &err {
            DbError::Configuration { .. } | DbError::Validation { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }

            DbError::Query {
                message, sql_state, ..
            } => {
                let msg = match sql_state {
                    Some(code) => format!("Query failed: {} (SQLSTATE: {})", message, code),
                    None => err.to_string(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            DbError::NotFound { .. } => rmcp::ErrorData::resource_not_found(err.to_string(), data),

            DbError::Connection { .. } | DbError::Timeout { .. } | DbError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_invalid_column_value_names_column() {
        let err = DbError::invalid_column_value("created_at", "not a datetime");
        assert!(err.to_string().contains("created_at"));
        match err {
            DbError::Validation { column, .. } => assert_eq!(column.as_deref(), Some("created_at")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_is_connection_class() {
        let err = DbError::timeout("connection pool acquire", 30);
        assert!(err.is_connection_error());
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(!DbError::validation("x").is_connection_error());
    }

    #[test]
    fn test_redact_scrubs_password() {
        let err = DbError::connection("auth failed for user:hunter2@db", "check");
        let err = err.redact(Some("hunter2"));
        assert!(!err.to_string().contains("hunter2"));
        assert!(err.to_string().contains("****"));
    }

    #[test]
    fn test_redact_ignores_empty_secret() {
        let err = DbError::connection("failed", "check").redact(Some(""));
        assert_eq!(err.to_string(), "Connection failed: failed");
    }

    #[test]
    fn test_missing_table_detection() {
        assert!(is_missing_table(Some("42P01"), "relation \"x\" does not exist"));
        assert!(is_missing_table(None, "no such table: users"));
        assert!(is_missing_table(Some("42S02"), "Unknown table 'shop.users'"));
        assert!(!is_missing_table(Some("42601"), "syntax error"));
    }

    #[test]
    fn test_validation_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::validation("bad input").into();
        // invalid_params uses -32602
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_configuration_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::configuration("port out of range").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_not_found_maps_to_resource_not_found() {
        let mcp_err: rmcp::ErrorData = DbError::connection_not_found("conn1").into();
        // resource_not_found uses -32002 in rmcp
        assert_eq!(mcp_err.code.0, -32002);
        assert_eq!(mcp_err.data.unwrap()["kind"], "not_found");
    }

    #[test]
    fn test_connection_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = DbError::connection("failed", "try again").into();
        // internal_error uses -32603
        assert_eq!(mcp_err.code.0, -32603);
        assert_eq!(mcp_err.data.unwrap()["suggestion"], "try again");
    }

    #[test]
    fn test_timeout_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = DbError::timeout("query", 30).into();
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_query_error_includes_sql_state() {
        let err = DbError::query("syntax error", Some("42601".to_string()), "check syntax");
        let mcp_err: rmcp::ErrorData = err.into();
        assert!(mcp_err.message.contains("42601"));
        assert_eq!(mcp_err.code.0, -32602);
    }
}
