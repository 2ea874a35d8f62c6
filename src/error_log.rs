//! Per-failure JSON error records.
//!
//! Each failed operation produces one file
//! `{operation}_{YYYYmmdd_HHMMSS_ffffff}_{8 hex}.json` in the log directory.
//! Writing happens on a spawned task so callers never wait on the disk.

use crate::error::DbError;
use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const REDACTED: &str = "****";

#[derive(Debug, Serialize)]
struct ErrorRecord {
    logged_at: String,
    operation_type: String,
    request_id: String,
    error_kind: String,
    message: String,
    context: JsonValue,
}

/// Writes error records to a directory.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    dir: PathBuf,
}

impl ErrorLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record a failure in the background and return the target path.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn record(&self, operation: &str, error: &DbError, context: JsonValue) -> PathBuf {
        let now = Local::now();
        let request_id = Uuid::new_v4();
        let file_name = format!(
            "{}_{}_{}.json",
            sanitize(operation),
            now.format("%Y%m%d_%H%M%S_%6f"),
            &request_id.simple().to_string()[..8]
        );
        let path = self.dir.join(file_name);
        let record = ErrorRecord {
            logged_at: now.to_rfc3339(),
            operation_type: operation.to_string(),
            request_id: request_id.to_string(),
            error_kind: error.kind().to_string(),
            message: error.to_string(),
            context: redact(context),
        };

        let dir = self.dir.clone();
        let target = path.clone();
        tokio::spawn(async move {
            if let Err(e) = write_record(&dir, &target, &record).await {
                warn!(path = %target.display(), error = %e, "Failed to write error log record");
            } else {
                debug!(path = %target.display(), "Error log record written");
            }
        });
        path
    }
}

async fn write_record(dir: &Path, path: &Path, record: &ErrorRecord) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let text = serde_json::to_string_pretty(record).map_err(std::io::Error::other)?;
    tokio::fs::write(path, text).await
}

fn sanitize(operation: &str) -> String {
    let cleaned: String = operation
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "operation".to_string()
    } else {
        cleaned
    }
}

/// Mask every value stored under a key named `password` (any case), at any depth.
pub fn redact(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if k.eq_ignore_ascii_case("password") && !v.is_null() {
                        (k, JsonValue::String(REDACTED.to_string()))
                    } else {
                        (k, redact(v))
                    }
                })
                .collect::<Map<_, _>>(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(redact).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_redact_nested_passwords() {
        let value = redact(json!({
            "name": "db",
            "Password": "s3cret",
            "nested": [{"PASSWORD": "x", "user": "u"}]
        }));
        assert_eq!(value["Password"], "****");
        assert_eq!(value["nested"][0]["PASSWORD"], "****");
        assert_eq!(value["nested"][0]["user"], "u");
        assert_eq!(value["name"], "db");
    }

    #[test]
    fn test_sanitize_operation() {
        assert_eq!(sanitize("insert_data"), "insert_data");
        assert_eq!(sanitize("a/b c"), "a_b_c");
        assert_eq!(sanitize(""), "operation");
    }

    #[tokio::test]
    async fn test_record_writes_file_in_background() {
        let dir = TempDir::new().unwrap();
        let log = ErrorLog::new(dir.path().join("errors"));
        let err = DbError::validation("bad row");
        let path = log.record("insert_data", &err, json!({"table": "t", "password": "p"}));

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("insert_data_"));
        assert!(name.ends_with(".json"));

        let mut text = None;
        for _ in 0..50 {
            if let Ok(t) = tokio::fs::read_to_string(&path).await {
                text = Some(t);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let record: JsonValue = serde_json::from_str(&text.expect("record written")).unwrap();
        assert_eq!(record["operation_type"], "insert_data");
        assert_eq!(record["error_kind"], "validation");
        assert_eq!(record["context"]["password"], "****");
        assert!(record["request_id"].as_str().is_some());
    }
}
