//! Integration tests for the configuration file and the error log.
//!
//! Tests verify that:
//! - A missing configuration file is created with defaults
//! - Malformed or invalid files are rejected with configuration errors
//! - Enabling and disabling persist and are idempotent
//! - Runtime connections can be saved to the file and removed from it
//! - Error records are written with passwords redacted

use multidb_mcp_server::config::{ConfigFile, ConfigManager, PoolOptions};
use multidb_mcp_server::db::ConnectionManager;
use multidb_mcp_server::error::DbError;
use multidb_mcp_server::error_log::ErrorLog;
use multidb_mcp_server::tools::connection::{
    AddConnectionInput, ConfiguredConnectionInput, ConnectionToolHandler, RemoveConnectionInput,
};
use serde_json::{Value as JsonValue, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

async fn write_config(path: &Path, value: JsonValue) {
    tokio::fs::write(path, value.to_string()).await.unwrap();
}

#[tokio::test]
async fn test_missing_file_is_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let manager = assert_ok!(ConfigManager::load(&path).await);
    assert!(manager.connections().await.is_empty());
    assert_eq!(manager.default_settings().await, PoolOptions::builtin());

    let text = tokio::fs::read_to_string(&path).await.unwrap();
    let parsed = assert_ok!(ConfigFile::parse(&text));
    assert_eq!(parsed, ConfigFile::empty());
}

#[tokio::test]
async fn test_malformed_and_invalid_files_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    tokio::fs::write(&path, "{ not json").await.unwrap();
    let err = assert_err!(ConfigManager::load(&path).await);
    assert!(matches!(err, DbError::Configuration { .. }));

    write_config(
        &path,
        json!({"connections": [{"name": "lite", "type": "sqlite", "database": "app.db", "pool_size": 0}]}),
    )
    .await;
    let err = assert_err!(ConfigManager::load(&path).await);
    assert!(err.to_string().contains("pool_size"));

    write_config(
        &path,
        json!({"connections": [
            {"name": "a", "type": "sqlite", "database": "a.db"},
            {"name": "a", "type": "sqlite", "database": "b.db"}
        ]}),
    )
    .await;
    let err = assert_err!(ConfigManager::load(&path).await);
    assert!(err.to_string().contains("duplicate"));

    write_config(
        &path,
        json!({"connections": [{"name": "x", "type": "db2", "database": "x"}]}),
    )
    .await;
    assert_err!(ConfigManager::load(&path).await);
}

#[tokio::test]
async fn test_enable_and_disable_persist() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    write_config(
        &path,
        json!({
            "connections": [
                {"name": "local", "type": "sqlite", "database": dir.path().join("l.db"), "enabled": true}
            ],
            "default_settings": {"pool_size": 3, "pool_timeout": 5}
        }),
    )
    .await;

    let config = Arc::new(assert_ok!(ConfigManager::load(&path).await));
    let handler = ConnectionToolHandler::new(Arc::new(ConnectionManager::new()), config.clone());
    let input = || ConfiguredConnectionInput {
        name: "local".to_string(),
    };

    let first = assert_ok!(handler.disable(input()).await);
    let second = assert_ok!(handler.disable(input()).await);
    assert!(first.success && second.success);
    assert!(!second.enabled);
    assert!(config.enabled_connections().await.is_empty());

    let unknown = assert_ok!(
        handler
            .disable(ConfiguredConnectionInput {
                name: "nope".to_string(),
            })
            .await
    );
    assert!(!unknown.success);

    // The change reaches the file
    let reread = assert_ok!(ConfigManager::load(&path).await);
    assert!(!reread.get("local").await.unwrap().enabled);

    assert_ok!(handler.enable(input()).await);
    let enabled = config.enabled_connections().await;
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].pool.pool_size, Some(3));
    assert_eq!(enabled[0].pool.pool_timeout, Some(5));
}

#[tokio::test]
async fn test_saved_connection_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    let config = Arc::new(assert_ok!(ConfigManager::load(&path).await));
    let connections = Arc::new(ConnectionManager::new());
    let handler = ConnectionToolHandler::new(connections.clone(), config.clone());

    let input = serde_json::from_value::<AddConnectionInput>(json!({
        "name": "saved",
        "type": "sqlite",
        "database": dir.path().join("saved.db"),
        "save_to_config": true
    }))
    .unwrap();
    let added = assert_ok!(handler.add_connection(input).await);
    assert!(added.connected);
    assert!(added.saved);
    assert!(connections.contains("saved").await);

    let listed = handler.list_configured().await;
    assert_eq!(listed.count, 1);

    let removed = assert_ok!(
        handler
            .remove_connection(RemoveConnectionInput {
                name: "saved".to_string(),
                remove_from_config: true,
            })
            .await
    );
    assert!(removed.removed);
    assert!(removed.removed_from_config);
    assert!(config.get("saved").await.is_none());

    let err = assert_err!(
        handler
            .remove_connection(RemoveConnectionInput {
                name: "saved".to_string(),
                remove_from_config: true,
            })
            .await
    );
    assert!(matches!(err, DbError::NotFound { .. }));
}

#[tokio::test]
async fn test_error_record_redacts_passwords() {
    let dir = TempDir::new().unwrap();
    let log = ErrorLog::new(dir.path().join("errors"));
    let error = DbError::connection("authentication failed", "Check the credentials");

    let path = log.record(
        "add_database_connection",
        &error,
        json!({
            "name": "prod",
            "password": "hunter2",
            "options": {"Password": "nested-secret"}
        }),
    );

    let mut record = None;
    for _ in 0..50 {
        if let Ok(text) = tokio::fs::read_to_string(&path).await
            && let Ok(value) = serde_json::from_str::<JsonValue>(&text)
        {
            record = Some((text, value));
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let (text, record) = record.expect("error record was not written");

    assert!(!text.contains("hunter2"));
    assert!(!text.contains("nested-secret"));
    assert_eq!(record["operation_type"], "add_database_connection");
    assert_eq!(record["error_kind"], "connection");
    assert_eq!(record["context"]["password"], "****");
    assert_eq!(record["context"]["options"]["Password"], "****");
    assert_eq!(record["context"]["name"], "prod");
    assert!(
        path.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("add_database_connection_")
    );
}
