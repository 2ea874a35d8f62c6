//! Schema-related data models.
//!
//! Engine-neutral descriptions of tables and columns, used both for DDL
//! input (create/alter) and for introspection output (list/describe).

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Engine-neutral column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AbstractType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Datetime,
    Binary,
}

impl AbstractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Binary => "binary",
        }
    }

    /// Parse an abstract type name, accepting a few common synonyms.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "text" | "string" | "str" => Some(Self::Text),
            "integer" | "int" => Some(Self::Integer),
            "decimal" | "number" | "float" => Some(Self::Decimal),
            "boolean" | "bool" => Some(Self::Boolean),
            "datetime" | "timestamp" => Some(Self::Datetime),
            "binary" | "bytes" | "blob" => Some(Self::Binary),
            _ => None,
        }
    }
}

impl std::fmt::Display for AbstractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column type given in DDL input: an abstract type, or a native type name
/// passed through to the engine verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Abstract(AbstractType),
    Native(String),
}

impl ColumnType {
    /// Interpret a type name from caller input.
    pub fn parse(name: &str) -> DbResult<Self> {
        if let Some(abstract_type) = AbstractType::parse(name) {
            return Ok(Self::Abstract(abstract_type));
        }
        let trimmed = name.trim();
        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, ' ' | '(' | ')' | ',' | '_');
        if trimmed.is_empty() || !trimmed.chars().all(allowed) {
            return Err(DbError::validation(format!(
                "invalid column type '{}'",
                name
            )));
        }
        Ok(Self::Native(trimmed.to_string()))
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        ColumnType::parse(&name).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Abstract(t) => serializer.serialize_str(t.as_str()),
            Self::Native(n) => serializer.serialize_str(n),
        }
    }
}

impl JsonSchema for ColumnType {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "ColumnType".into()
    }

    fn json_schema(generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        String::json_schema(generator)
    }
}

fn default_true() -> bool {
    true
}

/// Column definition for create/alter operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,
    /// Abstract type (text, integer, decimal, boolean, datetime, binary) or a native type such as "VARCHAR(64)"
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Length for text columns (e.g., 255)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Digits after the decimal point for decimal columns; length is the precision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    /// Whether NULL is allowed. Default: true
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Default value rendered as a literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Part of the primary key. Default: false
    #[serde(default)]
    pub primary_key: bool,
    /// Column comment (ignored by SQLite and SQL Server)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
            scale: None,
            nullable: true,
            default: None,
            primary_key: false,
            comment: None,
        }
    }

    /// Shorthand for an abstract-typed column.
    pub fn of(name: impl Into<String>, abstract_type: AbstractType) -> Self {
        Self::new(name, ColumnType::Abstract(abstract_type))
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Role of a column in the table's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Primary,
    Unique,
    Index,
    #[default]
    None,
}

impl KeyRole {
    /// Parse the key markers returned by catalog queries (PRI, UNI, MUL).
    pub fn from_marker(marker: &str) -> Self {
        match marker.trim().to_uppercase().as_str() {
            "PRI" | "P" | "PRIMARY" => Self::Primary,
            "UNI" | "U" | "UNIQUE" => Self::Unique,
            "MUL" | "INDEX" => Self::Index,
            _ => Self::None,
        }
    }

    pub fn is_key(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Column description returned by introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInfo {
    pub name: String,
    /// Engine-specific type name (e.g., "varchar(255)", "NUMBER")
    pub native_type: String,
    pub abstract_type: AbstractType,
    pub nullable: bool,
    pub key: KeyRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Extra attributes such as auto_increment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Describe output for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    /// Look up a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    /// Names of primary-key columns, in table order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.key == KeyRole::Primary)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Names of any key column (primary, unique or indexed), in table order.
    pub fn key_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.key.is_key())
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Table entry returned by list_tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One step of an alter_table request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum AlterOperation {
    /// Add a new column
    AddColumn { column: ColumnDefinition },
    /// Remove an existing column
    DropColumn { name: String },
    /// Change type, nullability or default of an existing column
    ModifyColumn { column: ColumnDefinition },
    /// Rename a column
    RenameColumn { old_name: String, new_name: String },
}

impl AlterOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddColumn { .. } => "add_column",
            Self::DropColumn { .. } => "drop_column",
            Self::ModifyColumn { .. } => "modify_column",
            Self::RenameColumn { .. } => "rename_column",
        }
    }
}
