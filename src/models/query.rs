//! Query-related data models.
//!
//! This module defines bind parameters, the filter expression tree, the
//! abstract select specification and the uniform result set.

use crate::error::{DbError, DbResult};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// Rows returned by the paginated select when no page size is given.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Maximum page size for paginated selects.
pub const MAX_PAGE_SIZE: u64 = 10000;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Exact numeric kept in its textual form
    Decimal(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Binary data (base64 encoded in JSON)
    #[serde(serialize_with = "base64_bytes::serialize")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Decimal(_) => "decimal",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Untyped conversion used for raw statements, where no column type is known.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

/// One end of a range predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound<V> {
    pub value: V,
    pub inclusive: bool,
}

impl<V> Bound<V> {
    pub fn inclusive(value: V) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: V) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }
}

/// Row filter expression.
///
/// Parsed from caller input with raw JSON values, then converted to
/// [`QueryParam`] values once column types are known.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter<V = QueryParam> {
    /// `column = value`; a null value means `column IS NULL`
    Eq { column: String, value: V },
    Range {
        column: String,
        lower: Option<Bound<V>>,
        upper: Option<Bound<V>>,
    },
    /// Set membership; an empty set matches nothing
    In { column: String, values: Vec<V> },
    And { filters: Vec<Filter<V>> },
}

impl<V> Filter<V> {
    pub fn eq(column: impl Into<String>, value: V) -> Self {
        Self::Eq {
            column: column.into(),
            value,
        }
    }

    pub fn range(column: impl Into<String>, lower: Option<Bound<V>>, upper: Option<Bound<V>>) -> Self {
        Self::Range {
            column: column.into(),
            lower,
            upper,
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<V>) -> Self {
        Self::In {
            column: column.into(),
            values,
        }
    }

    /// Combine predicates; a single predicate is returned unwrapped.
    pub fn all(mut filters: Vec<Filter<V>>) -> Self {
        if filters.len() == 1 {
            if let Some(only) = filters.pop() {
                return only;
            }
        }
        Self::And { filters }
    }

    /// True when the filter has no predicates and would match every row.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And { filters } => filters.iter().all(Filter::is_empty),
            _ => false,
        }
    }

    /// Column names referenced by this filter, in order of appearance.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Eq { column, .. } | Self::Range { column, .. } | Self::In { column, .. } => {
                out.push(column)
            }
            Self::And { filters } => filters.iter().for_each(|f| f.collect_columns(out)),
        }
    }

    /// Convert every value, passing the column it is compared against.
    pub fn try_map<W, F>(self, f: &mut F) -> DbResult<Filter<W>>
    where
        F: FnMut(&str, V) -> DbResult<W>,
    {
        Ok(match self {
            Self::Eq { column, value } => {
                let value = f(&column, value)?;
                Filter::Eq { column, value }
            }
            Self::Range {
                column,
                lower,
                upper,
            } => {
                let lower = match lower {
                    Some(b) => Some(Bound {
                        value: f(&column, b.value)?,
                        inclusive: b.inclusive,
                    }),
                    None => None,
                };
                let upper = match upper {
                    Some(b) => Some(Bound {
                        value: f(&column, b.value)?,
                        inclusive: b.inclusive,
                    }),
                    None => None,
                };
                Filter::Range {
                    column,
                    lower,
                    upper,
                }
            }
            Self::In { column, values } => {
                let values = values
                    .into_iter()
                    .map(|v| f(&column, v))
                    .collect::<DbResult<Vec<_>>>()?;
                Filter::In { column, values }
            }
            Self::And { filters } => Filter::And {
                filters: filters
                    .into_iter()
                    .map(|inner| inner.try_map(f))
                    .collect::<DbResult<Vec<_>>>()?,
            },
        })
    }
}

impl Filter<JsonValue> {
    /// Parse a `conditions` object.
    ///
    /// `{"col": v}` is equality, `{"col": [..]}` or `{"col": {"in": [..]}}`
    /// is set membership, and `{"col": {"gt"|"gte"|"lt"|"lte"|"eq": v}}`
    /// builds range and equality predicates. Returns `None` for no conditions.
    pub fn from_conditions(conditions: &Map<String, JsonValue>) -> DbResult<Option<Self>> {
        let mut predicates = Vec::new();
        for (column, value) in conditions {
            match value {
                JsonValue::Object(ops) => predicates.extend(Self::parse_operators(column, ops)?),
                JsonValue::Array(values) => {
                    predicates.push(Filter::is_in(column.clone(), values.clone()))
                }
                other => predicates.push(Filter::eq(column.clone(), other.clone())),
            }
        }
        if predicates.is_empty() {
            return Ok(None);
        }
        Ok(Some(Filter::all(predicates)))
    }

    fn parse_operators(column: &str, ops: &Map<String, JsonValue>) -> DbResult<Vec<Self>> {
        if ops.is_empty() {
            return Err(DbError::invalid_column_value(column, "empty condition object"));
        }
        let mut out = Vec::new();
        let mut lower = None;
        let mut upper = None;
        for (op, value) in ops {
            match op.as_str() {
                "eq" => out.push(Filter::eq(column, value.clone())),
                "gt" => lower = Some(Bound::exclusive(value.clone())),
                "gte" => lower = Some(Bound::inclusive(value.clone())),
                "lt" => upper = Some(Bound::exclusive(value.clone())),
                "lte" => upper = Some(Bound::inclusive(value.clone())),
                "in" => match value {
                    JsonValue::Array(values) => out.push(Filter::is_in(column, values.clone())),
                    _ => {
                        return Err(DbError::invalid_column_value(
                            column,
                            "operator 'in' expects an array",
                        ));
                    }
                },
                other => {
                    return Err(DbError::invalid_column_value(
                        column,
                        format!(
                            "unsupported operator '{}' (expected eq, gt, gte, lt, lte or in)",
                            other
                        ),
                    ));
                }
            }
        }
        if lower.is_some() || upper.is_some() {
            out.push(Filter::range(column, lower, upper));
        }
        Ok(out)
    }
}

/// Sort key for a select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    /// Parse `"col"`, `"col ASC"`, `"col DESC"` or `"-col"`.
    pub fn parse(spec: &str) -> DbResult<Self> {
        let spec = spec.trim();
        if let Some(column) = spec.strip_prefix('-') {
            return Ok(Self::desc(column.trim()));
        }
        let mut parts = spec.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| DbError::validation("order_by entry cannot be empty"))?;
        let descending = match parts.next().map(|d| d.to_ascii_uppercase()) {
            None => false,
            Some(d) if d == "ASC" => false,
            Some(d) if d == "DESC" => true,
            Some(d) => {
                return Err(DbError::validation(format!(
                    "invalid sort direction '{}' in order_by '{}'",
                    d, spec
                )));
            }
        };
        if parts.next().is_some() {
            return Err(DbError::validation(format!("invalid order_by '{}'", spec)));
        }
        Ok(Self {
            column: column.to_string(),
            descending,
        })
    }
}

/// Abstract description of a select against one table.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub table: String,
    /// Empty means all columns
    pub columns: Vec<String>,
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QuerySpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
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

    /// Pagination offset, treating `None` as zero.
    pub fn effective_offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }
}

/// SQL text plus its positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Statement without bind values.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// Ordered rows with their ordered column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, schemars::JsonSchema)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, JsonValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Map<String, JsonValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, in row order (missing cells read as null).
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a JsonValue> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(column).unwrap_or(&JsonValue::Null))
    }

    /// Drop a column from the header and every row.
    pub fn remove_column(&mut self, column: &str) {
        self.columns.retain(|c| !c.eq_ignore_ascii_case(column));
        for row in &mut self.rows {
            let keys: Vec<String> = row
                .keys()
                .filter(|k| k.eq_ignore_ascii_case(column))
                .cloned()
                .collect();
            for key in keys {
                row.remove(&key);
            }
        }
    }
}

/// Outcome of a single write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Generated key, when the engine reports one
    pub last_insert_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conditions(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_query_param_from_json() {
        assert!(QueryParam::from_json(&json!(null)).is_null());
        assert_eq!(QueryParam::from_json(&json!(3)), QueryParam::Int(3));
        assert_eq!(QueryParam::from_json(&json!(1.5)), QueryParam::Float(1.5));
        assert_eq!(
            QueryParam::from_json(&json!("a")),
            QueryParam::String("a".into())
        );
        assert_eq!(QueryParam::Decimal("1.10".into()).type_name(), "decimal");
    }

    #[test]
    fn test_equality_condition() {
        let filter = Filter::from_conditions(&conditions(json!({"id": 1})))
            .unwrap()
            .unwrap();
        assert_eq!(filter, Filter::eq("id", json!(1)));
    }

    #[test]
    fn test_empty_conditions_yield_none() {
        assert!(Filter::from_conditions(&Map::new()).unwrap().is_none());
    }

    #[test]
    fn test_range_and_in_operators() {
        let filter = Filter::from_conditions(&conditions(json!({
            "age": {"gte": 18, "lt": 65},
            "status": {"in": ["a", "b"]}
        })))
        .unwrap()
        .unwrap();
        let Filter::And { filters } = filter else {
            panic!("expected conjunction");
        };
        assert!(filters.contains(&Filter::range(
            "age",
            Some(Bound::inclusive(json!(18))),
            Some(Bound::exclusive(json!(65)))
        )));
        assert!(filters.contains(&Filter::is_in("status", vec![json!("a"), json!("b")])));
    }

    #[test]
    fn test_array_value_is_membership() {
        let filter = Filter::from_conditions(&conditions(json!({"id": [1, 2]})))
            .unwrap()
            .unwrap();
        assert_eq!(filter, Filter::is_in("id", vec![json!(1), json!(2)]));
    }

    #[test]
    fn test_unknown_operator_names_column() {
        let err = Filter::from_conditions(&conditions(json!({"name": {"like": "a%"}})))
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_try_map_converts_every_value() {
        let filter = Filter::all(vec![
            Filter::eq("a", json!(1)),
            Filter::is_in("b", vec![json!(2), json!(3)]),
        ]);
        let mut seen = Vec::new();
        let mapped: Filter = filter
            .try_map(&mut |col: &str, v: JsonValue| {
                seen.push(col.to_string());
                Ok(QueryParam::from_json(&v))
            })
            .unwrap();
        assert_eq!(seen, vec!["a", "b", "b"]);
        assert_eq!(mapped.columns(), vec!["a", "b"]);
    }

    #[test]
    fn test_order_by_parse() {
        assert_eq!(OrderBy::parse("name").unwrap(), OrderBy::asc("name"));
        assert_eq!(OrderBy::parse("name desc").unwrap(), OrderBy::desc("name"));
        assert_eq!(OrderBy::parse("-id").unwrap(), OrderBy::desc("id"));
        assert!(OrderBy::parse("name sideways").is_err());
    }

    #[test]
    fn test_result_set_remove_column() {
        let mut rs = ResultSet::new(
            vec!["ID".into(), "RNUM__".into()],
            vec![conditions(json!({"ID": 1, "RNUM__": 1}))],
        );
        rs.remove_column("rnum__");
        assert_eq!(rs.columns, vec!["ID"]);
        assert!(!rs.rows[0].contains_key("RNUM__"));
    }
}
