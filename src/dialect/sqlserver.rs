//! SQL Server dialect.

use super::{Dialect, like_pattern, quote_literal};
use crate::error::{DbError, DbResult};
use crate::models::{
    AbstractType, AlterOperation, ColumnDefinition, ConnectionConfig, DatabaseType, QueryParam,
    Statement,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    fn connection_string(&self, config: &ConnectionConfig) -> DbResult<String> {
        super::network_url("sqlserver", config, None)
    }

    fn quote_chars(&self) -> (char, char) {
        ('[', ']')
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    /// `TOP (n)` for a first page without ordering, `OFFSET ... FETCH` otherwise.
    ///
    /// OFFSET requires an ORDER BY, so an unordered query gets `ORDER BY (SELECT NULL)`.
    fn paginate(&self, mut sql: String, ordered: bool, limit: Option<u64>, offset: u64) -> String {
        if limit.is_none() && offset == 0 {
            return sql;
        }
        if let (Some(n), 0, false) = (limit, offset, ordered) {
            if let Some(rest) = sql.strip_prefix("SELECT ") {
                return format!("SELECT TOP ({}) {}", n, rest);
            }
        }
        if !ordered {
            sql.push_str(" ORDER BY (SELECT NULL)");
        }
        sql.push_str(&format!(" OFFSET {} ROWS", offset));
        if let Some(n) = limit {
            sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", n));
        }
        sql
    }

    fn native_type(&self, abstract_type: AbstractType, column: &ColumnDefinition) -> String {
        match abstract_type {
            AbstractType::Text => match column.length {
                Some(n) if n <= 4000 => format!("NVARCHAR({})", n),
                None if column.primary_key => "NVARCHAR(255)".to_string(),
                _ => "NVARCHAR(MAX)".to_string(),
            },
            AbstractType::Integer => "INT".to_string(),
            AbstractType::Decimal => super::decimal_type("DECIMAL", column, Some((18, 4))),
            AbstractType::Boolean => "BIT".to_string(),
            AbstractType::Datetime => "DATETIME2".to_string(),
            AbstractType::Binary => "VARBINARY(MAX)".to_string(),
        }
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn build_drop_table(&self, table: &str, cascade: bool) -> String {
        if cascade {
            format!("DROP TABLE IF EXISTS {}", self.quote_table(table))
        } else {
            format!("DROP TABLE {}", self.quote_table(table))
        }
    }

    fn build_alter_table(&self, table: &str, op: &AlterOperation) -> DbResult<Vec<String>> {
        let t = self.quote_table(table);
        let sql = match op {
            AlterOperation::AddColumn { column } => {
                format!("ALTER TABLE {} ADD {}", t, self.column_definition(column, true)?)
            }
            AlterOperation::DropColumn { name } => {
                format!("ALTER TABLE {} DROP COLUMN {}", t, self.quote_column(name))
            }
            AlterOperation::ModifyColumn { column } => {
                if column.default.is_some() {
                    return Err(DbError::validation(format!(
                        "SQL Server stores defaults as constraints; cannot change the default of '{}' with modify_column",
                        column.name
                    )));
                }
                let nullability = if column.nullable && !column.primary_key {
                    "NULL"
                } else {
                    "NOT NULL"
                };
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} {} {}",
                    t,
                    self.quote_column(&column.name),
                    self.column_type_sql(column),
                    nullability
                )
            }
            AlterOperation::RenameColumn { old_name, new_name } => format!(
                "EXEC sp_rename {}, {}, 'COLUMN'",
                quote_literal(&format!("{}.{}", table, old_name)),
                quote_literal(new_name)
            ),
        };
        Ok(vec![sql])
    }

    fn list_tables_query(&self, pattern: Option<&str>) -> Statement {
        let mut sql = String::from(
            "SELECT t.TABLE_NAME AS table_name, \
             CAST(ep.value AS NVARCHAR(4000)) AS table_comment \
             FROM INFORMATION_SCHEMA.TABLES t \
             LEFT JOIN sys.extended_properties ep \
               ON ep.major_id = OBJECT_ID(QUOTENAME(t.TABLE_SCHEMA) + '.' + QUOTENAME(t.TABLE_NAME)) \
               AND ep.minor_id = 0 AND ep.name = 'MS_Description' \
             WHERE t.TABLE_TYPE = 'BASE TABLE'",
        );
        let mut params = Vec::new();
        if let Some(p) = pattern {
            sql.push_str(" AND t.TABLE_NAME LIKE @P1");
            params.push(QueryParam::String(like_pattern(p)));
        }
        sql.push_str(" ORDER BY t.TABLE_NAME");
        Statement::new(sql, params)
    }

    fn describe_query(&self, table: &str) -> Statement {
        Statement::new(
            "SELECT c.COLUMN_NAME AS column_name, \
             c.DATA_TYPE + CASE \
               WHEN c.CHARACTER_MAXIMUM_LENGTH = -1 THEN '(MAX)' \
               WHEN c.CHARACTER_MAXIMUM_LENGTH IS NOT NULL \
                 THEN '(' + CAST(c.CHARACTER_MAXIMUM_LENGTH AS VARCHAR(10)) + ')' \
               WHEN c.DATA_TYPE IN ('decimal', 'numeric') \
                 THEN '(' + CAST(c.NUMERIC_PRECISION AS VARCHAR(10)) + ',' + CAST(c.NUMERIC_SCALE AS VARCHAR(10)) + ')' \
               ELSE '' END AS data_type, \
             c.IS_NULLABLE AS is_nullable, \
             CASE \
               WHEN EXISTS (SELECT 1 FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                 JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k \
                   ON k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME AND k.TABLE_SCHEMA = tc.TABLE_SCHEMA \
                 WHERE tc.TABLE_NAME = c.TABLE_NAME AND tc.TABLE_SCHEMA = c.TABLE_SCHEMA \
                 AND k.COLUMN_NAME = c.COLUMN_NAME AND tc.CONSTRAINT_TYPE = 'PRIMARY KEY') THEN 'PRI' \
               WHEN EXISTS (SELECT 1 FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                 JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k \
                   ON k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME AND k.TABLE_SCHEMA = tc.TABLE_SCHEMA \
                 WHERE tc.TABLE_NAME = c.TABLE_NAME AND tc.TABLE_SCHEMA = c.TABLE_SCHEMA \
                 AND k.COLUMN_NAME = c.COLUMN_NAME AND tc.CONSTRAINT_TYPE = 'UNIQUE') THEN 'UNI' \
               ELSE '' END AS column_key, \
             c.COLUMN_DEFAULT AS column_default, \
             CASE WHEN COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), \
               c.COLUMN_NAME, 'IsIdentity') = 1 THEN 'identity' ELSE '' END AS extra, \
             c.CHARACTER_MAXIMUM_LENGTH AS max_length, \
             CAST(ep.value AS NVARCHAR(4000)) AS column_comment \
             FROM INFORMATION_SCHEMA.COLUMNS c \
             LEFT JOIN sys.extended_properties ep \
               ON ep.major_id = OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)) \
               AND ep.minor_id = COLUMNPROPERTY(ep.major_id, c.COLUMN_NAME, 'ColumnId') \
               AND ep.name = 'MS_Description' \
             WHERE c.TABLE_NAME = @P1 \
             ORDER BY c.ORDINAL_POSITION",
            vec![QueryParam::String(table.to_string())],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderBy, QuerySpec};

    #[test]
    fn test_top_for_unordered_first_page() {
        let spec = QuerySpec::new("t").with_limit(Some(5));
        assert_eq!(
            SqlServerDialect.build_select(&spec).unwrap().sql,
            "SELECT TOP (5) * FROM [t]"
        );
    }

    #[test]
    fn test_offset_fetch_adds_neutral_order() {
        let spec = QuerySpec::new("t").with_limit(Some(5)).with_offset(Some(10));
        assert_eq!(
            SqlServerDialect.build_select(&spec).unwrap().sql,
            "SELECT * FROM [t] ORDER BY (SELECT NULL) OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        let ordered = QuerySpec::new("t")
            .with_order_by(vec![OrderBy::asc("id")])
            .with_limit(Some(5));
        assert_eq!(
            SqlServerDialect.build_select(&ordered).unwrap().sql,
            "SELECT * FROM [t] ORDER BY [id] OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }

    #[test]
    fn test_rename_uses_sp_rename() {
        let op = AlterOperation::RenameColumn {
            old_name: "old".into(),
            new_name: "new".into(),
        };
        assert_eq!(
            SqlServerDialect.build_alter_table("users", &op).unwrap(),
            vec!["EXEC sp_rename 'users.old', 'new', 'COLUMN'"]
        );
    }

    #[test]
    fn test_drop_cascade_is_if_exists() {
        assert_eq!(SqlServerDialect.build_drop_table("t", true), "DROP TABLE IF EXISTS [t]");
    }

    #[test]
    fn test_native_types() {
        let text = ColumnDefinition::of("n", AbstractType::Text).with_length(100);
        assert_eq!(SqlServerDialect.column_type_sql(&text), "NVARCHAR(100)");
        let blob = ColumnDefinition::of("b", AbstractType::Binary);
        assert_eq!(SqlServerDialect.column_type_sql(&blob), "VARBINARY(MAX)");
    }

    #[test]
    fn test_modify_with_default_rejected() {
        let op = AlterOperation::ModifyColumn {
            column: ColumnDefinition::of("a", AbstractType::Integer).with_default(serde_json::json!(1)),
        };
        assert!(SqlServerDialect.build_alter_table("t", &op).is_err());
    }
}
