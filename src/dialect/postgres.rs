//! PostgreSQL dialect.

use super::{CommentStyle, Dialect, like_pattern};
use crate::error::DbResult;
use crate::models::{
    AbstractType, AlterOperation, ColumnDefinition, ConnectionConfig, DatabaseType, QueryParam,
    Statement,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn connection_string(&self, config: &ConnectionConfig) -> DbResult<String> {
        super::network_url("postgres", config, None)
    }

    /// Unquoted names fold to lower case in PostgreSQL.
    fn normalize_table_name(&self, table: &str) -> String {
        table.to_lowercase()
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn bind_expression(&self, index: usize, value: &QueryParam) -> String {
        match value {
            QueryParam::Decimal(_) => format!("CAST(${} AS NUMERIC)", index),
            _ => self.placeholder(index),
        }
    }

    fn paginate(&self, mut sql: String, _ordered: bool, limit: Option<u64>, offset: u64) -> String {
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if offset > 0 {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    fn native_type(&self, abstract_type: AbstractType, column: &ColumnDefinition) -> String {
        match abstract_type {
            AbstractType::Text => match column.length {
                Some(n) => format!("VARCHAR({})", n),
                None => "TEXT".to_string(),
            },
            AbstractType::Integer => "INTEGER".to_string(),
            AbstractType::Decimal => super::decimal_type("NUMERIC", column, None),
            AbstractType::Boolean => "BOOLEAN".to_string(),
            AbstractType::Datetime => "TIMESTAMP".to_string(),
            AbstractType::Binary => "BYTEA".to_string(),
        }
    }

    fn comment_style(&self) -> CommentStyle {
        CommentStyle::CommentOn
    }

    fn build_drop_table(&self, table: &str, cascade: bool) -> String {
        let mut sql = format!("DROP TABLE {}", self.quote_table(table));
        if cascade {
            sql.push_str(" CASCADE");
        }
        sql
    }

    fn build_alter_table(&self, table: &str, op: &AlterOperation) -> DbResult<Vec<String>> {
        let t = self.quote_table(table);
        let mut stmts = Vec::new();
        match op {
            AlterOperation::AddColumn { column } => {
                stmts.push(format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    t,
                    self.column_definition(column, true)?
                ));
                stmts.extend(self.column_comment_statement(table, column));
            }
            AlterOperation::DropColumn { name } => {
                stmts.push(format!("ALTER TABLE {} DROP COLUMN {}", t, self.quote_column(name)));
            }
            AlterOperation::ModifyColumn { column } => {
                let c = self.quote_column(&column.name);
                let native = self.column_type_sql(column);
                stmts.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
                    t, c, native, c, native
                ));
                stmts.push(if column.nullable && !column.primary_key {
                    format!("ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL", t, c)
                } else {
                    format!("ALTER TABLE {} ALTER COLUMN {} SET NOT NULL", t, c)
                });
                stmts.push(match &column.default {
                    Some(value) => format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                        t,
                        c,
                        self.default_literal(value)?
                    ),
                    None => format!("ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT", t, c),
                });
                stmts.extend(self.column_comment_statement(table, column));
            }
            AlterOperation::RenameColumn { old_name, new_name } => {
                stmts.push(format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    t,
                    self.quote_column(old_name),
                    self.quote_column(new_name)
                ));
            }
        }
        Ok(stmts)
    }

    fn list_tables_query(&self, pattern: Option<&str>) -> Statement {
        let mut sql = String::from(
            "SELECT c.relname::text AS table_name, \
             obj_description(c.oid, 'pg_class') AS table_comment \
             FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE c.relkind IN ('r', 'p') AND n.nspname = current_schema()",
        );
        let mut params = Vec::new();
        if let Some(p) = pattern {
            sql.push_str(" AND c.relname LIKE $1");
            params.push(QueryParam::String(like_pattern(p)));
        }
        sql.push_str(" ORDER BY c.relname");
        Statement::new(sql, params)
    }

    fn describe_query(&self, table: &str) -> Statement {
        Statement::new(
            "SELECT a.attname::text AS column_name, \
             format_type(a.atttypid, a.atttypmod) AS data_type, \
             CASE WHEN a.attnotnull THEN 'NO' ELSE 'YES' END AS is_nullable, \
             CASE \
               WHEN EXISTS (SELECT 1 FROM pg_index i WHERE i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY(i.indkey)) THEN 'PRI' \
               WHEN EXISTS (SELECT 1 FROM pg_index i WHERE i.indrelid = c.oid AND i.indisunique AND a.attnum = ANY(i.indkey)) THEN 'UNI' \
               WHEN EXISTS (SELECT 1 FROM pg_index i WHERE i.indrelid = c.oid AND a.attnum = ANY(i.indkey)) THEN 'MUL' \
               ELSE '' END AS column_key, \
             pg_get_expr(d.adbin, d.adrelid) AS column_default, \
             CASE WHEN a.attidentity <> '' THEN 'identity' ELSE '' END AS extra, \
             CASE WHEN t.typname IN ('varchar', 'bpchar') AND a.atttypmod > 4 THEN a.atttypmod - 4 END AS max_length, \
             col_description(c.oid, a.attnum) AS column_comment \
             FROM pg_attribute a \
             JOIN pg_class c ON c.oid = a.attrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             JOIN pg_type t ON t.oid = a.atttypid \
             LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
             WHERE c.relname = $1 AND n.nspname = current_schema() \
             AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum",
            vec![QueryParam::String(self.normalize_table_name(table))],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Filter, QuerySpec};

    #[test]
    fn test_numbered_placeholders_and_decimal_cast() {
        let d = PostgresDialect;
        let values = vec![
            ("name".to_string(), QueryParam::String("a".into())),
            ("price".to_string(), QueryParam::Decimal("9.99".into())),
        ];
        let stmt = d.build_insert("Items", &values).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"items\" (\"name\", \"price\") VALUES ($1, CAST($2 AS NUMERIC))"
        );
    }

    #[test]
    fn test_update_numbers_where_after_set() {
        let stmt = PostgresDialect
            .build_update(
                "t",
                &[("a".to_string(), QueryParam::Int(1))],
                Some(&Filter::eq("id", QueryParam::Int(2))),
            )
            .unwrap();
        assert_eq!(stmt.sql, "UPDATE \"t\" SET \"a\" = $1 WHERE \"id\" = $2");
    }

    #[test]
    fn test_pagination() {
        let spec = QuerySpec::new("t").with_limit(Some(10)).with_offset(Some(30));
        assert_eq!(
            PostgresDialect.build_select(&spec).unwrap().sql,
            "SELECT * FROM \"t\" LIMIT 10 OFFSET 30"
        );
        let offset_only = QuerySpec::new("t").with_offset(Some(30));
        assert_eq!(
            PostgresDialect.build_select(&offset_only).unwrap().sql,
            "SELECT * FROM \"t\" OFFSET 30"
        );
    }

    #[test]
    fn test_create_table_with_comment_statements() {
        let columns = vec![
            ColumnDefinition::of("id", AbstractType::Integer).primary_key(),
            ColumnDefinition::of("note", AbstractType::Text).with_comment("free text"),
        ];
        let stmts = PostgresDialect
            .build_create_table("notes", &columns, Some("it's notes"))
            .unwrap();
        assert_eq!(stmts.len(), 3);
        assert_eq!(
            stmts[0],
            "CREATE TABLE \"notes\" (\"id\" INTEGER NOT NULL, \"note\" TEXT, PRIMARY KEY (\"id\"))"
        );
        assert_eq!(stmts[1], "COMMENT ON TABLE \"notes\" IS 'it''s notes'");
        assert_eq!(stmts[2], "COMMENT ON COLUMN \"notes\".\"note\" IS 'free text'");
    }

    #[test]
    fn test_modify_column_expands_to_steps() {
        let op = AlterOperation::ModifyColumn {
            column: ColumnDefinition::of("qty", AbstractType::Integer)
                .not_null()
                .with_default(serde_json::json!(0)),
        };
        let stmts = PostgresDialect.build_alter_table("t", &op).unwrap();
        assert_eq!(
            stmts,
            vec![
                "ALTER TABLE \"t\" ALTER COLUMN \"qty\" TYPE INTEGER USING \"qty\"::INTEGER",
                "ALTER TABLE \"t\" ALTER COLUMN \"qty\" SET NOT NULL",
                "ALTER TABLE \"t\" ALTER COLUMN \"qty\" SET DEFAULT 0",
            ]
        );
    }

    #[test]
    fn test_drop_cascade() {
        assert_eq!(PostgresDialect.build_drop_table("T", true), "DROP TABLE \"t\" CASCADE");
        assert_eq!(PostgresDialect.build_drop_table("t", false), "DROP TABLE \"t\"");
    }

    #[test]
    fn test_describe_lowercases_table() {
        let stmt = PostgresDialect.describe_query("Users");
        assert_eq!(stmt.params, vec![QueryParam::String("users".into())]);
    }
}
