//! MySQL / MariaDB dialect.

use super::{CommentStyle, Dialect, like_pattern};
use crate::error::DbResult;
use crate::models::{
    AbstractType, AlterOperation, ColumnDefinition, ConnectionConfig, DatabaseType, QueryParam,
    Statement,
};

/// Largest row count MySQL accepts; used for offset-only pagination.
const MAX_ROWS: &str = "18446744073709551615";

#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn connection_string(&self, config: &ConnectionConfig) -> DbResult<String> {
        super::network_url("mysql", config, None)
    }

    fn quote_chars(&self) -> (char, char) {
        ('`', '`')
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn paginate(&self, mut sql: String, _ordered: bool, limit: Option<u64>, offset: u64) -> String {
        match (limit, offset) {
            (None, 0) => {}
            (Some(n), 0) => sql.push_str(&format!(" LIMIT {}", n)),
            (Some(n), m) => sql.push_str(&format!(" LIMIT {} OFFSET {}", n, m)),
            (None, m) => sql.push_str(&format!(" LIMIT {} OFFSET {}", MAX_ROWS, m)),
        }
        sql
    }

    fn native_type(&self, abstract_type: AbstractType, column: &ColumnDefinition) -> String {
        match abstract_type {
            AbstractType::Text => match column.length {
                Some(n) => format!("VARCHAR({})", n),
                None if column.primary_key => "VARCHAR(255)".to_string(),
                None => "TEXT".to_string(),
            },
            AbstractType::Integer => "INT".to_string(),
            AbstractType::Decimal => super::decimal_type("DECIMAL", column, Some((18, 4))),
            AbstractType::Boolean => "TINYINT(1)".to_string(),
            AbstractType::Datetime => "DATETIME".to_string(),
            AbstractType::Binary => "BLOB".to_string(),
        }
    }

    fn comment_style(&self) -> CommentStyle {
        CommentStyle::Inline
    }

    fn build_drop_table(&self, table: &str, _cascade: bool) -> String {
        format!("DROP TABLE {}", self.quote_table(table))
    }

    fn build_alter_table(&self, table: &str, op: &AlterOperation) -> DbResult<Vec<String>> {
        let t = self.quote_table(table);
        Ok(vec![match op {
            AlterOperation::AddColumn { column } => {
                format!("ALTER TABLE {} ADD COLUMN {}", t, self.column_definition(column, true)?)
            }
            AlterOperation::DropColumn { name } => {
                format!("ALTER TABLE {} DROP COLUMN {}", t, self.quote_column(name))
            }
            AlterOperation::ModifyColumn { column } => {
                format!("ALTER TABLE {} MODIFY COLUMN {}", t, self.column_definition(column, false)?)
            }
            AlterOperation::RenameColumn { old_name, new_name } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                t,
                self.quote_column(old_name),
                self.quote_column(new_name)
            ),
        }])
    }

    fn list_tables_query(&self, pattern: Option<&str>) -> Statement {
        let mut sql = String::from(
            "SELECT CONVERT(TABLE_NAME USING utf8mb4) AS table_name, \
             CONVERT(TABLE_COMMENT USING utf8mb4) AS table_comment \
             FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'",
        );
        let mut params = Vec::new();
        if let Some(p) = pattern {
            sql.push_str(" AND TABLE_NAME LIKE ?");
            params.push(QueryParam::String(like_pattern(p)));
        }
        sql.push_str(" ORDER BY TABLE_NAME");
        Statement::new(sql, params)
    }

    fn describe_query(&self, table: &str) -> Statement {
        Statement::new(
            "SELECT CONVERT(COLUMN_NAME USING utf8mb4) AS column_name, \
             CONVERT(COLUMN_TYPE USING utf8mb4) AS data_type, \
             CONVERT(IS_NULLABLE USING utf8mb4) AS is_nullable, \
             CONVERT(COLUMN_KEY USING utf8mb4) AS column_key, \
             CONVERT(COLUMN_DEFAULT USING utf8mb4) AS column_default, \
             CONVERT(EXTRA USING utf8mb4) AS extra, \
             CHARACTER_MAXIMUM_LENGTH AS max_length, \
             CONVERT(COLUMN_COMMENT USING utf8mb4) AS column_comment \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
            vec![QueryParam::String(self.normalize_table_name(table))],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuerySpec;

    #[test]
    fn test_pagination() {
        let d = MySqlDialect;
        let spec = QuerySpec::new("t").with_limit(Some(10)).with_offset(Some(20));
        assert_eq!(
            d.build_select(&spec).unwrap().sql,
            "SELECT * FROM `t` LIMIT 10 OFFSET 20"
        );
        let offset_only = QuerySpec::new("t").with_offset(Some(5));
        assert_eq!(
            d.build_select(&offset_only).unwrap().sql,
            "SELECT * FROM `t` LIMIT 18446744073709551615 OFFSET 5"
        );
        let limit_only = QuerySpec::new("t").with_limit(Some(3));
        assert_eq!(d.build_select(&limit_only).unwrap().sql, "SELECT * FROM `t` LIMIT 3");
    }

    #[test]
    fn test_create_table_inline_comments() {
        let d = MySqlDialect;
        let columns = vec![
            ColumnDefinition::of("id", AbstractType::Integer).primary_key(),
            ColumnDefinition::of("name", AbstractType::Text)
                .with_length(64)
                .with_comment("display name"),
        ];
        let stmts = d.build_create_table("users", &columns, Some("people")).unwrap();
        assert_eq!(
            stmts,
            vec![
                "CREATE TABLE `users` (`id` INT NOT NULL, `name` VARCHAR(64) COMMENT 'display name', \
                 PRIMARY KEY (`id`)) COMMENT='people'"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_alter_statements() {
        let d = MySqlDialect;
        let modify = AlterOperation::ModifyColumn {
            column: ColumnDefinition::of("age", AbstractType::Integer).not_null(),
        };
        assert_eq!(
            d.build_alter_table("t", &modify).unwrap(),
            vec!["ALTER TABLE `t` MODIFY COLUMN `age` INT NOT NULL"]
        );
        let rename = AlterOperation::RenameColumn {
            old_name: "a".into(),
            new_name: "b".into(),
        };
        assert_eq!(
            d.build_alter_table("t", &rename).unwrap(),
            vec!["ALTER TABLE `t` RENAME COLUMN `a` TO `b`"]
        );
    }

    #[test]
    fn test_connection_string_encodes_credentials() {
        let config = ConnectionConfig::networked(
            "m", DatabaseType::MySQL, "db.local", 3306, "app", "p@ss:w/rd", "shop",
        );
        let url = MySqlDialect.connection_string(&config).unwrap();
        assert!(url.starts_with("mysql://app:"));
        assert!(url.ends_with("@db.local:3306/shop"));
        assert!(!url.contains("p@ss:w/rd"));
    }

    #[test]
    fn test_list_tables_pattern_is_bound() {
        let stmt = MySqlDialect.list_tables_query(Some("user*"));
        assert!(stmt.sql.contains("LIKE ?"));
        assert_eq!(stmt.params, vec![QueryParam::String("user%".into())]);
    }
}
