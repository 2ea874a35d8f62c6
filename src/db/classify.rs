//! Raw SQL statement classification.
//!
//! Decides whether a caller-supplied statement produces a result set or an
//! affected-row count. Classification parses the text with the engine's
//! sqlparser dialect and falls back to the leading keyword when the parser
//! does not understand the statement.

use crate::models::DatabaseType;
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;

/// Broad category of a SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT and other row-producing statements (SHOW, DESCRIBE, EXPLAIN, PRAGMA)
    Rows,
    /// INSERT, UPDATE, DELETE, MERGE
    Write,
    /// CREATE, DROP, ALTER, TRUNCATE
    Ddl,
    /// BEGIN, COMMIT, ROLLBACK, SAVEPOINT
    Transaction,
    /// Everything else
    Other,
}

/// Keywords that start a row-producing statement.
const ROW_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "PRAGMA", "VALUES", "TABLE",
];

fn parser_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
        DatabaseType::SqlServer => Box::new(MsSqlDialect {}),
        DatabaseType::Oracle => Box::new(GenericDialect {}),
    }
}

/// Classify the last statement in `sql`.
pub fn classify(sql: &str, db_type: DatabaseType) -> StatementKind {
    let dialect = parser_dialect(db_type);
    match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) => match statements.last() {
            Some(stmt) => {
                let kind = classify_statement(stmt);
                if kind == StatementKind::Write && has_returning_clause(sql) {
                    StatementKind::Rows
                } else {
                    kind
                }
            }
            None => StatementKind::Other,
        },
        Err(_) => classify_by_keyword(sql),
    }
}

/// Whether executing `sql` yields a result set.
pub fn returns_rows(sql: &str, db_type: DatabaseType) -> bool {
    classify(sql, db_type) == StatementKind::Rows
}

fn classify_statement(stmt: &Statement) -> StatementKind {
    match stmt {
        Statement::Query(_)
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ExplainTable { .. }
        | Statement::Explain { .. }
        | Statement::Pragma { .. } => StatementKind::Rows,

        Statement::Insert(_)
        | Statement::Update { .. }
        | Statement::Delete(_)
        | Statement::Merge { .. } => StatementKind::Write,

        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex(_)
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateSequence { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterView { .. }
        | Statement::AlterIndex { .. }
        | Statement::Drop { .. }
        | Statement::Truncate { .. }
        | Statement::Comment { .. } => StatementKind::Ddl,

        Statement::StartTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. }
        | Statement::ReleaseSavepoint { .. } => StatementKind::Transaction,

        _ => StatementKind::Other,
    }
}

fn classify_by_keyword(sql: &str) -> StatementKind {
    let first = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();

    if ROW_KEYWORDS.contains(&first.as_str()) {
        return StatementKind::Rows;
    }
    match first.as_str() {
        "INSERT" | "UPDATE" | "DELETE" | "MERGE" | "REPLACE" | "UPSERT" => {
            if has_returning_clause(sql) {
                StatementKind::Rows
            } else {
                StatementKind::Write
            }
        }
        "CREATE" | "DROP" | "ALTER" | "TRUNCATE" | "RENAME" | "COMMENT" => StatementKind::Ddl,
        "BEGIN" | "START" | "COMMIT" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
            StatementKind::Transaction
        }
        _ => StatementKind::Other,
    }
}

/// RETURNING (PostgreSQL, SQLite) or OUTPUT (SQL Server) turns a write into a row source.
fn has_returning_clause(sql: &str) -> bool {
    sql.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|word| word.eq_ignore_ascii_case("RETURNING") || word.eq_ignore_ascii_case("OUTPUT"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_returns_rows() {
        for db in DatabaseType::ALL {
            assert!(returns_rows("SELECT 1", db), "{:?}", db);
        }
        assert!(returns_rows(
            "WITH x AS (SELECT 1 AS a) SELECT a FROM x",
            DatabaseType::PostgreSQL
        ));
    }

    #[test]
    fn test_writes_do_not_return_rows() {
        assert_eq!(
            classify("INSERT INTO t (a) VALUES (1)", DatabaseType::SQLite),
            StatementKind::Write
        );
        assert_eq!(
            classify("UPDATE t SET a = 2 WHERE id = 1", DatabaseType::MySQL),
            StatementKind::Write
        );
        assert_eq!(
            classify("DELETE FROM t WHERE id = 1", DatabaseType::SqlServer),
            StatementKind::Write
        );
    }

    #[test]
    fn test_returning_clause_returns_rows() {
        assert!(returns_rows(
            "INSERT INTO t (a) VALUES (1) RETURNING id",
            DatabaseType::PostgreSQL
        ));
        assert!(returns_rows(
            "INSERT INTO t (a) OUTPUT INSERTED.id VALUES (1)",
            DatabaseType::SqlServer
        ));
    }

    #[test]
    fn test_ddl_and_transactions() {
        assert_eq!(
            classify("CREATE TABLE t (id INT)", DatabaseType::MySQL),
            StatementKind::Ddl
        );
        assert_eq!(classify("DROP TABLE t", DatabaseType::SQLite), StatementKind::Ddl);
        assert_eq!(classify("COMMIT", DatabaseType::PostgreSQL), StatementKind::Transaction);
    }

    #[test]
    fn test_sqlite_pragma_returns_rows() {
        assert!(returns_rows("PRAGMA table_info(t)", DatabaseType::SQLite));
    }

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(classify_by_keyword("  select * from t"), StatementKind::Rows);
        assert_eq!(classify_by_keyword("(SELECT 1)"), StatementKind::Rows);
        assert_eq!(classify_by_keyword("REPLACE INTO t VALUES (1)"), StatementKind::Write);
        assert_eq!(classify_by_keyword("GRANT ALL ON t TO u"), StatementKind::Other);
        assert_eq!(classify_by_keyword(""), StatementKind::Other);
    }

    #[test]
    fn test_returning_is_whole_word() {
        assert!(!has_returning_clause("UPDATE t SET returning_customer = 1"));
        assert!(has_returning_clause("delete from t returning *"));
    }
}
