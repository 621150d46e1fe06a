//! Wrapper around `sqlparser` using the MySQL dialect.
//!
//! Only the first statement of multi-statement input is processed. Anything
//! after the first statement terminator is parsed, logged and dropped.
use crate::errors::{GatewayError, Result};
use sqlparser::ast::Statement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use tracing::warn;

/// Parse a sql string, returning the first statement.
pub fn parse_sql(sql: &str) -> Result<Statement> {
    let mut stmts = Parser::parse_sql(&MySqlDialect {}, sql)?;
    if stmts.len() > 1 {
        warn!(
            num_statements = stmts.len(),
            "multiple statements not supported, only running the first"
        );
    }
    if stmts.is_empty() {
        return Err(GatewayError::EmptyQuery);
    }
    Ok(stmts.swap_remove(0))
}

/// Session setup chatter sent by common client libraries during connect.
///
/// These are answered with OK even though they aren't executed.
const SESSION_SETUP: &[&str] = &["set autocommit", "set session transaction isolation"];

/// Check if the query is client session setup that should be acknowledged
/// without being executed.
pub fn is_session_setup(sql: &str) -> bool {
    let lowered = normalize_whitespace(&sql.to_lowercase());
    SESSION_SETUP.iter().any(|s| lowered.contains(s))
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_statement_only() {
        let stmt = parse_sql("select * from a; select * from b").unwrap();
        assert_eq!("SELECT * FROM a", stmt.to_string());
    }

    #[test]
    fn empty_query() {
        assert!(matches!(parse_sql("   "), Err(GatewayError::EmptyQuery)));
        assert!(matches!(parse_sql(";"), Err(GatewayError::EmptyQuery)));
    }

    #[test]
    fn parse_error() {
        let err = parse_sql("selec * frm").unwrap_err();
        assert!(matches!(err, GatewayError::Parse(_)));
    }

    #[test]
    fn session_setup() {
        assert!(is_session_setup("SET autocommit=1"));
        assert!(is_session_setup("  set  AUTOCOMMIT = 0  "));
        assert!(is_session_setup("SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ"));
        assert!(is_session_setup("\tset session\ntransaction isolation level read committed"));
        assert!(!is_session_setup("SET NAMES utf8"));
        assert!(!is_session_setup("select 1"));
    }
}
