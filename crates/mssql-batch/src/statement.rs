//! Statement classification and batch splitting.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::nesting::Nesting;
use crate::scanner::{Token, TokenKind, significant_tokens};

#[allow(clippy::unwrap_used)]
static SELECT_ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^SELECT\s+@\w+\s*=").unwrap());

/// What a statement does, decided from its leading keywords only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Anything handed to the storage engine as is.
    Query,
    /// `DECLARE @v TYPE [= value], ...`
    Declare,
    /// `SET @v = expr` or a session option such as `SET NOCOUNT ON`.
    Set,
    /// `SELECT @v = expr, ...`
    SelectAssignment,
    /// `IF cond THEN ... [ELSE ...] END`
    If,
    /// `WHILE cond BEGIN|DO ... END`
    While,
    /// `CREATE PROC[EDURE] ...`
    CreateProcedure,
    /// `DROP PROC[EDURE] ...`
    DropProcedure,
    /// `EXEC[UTE] name ...`
    Execute,
    /// `PRINT expr`
    Print,
    /// `BREAK`
    Break,
    /// `CONTINUE`
    Continue,
    /// `RETURN`
    Return,
    /// `USE db`
    Use,
    /// `CREATE DATABASE db`
    CreateDatabase,
    /// `DROP DATABASE db`
    DropDatabase,
    /// Empty or comment-only text.
    Unknown,
}

/// Classify a single statement.
#[must_use]
pub fn parse_statement(sql: &str) -> StatementKind {
    let sql = sql.trim();
    let tokens = significant_tokens(sql);
    let Some(first) = tokens.first() else {
        return StatementKind::Unknown;
    };
    let second = tokens.get(1);
    let second_is = |kws: &[&str]| second.is_some_and(|t| t.is_any_keyword(sql, kws));

    if first.kind != TokenKind::Word {
        return StatementKind::Query;
    }
    let word = first.text(sql).to_ascii_uppercase();
    match word.as_str() {
        "IF" => StatementKind::If,
        "WHILE" => StatementKind::While,
        "DECLARE" => StatementKind::Declare,
        "SET" => StatementKind::Set,
        "SELECT" if SELECT_ASSIGNMENT.is_match(&sql[first.start..]) => {
            StatementKind::SelectAssignment
        }
        "CREATE" if second_is(&["PROC", "PROCEDURE"]) => StatementKind::CreateProcedure,
        "CREATE" if second_is(&["DATABASE"]) => StatementKind::CreateDatabase,
        "DROP" if second_is(&["PROC", "PROCEDURE"]) => StatementKind::DropProcedure,
        "DROP" if second_is(&["DATABASE"]) => StatementKind::DropDatabase,
        "EXEC" | "EXECUTE" => StatementKind::Execute,
        "PRINT" => StatementKind::Print,
        "BREAK" if tokens.len() == 1 => StatementKind::Break,
        "CONTINUE" if tokens.len() == 1 => StatementKind::Continue,
        "RETURN" => StatementKind::Return,
        "USE" => StatementKind::Use,
        _ => StatementKind::Query,
    }
}

/// Split a batch on top-level `;`.
///
/// Semicolons inside strings, comments, parentheses and IF/WHILE/BEGIN/CASE
/// blocks do not split. A statement starting with `CREATE PROC[EDURE]` takes
/// the rest of the batch. Empty statements are dropped; a trailing `;` is
/// not part of the statement text.
#[must_use]
pub fn split_statements(batch: &str) -> Vec<String> {
    let tokens = significant_tokens(batch);
    let mut statements = Vec::new();
    let mut nesting = Nesting::new();
    let mut current: Option<(usize, usize)> = None;

    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i];
        let starts_statement = current.is_none();

        if starts_statement && tok.kind != TokenKind::Semicolon && is_create_procedure(batch, &tokens[i..]) {
            let end = trailing_end(&tokens[i..]);
            statements.push(batch[tok.start..end].trim().to_owned());
            return statements;
        }

        let top_level_before = nesting.is_top_level();
        nesting.feed(batch, &tokens, i);

        if tok.kind == TokenKind::Semicolon && top_level_before {
            if let Some((start, end)) = current.take() {
                statements.push(batch[start..end].trim().to_owned());
            }
        } else {
            let start = current.map_or(tok.start, |(s, _)| s);
            current = Some((start, tok.end));
        }
        i += 1;
    }

    if let Some((start, end)) = current {
        statements.push(batch[start..end].trim().to_owned());
    }
    statements.retain(|s| !s.is_empty());
    statements
}

fn is_create_procedure(src: &str, tokens: &[Token]) -> bool {
    matches!(tokens, [first, second, ..]
        if first.is_keyword(src, "CREATE") && second.is_any_keyword(src, &["PROC", "PROCEDURE"]))
}

/// End offset of the last token, ignoring trailing semicolons.
fn trailing_end(tokens: &[Token]) -> usize {
    tokens
        .iter()
        .rev()
        .find(|t| t.kind != TokenKind::Semicolon)
        .map_or(0, |t| t.end)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        use StatementKind::*;
        let cases = [
            ("IF @a = 1 THEN SELECT 1 END", If),
            ("while @i < 3 begin set @i = @i + 1 end", While),
            ("DECLARE @id INT", Declare),
            ("SET @id = 1", Set),
            ("SET NOCOUNT ON", Set),
            ("SELECT @a = 1", SelectAssignment),
            ("select  @total=SUM(x) from t", SelectAssignment),
            ("SELECT @a", Query),
            ("SELECT * FROM t WHERE a = @a", Query),
            ("CREATE PROCEDURE p AS SELECT 1", CreateProcedure),
            ("CREATE TABLE t (id INT)", Query),
            ("DROP PROC p", DropProcedure),
            ("DROP TABLE IF EXISTS t", Query),
            ("EXEC p 1", Execute),
            ("PRINT 'hi'", Print),
            ("BREAK", Break),
            ("CONTINUE", Continue),
            ("RETURN", Return),
            ("USE sales", Use),
            ("CREATE DATABASE sales", CreateDatabase),
            ("DROP DATABASE sales", DropDatabase),
            ("IFNULL(a, b)", Query),
            ("  -- nothing", Unknown),
            ("", Unknown),
        ];
        for (sql, kind) in cases {
            assert_eq!(parse_statement(sql), kind, "{sql}");
        }
    }

    #[test]
    fn test_split_simple() {
        assert_eq!(
            split_statements("DECLARE @id INT; SET @id = 1; SELECT @id"),
            vec!["DECLARE @id INT", "SET @id = 1", "SELECT @id"]
        );
    }

    #[test]
    fn test_split_keeps_if_block_whole() {
        assert_eq!(
            split_statements("IF @id = 1 THEN SELECT 'Match' END"),
            vec!["IF @id = 1 THEN SELECT 'Match' END"]
        );
        assert_eq!(
            split_statements("IF @a = 1 THEN SELECT 1; SELECT 2; END; SELECT 3"),
            vec!["IF @a = 1 THEN SELECT 1; SELECT 2; END", "SELECT 3"]
        );
    }

    #[test]
    fn test_split_ignores_quoted_semicolons() {
        assert_eq!(
            split_statements("SELECT * FROM t WHERE s = 'a;b'; SELECT 1"),
            vec!["SELECT * FROM t WHERE s = 'a;b'", "SELECT 1"]
        );
        assert_eq!(split_statements("SELECT 'it\\'s;'; SELECT 2").len(), 2);
    }

    #[test]
    fn test_split_ignores_comments_and_parens() {
        let batch = "SELECT 1 -- a; b\n; /* ; */ INSERT INTO t VALUES (1, ';')";
        assert_eq!(split_statements(batch).len(), 2);
        assert_eq!(
            split_statements("INSERT INTO t (a) SELECT (SELECT 1; ) ; SELECT 2").len(),
            2
        );
    }

    #[test]
    fn test_split_while_and_case() {
        let batch = "WHILE @i < 3 BEGIN SET @i = @i + 1; SELECT CASE WHEN @i = 2 THEN 'x' END; END; SELECT @i";
        let parts = split_statements(batch);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("END"));
        assert_eq!(parts[1], "SELECT @i");
    }

    #[test]
    fn test_split_drop_if_exists_is_flat() {
        assert_eq!(
            split_statements("DROP TABLE IF EXISTS t; CREATE TABLE t (id INT)").len(),
            2
        );
    }

    #[test]
    fn test_create_procedure_takes_rest_of_batch() {
        let batch = "CREATE PROCEDURE p @a INT AS SELECT @a; SELECT 2;";
        assert_eq!(
            split_statements(batch),
            vec!["CREATE PROCEDURE p @a INT AS SELECT @a; SELECT 2"]
        );
        let batch = "DROP PROC p; CREATE PROC p AS SELECT 1; SELECT 2";
        assert_eq!(
            split_statements(batch),
            vec!["DROP PROC p", "CREATE PROC p AS SELECT 1; SELECT 2"]
        );
    }

    #[test]
    fn test_split_drops_empty_statements() {
        assert_eq!(split_statements(";; SELECT 1;;"), vec!["SELECT 1"]);
        assert!(split_statements("  ").is_empty());
    }
}
