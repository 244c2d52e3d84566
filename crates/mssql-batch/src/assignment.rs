//! DECLARE, SET and SELECT-assignment parsing.

use mssql_types::SqlType;

use crate::context::normalize_name;
use crate::error::{BatchError, Result};
use crate::scanner::{Token, TokenKind, significant_tokens, span, split_commas, trim_semicolons};

/// Keywords that end the select list of a `SELECT @v = ...` statement.
const SELECT_LIST_END: &[&str] = &["FROM", "WHERE", "GROUP", "HAVING", "ORDER", "UNION"];

/// One `@name TYPE [= value]` item of a DECLARE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Normalized variable name.
    pub name: String,
    /// Declared type.
    pub sql_type: SqlType,
    /// Initial value expression, if any.
    pub initial: Option<String>,
}

/// Parse `DECLARE @a INT [= 1], @b VARCHAR(10), ...`.
pub fn parse_declare(sql: &str) -> Result<Vec<Declaration>> {
    let sql = sql.trim();
    let tokens = significant_tokens(sql);
    let rest = match tokens.split_first() {
        Some((first, rest)) if first.is_keyword(sql, "DECLARE") => trim_semicolons(rest),
        _ => return Err(BatchError::syntax(sql, "expected DECLARE")),
    };
    if rest.is_empty() {
        return Err(BatchError::syntax(sql, "expected a variable declaration"));
    }

    split_commas(rest)
        .into_iter()
        .map(|item| parse_declaration(sql, item))
        .collect()
}

fn parse_declaration(sql: &str, item: &[Token]) -> Result<Declaration> {
    let Some((var, mut rest)) = item.split_first() else {
        return Err(BatchError::syntax(sql, "empty declaration"));
    };
    if var.kind != TokenKind::Variable {
        return Err(BatchError::syntax(
            span(sql, item),
            "expected a variable name starting with @",
        ));
    }
    if rest.first().is_some_and(|t| t.is_keyword(sql, "AS")) {
        rest = &rest[1..];
    }

    let eq = rest
        .iter()
        .position(|t| t.kind == TokenKind::Comparison && t.text(sql) == "=");
    let (type_tokens, initial) = match eq {
        Some(pos) if pos + 1 < rest.len() => (&rest[..pos], Some(span(sql, &rest[pos + 1..]))),
        Some(_) => return Err(BatchError::syntax(span(sql, item), "missing initial value")),
        None => (rest, None),
    };
    if type_tokens.is_empty() {
        return Err(BatchError::syntax(span(sql, item), "missing data type"));
    }

    Ok(Declaration {
        name: normalize_name(var.text(sql)),
        sql_type: SqlType::parse(span(sql, type_tokens))?,
        initial: initial.map(str::to_owned),
    })
}

/// A parsed SET statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetStatement {
    /// `SET @name = expression`
    Variable {
        /// Normalized variable name.
        name: String,
        /// Right-hand side text.
        expression: String,
    },
    /// A session option such as `SET NOCOUNT ON`.
    Option {
        /// Option name, upper-cased.
        name: String,
        /// Everything after the option name.
        value: String,
    },
}

/// Parse `SET @v = expr` or `SET OPTION value`.
pub fn parse_set(sql: &str) -> Result<SetStatement> {
    let sql = sql.trim();
    let tokens = significant_tokens(sql);
    let tokens = trim_semicolons(&tokens);
    let rest = match tokens.split_first() {
        Some((first, rest)) if first.is_keyword(sql, "SET") => rest,
        _ => return Err(BatchError::syntax(sql, "expected SET")),
    };

    match rest {
        [var, eq, expr @ ..] if var.kind == TokenKind::Variable => {
            if eq.kind != TokenKind::Comparison || eq.text(sql) != "=" {
                return Err(BatchError::syntax(sql, "expected '=' after the variable"));
            }
            if expr.is_empty() {
                return Err(BatchError::syntax(sql, "missing value in SET"));
            }
            Ok(SetStatement::Variable {
                name: normalize_name(var.text(sql)),
                expression: span(sql, expr).to_owned(),
            })
        }
        [var] if var.kind == TokenKind::Variable => {
            Err(BatchError::syntax(sql, "expected '=' after the variable"))
        }
        [option, value @ ..] if option.kind == TokenKind::Word => Ok(SetStatement::Option {
            name: option.text(sql).to_ascii_uppercase(),
            value: span(sql, value).to_owned(),
        }),
        _ => Err(BatchError::syntax(sql, "expected a variable or session option")),
    }
}

/// A parsed `SELECT @a = expr, ... [FROM ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectAssignment {
    /// Normalized target variables, one per select-list item.
    pub targets: Vec<String>,
    /// The statement rewritten as a plain query returning the values.
    pub query: String,
}

/// Parse a SELECT-assignment and rewrite it as a plain query.
///
/// `SELECT @a = x + 1, @b = name FROM t WHERE id = 2` becomes
/// `SELECT x + 1, name FROM t WHERE id = 2` with targets `[A, B]`.
pub fn parse_select_assignment(sql: &str) -> Result<SelectAssignment> {
    let sql = sql.trim();
    let tokens = significant_tokens(sql);
    let tokens = trim_semicolons(&tokens);
    let rest = match tokens.split_first() {
        Some((first, rest)) if first.is_keyword(sql, "SELECT") => rest,
        _ => return Err(BatchError::syntax(sql, "expected SELECT")),
    };

    let mut depth = 0usize;
    let list_end = rest
        .iter()
        .position(|t| {
            match t.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth = depth.saturating_sub(1),
                _ => {}
            }
            depth == 0 && t.is_any_keyword(sql, SELECT_LIST_END)
        })
        .unwrap_or(rest.len());
    let (list, tail) = rest.split_at(list_end);

    let mut targets = Vec::new();
    let mut expressions = Vec::new();
    for item in split_commas(list) {
        match item {
            [var, eq, expr @ ..]
                if var.kind == TokenKind::Variable
                    && eq.kind == TokenKind::Comparison
                    && eq.text(sql) == "="
                    && !expr.is_empty() =>
            {
                targets.push(normalize_name(var.text(sql)));
                expressions.push(span(sql, expr));
            }
            _ => {
                return Err(BatchError::syntax(
                    span(sql, item),
                    "a SELECT that assigns variables cannot also return data",
                ));
            }
        }
    }

    let mut query = format!("SELECT {}", expressions.join(", "));
    if !tail.is_empty() {
        query.push(' ');
        query.push_str(span(sql, tail));
    }
    Ok(SelectAssignment { targets, query })
}
