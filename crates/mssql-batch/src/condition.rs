//! Condition parsing and evaluation for IF/WHILE.

use std::cmp::Ordering;
use std::fmt;

use mssql_types::SqlValue;

use crate::context::{Context, normalize_name};
use crate::error::{BatchError, Result};
use crate::scanner::{Token, TokenKind, significant_tokens};

/// Relational operator of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `<>` or `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

impl ComparisonOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "=" => Self::Eq,
            "<>" | "!=" => Self::Ne,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "<=" => Self::Le,
            ">=" => Self::Ge,
            _ => return None,
        })
    }

    /// Apply to a three-way comparison result.
    #[must_use]
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Gt => ordering == Ordering::Greater,
            Self::Le => ordering != Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        })
    }
}

/// Boolean connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `AND`
    And,
    /// `OR`
    Or,
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `@name`, stored normalized.
    Variable(String),
    /// `@@name`, stored normalized.
    SystemVariable(String),
    /// Quoted string, number or `NULL`.
    Literal(SqlValue),
    /// Anything else, such as an arithmetic expression.
    Expression(String),
}

impl Operand {
    fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(BatchError::syntax(text, "expected an operand"));
        }
        let tokens = significant_tokens(text);
        if let [tok] = tokens.as_slice() {
            match tok.kind {
                TokenKind::Variable => return Ok(Self::Variable(normalize_name(text))),
                TokenKind::SystemVariable => {
                    return Ok(Self::SystemVariable(
                        text.trim_start_matches('@').to_uppercase(),
                    ));
                }
                _ => {}
            }
        }
        Ok(SqlValue::parse_literal(text).map_or_else(|| Self::Expression(text.to_owned()), Self::Literal))
    }
}

/// A parsed condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalCondition {
    /// `left op right`
    Comparison {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: ComparisonOp,
        /// Right operand.
        right: Operand,
    },
    /// `operand IS [NOT] NULL`
    IsNull {
        /// Tested operand.
        operand: Operand,
        /// `IS NOT NULL`.
        negated: bool,
    },
    /// `NOT condition`
    Not(Box<LogicalCondition>),
    /// `left AND|OR right`
    Logical {
        /// Left sub-condition.
        left: Box<LogicalCondition>,
        /// Connective.
        op: LogicalOp,
        /// Right sub-condition.
        right: Box<LogicalCondition>,
    },
}

/// Parse a condition expression.
///
/// OR binds looser than AND, both associate left. Redundant outer
/// parentheses are stripped. Each leaf is split at its first top-level
/// comparison operator.
pub fn parse_condition(text: &str) -> Result<LogicalCondition> {
    let text = strip_outer_parens(text.trim());
    let tokens = significant_tokens(text);
    if tokens.is_empty() {
        return Err(BatchError::syntax(text, "empty condition"));
    }

    for op in [LogicalOp::Or, LogicalOp::And] {
        let keyword = match op {
            LogicalOp::Or => "OR",
            LogicalOp::And => "AND",
        };
        if let Some(tok) = top_level(&tokens).into_iter().rfind(|t| t.is_keyword(text, keyword)) {
            let left = parse_condition(&text[..tok.start])?;
            let right = parse_condition(&text[tok.end..])?;
            return Ok(LogicalCondition::Logical {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }
    }

    if tokens[0].is_keyword(text, "NOT") {
        let inner = parse_condition(&text[tokens[0].end..])?;
        return Ok(LogicalCondition::Not(Box::new(inner)));
    }

    if let Some(condition) = parse_is_null(text, &tokens)? {
        return Ok(condition);
    }

    let op_tok = top_level(&tokens)
        .into_iter()
        .find(|t| t.kind == TokenKind::Comparison)
        .ok_or_else(|| BatchError::NoOperatorFound(text.to_owned()))?;
    let op = ComparisonOp::from_symbol(op_tok.text(text))
        .ok_or_else(|| BatchError::NoOperatorFound(text.to_owned()))?;

    Ok(LogicalCondition::Comparison {
        left: Operand::parse(&text[..op_tok.start])?,
        op,
        right: Operand::parse(&text[op_tok.end..])?,
    })
}

fn parse_is_null(text: &str, tokens: &[Token]) -> Result<Option<LogicalCondition>> {
    let n = tokens.len();
    if n < 3 || !tokens[n - 1].is_keyword(text, "NULL") {
        return Ok(None);
    }
    let (is_tok, negated) = if tokens[n - 2].is_keyword(text, "NOT") && tokens[n - 3].is_keyword(text, "IS") {
        (tokens[n - 3], true)
    } else if tokens[n - 2].is_keyword(text, "IS") {
        (tokens[n - 2], false)
    } else {
        return Ok(None);
    };
    let operand = Operand::parse(&text[..is_tok.start])?;
    Ok(Some(LogicalCondition::IsNull { operand, negated }))
}

/// Remove parentheses that wrap the whole expression.
fn strip_outer_parens(mut text: &str) -> &str {
    loop {
        let tokens = significant_tokens(text);
        let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
            return text;
        };
        if first.kind != TokenKind::LParen || last.kind != TokenKind::RParen || tokens.len() < 2 {
            return text;
        }
        // The opening paren must close at the very last token.
        let mut depth = 0usize;
        for (i, tok) in tokens.iter().enumerate() {
            match tok.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 && i + 1 != tokens.len() {
                        return text;
                    }
                }
                _ => {}
            }
        }
        text = text[first.end..last.start].trim();
    }
}

/// Tokens outside any parentheses.
fn top_level(tokens: &[Token]) -> Vec<Token> {
    let mut depth = 0usize;
    let mut out = Vec::new();
    for tok in tokens {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(*tok),
            _ => {}
        }
    }
    out
}

/// Compare two values.
///
/// Numbers (and numeric text) compare numerically, everything else as text.
/// NULL sorts before any value and equals only NULL.
#[must_use]
pub fn compare_values(a: &SqlValue, b: &SqlValue) -> Ordering {
    match (a, b) {
        (SqlValue::Null, SqlValue::Null) => Ordering::Equal,
        (SqlValue::Null, _) => Ordering::Less,
        (_, SqlValue::Null) => Ordering::Greater,
        (SqlValue::Int(x), SqlValue::Int(y)) => x.cmp(y),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y)),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// Evaluate a condition against a context.
///
/// Expression operands are compared as their raw text.
pub fn evaluate(condition: &LogicalCondition, ctx: &Context) -> Result<bool> {
    evaluate_with(condition, ctx, &mut |expr| Ok(SqlValue::Text(expr.to_owned())))
}

/// Evaluate a condition, resolving expression operands through `resolve`.
///
/// Both sides of AND/OR are always evaluated so that undeclared variables
/// are reported regardless of the other side.
pub fn evaluate_with(
    condition: &LogicalCondition,
    ctx: &Context,
    resolve: &mut dyn FnMut(&str) -> Result<SqlValue>,
) -> Result<bool> {
    match condition {
        LogicalCondition::Logical { left, op, right } => {
            let l = evaluate_with(left, ctx, resolve)?;
            let r = evaluate_with(right, ctx, resolve)?;
            Ok(match op {
                LogicalOp::And => l && r,
                LogicalOp::Or => l || r,
            })
        }
        LogicalCondition::Not(inner) => Ok(!evaluate_with(inner, ctx, resolve)?),
        LogicalCondition::IsNull { operand, negated } => {
            let value = resolve_operand(operand, ctx, resolve)?;
            Ok(value.is_null() != *negated)
        }
        LogicalCondition::Comparison { left, op, right } => {
            let l = resolve_operand(left, ctx, resolve)?;
            let r = resolve_operand(right, ctx, resolve)?;
            Ok(op.matches(compare_values(&l, &r)))
        }
    }
}

fn resolve_operand(
    operand: &Operand,
    ctx: &Context,
    resolve: &mut dyn FnMut(&str) -> Result<SqlValue>,
) -> Result<SqlValue> {
    match operand {
        Operand::Variable(name) => ctx.value(name),
        Operand::SystemVariable(name) => Ok(ctx.system(name)),
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Expression(expr) => resolve(expr),
    }
}
