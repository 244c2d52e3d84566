//! IF and WHILE block parsing.

use crate::condition::{LogicalCondition, parse_condition};
use crate::error::{BatchError, Result};
use crate::nesting::{Event, Frame, Nesting};
use crate::scanner::{Token, TokenKind, significant_tokens};
use crate::statement::split_statements;

/// Kind of a control-flow block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `IF cond THEN body [ELSE else_body] END`
    If,
    /// `WHILE cond BEGIN|DO body END`
    While,
}

/// A parsed control-flow block. Bodies are kept as statement text and
/// executed statement by statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// IF or WHILE.
    pub kind: BlockKind,
    /// Parsed condition.
    pub condition: LogicalCondition,
    /// Condition source text.
    pub condition_text: String,
    /// Statements of the body (the THEN branch for IF).
    pub body: Vec<String>,
    /// ELSE branch; always `None` for WHILE.
    pub else_body: Option<Vec<String>>,
}

/// Parse `IF cond THEN body [ELSE else_body] END`.
pub fn parse_if_block(sql: &str) -> Result<Block> {
    let sql = sql.trim();
    let tokens = significant_tokens(sql);
    if !tokens.first().is_some_and(|t| t.is_keyword(sql, "IF")) {
        return Err(BatchError::malformed("IF", "statement does not start with IF"));
    }

    let mut nesting = Nesting::new();
    nesting.feed(sql, &tokens, 0);

    let mut then_tok: Option<Token> = None;
    let mut else_tok: Option<Token> = None;
    let mut end_tok: Option<(usize, Token)> = None;

    for i in 1..tokens.len() {
        let tok = tokens[i];
        let own_level = nesting.depth() == 1 && nesting.parens() == 0;

        if own_level && then_tok.is_none() && tok.is_keyword(sql, "THEN") {
            then_tok = Some(tok);
            nesting.feed(sql, &tokens, i);
            continue;
        }
        if own_level && then_tok.is_some() && else_tok.is_none() && tok.is_keyword(sql, "ELSE") {
            else_tok = Some(tok);
            nesting.feed(sql, &tokens, i);
            continue;
        }
        if nesting.feed(sql, &tokens, i) == Event::Closed(Frame::If) && nesting.depth() == 0 {
            end_tok = Some((i, tok));
            break;
        }
    }

    let then_tok = then_tok.ok_or_else(|| BatchError::malformed("IF", "missing THEN"))?;
    let (end_index, end_tok) = end_tok.ok_or_else(|| BatchError::malformed("IF", "missing END"))?;
    ensure_nothing_after("IF", sql, &tokens[end_index + 1..])?;

    let condition_text = sql[tokens[0].end..then_tok.start].trim();
    let condition = parse_condition(condition_text)?;

    let (body, else_body) = match else_tok {
        Some(else_tok) => (
            split_statements(&sql[then_tok.end..else_tok.start]),
            Some(split_statements(&sql[else_tok.end..end_tok.start])),
        ),
        None => (split_statements(&sql[then_tok.end..end_tok.start]), None),
    };

    Ok(Block {
        kind: BlockKind::If,
        condition,
        condition_text: condition_text.to_owned(),
        body,
        else_body,
    })
}

/// Parse `WHILE cond BEGIN body END` (or `DO` instead of `BEGIN`).
///
/// The condition ends at the first `BEGIN`/`DO` outside parentheses.
pub fn parse_while_block(sql: &str) -> Result<Block> {
    let sql = sql.trim();
    let tokens = significant_tokens(sql);
    if !tokens.first().is_some_and(|t| t.is_keyword(sql, "WHILE")) {
        return Err(BatchError::malformed("WHILE", "statement does not start with WHILE"));
    }

    let mut nesting = Nesting::new();
    nesting.feed(sql, &tokens, 0);

    let mut delimiter: Option<Token> = None;
    let mut end_tok: Option<(usize, Token)> = None;

    for i in 1..tokens.len() {
        let tok = tokens[i];
        match nesting.feed(sql, &tokens, i) {
            Event::Delimited if nesting.depth() == 1 => delimiter = Some(tok),
            Event::Closed(Frame::While { .. }) if nesting.depth() == 0 => {
                end_tok = Some((i, tok));
                break;
            }
            _ => {}
        }
    }

    let delimiter = delimiter.ok_or_else(|| {
        BatchError::malformed("WHILE", "expected BEGIN or DO after the condition")
    })?;
    let (end_index, end_tok) = end_tok.ok_or_else(|| BatchError::malformed("WHILE", "missing END"))?;
    ensure_nothing_after("WHILE", sql, &tokens[end_index + 1..])?;

    let condition_text = sql[tokens[0].end..delimiter.start].trim();
    let condition = parse_condition(condition_text)?;

    Ok(Block {
        kind: BlockKind::While,
        condition,
        condition_text: condition_text.to_owned(),
        body: split_statements(&sql[delimiter.end..end_tok.start]),
        else_body: None,
    })
}

fn ensure_nothing_after(block: &'static str, sql: &str, rest: &[Token]) -> Result<()> {
    match rest.iter().find(|t| t.kind != TokenKind::Semicolon) {
        Some(extra) => Err(BatchError::malformed(
            block,
            format!("unexpected '{}' after END", extra.text(sql)),
        )),
        None => Ok(()),
    }
}
