//! Token-level variable substitution.

use crate::context::Context;
use crate::error::Result;
use crate::scanner::{TokenKind, tokenize};

/// A variable reference found in statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    /// `@name`, as written.
    Variable(&'a str),
    /// `@@name`, as written.
    System(&'a str),
}

/// Replace `@name` and `@@name` tokens using `resolve`.
///
/// References inside string literals, quoted identifiers and comments are
/// never touched. When `resolve` returns `None` the reference is left as
/// written. All other text is copied through unchanged.
pub fn substitute_variables<F>(sql: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(Reference<'_>) -> Result<Option<String>>,
{
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    for tok in tokenize(sql) {
        let reference = match tok.kind {
            TokenKind::Variable => Reference::Variable(tok.text(sql)),
            TokenKind::SystemVariable => Reference::System(tok.text(sql)),
            _ => continue,
        };
        if let Some(replacement) = resolve(reference)? {
            out.push_str(&sql[copied..tok.start]);
            // `10-@x` with a negative value must not become a `--` comment.
            if replacement.starts_with('-') && out.ends_with('-') {
                out.push(' ');
            }
            out.push_str(&replacement);
            copied = tok.end;
        }
    }
    out.push_str(&sql[copied..]);
    Ok(out)
}

/// Substitute every reference from `ctx`.
///
/// Declared variables render through their declared type; an undeclared
/// `@name` fails with [`VariableNotDeclared`](crate::BatchError::VariableNotDeclared). System variables
/// that were never set render as `NULL`.
pub fn substitute_context(sql: &str, ctx: &Context) -> Result<String> {
    substitute_variables(sql, |reference| match reference {
        Reference::Variable(name) => ctx.get(name).map(|v| Some(v.to_sql())),
        Reference::System(name) => Ok(Some(ctx.system(name).to_sql_literal())),
    })
}
