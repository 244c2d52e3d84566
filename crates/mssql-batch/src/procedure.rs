//! Stored-procedure statement syntax: CREATE, DROP and EXEC.

use mssql_types::{SqlType, SqlValue};
use serde::{Deserialize, Serialize};

use crate::context::normalize_name;
use crate::error::{BatchError, Result};
use crate::nesting::{Event, Frame, Nesting};
use crate::scanner::{Token, TokenKind, significant_tokens, span, split_commas, trim_semicolons};

/// A formal parameter of a stored procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name as declared, including the `@` sigil.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    /// Whether a default value was declared.
    pub has_default: bool,
    /// Default value literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Declared `OUTPUT`.
    #[serde(default)]
    pub output: bool,
}

impl Parameter {
    /// Case-insensitive lookup key.
    #[must_use]
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }
}

/// A parsed `CREATE PROCEDURE` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureDefinition {
    /// Procedure name without the `dbo.` schema prefix.
    pub name: String,
    /// Formal parameters in declaration order.
    pub parameters: Vec<Parameter>,
    /// Body text after `AS`, without an enclosing `BEGIN ... END`.
    pub body: String,
}

/// Parse `CREATE PROC[EDURE] name [(] @p TYPE [= default] [OUTPUT], ... [)] AS body`.
pub fn parse_create_procedure(sql: &str) -> Result<ProcedureDefinition> {
    let sql = sql.trim();
    let tokens = significant_tokens(sql);
    let rest = match tokens.as_slice() {
        [create, kw, rest @ ..]
            if create.is_keyword(sql, "CREATE") && kw.is_any_keyword(sql, &["PROC", "PROCEDURE"]) =>
        {
            rest
        }
        _ => return Err(BatchError::syntax(sql, "expected CREATE PROCEDURE")),
    };

    let (name, consumed) = object_name(sql, rest)?;
    let rest = &rest[consumed..];

    // `@p AS INT` is a typed parameter, not the start of the body.
    let as_pos = (0..rest.len())
        .find(|&i| {
            rest[i].is_keyword(sql, "AS") && (i == 0 || rest[i - 1].kind != TokenKind::Variable)
        })
        .ok_or_else(|| BatchError::syntax(sql, "expected AS before the procedure body"))?;
    let mut header = &rest[..as_pos];
    if let [open, inner @ .., close] = header {
        if open.kind == TokenKind::LParen && close.kind == TokenKind::RParen {
            header = inner;
        }
    }
    let parameters = if header.is_empty() {
        Vec::new()
    } else {
        split_commas(header)
            .into_iter()
            .map(|item| parse_parameter(sql, item))
            .collect::<Result<Vec<_>>>()?
    };

    let body_tokens = &rest[as_pos + 1..];
    let body = strip_begin_end(sql, body_tokens);
    if body.is_empty() {
        return Err(BatchError::syntax(sql, "procedure body is empty"));
    }

    Ok(ProcedureDefinition {
        name,
        parameters,
        body: body.to_owned(),
    })
}

fn parse_parameter(sql: &str, item: &[Token]) -> Result<Parameter> {
    let Some((var, mut rest)) = item.split_first() else {
        return Err(BatchError::syntax(sql, "empty parameter declaration"));
    };
    if var.kind != TokenKind::Variable {
        return Err(BatchError::syntax(span(sql, item), "expected a parameter name starting with @"));
    }
    if rest.first().is_some_and(|t| t.is_keyword(sql, "AS")) {
        rest = &rest[1..];
    }

    let mut output = false;
    while let Some(last) = rest.last() {
        if last.is_any_keyword(sql, &["OUTPUT", "OUT"]) {
            output = true;
        } else if !last.is_keyword(sql, "READONLY") {
            break;
        }
        rest = &rest[..rest.len() - 1];
    }

    let eq = rest
        .iter()
        .position(|t| t.kind == TokenKind::Comparison && t.text(sql) == "=");
    let (type_tokens, default) = match eq {
        Some(pos) if pos + 1 < rest.len() => (&rest[..pos], Some(span(sql, &rest[pos + 1..]))),
        Some(_) => return Err(BatchError::syntax(span(sql, item), "missing default value")),
        None => (rest, None),
    };
    if type_tokens.is_empty() {
        return Err(BatchError::syntax(span(sql, item), "missing parameter type"));
    }

    Ok(Parameter {
        name: var.text(sql).to_owned(),
        sql_type: SqlType::parse(span(sql, type_tokens))?,
        has_default: default.is_some(),
        default: default.map(str::to_owned),
        output,
    })
}

/// Drop the `BEGIN`/`END` pair when it wraps the whole body.
fn strip_begin_end<'a>(sql: &'a str, body: &[Token]) -> &'a str {
    let body = trim_semicolons(body);
    if !body.first().is_some_and(|t| t.is_keyword(sql, "BEGIN")) {
        return span(sql, body);
    }

    let mut nesting = Nesting::new();
    for i in 0..body.len() {
        if nesting.feed(sql, body, i) == Event::Closed(Frame::Begin) && nesting.depth() == 0 {
            if i + 1 == body.len() {
                return span(sql, &body[1..i]);
            }
            break;
        }
    }
    span(sql, body)
}

/// A parsed `DROP PROCEDURE` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropProcedure {
    /// Procedure name.
    pub name: String,
    /// `IF EXISTS` was given.
    pub if_exists: bool,
}

/// Parse `DROP PROC[EDURE] [IF EXISTS] name`.
pub fn parse_drop_procedure(sql: &str) -> Result<DropProcedure> {
    let sql = sql.trim();
    let tokens = significant_tokens(sql);
    let tokens = trim_semicolons(&tokens);
    let mut rest = match tokens {
        [drop, kw, rest @ ..]
            if drop.is_keyword(sql, "DROP") && kw.is_any_keyword(sql, &["PROC", "PROCEDURE"]) =>
        {
            rest
        }
        _ => return Err(BatchError::syntax(sql, "expected DROP PROCEDURE")),
    };

    let if_exists = matches!(rest, [i, e, ..] if i.is_keyword(sql, "IF") && e.is_keyword(sql, "EXISTS"));
    if if_exists {
        rest = &rest[2..];
    }
    let (name, consumed) = object_name(sql, rest)?;
    if consumed != rest.len() {
        return Err(BatchError::syntax(span(sql, &rest[consumed..]), "unexpected text after the procedure name"));
    }
    Ok(DropProcedure { name, if_exists })
}

/// An argument value in an EXEC statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    /// A literal.
    Literal(SqlValue),
    /// A batch variable, normalized.
    Variable(String),
    /// The `DEFAULT` keyword.
    Default,
}

/// One EXEC argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// Parameter name for `@p = value` arguments, normalized.
    pub name: Option<String>,
    /// Supplied value.
    pub value: ArgumentValue,
}

/// A parsed `EXEC name args` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteCall {
    /// Procedure name.
    pub name: String,
    /// Arguments in call order.
    pub arguments: Vec<Argument>,
}

/// Parse `EXEC[UTE] name [@p =] value [OUTPUT], ...`.
pub fn parse_execute(sql: &str) -> Result<ExecuteCall> {
    let sql = sql.trim();
    let tokens = significant_tokens(sql);
    let tokens = trim_semicolons(&tokens);
    let rest = match tokens.split_first() {
        Some((exec, rest)) if exec.is_any_keyword(sql, &["EXEC", "EXECUTE"]) => rest,
        _ => return Err(BatchError::syntax(sql, "expected EXEC")),
    };

    let (name, consumed) = object_name(sql, rest)?;
    let rest = &rest[consumed..];
    let arguments = if rest.is_empty() {
        Vec::new()
    } else {
        split_commas(rest)
            .into_iter()
            .map(|item| parse_argument(sql, item))
            .collect::<Result<Vec<_>>>()?
    };
    Ok(ExecuteCall { name, arguments })
}

fn parse_argument(sql: &str, item: &[Token]) -> Result<Argument> {
    let mut item = item;
    if item.last().is_some_and(|t| t.is_any_keyword(sql, &["OUTPUT", "OUT"])) {
        item = &item[..item.len() - 1];
    }

    let (name, value_tokens) = match item {
        [var, eq, value @ ..]
            if var.kind == TokenKind::Variable && eq.kind == TokenKind::Comparison && eq.text(sql) == "=" =>
        {
            (Some(normalize_name(var.text(sql))), value)
        }
        _ => (None, item),
    };

    let value = match value_tokens {
        [] => return Err(BatchError::syntax(sql, "missing argument value")),
        [tok] if tok.kind == TokenKind::Variable => ArgumentValue::Variable(normalize_name(tok.text(sql))),
        [tok] if tok.is_keyword(sql, "DEFAULT") => ArgumentValue::Default,
        _ => {
            let text = span(sql, value_tokens);
            SqlValue::parse_literal(text)
                .map(ArgumentValue::Literal)
                .ok_or_else(|| BatchError::syntax(text, "procedure arguments must be literals or variables"))?
        }
    };
    Ok(Argument { name, value })
}

/// Read a possibly schema-qualified object name; `dbo.` is dropped.
/// Returns the name and the number of tokens consumed.
fn object_name(sql: &str, tokens: &[Token]) -> Result<(String, usize)> {
    let mut parts = Vec::new();
    let mut i = 0;
    loop {
        let Some(tok) = tokens.get(i) else { break };
        let part = match tok.kind {
            TokenKind::Word => tok.text(sql).to_owned(),
            TokenKind::QuotedIdent => {
                let text = tok.text(sql);
                text.get(1..text.len().saturating_sub(1)).unwrap_or_default().to_owned()
            }
            _ => break,
        };
        parts.push(part);
        i += 1;
        if tokens.get(i).is_some_and(|t| t.kind == TokenKind::Dot) {
            i += 1;
        } else {
            break;
        }
    }

    match parts.as_slice() {
        [] => Err(BatchError::syntax(span(sql, tokens), "expected a procedure name")),
        [schema, name] if schema.eq_ignore_ascii_case("dbo") => Ok((name.clone(), i)),
        _ => Ok((parts.join("."), i)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mssql_types::{Length, TypeKind};

    #[test]
    fn test_create_without_parameters() {
        let def = parse_create_procedure("CREATE PROCEDURE dbo.GetAll AS SELECT * FROM t").unwrap();
        assert_eq!(def.name, "GetAll");
        assert!(def.parameters.is_empty());
        assert_eq!(def.body, "SELECT * FROM t");
    }

    #[test]
    fn test_create_with_parameters_and_begin_end() {
        let sql = "CREATE PROC [dbo].[GetUser] (@id INT, @name VARCHAR(50) = 'x', @total INT OUTPUT) \
                   AS BEGIN SELECT * FROM users WHERE id = @id; SELECT @name; END;";
        let def = parse_create_procedure(sql).unwrap();
        assert_eq!(def.name, "GetUser");
        assert_eq!(def.parameters.len(), 3);

        let id = &def.parameters[0];
        assert_eq!(id.name, "@id");
        assert_eq!(id.key(), "ID");
        assert_eq!(id.sql_type.kind, TypeKind::Int);
        assert!(!id.has_default);

        let name = &def.parameters[1];
        assert_eq!(name.sql_type.length, Length::Chars(50));
        assert!(name.has_default);
        assert_eq!(name.default.as_deref(), Some("'x'"));

        assert!(def.parameters[2].output);
        assert_eq!(def.body, "SELECT * FROM users WHERE id = @id; SELECT @name;");
    }

    #[test]
    fn test_begin_end_kept_when_not_wrapping() {
        let def = parse_create_procedure(
            "CREATE PROC p AS BEGIN SELECT 1 END; BEGIN SELECT 2 END",
        )
        .unwrap();
        assert_eq!(def.body, "BEGIN SELECT 1 END; BEGIN SELECT 2 END");
    }

    #[test]
    fn test_create_errors() {
        assert!(parse_create_procedure("CREATE PROCEDURE p SELECT 1").is_err());
        assert!(parse_create_procedure("CREATE PROCEDURE p AS").is_err());
        assert!(parse_create_procedure("CREATE PROCEDURE AS SELECT 1").is_err());
        assert!(parse_create_procedure("CREATE PROCEDURE p id INT AS SELECT 1").is_err());
    }

    #[test]
    fn test_parameters_serialize_as_json() {
        let def = parse_create_procedure("CREATE PROC p @a DECIMAL(10,2) = 1.5 AS SELECT @a").unwrap();
        let json = serde_json::to_string(&def.parameters).unwrap();
        assert!(json.contains("\"type\":\"DECIMAL(10,2)\""));
        let back: Vec<Parameter> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def.parameters);
    }

    #[test]
    fn test_drop_procedure() {
        assert_eq!(
            parse_drop_procedure("DROP PROCEDURE IF EXISTS dbo.p;").unwrap(),
            DropProcedure {
                name: "p".into(),
                if_exists: true,
            }
        );
        assert!(!parse_drop_procedure("drop proc p").unwrap().if_exists);
        assert!(parse_drop_procedure("DROP PROC p q").is_err());
    }

    #[test]
    fn test_execute_arguments() {
        let call = parse_execute("EXEC dbo.GetUser @id = 5, @name = N'O''Brien', @flag = @v, @x = DEFAULT").unwrap();
        assert_eq!(call.name, "GetUser");
        assert_eq!(call.arguments.len(), 4);
        assert_eq!(call.arguments[0].name.as_deref(), Some("ID"));
        assert_eq!(call.arguments[0].value, ArgumentValue::Literal(SqlValue::Int(5)));
        assert_eq!(
            call.arguments[1].value,
            ArgumentValue::Literal(SqlValue::from("O'Brien"))
        );
        assert_eq!(call.arguments[2].value, ArgumentValue::Variable("V".into()));
        assert_eq!(call.arguments[3].value, ArgumentValue::Default);
    }

    #[test]
    fn test_execute_positional() {
        let call = parse_execute("EXECUTE p 1, -2.5, NULL, @out OUTPUT").unwrap();
        assert!(call.arguments.iter().all(|a| a.name.is_none()));
        assert_eq!(call.arguments[1].value, ArgumentValue::Literal(SqlValue::Float(-2.5)));
        assert_eq!(call.arguments[2].value, ArgumentValue::Literal(SqlValue::Null));
        assert_eq!(call.arguments[3].value, ArgumentValue::Variable("OUT".into()));

        assert!(parse_execute("EXEC p").unwrap().arguments.is_empty());
        assert!(parse_execute("EXEC p 1 + 2").is_err());
    }
}
