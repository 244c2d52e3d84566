//! Batch execution.
//!
//! The executor walks the statements of a batch, handles the procedural
//! ones (DECLARE, SET, IF, WHILE, EXEC, PRINT, ...) itself and hands every
//! other statement, with variables substituted, to the storage engine.

use std::collections::HashMap;
use std::sync::Arc;

use mssql_batch::scanner::{TokenKind, significant_tokens};
use mssql_batch::{
    ArgumentValue, BatchError, Context, LogicalCondition, Reference, SetStatement, StatementKind,
    evaluate_with, normalize_name, parse_create_procedure, parse_declare, parse_drop_procedure,
    parse_execute, parse_if_block, parse_select_assignment, parse_set, parse_statement,
    parse_while_block, split_statements, substitute_context, substitute_variables,
};
use mssql_types::{SqlType, SqlValue, format_value};

use crate::catalog::{Catalog, MASTER_DATABASE};
use crate::error::{EngineError, Result};
use crate::procedure::{Procedure, ProcedureStore};
use crate::storage::{QueryResult, StatementOutcome, StorageEngine};

/// Product version reported by `@@VERSION`.
pub const DEFAULT_VERSION: &str = "TdsLite 0.1.0 (SQLite storage) - compatible with Microsoft SQL Server 16.0";

/// Per-batch execution limits.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ExecutorConfig {
    /// Maximum iterations of a single WHILE loop.
    pub max_loop_iterations: usize,
    /// Maximum procedure call nesting.
    pub max_nesting: usize,
    /// Text returned by `@@VERSION`.
    pub version: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 10_000,
            max_nesting: 32,
            version: DEFAULT_VERSION.to_owned(),
        }
    }
}

impl ExecutorConfig {
    /// Create a configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the WHILE iteration limit.
    #[must_use]
    pub fn max_loop_iterations(mut self, limit: usize) -> Self {
        self.max_loop_iterations = limit;
        self
    }

    /// Set the procedure nesting limit.
    #[must_use]
    pub fn max_nesting(mut self, limit: usize) -> Self {
        self.max_nesting = limit;
        self
    }

    /// Set the `@@VERSION` text.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Result of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteResult {
    /// Column names; empty unless `is_query`.
    pub columns: Vec<String>,
    /// Rows; empty unless `is_query`.
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows returned or affected.
    pub row_count: u64,
    /// Whether the statement produced a result set.
    pub is_query: bool,
    /// Informational message, such as PRINT output.
    pub message: Option<String>,
}

impl ExecuteResult {
    fn from_rows(result: QueryResult) -> Self {
        Self {
            row_count: result.rows.len() as u64,
            columns: result.columns,
            rows: result.rows,
            is_query: true,
            message: None,
        }
    }

    fn affected(count: u64) -> Self {
        Self {
            row_count: count,
            ..Self::default()
        }
    }

    fn message(text: String) -> Self {
        Self {
            message: Some(text),
            ..Self::default()
        }
    }

    /// Prepend a row holding the column names.
    #[must_use]
    pub fn with_header(mut self) -> Self {
        let header = self.columns.iter().map(|c| SqlValue::Text(c.clone())).collect();
        self.rows.insert(0, header);
        self
    }
}

/// Everything a batch produced.
///
/// Execution stops at the first error; results of earlier statements are
/// kept.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Results in statement order.
    pub results: Vec<ExecuteResult>,
    /// The error that stopped the batch.
    pub error: Option<EngineError>,
}

impl BatchOutcome {
    pub(crate) fn failed(err: EngineError) -> Self {
        Self {
            results: Vec::new(),
            error: Some(err),
        }
    }

    /// The last result set produced, if any.
    #[must_use]
    pub fn last_result_set(&self) -> Option<&ExecuteResult> {
        self.results.iter().rev().find(|r| r.is_query)
    }

    /// Convert into the results, or the error if the batch failed.
    pub fn into_result(self) -> Result<Vec<ExecuteResult>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.results),
        }
    }
}

/// An argument of a procedure call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureArgument {
    /// Parameter name for named arguments (with or without `@`).
    pub name: Option<String>,
    /// Value; `None` means `DEFAULT`.
    pub value: Option<SqlValue>,
}

impl ProcedureArgument {
    /// A named argument.
    pub fn named(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(value.into()),
        }
    }

    /// A positional argument.
    pub fn positional(value: impl Into<SqlValue>) -> Self {
        Self {
            name: None,
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Break,
    Continue,
    Return,
}

struct Scope {
    ctx: Context,
    loop_depth: usize,
    nesting: usize,
}

/// Executes batches against one current database.
pub struct Executor {
    catalog: Option<Arc<Catalog>>,
    database: String,
    engine: Arc<dyn StorageEngine>,
    procedures: ProcedureStore,
    config: ExecutorConfig,
    row_count: u64,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("database", &self.database)
            .field("config", &self.config)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// An executor over a single engine; database commands are unavailable.
    pub fn new(engine: Arc<dyn StorageEngine>, config: ExecutorConfig) -> Result<Self> {
        Ok(Self {
            catalog: None,
            database: MASTER_DATABASE.to_owned(),
            procedures: ProcedureStore::open(engine.clone())?,
            engine,
            config,
            row_count: 0,
        })
    }

    /// An executor that starts in `database` and can switch databases.
    pub fn with_catalog(catalog: Arc<Catalog>, database: &str, config: ExecutorConfig) -> Result<Self> {
        let engine = catalog.engine(database)?;
        Ok(Self {
            procedures: ProcedureStore::open(engine.clone())?,
            engine,
            catalog: Some(catalog),
            database: database.to_ascii_lowercase(),
            config,
            row_count: 0,
        })
    }

    /// The current database.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The procedure store of the current database.
    #[must_use]
    pub fn procedures(&self) -> &ProcedureStore {
        &self.procedures
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Switch the current database.
    pub fn use_database(&mut self, name: &str) -> Result<()> {
        let catalog = self.catalog.clone().ok_or(EngineError::NoCatalog)?;
        let engine = catalog.engine(name)?;
        self.procedures = ProcedureStore::open(engine.clone())?;
        self.engine = engine;
        self.database = name.to_ascii_lowercase();
        tracing::debug!(database = %self.database, "changed database");
        Ok(())
    }

    /// Run a batch and return its last result set (or last result).
    pub fn execute(&mut self, sql: &str) -> Result<ExecuteResult> {
        let results = self.execute_batch(sql).into_result()?;
        let last_set = results.iter().rposition(|r| r.is_query);
        Ok(match last_set {
            Some(i) => results.into_iter().nth(i).unwrap_or_default(),
            None => results.into_iter().next_back().unwrap_or_default(),
        })
    }

    /// Run a batch with a fresh variable context.
    pub fn execute_batch(&mut self, sql: &str) -> BatchOutcome {
        self.execute_batch_with(sql, Context::new())
    }

    /// Run a batch with variables already declared in `ctx`.
    pub fn execute_batch_with(&mut self, sql: &str, mut ctx: Context) -> BatchOutcome {
        self.seed_system(&mut ctx);
        let mut scope = Scope {
            ctx,
            loop_depth: 0,
            nesting: 0,
        };
        let mut outcome = BatchOutcome::default();
        let statements = split_statements(sql);
        tracing::debug!(statements = statements.len(), "executing batch");
        if let Err(err) = self.run_statements(&statements, &mut scope, &mut outcome.results) {
            tracing::warn!(error = %err, "batch failed");
            outcome.error = Some(err);
        }
        outcome
    }

    /// Run a parameterized batch, `sp_executesql` style.
    ///
    /// `declarations` is the parameter definition string (`@id INT, ...`).
    /// Parameters missing from it are declared with a type inferred from
    /// their value.
    pub fn execute_parameterized(
        &mut self,
        sql: &str,
        declarations: Option<&str>,
        params: &[(String, SqlValue)],
    ) -> BatchOutcome {
        let mut ctx = Context::new();
        let declared = match declarations.filter(|d| !d.trim().is_empty()) {
            Some(text) => match parse_declare(&format!("DECLARE {text}")) {
                Ok(decls) => decls,
                Err(err) => return BatchOutcome::failed(err.into()),
            },
            None => Vec::new(),
        };

        for decl in &declared {
            if let Err(err) = ctx.declare(&decl.name, decl.sql_type, None) {
                return BatchOutcome::failed(err.into());
            }
        }
        for (name, value) in params {
            let result = if ctx.contains(name) {
                ctx.set(name, value.clone())
            } else {
                ctx.declare(name, SqlType::infer(value), Some(value.clone()))
            };
            if let Err(err) = result {
                return BatchOutcome::failed(err.into());
            }
        }
        self.execute_batch_with(sql, ctx)
    }

    /// Execute a stored procedure.
    ///
    /// The result is the last result set of the body, with a header row of
    /// column names prepended.
    pub fn execute_procedure(&mut self, name: &str, args: &[ProcedureArgument]) -> Result<ExecuteResult> {
        let mut results = Vec::new();
        self.call_procedure(name, args, 1, &mut results)?;
        let last = results.into_iter().rev().find(|r| r.is_query).unwrap_or_default();
        Ok(last.with_header())
    }

    /// Execute a stored procedure, keeping every result it produced.
    pub fn call(&mut self, name: &str, args: &[ProcedureArgument]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if let Err(err) = self.call_procedure(name, args, 1, &mut outcome.results) {
            tracing::warn!(procedure = name, error = %err, "procedure call failed");
            outcome.error = Some(err);
        }
        outcome
    }

    fn fresh_context(&self) -> Context {
        let mut ctx = Context::new();
        self.seed_system(&mut ctx);
        ctx
    }

    fn seed_system(&self, ctx: &mut Context) {
        ctx.set_system("ROWCOUNT", SqlValue::Int(self.row_count as i64));
        ctx.set_system("VERSION", SqlValue::Text(self.config.version.clone()));
    }

    fn set_row_count(&mut self, scope: &mut Scope, count: u64) {
        self.row_count = count;
        scope.ctx.set_system("ROWCOUNT", SqlValue::Int(count as i64));
    }

    fn run_statements(&mut self, statements: &[String], scope: &mut Scope, out: &mut Vec<ExecuteResult>) -> Result<Flow> {
        for statement in statements {
            let flow = self.run_statement(statement, scope, out)?;
            if flow != Flow::Next {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    fn run_statement(&mut self, sql: &str, scope: &mut Scope, out: &mut Vec<ExecuteResult>) -> Result<Flow> {
        let kind = parse_statement(sql);
        tracing::debug!(kind = ?kind, statement = %preview(sql), "execute statement");

        match kind {
            StatementKind::Query => {
                let text = substitute_context(sql, &scope.ctx)?;
                match self.engine.run(&text)? {
                    StatementOutcome::Rows(rows) => {
                        let result = ExecuteResult::from_rows(rows);
                        self.set_row_count(scope, result.row_count);
                        out.push(result);
                    }
                    StatementOutcome::Affected(count) => {
                        self.set_row_count(scope, count);
                        out.push(ExecuteResult::affected(count));
                    }
                }
            }
            StatementKind::Declare => {
                for decl in parse_declare(sql)? {
                    let initial = match &decl.initial {
                        Some(expr) => Some(self.evaluate_expression(expr, &scope.ctx)?),
                        None => None,
                    };
                    scope.ctx.declare(&decl.name, decl.sql_type, initial)?;
                }
            }
            StatementKind::Set => match parse_set(sql)? {
                SetStatement::Variable { name, expression } => {
                    let value = self.evaluate_expression(&expression, &scope.ctx)?;
                    scope.ctx.set(&name, value)?;
                }
                SetStatement::Option { name, value } => {
                    tracing::debug!(option = %name, value = %value, "ignoring session option");
                }
            },
            StatementKind::SelectAssignment => {
                let assignment = parse_select_assignment(sql)?;
                let text = substitute_context(&assignment.query, &scope.ctx)?;
                let result = self.engine.query(&text)?;
                self.set_row_count(scope, result.rows.len() as u64);
                if let Some(row) = result.rows.last() {
                    for (target, value) in assignment.targets.iter().zip(row) {
                        scope.ctx.set(target, value.clone())?;
                    }
                }
            }
            StatementKind::If => {
                let block = parse_if_block(sql)?;
                if self.evaluate_condition(&block.condition, &scope.ctx)? {
                    return self.run_statements(&block.body, scope, out);
                }
                if let Some(else_body) = &block.else_body {
                    return self.run_statements(else_body, scope, out);
                }
            }
            StatementKind::While => {
                let block = parse_while_block(sql)?;
                scope.loop_depth += 1;
                let flow = self.run_loop(&block.condition, &block.body, scope, out);
                scope.loop_depth -= 1;
                return flow;
            }
            StatementKind::CreateProcedure => {
                let definition = parse_create_procedure(sql)?;
                self.procedures.create(&definition)?;
            }
            StatementKind::DropProcedure => {
                let drop = parse_drop_procedure(sql)?;
                if !drop.if_exists || self.procedures.exists(&drop.name)? {
                    self.procedures.drop(&drop.name)?;
                }
            }
            StatementKind::Execute => {
                let call = parse_execute(sql)?;
                let mut args = Vec::with_capacity(call.arguments.len());
                for arg in call.arguments {
                    let value = match arg.value {
                        ArgumentValue::Literal(value) => Some(value),
                        ArgumentValue::Variable(name) => Some(scope.ctx.value(&name)?),
                        ArgumentValue::Default => None,
                    };
                    args.push(ProcedureArgument {
                        name: arg.name,
                        value,
                    });
                }
                self.call_procedure(&call.name, &args, scope.nesting + 1, out)?;
            }
            StatementKind::Print => {
                let tokens = significant_tokens(sql);
                let expr = tokens.first().map_or("", |first| sql[first.end..].trim());
                let expr = expr.trim_end_matches(';').trim();
                let value = self.evaluate_expression(expr, &scope.ctx)?;
                out.push(ExecuteResult::message(value.to_text().unwrap_or_default()));
            }
            StatementKind::Break | StatementKind::Continue => {
                let (keyword, flow) = if kind == StatementKind::Break {
                    ("BREAK", Flow::Break)
                } else {
                    ("CONTINUE", Flow::Continue)
                };
                if scope.loop_depth == 0 {
                    return Err(EngineError::NotInLoop(keyword));
                }
                return Ok(flow);
            }
            StatementKind::Return => return Ok(Flow::Return),
            StatementKind::Use => {
                let name = object_name(sql, 1)?;
                self.use_database(&name)?;
            }
            StatementKind::CreateDatabase => {
                let name = object_name(sql, 2)?;
                self.catalog.as_ref().ok_or(EngineError::NoCatalog)?.create_database(&name)?;
            }
            StatementKind::DropDatabase => {
                let name = object_name(sql, 2)?;
                if name.eq_ignore_ascii_case(&self.database) {
                    return Err(EngineError::CannotDropDatabase(name));
                }
                self.catalog.as_ref().ok_or(EngineError::NoCatalog)?.drop_database(&name)?;
            }
            StatementKind::Unknown => {}
        }
        Ok(Flow::Next)
    }

    fn run_loop(
        &mut self,
        condition: &LogicalCondition,
        body: &[String],
        scope: &mut Scope,
        out: &mut Vec<ExecuteResult>,
    ) -> Result<Flow> {
        let limit = self.config.max_loop_iterations;
        let mut iterations = 0usize;
        while self.evaluate_condition(condition, &scope.ctx)? {
            iterations += 1;
            if iterations > limit {
                return Err(EngineError::LoopLimitExceeded { limit });
            }
            match self.run_statements(body, scope, out)? {
                Flow::Break => break,
                Flow::Return => return Ok(Flow::Return),
                Flow::Next | Flow::Continue => {}
            }
        }
        Ok(Flow::Next)
    }

    fn call_procedure(
        &mut self,
        name: &str,
        args: &[ProcedureArgument],
        nesting: usize,
        out: &mut Vec<ExecuteResult>,
    ) -> Result<()> {
        if nesting > self.config.max_nesting {
            return Err(EngineError::NestingLimitExceeded(self.config.max_nesting));
        }
        let procedure = self.procedures.get(name)?;
        let bound = bind_arguments(&procedure, args)?;
        let body = substitute_variables(&procedure.body, |reference| {
            Ok(match reference {
                Reference::Variable(var) => bound.get(&normalize_name(var)).cloned(),
                Reference::System(_) => None,
            })
        })?;
        tracing::debug!(procedure = %procedure.name, nesting, "executing procedure");

        let mut scope = Scope {
            ctx: self.fresh_context(),
            loop_depth: 0,
            nesting,
        };
        let statements = split_statements(&body);
        self.run_statements(&statements, &mut scope, out)
            .map(|_| ())
            .map_err(|err| EngineError::InProcedure {
                procedure: procedure.name.clone(),
                source: Box::new(err),
            })
    }

    fn evaluate_condition(&self, condition: &LogicalCondition, ctx: &Context) -> Result<bool> {
        let mut resolve = |expr: &str| {
            self.evaluate_expression(expr, ctx).map_err(|err| match err {
                EngineError::Batch(err) => err,
                other => BatchError::Expression {
                    expression: expr.to_owned(),
                    reason: other.to_string(),
                },
            })
        };
        Ok(evaluate_with(condition, ctx, &mut resolve)?)
    }

    /// Evaluate a scalar expression.
    ///
    /// Variables and literals are resolved directly; anything else is
    /// evaluated by the engine as `SELECT <expr>`.
    fn evaluate_expression(&self, expr: &str, ctx: &Context) -> Result<SqlValue> {
        let expr = expr.trim();
        let tokens = significant_tokens(expr);
        if let [tok] = tokens.as_slice() {
            match tok.kind {
                TokenKind::Variable => return Ok(ctx.value(expr)?),
                TokenKind::SystemVariable => return Ok(ctx.system(expr)),
                _ => {}
            }
        }
        if let Some(value) = SqlValue::parse_literal(expr) {
            return Ok(value);
        }
        let text = substitute_context(expr, ctx)?;
        let result = self.engine.query(&format!("SELECT {text}"))?;
        Ok(result.scalar().cloned().unwrap_or_default())
    }
}

/// Map call arguments to rendered literals keyed by parameter.
///
/// Missing required parameters are reported before unknown arguments.
fn bind_arguments(procedure: &Procedure, args: &[ProcedureArgument]) -> Result<HashMap<String, String>> {
    let mut bound = HashMap::new();
    let mut unexpected = None;

    for (index, arg) in args.iter().enumerate() {
        let param = match &arg.name {
            Some(name) => procedure.parameter(name),
            None => procedure.parameters.get(index),
        };
        match param {
            Some(param) => {
                if let Some(value) = &arg.value {
                    bound.insert(param.key(), format_value(value, &param.sql_type));
                }
            }
            None if unexpected.is_none() => {
                unexpected = Some(match &arg.name {
                    Some(name) => EngineError::UnexpectedParameter {
                        procedure: procedure.name.clone(),
                        parameter: name.trim_start_matches('@').to_owned(),
                    },
                    None => EngineError::TooManyArguments {
                        procedure: procedure.name.clone(),
                    },
                });
            }
            None => {}
        }
    }

    for param in &procedure.parameters {
        let key = param.key();
        if bound.contains_key(&key) {
            continue;
        }
        match &param.default {
            Some(default) => {
                let literal = SqlValue::parse_literal(default)
                    .map_or_else(|| default.clone(), |v| format_value(&v, &param.sql_type));
                bound.insert(key, literal);
            }
            None => {
                return Err(EngineError::MissingParameter {
                    procedure: procedure.name.clone(),
                    parameter: param.name.clone(),
                });
            }
        }
    }

    match unexpected {
        Some(err) => Err(err),
        None => Ok(bound),
    }
}

/// The object name in `USE db` / `CREATE DATABASE db` / `DROP DATABASE db`.
fn object_name(sql: &str, skip: usize) -> Result<String> {
    let tokens = significant_tokens(sql);
    let rest: Vec<_> = tokens
        .iter()
        .skip(skip)
        .filter(|t| t.kind != TokenKind::Semicolon)
        .collect();
    match rest.as_slice() {
        [tok] if tok.kind == TokenKind::Word => Ok(tok.text(sql).to_owned()),
        [tok] if tok.kind == TokenKind::QuotedIdent => {
            let text = tok.text(sql);
            Ok(text.get(1..text.len().saturating_sub(1)).unwrap_or_default().to_owned())
        }
        _ => Err(BatchError::Syntax {
            near: preview(sql),
            reason: "expected a database name".to_owned(),
        }
        .into()),
    }
}

fn preview(sql: &str) -> String {
    const MAX: usize = 80;
    let flat: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > MAX {
        let mut cut: String = flat.chars().take(MAX).collect();
        cut.push_str("...");
        cut
    } else {
        flat
    }
}
