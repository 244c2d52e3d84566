//! Client sessions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mssql_batch::{BatchError, normalize_name};
use mssql_types::SqlValue;

use crate::catalog::{Catalog, MASTER_DATABASE};
use crate::error::{EngineError, Result};
use crate::executor::{BatchOutcome, Executor, ExecutorConfig, ProcedureArgument};

/// Procedure name that runs a parameterized batch instead of a stored procedure.
pub const SP_EXECUTESQL: &str = "sp_executesql";

/// Identity a client presented at login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginInfo {
    /// Login name.
    pub user: String,
    /// Client application name.
    pub application: String,
    /// Client host name.
    pub host: String,
    /// Initial database requested by the client.
    pub database: Option<String>,
}

/// A logged-in client: its identity and its executor.
///
/// Variables never outlive a batch; the current database and `@@ROWCOUNT`
/// do.
#[derive(Debug)]
pub struct Session {
    id: u16,
    login: LoginInfo,
    executor: Executor,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Open a session in the login's database, or `master`.
    pub fn open(id: u16, catalog: Arc<Catalog>, login: LoginInfo, config: ExecutorConfig) -> Result<Self> {
        let database = login
            .database
            .as_deref()
            .filter(|db| !db.is_empty())
            .unwrap_or(MASTER_DATABASE)
            .to_owned();
        let executor = Executor::with_catalog(catalog, &database, config)?;
        tracing::info!(
            session = id,
            user = %login.user,
            application = %login.application,
            host = %login.host,
            database = %database,
            "session opened"
        );
        Ok(Self {
            id,
            login,
            executor,
            started_at: Utc::now(),
        })
    }

    /// Session id (the SPID reported to the client).
    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Login details.
    #[must_use]
    pub fn login(&self) -> &LoginInfo {
        &self.login
    }

    /// Current database.
    #[must_use]
    pub fn database(&self) -> &str {
        self.executor.database()
    }

    /// When the session was opened.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The executor, for direct procedure calls.
    pub fn executor_mut(&mut self) -> &mut Executor {
        &mut self.executor
    }

    /// Run a SQL batch.
    pub fn execute_batch(&mut self, sql: &str) -> BatchOutcome {
        tracing::debug!(session = self.id, bytes = sql.len(), "sql batch");
        self.executor.execute_batch(sql)
    }

    /// Run a remote procedure call.
    ///
    /// `sp_executesql` takes the statement, an optional parameter
    /// declaration string and named parameter values. Any other name is a
    /// stored procedure.
    pub fn execute_rpc(&mut self, name: &str, args: &[ProcedureArgument]) -> BatchOutcome {
        tracing::debug!(session = self.id, procedure = name, args = args.len(), "rpc");
        let bare = name
            .rsplit('.')
            .next()
            .unwrap_or(name)
            .trim_matches(|c| c == '[' || c == ']');
        if bare.eq_ignore_ascii_case(SP_EXECUTESQL) {
            self.execute_sql(args)
        } else {
            self.executor.call(bare, args)
        }
    }

    fn execute_sql(&mut self, args: &[ProcedureArgument]) -> BatchOutcome {
        let mut args = args.iter().peekable();
        let Some(statement) = args
            .next()
            .and_then(|arg| arg.value.as_ref())
            .and_then(SqlValue::to_text)
        else {
            return BatchOutcome::failed(EngineError::Batch(BatchError::Syntax {
                near: SP_EXECUTESQL.to_owned(),
                reason: "expected the statement text as first parameter".to_owned(),
            }));
        };

        let is_declaration = |arg: &ProcedureArgument| {
            arg.name
                .as_deref()
                .is_none_or(|n| normalize_name(n) == "params")
        };
        let declarations = match args.peek() {
            Some(arg) if is_declaration(arg) => args
                .next()
                .and_then(|arg| arg.value.as_ref())
                .and_then(SqlValue::to_text),
            _ => None,
        };

        let mut params = Vec::new();
        for arg in args {
            match &arg.name {
                Some(name) => params.push((name.clone(), arg.value.clone().unwrap_or_default())),
                None => tracing::warn!(session = self.id, "ignoring unnamed sp_executesql parameter"),
            }
        }
        self.executor
            .execute_parameterized(&statement, declarations.as_deref(), &params)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session() -> Session {
        let catalog = Arc::new(Catalog::in_memory().unwrap());
        let login = LoginInfo {
            user: "sa".into(),
            application: "tests".into(),
            ..LoginInfo::default()
        };
        Session::open(51, catalog, login, ExecutorConfig::default()).unwrap()
    }

    #[test]
    fn test_defaults_to_master() {
        let session = session();
        assert_eq!(session.database(), "master");
        assert_eq!(session.id(), 51);
        assert_eq!(session.login().user, "sa");
    }

    #[test]
    fn test_unknown_initial_database() {
        let catalog = Arc::new(Catalog::in_memory().unwrap());
        let login = LoginInfo {
            database: Some("nope".into()),
            ..LoginInfo::default()
        };
        assert!(matches!(
            Session::open(1, catalog, login, ExecutorConfig::default()),
            Err(EngineError::DatabaseNotFound(_))
        ));
    }

    #[test]
    fn test_sp_executesql() {
        let mut session = session();
        session
            .execute_batch("CREATE TABLE t (id INTEGER, name TEXT); INSERT INTO t VALUES (7, 'seven')")
            .into_result()
            .unwrap();

        let outcome = session.execute_rpc(
            "sp_executesql",
            &[
                ProcedureArgument::positional("SELECT name FROM t WHERE id = @id"),
                ProcedureArgument::positional("@id INT"),
                ProcedureArgument::named("@id", 7),
            ],
        );
        let results = outcome.into_result().unwrap();
        assert_eq!(results[0].rows, vec![vec![SqlValue::from("seven")]]);
    }

    #[test]
    fn test_rpc_calls_procedure() {
        let mut session = session();
        session
            .execute_batch("CREATE PROC add_one @n INT AS SELECT @n + 1 AS result")
            .into_result()
            .unwrap();
        let outcome = session.execute_rpc("dbo.add_one", &[ProcedureArgument::named("@n", 41)]);
        let result = outcome.last_result_set().unwrap();
        assert_eq!(result.columns, vec!["result"]);
        assert_eq!(result.rows, vec![vec![SqlValue::Int(42)]]);
    }

    #[test]
    fn test_sp_executesql_requires_statement() {
        let mut session = session();
        let outcome = session.execute_rpc("sp_executesql", &[]);
        assert!(matches!(outcome.error, Some(EngineError::Batch(BatchError::Syntax { .. }))));
    }
}
