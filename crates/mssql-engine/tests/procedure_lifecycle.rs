//! Stored procedure lifecycle and batch behaviour against real SQLite engines.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use mssql_batch::parse_create_procedure;
use mssql_engine::{
    Catalog, EngineError, Executor, ExecutorConfig, ProcedureArgument, SqliteEngine,
};
use mssql_types::SqlValue;
use proptest::prelude::*;

fn executor() -> Executor {
    Executor::new(Arc::new(SqliteEngine::in_memory().unwrap()), ExecutorConfig::default()).unwrap()
}

const GET_ORDERS: &str = "CREATE PROCEDURE GetOrders @customer INT, @status VARCHAR(20) = 'open' AS \
    SELECT id, total FROM orders WHERE customer = @customer AND status = @status ORDER BY id";

fn with_orders() -> Executor {
    let mut exec = executor();
    exec.execute_batch(
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer INTEGER, status TEXT, total REAL); \
         INSERT INTO orders VALUES (1, 10, 'open', 9.5), (2, 10, 'closed', 20.0), (3, 11, 'open', 1.25)",
    )
    .into_result()
    .unwrap();
    exec.execute(GET_ORDERS).unwrap();
    exec
}

#[test]
fn create_then_get_returns_same_definition() {
    let exec = with_orders();
    let expected = parse_create_procedure(GET_ORDERS).unwrap();
    let stored = exec.procedures().get("GetOrders").unwrap();
    assert_eq!(stored.body, expected.body);
    assert_eq!(stored.parameters, expected.parameters);
}

#[test]
fn execute_returns_header_row_first() {
    let mut exec = with_orders();
    let result = exec
        .execute_procedure("GetOrders", &[ProcedureArgument::named("customer", 10)])
        .unwrap();
    assert_eq!(
        result.rows,
        vec![
            vec![SqlValue::from("id"), SqlValue::from("total")],
            vec![SqlValue::Int(1), SqlValue::Float(9.5)],
        ]
    );
    assert_eq!(result.columns, vec!["id", "total"]);
}

#[test]
fn execute_overrides_default() {
    let mut exec = with_orders();
    let result = exec
        .execute_procedure(
            "getorders",
            &[
                ProcedureArgument::named("@customer", 10),
                ProcedureArgument::named("@status", "closed"),
            ],
        )
        .unwrap();
    assert_eq!(result.rows[1], vec![SqlValue::Int(2), SqlValue::Float(20.0)]);
}

#[test]
fn missing_required_parameter() {
    let mut exec = with_orders();
    let err = exec
        .execute_procedure("GetOrders", &[ProcedureArgument::named("status", "open")])
        .unwrap_err();
    match err {
        EngineError::MissingParameter { procedure, parameter } => {
            assert_eq!(procedure, "GetOrders");
            assert_eq!(parameter, "@customer");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn unknown_procedure() {
    let mut exec = with_orders();
    assert!(matches!(
        exec.execute_procedure("NoSuchProc", &[]),
        Err(EngineError::ProcedureNotFound(_))
    ));
    assert_eq!(exec.execute("EXEC NoSuchProc").unwrap_err().number(), 2812);
}

#[test]
fn procedures_survive_reopen() {
    let dir = std::env::temp_dir().join(format!("tds-lite-lifecycle-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    {
        let catalog = Arc::new(Catalog::open(&dir).unwrap());
        let mut exec = Executor::with_catalog(catalog, "master", ExecutorConfig::default()).unwrap();
        exec.execute("CREATE PROC hello @who NVARCHAR(20) AS SELECT 'hello ' || @who AS greeting")
            .unwrap();
    }

    let catalog = Arc::new(Catalog::open(&dir).unwrap());
    let mut exec = Executor::with_catalog(catalog, "master", ExecutorConfig::default()).unwrap();
    let result = exec
        .execute_procedure("hello", &[ProcedureArgument::positional("world")])
        .unwrap();
    assert_eq!(result.rows[1], vec![SqlValue::from("hello world")]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn batch_stops_at_first_error() {
    let mut exec = executor();
    let outcome = exec.execute_batch(
        "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1); \
         INSERT INTO missing VALUES (2); INSERT INTO t VALUES (3)",
    );
    assert_eq!(outcome.results.len(), 2);
    assert!(matches!(outcome.error, Some(EngineError::Storage { .. })));

    let count = exec.execute("SELECT COUNT(*) FROM t").unwrap();
    assert_eq!(count.rows, vec![vec![SqlValue::Int(1)]]);
}

#[test]
fn nested_procedure_calls() {
    let mut exec = executor();
    exec.execute_batch(
        "CREATE TABLE log (msg TEXT); \
         CREATE PROC inner_proc @msg VARCHAR(50) AS INSERT INTO log VALUES (@msg)",
    )
    .into_result()
    .unwrap();
    exec.execute(
        "CREATE PROC outer_proc @n INT AS BEGIN \
           DECLARE @i INT = 0; \
           WHILE @i < @n BEGIN \
             SET @i = @i + 1; \
             EXEC inner_proc 'tick'; \
           END; \
           SELECT COUNT(*) AS ticks FROM log; \
         END",
    )
    .unwrap();

    let result = exec.execute("EXEC outer_proc @n = 3").unwrap();
    assert_eq!(result.rows, vec![vec![SqlValue::Int(3)]]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn text_arguments_round_trip_through_procedures(text in "[a-zA-Z0-9 ',;()@=-]{0,30}") {
        let mut exec = executor();
        exec.execute("CREATE PROC echo @value NVARCHAR(MAX) AS SELECT @value AS value").unwrap();
        let result = exec
            .execute_procedure("echo", &[ProcedureArgument::positional(text.as_str())])
            .unwrap();
        prop_assert_eq!(&result.rows[1][0], &SqlValue::Text(text));
    }

    #[test]
    fn integer_arguments_round_trip(n in any::<i32>()) {
        let mut exec = executor();
        exec.execute("CREATE PROC twice @n BIGINT AS SELECT @n * 2").unwrap();
        let result = exec
            .execute_procedure("twice", &[ProcedureArgument::positional(n)])
            .unwrap();
        prop_assert_eq!(&result.rows[1][0], &SqlValue::Int(i64::from(n) * 2));
    }
}
