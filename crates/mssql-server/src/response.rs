//! Translation between engine results and TDS tokens.

use mssql_engine::{BatchOutcome, EngineError, ExecuteResult, ProcedureArgument};
use mssql_types::SqlValue;
use tds_protocol::token::CMD_SELECT;
use tds_protocol::{ColumnMeta, Done, ResultSetEncoder, RpcParam, RpcValue, ServerMessage};

/// Write every result of a batch, then the error (if any).
///
/// Each result set and each row count gets its own DONE; all but the last
/// carry `MORE`. PRINT output becomes INFO tokens. A failed batch ends with
/// an ERROR token and a DONE with the error bit.
pub fn write_outcome(enc: &mut ResultSetEncoder, outcome: &BatchOutcome, server_name: &str) {
    let last_done = outcome.results.iter().rposition(|r| r.message.is_none());

    for (i, result) in outcome.results.iter().enumerate() {
        if let Some(text) = &result.message {
            enc.info(&ServerMessage::info(text.as_str(), server_name));
            continue;
        }
        let more = outcome.error.is_some() || Some(i) != last_done;
        if result.is_query {
            if let Err(err) = write_result_set(enc, result, more) {
                tracing::warn!(error = %err, "result set cannot be encoded");
                enc.error(&ServerMessage::error(
                    mssql_engine::USER_ERROR_NUMBER,
                    err.to_string(),
                    server_name,
                ));
                enc.done(Done::error());
                return;
            }
        } else {
            enc.done(Done::with_count(count(result.row_count), more));
        }
    }

    match &outcome.error {
        Some(err) => {
            enc.error(&error_message(err, server_name));
            enc.done(Done::error());
        }
        None if last_done.is_none() => enc.done(Done::default()),
        None => {}
    }
}

fn write_result_set(
    enc: &mut ResultSetEncoder,
    result: &ExecuteResult,
    more: bool,
) -> Result<(), tds_protocol::ProtocolError> {
    let columns: Vec<ColumnMeta> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if name.is_empty() {
                ColumnMeta::new(ColumnMeta::positional_name(i))
            } else {
                ColumnMeta::new(name.as_str())
            }
        })
        .collect();
    enc.column_metadata(&columns)?;
    for row in &result.rows {
        let values: Vec<Option<String>> = row.iter().map(SqlValue::to_text).collect();
        enc.row(&values)?;
    }
    enc.done(Done::with_count(result.rows.len(), more).with_cur_cmd(CMD_SELECT));
    Ok(())
}

fn count(rows: u64) -> usize {
    usize::try_from(rows).unwrap_or(usize::MAX)
}

/// The ERROR token for an engine error.
pub fn error_message(err: &EngineError, server_name: &str) -> ServerMessage {
    let message = ServerMessage::error(err.number(), err.to_string(), server_name);
    match err.procedure() {
        Some(procedure) => message.with_procedure(procedure),
        None => message,
    }
}

/// Convert a decoded RPC parameter into a procedure argument.
pub fn rpc_argument(param: &RpcParam) -> ProcedureArgument {
    let value = match &param.value {
        RpcValue::Null => SqlValue::Null,
        RpcValue::String(s) => SqlValue::Text(s.clone()),
        RpcValue::TinyInt(v) => SqlValue::Int(i64::from(*v)),
        RpcValue::Bit(v) => SqlValue::Bool(*v),
        RpcValue::SmallInt(v) => SqlValue::Int(i64::from(*v)),
        RpcValue::Int(v) => SqlValue::Int(i64::from(*v)),
        RpcValue::BigInt(v) => SqlValue::Int(*v),
        RpcValue::Float(v) => SqlValue::Float(*v),
    };
    let name = (!param.name.is_empty()).then(|| param.name.clone());
    ProcedureArgument {
        name,
        value: Some(value),
    }
}
