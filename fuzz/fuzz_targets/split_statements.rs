#![no_main]

use libfuzzer_sys::fuzz_target;
use mssql_batch::{parse_statement, split_statements};

fuzz_target!(|sql: &str| {
    for statement in split_statements(sql) {
        let _ = parse_statement(&statement);
    }
});
