#![no_main]

use libfuzzer_sys::fuzz_target;
use mssql_batch::{parse_create_procedure, parse_execute};

fuzz_target!(|sql: &str| {
    let _ = parse_create_procedure(sql);
    let _ = parse_execute(sql);
});
