#![no_main]

use libfuzzer_sys::fuzz_target;
use mssql_batch::{Context, evaluate, parse_condition};

fuzz_target!(|text: &str| {
    if let Ok(condition) = parse_condition(text) {
        let _ = evaluate(&condition, &Context::new());
    }
});
