#![no_main]

use libfuzzer_sys::fuzz_target;
use mssql_types::{SqlType, SqlValue};

fuzz_target!(|text: &str| {
    if let Some(value) = SqlValue::parse_literal(text) {
        let _ = value.to_text();
        let _ = SqlType::infer(&value);
    }
});
