#![no_main]

use libfuzzer_sys::fuzz_target;
use tds_protocol::decode_sql_batch;

fuzz_target!(|data: &[u8]| {
    let _ = decode_sql_batch(data);
});
