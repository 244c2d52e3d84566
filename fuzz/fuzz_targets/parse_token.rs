#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tds_protocol::TokenParser;

fuzz_target!(|data: &[u8]| {
    let mut parser = TokenParser::new(Bytes::copy_from_slice(data));
    while let Ok(Some(_)) = parser.next_token() {}
});
