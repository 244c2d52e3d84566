#![no_main]

use libfuzzer_sys::fuzz_target;
use tds_protocol::RpcRequest;

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = RpcRequest::decode(data) {
        let _ = request.target();
    }
});
