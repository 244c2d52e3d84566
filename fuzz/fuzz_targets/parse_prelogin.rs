#![no_main]

use libfuzzer_sys::fuzz_target;
use tds_protocol::PreLogin;

// PRELOGIN is the first thing an unauthenticated client sends.
fuzz_target!(|data: &[u8]| {
    if let Ok(request) = PreLogin::decode(data) {
        let _ = request.encode();
    }
});
