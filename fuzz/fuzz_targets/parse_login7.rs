#![no_main]

use libfuzzer_sys::fuzz_target;
use tds_protocol::Login7;

fuzz_target!(|data: &[u8]| {
    if let Ok(login) = Login7::decode(data) {
        let _ = login.requested_database();
    }
});
