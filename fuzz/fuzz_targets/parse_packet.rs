#![no_main]

use libfuzzer_sys::fuzz_target;
use tds_protocol::{PACKET_HEADER_SIZE, PacketHeader};

fuzz_target!(|data: &[u8]| {
    if data.len() >= PACKET_HEADER_SIZE {
        let mut cursor = data;
        let _ = PacketHeader::decode(&mut cursor);
    }
});
