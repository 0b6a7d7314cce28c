#![no_main]

use ipfix_codec::MessageBuffer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buffer = MessageBuffer::new();
    if buffer.from_bytes(data).is_ok() {
        for record in buffer.namedict_iterator() {
            let _ = record;
        }
    }
});
