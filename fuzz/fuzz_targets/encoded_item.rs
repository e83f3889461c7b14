#![no_main]

use dexdecode::file::EncodedValue;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = EncodedValue::from_bytes(data) {
        match value {
            EncodedValue::Annotation(annotation) => for _ in annotation.elements() {},
            EncodedValue::Array(array) => for _ in &array {},
            _ => {}
        }
    }
});
