#![no_main]

use std::hint::black_box;

use dexdecode::file::{CodeItem, DexCursor, DexItem};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(code) = CodeItem::read(&mut DexCursor::new(data)) {
        for try_item in &code.tries {
            if let Ok(handler) = code.handler_for(try_item) {
                for data in handler.iter() {
                    let _ = black_box(data);
                }
            }
        }
    }
});
