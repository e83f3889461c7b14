#![no_main]

use dexdecode::file::{DecodeOptions, DexFile, VerifyPreset};

libfuzzer_sys::fuzz_target!(|data: &[u8]| {
    // this must not panic
    let options = DecodeOptions::new().verify(VerifyPreset::All);
    if let Ok(dex) = DexFile::from_bytes(data, &options) {
        let mut out = String::new();
        let _ = dex.dump(&mut out);
    }
});
