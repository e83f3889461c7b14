use std::result;

pub mod error;
pub mod file;
pub mod leb128;

pub type Result<T> = result::Result<T, error::DexError>;

// index tables are reinterpreted in place from little-endian bytes
#[cfg(target_endian = "big")]
compile_error!("dexdecode only supports little-endian targets");
