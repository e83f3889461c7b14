//! LEB128 codecs used throughout the DEX format.
//!
//! Three flavours exist: `uleb128`, `uleb128p1` (unsigned, biased by one so
//! that `-1` encodes as `0x00`) and `sleb128`. All of them are limited to five
//! 7-bit groups (32 bits of payload).

use crate::{dex_err, Result};

fn map_leb128_error(
    err: leb128fmt::Error,
    offset: usize,
    item_ty: &'static str,
) -> crate::error::DexError {
    if err.is_more_bytes_needed() {
        crate::error::DexError::TruncatedLeb128 { offset, item_ty }
    } else {
        crate::error::DexError::BadLeb128 { offset, item_ty }
    }
}

/// Decodes an unsigned LEB128 value belonging to `item_ty` starting at
/// `data_in[*ptr_pos]` and advances `ptr_pos` past it.
#[inline(always)]
pub fn decode_leb128_in(data_in: &[u8], ptr_pos: &mut usize, item_ty: &'static str) -> Result<u32> {
    let start = *ptr_pos;
    leb128fmt::decode_uint_slice::<u32, 32>(data_in, ptr_pos)
        .map_err(|err| map_leb128_error(err, start, item_ty))
}

/// Decodes an unsigned LEB128 value starting at `data_in[*ptr_pos]` and
/// advances `ptr_pos` past it.
#[inline(always)]
pub fn decode_leb128_off(data_in: &[u8], ptr_pos: &mut usize) -> Result<u32> {
    decode_leb128_in(data_in, ptr_pos, "uleb128")
}

/// Decodes an unsigned LEB128 value at the start of `data_in`, returning the
/// value and the number of bytes consumed.
#[inline(always)]
pub fn decode_leb128(data_in: &[u8]) -> Result<(u32, usize)> {
    let mut pos = 0;
    let value = decode_leb128_off(data_in, &mut pos)?;
    Ok((value, pos))
}

/// `uleb128p1`: the decoded unsigned value minus one. `-1` is used as the
/// "no index" sentinel.
#[inline(always)]
pub fn decode_leb128p1_off(data_in: &[u8], ptr_pos: &mut usize) -> Result<i64> {
    Ok(decode_leb128_in(data_in, ptr_pos, "uleb128p1")? as i64 - 1)
}

/// Signed counterpart of [decode_leb128_in], sign-extending from the highest
/// payload bit of the last group.
#[inline(always)]
pub fn decode_sleb128_in(data_in: &[u8], ptr_pos: &mut usize, item_ty: &'static str) -> Result<i32> {
    let start = *ptr_pos;
    leb128fmt::decode_sint_slice::<i32, 32>(data_in, ptr_pos)
        .map_err(|err| map_leb128_error(err, start, item_ty))
}

#[inline(always)]
pub fn decode_sleb128(data_in: &[u8], ptr_pos: &mut usize) -> Result<i32> {
    decode_sleb128_in(data_in, ptr_pos, "sleb128")
}

pub fn encode_leb128(value: u32) -> Vec<u8> {
    let mut output = vec![0; leb128fmt::max_len::<32>()];
    let mut pos = 0;
    // a 32-bit value always fits into five groups
    let _ = leb128fmt::encode_uint_slice::<u32, 32>(value, &mut output, &mut pos);
    output.truncate(pos);
    output
}

/// Inverse of [decode_leb128p1_off]. Only values in `-1..=u32::MAX - 1` are
/// representable.
pub fn encode_leb128p1(value: i64) -> Result<Vec<u8>> {
    match u32::try_from(value + 1) {
        Ok(biased) => Ok(encode_leb128(biased)),
        Err(_) => dex_err!(BadLeb128 {
            offset: 0,
            item_ty: "uleb128p1"
        }),
    }
}

pub fn encode_sleb128(value: i32) -> Vec<u8> {
    let mut output = vec![0; leb128fmt::max_len::<32>()];
    let mut pos = 0;
    let _ = leb128fmt::encode_sint_slice::<i32, 32>(value, &mut output, &mut pos);
    output.truncate(pos);
    output
}
