use plain::Plain;
use serde::Serialize;

use crate::{dex_err, leb128, Result};

/// Something the decoder skipped instead of failing on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub offset: usize,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// An encoded value with a reserved type tag. Only its header byte was consumed.
    UnknownValueType { value_type: u8, value_arg: u8 },
    /// A map entry with an unrecognized type code. The whole entry was skipped.
    UnknownMapItemType { type_code: u16, count: u32 },
}

/// Random-access reader over an immutable DEX buffer.
///
/// Out-of-line data is reached through [DexCursor::with_offset], which saves
/// the current position, decodes at the target and restores the position
/// afterwards (also when decoding fails).
pub struct DexCursor<'a> {
    data: &'a [u8],
    pos: usize,

    depth: usize,
    max_depth: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> DexCursor<'a> {
    pub const DEFAULT_MAX_DEPTH: usize = 64;

    pub fn new(data: &'a [u8]) -> Self {
        Self::with_max_depth(data, Self::DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(data: &'a [u8], max_depth: usize) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
            max_depth,
            diagnostics: Vec::new(),
        }
    }

    #[inline(always)]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline(always)]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, offset: usize, section: &'static str) -> Result<()> {
        if offset > self.data.len() {
            return dex_err!(BadOffsetTooLarge {
                offset,
                size: self.data.len(),
                section
            });
        }
        self.pos = offset;
        Ok(())
    }

    /// Runs `f` at `offset` and restores the current position afterwards.
    pub fn with_offset<T, F>(&mut self, offset: usize, section: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved = self.pos;
        self.seek(offset, section)?;
        let result = f(self);
        self.pos = saved;
        result
    }

    /// Skips forward to the next multiple of `alignment` (absolute offset).
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let misalignment = self.pos % alignment;
        if misalignment != 0 {
            let target = self.pos + (alignment - misalignment);
            self.seek(target, "alignment padding")?;
        }
        Ok(())
    }

    pub fn is_aligned(&self, alignment: usize) -> bool {
        self.pos % alignment == 0
    }

    pub fn read_bytes(&mut self, len: usize, item_ty: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return dex_err!(TruncatedFile {
                offset: self.pos,
                needed: len,
                available: self.remaining(),
                item_ty
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    #[inline]
    pub fn read_u8(&mut self, item_ty: &'static str) -> Result<u8> {
        Ok(self.read_bytes(1, item_ty)?[0])
    }

    #[inline]
    pub fn read_u16(&mut self, item_ty: &'static str) -> Result<u16> {
        let bytes = self.read_bytes(2, item_ty)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    #[inline]
    pub fn read_u32(&mut self, item_ty: &'static str) -> Result<u32> {
        let bytes = self.read_bytes(4, item_ty)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Copies a fixed-size record out of the buffer. The buffer does not need
    /// to be aligned for `T`.
    pub fn read_plain<T: Plain + Default>(&mut self, item_ty: &'static str) -> Result<T> {
        let bytes = self.read_bytes(std::mem::size_of::<T>(), item_ty)?;
        let mut value = T::default();
        match value.copy_from_bytes(bytes) {
            Ok(()) => Ok(value),
            Err(_) => dex_err!(TruncatedFile {
                offset: self.pos - bytes.len(),
                needed: std::mem::size_of::<T>(),
                available: bytes.len(),
                item_ty
            }),
        }
    }

    pub fn read_array<T: Plain + Default>(
        &mut self,
        count: u32,
        item_ty: &'static str,
    ) -> Result<Vec<T>> {
        self.check_count(count, std::mem::size_of::<T>(), item_ty)?;
        (0..count).map(|_| self.read_plain(item_ty)).collect()
    }

    /// Rejects counts that could never be satisfied by the rest of the buffer,
    /// given that every element occupies at least `min_elem_size` bytes.
    pub fn check_count(&self, count: u32, min_elem_size: usize, item_ty: &'static str) -> Result<()> {
        let needed = (count as u64).checked_mul(min_elem_size as u64);
        match needed {
            Some(needed) if needed <= self.remaining() as u64 => Ok(()),
            _ => dex_err!(DexLayoutError {
                offset: self.pos,
                item_ty,
                count: count as u64,
                needed: needed.unwrap_or(u64::MAX),
                available: self.remaining()
            }),
        }
    }

    #[inline]
    pub fn read_uleb128(&mut self, item_ty: &'static str) -> Result<u32> {
        leb128::decode_leb128_in(self.data, &mut self.pos, item_ty)
    }

    #[inline]
    pub fn read_uleb128p1(&mut self, item_ty: &'static str) -> Result<i64> {
        Ok(self.read_uleb128(item_ty)? as i64 - 1)
    }

    #[inline]
    pub fn read_sleb128(&mut self, item_ty: &'static str) -> Result<i32> {
        leb128::decode_sleb128_in(self.data, &mut self.pos, item_ty)
    }

    /// Reads a zero-terminated byte run. The terminator is part of the result.
    pub fn read_until_nul(&mut self, item_ty: &'static str) -> Result<&'a [u8]> {
        let start = self.pos;
        match self.data[start.min(self.data.len())..]
            .iter()
            .position(|b| *b == 0)
        {
            Some(end) => {
                self.pos = start + end + 1;
                Ok(&self.data[start..self.pos])
            }
            None => dex_err!(BadStringDataMissingNullByte {
                offset: start,
                item_ty
            }),
        }
    }

    /// Tracks one more level of encoded value nesting.
    pub fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return dex_err!(EncodedValueTooDeep {
                offset: self.pos,
                max_depth: self.max_depth
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn diagnose(&mut self, offset: usize, kind: DiagnosticKind) {
        log::warn!("skipping at offset {offset:#x}: {kind:?}");
        self.diagnostics.push(Diagnostic { offset, kind });
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_scoped_seek_restores_position() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut cursor = DexCursor::new(&data);
        assert_eq!(cursor.read_u8("test").unwrap(), 1);

        let (outer, inner) = cursor
            .with_offset(4, "outer", |c| {
                let outer = c.read_u8("outer")?;
                let inner = c.with_offset(6, "inner", |c| c.read_u8("inner"))?;
                assert_eq!(c.pos(), 5);
                Ok((outer, inner))
            })
            .unwrap();
        assert_eq!((outer, inner), (5, 7));
        assert_eq!(cursor.pos(), 1);
    }

    #[test]
    fn test_scoped_seek_restores_on_error() {
        let data = [0u8; 4];
        let mut cursor = DexCursor::new(&data);
        cursor.read_u16("test").unwrap();
        let err = cursor.with_offset(2, "tail", |c| c.read_u32("tail")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncation);
        assert_eq!(cursor.pos(), 2);
    }

    #[test]
    fn test_seek_out_of_bounds() {
        let data = [0u8; 4];
        let mut cursor = DexCursor::new(&data);
        let err = cursor.seek(5, "test").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn test_little_endian_reads() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut cursor = DexCursor::new(&data);
        assert_eq!(cursor.read_u16("u16").unwrap(), 0x1234);
        assert_eq!(cursor.read_u32("u32").unwrap(), 0x12345678);
    }

    #[test]
    fn test_align() {
        let data = [0u8; 8];
        let mut cursor = DexCursor::new(&data);
        cursor.read_u8("b").unwrap();
        cursor.align(4).unwrap();
        assert_eq!(cursor.pos(), 4);
        cursor.align(4).unwrap();
        assert_eq!(cursor.pos(), 4);
    }

    #[test]
    fn test_check_count_overflow() {
        let data = [0u8; 16];
        let cursor = DexCursor::new(&data);
        assert!(cursor.check_count(4, 4, "u32").is_ok());
        let err = cursor.check_count(5, 4, "u32").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedCount);
        let err = cursor.check_count(u32::MAX, usize::MAX, "huge").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedCount);
    }

    #[test]
    fn test_read_until_nul() {
        let data = b"ab\0cd";
        let mut cursor = DexCursor::new(data);
        assert_eq!(cursor.read_until_nul("string").unwrap(), b"ab\0");
        assert_eq!(cursor.pos(), 3);
        let err = cursor.read_until_nul("string").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncation);
    }

    #[test]
    fn test_leb128_errors_name_the_item() {
        let data = [0x05, 0xff];
        let mut cursor = DexCursor::new(&data);
        assert_eq!(cursor.read_uleb128p1("debug_info_item").unwrap(), 4);
        let err = cursor.read_uleb128("debug_info_item").unwrap_err();
        assert!(matches!(
            err,
            crate::error::DexError::TruncatedLeb128 {
                offset: 1,
                item_ty: "debug_info_item"
            }
        ));
    }

    #[test]
    fn test_depth_guard() {
        let data = [0u8; 1];
        let mut cursor = DexCursor::with_max_depth(&data, 2);
        cursor.enter().unwrap();
        cursor.enter().unwrap();
        let err = cursor.enter().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
        cursor.leave();
        assert!(cursor.enter().is_ok());
    }
}
