use std::fmt::Debug;

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a [`DexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// A format constant was violated (magic, header size, endian tag, ...).
    FormatMismatch,
    /// The buffer ended while more bytes were required.
    Truncation,
    /// An offset or index points outside of the buffer or table.
    OutOfBounds,
    /// A declared count does not fit into the remaining buffer.
    MalformedCount,
    /// A configured decoding limit was hit.
    LimitExceeded,
    /// The container could not be opened.
    Io,
}

#[derive(Error)]
pub enum DexError {
    #[error("Failed to read {item_ty} at offset {offset}: {needed} byte(s) required but only {available} available")]
    TruncatedFile {
        offset: usize,
        needed: usize,
        available: usize,
        item_ty: &'static str,
    },

    #[error("Bad file magic: {0:02x?}")]
    BadFileMagic([u8; 4]),

    #[error("Unknown dex version: {version:02x?}")]
    UnknownDexVersion { version: [u8; 4] },

    #[error("Bad file size ({actual}, expected at most {expected})")]
    FileSizeAtMost { actual: usize, expected: usize },

    #[error("Bad header size: {size:#x}, expected {expected:#x}")]
    BadHeaderSize { size: u32, expected: u32 },

    #[error("Unexpected endian tag: {0:#x}")]
    UnexpectedEndianess(u32),

    #[error("Bad checksum: {actual:#08x}, expected {expected:#08x}")]
    BadChecksum { actual: u32, expected: u32 },

    #[error("Offset({offset}) should be within file size {size} for {section}")]
    BadOffsetTooLarge {
        offset: usize,
        size: usize,
        section: &'static str,
    },

    #[error("Offset({offset}) should be after header({header_size}) for {section}")]
    BadOffsetInHeader {
        offset: u32,
        header_size: usize,
        section: &'static str,
    },

    #[error("Offset({offset}) should be zero when size is zero for {section}")]
    BadOffsetNoSize { offset: u32, section: &'static str },

    #[error("Section end({end}) should be within file size {size} for {section}")]
    BadSection {
        end: u64,
        size: usize,
        section: &'static str,
    },

    #[error("Offset({offset}) of {section} is not {alignment}-byte aligned")]
    MisalignedSection {
        offset: usize,
        alignment: usize,
        section: &'static str,
    },

    /// `offset` is where the record would start in its table.
    #[error("Index({index}) to {item_ty} at offset {offset} should be less than {max}")]
    DexIndexError {
        offset: usize,
        index: u32,
        max: usize,
        item_ty: &'static str,
    },

    #[error("Bad {item_ty} at offset {offset} does not end with a null byte")]
    BadStringDataMissingNullByte { offset: usize, item_ty: &'static str },

    #[error("Truncated LEB128 value in {item_ty} at offset {offset}")]
    TruncatedLeb128 { offset: usize, item_ty: &'static str },

    #[error("Malformed LEB128 value in {item_ty} at offset {offset} (more than 5 groups or overflowing 32 bits)")]
    BadLeb128 { offset: usize, item_ty: &'static str },

    #[error("Failed to read {item_ty} at offset {offset}: count {count} needs at least {needed} byte(s) but only {available} remain")]
    DexLayoutError {
        offset: usize,
        item_ty: &'static str,
        count: u64,
        needed: u64,
        available: usize,
    },

    #[error("Encountered invalid encoded index that would overflow: index({index}) + next index({next_index}) > u32::MAX for {item_ty} in class data at offset {offset}")]
    BadEncodedIndex {
        offset: usize,
        index: u32,
        next_index: u32,
        item_ty: &'static str,
    },

    #[error("Invalid encoded value({value_type:#x}) at offset {offset} requested size({size}) which is too big for data type (size: {max})")]
    BadEncodedValueSize {
        offset: usize,
        value_type: u8,
        size: usize,
        max: usize,
    },

    #[error("Encoded value at offset {offset} is nested deeper than the allowed {max_depth} levels")]
    EncodedValueTooDeep { offset: usize, max_depth: usize },

    #[error("Code item at offset {offset} has non-zero padding {padding:#06x} before its try table")]
    BadCodePadding { offset: usize, padding: u16 },

    #[error("Handler offset({handler_off}) of try item does not start an encoded catch handler in the {item_ty} at offset {offset}")]
    BadHandlerOffset {
        offset: usize,
        handler_off: u16,
        item_ty: &'static str,
    },

    #[error("Duplicate map entry for {type_:?} at offset {offset}")]
    DuplicateMapEntry { type_: crate::file::MapItemType, offset: u32 },

    #[error("Map list entry points to {offset} but the map list lives at {expected}")]
    BadMapListReference { offset: u32, expected: u32 },

    #[error("Header declares {section} as (size={header_size}, off={header_off}) but the map says (size={map_size}, off={map_off})")]
    HeaderMapMismatch {
        section: &'static str,
        header_size: u32,
        header_off: u32,
        map_size: u32,
        map_off: u32,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl DexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DexError::TruncatedFile { .. }
            | DexError::BadStringDataMissingNullByte { .. }
            | DexError::TruncatedLeb128 { .. } => ErrorKind::Truncation,

            DexError::BadOffsetTooLarge { .. }
            | DexError::BadOffsetInHeader { .. }
            | DexError::BadSection { .. }
            | DexError::DexIndexError { .. }
            | DexError::FileSizeAtMost { .. }
            | DexError::BadHandlerOffset { .. } => ErrorKind::OutOfBounds,

            DexError::DexLayoutError { .. }
            | DexError::BadEncodedIndex { .. }
            | DexError::BadEncodedValueSize { .. } => ErrorKind::MalformedCount,

            DexError::EncodedValueTooDeep { .. } => ErrorKind::LimitExceeded,

            DexError::Io(_) => ErrorKind::Io,

            DexError::BadFileMagic(_)
            | DexError::UnknownDexVersion { .. }
            | DexError::BadHeaderSize { .. }
            | DexError::UnexpectedEndianess(_)
            | DexError::BadChecksum { .. }
            | DexError::BadOffsetNoSize { .. }
            | DexError::MisalignedSection { .. }
            | DexError::BadLeb128 { .. }
            | DexError::BadCodePadding { .. }
            | DexError::DuplicateMapEntry { .. }
            | DexError::BadMapListReference { .. }
            | DexError::HeaderMapMismatch { .. } => ErrorKind::FormatMismatch,
        }
    }
}

#[macro_export]
macro_rules! dex_err {
    ($name:ident) => {
        Err($crate::error::DexError::$name)
    };
    ($name:ident { $($arg:tt)* }) => {
        Err($crate::error::DexError::$name { $($arg)* })
    };
    ($name:ident, $($arg:tt)*) => {
        Err($crate::error::DexError::$name($($arg)*))
    };
}

impl Debug for DexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
