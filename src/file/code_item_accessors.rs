use serde::Serialize;

use super::{DexCursor, DexItem, TypeIndex};
use crate::{dex_err, Result};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TryItem {
    /// start address of the covered block, in 16-bit code units
    pub start_addr: u32,
    pub insn_count: u16,
    /// byte offset from the start of the handler list to the matching handler
    pub handler_off: u16,
}

unsafe impl plain::Plain for TryItem {}

impl TryItem {
    /// Exclusive end of the covered block. Widened so that a block starting
    /// near `u32::MAX` cannot wrap.
    #[inline]
    pub fn end_addr(&self) -> u64 {
        self.start_addr as u64 + self.insn_count as u64
    }

    #[inline]
    pub fn covers(&self, dex_pc: u32) -> bool {
        dex_pc >= self.start_addr && (dex_pc as u64) < self.end_addr()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EncodedTypeAddrPair {
    pub type_idx: u32,
    pub addr: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncodedCatchHandler {
    /// Signed count as stored. Positive means typed pairs only, zero or
    /// negative means `-size` typed pairs followed by a catch-all address.
    pub size: i32,
    pub handlers: Vec<EncodedTypeAddrPair>,
    pub catch_all_addr: Option<u32>,
}

impl EncodedCatchHandler {
    #[inline]
    pub fn has_catch_all(&self) -> bool {
        self.size <= 0
    }

    pub fn iter(&self) -> EncodedCatchHandlerIterator<'_> {
        EncodedCatchHandlerIterator {
            handler: self,
            pos: 0,
        }
    }
}

impl DexItem for EncodedCatchHandler {
    const ITEM_TY: &'static str = "encoded_catch_handler";

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let size = cursor.read_sleb128(Self::ITEM_TY)?;
        let count = size.unsigned_abs();
        cursor.check_count(count, 2, "encoded_type_addr_pair")?;
        let handlers = (0..count)
            .map(|_| {
                Ok(EncodedTypeAddrPair {
                    type_idx: cursor.read_uleb128(Self::ITEM_TY)?,
                    addr: cursor.read_uleb128(Self::ITEM_TY)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let catch_all_addr = match size <= 0 {
            true => Some(cursor.read_uleb128(Self::ITEM_TY)?),
            false => None,
        };
        Ok(Self {
            size,
            handlers,
            catch_all_addr,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncodedCatchHandlerList {
    /// file offset of the list
    #[serde(skip)]
    pub offset: usize,
    /// (offset relative to the start of the list, handler)
    pub list: Vec<(u16, EncodedCatchHandler)>,
}

impl DexItem for EncodedCatchHandlerList {
    const ITEM_TY: &'static str = "encoded_catch_handler_list";

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let start = cursor.pos();
        let size = cursor.read_uleb128(Self::ITEM_TY)?;
        cursor.check_count(size, 2, Self::ITEM_TY)?;
        let mut list = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let rel = cursor.pos() - start;
            let handler = EncodedCatchHandler::read(cursor)?;
            // handler_off is 16 bits wide; anything further away is unreachable
            list.push((u16::try_from(rel).unwrap_or(u16::MAX), handler));
        }
        Ok(Self {
            offset: start,
            list,
        })
    }
}

impl EncodedCatchHandlerList {
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodedCatchHandler> {
        self.list.iter().map(|(_, handler)| handler)
    }

    /// Handler starting at `handler_off` bytes from the beginning of the list.
    pub fn handler_at(&self, handler_off: u16) -> Result<&EncodedCatchHandler> {
        match self.list.binary_search_by_key(&handler_off, |(off, _)| *off) {
            Ok(idx) => Ok(&self.list[idx].1),
            Err(_) => dex_err!(BadHandlerOffset {
                offset: self.offset,
                handler_off,
                item_ty: Self::ITEM_TY
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub tries_size: u16,
    pub debug_info_off: u32,
    /// number of 16-bit code units in `insns`
    pub insns_size: u32,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    pub handlers: EncodedCatchHandlerList,
}

impl DexItem for CodeItem {
    const ITEM_TY: &'static str = "code_item";
    const ALIGNMENT: usize = 4;

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let registers_size = cursor.read_u16(Self::ITEM_TY)?;
        let ins_size = cursor.read_u16(Self::ITEM_TY)?;
        let outs_size = cursor.read_u16(Self::ITEM_TY)?;
        let tries_size = cursor.read_u16(Self::ITEM_TY)?;
        let debug_info_off = cursor.read_u32(Self::ITEM_TY)?;
        let insns_size = cursor.read_u32(Self::ITEM_TY)?;

        cursor.check_count(insns_size, 2, "insns")?;
        let insns = cursor
            .read_bytes(insns_size as usize * 2, "insns")?
            .chunks_exact(2)
            .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
            .collect();

        let mut tries = Vec::new();
        let mut handlers = EncodedCatchHandlerList::default();
        if tries_size > 0 {
            if insns_size % 2 == 1 {
                let offset = cursor.pos();
                let padding = cursor.read_u16("code_item padding")?;
                if padding != 0 {
                    return dex_err!(BadCodePadding { offset, padding });
                }
            }
            tries = cursor.read_array(tries_size as u32, "try_item")?;
            handlers = EncodedCatchHandlerList::read(cursor)?;
        }

        Ok(Self {
            registers_size,
            ins_size,
            outs_size,
            tries_size,
            debug_info_off,
            insns_size,
            insns,
            tries,
            handlers,
        })
    }
}

impl CodeItem {
    #[inline]
    pub fn insns_size_in_bytes(&self) -> u32 {
        self.insns_size * 2
    }

    #[inline]
    pub fn has_code(&self) -> bool {
        !self.insns.is_empty()
    }

    /// Offset of the try table relative to the start of the code item, if any.
    pub fn get_tries_off(&self) -> Option<usize> {
        if self.tries_size == 0 {
            return None;
        }
        let padding = if self.insns_size % 2 == 1 { 2 } else { 0 };
        Some(16 + self.insns_size_in_bytes() as usize + padding)
    }

    #[inline]
    pub fn handler_at(&self, handler_off: u16) -> Result<&EncodedCatchHandler> {
        self.handlers.handler_at(handler_off)
    }

    /// Handler referenced by `try_item`.
    pub fn handler_for(&self, try_item: &TryItem) -> Result<&EncodedCatchHandler> {
        self.handler_at(try_item.handler_off)
    }

    /// Catch handlers covering `dex_pc`, catch-all last.
    pub fn catch_handlers_at(&self, dex_pc: u32) -> Result<Option<EncodedCatchHandlerIterator<'_>>> {
        match self.tries.iter().find(|item| item.covers(dex_pc)) {
            Some(try_item) => Ok(Some(self.handler_for(try_item)?.iter())),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatchHandlerData {
    pub type_idx: TypeIndex,
    pub address: u32,
    pub is_catch_all: bool,
}

/// Yields the typed handlers of an [EncodedCatchHandler] followed by its
/// catch-all entry.
pub struct EncodedCatchHandlerIterator<'a> {
    handler: &'a EncodedCatchHandler,
    pos: usize,
}

impl<'a> Iterator for EncodedCatchHandlerIterator<'a> {
    type Item = CatchHandlerData;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.pos;
        self.pos += 1;
        match self.handler.handlers.get(pos) {
            Some(pair) => Some(CatchHandlerData {
                type_idx: pair.type_idx as TypeIndex,
                address: pair.addr,
                is_catch_all: false,
            }),
            None if pos == self.handler.handlers.len() => {
                self.handler.catch_all_addr.map(|address| CatchHandlerData {
                    type_idx: TypeIndex::MAX,
                    address,
                    is_catch_all: true,
                })
            }
            None => None,
        }
    }
}
