use serde::Serialize;

use super::{DexCursor, DexItem, StringIndex};
use crate::Result;

#[rustfmt::skip]
pub mod code {
    pub const DBG_END_SEQUENCE: u8         = 0x00;
    pub const DBG_ADVANCE_PC: u8           = 0x01;
    pub const DBG_ADVANCE_LINE: u8         = 0x02;
    pub const DBG_START_LOCAL: u8          = 0x03;
    pub const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
    pub const DBG_END_LOCAL: u8            = 0x05;
    pub const DBG_RESTART_LOCAL: u8        = 0x06;
    pub const DBG_SET_PROLOGUE_END: u8     = 0x07;
    pub const DBG_SET_EPILOGUE_BEGIN: u8   = 0x08;
    pub const DBG_SET_FILE: u8             = 0x09;

    pub const DBG_FIRST_SPECIAL: u8        = 0x0a;
    pub const DBG_LINE_BASE: i32           = -4;
    pub const DBG_LINE_RANGE: u8           = 15;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceFile {
    This,
    Other(StringIndex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionInfo {
    pub address: u32,
    pub line: i64,
    pub file: SourceFile,
    pub prologue_end: bool,
    pub epilogue_begin: bool,
}

impl PositionInfo {
    fn new(line: u32) -> Self {
        Self {
            address: 0,
            line: line as i64,
            file: SourceFile::This,
            prologue_end: false,
            epilogue_begin: false,
        }
    }
}

/// `debug_info_item`. The state machine bytecode is kept raw, including the
/// terminating `DBG_END_SEQUENCE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DebugInfo {
    pub line_start: u32,
    /// string index per parameter, `None` when the name is absent
    pub parameter_names: Vec<Option<StringIndex>>,
    pub bytecode: Vec<u8>,
}

impl DexItem for DebugInfo {
    const ITEM_TY: &'static str = "debug_info_item";

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let line_start = cursor.read_uleb128(Self::ITEM_TY)?;
        let parameters_size = cursor.read_uleb128(Self::ITEM_TY)?;
        cursor.check_count(parameters_size, 1, "parameter_names")?;
        let parameter_names = (0..parameters_size)
            .map(|_| Ok(index_or_none(cursor.read_uleb128p1(Self::ITEM_TY)?)))
            .collect::<Result<Vec<_>>>()?;

        let start = cursor.pos();
        walk_bytecode(cursor, |_| {})?;
        let bytecode = cursor.data()[start..cursor.pos()].to_vec();

        Ok(Self {
            line_start,
            parameter_names,
            bytecode,
        })
    }
}

#[inline]
fn index_or_none(value: i64) -> Option<StringIndex> {
    u32::try_from(value).ok()
}

enum DebugEvent {
    AdvancePc(u32),
    AdvanceLine(i32),
    PrologueEnd,
    EpilogueBegin,
    SetFile(Option<StringIndex>),
    Special(u8),
    Other,
}

/// Consumes one debug opcode sequence up to and including `DBG_END_SEQUENCE`.
fn walk_bytecode<F>(cursor: &mut DexCursor<'_>, mut visitor: F) -> Result<()>
where
    F: FnMut(DebugEvent),
{
    const ITEM_TY: &str = DebugInfo::ITEM_TY;
    loop {
        let opcode = cursor.read_u8(ITEM_TY)?;
        let event = match opcode {
            code::DBG_END_SEQUENCE => return Ok(()),
            code::DBG_ADVANCE_PC => DebugEvent::AdvancePc(cursor.read_uleb128(ITEM_TY)?),
            code::DBG_ADVANCE_LINE => DebugEvent::AdvanceLine(cursor.read_sleb128(ITEM_TY)?),
            code::DBG_START_LOCAL => {
                cursor.read_uleb128(ITEM_TY)?; // register
                cursor.read_uleb128p1(ITEM_TY)?; // name
                cursor.read_uleb128p1(ITEM_TY)?; // type
                DebugEvent::Other
            }
            code::DBG_START_LOCAL_EXTENDED => {
                cursor.read_uleb128(ITEM_TY)?; // register
                cursor.read_uleb128p1(ITEM_TY)?; // name
                cursor.read_uleb128p1(ITEM_TY)?; // type
                cursor.read_uleb128p1(ITEM_TY)?; // signature
                DebugEvent::Other
            }
            code::DBG_END_LOCAL | code::DBG_RESTART_LOCAL => {
                cursor.read_uleb128(ITEM_TY)?; // register
                DebugEvent::Other
            }
            code::DBG_SET_PROLOGUE_END => DebugEvent::PrologueEnd,
            code::DBG_SET_EPILOGUE_BEGIN => DebugEvent::EpilogueBegin,
            code::DBG_SET_FILE => DebugEvent::SetFile(index_or_none(cursor.read_uleb128p1(ITEM_TY)?)),
            special => DebugEvent::Special(special),
        };
        visitor(event);
    }
}

impl DebugInfo {
    /// Replays the line number program and returns one entry per emitted
    /// position row.
    pub fn positions(&self) -> Result<Vec<PositionInfo>> {
        let mut cursor = DexCursor::new(&self.bytecode);
        let mut entry = PositionInfo::new(self.line_start);
        let mut positions = Vec::new();

        walk_bytecode(&mut cursor, |event| match event {
            DebugEvent::AdvancePc(delta) => entry.address = entry.address.wrapping_add(delta),
            DebugEvent::AdvanceLine(delta) => entry.line += delta as i64,
            DebugEvent::PrologueEnd => entry.prologue_end = true,
            DebugEvent::EpilogueBegin => entry.epilogue_begin = true,
            DebugEvent::SetFile(file) => {
                entry.file = match file {
                    Some(idx) => SourceFile::Other(idx),
                    None => SourceFile::This,
                }
            }
            DebugEvent::Special(opcode) => {
                let adjusted = opcode - code::DBG_FIRST_SPECIAL;
                entry.address = entry
                    .address
                    .wrapping_add((adjusted / code::DBG_LINE_RANGE) as u32);
                entry.line += (code::DBG_LINE_BASE + (adjusted % code::DBG_LINE_RANGE) as i32) as i64;
                positions.push(entry);
                entry.prologue_end = false;
                entry.epilogue_begin = false;
            }
            DebugEvent::Other => {}
        })?;
        Ok(positions)
    }
}
