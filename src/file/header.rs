use serde::Serialize;

use super::{DexCursor, MapItemType};
use crate::Result;

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Header {
    /// magic value: `dex\n`, three version digits and a trailing NUL
    magic: [u8; 8],

    /// Taken from Android docs:
    ///
    /// Adler32 checksum of the rest of the file (everything but `magic` and this
    /// field); used to detect file corruption.
    pub checksum: u32,

    /// Android docs:
    ///
    /// SHA-1 signature (hash) of the rest of the file (everything but `magic`,
    /// `checksum`, and this field); used to uniquely identify files.
    signature: [u8; 20],

    /// Size of the entire file including the header.
    pub file_size: u32,

    /// Size of the header (this struct), in bytes. It is always 0x70.
    pub header_size: u32,

    /// Endian contant, always `0x12345678`. Byte-swapped files are not supported.
    pub endian_tag: u32,

    // unused {
    /// size of the link section, or 0 if this file isn't statically linked
    pub link_size: u32,

    /// offset from the start of the file to the link section, or `0` if
    /// `link_size == 0`.
    pub link_off: u32,
    // } unused
    /// offset from the start of the file to the map item. The offset, which
    /// must be non-zero, should be to an offset into the `data` section.
    pub map_off: u32,

    /// count of strings in the string identifiers list
    pub string_ids_size: u32,

    /// offset from the start of the file to the string identifiers list, or
    /// `0` if `string_ids_size == 0`.
    pub string_ids_off: u32,

    /// count of elements in the type identifiers list, at most `65535`
    pub type_ids_size: u32,

    /// offset from the start of the file to the type identifiers list, or
    /// `0` if `type_ids_size == 0`.
    pub type_ids_off: u32,

    /// count of elements in the proto identifiers list, at most `65535`
    pub proto_ids_size: u32,

    /// offset from the start of the file to the proto identifiers list, or
    /// `0` if `proto_ids_size == 0`.
    pub proto_ids_off: u32,

    /// count of elements in the field identifiers list
    pub field_ids_size: u32,

    /// offset from the start of the file to the field identifiers list, or
    /// `0` if `field_ids_size == 0`.
    pub field_ids_off: u32,

    /// count of elements in the method identifiers list
    pub method_ids_size: u32,

    /// offset from the start of the file to the method identifiers list, or
    /// `0` if `method_ids_size == 0`.
    pub method_ids_off: u32,

    /// count of elements in the class definitions list
    pub class_defs_size: u32,

    /// offset from the start of the file to the class definitions list, or
    /// `0` if `class_defs_size == 0`.
    pub class_defs_off: u32,

    /// size of the data section (in bytes)
    pub data_size: u32,

    /// offset from the start of the file to the data section
    pub data_off: u32,
}

unsafe impl plain::Plain for Header {}

impl Header {
    pub const SIZE: u32 = std::mem::size_of::<Header>() as u32;

    pub fn read(cursor: &mut DexCursor<'_>) -> Result<Header> {
        cursor.read_plain("header_item")
    }

    pub fn get_magic(&self) -> &[u8; 8] {
        &self.magic
    }

    /// `dex\n` part of the magic
    pub fn get_magic_prefix(&self) -> &[u8] {
        &self.magic[..4]
    }

    /// Raw version part of the magic, e.g. `b"035\0"`.
    pub fn get_version_raw(&self) -> &[u8] {
        &self.magic[4..]
    }

    pub fn get_signature(&self) -> &[u8; 20] {
        &self.signature
    }

    pub fn get_version(&self) -> u32 {
        let version_raw = &self.magic[4..7];
        String::from_utf8_lossy(version_raw)
            .parse()
            .unwrap_or_default() // will lead to invalid dex file
    }

    /// (type, size, offset) of the six index tables as declared in the header.
    pub fn index_sections(&self) -> [(MapItemType, u32, u32); 6] {
        [
            (MapItemType::StringIdItem, self.string_ids_size, self.string_ids_off),
            (MapItemType::TypeIdItem, self.type_ids_size, self.type_ids_off),
            (MapItemType::ProtoIdItem, self.proto_ids_size, self.proto_ids_off),
            (MapItemType::FieldIdItem, self.field_ids_size, self.field_ids_off),
            (MapItemType::MethodIdItem, self.method_ids_size, self.method_ids_off),
            (MapItemType::ClassDefItem, self.class_defs_size, self.class_defs_off),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        assert_eq!(Header::SIZE, 0x70);
    }

    #[test]
    fn test_read_header_fields() {
        let mut data = vec![0u8; 0x70];
        data[..8].copy_from_slice(b"dex\n035\0");
        data[8..12].copy_from_slice(&0xdeadbeefu32.to_le_bytes());
        data[36..40].copy_from_slice(&0x70u32.to_le_bytes());
        data[40..44].copy_from_slice(&0x12345678u32.to_le_bytes());
        data[52..56].copy_from_slice(&0x1234u32.to_le_bytes());

        let mut cursor = DexCursor::new(&data);
        let header = Header::read(&mut cursor).unwrap();
        assert_eq!(cursor.pos(), 0x70);
        assert_eq!(header.get_magic_prefix(), b"dex\n");
        assert_eq!(header.get_version(), 35);
        assert_eq!(header.checksum, 0xdeadbeef);
        assert_eq!(header.header_size, 0x70);
        assert_eq!(header.endian_tag, 0x12345678);
        assert_eq!(header.map_off, 0x1234);
    }
}
