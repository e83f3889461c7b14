use adler32::RollingAdler32;
use serde::Serialize;

use crate::{dex_err, Result};

use super::{
    ClassDef, DexFile, FieldId, Header, MapItem, MethodId, ProtoId, StringId, TableItem, TypeId,
    DEX_ENDIAN_CONSTANT, DEX_MAGIC, DEX_MAGIC_VERSIONS,
};

/// Optional checks on top of the mandatory header constants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum VerifyPreset {
    #[default]
    None,
    All,
    ChecksumOnly,
}

impl<'a> DexFile<'a> {
    pub fn is_magic_valid(&self) -> bool {
        is_magic_valid(self.header())
    }

    pub fn is_version_valid(&self) -> bool {
        is_version_valid(self.header())
    }

    pub fn calculate_checksum(&self) -> u32 {
        calculate_checksum(self.header(), self.data())
    }

    /// Re-runs the header checks of `preset` against the decoded file.
    pub fn verify(&self, preset: VerifyPreset) -> Result<()> {
        check_header(self.header(), self.data(), preset)?;
        if preset == VerifyPreset::All {
            check_header_against_map(self.header(), self.map())?;
        }
        Ok(())
    }
}

#[inline]
fn is_magic_valid(header: &Header) -> bool {
    header.get_magic_prefix() == DEX_MAGIC
}

#[inline]
fn is_version_valid(header: &Header) -> bool {
    DEX_MAGIC_VERSIONS.contains(&header.get_version_raw())
}

/// Three ASCII digits followed by a NUL.
#[inline]
fn is_version_well_formed(header: &Header) -> bool {
    match header.get_version_raw() {
        [digits @ .., 0] => digits.len() == 3 && digits.iter().all(u8::is_ascii_digit),
        _ => false,
    }
}

fn version_error(header: &Header) -> crate::error::DexError {
    let mut version = [0u8; 4];
    version.copy_from_slice(header.get_version_raw());
    crate::error::DexError::UnknownDexVersion { version }
}

/// Adler-32 over everything after the checksum field, up to the declared file size.
fn calculate_checksum(header: &Header, data: &[u8]) -> u32 {
    let end = (header.file_size as usize).clamp(12, data.len().max(12));
    match data.get(12..end) {
        Some(rest) => RollingAdler32::from_buffer(rest).hash(),
        None => RollingAdler32::new().hash(),
    }
}

/// Magic, the shape of the version, header size and endian tag are always
/// checked. The remaining checks depend on `preset`.
pub fn check_header(header: &Header, data: &[u8], preset: VerifyPreset) -> Result<()> {
    if !is_magic_valid(header) {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(header.get_magic_prefix());
        return dex_err!(BadFileMagic, magic);
    }

    if !is_version_well_formed(header) {
        return Err(version_error(header));
    }

    // check header size
    if header.header_size != Header::SIZE {
        return dex_err!(BadHeaderSize {
            size: header.header_size,
            expected: Header::SIZE
        });
    }

    // check endian
    if header.endian_tag != DEX_ENDIAN_CONSTANT {
        return dex_err!(UnexpectedEndianess, header.endian_tag);
    }

    if matches!(preset, VerifyPreset::All | VerifyPreset::ChecksumOnly) {
        let checksum = calculate_checksum(header, data);
        if checksum != header.checksum {
            return dex_err!(BadChecksum {
                actual: checksum,
                expected: header.checksum
            });
        }
    }

    if preset != VerifyPreset::All {
        return Ok(());
    }

    if !is_version_valid(header) {
        return Err(version_error(header));
    }

    let file_size = header.file_size as usize;
    if file_size > data.len() {
        return dex_err!(FileSizeAtMost {
            actual: file_size,
            expected: data.len()
        });
    }

    check_valid_offset_and_size(data.len(), header.link_off, header.link_size as u64, "link")?;
    check_valid_offset_and_size(data.len(), header.map_off, 4, "map")?;
    check_table::<StringId>(data.len(), header.string_ids_size, header.string_ids_off)?;
    check_table::<TypeId>(data.len(), header.type_ids_size, header.type_ids_off)?;
    check_table::<ProtoId>(data.len(), header.proto_ids_size, header.proto_ids_off)?;
    check_table::<FieldId>(data.len(), header.field_ids_size, header.field_ids_off)?;
    check_table::<MethodId>(data.len(), header.method_ids_size, header.method_ids_off)?;
    check_table::<ClassDef>(data.len(), header.class_defs_size, header.class_defs_off)?;
    check_valid_offset_and_size(data.len(), header.data_off, header.data_size as u64, "data")?;
    Ok(())
}

fn check_table<T: TableItem>(file_size: usize, size: u32, off: u32) -> Result<()> {
    let len = size as u64 * std::mem::size_of::<T>() as u64;
    check_valid_offset_and_size(file_size, off, len, T::MAP_TYPE.name())
}

fn check_valid_offset_and_size(
    file_size: usize,
    offset: u32,
    size: u64,
    label: &'static str,
) -> Result<()> {
    if size == 0 {
        if offset != 0 {
            return dex_err!(BadOffsetNoSize {
                offset,
                section: label
            });
        }

        return Ok(());
    }

    if offset < Header::SIZE {
        return dex_err!(BadOffsetInHeader {
            offset,
            header_size: Header::SIZE as usize,
            section: label
        });
    }
    if offset as usize > file_size {
        return dex_err!(BadOffsetTooLarge {
            offset: offset as usize,
            size: file_size,
            section: label
        });
    }

    let end = offset as u64 + size;
    if end > file_size as u64 {
        return dex_err!(BadSection {
            end,
            size: file_size,
            section: label
        });
    }
    Ok(())
}

/// The header's index table declarations must agree with the map.
pub fn check_header_against_map(header: &Header, map: &[MapItem]) -> Result<()> {
    for (type_, header_size, header_off) in header.index_sections() {
        let entry = map.iter().find(|item| item.item_type() == Some(type_));
        let (map_size, map_off) = match entry {
            Some(item) => (item.size, item.off),
            None => (0, 0),
        };
        let consistent = match entry {
            Some(_) => map_size == header_size && (header_size == 0 || map_off == header_off),
            None => header_size == 0,
        };
        if !consistent {
            return dex_err!(HeaderMapMismatch {
                section: type_.name(),
                header_size,
                header_off,
                map_size,
                map_off
            });
        }
    }
    Ok(())
}
