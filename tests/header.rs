mod common;

use common::{fix_checksum, set_u32, SampleDex, STRINGS};
use dexdecode::error::{DexError, ErrorKind};
use dexdecode::file::{DecodeOptions, DexFile, VerifyPreset};

fn decode(data: &[u8], verify: VerifyPreset) -> dexdecode::Result<DexFile<'_>> {
    DexFile::from_bytes(data, &DecodeOptions::new().verify(verify))
}

#[test]
fn test_sample_passes_all_checks() {
    let data = SampleDex::new().build();
    let dex = decode(&data, VerifyPreset::All).unwrap();
    assert!(dex.is_magic_valid());
    assert!(dex.is_version_valid());
    assert_eq!(dex.header().get_version(), 35);
    assert_eq!(dex.calculate_checksum(), dex.header().checksum);
    assert_eq!(dex.header().file_size as usize, data.len());
    assert!(dex.verify(VerifyPreset::All).is_ok());
}

#[test]
fn test_bad_header_size_is_format_mismatch() {
    let mut data = SampleDex::new().build();
    set_u32(&mut data, 36, 0x78);
    fix_checksum(&mut data);
    for preset in [VerifyPreset::None, VerifyPreset::All] {
        let err = decode(&data, preset).unwrap_err();
        assert!(matches!(err, DexError::BadHeaderSize { size: 0x78, .. }));
        assert_eq!(err.kind(), ErrorKind::FormatMismatch);
    }
}

#[test]
fn test_swapped_endian_tag_is_format_mismatch() {
    let mut data = SampleDex::new().build();
    set_u32(&mut data, 40, 0x78563412);
    let err = decode(&data, VerifyPreset::None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatMismatch);
}

#[test]
fn test_unknown_magic_is_format_mismatch() {
    let mut data = SampleDex::new().build();
    data[..4].copy_from_slice(b"cdex");
    let err = decode(&data, VerifyPreset::None).unwrap_err();
    assert!(matches!(err, DexError::BadFileMagic(_)));
    assert_eq!(err.kind(), ErrorKind::FormatMismatch);
}

#[test]
fn test_truncated_header() {
    let data = SampleDex::new().build();
    let err = decode(&data[..0x40], VerifyPreset::None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Truncation);
}

#[test]
fn test_checksum_only_on_request() {
    let mut data = SampleDex::new().build();
    let last = data.len() - 1;
    data[last] ^= 0xff;

    // the last byte belongs to the map list
    let err = decode(&data, VerifyPreset::ChecksumOnly).unwrap_err();
    assert!(matches!(err, DexError::BadChecksum { .. }));
}

#[test]
fn test_map_offset_out_of_bounds() {
    let mut data = SampleDex::new().build();
    set_u32(&mut data, 52, 0x00ff_0000);
    fix_checksum(&mut data);
    let err = decode(&data, VerifyPreset::None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);
}

#[test]
fn test_map_offset_inside_header() {
    let mut data = SampleDex::new().build();
    set_u32(&mut data, 52, 0x20);
    let err = decode(&data, VerifyPreset::None).unwrap_err();
    assert!(matches!(err, DexError::BadOffsetInHeader { offset: 0x20, .. }));
}

#[test]
fn test_file_size_larger_than_buffer() {
    let mut data = SampleDex::new().build();
    let size = data.len() as u32;
    set_u32(&mut data, 32, size + 0x100);
    fix_checksum(&mut data);

    // only checked with the full preset
    assert!(decode(&data, VerifyPreset::None).is_ok());
    let err = decode(&data, VerifyPreset::All).unwrap_err();
    assert!(matches!(err, DexError::FileSizeAtMost { .. }));
}

#[test]
fn test_header_disagrees_with_map() {
    let mut data = SampleDex::new().build();
    set_u32(&mut data, 56, STRINGS.len() as u32 - 1);
    fix_checksum(&mut data);

    assert!(decode(&data, VerifyPreset::None).is_ok());
    let err = decode(&data, VerifyPreset::All).unwrap_err();
    assert!(matches!(
        err,
        DexError::HeaderMapMismatch {
            section: "string_id_item",
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::FormatMismatch);
}

#[test]
fn test_newer_version_decodes() {
    let mut data = SampleDex::new().build();
    data[4..8].copy_from_slice(b"042\0");

    let dex = decode(&data, VerifyPreset::None).unwrap();
    assert_eq!(dex.header().get_version(), 42);
    assert!(!dex.is_version_valid());
    assert_eq!(dex.get_string_escaped(2).unwrap(), "LFoo;");

    let err = decode(&data, VerifyPreset::All).unwrap_err();
    assert!(matches!(err, DexError::UnknownDexVersion { .. }));
    assert_eq!(err.kind(), ErrorKind::FormatMismatch);
}

#[test]
fn test_malformed_version_is_always_rejected() {
    let mut data = SampleDex::new().build();
    data[4..8].copy_from_slice(b"03x\0");
    let err = decode(&data, VerifyPreset::None).unwrap_err();
    assert!(matches!(err, DexError::UnknownDexVersion { .. }));
}
