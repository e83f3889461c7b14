mod common;

use common::{SampleDex, MAP_LEN, STRINGS};
use dexdecode::error::{DexError, ErrorKind};
use dexdecode::file::{
    DecodeOptions, DexFile, DiagnosticKind, MapItemType, Section, Sections, VerifyPreset,
};

fn decode(data: &[u8]) -> DexFile<'_> {
    DexFile::from_bytes(data, &DecodeOptions::default()).unwrap()
}

/// Sections with the header checksum cleared. The checksum covers the map
/// bytes, so it necessarily changes when the entries are reordered.
fn sections_without_checksum(dex: &DexFile<'_>) -> Sections {
    let mut sections = dex.sections().clone();
    if let Some(Section::Header(header)) = sections.get_mut(&MapItemType::HeaderItem) {
        header.checksum = 0;
    }
    sections
}

#[test]
fn test_every_entry_resolved() {
    let data = SampleDex::new().build();
    let dex = decode(&data);
    assert_eq!(dex.map().len(), MAP_LEN);
    assert_eq!(dex.sections().len(), MAP_LEN);
    assert!(dex.diagnostics().is_empty());

    for item in dex.map() {
        let type_ = item.item_type().unwrap();
        let section = dex.section(type_).unwrap();
        match section {
            Section::MapList(entries) => assert_eq!(entries.len(), MAP_LEN),
            _ => assert_eq!(section.len(), item.size as usize, "{}", type_.name()),
        }
    }
    assert!(matches!(
        dex.section(MapItemType::HeaderItem),
        Some(Section::Header(_))
    ));
}

#[test]
fn test_map_order_does_not_matter() {
    let reference_data = SampleDex::new().build();
    let reference = decode(&reference_data);

    let orders: Vec<Vec<usize>> = vec![
        (0..MAP_LEN).rev().collect(),
        (0..MAP_LEN).map(|i| (i + 7) % MAP_LEN).collect(),
        (0..MAP_LEN).step_by(2).chain((1..MAP_LEN).step_by(2)).collect(),
    ];
    for order in orders {
        let data = SampleDex::new().map_order(order.clone()).build();
        let dex = decode(&data);
        let sections = sections_without_checksum(&dex);
        let expected = sections_without_checksum(&reference);
        assert_eq!(sections, expected, "order {order:?}");
        assert_eq!(
            serde_json::to_value(&sections).unwrap(),
            serde_json::to_value(&expected).unwrap()
        );
        assert_eq!(
            dex.section(MapItemType::MapList),
            reference.section(MapItemType::MapList)
        );
        assert_eq!(dex.map().len(), reference.map().len());
        assert_eq!(dex.map().first(), reference.map().get(order[0]));
    }
}

#[test]
fn test_unknown_map_type_is_skipped_with_diagnostic() {
    let data = SampleDex::new().extra_entry(0x7777, 3, 0x70).build();
    let dex = decode(&data);
    assert_eq!(dex.map().len(), MAP_LEN + 1);
    assert_eq!(dex.sections().len(), MAP_LEN);
    assert_eq!(dex.diagnostics().len(), 1);
    assert_eq!(dex.diagnostics()[0].offset, 0x70);
    assert_eq!(
        dex.diagnostics()[0].kind,
        DiagnosticKind::UnknownMapItemType {
            type_code: 0x7777,
            count: 3
        }
    );
    assert!(dex.map_table().to_string().contains("<unknown>"));
}

#[test]
fn test_duplicate_map_type_is_rejected() {
    let (_, layout) = SampleDex::new().build_with_layout();
    let data = SampleDex::new()
        .extra_entry(0x2005, 1, layout.static_values)
        .build();
    let err = DexFile::from_bytes(&data, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        DexError::DuplicateMapEntry {
            type_: MapItemType::EncodedArrayItem,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::FormatMismatch);
}

#[test]
fn test_entry_out_of_bounds() {
    let data = SampleDex::new().extra_entry(0x2003, 1, 0x10_0000).omit(0x2003).build();
    let err = DexFile::from_bytes(&data, &DecodeOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);
}

#[test]
fn test_index_table_missing_from_map() {
    let reference_data = SampleDex::new().build();
    let reference = decode(&reference_data);

    let data = SampleDex::new().omit(0x0001).build();
    let dex = decode(&data);
    assert_eq!(dex.map().len(), MAP_LEN - 1);
    assert_eq!(dex.num_string_ids() as usize, STRINGS.len());
    assert_eq!(
        dex.section(MapItemType::StringIdItem),
        reference.section(MapItemType::StringIdItem)
    );
    assert_eq!(dex.get_string_escaped(2).unwrap(), "LFoo;");

    // the header still declares the table, which the map no longer lists
    let err = DexFile::from_bytes(&data, &DecodeOptions::new().verify(VerifyPreset::All))
        .unwrap_err();
    assert!(matches!(err, DexError::HeaderMapMismatch { .. }));
}

#[test]
fn test_string_ids_point_into_string_data() {
    let (data, layout) = SampleDex::new().build_with_layout();
    let dex = decode(&data);
    let offsets: Vec<u32> = dex
        .string_ids()
        .iter()
        .map(|id| id.offset() as u32)
        .collect();
    assert_eq!(offsets, layout.string_data);

    for (idx, expected) in STRINGS.iter().enumerate() {
        let string = dex.get_string_data(idx as u32).unwrap();
        assert_eq!(string.bytes(), expected.as_bytes());
        assert_eq!(string.utf16_size as usize, expected.len());
    }
}

#[test]
fn test_map_table() {
    let data = SampleDex::new().build();
    let dex = decode(&data);
    let table = dex.map_table();
    assert_eq!(table.row_count(), MAP_LEN);
    let rendered = table.to_string();
    assert!(rendered.contains("code_item"));
    assert!(rendered.contains("string_data_item"));
}

#[test]
fn test_class_defs_missing_from_map() {
    let data = SampleDex::new().omit(0x0006).build();
    let dex = decode(&data);
    assert!(dex.map().iter().all(|item| item.type_ != 0x0006));
    assert_eq!(dex.num_class_defs(), 1);
    assert!(matches!(
        dex.section(MapItemType::ClassDefItem),
        Some(Section::ClassDefs(defs)) if defs.len() == 1
    ));
    let class_def = dex.get_class_def(0).unwrap();
    assert_eq!(dex.get_class_desc(class_def).unwrap(), "LFoo;");
}
