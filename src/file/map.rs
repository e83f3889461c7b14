use std::collections::BTreeMap;

use serde::Serialize;

use super::{
    AnnotationItem, AnnotationSetItem, AnnotationSetRefList, AnnotationsDirectory, CallSiteIdItem,
    ClassData, ClassDef, CodeItem, DebugInfo, DexCursor, DexItem, DiagnosticKind,
    EncodedArrayItem, FieldId, Header, HiddenapiClassData, MethodHandleItem, MethodId, ProtoId,
    StringData, StringId, TypeId, TypeList,
};
use crate::{dex_err, Result};

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MapItemType {
    HeaderItem = 0x0000,
    StringIdItem = 0x0001,
    TypeIdItem = 0x0002,
    ProtoIdItem = 0x0003,
    FieldIdItem = 0x0004,
    MethodIdItem = 0x0005,
    ClassDefItem = 0x0006,
    CallSiteIdItem = 0x0007,
    MethodHandleItem = 0x0008,
    MapList = 0x1000,
    TypeList = 0x1001,
    AnnotationSetRefList = 0x1002,
    AnnotationSetItem = 0x1003,
    ClassDataItem = 0x2000,
    CodeItem = 0x2001,
    StringDataItem = 0x2002,
    DebugInfoItem = 0x2003,
    AnnotationItem = 0x2004,
    EncodedArrayItem = 0x2005,
    AnnotationsDirectoryItem = 0x2006,
    HiddenapiClassData = 0xF000,
}

impl MapItemType {
    pub fn from_u16(code: u16) -> Option<Self> {
        Some(match code {
            0x0000 => Self::HeaderItem,
            0x0001 => Self::StringIdItem,
            0x0002 => Self::TypeIdItem,
            0x0003 => Self::ProtoIdItem,
            0x0004 => Self::FieldIdItem,
            0x0005 => Self::MethodIdItem,
            0x0006 => Self::ClassDefItem,
            0x0007 => Self::CallSiteIdItem,
            0x0008 => Self::MethodHandleItem,
            0x1000 => Self::MapList,
            0x1001 => Self::TypeList,
            0x1002 => Self::AnnotationSetRefList,
            0x1003 => Self::AnnotationSetItem,
            0x2000 => Self::ClassDataItem,
            0x2001 => Self::CodeItem,
            0x2002 => Self::StringDataItem,
            0x2003 => Self::DebugInfoItem,
            0x2004 => Self::AnnotationItem,
            0x2005 => Self::EncodedArrayItem,
            0x2006 => Self::AnnotationsDirectoryItem,
            0xF000 => Self::HiddenapiClassData,
            _ => return None,
        })
    }

    #[rustfmt::skip]
    pub fn name(&self) -> &'static str {
        match self {
            Self::HeaderItem               => "header_item",
            Self::StringIdItem             => "string_id_item",
            Self::TypeIdItem               => "type_id_item",
            Self::ProtoIdItem              => "proto_id_item",
            Self::FieldIdItem              => "field_id_item",
            Self::MethodIdItem             => "method_id_item",
            Self::ClassDefItem             => "class_def_item",
            Self::CallSiteIdItem           => "call_site_id_item",
            Self::MethodHandleItem         => "method_handle_item",
            Self::MapList                  => "map_list",
            Self::TypeList                 => "type_list",
            Self::AnnotationSetRefList     => "annotation_set_ref_list",
            Self::AnnotationSetItem        => "annotation_set_item",
            Self::ClassDataItem            => "class_data_item",
            Self::CodeItem                 => "code_item",
            Self::StringDataItem           => "string_data_item",
            Self::DebugInfoItem            => "debug_info_item",
            Self::AnnotationItem           => "annotation_item",
            Self::EncodedArrayItem         => "encoded_array_item",
            Self::AnnotationsDirectoryItem => "annotations_directory_item",
            Self::HiddenapiClassData       => "hiddenapi_class_data_item",
        }
    }

    /// Required alignment of every item of this kind.
    pub fn alignment(&self) -> usize {
        match self {
            Self::ClassDataItem
            | Self::StringDataItem
            | Self::DebugInfoItem
            | Self::AnnotationItem
            | Self::EncodedArrayItem => 1,
            Self::HeaderItem
            | Self::StringIdItem
            | Self::TypeIdItem
            | Self::ProtoIdItem
            | Self::FieldIdItem
            | Self::MethodIdItem
            | Self::ClassDefItem
            | Self::CallSiteIdItem
            | Self::MethodHandleItem
            | Self::MapList
            | Self::TypeList
            | Self::AnnotationSetRefList
            | Self::AnnotationSetItem
            | Self::CodeItem
            | Self::AnnotationsDirectoryItem
            | Self::HiddenapiClassData => 4,
        }
    }
}

impl TryFrom<u16> for MapItemType {
    type Error = u16;

    fn try_from(code: u16) -> std::result::Result<Self, u16> {
        Self::from_u16(code).ok_or(code)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapItem {
    /// raw type code, unknown codes are kept as they are
    pub type_: u16,
    #[serde(skip)]
    unused_: u16,
    /// number of items to be found at `off`
    pub size: u32,
    pub off: u32,
}

unsafe impl plain::Plain for MapItem {}

impl MapItem {
    pub fn new(type_: MapItemType, size: u32, off: u32) -> Self {
        Self {
            type_: type_ as u16,
            unused_: 0,
            size,
            off,
        }
    }

    #[inline]
    pub fn item_type(&self) -> Option<MapItemType> {
        MapItemType::from_u16(self.type_)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MapList {
    pub list: Vec<MapItem>,
}

impl DexItem for MapList {
    const ITEM_TY: &'static str = "map_list";
    const ALIGNMENT: usize = 4;

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let size = cursor.read_u32(Self::ITEM_TY)?;
        Ok(Self {
            list: cursor.read_array(size, "map_item")?,
        })
    }
}

/// Data items of one section, keyed by their absolute file offset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Items<T> {
    items: Vec<(u32, T)>,
}

impl<T> Default for Items<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Items<T> {
    /// Item starting exactly at `offset`.
    pub fn get(&self, offset: u32) -> Option<&T> {
        self.items
            .binary_search_by_key(&offset, |(off, _)| *off)
            .ok()
            .map(|idx| &self.items[idx].1)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.items.iter().map(|(off, item)| (*off, item))
    }
}

/// Decoded content of one map entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Section {
    Header(Header),
    StringIds(Vec<StringId>),
    TypeIds(Vec<TypeId>),
    ProtoIds(Vec<ProtoId>),
    FieldIds(Vec<FieldId>),
    MethodIds(Vec<MethodId>),
    ClassDefs(Vec<ClassDef>),
    CallSiteIds(Vec<CallSiteIdItem>),
    MethodHandles(Vec<MethodHandleItem>),
    MapList(Vec<MapItem>),
    TypeLists(Items<TypeList>),
    AnnotationSetRefLists(Items<AnnotationSetRefList>),
    AnnotationSets(Items<AnnotationSetItem>),
    ClassData(Items<ClassData>),
    CodeItems(Items<CodeItem>),
    StringData(Items<StringData>),
    DebugInfo(Items<DebugInfo>),
    Annotations(Items<AnnotationItem>),
    EncodedArrays(Items<EncodedArrayItem>),
    AnnotationsDirectories(Items<AnnotationsDirectory>),
    HiddenapiClassData(Items<HiddenapiClassData>),
}

impl Section {
    /// Number of records in this section.
    pub fn len(&self) -> usize {
        match self {
            Section::Header(_) => 1,
            Section::StringIds(v) => v.len(),
            Section::TypeIds(v) => v.len(),
            Section::ProtoIds(v) => v.len(),
            Section::FieldIds(v) => v.len(),
            Section::MethodIds(v) => v.len(),
            Section::ClassDefs(v) => v.len(),
            Section::CallSiteIds(v) => v.len(),
            Section::MethodHandles(v) => v.len(),
            Section::MapList(v) => v.len(),
            Section::TypeLists(v) => v.len(),
            Section::AnnotationSetRefLists(v) => v.len(),
            Section::AnnotationSets(v) => v.len(),
            Section::ClassData(v) => v.len(),
            Section::CodeItems(v) => v.len(),
            Section::StringData(v) => v.len(),
            Section::DebugInfo(v) => v.len(),
            Section::Annotations(v) => v.len(),
            Section::EncodedArrays(v) => v.len(),
            Section::AnnotationsDirectories(v) => v.len(),
            Section::HiddenapiClassData(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-size index records stored as one contiguous table.
pub trait TableItem: DexItem + plain::Plain + Default + Clone {
    const MAP_TYPE: MapItemType;

    fn table(section: &Section) -> Option<&[Self]>;

    fn into_section(table: Vec<Self>) -> Section;
}

/// Variable-size records stored in the data area.
pub trait DataItem: DexItem + Clone {
    const MAP_TYPE: MapItemType;

    fn items(section: &Section) -> Option<&Items<Self>>;

    fn into_section(items: Items<Self>) -> Section;
}

macro_rules! table_item {
    ($ty:ty, $map_type:ident, $variant:ident) => {
        impl TableItem for $ty {
            const MAP_TYPE: MapItemType = MapItemType::$map_type;

            fn table(section: &Section) -> Option<&[Self]> {
                match section {
                    Section::$variant(table) => Some(table.as_slice()),
                    _ => None,
                }
            }

            fn into_section(table: Vec<Self>) -> Section {
                Section::$variant(table)
            }
        }
    };
}

macro_rules! data_item {
    ($ty:ty, $map_type:ident, $variant:ident) => {
        impl DataItem for $ty {
            const MAP_TYPE: MapItemType = MapItemType::$map_type;

            fn items(section: &Section) -> Option<&Items<Self>> {
                match section {
                    Section::$variant(items) => Some(items),
                    _ => None,
                }
            }

            fn into_section(items: Items<Self>) -> Section {
                Section::$variant(items)
            }
        }
    };
}

table_item!(StringId, StringIdItem, StringIds);
table_item!(TypeId, TypeIdItem, TypeIds);
table_item!(ProtoId, ProtoIdItem, ProtoIds);
table_item!(FieldId, FieldIdItem, FieldIds);
table_item!(MethodId, MethodIdItem, MethodIds);
table_item!(ClassDef, ClassDefItem, ClassDefs);
table_item!(CallSiteIdItem, CallSiteIdItem, CallSiteIds);
table_item!(MethodHandleItem, MethodHandleItem, MethodHandles);

data_item!(TypeList, TypeList, TypeLists);
data_item!(AnnotationSetRefList, AnnotationSetRefList, AnnotationSetRefLists);
data_item!(AnnotationSetItem, AnnotationSetItem, AnnotationSets);
data_item!(ClassData, ClassDataItem, ClassData);
data_item!(CodeItem, CodeItem, CodeItems);
data_item!(StringData, StringDataItem, StringData);
data_item!(DebugInfo, DebugInfoItem, DebugInfo);
data_item!(AnnotationItem, AnnotationItem, Annotations);
data_item!(EncodedArrayItem, EncodedArrayItem, EncodedArrays);
data_item!(AnnotationsDirectory, AnnotationsDirectoryItem, AnnotationsDirectories);
data_item!(HiddenapiClassData, HiddenapiClassData, HiddenapiClassData);

pub type Sections = BTreeMap<MapItemType, Section>;

pub(crate) fn check_alignment(
    cursor: &DexCursor<'_>,
    alignment: usize,
    section: &'static str,
) -> Result<()> {
    if !cursor.is_aligned(alignment) {
        return dex_err!(MisalignedSection {
            offset: cursor.pos(),
            alignment,
            section
        });
    }
    Ok(())
}

pub(crate) fn read_table<T: TableItem>(cursor: &mut DexCursor<'_>, count: u32) -> Result<Vec<T>> {
    check_alignment(cursor, T::ALIGNMENT, T::ITEM_TY)?;
    cursor.read_array(count, T::ITEM_TY)
}

/// Reads `count` consecutive items, re-aligning between them.
pub(crate) fn read_items<T: DexItem>(cursor: &mut DexCursor<'_>, count: u32) -> Result<Items<T>> {
    cursor.check_count(count, 1, T::ITEM_TY)?;
    let mut items = Vec::with_capacity(count as usize);
    for i in 0..count {
        if i > 0 {
            cursor.align(T::ALIGNMENT)?;
        }
        check_alignment(cursor, T::ALIGNMENT, T::ITEM_TY)?;
        let offset = cursor.pos() as u32;
        items.push((offset, T::read(cursor)?));
    }
    Ok(Items { items })
}

fn read_data<T: DataItem>(cursor: &mut DexCursor<'_>, count: u32) -> Result<Section> {
    Ok(T::into_section(read_items(cursor, count)?))
}

fn read_index<T: TableItem>(cursor: &mut DexCursor<'_>, count: u32) -> Result<Section> {
    Ok(T::into_section(read_table(cursor, count)?))
}

fn decode_section(
    cursor: &mut DexCursor<'_>,
    type_: MapItemType,
    entry: &MapItem,
    map_off: u32,
) -> Result<Section> {
    check_alignment(cursor, type_.alignment(), type_.name())?;
    match type_ {
        MapItemType::HeaderItem => Ok(Section::Header(Header::read(cursor)?)),
        MapItemType::StringIdItem => read_index::<StringId>(cursor, entry.size),
        MapItemType::TypeIdItem => read_index::<TypeId>(cursor, entry.size),
        MapItemType::ProtoIdItem => read_index::<ProtoId>(cursor, entry.size),
        MapItemType::FieldIdItem => read_index::<FieldId>(cursor, entry.size),
        MapItemType::MethodIdItem => read_index::<MethodId>(cursor, entry.size),
        MapItemType::ClassDefItem => read_index::<ClassDef>(cursor, entry.size),
        MapItemType::CallSiteIdItem => read_index::<CallSiteIdItem>(cursor, entry.size),
        MapItemType::MethodHandleItem => read_index::<MethodHandleItem>(cursor, entry.size),
        MapItemType::MapList => {
            // the map may only describe itself
            if entry.off != map_off {
                return dex_err!(BadMapListReference {
                    offset: entry.off,
                    expected: map_off
                });
            }
            // file order lives in DexFile::map, the section is keyed by type
            let mut list = MapList::read(cursor)?.list;
            list.sort_by_key(|item| (item.type_, item.off, item.size));
            Ok(Section::MapList(list))
        }
        MapItemType::TypeList => read_data::<TypeList>(cursor, entry.size),
        MapItemType::AnnotationSetRefList => read_data::<AnnotationSetRefList>(cursor, entry.size),
        MapItemType::AnnotationSetItem => read_data::<AnnotationSetItem>(cursor, entry.size),
        MapItemType::ClassDataItem => read_data::<ClassData>(cursor, entry.size),
        MapItemType::CodeItem => read_data::<CodeItem>(cursor, entry.size),
        MapItemType::StringDataItem => read_data::<StringData>(cursor, entry.size),
        MapItemType::DebugInfoItem => read_data::<DebugInfo>(cursor, entry.size),
        MapItemType::AnnotationItem => read_data::<AnnotationItem>(cursor, entry.size),
        MapItemType::EncodedArrayItem => read_data::<EncodedArrayItem>(cursor, entry.size),
        MapItemType::AnnotationsDirectoryItem => {
            read_data::<AnnotationsDirectory>(cursor, entry.size)
        }
        MapItemType::HiddenapiClassData => read_data::<HiddenapiClassData>(cursor, entry.size),
    }
}

/// Decodes the map at `map_off` and every section it references. The
/// cursor position is left unchanged.
pub fn decode_map(cursor: &mut DexCursor<'_>, map_off: u32) -> Result<(Vec<MapItem>, Sections)> {
    let map = cursor.with_offset(map_off as usize, MapList::ITEM_TY, |cursor| {
        check_alignment(cursor, MapList::ALIGNMENT, MapList::ITEM_TY)?;
        MapList::read(cursor)
    })?;

    let mut sections = Sections::new();
    for entry in &map.list {
        let Some(type_) = entry.item_type() else {
            cursor.diagnose(
                entry.off as usize,
                DiagnosticKind::UnknownMapItemType {
                    type_code: entry.type_,
                    count: entry.size,
                },
            );
            continue;
        };
        if sections.contains_key(&type_) {
            return dex_err!(DuplicateMapEntry {
                type_,
                offset: entry.off
            });
        }

        let section = cursor.with_offset(entry.off as usize, type_.name(), |cursor| {
            decode_section(cursor, type_, entry, map_off)
        })?;
        log::debug!(
            "resolved {} at {:#x}: {} item(s)",
            type_.name(),
            entry.off,
            section.len()
        );
        sections.insert(type_, section);
    }
    Ok((map.list, sections))
}
