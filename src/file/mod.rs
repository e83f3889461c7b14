use std::{borrow::Cow, fmt};

use serde::Serialize;

pub mod cursor;
pub use cursor::*;
pub mod structs;
pub use structs::*;
pub mod header;
pub use header::*;
pub mod modifiers;
pub use modifiers::*;
pub mod encoded_value;
pub use encoded_value::*;
pub mod class_accessor;
pub use class_accessor::*;
pub mod code_item_accessors;
pub use code_item_accessors::*;
pub mod annotations;
pub use annotations::*;
pub mod debug;
pub use debug::{DebugInfo, PositionInfo, SourceFile};
pub mod map;
pub use map::*;
pub mod verifier;
pub use verifier::*;
pub mod container;
pub use container::*;
pub mod dump;

use crate::{dex_err, Result};

pub const DEX_MAGIC: &[u8] = b"dex\n";
/// Versions known at the time of writing. Other well-formed versions are only
/// rejected under [VerifyPreset::All].
pub const DEX_MAGIC_VERSIONS: &[&[u8]] = &[
    b"035\0", b"037\0",
    b"038\0", // Android "O" and beyond
    b"039\0", // Android "P" and beyond
    b"040\0", // Android "Q" and beyond (aka Android 10)
    b"041\0", // Android "V" and beyond (aka Android 15)
];

pub const DEX_ENDIAN_CONSTANT: u32 = 0x12345678;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DexLocation {
    InMemory,
    Path(String),
}

impl From<&str> for DexLocation {
    fn from(s: &str) -> Self {
        DexLocation::Path(s.to_string())
    }
}

impl fmt::Display for DexLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DexLocation::InMemory => f.write_str("[in-memory]"),
            DexLocation::Path(path) => f.write_str(path),
        }
    }
}

/// Knobs of a single decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub verify: VerifyPreset,
    /// maximum nesting of encoded arrays and annotations
    pub max_value_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            verify: VerifyPreset::None,
            max_value_depth: DexCursor::DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verify(mut self, verify: VerifyPreset) -> Self {
        self.verify = verify;
        self
    }

    pub fn max_value_depth(mut self, max_value_depth: usize) -> Self {
        self.max_value_depth = max_value_depth;
        self
    }
}

/// A decoded DEX file. Sections are owned; out-of-line lookups that are not
/// covered by the map are decoded on demand from the original buffer.
#[derive(Serialize)]
pub struct DexFile<'a> {
    #[serde(skip)]
    data: &'a [u8],
    header: Header,
    map: Vec<MapItem>,
    sections: Sections,
    diagnostics: Vec<Diagnostic>,

    #[serde(skip)]
    options: DecodeOptions,
    #[serde(skip)]
    location: DexLocation,
}

impl fmt::Debug for DexFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DexFile")
            .field("location", &self.location)
            .field("file_size", &self.data.len())
            .field("sections", &self.sections.keys().collect::<Vec<_>>())
            .field("diagnostics", &self.diagnostics.len())
            .finish()
    }
}

macro_rules! check_lt_result {
    ($self:ident, $idx:expr, $count:expr, $item_ty:ty) => {
        if ($idx as usize) >= ($count as usize) {
            return dex_err!(DexIndexError {
                offset: $self.record_offset::<$item_ty>($idx as u32),
                index: $idx as u32,
                item_ty: <$item_ty as DexItem>::ITEM_TY,
                max: $count as usize,
            });
        }
    };
}

impl<'a> DexFile<'a> {
    pub fn from_bytes(data: &'a [u8], options: &DecodeOptions) -> Result<DexFile<'a>> {
        DexFile::from_raw_parts(data, options, DexLocation::InMemory)
    }

    pub fn from_raw_parts(
        data: &'a [u8],
        options: &DecodeOptions,
        location: DexLocation,
    ) -> Result<DexFile<'a>> {
        let mut cursor = DexCursor::with_max_depth(data, options.max_value_depth);
        let header = Header::read(&mut cursor)?;
        verifier::check_header(&header, data, options.verify)?;

        if header.map_off < Header::SIZE {
            return dex_err!(BadOffsetInHeader {
                offset: header.map_off,
                header_size: Header::SIZE as usize,
                section: MapList::ITEM_TY
            });
        }
        let (map, mut sections) = map::decode_map(&mut cursor, header.map_off)?;
        read_index_tables_from_header(&mut cursor, &header, &mut sections)?;

        if options.verify == VerifyPreset::All {
            verifier::check_header_against_map(&header, &map)?;
        }

        let diagnostics = cursor.take_diagnostics();
        log::debug!(
            "decoded {location}: {} section(s), {} diagnostic(s)",
            sections.len(),
            diagnostics.len()
        );
        Ok(DexFile {
            data,
            header,
            map,
            sections,
            diagnostics,
            options: *options,
            location,
        })
    }

    pub fn open(container: &DexFileContainer) -> Result<DexFile<'_>> {
        DexFile::from_raw_parts(
            container.data(),
            &container.options(),
            DexLocation::Path(container.get_location().to_string()),
        )
    }

    #[inline(always)]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Map entries in file order, including unknown ones.
    #[inline(always)]
    pub fn map(&self) -> &[MapItem] {
        &self.map
    }

    /// Decoded sections keyed by type, independent of map order.
    #[inline(always)]
    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    #[inline]
    pub fn section(&self, type_: MapItemType) -> Option<&Section> {
        self.sections.get(&type_)
    }

    #[inline(always)]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[inline(always)]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline(always)]
    pub fn file_size(&self) -> usize {
        self.data.len()
    }

    pub fn get_location(&self) -> &DexLocation {
        &self.location
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// File offset of the table of `T`, from the map or else the header.
    fn table_offset<T: TableItem>(&self) -> u32 {
        self.map
            .iter()
            .find(|item| item.item_type() == Some(T::MAP_TYPE))
            .map(|item| item.off)
            .or_else(|| {
                self.header
                    .index_sections()
                    .into_iter()
                    .find(|(type_, _, _)| *type_ == T::MAP_TYPE)
                    .map(|(_, _, off)| off)
            })
            .unwrap_or(0)
    }

    /// Where record `idx` of `T` would start.
    fn record_offset<T: TableItem>(&self, idx: u32) -> usize {
        (idx as usize)
            .saturating_mul(std::mem::size_of::<T>())
            .saturating_add(self.table_offset::<T>() as usize)
    }

    fn table<T: TableItem>(&self) -> &[T] {
        self.sections
            .get(&T::MAP_TYPE)
            .and_then(T::table)
            .unwrap_or(&[])
    }

    /// Item of type `T` at `offset`, from the decoded sections or decoded on
    /// demand when the map does not cover it. Offset 0 means absent.
    pub fn lookup<T: DataItem>(&self, offset: u32) -> Result<Option<Cow<'_, T>>> {
        if offset == 0 {
            return Ok(None);
        }
        if let Some(item) = self
            .sections
            .get(&T::MAP_TYPE)
            .and_then(T::items)
            .and_then(|items| items.get(offset))
        {
            return Ok(Some(Cow::Borrowed(item)));
        }

        log::debug!("{} at {offset:#x} not in map, decoding on demand", T::ITEM_TY);
        let mut cursor = DexCursor::with_max_depth(self.data, self.options.max_value_depth);
        let item = cursor.with_offset(offset as usize, T::ITEM_TY, |cursor| {
            map::check_alignment(cursor, T::ALIGNMENT, T::ITEM_TY)?;
            T::read(cursor)
        })?;
        Ok(Some(Cow::Owned(item)))
    }

    //------------------------------------------------------------------------------
    // String Ids
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn string_ids(&self) -> &[StringId] {
        self.table()
    }

    #[inline(always)]
    pub fn num_string_ids(&self) -> u32 {
        self.string_ids().len() as u32
    }

    #[inline(always)]
    pub fn get_string_id(&self, idx: StringIndex) -> Result<&StringId> {
        check_lt_result!(self, idx, self.num_string_ids(), StringId);
        Ok(&self.string_ids()[idx as usize])
    }

    pub fn get_string_data(&self, idx: StringIndex) -> Result<Cow<'_, StringData>> {
        let string_id = self.get_string_id(idx)?;
        match self.lookup::<StringData>(string_id.string_data_off)? {
            Some(data) => Ok(data),
            None => dex_err!(BadOffsetInHeader {
                offset: string_id.string_data_off,
                header_size: Header::SIZE as usize,
                section: StringData::ITEM_TY
            }),
        }
    }

    /// String payload with non-ASCII bytes escaped. The MUTF-8 encoding is
    /// not decoded.
    pub fn get_string_escaped(&self, idx: StringIndex) -> Result<String> {
        let data = self.get_string_data(idx)?;
        Ok(data.bytes().escape_ascii().to_string())
    }

    //------------------------------------------------------------------------------
    // Type Ids
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn type_ids(&self) -> &[TypeId] {
        self.table()
    }

    #[inline(always)]
    pub fn num_type_ids(&self) -> u32 {
        self.type_ids().len() as u32
    }

    #[inline(always)]
    pub fn get_type_id(&self, idx: u32) -> Result<&TypeId> {
        check_lt_result!(self, idx, self.num_type_ids(), TypeId);
        Ok(&self.type_ids()[idx as usize])
    }

    pub fn get_type_desc_at(&self, idx: u32) -> Result<String> {
        let type_id = self.get_type_id(idx)?;
        self.get_string_escaped(type_id.descriptor_idx)
    }

    #[inline]
    pub fn get_type_list(&self, offset: u32) -> Result<Option<Cow<'_, TypeList>>> {
        self.lookup(offset)
    }

    //------------------------------------------------------------------------------
    // Proto Ids
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn proto_ids(&self) -> &[ProtoId] {
        self.table()
    }

    #[inline(always)]
    pub fn num_proto_ids(&self) -> u32 {
        self.proto_ids().len() as u32
    }

    pub fn get_proto_id(&self, idx: u32) -> Result<&ProtoId> {
        check_lt_result!(self, idx, self.num_proto_ids(), ProtoId);
        Ok(&self.proto_ids()[idx as usize])
    }

    pub fn get_shorty_at(&self, idx: u32) -> Result<String> {
        let proto_id = self.get_proto_id(idx)?;
        self.get_string_escaped(proto_id.shorty_idx)
    }

    pub fn get_proto_parameters(&self, proto_id: &ProtoId) -> Result<Option<Cow<'_, TypeList>>> {
        self.get_type_list(proto_id.parameters_off)
    }

    //------------------------------------------------------------------------------
    // Field Ids
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn field_ids(&self) -> &[FieldId] {
        self.table()
    }

    #[inline(always)]
    pub fn num_field_ids(&self) -> u32 {
        self.field_ids().len() as u32
    }

    #[inline]
    pub fn get_field_id(&self, idx: u32) -> Result<&FieldId> {
        check_lt_result!(self, idx, self.num_field_ids(), FieldId);
        Ok(&self.field_ids()[idx as usize])
    }

    //------------------------------------------------------------------------------
    // Method Ids
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn method_ids(&self) -> &[MethodId] {
        self.table()
    }

    #[inline(always)]
    pub fn num_method_ids(&self) -> u32 {
        self.method_ids().len() as u32
    }

    #[inline(always)]
    pub fn get_method_id(&self, idx: u32) -> Result<&MethodId> {
        check_lt_result!(self, idx, self.num_method_ids(), MethodId);
        Ok(&self.method_ids()[idx as usize])
    }

    //------------------------------------------------------------------------------
    // ClassDefs
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn class_defs(&self) -> &[ClassDef] {
        self.table()
    }

    #[inline(always)]
    pub fn num_class_defs(&self) -> u32 {
        self.class_defs().len() as u32
    }

    #[inline(always)]
    pub fn get_class_def(&self, idx: u32) -> Result<&ClassDef> {
        check_lt_result!(self, idx, self.num_class_defs(), ClassDef);
        Ok(&self.class_defs()[idx as usize])
    }

    #[inline]
    pub fn get_class_desc(&self, class_def: &ClassDef) -> Result<String> {
        self.get_type_desc_at(class_def.class_idx)
    }

    #[inline]
    pub fn get_interfaces_list(&self, class_def: &ClassDef) -> Result<Option<Cow<'_, TypeList>>> {
        self.get_type_list(class_def.interfaces_off)
    }

    #[inline]
    pub fn get_class_data(&self, class_def: &ClassDef) -> Result<Option<Cow<'_, ClassData>>> {
        self.lookup(class_def.class_data_off)
    }

    #[inline]
    pub fn get_static_values(
        &self,
        class_def: &ClassDef,
    ) -> Result<Option<Cow<'_, EncodedArrayItem>>> {
        self.lookup(class_def.static_values_off)
    }

    #[inline]
    pub fn get_annotations_directory(
        &self,
        class_def: &ClassDef,
    ) -> Result<Option<Cow<'_, AnnotationsDirectory>>> {
        self.lookup(class_def.annotations_off)
    }

    //------------------------------------------------------------------------------
    // Method Handles
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn method_handles(&self) -> &[MethodHandleItem] {
        self.table()
    }

    #[inline(always)]
    pub fn num_method_handles(&self) -> u32 {
        self.method_handles().len() as u32
    }

    #[inline(always)]
    pub fn get_method_handle(&self, idx: u32) -> Result<&MethodHandleItem> {
        check_lt_result!(self, idx, self.num_method_handles(), MethodHandleItem);
        Ok(&self.method_handles()[idx as usize])
    }

    //------------------------------------------------------------------------------
    // CallSites
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn call_site_ids(&self) -> &[CallSiteIdItem] {
        self.table()
    }

    #[inline(always)]
    pub fn num_call_site_ids(&self) -> u32 {
        self.call_site_ids().len() as u32
    }

    #[inline(always)]
    pub fn get_call_site_id(&self, idx: u32) -> Result<&CallSiteIdItem> {
        check_lt_result!(self, idx, self.num_call_site_ids(), CallSiteIdItem);
        Ok(&self.call_site_ids()[idx as usize])
    }

    /// Bootstrap arguments of a call site.
    pub fn get_call_site(&self, idx: u32) -> Result<Option<Cow<'_, EncodedArrayItem>>> {
        let call_site_id = self.get_call_site_id(idx)?;
        self.lookup(call_site_id.data_off)
    }

    //------------------------------------------------------------------------------
    // Data Items
    //------------------------------------------------------------------------------
    #[inline]
    pub fn get_code_item(&self, offset: u32) -> Result<Option<Cow<'_, CodeItem>>> {
        self.lookup(offset)
    }

    #[inline]
    pub fn get_debug_info(&self, offset: u32) -> Result<Option<Cow<'_, DebugInfo>>> {
        self.lookup(offset)
    }

    #[inline]
    pub fn get_annotation_set(&self, offset: u32) -> Result<Option<Cow<'_, AnnotationSetItem>>> {
        self.lookup(offset)
    }

    #[inline]
    pub fn get_annotation_set_ref_list(
        &self,
        offset: u32,
    ) -> Result<Option<Cow<'_, AnnotationSetRefList>>> {
        self.lookup(offset)
    }

    #[inline]
    pub fn get_annotation(&self, offset: u32) -> Result<Option<Cow<'_, AnnotationItem>>> {
        self.lookup(offset)
    }

    #[inline]
    pub fn get_encoded_array(&self, offset: u32) -> Result<Option<Cow<'_, EncodedArrayItem>>> {
        self.lookup(offset)
    }

    pub fn hiddenapi_class_data(&self) -> Option<&HiddenapiClassData> {
        match self.section(MapItemType::HiddenapiClassData)? {
            Section::HiddenapiClassData(items) => items.iter().next().map(|(_, item)| item),
            _ => None,
        }
    }
}

/// Index tables the header declares but the map does not list are read from
/// the header's offsets.
fn read_index_tables_from_header(
    cursor: &mut DexCursor<'_>,
    header: &Header,
    sections: &mut Sections,
) -> Result<()> {
    table_from_header::<StringId>(cursor, header.string_ids_size, header.string_ids_off, sections)?;
    table_from_header::<TypeId>(cursor, header.type_ids_size, header.type_ids_off, sections)?;
    table_from_header::<ProtoId>(cursor, header.proto_ids_size, header.proto_ids_off, sections)?;
    table_from_header::<FieldId>(cursor, header.field_ids_size, header.field_ids_off, sections)?;
    table_from_header::<MethodId>(cursor, header.method_ids_size, header.method_ids_off, sections)?;
    table_from_header::<ClassDef>(cursor, header.class_defs_size, header.class_defs_off, sections)
}

fn table_from_header<T: TableItem>(
    cursor: &mut DexCursor<'_>,
    size: u32,
    off: u32,
    sections: &mut Sections,
) -> Result<()> {
    if size == 0 || sections.contains_key(&T::MAP_TYPE) {
        return Ok(());
    }
    log::debug!("{} missing from map, using header offset {off:#x}", T::MAP_TYPE.name());
    let table = cursor.with_offset(off as usize, T::ITEM_TY, |cursor| {
        map::read_table::<T>(cursor, size)
    })?;
    sections.insert(T::MAP_TYPE, T::into_section(table));
    Ok(())
}
