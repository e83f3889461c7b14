use serde::Serialize;

use super::DexCursor;
use crate::Result;

/// A record that can be decoded at the cursor position.
pub trait DexItem: Sized {
    /// name used in error messages
    const ITEM_TY: &'static str;

    /// required alignment of the record start, in bytes
    const ALIGNMENT: usize = 1;

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self>;
}

macro_rules! plain_item {
    ($ty:ty, $name:literal) => {
        unsafe impl plain::Plain for $ty {}

        impl DexItem for $ty {
            const ITEM_TY: &'static str = $name;
            const ALIGNMENT: usize = 4;

            #[inline]
            fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
                cursor.read_plain($name)
            }
        }
    };
}

pub type StringIndex = u32;
pub type TypeIndex = u16;
pub type ProtoIndex = u16;
pub type FieldIndex = u32;
pub type MethodIndex = u32;

/// Marks an absent index in 32-bit index fields (e.g. a class without superclass).
pub const NO_INDEX: u32 = 0xffff_ffff;

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StringId {
    pub string_data_off: u32,
}

plain_item!(StringId, "string_id_item");

impl StringId {
    #[inline]
    pub const fn offset(&self) -> usize {
        self.string_data_off as usize
    }
}

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeId {
    pub descriptor_idx: StringIndex,
}

plain_item!(TypeId, "type_id_item");

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProtoId {
    pub shorty_idx: StringIndex, // index into string_ids array for shorty descriptor
    pub return_type_idx: u32,    // index into type_ids array for return type
    pub parameters_off: u32,     // file offset to type_list for parameter types
}

plain_item!(ProtoId, "proto_id_item");

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldId {
    pub class_idx: TypeIndex,  // index into type_ids_ array for defining class
    pub type_idx: TypeIndex,   // index into type_ids_ array for field type
    pub name_idx: StringIndex, // index into string_ids_ array for field name
}

plain_item!(FieldId, "field_id_item");

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MethodId {
    pub class_idx: TypeIndex,  // index into type_ids_ array for defining class
    pub proto_idx: ProtoIndex, // index into proto_ids_ array for method signature
    pub name_idx: StringIndex, // index into string_ids_ array for method name
}

plain_item!(MethodId, "method_id_item");

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassDef {
    pub class_idx: u32, // index into type_ids_ array for this class
    pub access_flags: u32,
    pub superclass_idx: u32,    // index into type_ids_ array for superclass or NO_INDEX
    pub interfaces_off: u32,    // file offset to TypeList
    pub source_file_idx: u32,   // index into string_ids_ for source file name or NO_INDEX
    pub annotations_off: u32,   // file offset to annotations_directory_item
    pub class_data_off: u32,    // file offset to class_data_item
    pub static_values_off: u32, // file offset to EncodedArray
}

plain_item!(ClassDef, "class_def_item");

impl ClassDef {
    #[inline]
    pub fn has_superclass(&self) -> bool {
        self.superclass_idx != NO_INDEX
    }

    #[inline]
    pub fn source_file(&self) -> Option<StringIndex> {
        match self.source_file_idx {
            NO_INDEX => None,
            idx => Some(idx),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MethodHandleItem {
    pub method_handle_type: u16,
    reserved1_: u16,
    pub field_or_method_idx: u16, // Field index for accessors, method index otherwise.
    reserved2_: u16,
}

plain_item!(MethodHandleItem, "method_handle_item");

impl MethodHandleItem {
    pub fn is_field_accessor(&self) -> bool {
        // static-put, static-get, instance-put, instance-get
        self.method_handle_type <= 0x03
    }
}

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallSiteIdItem {
    pub data_off: u32, // Offset into data section pointing to encoded array items.
}

plain_item!(CallSiteIdItem, "call_site_id_item");

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeItem {
    pub type_idx: TypeIndex, // index into type_ids section
}

unsafe impl plain::Plain for TypeItem {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeList {
    pub list: Vec<TypeItem>,
}

impl DexItem for TypeList {
    const ITEM_TY: &'static str = "type_list";
    const ALIGNMENT: usize = 4;

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let size = cursor.read_u32(Self::ITEM_TY)?;
        Ok(Self {
            list: cursor.read_array(size, Self::ITEM_TY)?,
        })
    }
}

impl TypeList {
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TypeIndex> + '_ {
        self.list.iter().map(|item| item.type_idx)
    }
}

/// Raw `string_data_item`. The MUTF-8 payload is kept undecoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StringData {
    /// length of the string in UTF-16 code units
    pub utf16_size: u32,
    /// payload bytes, including the terminating zero byte
    pub data: Vec<u8>,
}

impl DexItem for StringData {
    const ITEM_TY: &'static str = "string_data_item";

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let utf16_size = cursor.read_uleb128(Self::ITEM_TY)?;
        let data = cursor.read_until_nul(Self::ITEM_TY)?.to_vec();
        Ok(Self { utf16_size, data })
    }
}

impl StringData {
    /// payload without the terminating zero byte
    pub fn bytes(&self) -> &[u8] {
        match self.data.split_last() {
            Some((&0, rest)) => rest,
            _ => &self.data,
        }
    }
}

/// `hiddenapi_class_data_item`, kept as an opaque blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HiddenapiClassData {
    /// total size of the item, including this field
    pub size: u32,
    pub data: Vec<u8>,
}

impl DexItem for HiddenapiClassData {
    const ITEM_TY: &'static str = "hiddenapi_class_data_item";
    const ALIGNMENT: usize = 4;

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let size = cursor.read_u32(Self::ITEM_TY)?;
        let payload = (size as usize).saturating_sub(std::mem::size_of::<u32>());
        let data = cursor.read_bytes(payload, Self::ITEM_TY)?.to_vec();
        Ok(Self { size, data })
    }
}
