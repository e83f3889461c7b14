use serde::Serialize;

use super::{DexCursor, DexItem, DiagnosticKind};
use crate::{dex_err, Result};

#[rustfmt::skip]
pub mod value_type {
    pub const VALUE_BYTE: u8          = 0x00;
    pub const VALUE_SHORT: u8         = 0x02;
    pub const VALUE_CHAR: u8          = 0x03;
    pub const VALUE_INT: u8           = 0x04;
    pub const VALUE_LONG: u8          = 0x06;
    pub const VALUE_FLOAT: u8         = 0x10;
    pub const VALUE_DOUBLE: u8        = 0x11;
    pub const VALUE_METHOD_TYPE: u8   = 0x15;
    pub const VALUE_METHOD_HANDLE: u8 = 0x16;
    pub const VALUE_STRING: u8        = 0x17;
    pub const VALUE_TYPE: u8          = 0x18;
    pub const VALUE_FIELD: u8         = 0x19;
    pub const VALUE_METHOD: u8        = 0x1a;
    pub const VALUE_ENUM: u8          = 0x1b;
    pub const VALUE_ARRAY: u8         = 0x1c;
    pub const VALUE_ANNOTATION: u8    = 0x1d;
    pub const VALUE_NULL: u8          = 0x1e;
    pub const VALUE_BOOLEAN: u8       = 0x1f;
}

use value_type::*;

/// How the payload bytes of a scalar value are widened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// sign-extended to the left
    Signed,
    /// zero-extended to the left
    Unsigned,
    /// zero-extended to the right (IEEE754 bit patterns)
    Right,
}

/// Value types whose payload is a little-endian number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    MethodType,
    MethodHandle,
    String,
    Type,
    Field,
    Method,
    Enum,
}

impl ScalarKind {
    /// Natural width in bytes and how shorter payloads are widened.
    pub const fn layout(self) -> (usize, Extension) {
        match self {
            ScalarKind::Byte => (1, Extension::Signed),
            ScalarKind::Short => (2, Extension::Signed),
            ScalarKind::Char => (2, Extension::Unsigned),
            ScalarKind::Int => (4, Extension::Signed),
            ScalarKind::Long => (8, Extension::Signed),
            ScalarKind::Float => (4, Extension::Right),
            ScalarKind::Double => (8, Extension::Right),
            ScalarKind::MethodType
            | ScalarKind::MethodHandle
            | ScalarKind::String
            | ScalarKind::Type
            | ScalarKind::Field
            | ScalarKind::Method
            | ScalarKind::Enum => (4, Extension::Unsigned),
        }
    }
}

/// Payload layout derived from a value header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// `len` raw bytes follow; `max` is the natural width of the type
    Scalar {
        value_type: u8,
        kind: ScalarKind,
        len: usize,
        max: usize,
        extension: Extension,
    },
    Array,
    Annotation,
    Null,
    Boolean(bool),
    Unknown,
}

/// Maps `(value_type, value_arg)` to the payload layout. Pure and exhaustive
/// over the 5-bit type space.
pub const fn value_format(value_type: u8, value_arg: u8) -> ValueFormat {
    let kind = match value_type {
        // always one byte, value_arg must be 0
        VALUE_BYTE => ScalarKind::Byte,
        VALUE_SHORT => ScalarKind::Short,
        VALUE_CHAR => ScalarKind::Char,
        VALUE_INT => ScalarKind::Int,
        VALUE_LONG => ScalarKind::Long,
        VALUE_FLOAT => ScalarKind::Float,
        VALUE_DOUBLE => ScalarKind::Double,
        VALUE_METHOD_TYPE => ScalarKind::MethodType,
        VALUE_METHOD_HANDLE => ScalarKind::MethodHandle,
        VALUE_STRING => ScalarKind::String,
        VALUE_TYPE => ScalarKind::Type,
        VALUE_FIELD => ScalarKind::Field,
        VALUE_METHOD => ScalarKind::Method,
        VALUE_ENUM => ScalarKind::Enum,
        VALUE_ARRAY => return ValueFormat::Array,
        VALUE_ANNOTATION => return ValueFormat::Annotation,
        VALUE_NULL => return ValueFormat::Null,
        VALUE_BOOLEAN => return ValueFormat::Boolean(value_arg != 0),
        _ => return ValueFormat::Unknown,
    };
    let (max, extension) = kind.layout();
    ValueFormat::Scalar {
        value_type,
        kind,
        len: value_arg as usize + 1,
        max,
        extension,
    }
}

/// ## EncodedValue
///
/// One header byte: `value_arg` in the high-order three bits and `value_type`
/// in the low-order five. For scalar types `value_arg` encodes the payload
/// length as `size - 1`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EncodedValue {
    /// signed one-byte integer value
    Byte(i8),
    /// signed two-byte integer value, sign-extended
    Short(i16),
    /// unsigned two-byte integer value, zero-extended
    Char(u16),
    /// signed four-byte integer value, sign-extended
    Int(i32),
    /// signed eight-byte integer value, sign-extended
    Long(i64),
    /// four-byte bit pattern, zero-extended to the right
    Float(f32),
    /// eight-byte bit pattern, zero-extended to the right
    Double(f64),
    /// index into `proto_ids`
    MethodType(u32),
    /// index into `method_handles`
    MethodHandle(u32),
    /// index into `string_ids`
    String(u32),
    /// index into `type_ids`
    Type(u32),
    /// index into `field_ids`
    Field(u32),
    /// index into `method_ids`
    Method(u32),
    /// index into `field_ids`, naming an enum constant
    Enum(u32),
    Array(EncodedArray),
    Annotation(EncodedAnnotation),
    Null,
    Boolean(bool),
    /// reserved type tag; only the header byte was consumed
    Unknown { value_type: u8, value_arg: u8 },
}

impl EncodedValue {
    pub fn read(cursor: &mut DexCursor<'_>) -> Result<EncodedValue> {
        let offset = cursor.pos();
        let byte = cursor.read_u8("encoded_value")?;
        let value_arg = byte >> 5;
        let value_type = byte & 0x1f;

        match value_format(value_type, value_arg) {
            ValueFormat::Scalar {
                value_type,
                kind,
                len,
                max,
                extension,
            } => {
                if len > max {
                    return dex_err!(BadEncodedValueSize {
                        offset,
                        value_type,
                        size: len,
                        max
                    });
                }
                let raw = read_scalar(cursor, len, max, extension)?;
                Ok(scalar_value(kind, raw))
            }
            ValueFormat::Array => {
                cursor.enter()?;
                let array = EncodedArray::read(cursor);
                cursor.leave();
                Ok(EncodedValue::Array(array?))
            }
            ValueFormat::Annotation => {
                cursor.enter()?;
                let annotation = EncodedAnnotation::read(cursor);
                cursor.leave();
                Ok(EncodedValue::Annotation(annotation?))
            }
            ValueFormat::Null => Ok(EncodedValue::Null),
            ValueFormat::Boolean(value) => Ok(EncodedValue::Boolean(value)),
            ValueFormat::Unknown => {
                cursor.diagnose(
                    offset,
                    DiagnosticKind::UnknownValueType {
                        value_type,
                        value_arg,
                    },
                );
                Ok(EncodedValue::Unknown {
                    value_type,
                    value_arg,
                })
            }
        }
    }

    /// Decodes a single value from a standalone buffer.
    pub fn from_bytes(data: &[u8]) -> Result<EncodedValue> {
        EncodedValue::read(&mut DexCursor::new(data))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, EncodedValue::Null)
    }
}

/// Reads `len` little-endian bytes and widens them to `max` bytes.
fn read_scalar(
    cursor: &mut DexCursor<'_>,
    len: usize,
    max: usize,
    extension: Extension,
) -> Result<u64> {
    let bytes = cursor.read_bytes(len, "encoded_value payload")?;
    let mut raw = bytes
        .iter()
        .rev()
        .fold(0u64, |acc, byte| (acc << 8) | *byte as u64);

    let bits = len as u32 * 8;
    match extension {
        Extension::Signed if bits < 64 => {
            let shift = 64 - bits;
            raw = (((raw << shift) as i64) >> shift) as u64;
        }
        Extension::Right => raw <<= (max - len) as u32 * 8,
        Extension::Signed | Extension::Unsigned => {}
    }
    Ok(raw)
}

fn scalar_value(kind: ScalarKind, raw: u64) -> EncodedValue {
    match kind {
        ScalarKind::Byte => EncodedValue::Byte(raw as i8),
        ScalarKind::Short => EncodedValue::Short(raw as i16),
        ScalarKind::Char => EncodedValue::Char(raw as u16),
        ScalarKind::Int => EncodedValue::Int(raw as i32),
        ScalarKind::Long => EncodedValue::Long(raw as i64),
        ScalarKind::Float => EncodedValue::Float(f32::from_bits(raw as u32)),
        ScalarKind::Double => EncodedValue::Double(f64::from_bits(raw)),
        ScalarKind::MethodType => EncodedValue::MethodType(raw as u32),
        ScalarKind::MethodHandle => EncodedValue::MethodHandle(raw as u32),
        ScalarKind::String => EncodedValue::String(raw as u32),
        ScalarKind::Type => EncodedValue::Type(raw as u32),
        ScalarKind::Field => EncodedValue::Field(raw as u32),
        ScalarKind::Method => EncodedValue::Method(raw as u32),
        ScalarKind::Enum => EncodedValue::Enum(raw as u32),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EncodedArray {
    pub values: Vec<EncodedValue>,
}

impl EncodedArray {
    pub fn read(cursor: &mut DexCursor<'_>) -> Result<EncodedArray> {
        let size = cursor.read_uleb128("encoded_array")?;
        // every value takes at least its header byte
        cursor.check_count(size, 1, "encoded_array")?;
        let values = (0..size)
            .map(|_| EncodedValue::read(cursor))
            .collect::<Result<Vec<_>>>()?;
        Ok(EncodedArray { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EncodedValue> {
        self.values.iter()
    }
}

impl<'a> IntoIterator for &'a EncodedArray {
    type Item = &'a EncodedValue;
    type IntoIter = std::slice::Iter<'a, EncodedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// `encoded_array_item`, referenced by `static_values_off` and call sites.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EncodedArrayItem {
    pub value: EncodedArray,
}

impl DexItem for EncodedArrayItem {
    const ITEM_TY: &'static str = "encoded_array_item";

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        Ok(Self {
            value: EncodedArray::read(cursor)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationElement {
    /// element name, represented as an index into the `string_ids` section.
    pub name_idx: u32,
    pub value: EncodedValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EncodedAnnotation {
    /// type of the annotation, an index into `type_ids`
    pub type_idx: u32,
    pub elements: Vec<AnnotationElement>,
}

impl EncodedAnnotation {
    pub fn read(cursor: &mut DexCursor<'_>) -> Result<EncodedAnnotation> {
        let type_idx = cursor.read_uleb128("encoded_annotation")?;
        let size = cursor.read_uleb128("encoded_annotation")?;
        // name index and value header byte
        cursor.check_count(size, 2, "encoded_annotation")?;
        let mut elements = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let name_idx = cursor.read_uleb128("annotation_element")?;
            let value = EncodedValue::read(cursor)?;
            elements.push(AnnotationElement { name_idx, value });
        }
        Ok(EncodedAnnotation { type_idx, elements })
    }

    pub fn elements(&self) -> &[AnnotationElement] {
        &self.elements
    }

    pub fn get(&self, name_idx: u32) -> Option<&EncodedValue> {
        self.elements
            .iter()
            .find(|element| element.name_idx == name_idx)
            .map(|element| &element.value)
    }
}
