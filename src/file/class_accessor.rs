use serde::Serialize;

use super::{access_flag_names, AccessTarget, DexCursor, DexItem};
use crate::{dex_err, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EncodedField {
    /// index into `field_ids`, as a difference from the previous element's index
    pub field_idx_diff: u32,
    pub access_flags: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EncodedMethod {
    /// index into `method_ids`, as a difference from the previous element's index
    pub method_idx_diff: u32,
    pub access_flags: u32,
    /// offset to the method's `code_item`, or 0 for abstract and native methods
    pub code_off: u32,
}

/// `class_data_item` as stored in the file. Member indices are still
/// delta-encoded; use [ClassAccessor] to resolve them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassData {
    /// file offset the item was read from
    #[serde(skip)]
    pub offset: usize,
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

impl DexItem for ClassData {
    const ITEM_TY: &'static str = "class_data_item";

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let offset = cursor.pos();
        let static_fields_size = cursor.read_uleb128(Self::ITEM_TY)?;
        let instance_fields_size = cursor.read_uleb128(Self::ITEM_TY)?;
        let direct_methods_size = cursor.read_uleb128(Self::ITEM_TY)?;
        let virtual_methods_size = cursor.read_uleb128(Self::ITEM_TY)?;

        Ok(Self {
            offset,
            static_fields: read_fields(cursor, static_fields_size)?,
            instance_fields: read_fields(cursor, instance_fields_size)?,
            direct_methods: read_methods(cursor, direct_methods_size)?,
            virtual_methods: read_methods(cursor, virtual_methods_size)?,
        })
    }
}

fn read_fields(cursor: &mut DexCursor<'_>, count: u32) -> Result<Vec<EncodedField>> {
    cursor.check_count(count, 2, "encoded_field")?;
    (0..count)
        .map(|_| {
            Ok(EncodedField {
                field_idx_diff: cursor.read_uleb128("encoded_field")?,
                access_flags: cursor.read_uleb128("encoded_field")?,
            })
        })
        .collect()
}

fn read_methods(cursor: &mut DexCursor<'_>, count: u32) -> Result<Vec<EncodedMethod>> {
    cursor.check_count(count, 3, "encoded_method")?;
    (0..count)
        .map(|_| {
            Ok(EncodedMethod {
                method_idx_diff: cursor.read_uleb128("encoded_method")?,
                access_flags: cursor.read_uleb128("encoded_method")?,
                code_off: cursor.read_uleb128("encoded_method")?,
            })
        })
        .collect()
}

impl ClassData {
    #[inline(always)]
    pub fn num_fields(&self) -> usize {
        self.static_fields.len() + self.instance_fields.len()
    }

    #[inline(always)]
    pub fn num_methods(&self) -> usize {
        self.direct_methods.len() + self.virtual_methods.len()
    }

    pub fn accessor(&self) -> ClassAccessor<'_> {
        ClassAccessor::new(self)
    }
}

/// A class member whose index has been resolved from the delta encoding.
pub trait ClassItemBase: Copy {
    type Encoded: Copy;
    const ITEM_TY: &'static str;

    fn init() -> Self;

    fn next_section(&mut self);

    /// Applies the next encoded entry on top of the previous state.
    /// `offset` locates the owning class data in errors.
    fn read(&mut self, encoded: &Self::Encoded, offset: usize) -> Result<()>;
}

fn add_index(
    offset: usize,
    index: u32,
    diff: u32,
    is_first: bool,
    item_ty: &'static str,
) -> Result<u32> {
    if is_first {
        return Ok(diff);
    }
    match index.checked_add(diff) {
        Some(next) => Ok(next),
        None => dex_err!(BadEncodedIndex {
            offset,
            index,
            next_index: diff,
            item_ty
        }),
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub index: u32,
    pub access_flags: u32,
    pub is_static: bool,
    #[serde(skip)]
    started: bool,
}

impl Field {
    #[inline(always)]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn flag_names(&self) -> Vec<&'static str> {
        access_flag_names(self.access_flags, AccessTarget::Field)
    }
}

impl ClassItemBase for Field {
    type Encoded = EncodedField;
    const ITEM_TY: &'static str = "encoded_field";

    fn init() -> Self {
        Self {
            index: 0,
            access_flags: 0,
            is_static: true,
            started: false,
        }
    }

    fn next_section(&mut self) {
        self.is_static = false;
        self.index = 0;
        self.started = false;
    }

    fn read(&mut self, encoded: &EncodedField, offset: usize) -> Result<()> {
        self.index = add_index(
            offset,
            self.index,
            encoded.field_idx_diff,
            !self.started,
            Self::ITEM_TY,
        )?;
        self.access_flags = encoded.access_flags;
        self.started = true;
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Method {
    pub index: u32,
    pub access_flags: u32,
    pub code_offset: u32,
    pub is_static_or_direct: bool,
    #[serde(skip)]
    started: bool,
}

impl Method {
    pub fn flag_names(&self) -> Vec<&'static str> {
        access_flag_names(self.access_flags, AccessTarget::Method)
    }

    #[inline]
    pub fn has_code(&self) -> bool {
        self.code_offset != 0
    }
}

impl ClassItemBase for Method {
    type Encoded = EncodedMethod;
    const ITEM_TY: &'static str = "encoded_method";

    fn init() -> Self {
        Self {
            index: 0,
            access_flags: 0,
            code_offset: 0,
            is_static_or_direct: true,
            started: false,
        }
    }

    fn next_section(&mut self) {
        self.is_static_or_direct = false;
        self.index = 0;
        self.started = false;
    }

    fn read(&mut self, encoded: &EncodedMethod, offset: usize) -> Result<()> {
        self.index = add_index(
            offset,
            self.index,
            encoded.method_idx_diff,
            !self.started,
            Self::ITEM_TY,
        )?;
        self.access_flags = encoded.access_flags;
        self.code_offset = encoded.code_off;
        self.started = true;
        Ok(())
    }
}

/// Resolves the delta-encoded member lists of a [ClassData].
///
/// Each of the four lists restarts its running sum at zero and must be
/// walked in declared order.
pub struct ClassAccessor<'a> {
    class_data: &'a ClassData,
}

impl<'a> ClassAccessor<'a> {
    pub fn new(class_data: &'a ClassData) -> Self {
        Self { class_data }
    }

    #[inline(always)]
    pub fn num_static_fields(&self) -> usize {
        self.class_data.static_fields.len()
    }

    #[inline(always)]
    pub fn num_instance_fields(&self) -> usize {
        self.class_data.instance_fields.len()
    }

    #[inline(always)]
    pub fn num_direct_methods(&self) -> usize {
        self.class_data.direct_methods.len()
    }

    #[inline(always)]
    pub fn num_virtual_methods(&self) -> usize {
        self.class_data.virtual_methods.len()
    }

    /// static fields followed by instance fields
    pub fn get_fields(&self) -> DataIterator<'a, Field> {
        DataIterator::new(
            self.class_data.offset,
            &self.class_data.static_fields,
            &self.class_data.instance_fields,
        )
    }

    pub fn get_static_fields(&self) -> impl Iterator<Item = Result<Field>> + 'a {
        self.get_fields().take(self.num_static_fields())
    }

    pub fn get_instance_fields(&self) -> impl Iterator<Item = Result<Field>> + 'a {
        self.get_fields().skip(self.num_static_fields())
    }

    /// direct methods followed by virtual methods
    pub fn get_methods(&self) -> DataIterator<'a, Method> {
        DataIterator::new(
            self.class_data.offset,
            &self.class_data.direct_methods,
            &self.class_data.virtual_methods,
        )
    }

    pub fn get_direct_methods(&self) -> impl Iterator<Item = Result<Method>> + 'a {
        self.get_methods().take(self.num_direct_methods())
    }

    pub fn get_virtual_methods(&self) -> impl Iterator<Item = Result<Method>> + 'a {
        self.get_methods().skip(self.num_direct_methods())
    }

    pub fn visit_fields_and_methods<F, M>(&self, mut field_visitor: F, mut method_visitor: M) -> Result<()>
    where
        F: FnMut(&Field) -> Result<()>,
        M: FnMut(&Method) -> Result<()>,
    {
        for field in self.get_fields() {
            field_visitor(&field?)?;
        }
        for method in self.get_methods() {
            method_visitor(&method?)?;
        }
        Ok(())
    }
}

/// Walks two consecutive member lists, resetting the running index between them.
pub struct DataIterator<'a, T: ClassItemBase> {
    offset: usize,
    first: &'a [T::Encoded],
    second: &'a [T::Encoded],
    value: T,

    pos: usize,
    failed: bool,
}

impl<'a, T: ClassItemBase> DataIterator<'a, T> {
    pub fn new(offset: usize, first: &'a [T::Encoded], second: &'a [T::Encoded]) -> Self {
        Self {
            offset,
            first,
            second,
            value: T::init(),
            pos: 0,
            failed: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.failed && self.pos < self.first.len() + self.second.len()
    }
}

impl<'a, T: ClassItemBase> Iterator for DataIterator<'a, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.is_valid() {
            return None;
        }
        if self.pos == self.first.len() {
            self.value.next_section();
        }

        let encoded = match self.first.get(self.pos) {
            Some(encoded) => encoded,
            None => &self.second[self.pos - self.first.len()],
        };
        self.pos += 1;
        match self.value.read(encoded, self.offset) {
            Ok(()) => Some(Ok(self.value)),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leb128::encode_leb128;

    fn methods(diffs: &[u32]) -> Vec<EncodedMethod> {
        diffs
            .iter()
            .map(|diff| EncodedMethod {
                method_idx_diff: *diff,
                access_flags: 0,
                code_off: 0,
            })
            .collect()
    }

    #[test]
    fn test_read_class_data() {
        let mut data = vec![];
        for value in [
            1u32, 0, 3, 1, 7, 0x19, 3, 0x10001, 0x1c4, 1, 2, 0x200, 1, 1, 0, 1, 0x401, 0,
        ] {
            data.extend(encode_leb128(value));
        }
        let mut cursor = DexCursor::new(&data);
        let class_data = ClassData::read(&mut cursor).unwrap();
        assert_eq!(cursor.pos(), data.len());
        assert_eq!(class_data.offset, 0);
        assert_eq!(
            class_data.static_fields,
            vec![EncodedField {
                field_idx_diff: 7,
                access_flags: 0x19
            }]
        );
        assert!(class_data.instance_fields.is_empty());
        assert_eq!(class_data.direct_methods.len(), 3);
        assert_eq!(class_data.direct_methods[0].access_flags, 0x10001);
        assert_eq!(class_data.direct_methods[0].code_off, 0x1c4);
        assert_eq!(class_data.virtual_methods[0].access_flags, 0x401);
    }

    #[test]
    fn test_direct_method_deltas_resolve_in_order() {
        let class_data = ClassData {
            direct_methods: methods(&[3, 0, 2]),
            ..Default::default()
        };
        let indices: Vec<u32> = class_data
            .accessor()
            .get_direct_methods()
            .map(|m| m.unwrap().index)
            .collect();
        assert_eq!(indices, vec![3, 3, 5]);
    }

    #[test]
    fn test_running_sum_restarts_per_list() {
        let class_data = ClassData {
            direct_methods: methods(&[4, 1]),
            virtual_methods: methods(&[2, 6]),
            ..Default::default()
        };
        let accessor = class_data.accessor();
        let all: Vec<Method> = accessor.get_methods().map(|m| m.unwrap()).collect();
        assert_eq!(
            all.iter().map(|m| m.index).collect::<Vec<_>>(),
            vec![4, 5, 2, 8]
        );
        assert!(all[1].is_static_or_direct);
        assert!(!all[2].is_static_or_direct);

        let virtuals: Vec<u32> = accessor
            .get_virtual_methods()
            .map(|m| m.unwrap().index)
            .collect();
        assert_eq!(virtuals, vec![2, 8]);
    }

    #[test]
    fn test_fields_are_split_by_staticness() {
        let class_data = ClassData {
            static_fields: vec![EncodedField {
                field_idx_diff: 1,
                access_flags: crate::file::ACC_STATIC,
            }],
            instance_fields: vec![
                EncodedField {
                    field_idx_diff: 0,
                    access_flags: 0,
                },
                EncodedField {
                    field_idx_diff: 4,
                    access_flags: 0,
                },
            ],
            ..Default::default()
        };
        let fields: Vec<Field> = class_data.accessor().get_fields().map(|f| f.unwrap()).collect();
        assert_eq!(
            fields.iter().map(|f| (f.index, f.is_static())).collect::<Vec<_>>(),
            vec![(1, true), (0, false), (4, false)]
        );
    }

    #[test]
    fn test_index_overflow_is_reported() {
        let class_data = ClassData {
            offset: 0x2c0,
            virtual_methods: methods(&[u32::MAX, 1, 1]),
            ..Default::default()
        };
        let results: Vec<Result<Method>> = class_data.accessor().get_methods().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(crate::error::DexError::BadEncodedIndex {
                offset: 0x2c0,
                item_ty: "encoded_method",
                ..
            })
        ));
    }

    #[test]
    fn test_truncated_class_data_names_the_item() {
        let mut data = vec![0xaa, 0xbb];
        data.extend(encode_leb128(0));
        data.extend(encode_leb128(1));
        data.push(0x80);
        let mut cursor = DexCursor::new(&data);
        cursor.seek(2, "test").unwrap();
        let err = ClassData::read(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            crate::error::DexError::TruncatedLeb128 {
                offset: 4,
                item_ty: "class_data_item"
            }
        ));
    }

    #[test]
    fn test_class_data_count_too_large() {
        let mut data = encode_leb128(0x0fff_ffff);
        data.extend([0, 0, 0]);
        let err = ClassData::read(&mut DexCursor::new(&data)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedCount);
    }
}
