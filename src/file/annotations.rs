use std::borrow::Cow;

use serde::Serialize;

use super::{ClassDef, DexCursor, DexFile, DexItem, EncodedAnnotation, FieldIndex, MethodIndex};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnnotationVisibility {
    Build = 0x00,
    Runtime = 0x01,
    System = 0x02,
}

impl AnnotationVisibility {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Build),
            0x01 => Some(Self::Runtime),
            0x02 => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationItem {
    /// raw visibility byte, see [AnnotationVisibility]
    pub visibility: u8,
    pub annotation: EncodedAnnotation,
}

impl DexItem for AnnotationItem {
    const ITEM_TY: &'static str = "annotation_item";

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let visibility = cursor.read_u8(Self::ITEM_TY)?;
        let annotation = EncodedAnnotation::read(cursor)?;
        Ok(Self {
            visibility,
            annotation,
        })
    }
}

impl AnnotationItem {
    #[inline]
    pub fn get_visibility(&self) -> Option<AnnotationVisibility> {
        AnnotationVisibility::from_u8(self.visibility)
    }
}

/// Offsets of the `annotation_item`s of one set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationSetItem {
    pub entries: Vec<u32>,
}

impl DexItem for AnnotationSetItem {
    const ITEM_TY: &'static str = "annotation_set_item";
    const ALIGNMENT: usize = 4;

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let size = cursor.read_u32(Self::ITEM_TY)?;
        Ok(Self {
            entries: cursor.read_array(size, Self::ITEM_TY)?,
        })
    }
}

/// Offsets of `annotation_set_item`s, one per parameter; 0 means no annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationSetRefList {
    pub list: Vec<u32>,
}

impl DexItem for AnnotationSetRefList {
    const ITEM_TY: &'static str = "annotation_set_ref_list";
    const ALIGNMENT: usize = 4;

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let size = cursor.read_u32(Self::ITEM_TY)?;
        Ok(Self {
            list: cursor.read_array(size, Self::ITEM_TY)?,
        })
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldAnnotationsItem {
    pub field_idx: FieldIndex,
    pub annotations_off: u32,
}

unsafe impl plain::Plain for FieldAnnotationsItem {}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MethodAnnotationsItem {
    pub method_idx: MethodIndex,
    pub annotations_off: u32,
}

unsafe impl plain::Plain for MethodAnnotationsItem {}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParameterAnnotationsItem {
    pub method_idx: MethodIndex,
    /// offset to an `annotation_set_ref_list`
    pub annotations_off: u32,
}

unsafe impl plain::Plain for ParameterAnnotationsItem {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationsDirectory {
    pub class_annotations_off: u32,
    pub field_annotations: Vec<FieldAnnotationsItem>,
    pub method_annotations: Vec<MethodAnnotationsItem>,
    pub parameter_annotations: Vec<ParameterAnnotationsItem>,
}

impl DexItem for AnnotationsDirectory {
    const ITEM_TY: &'static str = "annotations_directory_item";
    const ALIGNMENT: usize = 4;

    fn read(cursor: &mut DexCursor<'_>) -> Result<Self> {
        let class_annotations_off = cursor.read_u32(Self::ITEM_TY)?;
        let fields_size = cursor.read_u32(Self::ITEM_TY)?;
        let methods_size = cursor.read_u32(Self::ITEM_TY)?;
        let parameters_size = cursor.read_u32(Self::ITEM_TY)?;
        Ok(Self {
            class_annotations_off,
            field_annotations: cursor.read_array(fields_size, "field_annotation")?,
            method_annotations: cursor.read_array(methods_size, "method_annotation")?,
            parameter_annotations: cursor.read_array(parameters_size, "parameter_annotation")?,
        })
    }
}

impl<'a> DexFile<'a> {
    pub fn class_annotations<'s>(
        &'s self,
        class_def: &'s ClassDef,
    ) -> Result<ClassAnnotationsAccessor<'s>> {
        ClassAnnotationsAccessor::new(self, class_def)
    }

    /// Resolves every `annotation_item` referenced by the set at `offset`.
    pub fn get_annotations_in_set(&self, offset: u32) -> Result<Vec<Cow<'_, AnnotationItem>>> {
        let Some(set) = self.get_annotation_set(offset)? else {
            return Ok(Vec::new());
        };
        let mut items = Vec::with_capacity(set.entries.len());
        for entry in &set.entries {
            if let Some(item) = self.get_annotation(*entry)? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

/// Walks the annotations of one class through its `annotations_directory_item`.
pub struct ClassAnnotationsAccessor<'a> {
    dex: &'a DexFile<'a>,
    class_def: &'a ClassDef,
    directory: Option<Cow<'a, AnnotationsDirectory>>,
}

impl<'a> ClassAnnotationsAccessor<'a> {
    pub fn new(dex: &'a DexFile<'a>, class_def: &'a ClassDef) -> Result<Self> {
        Ok(Self {
            dex,
            class_def,
            directory: dex.get_annotations_directory(class_def)?,
        })
    }

    #[inline]
    pub fn get_class_def(&self) -> &'a ClassDef {
        self.class_def
    }

    #[inline]
    pub fn has_annotations(&self) -> bool {
        self.directory.is_some()
    }

    #[inline]
    pub fn get_field_annotations(&self) -> &[FieldAnnotationsItem] {
        match &self.directory {
            Some(directory) => &directory.field_annotations,
            None => &[],
        }
    }

    #[inline]
    pub fn get_method_annotations(&self) -> &[MethodAnnotationsItem] {
        match &self.directory {
            Some(directory) => &directory.method_annotations,
            None => &[],
        }
    }

    #[inline]
    pub fn get_parameter_annotations(&self) -> &[ParameterAnnotationsItem] {
        match &self.directory {
            Some(directory) => &directory.parameter_annotations,
            None => &[],
        }
    }

    pub fn get_class_annotations(&self) -> Result<Vec<Cow<'a, AnnotationItem>>> {
        match &self.directory {
            Some(directory) => self.dex.get_annotations_in_set(directory.class_annotations_off),
            None => Ok(Vec::new()),
        }
    }

    pub fn get_field_annotation_items(
        &self,
        field_idx: FieldIndex,
    ) -> Result<Vec<Cow<'a, AnnotationItem>>> {
        match self
            .get_field_annotations()
            .iter()
            .find(|item| item.field_idx == field_idx)
        {
            Some(item) => self.dex.get_annotations_in_set(item.annotations_off),
            None => Ok(Vec::new()),
        }
    }

    pub fn get_method_annotation_items(
        &self,
        method_idx: MethodIndex,
    ) -> Result<Vec<Cow<'a, AnnotationItem>>> {
        match self
            .get_method_annotations()
            .iter()
            .find(|item| item.method_idx == method_idx)
        {
            Some(item) => self.dex.get_annotations_in_set(item.annotations_off),
            None => Ok(Vec::new()),
        }
    }

    /// Annotations per parameter of `method_idx`, in declaration order.
    pub fn get_parameter_annotation_items(
        &self,
        method_idx: MethodIndex,
    ) -> Result<Vec<Vec<Cow<'a, AnnotationItem>>>> {
        let Some(item) = self
            .get_parameter_annotations()
            .iter()
            .find(|item| item.method_idx == method_idx)
        else {
            return Ok(Vec::new());
        };
        let Some(ref_list) = self.dex.get_annotation_set_ref_list(item.annotations_off)? else {
            return Ok(Vec::new());
        };
        ref_list
            .list
            .iter()
            .map(|set_off| self.dex.get_annotations_in_set(*set_off))
            .collect()
    }
}
