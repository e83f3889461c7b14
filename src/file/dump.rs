use std::fmt::{self, Write};

use comfy_table::{presets::UTF8_FULL, Table};

use crate::Result;

use super::{
    access_flag_names, AccessTarget, ClassDef, DexFile, EncodedValue, FieldId, MethodId, Section,
};

pub mod prettify {

    #[derive(Copy, Clone, PartialEq, Eq)]
    pub enum Field {
        WithType,
        NoType,
    }

    #[derive(Copy, Clone, PartialEq, Eq)]
    pub enum Method {
        WithSig,
        NoSig,
    }
}

/// `Ljava/lang/String;` -> `java.lang.String`, `[I` -> `int[]`
pub fn pretty_desc(desc: &str) -> String {
    let dim = desc.chars().take_while(|c| *c == '[').count();
    let name = &desc[dim..];
    let mut output = match name.strip_prefix('L') {
        Some(class) => class.strip_suffix(';').unwrap_or(class).replace('/', "."),
        None => match name {
            "B" => "byte",
            "C" => "char",
            "D" => "double",
            "F" => "float",
            "I" => "int",
            "J" => "long",
            "S" => "short",
            "Z" => "boolean",
            "V" => "void",
            _ => name,
        }
        .to_string(),
    };
    output.push_str(&"[]".repeat(dim));
    output
}

fn flags_str(flags: u32, target: AccessTarget) -> String {
    access_flag_names(flags, target).join(" ")
}

impl<'a> DexFile<'a> {
    pub fn pretty_string_at(&self, idx: u32) -> String {
        match self.get_string_escaped(idx) {
            Ok(s) => s,
            Err(_) => format!("<<invalid-string-idx-{idx}>>"),
        }
    }

    pub fn pretty_type_at(&self, type_idx: u32) -> String {
        match self.pretty_type_opt_at(type_idx) {
            Ok(s) => s,
            Err(_) => format!("<<invalid-type-idx-{type_idx}>>"),
        }
    }

    pub fn pretty_type_opt_at(&self, type_idx: u32) -> Result<String> {
        Ok(pretty_desc(&self.get_type_desc_at(type_idx)?))
    }

    pub fn pretty_field_at(&self, field_idx: u32, opts: prettify::Field) -> String {
        match self.pretty_field_opt_at(field_idx, opts) {
            Ok(s) => s,
            Err(_) => format!("<<invalid-field-idx-{field_idx}>>"),
        }
    }

    pub fn pretty_field_opt_at(&self, field_idx: u32, opts: prettify::Field) -> Result<String> {
        let field_id = self.get_field_id(field_idx)?;
        self.pretty_field_opt(field_id, opts)
    }

    pub fn pretty_field_opt(&self, field_id: &FieldId, opts: prettify::Field) -> Result<String> {
        let mut result = String::new();
        if opts == prettify::Field::WithType {
            result.push_str(&self.pretty_type_opt_at(field_id.type_idx as u32)?);
            result.push(' ');
        }

        result.push_str(&self.pretty_type_opt_at(field_id.class_idx as u32)?);
        result.push('.');
        result.push_str(&self.get_string_escaped(field_id.name_idx)?);
        Ok(result)
    }

    pub fn pretty_method_at(&self, method_idx: u32, opts: prettify::Method) -> String {
        match self.pretty_method_opt_at(method_idx, opts) {
            Ok(s) => s,
            Err(_) => format!("<<invalid-method-idx-{method_idx}>>"),
        }
    }

    pub fn pretty_method_opt_at(&self, idx: u32, opts: prettify::Method) -> Result<String> {
        self.pretty_method_opt(self.get_method_id(idx)?, opts)
    }

    pub fn pretty_method_opt(&self, method_id: &MethodId, opts: prettify::Method) -> Result<String> {
        let mut result = String::new();
        let proto_id = match opts {
            prettify::Method::WithSig => Some(self.get_proto_id(method_id.proto_idx as u32)?),
            prettify::Method::NoSig => None,
        };

        if let Some(proto_id) = proto_id {
            result.push_str(&self.pretty_type_at(proto_id.return_type_idx));
            result.push(' ');
        }

        result.push_str(&self.pretty_type_at(method_id.class_idx as u32));
        result.push('.');
        result.push_str(&self.get_string_escaped(method_id.name_idx)?);

        if let Some(proto_id) = proto_id {
            let params = match self.get_proto_parameters(proto_id)? {
                Some(params) => params
                    .iter()
                    .map(|type_idx| self.pretty_type_at(type_idx as u32))
                    .collect::<Vec<_>>(),
                None => Vec::new(),
            };
            result.push('(');
            result.push_str(&params.join(", "));
            result.push(')');
        }
        Ok(result)
    }

    /// Renders a constant with its references resolved against this file.
    pub fn pretty_value(&self, value: &EncodedValue) -> String {
        match value {
            EncodedValue::Byte(v) => v.to_string(),
            EncodedValue::Short(v) => v.to_string(),
            EncodedValue::Char(v) => match char::from_u32(*v as u32) {
                Some(c) => format!("{c:?}"),
                None => format!("{v:#06x}"),
            },
            EncodedValue::Int(v) => v.to_string(),
            EncodedValue::Long(v) => format!("{v}L"),
            EncodedValue::Float(v) => format!("{v}f"),
            EncodedValue::Double(v) => v.to_string(),
            EncodedValue::MethodType(idx) => format!("proto@{idx}"),
            EncodedValue::MethodHandle(idx) => format!("method_handle@{idx}"),
            EncodedValue::String(idx) => format!("\"{}\"", self.pretty_string_at(*idx)),
            EncodedValue::Type(idx) => format!("{}.class", self.pretty_type_at(*idx)),
            EncodedValue::Field(idx) | EncodedValue::Enum(idx) => {
                self.pretty_field_at(*idx, prettify::Field::NoType)
            }
            EncodedValue::Method(idx) => self.pretty_method_at(*idx, prettify::Method::NoSig),
            EncodedValue::Array(array) => {
                let values: Vec<String> = array.iter().map(|v| self.pretty_value(v)).collect();
                format!("[{}]", values.join(", "))
            }
            EncodedValue::Annotation(annotation) => {
                let elements: Vec<String> = annotation
                    .elements()
                    .iter()
                    .map(|e| {
                        format!(
                            "{}={}",
                            self.pretty_string_at(e.name_idx),
                            self.pretty_value(&e.value)
                        )
                    })
                    .collect();
                format!(
                    "@{}({})",
                    self.pretty_type_at(annotation.type_idx),
                    elements.join(", ")
                )
            }
            EncodedValue::Null => "null".to_string(),
            EncodedValue::Boolean(v) => v.to_string(),
            EncodedValue::Unknown { value_type, .. } => format!("<<unknown-value-type-{value_type:#x}>>"),
        }
    }

    /// The map as a table, one row per entry in file order.
    pub fn map_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["type", "code", "count", "offset", "decoded"]);
        for item in self.map() {
            let (name, decoded) = match item.item_type() {
                Some(type_) => (
                    type_.name().to_string(),
                    self.section(type_)
                        .map(Section::len)
                        .unwrap_or_default()
                        .to_string(),
                ),
                None => ("<unknown>".to_string(), "skipped".to_string()),
            };
            table.add_row(vec![
                name,
                format!("{:#06x}", item.type_),
                item.size.to_string(),
                format!("{:#x}", item.off),
                decoded,
            ]);
        }
        table
    }

    /// Writes the decoded file as an indented text tree.
    pub fn dump<W: Write>(&self, out: &mut W) -> fmt::Result {
        let header = self.header();
        writeln!(
            out,
            "{} (version {:03}, {} bytes, checksum {:#010x})",
            self.get_location(),
            header.get_version(),
            header.file_size,
            header.checksum
        )?;
        writeln!(out, "{}", self.map_table())?;
        for diagnostic in self.diagnostics() {
            writeln!(out, "warning at {:#x}: {:?}", diagnostic.offset, diagnostic.kind)?;
        }
        for idx in 0..self.num_class_defs() {
            self.dump_class(out, idx)?;
        }
        Ok(())
    }

    pub fn dump_class<W: Write>(&self, out: &mut W, idx: u32) -> fmt::Result {
        let class_def = match self.get_class_def(idx) {
            Ok(class_def) => class_def,
            Err(err) => return writeln!(out, "class #{idx}: {err}"),
        };
        writeln!(
            out,
            "class #{idx}: {} [{}]",
            self.pretty_type_at(class_def.class_idx),
            flags_str(class_def.access_flags, AccessTarget::Class)
        )?;
        if class_def.has_superclass() {
            writeln!(out, "  extends {}", self.pretty_type_at(class_def.superclass_idx))?;
        }
        if let Some(source_file) = class_def.source_file() {
            writeln!(out, "  source file: {}", self.pretty_string_at(source_file))?;
        }
        match self.get_interfaces_list(class_def) {
            Ok(Some(interfaces)) => {
                for type_idx in interfaces.iter() {
                    writeln!(out, "  implements {}", self.pretty_type_at(type_idx as u32))?;
                }
            }
            Ok(None) => {}
            Err(err) => writeln!(out, "  interfaces: {err}")?,
        }

        self.dump_members(out, class_def)?;

        match self.get_static_values(class_def) {
            Ok(Some(values)) => {
                for (i, value) in values.value.iter().enumerate() {
                    writeln!(out, "  static value #{i}: {}", self.pretty_value(value))?;
                }
            }
            Ok(None) => {}
            Err(err) => writeln!(out, "  static values: {err}")?,
        }

        match self.class_annotations(class_def) {
            Ok(accessor) => match accessor.get_class_annotations() {
                Ok(items) => {
                    for item in items {
                        let annotation = EncodedValue::Annotation(item.annotation.clone());
                        writeln!(out, "  annotation {}", self.pretty_value(&annotation))?;
                    }
                }
                Err(err) => writeln!(out, "  annotations: {err}")?,
            },
            Err(err) => writeln!(out, "  annotations: {err}")?,
        }
        Ok(())
    }

    fn dump_members<W: Write>(&self, out: &mut W, class_def: &ClassDef) -> fmt::Result {
        let class_data = match self.get_class_data(class_def) {
            Ok(Some(class_data)) => class_data,
            Ok(None) => return Ok(()),
            Err(err) => return writeln!(out, "  class data: {err}"),
        };
        let accessor = class_data.accessor();
        for field in accessor.get_fields() {
            match field {
                Ok(field) => writeln!(
                    out,
                    "  field {} [{}]",
                    self.pretty_field_at(field.index, prettify::Field::WithType),
                    field.flag_names().join(" ")
                )?,
                Err(err) => return writeln!(out, "  field: {err}"),
            }
        }
        for method in accessor.get_methods() {
            let method = match method {
                Ok(method) => method,
                Err(err) => return writeln!(out, "  method: {err}"),
            };
            writeln!(
                out,
                "  method {} [{}]",
                self.pretty_method_at(method.index, prettify::Method::WithSig),
                method.flag_names().join(" ")
            )?;
            match self.get_code_item(method.code_offset) {
                Ok(Some(code)) => {
                    writeln!(
                        out,
                        "    code: {} register(s), {} unit(s), {} try item(s)",
                        code.registers_size,
                        code.insns_size,
                        code.tries.len()
                    )?;
                    for try_item in &code.tries {
                        let handlers = match code.handler_for(try_item) {
                            Ok(handler) => handler
                                .iter()
                                .map(|h| match h.is_catch_all {
                                    true => format!("<any> -> {:#x}", h.address),
                                    false => format!(
                                        "{} -> {:#x}",
                                        self.pretty_type_at(h.type_idx as u32),
                                        h.address
                                    ),
                                })
                                .collect::<Vec<_>>()
                                .join(", "),
                            Err(err) => err.to_string(),
                        };
                        writeln!(
                            out,
                            "    try {:#x}..{:#x}: {handlers}",
                            try_item.start_addr,
                            try_item.end_addr()
                        )?;
                    }
                    if let Ok(Some(debug_info)) = self.get_debug_info(code.debug_info_off) {
                        if let Ok(positions) = debug_info.positions() {
                            for position in positions {
                                writeln!(
                                    out,
                                    "    line {} at {:#x}",
                                    position.line, position.address
                                )?;
                            }
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => writeln!(out, "    code: {err}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_desc() {
        assert_eq!(pretty_desc("Ljava/lang/String;"), "java.lang.String");
        assert_eq!(pretty_desc("[[I"), "int[][]");
        assert_eq!(pretty_desc("V"), "void");
        assert_eq!(pretty_desc("[Lfoo/Bar;"), "foo.Bar[]");
        assert_eq!(pretty_desc(""), "");
    }
}
