#![allow(dead_code)]

use adler32::RollingAdler32;
use dexdecode::leb128::{encode_leb128, encode_sleb128};

pub const STRINGS: &[&str] = &[
    "<init>",
    "I",
    "LFoo;",
    "Lanno/Marker;",
    "Ljava/lang/Object;",
    "Ljava/lang/Runnable;",
    "V",
    "VI",
    "count",
    "Foo.java",
    "name",
    "run",
    "value",
];

/// descriptor string index of every type id
pub const TYPES: &[u32] = &[1, 2, 3, 4, 5, 6];

pub const TYPE_INT: u16 = 0;
pub const TYPE_FOO: u16 = 1;
pub const TYPE_MARKER: u16 = 2;
pub const TYPE_OBJECT: u16 = 3;
pub const TYPE_RUNNABLE: u16 = 4;
pub const TYPE_VOID: u16 = 5;

/// Offsets of everything placed into the sample file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub string_ids: u32,
    pub type_ids: u32,
    pub proto_ids: u32,
    pub field_ids: u32,
    pub method_ids: u32,
    pub class_defs: u32,
    pub data: u32,
    pub code_item: u32,
    pub interfaces: u32,
    pub run_params: u32,
    pub annotation_set: u32,
    pub annotations_directory: u32,
    pub class_data: u32,
    pub string_data: Vec<u32>,
    pub debug_info: u32,
    pub annotation: u32,
    pub static_values: u32,
    pub map: u32,
    pub file_size: u32,
}

/// Builds a small but complete DEX file holding one class:
///
/// ```text
/// public class Foo extends Object implements Runnable {
///     public static int count = 7;
///     private int name;
///     @Marker(value = 42) public Foo() { ... }   // with a try/catch
///     public void run(int) { }                    // abstract-like, no code
/// }
/// ```
///
/// The class itself is annotated with `@Marker(value = 42)` as well.
#[derive(Debug, Clone, Default)]
pub struct SampleDex {
    map_order: Option<Vec<usize>>,
    omitted: Vec<u16>,
    extra: Vec<(u16, u32, u32)>,
}

impl SampleDex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits the map entries in the given permutation of the default order.
    pub fn map_order(mut self, order: Vec<usize>) -> Self {
        self.map_order = Some(order);
        self
    }

    /// Leaves the entry of type `type_code` out of the map.
    pub fn omit(mut self, type_code: u16) -> Self {
        self.omitted.push(type_code);
        self
    }

    /// Appends a raw map entry after the regular ones.
    pub fn extra_entry(mut self, type_code: u16, size: u32, off: u32) -> Self {
        self.extra.push((type_code, size, off));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    /// The variable-length class data depends on final offsets, so the
    /// layout is rebuilt until it settles.
    pub fn build_with_layout(&self) -> (Vec<u8>, Layout) {
        let mut layout = Layout::default();
        loop {
            let (data, next) = self.emit(&layout);
            if next == layout {
                return (data, layout);
            }
            layout = next;
        }
    }

    fn emit(&self, prev: &Layout) -> (Vec<u8>, Layout) {
        let mut out = vec![0u8; 0x70];
        let mut layout = Layout::default();

        layout.string_ids = out.len() as u32;
        for off in pad_to(&prev.string_data, STRINGS.len()) {
            put_u32(&mut out, off);
        }

        layout.type_ids = out.len() as u32;
        for desc in TYPES {
            put_u32(&mut out, *desc);
        }

        layout.proto_ids = out.len() as u32;
        // ()V
        put_u32(&mut out, 6);
        put_u32(&mut out, TYPE_VOID as u32);
        put_u32(&mut out, 0);
        // (I)V
        put_u32(&mut out, 7);
        put_u32(&mut out, TYPE_VOID as u32);
        put_u32(&mut out, prev.run_params);

        layout.field_ids = out.len() as u32;
        for name in [8u32, 10] {
            put_u16(&mut out, TYPE_FOO);
            put_u16(&mut out, TYPE_INT);
            put_u32(&mut out, name);
        }

        layout.method_ids = out.len() as u32;
        for (proto, name) in [(0u16, 0u32), (1, 11)] {
            put_u16(&mut out, TYPE_FOO);
            put_u16(&mut out, proto);
            put_u32(&mut out, name);
        }

        layout.class_defs = out.len() as u32;
        for value in [
            TYPE_FOO as u32,
            0x0001,
            TYPE_OBJECT as u32,
            prev.interfaces,
            9,
            prev.annotations_directory,
            prev.class_data,
            prev.static_values,
        ] {
            put_u32(&mut out, value);
        }

        layout.data = out.len() as u32;

        // code_item: odd insns with one try, so padding is present
        align4(&mut out);
        layout.code_item = out.len() as u32;
        put_u16(&mut out, 1); // registers
        put_u16(&mut out, 1); // ins
        put_u16(&mut out, 0); // outs
        put_u16(&mut out, 1); // tries
        put_u32(&mut out, prev.debug_info);
        put_u32(&mut out, 3);
        for insn in [0x0000u16, 0x0000, 0x000e] {
            put_u16(&mut out, insn);
        }
        put_u16(&mut out, 0); // padding
        put_u32(&mut out, 0); // start_addr
        put_u16(&mut out, 2); // insn_count
        put_u16(&mut out, 1); // handler_off
        out.extend(encode_leb128(1));
        out.extend(encode_sleb128(-1));
        out.extend(encode_leb128(TYPE_OBJECT as u32));
        out.extend(encode_leb128(2));
        out.extend(encode_leb128(2)); // catch-all

        // type lists
        align4(&mut out);
        layout.interfaces = out.len() as u32;
        put_u32(&mut out, 1);
        put_u16(&mut out, TYPE_RUNNABLE);
        align4(&mut out);
        layout.run_params = out.len() as u32;
        put_u32(&mut out, 1);
        put_u16(&mut out, TYPE_INT);

        align4(&mut out);
        layout.annotation_set = out.len() as u32;
        put_u32(&mut out, 1);
        put_u32(&mut out, prev.annotation);

        layout.annotations_directory = out.len() as u32;
        put_u32(&mut out, prev.annotation_set);
        put_u32(&mut out, 0); // fields
        put_u32(&mut out, 1); // methods
        put_u32(&mut out, 0); // parameters
        put_u32(&mut out, 0); // <init>
        put_u32(&mut out, prev.annotation_set);

        layout.class_data = out.len() as u32;
        for count in [1, 1, 1, 1] {
            out.extend(encode_leb128(count));
        }
        // static count, private name
        for (diff, flags) in [(0, 0x0009), (1, 0x0002)] {
            out.extend(encode_leb128(diff));
            out.extend(encode_leb128(flags));
        }
        // public constructor <init>, public abstract run
        for (diff, flags, code) in [(0, 0x10001, prev.code_item), (1, 0x0401, 0)] {
            out.extend(encode_leb128(diff));
            out.extend(encode_leb128(flags));
            out.extend(encode_leb128(code));
        }

        for s in STRINGS {
            layout.string_data.push(out.len() as u32);
            out.extend(encode_leb128(s.len() as u32));
            out.extend(s.as_bytes());
            out.push(0);
        }

        layout.debug_info = out.len() as u32;
        out.extend(encode_leb128(10)); // line_start
        out.extend(encode_leb128(0)); // parameters_size
        out.push(0x07); // DBG_SET_PROLOGUE_END
        out.push(0x0e); // address +0, line +0
        out.push(0x2d); // address +2, line +1
        out.push(0x00);

        layout.annotation = out.len() as u32;
        out.push(0x01); // RUNTIME
        out.extend(encode_leb128(TYPE_MARKER as u32));
        out.extend(encode_leb128(1));
        out.extend(encode_leb128(12)); // "value"
        out.extend([0x04, 42]); // INT, one byte

        layout.static_values = out.len() as u32;
        out.extend(encode_leb128(1));
        out.extend([0x04, 7]);

        align4(&mut out);
        layout.map = out.len() as u32;
        let entries = self.map_entries(&layout);
        put_u32(&mut out, entries.len() as u32);
        for (type_code, size, off) in entries {
            put_u16(&mut out, type_code);
            put_u16(&mut out, 0);
            put_u32(&mut out, size);
            put_u32(&mut out, off);
        }

        layout.file_size = out.len() as u32;
        write_header(&mut out, &layout);
        fix_checksum(&mut out);
        (out, layout)
    }

    fn map_entries(&self, layout: &Layout) -> Vec<(u16, u32, u32)> {
        let mut entries = default_map(layout);
        if let Some(order) = &self.map_order {
            entries = order.iter().map(|i| entries[*i]).collect();
        }
        entries.retain(|(type_code, _, _)| !self.omitted.contains(type_code));
        entries.extend(self.extra.iter().copied());
        entries
    }
}

pub fn default_map(layout: &Layout) -> Vec<(u16, u32, u32)> {
    vec![
        (0x0000, 1, 0),
        (0x0001, STRINGS.len() as u32, layout.string_ids),
        (0x0002, TYPES.len() as u32, layout.type_ids),
        (0x0003, 2, layout.proto_ids),
        (0x0004, 2, layout.field_ids),
        (0x0005, 2, layout.method_ids),
        (0x0006, 1, layout.class_defs),
        (0x2001, 1, layout.code_item),
        (0x1001, 2, layout.interfaces),
        (0x1003, 1, layout.annotation_set),
        (0x2006, 1, layout.annotations_directory),
        (0x2000, 1, layout.class_data),
        (0x2002, STRINGS.len() as u32, layout.string_data.first().copied().unwrap_or(0)),
        (0x2003, 1, layout.debug_info),
        (0x2004, 1, layout.annotation),
        (0x2005, 1, layout.static_values),
        (0x1000, 1, layout.map),
    ]
}

pub const MAP_LEN: usize = 17;

fn write_header(out: &mut [u8], layout: &Layout) {
    out[..8].copy_from_slice(b"dex\n035\0");
    set_u32(out, 32, layout.file_size);
    set_u32(out, 36, 0x70);
    set_u32(out, 40, 0x12345678);
    set_u32(out, 52, layout.map);
    let tables = [
        (STRINGS.len() as u32, layout.string_ids),
        (TYPES.len() as u32, layout.type_ids),
        (2, layout.proto_ids),
        (2, layout.field_ids),
        (2, layout.method_ids),
        (1, layout.class_defs),
    ];
    for (i, (size, off)) in tables.into_iter().enumerate() {
        set_u32(out, 56 + i * 8, size);
        set_u32(out, 60 + i * 8, off);
    }
    set_u32(out, 104, layout.file_size - layout.data);
    set_u32(out, 108, layout.data);
}

/// Recomputes the Adler-32 checksum after a test patched the buffer.
pub fn fix_checksum(out: &mut [u8]) {
    let checksum = RollingAdler32::from_buffer(&out[12..]).hash();
    set_u32(out, 8, checksum);
}

pub fn set_u32(out: &mut [u8], pos: usize, value: u32) {
    out[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend(value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend(value.to_le_bytes());
}

fn align4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn pad_to(values: &[u32], len: usize) -> Vec<u32> {
    let mut values = values.to_vec();
    values.resize(len, 0);
    values
}
