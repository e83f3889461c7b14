use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dexdecode::file::{DecodeOptions, DexFile, EncodedValue, VerifyPreset};
use dexdecode::leb128::encode_leb128;

/// A header followed by a single string_data section of `count` strings.
fn synthetic_file(count: u32) -> Vec<u8> {
    let mut data = vec![0u8; 0x70];
    data[..8].copy_from_slice(b"dex\n035\0");
    data[36..40].copy_from_slice(&0x70u32.to_le_bytes());
    data[40..44].copy_from_slice(&0x12345678u32.to_le_bytes());

    for i in 0..count {
        let s = format!("Lcom/example/Class{i};");
        data.extend(encode_leb128(s.len() as u32));
        data.extend(s.as_bytes());
        data.push(0);
    }
    while data.len() % 4 != 0 {
        data.push(0);
    }

    let map_off = data.len() as u32;
    data.extend(2u32.to_le_bytes());
    for (type_code, size, off) in [(0x2002u16, count, 0x70u32), (0x1000, 1, map_off)] {
        data.extend(type_code.to_le_bytes());
        data.extend(0u16.to_le_bytes());
        data.extend(size.to_le_bytes());
        data.extend(off.to_le_bytes());
    }

    let file_size = data.len() as u32;
    data[32..36].copy_from_slice(&file_size.to_le_bytes());
    data[52..56].copy_from_slice(&map_off.to_le_bytes());
    let checksum = adler32::RollingAdler32::from_buffer(&data[12..]).hash();
    data[8..12].copy_from_slice(&checksum.to_le_bytes());
    data
}

fn decode_file(c: &mut Criterion) {
    let data = synthetic_file(2000);
    let options = DecodeOptions::default();
    c.bench_function("decode_file", |b| {
        b.iter(|| {
            let dex = DexFile::from_bytes(black_box(&data), &options).unwrap();
            assert_eq!(dex.sections().len(), 2);
        })
    });
}

fn decode_and_verify_file(c: &mut Criterion) {
    let data = synthetic_file(2000);
    let options = DecodeOptions::new().verify(VerifyPreset::All);
    c.bench_function("decode_and_verify_file", |b| {
        b.iter(|| DexFile::from_bytes(black_box(&data), &options).unwrap())
    });
}

fn decode_nested_values(c: &mut Criterion) {
    // array of 256 arrays holding one negative int each
    let mut data = vec![0x1c];
    data.extend(encode_leb128(256));
    for i in 0..256 {
        data.push(0x1c);
        data.extend(encode_leb128(1));
        data.push(0x04 | (3 << 5));
        data.extend((-(i as i32) - 1).to_le_bytes());
    }

    c.bench_function("decode_nested_values", |b| {
        b.iter(|| EncodedValue::from_bytes(black_box(&data)).unwrap())
    });
}

criterion_group!(benches, decode_file, decode_and_verify_file, decode_nested_values);
criterion_main!(benches);
