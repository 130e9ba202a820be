//! Benchmarks for tag decoding through the interpreter factory

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spooltag_rs::{DecryptedScanData, InterpreterFactory, TagFormat};

fn padded(text: &[u8]) -> [u8; 16] {
    let mut b = [0u8; 16];
    b[..text.len()].copy_from_slice(text);
    b
}

fn bambu_scan(format: TagFormat) -> DecryptedScanData {
    let mut ids = [0u8; 16];
    ids[..8].copy_from_slice(b"A00-K000");
    ids[8..].copy_from_slice(b"GFA00000");
    let mut color = [0u8; 16];
    color[..4].copy_from_slice(&[0xC1, 0x2E, 0x1F, 0xFF]);
    color[4..6].copy_from_slice(&250u16.to_le_bytes());
    color[8..16].copy_from_slice(&1.75f64.to_le_bytes());

    DecryptedScanData::builder("5A3C9B21")
        .mifare_classic_1k()
        .tag_format(format)
        .block(1, &ids)
        .block(2, &padded(b"PLA"))
        .block(4, &padded(b"PLA Basic"))
        .block(5, &color)
        .block(12, &padded(b"2024_03_09_14_22"))
        .build()
}

fn creality_scan() -> DecryptedScanData {
    let mut raw = [0u8; 48];
    let record = b"AB124 24C15 1B3D 01001 #FF0000 000123";
    raw[..record.len()].copy_from_slice(record);

    let mut builder = DecryptedScanData::builder("1D2E3F40").tag_format(TagFormat::Creality);
    for (i, chunk) in raw.chunks(16).enumerate() {
        builder = builder.block(4 + i as u8, &padded(chunk));
    }
    builder.build()
}

fn opentag_scan() -> DecryptedScanData {
    let mut buf = [0u8; 0x60];
    buf[0x10..0x12].copy_from_slice(b"OT");
    buf[0x14..0x1D].copy_from_slice(b"Polymaker");
    buf[0x24..0x27].copy_from_slice(b"PLA");
    buf[0x4E..0x51].copy_from_slice(&[0x1E, 0x3A, 0x8A]);
    buf[0x53..0x55].copy_from_slice(&1000u16.to_be_bytes());

    let mut builder = DecryptedScanData::builder("04DEAD01").tag_format(TagFormat::OpenTag);
    for (i, chunk) in buf.chunks(16).enumerate() {
        builder = builder.block(i as u8, &padded(chunk));
    }
    builder.build()
}

fn benchmark_formats(c: &mut Criterion) {
    let factory = InterpreterFactory::with_defaults();
    let mut group = c.benchmark_group("interpret");

    let bambu = bambu_scan(TagFormat::BambuLab);
    let creality = creality_scan();
    let opentag = opentag_scan();

    group.bench_function("bambu", |b| b.iter(|| black_box(factory.interpret(&bambu))));
    group.bench_function("creality", |b| b.iter(|| black_box(factory.interpret(&creality))));
    group.bench_function("opentag", |b| b.iter(|| black_box(factory.interpret(&opentag))));

    group.finish();
}

fn benchmark_detection(c: &mut Criterion) {
    let factory = InterpreterFactory::with_defaults();
    let untagged = bambu_scan(TagFormat::Unknown);

    c.bench_function("interpret_unknown_format", |b| {
        b.iter(|| black_box(factory.interpret(black_box(&untagged))))
    });
}

criterion_group!(benches, benchmark_formats, benchmark_detection);
criterion_main!(benches);
