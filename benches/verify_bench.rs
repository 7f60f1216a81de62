use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sf3::format::image::{ChannelLayout, ImageBuilder, PixelFormat};
use sf3::format::log::{LogBuilder, LogRecord};
use sf3::format::table::{ColumnType, TableBuilder};
use sf3::{decode, verify, verify_with, VerifyOptions};

fn image_1mb() -> Vec<u8> {
    let mut b = ImageBuilder::new(512, 512, ChannelLayout::Rgba, PixelFormat::Uint8);
    b.push_pixels(&vec![42u8; 512 * 512 * 4]);
    b.finish().unwrap()
}

fn log_4096() -> Vec<u8> {
    let mut b = LogBuilder::new(1_700_000_000).chunk_capacity(256);
    for i in 0..4096u64 {
        if i > 0 && i % 256 == 0 {
            b.begin_chunk(256).unwrap();
        }
        b.entry(&LogRecord::new(i, 0, "bench", "loop", "iteration finished")).unwrap();
    }
    b.finish().unwrap()
}

fn table_10k() -> Vec<u8> {
    let mut b = TableBuilder::new();
    b.column("id", ColumnType::Uint64, 8).unwrap();
    b.column("value", ColumnType::Float64, 8).unwrap();
    b.column("label", ColumnType::String, 16).unwrap();
    let mut row = vec![0u8; 32];
    for i in 0..10_000u64 {
        row[..8].copy_from_slice(&i.to_le_bytes());
        b.row(&row).unwrap();
    }
    b.finish().unwrap()
}

fn bench_verify(c: &mut Criterion) {
    let image = image_1mb();
    let log = log_4096();

    c.bench_function("verify_image_1mb", |b| b.iter(|| verify(black_box(&image)).unwrap()));
    c.bench_function("verify_image_1mb_structural", |b| {
        b.iter(|| verify_with(black_box(&image), &VerifyOptions::structural()).unwrap())
    });
    c.bench_function("verify_log_4096", |b| b.iter(|| verify(black_box(&log)).unwrap()));
}

fn bench_decode(c: &mut Criterion) {
    let log = log_4096();
    let table = table_10k();

    c.bench_function("decode_log_4096", |b| b.iter(|| decode(black_box(&log)).unwrap().size()));
    c.bench_function("decode_table_10k", |b| b.iter(|| decode(black_box(&table)).unwrap().size()));
}

criterion_group!(benches, bench_verify, bench_decode);
criterion_main!(benches);
