//! Benchmarks for frame record encoding and archive appends

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kwa_archive::{
    ArchiveConfig, ArchiveSession, FrameRecord, FrameRecordEncoder, GeoPoint, GeoPolygon,
    Homography, ImageView, JpegCompressor, Timestamp,
};
use tempfile::TempDir;

const SIZES: [(usize, usize); 3] = [(320, 240), (640, 480), (1280, 720)];

fn test_pixels(width: usize, height: usize) -> Vec<u8> {
    (0..width * height * 3)
        .map(|v| ((v / 3 % width) ^ (v / 3 / width)) as u8)
        .collect()
}

fn test_record(pixels: &[u8], width: usize, height: usize, n: i64) -> FrameRecord<'_> {
    FrameRecord {
        timestamp: Timestamp::new(n as f64 / 30.0, n),
        image: ImageView::packed(pixels, width, height, 3).unwrap(),
        homography: Homography::identity(n),
        corners: GeoPolygon::new(
            GeoPoint::new(-77.01, 38.90),
            GeoPoint::new(-77.00, 38.90),
            GeoPoint::new(-77.00, 38.89),
            GeoPoint::new(-77.01, 38.89),
        ),
        gsd: 0.5,
    }
}

fn benchmark_encode_raw(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_raw");
    let jpeg = JpegCompressor::default();
    let encoder = FrameRecordEncoder::new(&jpeg);

    for &(w, h) in SIZES.iter() {
        let pixels = test_pixels(w, h);
        group.throughput(Throughput::Bytes(pixels.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", w, h)),
            &pixels,
            |b, pixels| {
                let record = test_record(pixels, w, h, 0);
                b.iter(|| black_box(encoder.encode_to_vec(&record, true, 2).unwrap()));
            },
        );
    }

    group.finish();
}

fn benchmark_encode_jpeg(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_jpeg");

    for quality in [50u8, 75, 95] {
        let jpeg = JpegCompressor::new(quality);
        let encoder = FrameRecordEncoder::new(&jpeg);
        let pixels = test_pixels(640, 480);
        group.bench_with_input(BenchmarkId::from_parameter(quality), &pixels, |b, pixels| {
            let record = test_record(pixels, 640, 480, 0);
            b.iter(|| black_box(encoder.encode_to_vec(&record, true, 3).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_encode_meta(c: &mut Criterion) {
    let jpeg = JpegCompressor::default();
    let encoder = FrameRecordEncoder::new(&jpeg);
    let pixels = test_pixels(640, 480);
    let record = test_record(&pixels, 640, 480, 0);

    c.bench_function("encode_meta", |b| {
        b.iter(|| black_box(encoder.encode_to_vec(&record, false, 2).unwrap()));
    });
}

fn benchmark_session_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_append_raw");

    for &(w, h) in SIZES.iter() {
        let pixels = test_pixels(w, h);
        group.throughput(Throughput::Bytes(pixels.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", w, h)),
            &pixels,
            |b, pixels| {
                let dir = TempDir::new().unwrap();
                let config = ArchiveConfig::new("bench")
                    .with_output_directory(dir.path())
                    .with_compress_image(false);
                let mut session = ArchiveSession::open(config).unwrap();
                let mut n = 0i64;
                b.iter(|| {
                    let record = test_record(pixels, w, h, n);
                    n += 1;
                    black_box(session.write_frame(&record).unwrap());
                });
                session.close().unwrap();
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_encode_raw,
    benchmark_encode_jpeg,
    benchmark_encode_meta,
    benchmark_session_append
);

criterion_main!(benches);
