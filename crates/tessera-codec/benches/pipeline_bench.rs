//! Benchmarks for the chunked pipeline with the reference quantizer.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_codec::{crossfade_weights, AudioBuffer, Pipeline, PipelineConfig, ScalarRvq};

/// Ten seconds of stereo sine at 44.1 kHz.
fn test_audio() -> AudioBuffer {
    let len = 441_000;
    let tone = |freq: f32| -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / 44100.0).sin())
            .collect()
    };
    AudioBuffer::new(vec![tone(440.0), tone(660.0)], 44100).unwrap()
}

fn pipeline(workers: usize, hop: usize) -> Pipeline {
    let config = PipelineConfig {
        hop: Some(hop),
        workers,
        ..Default::default()
    };
    Pipeline::new(Box::new(ScalarRvq::dac_44khz()), config).unwrap()
}

fn bench_compress(c: &mut Criterion) {
    let audio = test_audio();
    let mut group = c.benchmark_group("compress_10s_stereo");
    group.sample_size(20);
    for workers in [1usize, 2, 4] {
        let p = pipeline(workers, 44100);
        group.bench_with_input(BenchmarkId::new("workers", workers), &p, |b, p| {
            b.iter(|| black_box(p.compress(black_box(&audio)).unwrap()));
        });
    }
    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let audio = test_audio();
    let mut group = c.benchmark_group("decompress_10s_stereo");
    group.sample_size(20);
    // no overlap vs. 25% overlap
    for hop in [44100usize, 33075] {
        let p = pipeline(4, hop);
        let container = p.compress(&audio).unwrap();
        group.bench_with_input(BenchmarkId::new("hop", hop), &container, |b, container| {
            b.iter(|| black_box(p.decompress(black_box(container)).unwrap()));
        });
    }
    group.finish();
}

fn bench_crossfade_weights(c: &mut Criterion) {
    c.bench_function("crossfade_weights_11025", |b| {
        b.iter(|| black_box(crossfade_weights(black_box(11025))));
    });
}

criterion_group!(
    benches,
    bench_compress,
    bench_decompress,
    bench_crossfade_weights
);
criterion_main!(benches);
