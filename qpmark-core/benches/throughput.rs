use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use qpmark_core::learned::REFERENCE_PROFILE_LEN;
use qpmark_core::{
    EmbeddingEngine, ExtractionConfig, Extractor, FeatureExtractor, Frame, FrameAnalysis,
    ModelProfile, Payload, StatisticalDetector, WatermarkConfig,
};

fn make_test_frame(index: u32, width: u32, height: u32) -> Frame {
    Frame::from_fn(index, width, height, move |x, y| {
        let v = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503) ^ index;
        (v >> 9) as u8
    })
}

fn bench_schedule(c: &mut Criterion) {
    let config = WatermarkConfig {
        payload: Payload::new(0xDEAD_BEEF),
        seed: 12345,
        block_density: 0.3,
        temporal_period: 10,
        ..WatermarkConfig::default()
    };
    let mut engine = EmbeddingEngine::new(config.clone());
    engine.bind(1920, 1080).unwrap();

    c.bench_function("bind_1080p", |b| {
        b.iter(|| {
            let mut engine = EmbeddingEngine::new(config.clone());
            engine.bind(black_box(1920), black_box(1080)).unwrap();
        });
    });

    let frame = vec![0u8; 1920 * 1080 * 3];
    c.bench_function("apply_1080p", |b| {
        let mut index = 0u32;
        b.iter(|| {
            index = index.wrapping_add(1);
            engine.apply(black_box(&frame), index).unwrap();
        });
    });
}

fn bench_extract(c: &mut Criterion) {
    let frame = make_test_frame(0, 1280, 720);
    for size in [256u32, 720] {
        let extractor = FeatureExtractor::new(size);
        c.bench_function(&format!("extract_720p_at_{size}"), |b| {
            b.iter(|| extractor.extract(black_box(&frame)));
        });
    }
}

fn bench_detect(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(128);
    let analyses: Vec<FrameAnalysis> = (0..60)
        .map(|i| extractor.extract(&make_test_frame(i, 320, 240)))
        .collect();

    c.bench_function("statistical_60_frames", |b| {
        let detector = StatisticalDetector::new();
        b.iter(|| detector.detect(black_box(&analyses)));
    });

    let session = Extractor::new(
        ExtractionConfig::default(),
        Arc::new(ModelProfile::reference(REFERENCE_PROFILE_LEN)),
    );
    c.bench_function("fused_60_frames", |b| {
        b.iter(|| session.detect_watermark(black_box(&analyses)));
    });
}

criterion_group!(benches, bench_schedule, bench_extract, bench_detect);
criterion_main!(benches);
