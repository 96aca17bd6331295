//! Criterion benchmarks for the tracking pipeline.
//!
//! Run with: cargo bench
//! Run specific group: cargo bench -- association

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::f64::consts::PI;

use boxtrack::association::{match_objects, GatedHungarianMatcher};
use boxtrack::classification::ClassificationData;
use boxtrack::{DistanceType, MultipleObjectTracker, TrackedObject, TrackerConfig};

fn ring_objects(count: usize, radius: f64, data: &ClassificationData) -> Vec<TrackedObject> {
    (0..count)
        .map(|k| {
            let s = k as f64 / count as f64;
            let mut object = TrackedObject::default();
            object.x = radius * (s * 2.0 * PI).cos();
            object.y = radius * (s * 2.0 * PI).sin();
            object.width = 1.0;
            object.length = 2.0;
            object.classification = data.classification("1", 1.0).unwrap();
            object
        })
        .collect()
}

fn bench_association(c: &mut Criterion) {
    let data =
        ClassificationData::new((1..=11).map(|n| n.to_string()).collect::<Vec<String>>()).unwrap();

    let mut group = c.benchmark_group("association");
    for &count in &[10usize, 50, 100] {
        let tracks = ring_objects(count, 100.0, &data);
        let mut measurements = tracks.clone();
        for m in measurements.iter_mut() {
            m.x += 0.1;
            m.y += 0.1;
        }

        group.bench_with_input(BenchmarkId::new("euclidean", count), &count, |b, _| {
            let mut matcher = GatedHungarianMatcher::new();
            b.iter(|| {
                match_objects(
                    &mut matcher,
                    &tracks,
                    &measurements,
                    DistanceType::Euclidean,
                    5.0,
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_full_frame(c: &mut Criterion) {
    let data =
        ClassificationData::new((1..=11).map(|n| n.to_string()).collect::<Vec<String>>()).unwrap();

    let mut group = c.benchmark_group("full_frame");
    group.sample_size(20);

    for &count in &[10usize, 100] {
        group.bench_with_input(BenchmarkId::new("ring", count), &count, |b, _| {
            b.iter(|| {
                let mut tracker = MultipleObjectTracker::new(
                    TrackerConfig::default(),
                    DistanceType::MCEMahalanobis,
                    5.0,
                );
                let mut objects = ring_objects(count, 100.0, &data);

                for k in 0..20u32 {
                    for object in objects.iter_mut() {
                        object.x += 0.1;
                        object.y += 0.1;
                    }
                    tracker.track(objects.clone(), k as f64 * 0.01, 0.5).unwrap();
                }
                tracker.tracks().len()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_association, bench_full_frame);
criterion_main!(benches);
