//! Performance benchmarks for the track geometry pass
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::Point;
use tour_track_render::{MapPosition, TourPositions, TrackConfig, compute_track_bucket};

/// Generate a realistic wandering track with the specified number of points
fn generate_track(num_points: usize, base_lat: f64, base_lon: f64) -> std::sync::Arc<TourPositions> {
    let mut points = Vec::with_capacity(num_points);
    let mut colors = Vec::with_capacity(num_points);

    for i in 0..num_points {
        let t = i as f64 / num_points as f64;
        let lat = base_lat + t * 0.1 + (t * 50.0).sin() * 0.001;
        let lon = base_lon + t * 0.1 + (t * 30.0).cos() * 0.001;
        points.push(Point::new(lon, lat));
        colors.push(0xFF336699u32);
    }

    TourPositions::new(points, colors, vec![0]).unwrap()
}

fn bench_geometry_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometry_pass");

    let config = TrackConfig::default();

    for &num_points in &[1_000usize, 10_000, 100_000] {
        let positions = generate_track(num_points, 47.0, 11.0);
        let viewport = MapPosition::centered_on(47.05, 11.05, 12);

        group.throughput(Throughput::Elements(num_points as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_points),
            &positions,
            |b, positions| {
                b.iter(|| compute_track_bucket(positions, viewport, &config));
            },
        );
    }

    group.finish();
}

fn bench_zoom_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometry_pass_zoom");

    let config = TrackConfig::default();
    let positions = generate_track(50_000, 47.0, 11.0);

    for &zoom_level in &[4u8, 10, 16] {
        let viewport = MapPosition::centered_on(47.05, 11.05, zoom_level);

        group.bench_with_input(
            BenchmarkId::from_parameter(zoom_level),
            &viewport,
            |b, viewport| {
                b.iter(|| compute_track_bucket(&positions, *viewport, &config));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_geometry_pass, bench_zoom_levels);
criterion_main!(benches);
