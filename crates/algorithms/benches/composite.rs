//! Benchmarks for monthly compositing and reduction

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vegmon_algorithms::composite::median_composite;
use vegmon_algorithms::imagery::ndvi;
use vegmon_algorithms::statistics::reduce_region;
use vegmon_core::{BBox, GridSpec, Raster};

fn grid(size: usize) -> GridSpec {
    let mut g = GridSpec::geographic(&BBox::new(-74.6, 10.8, -74.5, 10.9), 30.0).unwrap();
    g.rows = size;
    g.cols = size;
    g
}

fn create_layer(grid: &GridSpec, seed: usize) -> Raster<f64> {
    let mut r = Raster::on_grid(grid, 0.0);
    for ((row, col), v) in r.data_mut().indexed_iter_mut() {
        let h = (row * 7 + col * 13 + seed * 29) % 200;
        *v = if h < 10 { f64::NAN } else { h as f64 / 200.0 };
    }
    r
}

fn bench_median(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite/median");
    for size in [256, 512, 1024] {
        let g = grid(size);
        // a busy month: 12 acquisitions
        let layers: Vec<_> = (0..12).map(|s| create_layer(&g, s)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| median_composite(black_box(&layers), &g).unwrap())
        });
    }
    group.finish();
}

fn bench_ndvi(c: &mut Criterion) {
    let mut group = c.benchmark_group("imagery/ndvi");
    for size in [512, 1024, 2048] {
        let g = grid(size);
        let nir = create_layer(&g, 3).map(|v| v * 4000.0);
        let red = create_layer(&g, 5).map(|v| v * 1500.0);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| ndvi(black_box(&nir), black_box(&red)).unwrap())
        });
    }
    group.finish();
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics/reduce_region");
    for tile_scale in [1, 4, 8] {
        let g = grid(1024);
        let index = create_layer(&g, 1);
        let region = Raster::on_grid(&g, 1u8);
        group.bench_with_input(
            BenchmarkId::from_parameter(tile_scale),
            &tile_scale,
            |b, &ts| b.iter(|| reduce_region(black_box(&index), &region, &g, 0.4, ts).unwrap()),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_median, bench_ndvi, bench_reduce);
criterion_main!(benches);
