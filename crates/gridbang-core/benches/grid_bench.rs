use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use gridbang_core::{Grid, GridConfig};
use std::time::Duration;

const PATTERN: &str = "G11.R0b.O0?3?1..1S4193a..7T5..T5..3$2..V3..1Q3.";

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(fallback)
}

fn bench_grid_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_step");
    let samples = env_or::<usize>("GB_BENCH_SAMPLES", 30).max(10);
    group.sample_size(samples);
    group.warm_up_time(Duration::from_secs(env_or("GB_BENCH_WARMUP_SECS", 2)));
    group.measurement_time(Duration::from_secs(env_or("GB_BENCH_MEASURE_SECS", 5)));
    let steps = env_or::<usize>("GB_BENCH_STEPS", 64).max(1);
    let widths: Vec<u32> = std::env::var("GB_BENCH_WIDTHS")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|t| t.trim().parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec![64_u32, 256, 1024]);
    for &width in &widths {
        group.bench_function(format!("steps{steps}_width{width}"), |b| {
            b.iter_batched(
                || {
                    let mut grid = Grid::new(GridConfig {
                        width,
                        height: 32,
                        rng_seed: Some(0xBEEF),
                    })
                    .expect("grid");
                    // Tile the pattern so every column carries live commands.
                    let mut offset = 0;
                    while offset < grid.cell_count() {
                        grid.load_str(PATTERN, offset);
                        offset += grid.height();
                    }
                    grid
                },
                |mut grid| {
                    for _ in 0..steps {
                        grid.step();
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_grid_steps);
criterion_main!(benches);
