//! Criterion benchmarks for the table hot paths.
//!
//! Benchmarks:
//! 1. Resampling a day of 8 Hz magnetometer-like data
//! 2. Assembling per-day tables (concat + canonicalize)
//! 3. SEPT file parsing
//! 4. Channel combination

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use stereo_core::data::sept::parse_sept;
use stereo_core::{
    combine_channels, resample, ChannelTable, DataColumn, Frequency, Species, TimeTable,
    TimestampPosition,
};

// ── Helpers ──────────────────────────────────────────────────────────

/// 2021-04-15T00:00:00Z
const BASE: i64 = 1_618_444_800_000;

fn make_table(rows: usize, step_ms: i64, n_cols: usize) -> TimeTable {
    let times = (0..rows as i64).map(|i| BASE + i * step_ms).collect();
    let columns = (0..n_cols)
        .map(|c| {
            let values = (0..rows)
                .map(|i| {
                    if i % 97 == 0 {
                        f64::NAN
                    } else {
                        ((i + c) as f64 * 0.01).sin() * 10.0
                    }
                })
                .collect();
            DataColumn::new(format!("col_{c}"), values)
        })
        .collect();
    TimeTable::new(times, columns).unwrap()
}

fn make_sept_text(rows: usize) -> String {
    let mut out = String::from("# bench\n");
    for i in 0..rows {
        let jd = 2_459_319.5 + i as f64 / 1440.0;
        out.push_str(&format!("{jd:.8} 2021 105.0 0 0 0"));
        for c in 0..15 {
            out.push_str(&format!(" {:.4e}", 100.0 / (c + 1) as f64));
        }
        for c in 0..15 {
            out.push_str(&format!(" {:.4e}", 0.05 * (c + 1) as f64));
        }
        out.push_str(" 60.0\n");
    }
    out
}

// ── 1. Resampling ────────────────────────────────────────────────────

fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample");
    // One day at 8 Hz, four field components
    let table = make_table(691_200, 125, 4);

    for freq in ["1s", "1min", "1h"] {
        let frequency: Frequency = freq.parse().unwrap();
        group.bench_with_input(BenchmarkId::new("mag_day_8hz", freq), &frequency, |b, f| {
            b.iter(|| resample(black_box(&table), *f, TimestampPosition::Center));
        });
    }

    group.finish();
}

// ── 2. Assembly ──────────────────────────────────────────────────────

fn bench_concat(c: &mut Criterion) {
    let mut group = c.benchmark_group("concat");

    for &days in &[1usize, 7, 30] {
        // Per-day tables handed over in reverse order
        let tables: Vec<TimeTable> = (0..days)
            .rev()
            .map(|d| {
                let day = make_table(1440, 60_000, 30);
                let shifted = day.times().iter().map(|&ms| ms + d as i64 * 86_400_000).collect();
                TimeTable::new(shifted, day.columns().to_vec()).unwrap()
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("sept_days", days), &tables, |b, tables| {
            b.iter(|| TimeTable::concat(black_box(tables.clone())));
        });
    }

    group.finish();
}

// ── 3. SEPT parsing ──────────────────────────────────────────────────

fn bench_parse_sept(c: &mut Criterion) {
    let channels = ChannelTable::sept(Species::Electrons);
    let text = make_sept_text(1440);

    c.bench_function("parse_sept_day", |b| {
        b.iter(|| parse_sept(black_box(&text), &channels, "bench.dat").unwrap());
    });
}

// ── 4. Channel combination ───────────────────────────────────────────

fn bench_combine(c: &mut Criterion) {
    let channels = ChannelTable::sept(Species::Electrons);
    let table = parse_sept(&make_sept_text(14_400), &channels, "bench.dat").unwrap();

    c.bench_function("combine_channels_2_16", |b| {
        b.iter(|| combine_channels(black_box(&table), &channels, [2, 16]).unwrap());
    });
}

criterion_group!(
    benches,
    bench_resample,
    bench_concat,
    bench_parse_sept,
    bench_combine,
);
criterion_main!(benches);
