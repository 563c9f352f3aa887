//! Benchmarks for one levitation control cycle and the schedule lookup.

use std::time::Instant;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lev_lib::{
    gain_sched::{GainProfile, FeedforwardProfile, ScheduleTables},
    lev_ctrl::{InputData, LevCtrl, Params}
};
use util::module::State;

fn params() -> Params {
    Params {
        initial_target_height_mm: 250.0,
        min_target_height_mm: 50.0,
        object_lost_height_mm: 8000.0,
        ramp_step_mm: 2.0,
        feedforward_enabled: true,
        gain_schedule: (1..10)
            .map(|i| GainProfile {
                height_mm: 50.0 * i as f64,
                kp: 0.0015,
                ki: 0.0002,
                kd: 0.0076
            })
            .collect(),
        feedforward: (1..10)
            .map(|i| FeedforwardProfile {
                height_mm: 50.0 * i as f64,
                speed: if i <= 4 { 0.35 } else { 0.30 }
            })
            .collect(),
    }
}

fn bench_cycle(c: &mut Criterion) {
    let mut lc = LevCtrl::default();
    if let Err(e) = lc.init(params()) {
        panic!("Cannot initialise LevCtrl: {}", e);
    }

    // Alternate targets so the ramp and scheduler run on every cycle
    let mut n = 0u64;
    c.bench_function("lev_ctrl_proc", |b| b.iter(|| {
        n += 1;
        if n % 200 == 0 {
            lc.set_target(if (n / 200) % 2 == 0 { 150.0 } else { 350.0 });
        }
        let input = InputData {
            height_mm: black_box(240.0),
            now: Instant::now()
        };
        black_box(lc.proc(&input).ok())
    }));
}

fn bench_interpolate(c: &mut Criterion) {
    let p = params();
    let tables = match ScheduleTables::new(p.gain_schedule, p.feedforward) {
        Ok(t) => t,
        Err(e) => panic!("Invalid tables: {}", e)
    };

    c.bench_function("gains_at", |b| b.iter(|| tables.gains_at(black_box(237.5))));
    c.bench_function("feedforward_at", |b| b.iter(|| tables.feedforward_at(black_box(237.5))));
}

criterion_group!(benches, bench_cycle, bench_interpolate);
criterion_main!(benches);
