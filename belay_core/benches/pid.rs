use belay_core::{PidCfg, PidController, PositionCalibration, PositionSensor};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

// Slider trace: slow drift plus a deterministic ripple, in raw units [0, 1]
fn synth_readings(n: usize, seed: u32) -> Vec<f64> {
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    (0..n)
        .map(|i| {
            let t = i as f64 / 400.0;
            0.5 + 0.3 * t.sin() + (next() - 0.5) * 0.02
        })
        .collect()
}

pub fn bench_pid_update(c: &mut Criterion) {
    let readings = synth_readings(10_000, 0x5eed);
    let sensor = PositionSensor::new(5.0, PositionCalibration::default()).expect("sensor");
    let cfg = PidCfg {
        kp: 0.05,
        ki: 0.005,
        kd: 0.01,
        tt: None,
        limit: 0.1,
        setpoint: 0.0,
    };

    c.bench_function("pid_update_10k", |b| {
        b.iter_batched(
            || PidController::new(&cfg).expect("pid"),
            |mut pid| {
                let mut distance = 0.0;
                let mut acc = 0.0;
                for &raw in &readings {
                    distance += 0.02;
                    acc += pid.update(sensor.position(raw), distance);
                }
                black_box(acc)
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_pid_update);
criterion_main!(benches);
