use criterion::{criterion_group, criterion_main, Criterion};
use click_replay::player::lerp;

fn bench_lerp(c: &mut Criterion) {
    c.bench_function("lerp_1k_ticks", |b| {
        b.iter(|| {
            let mut last = (0.0, 0.0);
            for tick in 0..1_000 {
                let progress = tick as f64 / 1_000.0;
                last = lerp((0.0, 0.0), (1920.0, 1080.0), progress);
            }
            last
        })
    });
}

criterion_group!(benches, bench_lerp);
criterion_main!(benches);
