use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use conicrs_api::Solver;
use conicrs_benches::random_socp;
use conicrs_core::math::Scalar;
use conicrs_core::options::SolveOptions;
use rand::{rngs::SmallRng, SeedableRng};

fn solve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("socp_solve");
    let mut rng = SmallRng::seed_from_u64(7);
    group.bench_function("m=20_k=10_d=5", |b| {
        b.iter_batched(
            || random_socp(20, 10, 5, &mut rng).expect("benchmark problem"),
            |problem| {
                Solver::<Scalar>::new()
                    .options(SolveOptions::default())
                    .solve_socp(&problem)
                    .expect("solve")
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, solve_benchmark);
criterion_main!(benches);
