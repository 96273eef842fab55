use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use conicrs_api::{Method, Solver};
use conicrs_benches::random_qp;
use conicrs_core::math::Scalar;
use conicrs_core::options::SolveOptions;
use rand::{rngs::SmallRng, SeedableRng};

fn solve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("qp_solve");
    let mut rng = SmallRng::seed_from_u64(42);
    for (label, method) in [
        ("active_set", Method::ActiveSet),
        ("interior_point", Method::InteriorPoint),
    ] {
        group.bench_function(format!("{label}/n=30_m=45"), |b| {
            b.iter_batched(
                || random_qp(30, 45, &mut rng).expect("benchmark problem"),
                |problem| {
                    let solver = Solver::<Scalar>::new()
                        .method(method)
                        .options(SolveOptions::default());
                    solver.solve_qp(&problem).expect("solve")
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, solve_benchmark);
criterion_main!(benches);
