#![forbid(unsafe_code)]
//! Seeded problem generators shared by the criterion benches.

use conicrs_api::{ApiError, QpBuilder, SocpBuilder};
use conicrs_core::math::Scalar;
use conicrs_core::matrix::DenseMatrix;
use conicrs_core::problem::{Bounds, QpProblem, SocpProblem};
use rand::{rngs::SmallRng, Rng};

/// Diagonally dominant SPD matrix.
fn random_spd_matrix(n: usize, rng: &mut SmallRng) -> DenseMatrix<Scalar> {
    let mut matrix = DenseMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..i {
            let v = rng.gen::<Scalar>() * 0.02 - 0.01;
            matrix.set(i, j, v);
            matrix.set(j, i, v);
        }
        matrix.set(i, i, 1.0 + rng.gen::<Scalar>() * 0.1);
    }
    matrix
}

fn random_rows(m: usize, n: usize, rng: &mut SmallRng) -> DenseMatrix<Scalar> {
    let mut matrix = DenseMatrix::zeros(m, n);
    for v in matrix.data.iter_mut() {
        *v = rng.gen::<Scalar>() * 0.5 - 0.25;
    }
    matrix
}

pub fn random_qp(n: usize, m: usize, rng: &mut SmallRng) -> Result<QpProblem<Scalar>, ApiError> {
    let h = random_spd_matrix(n, rng);
    let p = (0..n).map(|_| rng.gen::<Scalar>() * 4.0 - 2.0).collect();
    let a = random_rows(m, n, rng);
    let b = (0..m).map(|_| rng.gen::<Scalar>() + 0.5).collect();
    QpBuilder::new()
        .quadratic(h)
        .linear(p)
        .less_equal(a, b)
        .bounds(Bounds {
            lower: vec![-1.0; n],
            upper: vec![1.0; n],
        })
        .build()
}

/// `k` blocks `(r_i, B_i y) ∈ K` plus one ball keeping the problem bounded.
pub fn random_socp(
    m: usize,
    k: usize,
    d: usize,
    rng: &mut SmallRng,
) -> Result<SocpProblem<Scalar>, ApiError> {
    let b = (0..m).map(|_| rng.gen::<Scalar>() - 0.5).collect();
    let mut ball = DenseMatrix::zeros(m + 1, m);
    for i in 0..m {
        ball.set(i + 1, i, -1.0);
    }
    let mut c = vec![0.0; m + 1];
    c[0] = 10.0;
    let mut builder = SocpBuilder::new().objective(b).block(ball, c);
    for _ in 0..k {
        let mut a_t = DenseMatrix::zeros(d, m);
        for row in 1..d {
            for col in 0..m {
                a_t.set(row, col, rng.gen::<Scalar>() - 0.5);
            }
        }
        let mut offset = vec![0.0; d];
        offset[0] = 1.0 + rng.gen::<Scalar>();
        builder = builder.block(a_t, offset);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn generators_are_valid_and_seeded() {
        let mut rng = SmallRng::seed_from_u64(1);
        let qp = random_qp(5, 4, &mut rng).expect("qp");
        assert_eq!(qp.nvars(), 5);
        let socp = random_socp(3, 2, 4, &mut rng).expect("socp");
        assert_eq!(socp.n_blocks(), 3);
        assert_eq!(socp.total_dim(), 4 + 2 * 4);
    }
}
