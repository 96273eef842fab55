use approx::assert_abs_diff_eq;
use conicrs_algos::{ActiveSetSolver, InteriorPointSolver};
use conicrs_core::error::SolverError;
use conicrs_core::math::{axpy, dot};
use conicrs_core::matrix::DenseMatrix;
use conicrs_core::options::SolveOptions;
use conicrs_core::problem::{Bounds, ConstraintRef, ConstraintSet, LinearConstraints, QpProblem};
use conicrs_core::solution::Status;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn matrix(rows: &[&[f64]]) -> DenseMatrix<f64> {
    DenseMatrix::from_rows(&rows.iter().map(|r| r.to_vec()).collect::<Vec<_>>()).expect("matrix")
}

/// Four-asset allocation: budget cap, minimum return, long only.
fn portfolio() -> QpProblem<f64> {
    let h = matrix(&[
        &[0.08, -0.05, -0.05, -0.05],
        &[-0.05, 0.16, -0.02, -0.02],
        &[-0.05, -0.02, 0.35, 0.06],
        &[-0.05, -0.02, 0.06, 0.35],
    ]);
    let constraints = ConstraintSet {
        less_equal: Some(LinearConstraints::new(matrix(&[&[1.0, 1.0, 1.0, 1.0]]), vec![10000.0])),
        greater_equal: Some(LinearConstraints::new(
            matrix(&[&[0.05, -0.2, 0.15, 0.3]]),
            vec![1000.0],
        )),
        bounds: Some(Bounds::non_negative(4)),
        ..ConstraintSet::default()
    };
    QpProblem::new(h, vec![0.0; 4], constraints).expect("qp")
}

fn row_of(qp: &QpProblem<f64>, constraint: ConstraintRef) -> Vec<f64> {
    let rows = qp.normalized_inequalities();
    let idx = rows
        .origins
        .iter()
        .position(|o| *o == constraint)
        .expect("constraint present");
    rows.matrix.row(idx).to_vec()
}

#[test]
fn portfolio_matches_reference_allocation() {
    let qp = portfolio();
    let solution = ActiveSetSolver::new(SolveOptions::with_tolerance(1e-9))
        .solve(&qp)
        .expect("build")
        .search()
        .expect("solve");
    assert_eq!(solution.status, Status::Optimal);
    let expected = [3452.8589, 0.0, 1068.808, 2223.4529];
    for (x, e) in solution.x.iter().zip(expected) {
        assert_abs_diff_eq!(*x, e, epsilon = 1e-1);
    }
    assert!(solution.active_set.contains(&ConstraintRef::GreaterEqual(0)));
    assert!(solution.active_set.contains(&ConstraintRef::Lower(1)));
    assert!(!solution.active_set.contains(&ConstraintRef::LessEqual(0)));
}

#[test]
fn multipliers_satisfy_stationarity() {
    let qp = portfolio();
    let solution = ActiveSetSolver::new(SolveOptions::with_tolerance(1e-9))
        .solve(&qp)
        .expect("build")
        .search()
        .expect("solve");
    let mut residual = qp.gradient(&solution.x);
    for (constraint, lambda) in solution.active_set.iter().zip(solution.multipliers.iter()) {
        assert!(*lambda >= -1e-6, "{constraint} has multiplier {lambda}");
        axpy(-*lambda, &row_of(&qp, *constraint), &mut residual);
    }
    let scale = 1.0 + qp.gradient(&solution.x).iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    for r in residual {
        assert!(r.abs() <= 1e-6 * scale, "stationarity residual {r}");
    }
}

#[test]
fn supplied_feasible_start_is_accepted() {
    let qp = portfolio();
    let start = vec![2500.0, 0.0, 2500.0, 2500.0];
    let solution = ActiveSetSolver::new(SolveOptions::with_tolerance(1e-9))
        .solve(&qp)
        .expect("build")
        .search_from(start)
        .expect("solve");
    assert_abs_diff_eq!(solution.x[0], 3452.8589, epsilon = 1e-1);
    assert_abs_diff_eq!(solution.x[3], 2223.4529, epsilon = 1e-1);
}

#[test]
fn infeasible_start_is_rejected() {
    let qp = portfolio();
    let mut minimizer = ActiveSetSolver::new(SolveOptions::with_tolerance(1e-9))
        .solve(&qp)
        .expect("build");
    let result = minimizer.search_from(vec![1.0, 1.0, 1.0, 1.0]);
    assert!(matches!(result, Err(SolverError::Infeasible { .. })));
}

#[test]
fn wrong_start_length_is_a_dimension_error() {
    let mut minimizer = ActiveSetSolver::new(SolveOptions::default())
        .solve(&portfolio())
        .expect("build");
    assert!(matches!(
        minimizer.search_from(vec![0.0; 3]),
        Err(SolverError::Problem(_))
    ));
}

#[test]
fn interior_point_agrees_on_portfolio() {
    let qp = portfolio();
    let active = ActiveSetSolver::new(SolveOptions::with_tolerance(1e-9))
        .solve(&qp)
        .expect("build")
        .search()
        .expect("active set");
    let ipm = InteriorPointSolver::new(SolveOptions::with_tolerance(1e-8));
    let mut minimizer = ipm.solve_qp(&qp).expect("build");
    let conic = minimizer.search().expect("ipm");
    let interior = minimizer.method().qp_solution(&qp, conic);
    assert_eq!(interior.status, Status::Optimal);
    for (a, b) in active.x.iter().zip(interior.x.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-1);
    }
}

#[test]
fn random_box_qps_match_interior_point() {
    let mut rng = SmallRng::seed_from_u64(7);
    for _ in 0..5 {
        let n = 4;
        let factor: Vec<Vec<f64>> = (0..n)
            .map(|_| (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        let mut h = DenseMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                let v = dot(&factor[i], &factor[j]) + if i == j { 0.5 } else { 0.0 };
                h.set(i, j, v);
            }
        }
        let linear: Vec<f64> = (0..n).map(|_| rng.gen_range(-2.0..2.0)).collect();
        let constraints = ConstraintSet {
            less_equal: Some(LinearConstraints::new(matrix(&[&[1.0, 1.0, 1.0, 1.0]]), vec![1.5])),
            bounds: Some(Bounds {
                lower: vec![-1.0; n],
                upper: vec![1.0; n],
            }),
            ..ConstraintSet::default()
        };
        let qp = QpProblem::new(h, linear, constraints).expect("qp");

        let active = ActiveSetSolver::new(SolveOptions::with_tolerance(1e-10))
            .solve(&qp)
            .expect("build")
            .search()
            .expect("active set");
        let mut minimizer = InteriorPointSolver::new(SolveOptions::with_tolerance(1e-9))
            .solve_qp(&qp)
            .expect("build");
        let conic = minimizer.search().expect("ipm");
        let interior = minimizer.method().qp_solution(&qp, conic);
        assert_eq!(active.status, Status::Optimal);
        assert_abs_diff_eq!(
            active.objective_value,
            interior.objective_value,
            epsilon = 1e-6
        );
        for (a, b) in active.x.iter().zip(interior.x.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }
}
