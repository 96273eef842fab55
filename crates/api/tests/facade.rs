use approx::assert_abs_diff_eq;
use conicrs_api::{
    solve_batch, solve_qp, ApiError, LpBackend, LpBuilder, Method, QpBuilder, Solution,
    SocpBuilder, SolveOptions, Solver, Status,
};
use conicrs_core::error::SolverError;
use conicrs_core::matrix::DenseMatrix;
use conicrs_core::problem::{Bounds, Problem};

fn matrix(rows: &[&[f64]]) -> DenseMatrix<f64> {
    DenseMatrix::from_rows(&rows.iter().map(|r| r.to_vec()).collect::<Vec<_>>()).expect("matrix")
}

fn small_qp() -> conicrs_core::problem::QpProblem<f64> {
    QpBuilder::new()
        .quadratic(matrix(&[&[2.0, 0.0], &[0.0, 2.0]]))
        .linear(vec![0.0, 0.0])
        .equalities(matrix(&[&[1.0, 1.0]]), vec![1.0])
        .greater_equal(matrix(&[&[1.0, 0.0]]), vec![0.8])
        .build()
        .expect("qp")
}

fn small_lp() -> conicrs_core::problem::LpProblem<f64> {
    LpBuilder::new()
        .cost(vec![-3.0, -5.0])
        .less_equal(
            matrix(&[&[1.0, 0.0], &[0.0, 2.0], &[3.0, 2.0]]),
            vec![4.0, 12.0, 18.0],
        )
        .bounds(Bounds::non_negative(2))
        .build()
        .expect("lp")
}

fn disk() -> conicrs_core::problem::SocpProblem<f64> {
    SocpBuilder::new()
        .objective(vec![1.0, 1.0])
        .block(matrix(&[&[0.0, 0.0], &[-1.0, 0.0], &[0.0, -1.0]]), vec![1.0, 0.0, 0.0])
        .build()
        .expect("socp")
}

#[test]
fn builders_report_missing_parts() {
    let err = QpBuilder::<f64>::new().linear(vec![1.0]).build().unwrap_err();
    assert!(matches!(err, ApiError::InvalidProblem(_)));
    let err = LpBuilder::<f64>::new().build().unwrap_err();
    assert!(err.to_string().contains("objective vector missing"));
    let err = SocpBuilder::<f64>::new().objective(vec![1.0]).build().unwrap_err();
    assert!(matches!(err, ApiError::InvalidProblem(_)));
}

#[test]
fn both_qp_methods_agree() {
    let qp = small_qp();
    for method in [Method::ActiveSet, Method::InteriorPoint] {
        let solution = Solver::new()
            .method(method)
            .options(SolveOptions::with_tolerance(1e-9))
            .solve_qp(&qp)
            .expect("solve");
        assert_eq!(solution.status, Status::Optimal);
        assert_abs_diff_eq!(solution.x[0], 0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(solution.x[1], 0.2, epsilon = 1e-6);
    }
}

#[test]
fn builders_accept_csc_matrices() {
    let h = matrix(&[&[2.0, 0.0], &[0.0, 2.0]]).to_csc();
    let rows = matrix(&[&[1.0, 1.0]]).to_csc();
    assert_eq!(h.nnz(), 2);
    let qp = QpBuilder::new()
        .quadratic(&h)
        .linear(vec![0.0, 0.0])
        .equalities(&rows, vec![1.0])
        .greater_equal(matrix(&[&[1.0, 0.0]]), vec![0.8])
        .build()
        .expect("qp");
    assert_eq!(qp.quadratic(), small_qp().quadratic());
}

#[test]
fn simplex_is_not_a_qp_method() {
    let result = Solver::new().method(Method::Simplex).solve_qp(&small_qp());
    assert!(matches!(
        result,
        Err(ApiError::Unsupported { method: Method::Simplex, kind: "qp" })
    ));
}

#[test]
fn lp_methods_pick_backends() {
    let lp = small_lp();
    let simplex = Solver::new().method(Method::Simplex).solve_lp(&lp).expect("simplex");
    let ipm = Solver::new()
        .method(Method::InteriorPoint)
        .options(SolveOptions::with_tolerance(1e-9))
        .solve_lp(&lp)
        .expect("ipm");
    assert_eq!(simplex.backend, LpBackend::Simplex);
    assert_eq!(ipm.backend, LpBackend::InteriorPoint);
    assert_abs_diff_eq!(simplex.objective_value, -36.0, epsilon = 1e-9);
    assert_abs_diff_eq!(ipm.objective_value, -36.0, epsilon = 1e-6);
}

#[test]
fn socp_solves_and_rejects_pivoting_methods() {
    let solution = Solver::new()
        .options(SolveOptions::with_tolerance(1e-9))
        .solve_socp(&disk())
        .expect("solve");
    let half = std::f64::consts::FRAC_1_SQRT_2;
    assert_abs_diff_eq!(solution.y()[0], half, epsilon = 1e-6);
    assert_abs_diff_eq!(solution.y()[1], half, epsilon = 1e-6);
    assert!(Solver::new().method(Method::ActiveSet).solve_socp(&disk()).is_err());
}

#[test]
fn solver_errors_pass_through() {
    let lp = LpBuilder::new()
        .cost(vec![-1.0])
        .bounds(Bounds::non_negative(1))
        .build()
        .expect("lp");
    let err = Solver::new().method(Method::Simplex).solve_lp(&lp).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Solver(SolverError::Unbounded { column: 0 })
    ));
}

#[test]
fn batch_keeps_input_order() {
    let problems = vec![
        Problem::Lp(small_lp()),
        Problem::Qp(small_qp()),
        Problem::Socp(disk()),
    ];
    let solver = Solver::new().options(SolveOptions::with_tolerance(1e-9));
    let results = solve_batch(&solver, &problems);
    assert_eq!(results.len(), 3);
    assert!(matches!(results[0], Ok(Solution::Lp(_))));
    assert!(matches!(results[1], Ok(Solution::Qp(_))));
    assert!(matches!(results[2], Ok(Solution::Socp(_))));
    for result in &results {
        assert_eq!(result.as_ref().expect("solved").status(), Status::Optimal);
    }
}

#[test]
fn free_function_uses_active_set() {
    let solution = solve_qp(&small_qp(), SolveOptions::with_tolerance(1e-9)).expect("solve");
    assert!(solution.stats.history.iter().all(|r| r.work.factorizations == 1));
    assert_eq!(solution.active_set.len(), 1);
}

#[test]
fn solution_serializes_with_kind_tag() {
    let solution = Solver::new()
        .method(Method::Simplex)
        .solve(&Problem::Lp(small_lp()))
        .expect("solve");
    let text = serde_json::to_string(&solution).expect("serialize");
    assert!(text.contains("\"kind\":\"lp\""));
    assert_abs_diff_eq!(solution.point()[0], 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.point()[1], 6.0, epsilon = 1e-9);
}
