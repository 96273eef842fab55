//! Mehrotra predictor-corrector interior-point method over products of second-order cones.

use crate::cone::{ConeLayout, NtScaling};
use crate::conic::ConicForm;
use conicrs_core::error::{SolverError, SolverResult};
use conicrs_core::iterative::{IterativeMethod, IterativeMinimizer};
use conicrs_core::math::{
    argmax_abs, axpy, constant, dot, norm2, norm_inf, sub, to_f64, RealNumber,
};
use conicrs_core::matrix::DenseMatrix;
use conicrs_core::options::{LpBackend, SolveOptions};
use conicrs_core::problem::{LpProblem, ProblemError, QpProblem, SocpProblem};
use conicrs_core::solution::{ConicSolution, LpSolution, PrimalDualSolution, QpSolution, Status};
use conicrs_core::stats::{IterationRecord, SolveStats, StepWork};
use conicrs_core::tolerance::TolerancePolicy;
use conicrs_core::traits::KktSolver;
use conicrs_linsys::dense::{DenseKktMatrix, DenseKktSolver, KktPattern, LdlSettings};
use tracing::{info, warn};

struct Residuals<T> {
    primal: Vec<T>,
    dual: Vec<T>,
    equality: Vec<T>,
    mu: T,
}

impl<T> Residuals<T>
where
    T: RealNumber,
{
    fn norms(&self) -> [T; 4] {
        [
            norm2(&self.primal),
            norm2(&self.dual),
            norm2(&self.equality),
            self.mu,
        ]
    }
}

struct Direction<T> {
    dx: Vec<T>,
    ds: Vec<T>,
    dy: Vec<T>,
    dz: Vec<T>,
}

/// Factorized reduced KKT matrix `[[top, Eᵀ], [E, −δ]]`.
struct ReducedKkt<T: RealNumber> {
    solver: DenseKktSolver<T>,
    n_vars: usize,
    solves: usize,
}

impl<T> ReducedKkt<T>
where
    T: RealNumber,
{
    fn solve(&mut self, mut rhs: Vec<T>) -> SolverResult<(Vec<T>, Vec<T>)> {
        self.solver.solve(&mut rhs)?;
        self.solves += 1;
        let tail = rhs.split_off(self.n_vars);
        Ok((rhs, tail))
    }
}

pub struct PrimalDualInteriorPoint<T: RealNumber> {
    form: ConicForm<T>,
    step_fraction: T,
    refinement_steps: usize,
    /// Iterate norm past which the method looks for an infeasibility certificate.
    divergence: T,
    certificate_tolerance: T,
}

impl<T> PrimalDualInteriorPoint<T>
where
    T: RealNumber,
{
    pub fn new(form: ConicForm<T>, options: &SolveOptions<T>) -> SolverResult<Self> {
        let fraction = options.step_fraction;
        if !(fraction > T::zero() && fraction < T::one()) {
            return Err(ProblemError::InvalidStructure(format!(
                "step fraction must lie in (0, 1), got {}",
                to_f64(fraction)
            ))
            .into());
        }
        let data_norm = norm_inf(&form.b)
            .max(norm_inf(&form.c))
            .max(norm_inf(&form.equality_rhs));
        Ok(Self {
            divergence: constant::<T>(1e8) * (T::one() + data_norm),
            certificate_tolerance: T::epsilon().sqrt(),
            form,
            step_fraction: fraction,
            refinement_steps: options.refinement_steps,
        })
    }

    pub fn form(&self) -> &ConicForm<T> {
        &self.form
    }

    fn layout(&self) -> &ConeLayout {
        &self.form.layout
    }

    fn residuals(&self, state: &PrimalDualSolution<T>) -> Residuals<T> {
        let form = &self.form;
        let mut primal = sub(&form.b, &form.hessian_mul(&state.y));
        axpy(-T::one(), &form.g.tr_mul_vec(&state.x), &mut primal);
        if !state.z.is_empty() {
            axpy(-T::one(), &form.equality_matrix.tr_mul_vec(&state.z), &mut primal);
        }
        let mut dual = sub(&form.c, &form.g.mul_vec(&state.y));
        axpy(-T::one(), &state.s, &mut dual);
        let equality = sub(&form.equality_rhs, &form.equality_matrix.mul_vec(&state.y));
        Residuals {
            primal,
            dual,
            equality,
            mu: state.complementarity(),
        }
    }

    fn factor(&self, mut top: DenseMatrix<T>) -> SolverResult<ReducedKkt<T>> {
        if let Some(h) = &self.form.hessian {
            for (t, hv) in top.data.iter_mut().zip(h.data.iter()) {
                *t += *hv;
            }
        }
        let m = self.form.n_vars();
        let kkt = DenseKktMatrix::from_blocks(&top, &self.form.equality_matrix);
        let mut solver = DenseKktSolver::with_settings(LdlSettings {
            refinement_steps: self.refinement_steps,
            ..LdlSettings::default()
        });
        solver.analyze_pattern(&KktPattern::new(kkt.dimension, m))?;
        solver.factor(&kkt)?;
        Ok(ReducedKkt {
            solver,
            n_vars: m,
            solves: 0,
        })
    }

    /// `W⁻¹G`, scaling each column of `G` block by block.
    fn scaled_map(&self, scaling: &NtScaling<T>) -> DenseMatrix<T> {
        let g_t = self.form.g.transpose();
        let mut data = Vec::with_capacity(g_t.data.len());
        for column in g_t.rows() {
            data.extend(scaling.apply_inverse(column));
        }
        DenseMatrix {
            nrows: g_t.nrows,
            ncols: g_t.ncols,
            data,
        }
        .transpose()
    }

    fn direction(
        &self,
        kkt: &mut ReducedKkt<T>,
        scaling: &NtScaling<T>,
        lambda: &[T],
        residuals: &Residuals<T>,
        rc: &[T],
    ) -> SolverResult<Direction<T>> {
        let layout = self.layout();
        let g = &self.form.g;
        let rho = layout.arrow_solve(lambda, rc);
        let winv_rho = scaling.apply_inverse(&rho);
        let winv2_rd = scaling.apply_inverse(&scaling.apply_inverse(&residuals.dual));
        let t = sub(&winv_rho, &winv2_rd);
        let mut rhs = sub(&residuals.primal, &g.tr_mul_vec(&t));
        rhs.extend_from_slice(&residuals.equality);
        let (dy, dz) = kkt.solve(rhs)?;

        let g_dy = g.mul_vec(&dy);
        let ds = sub(&residuals.dual, &g_dy);
        let mut inner = scaling.apply_inverse(&sub(&g_dy, &residuals.dual));
        axpy(T::one(), &rho, &mut inner);
        let dx = scaling.apply_inverse(&inner);
        Ok(Direction { dx, ds, dy, dz })
    }

    /// Largest step keeping both the scaled and the unscaled iterates inside the cone.
    fn max_step(
        &self,
        state: &PrimalDualSolution<T>,
        scaling: &NtScaling<T>,
        lambda: &[T],
        direction: &Direction<T>,
    ) -> T {
        let layout = self.layout();
        layout
            .max_step(lambda, &scaling.apply(&direction.dx))
            .min(layout.max_step(lambda, &scaling.apply_inverse(&direction.ds)))
            .min(layout.max_step(&state.x, &direction.dx))
            .min(layout.max_step(&state.s, &direction.ds))
    }

    /// Once `(x, z)` or `y` has run away, tests the normalized iterate as a Farkas certificate.
    ///
    /// `Gᵀx̂ + Eᵀẑ = 0` with `cᵀx̂ + eᵀẑ < 0` and `x̂ ∈ K` proves the cone constraints infeasible.
    /// `Hŷ = 0`, `Eŷ = 0`, `−Gŷ ∈ K` with `bᵀŷ > 0` is a ray along which the objective grows.
    fn certificate(
        &self,
        state: &PrimalDualSolution<T>,
        residuals: &Residuals<T>,
    ) -> Option<SolverError> {
        let form = &self.form;
        let tol = self.certificate_tolerance;

        let dual_norm = norm2(&state.x).hypot(norm2(&state.z));
        if dual_norm > self.divergence {
            let x: Vec<T> = state.x.iter().map(|v| *v / dual_norm).collect();
            let z: Vec<T> = state.z.iter().map(|v| *v / dual_norm).collect();
            let mut image = form.g.tr_mul_vec(&x);
            if !z.is_empty() {
                axpy(T::one(), &form.equality_matrix.tr_mul_vec(&z), &mut image);
            }
            let value = dot(&form.c, &x) + dot(&form.equality_rhs, &z);
            if norm2(&image) <= tol && value < -tol {
                let violation = norm_inf(&residuals.dual).max(norm_inf(&residuals.equality));
                info!(value = to_f64(value), "infeasibility certificate found");
                return Some(SolverError::Infeasible {
                    violation: to_f64(violation),
                });
            }
        }

        let primal_norm = norm2(&state.y);
        if primal_norm > self.divergence {
            let y: Vec<T> = state.y.iter().map(|v| *v / primal_norm).collect();
            let ray: Vec<T> = form.g.mul_vec(&y).iter().map(|v| -*v).collect();
            let flat = norm2(&form.hessian_mul(&y))
                .max(norm2(&form.equality_matrix.mul_vec(&y)));
            if dot(&form.b, &y) > tol && flat <= tol && self.layout().min_margin(&ray) >= -tol {
                let column = argmax_abs(&y);
                info!(column, "unbounded ray found");
                return Some(SolverError::Unbounded { column });
            }
        }
        None
    }

    fn check_shapes(&self, start: &PrimalDualSolution<T>) -> SolverResult<()> {
        let n = self.form.cone_dim();
        let m = self.form.n_vars();
        let k = self.form.n_equalities();
        if start.x.len() != n || start.s.len() != n || start.y.len() != m {
            return Err(SolverError::dimension(format!(
                "start has |x| = {}, |s| = {}, |y| = {}; expected {n}, {n}, {m}",
                start.x.len(),
                start.s.len(),
                start.y.len()
            )));
        }
        if !(start.z.is_empty() || start.z.len() == k) {
            return Err(SolverError::dimension(format!(
                "start has {} equality multipliers, expected {k}",
                start.z.len()
            )));
        }
        Ok(())
    }

    /// Reports the IPM result in terms of the QP it was built from.
    pub fn qp_solution(&self, problem: &QpProblem<T>, solution: ConicSolution<T>) -> QpSolution<T> {
        let ConicSolution {
            point,
            status,
            iterations,
            stats,
            ..
        } = solution;
        let mut active_set = Vec::new();
        let mut multipliers = Vec::new();
        for (i, origin) in self.form.origins.iter().enumerate() {
            if point.s[i] < point.x[i] {
                active_set.push(*origin);
                multipliers.push(point.x[i]);
            }
        }
        QpSolution {
            objective_value: problem.objective(&point.y),
            x: point.y,
            active_set,
            multipliers,
            equality_multipliers: point.z.iter().map(|v| -*v).collect(),
            status,
            iterations,
            stats,
        }
    }

    /// Reports the IPM result in terms of the LP it was built from.
    pub fn lp_solution(&self, problem: &LpProblem<T>, solution: ConicSolution<T>) -> LpSolution<T> {
        LpSolution {
            objective_value: problem.objective(&solution.point.y),
            x: solution.point.y,
            status: solution.status,
            backend: LpBackend::InteriorPoint,
            iterations: solution.iterations,
            inequality_dual: Some(solution.point.x),
            basis: None,
            stats: solution.stats,
        }
    }
}

/// `min(1, fraction · α_max)`. An unbounded ray gives a full step; NaN is a breakdown.
fn step_length<T: RealNumber>(fraction: T, alpha_max: T) -> SolverResult<T> {
    if alpha_max.is_nan() {
        return Err(SolverError::breakdown("non-finite step length"));
    }
    Ok(T::one().min(fraction * alpha_max))
}

impl<T> IterativeMethod<T> for PrimalDualInteriorPoint<T>
where
    T: RealNumber,
{
    type Start = PrimalDualSolution<T>;
    type State = PrimalDualSolution<T>;
    type Output = ConicSolution<T>;

    fn prepare(&self, mut start: PrimalDualSolution<T>) -> SolverResult<PrimalDualSolution<T>> {
        self.check_shapes(&start)?;
        let finite = [&start.x, &start.s, &start.y, &start.z]
            .iter()
            .all(|v| v.iter().all(|e| e.is_finite()));
        if !finite {
            return Err(SolverError::InvalidStart(
                "start contains non-finite entries".into(),
            ));
        }
        if !self.layout().is_interior(&start.x) || !self.layout().is_interior(&start.s) {
            return Err(SolverError::InvalidStart(
                "x and s must lie strictly inside the cone".into(),
            ));
        }
        if start.z.is_empty() {
            start.z = vec![T::zero(); self.form.n_equalities()];
        }
        Ok(start)
    }

    fn default_start(&self) -> SolverResult<PrimalDualSolution<T>> {
        let form = &self.form;
        let mut kkt = self.factor(form.g.gram())?;
        let mut rhs = form.b.clone();
        axpy(T::one(), &form.g.tr_mul_vec(&form.c), &mut rhs);
        rhs.extend_from_slice(&form.equality_rhs);
        let (y, z) = kkt.solve(rhs)?;

        let mut s = sub(&form.c, &form.g.mul_vec(&y));
        let mut x: Vec<T> = s.iter().map(|v| -*v).collect();
        self.layout().shift_into_interior(&mut x);
        self.layout().shift_into_interior(&mut s);
        Ok(PrimalDualSolution::new(x, s, y).with_equality_multipliers(z))
    }

    fn step(
        &self,
        state: &PrimalDualSolution<T>,
    ) -> SolverResult<(PrimalDualSolution<T>, IterationRecord<T>)> {
        let layout = self.layout();
        let residuals = self.residuals(state);
        let mu = residuals.mu;

        let scaling = NtScaling::new(layout, &state.x, &state.s)?;
        let lambda = scaling.apply(&state.x);
        let mut kkt = self.factor(self.scaled_map(&scaling).gram())?;
        let regularized = kkt.solver.regularized_pivots();
        if regularized > 0 {
            warn!(regularized, "reduced KKT matrix needed pivot regularization");
        }

        let lambda_sq = layout.jordan_product(&lambda, &lambda);
        let rc_affine: Vec<T> = lambda_sq.iter().map(|v| -*v).collect();
        let affine = self.direction(&mut kkt, &scaling, &lambda, &residuals, &rc_affine)?;
        let alpha_affine =
            step_length(T::one(), self.max_step(state, &scaling, &lambda, &affine))?;
        let mut x_aff = state.x.clone();
        axpy(alpha_affine, &affine.dx, &mut x_aff);
        let mut s_aff = state.s.clone();
        axpy(alpha_affine, &affine.ds, &mut s_aff);
        let n = T::from_usize(layout.total()).unwrap_or_else(T::one);
        let mu_affine = dot(&x_aff, &s_aff) / n;
        let sigma = (mu_affine / mu).max(T::zero()).min(T::one()).powi(3);

        let correction = layout.jordan_product(
            &scaling.apply_inverse(&affine.ds),
            &scaling.apply(&affine.dx),
        );
        let mut rc: Vec<T> = layout.identity();
        for ((r, l2), corr) in rc.iter_mut().zip(lambda_sq.iter()).zip(correction.iter()) {
            *r = *r * sigma * mu - *l2 - *corr;
        }
        let combined = self.direction(&mut kkt, &scaling, &lambda, &residuals, &rc)?;
        let alpha = step_length(
            self.step_fraction,
            self.max_step(state, &scaling, &lambda, &combined),
        )?;

        let mut next = state.clone();
        axpy(alpha, &combined.dx, &mut next.x);
        axpy(alpha, &combined.ds, &mut next.s);
        axpy(alpha, &combined.dy, &mut next.y);
        axpy(alpha, &combined.dz, &mut next.z);

        let after = self.residuals(&next);
        if let Some(verdict) = self.certificate(&next, &after) {
            return Err(verdict);
        }
        let [primal, dual, equality, gap] = after.norms();
        let work = StepWork {
            factorizations: 1,
            linear_solves: kkt.solves,
            regularized_pivots: regularized,
        };
        let record = IterationRecord::new(
            0,
            primal,
            (dual * dual + equality * equality).sqrt(),
            gap,
            alpha,
            self.form.objective(&next.y),
        )
        .with_work(work);
        Ok((next, record))
    }

    fn is_converged(&self, state: &PrimalDualSolution<T>, tolerance: &TolerancePolicy<T>) -> bool {
        tolerance.all_small(&self.residuals(state).norms())
    }

    fn finish(
        &self,
        state: PrimalDualSolution<T>,
        status: Status,
        stats: SolveStats<T>,
    ) -> ConicSolution<T> {
        ConicSolution {
            objective_value: self.form.objective(&state.y),
            point: state,
            status,
            iterations: stats.history.len(),
            stats,
        }
    }
}

pub type InteriorPointMinimizer<T> = IterativeMinimizer<T, PrimalDualInteriorPoint<T>>;

/// Builds interior-point minimizers for every supported problem family.
#[derive(Debug, Clone)]
pub struct InteriorPointSolver<T> {
    options: SolveOptions<T>,
}

impl<T> Default for InteriorPointSolver<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self::new(SolveOptions::default())
    }
}

impl<T> InteriorPointSolver<T>
where
    T: RealNumber,
{
    pub fn new(options: SolveOptions<T>) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SolveOptions<T> {
        &self.options
    }

    pub fn solve(&self, problem: &SocpProblem<T>) -> SolverResult<InteriorPointMinimizer<T>> {
        self.minimizer(ConicForm::from_socp(problem)?)
    }

    pub fn solve_qp(&self, problem: &QpProblem<T>) -> SolverResult<InteriorPointMinimizer<T>> {
        self.minimizer(ConicForm::from_qp(problem)?)
    }

    pub fn solve_lp(&self, problem: &LpProblem<T>) -> SolverResult<InteriorPointMinimizer<T>> {
        self.minimizer(ConicForm::from_lp(problem)?)
    }

    fn minimizer(&self, form: ConicForm<T>) -> SolverResult<InteriorPointMinimizer<T>> {
        let method = PrimalDualInteriorPoint::new(form, &self.options)?;
        Ok(IterativeMinimizer::new(method, self.options.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use conicrs_core::problem::ConeBlock;

    /// maximize y subject to ‖y‖ ≤ 1 written as (1, y) ∈ K₂.
    fn unit_ball() -> SocpProblem<f64> {
        let block = ConeBlock::new(
            DenseMatrix::from_rows(&[vec![0.0], vec![-1.0]]).expect("rows"),
            vec![1.0, 0.0],
        )
        .expect("block");
        SocpProblem::new(vec![1.0], vec![block], None).expect("socp")
    }

    #[test]
    fn solves_a_single_cone() {
        let solver = InteriorPointSolver::new(SolveOptions::with_tolerance(1e-9));
        let solution = solver.solve(&unit_ball()).expect("build").search().expect("search");
        assert_eq!(solution.status, Status::Optimal);
        assert_abs_diff_eq!(solution.y()[0], 1.0, epsilon = 1e-7);
        assert_abs_diff_eq!(solution.objective_value, 1.0, epsilon = 1e-7);
    }

    #[test]
    fn default_start_is_interior() {
        let solver = InteriorPointSolver::<f64>::default();
        let minimizer = solver.solve(&unit_ball()).expect("build");
        let start = minimizer.method().default_start().expect("start");
        let layout = &minimizer.method().form().layout;
        assert!(layout.is_interior(&start.x));
        assert!(layout.is_interior(&start.s));
    }

    #[test]
    fn rejects_boundary_start_and_bad_fraction() {
        let solver = InteriorPointSolver::new(SolveOptions::default());
        let mut minimizer = solver.solve(&unit_ball()).expect("build");
        let start = PrimalDualSolution::new(vec![1.0, 1.0], vec![1.0, 0.0], vec![0.0]);
        assert!(matches!(
            minimizer.set_initials(start),
            Err(SolverError::InvalidStart(_))
        ));
        let short = PrimalDualSolution::new(vec![1.0], vec![1.0, 0.0], vec![0.0]);
        assert!(matches!(
            minimizer.set_initials(short),
            Err(SolverError::Problem(ProblemError::DimensionMismatch(_)))
        ));

        let bad = InteriorPointSolver::new(SolveOptions::default().step_fraction(1.0));
        assert!(bad.solve(&unit_ball()).is_err());
    }

    #[test]
    fn step_length_caps_at_one_and_rejects_nan() {
        assert_eq!(step_length(0.9, f64::INFINITY).expect("ray"), 1.0);
        assert_abs_diff_eq!(step_length(0.9, 0.5).expect("step"), 0.45, epsilon = 1e-15);
        assert!(matches!(
            step_length(0.9, f64::NAN),
            Err(SolverError::NumericalBreakdown(_))
        ));
    }
}
