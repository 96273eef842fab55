//! Primal active-set method for convex QPs.
//!
//! Inequalities are normalized to `aᵢᵀx ≥ rᵢ`; equalities stay in the working set for the
//! whole solve. Each step solves the equality-restricted KKT system on the working set,
//! then either drops a constraint with a negative multiplier or walks to the nearest
//! blocking constraint.

use crate::simplex::{SimplexMethod, StandardForm};
use conicrs_core::error::{SolverError, SolverResult};
use conicrs_core::iterative::{IterativeMethod, IterativeMinimizer};
use conicrs_core::math::{argmax_abs, axpy, constant, dot, norm2, norm_inf, to_f64, RealNumber};
use conicrs_core::matrix::DenseMatrix;
use conicrs_core::options::SolveOptions;
use conicrs_core::problem::{NormalizedInequalities, QpProblem};
use conicrs_core::solution::{QpSolution, Status};
use conicrs_core::stats::{IterationRecord, SolveStats, StepWork};
use conicrs_core::tolerance::{Tolerance, TolerancePolicy};
use conicrs_core::traits::KktSolver;
use conicrs_linsys::dense::{DenseKktMatrix, DenseKktSolver, KktPattern, LdlSettings};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSetState<T> {
    pub x: Vec<T>,
    /// Indices into the normalized inequality rows.
    pub working: Vec<usize>,
    /// Multipliers matching `working`, from the latest KKT solve.
    pub multipliers: Vec<T>,
    pub equality_multipliers: Vec<T>,
    pub optimal: bool,
}

pub struct ActiveSetMethod<T: RealNumber> {
    problem: QpProblem<T>,
    rows: NormalizedInequalities<T>,
    equality_matrix: DenseMatrix<T>,
    equality_rhs: Vec<T>,
    tolerance: TolerancePolicy<T>,
    multiplier_tolerance: T,
    feasibility_tolerance: T,
    regularization: T,
    refinement_steps: usize,
}

impl<T> ActiveSetMethod<T>
where
    T: RealNumber,
{
    pub fn new(problem: &QpProblem<T>, options: &SolveOptions<T>) -> Self {
        let n = problem.nvars();
        let rows = problem.normalized_inequalities();
        let (equality_matrix, equality_rhs) = problem.constraints().equality_system(n);
        let scale = T::one().max(problem.quadratic().norm_inf());
        let multiplier_tolerance = options
            .multiplier_tolerance
            .unwrap_or_else(|| T::epsilon().sqrt() * scale);
        let rhs_norm = norm_inf(&rows.rhs).max(norm_inf(&equality_rhs));
        Self {
            problem: problem.clone(),
            rows,
            equality_matrix,
            equality_rhs,
            feasibility_tolerance: options.tolerance.epsilon() * (T::one() + rhs_norm),
            tolerance: options.tolerance,
            multiplier_tolerance,
            regularization: constant::<T>(1e-10) * scale,
            refinement_steps: options.refinement_steps,
        }
    }

    pub fn problem(&self) -> &QpProblem<T> {
        &self.problem
    }

    pub fn multiplier_tolerance(&self) -> T {
        self.multiplier_tolerance
    }

    fn n(&self) -> usize {
        self.problem.nvars()
    }

    fn n_equalities(&self) -> usize {
        self.equality_rhs.len()
    }

    /// Largest violation over every constraint.
    fn violation(&self, x: &[T]) -> T {
        let inequality = self
            .rows
            .matrix
            .rows()
            .zip(self.rows.rhs.iter())
            .map(|(a, r)| (*r - dot(a, x)).max(T::zero()))
            .fold(T::zero(), |acc, v| acc.max(v));
        let equality = self
            .equality_matrix
            .rows()
            .zip(self.equality_rhs.iter())
            .map(|(a, e)| (dot(a, x) - *e).abs())
            .fold(T::zero(), |acc, v| acc.max(v));
        inequality.max(equality)
    }

    /// Tight inequalities, kept only when linearly independent of the rows already chosen.
    fn initial_working_set(&self, x: &[T]) -> Vec<usize> {
        let mut basis: Vec<Vec<T>> = Vec::new();
        for row in self.equality_matrix.rows() {
            let residual = project_out(&basis, row);
            let norm = norm2(&residual);
            if norm > constant(1e-10) {
                basis.push(residual.iter().map(|v| *v / norm).collect());
            }
        }
        let mut working = Vec::new();
        for (i, (a, r)) in self.rows.matrix.rows().zip(self.rows.rhs.iter()).enumerate() {
            if self.n_equalities() + working.len() >= self.n() {
                break;
            }
            if (dot(a, x) - *r).abs() > self.feasibility_tolerance {
                continue;
            }
            let residual = project_out(&basis, a);
            let norm = norm2(&residual);
            if norm > constant::<T>(1e-8) * T::one().max(norm2(a)) {
                basis.push(residual.iter().map(|v| *v / norm).collect());
                working.push(i);
            }
        }
        working
    }

    fn seeded(&self, x: Vec<T>) -> ActiveSetState<T> {
        let working = self.initial_working_set(&x);
        debug!(working = working.len(), "initial working set");
        ActiveSetState {
            multipliers: vec![T::zero(); working.len()],
            equality_multipliers: vec![T::zero(); self.n_equalities()],
            x,
            working,
            optimal: false,
        }
    }

    /// Phase-one simplex on `x = x⁺ − x⁻` with one surplus column per inequality row.
    fn feasible_point(&self) -> SolverResult<Vec<T>> {
        let n = self.n();
        let k = self.rows.len();
        let n_rows = self.n_equalities() + k;
        if n_rows == 0 {
            return Ok(vec![T::zero(); n]);
        }
        let width = 2 * n + k;
        let mut matrix = DenseMatrix::zeros(n_rows, width);
        let mut rhs = Vec::with_capacity(n_rows);
        let sources = self
            .equality_matrix
            .rows()
            .zip(self.equality_rhs.iter())
            .map(|(a, e)| (a, *e, None))
            .chain(
                self.rows
                    .matrix
                    .rows()
                    .zip(self.rows.rhs.iter())
                    .enumerate()
                    .map(|(i, (a, r))| (a, *r, Some(i))),
            );
        for (row, (a, b, surplus)) in sources.enumerate() {
            for (j, v) in a.iter().enumerate() {
                matrix.set(row, j, *v);
                matrix.set(row, n + j, -*v);
            }
            if let Some(i) = surplus {
                matrix.set(row, 2 * n + i, -T::one());
            }
            rhs.push(b);
        }
        let form = StandardForm::new(matrix, rhs, vec![T::zero(); width])?;
        let method = SimplexMethod::new(form, self.tolerance.epsilon());
        let options = SolveOptions::default().max_iterations(usize::MAX);
        let solution = IterativeMinimizer::new(method, options).search()?;
        Ok((0..n).map(|j| solution.z[j] - solution.z[n + j]).collect())
    }

    fn working_matrix(&self, working: &[usize]) -> DenseMatrix<T> {
        let mut matrix = self.equality_matrix.clone();
        for &i in working {
            matrix.data.extend_from_slice(self.rows.matrix.row(i));
            matrix.nrows += 1;
        }
        matrix
    }

    /// Solves `[[H, A_Wᵀ], [A_W, 0]] [p; ν] = [−g; 0]` and returns `(p, λ = −ν, work)`.
    fn equality_step(
        &self,
        working: &[usize],
        gradient: &[T],
    ) -> SolverResult<(Vec<T>, Vec<T>, StepWork)> {
        let n = self.n();
        let a_w = self.working_matrix(working);
        let kkt = DenseKktMatrix::from_blocks(self.problem.quadratic(), &a_w);
        let mut solver = DenseKktSolver::with_settings(LdlSettings {
            static_primal: self.regularization,
            static_dual: self.regularization,
            refinement_steps: self.refinement_steps,
            ..LdlSettings::default()
        });
        solver.analyze_pattern(&KktPattern::new(kkt.dimension, n))?;
        solver.factor(&kkt)?;
        let mut rhs: Vec<T> = gradient.iter().map(|g| -*g).collect();
        rhs.resize(kkt.dimension, T::zero());
        solver.solve(&mut rhs)?;
        let lambda = rhs.split_off(n).into_iter().map(|v| -v).collect();
        let regularized = solver.regularized_pivots();
        if regularized > 0 {
            warn!(regularized, "working-set KKT matrix needed pivot regularization");
        }
        let work = StepWork {
            factorizations: 1,
            linear_solves: 1,
            regularized_pivots: regularized,
        };
        Ok((rhs, lambda, work))
    }

    /// Index of the most negative inequality multiplier below the sign tolerance.
    fn most_negative(&self, multipliers: &[T]) -> Option<usize> {
        multipliers
            .iter()
            .enumerate()
            .filter(|(_, v)| **v < -self.multiplier_tolerance)
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| idx)
    }

    /// Nearest constraint outside the working set hit along `p`, capped at a full step.
    fn ratio_test(&self, state: &ActiveSetState<T>, p: &[T]) -> (T, Option<usize>) {
        let p_norm = norm2(p);
        let mut alpha = T::one();
        let mut blocking = None;
        for (i, (a, r)) in self.rows.matrix.rows().zip(self.rows.rhs.iter()).enumerate() {
            if state.working.contains(&i) {
                continue;
            }
            let ap = dot(a, p);
            if ap < -T::epsilon() * norm2(a) * p_norm {
                let ratio = (*r - dot(a, &state.x)) / ap;
                if ratio < alpha {
                    alpha = ratio.max(T::zero());
                    blocking = Some(i);
                }
            }
        }
        (alpha, blocking)
    }
}

fn project_out<T: RealNumber>(basis: &[Vec<T>], v: &[T]) -> Vec<T> {
    let mut residual = v.to_vec();
    for q in basis {
        let f = dot(&residual, q);
        axpy(-f, q, &mut residual);
    }
    residual
}

impl<T> IterativeMethod<T> for ActiveSetMethod<T>
where
    T: RealNumber,
{
    /// A feasible primal point.
    type Start = Vec<T>;
    type State = ActiveSetState<T>;
    type Output = QpSolution<T>;

    fn prepare(&self, x: Vec<T>) -> SolverResult<ActiveSetState<T>> {
        if x.len() != self.n() {
            return Err(SolverError::dimension(format!(
                "start has {} entries, expected {}",
                x.len(),
                self.n()
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::InvalidStart(
                "start contains non-finite entries".into(),
            ));
        }
        let violation = self.violation(&x);
        if violation > self.feasibility_tolerance {
            return Err(SolverError::Infeasible {
                violation: to_f64(violation),
            });
        }
        Ok(self.seeded(x))
    }

    fn default_start(&self) -> SolverResult<ActiveSetState<T>> {
        let x = self.feasible_point()?;
        Ok(self.seeded(x))
    }

    fn step(
        &self,
        state: &ActiveSetState<T>,
    ) -> SolverResult<(ActiveSetState<T>, IterationRecord<T>)> {
        let k = self.n_equalities();
        let gradient = self.problem.gradient(&state.x);
        let (p, lambda, work) = self.equality_step(&state.working, &gradient)?;
        let mut next = state.clone();
        next.equality_multipliers = lambda[..k].to_vec();
        next.multipliers = lambda[k..].to_vec();

        let p_norm = norm2(&p);
        let mut alpha = T::zero();
        if self.tolerance.is_small(p_norm / (T::one() + norm2(&state.x))) {
            match self.most_negative(&next.multipliers) {
                None => next.optimal = true,
                Some(idx) => {
                    debug!(row = next.working[idx], "dropping constraint from working set");
                    next.working.remove(idx);
                    next.multipliers.remove(idx);
                }
            }
        } else {
            let (step, blocking) = self.ratio_test(state, &p);
            alpha = step;
            axpy(alpha, &p, &mut next.x);
            match blocking {
                Some(i) => {
                    debug!(row = i, "adding blocking constraint to working set");
                    next.working.push(i);
                    next.multipliers.push(T::zero());
                }
                None => {
                    let curvature = dot(&p, &self.problem.quadratic().mul_vec(&p));
                    if dot(&gradient, &p) < T::zero()
                        && curvature <= self.multiplier_tolerance * p_norm * p_norm
                    {
                        return Err(SolverError::Unbounded {
                            column: argmax_abs(&p),
                        });
                    }
                    // A full step lands on the working-set minimizer, where λ is exact.
                    if self.most_negative(&next.multipliers).is_none() {
                        next.optimal = true;
                    }
                }
            }
        }

        let record = IterationRecord::new(
            0,
            self.violation(&next.x),
            p_norm,
            next.multipliers
                .iter()
                .fold(T::zero(), |acc, v| acc.max(-*v)),
            alpha,
            self.problem.objective(&next.x),
        )
        .with_working_set(next.working.len())
        .with_work(work);
        Ok((next, record))
    }

    fn is_converged(&self, state: &ActiveSetState<T>, _tolerance: &TolerancePolicy<T>) -> bool {
        state.optimal
    }

    fn finish(
        &self,
        state: ActiveSetState<T>,
        status: Status,
        stats: SolveStats<T>,
    ) -> QpSolution<T> {
        QpSolution {
            objective_value: self.problem.objective(&state.x),
            active_set: state
                .working
                .iter()
                .map(|&i| self.rows.origins[i])
                .collect(),
            x: state.x,
            multipliers: state.multipliers,
            equality_multipliers: state.equality_multipliers,
            status,
            iterations: stats.history.len(),
            stats,
        }
    }
}

pub type ActiveSetMinimizer<T> = IterativeMinimizer<T, ActiveSetMethod<T>>;

#[derive(Debug, Clone)]
pub struct ActiveSetSolver<T> {
    options: SolveOptions<T>,
}

impl<T> Default for ActiveSetSolver<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self::new(SolveOptions::default())
    }
}

impl<T> ActiveSetSolver<T>
where
    T: RealNumber,
{
    pub fn new(options: SolveOptions<T>) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SolveOptions<T> {
        &self.options
    }

    pub fn solve(&self, problem: &QpProblem<T>) -> SolverResult<ActiveSetMinimizer<T>> {
        problem.validate()?;
        let method = ActiveSetMethod::new(problem, &self.options);
        Ok(IterativeMinimizer::new(method, self.options.clone()))
    }
}
