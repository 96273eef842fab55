//! LP dispatch: routes an [`LpProblem`] to the interior-point engine or the tableau simplex
//! and reports failures in terms of the user's columns.

use crate::ipm::InteriorPointSolver;
use crate::simplex::{SimplexMethod, SimplexSolution, StandardForm};
use conicrs_core::error::{SolverError, SolverResult};
use conicrs_core::iterative::IterativeMinimizer;
use conicrs_core::math::{dot, RealNumber};
use conicrs_core::matrix::DenseMatrix;
use conicrs_core::options::{LpBackend, SolveOptions};
use conicrs_core::problem::{LpProblem, ProblemResult};
use conicrs_core::solution::{LpSolution, Status};
use tracing::{info, warn};

/// How an original variable is represented by non-negative standard-form columns.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Substitution<T> {
    /// `x = offset + z[col]`
    Shifted { col: usize, offset: T },
    /// `x = offset − z[col]`
    Mirrored { col: usize, offset: T },
    /// `x = z[pos] − z[neg]`
    Split { pos: usize, neg: usize },
}

/// An [`LpProblem`] rewritten as `minimize cᵀz, Az = b, z ≥ 0`, with the map back.
#[derive(Debug, Clone)]
pub struct LpStandardForm<T> {
    form: StandardForm<T>,
    substitutions: Vec<Substitution<T>>,
    /// Standard-form row owning each slack or surplus column, by column.
    slack_rows: Vec<Option<usize>>,
}

impl<T> LpStandardForm<T>
where
    T: RealNumber,
{
    pub fn new(problem: &LpProblem<T>) -> ProblemResult<Self> {
        let n = problem.nvars();
        let constraints = problem.constraints();
        let (lower, upper) = match &constraints.bounds {
            Some(b) => (b.lower.clone(), b.upper.clone()),
            None => (vec![T::neg_infinity(); n], vec![T::infinity(); n]),
        };

        let mut substitutions = Vec::with_capacity(n);
        let mut width = 0;
        for j in 0..n {
            let sub = if lower[j].is_finite() {
                Substitution::Shifted {
                    col: width,
                    offset: lower[j],
                }
            } else if upper[j].is_finite() {
                Substitution::Mirrored {
                    col: width,
                    offset: upper[j],
                }
            } else {
                width += 1;
                Substitution::Split {
                    pos: width - 1,
                    neg: width,
                }
            };
            width += 1;
            substitutions.push(sub);
        }

        // (coefficients over x, rhs, slack sign)
        let mut rows: Vec<(Vec<T>, T, Option<T>)> = Vec::new();
        if let Some(le) = &constraints.less_equal {
            for (row, rhs) in le.matrix.rows().zip(le.rhs.iter()) {
                rows.push((row.to_vec(), *rhs, Some(T::one())));
            }
        }
        if let Some(ge) = &constraints.greater_equal {
            for (row, rhs) in ge.matrix.rows().zip(ge.rhs.iter()) {
                rows.push((row.to_vec(), *rhs, Some(-T::one())));
            }
        }
        if let Some(eq) = &constraints.equalities {
            for (row, rhs) in eq.matrix.rows().zip(eq.rhs.iter()) {
                rows.push((row.to_vec(), *rhs, None));
            }
        }
        for j in 0..n {
            if lower[j].is_finite() && upper[j].is_finite() {
                let mut row = vec![T::zero(); n];
                row[j] = T::one();
                rows.push((row, upper[j], Some(T::one())));
            }
        }

        let n_slacks = rows.iter().filter(|(_, _, slack)| slack.is_some()).count();
        let total = width + n_slacks;
        let mut matrix = DenseMatrix::zeros(rows.len(), total);
        let mut rhs = Vec::with_capacity(rows.len());
        let mut slack_rows = vec![None; total];
        let mut next_slack = width;
        for (r, (coefficients, b, slack)) in rows.iter().enumerate() {
            let mut shifted = *b;
            for (j, a) in coefficients.iter().enumerate() {
                if *a == T::zero() {
                    continue;
                }
                match substitutions[j] {
                    Substitution::Shifted { col, offset } => {
                        matrix.set(r, col, *a);
                        shifted -= *a * offset;
                    }
                    Substitution::Mirrored { col, offset } => {
                        matrix.set(r, col, -*a);
                        shifted -= *a * offset;
                    }
                    Substitution::Split { pos, neg } => {
                        matrix.set(r, pos, *a);
                        matrix.set(r, neg, -*a);
                    }
                }
            }
            if let Some(sign) = slack {
                matrix.set(r, next_slack, *sign);
                slack_rows[next_slack] = Some(r);
                next_slack += 1;
            }
            rhs.push(shifted);
        }

        let mut cost = vec![T::zero(); total];
        for (j, c) in problem.cost().iter().enumerate() {
            match substitutions[j] {
                Substitution::Shifted { col, .. } => cost[col] = *c,
                Substitution::Mirrored { col, .. } => cost[col] = -*c,
                Substitution::Split { pos, neg } => {
                    cost[pos] = *c;
                    cost[neg] = -*c;
                }
            }
        }

        Ok(Self {
            form: StandardForm::new(matrix, rhs, cost)?,
            substitutions,
            slack_rows,
        })
    }

    pub fn form(&self) -> &StandardForm<T> {
        &self.form
    }

    /// Original variable behind a standard-form column, or `n + row` for slack columns.
    pub fn original_column(&self, column: usize) -> usize {
        if let Some(Some(row)) = self.slack_rows.get(column) {
            return self.substitutions.len() + row;
        }
        self.substitutions
            .iter()
            .position(|sub| match *sub {
                Substitution::Shifted { col, .. } | Substitution::Mirrored { col, .. } => {
                    col == column
                }
                Substitution::Split { pos, neg } => pos == column || neg == column,
            })
            .unwrap_or(column)
    }

    pub fn recover(&self, z: &[T]) -> Vec<T> {
        self.substitutions
            .iter()
            .map(|sub| match *sub {
                Substitution::Shifted { col, offset } => offset + z[col],
                Substitution::Mirrored { col, offset } => offset - z[col],
                Substitution::Split { pos, neg } => z[pos] - z[neg],
            })
            .collect()
    }

    pub fn translate(&self, error: SolverError) -> SolverError {
        match error {
            SolverError::Unbounded { column } => SolverError::Unbounded {
                column: self.original_column(column),
            },
            other => other,
        }
    }
}

pub type SimplexMinimizer<T> = IterativeMinimizer<T, SimplexMethod<T>>;

/// Stateless LP front end configured with a backend and solve options.
#[derive(Debug, Clone)]
pub struct LpSolver<T> {
    backend: LpBackend,
    options: SolveOptions<T>,
}

impl<T> LpSolver<T>
where
    T: RealNumber,
{
    pub fn new(backend: LpBackend, options: SolveOptions<T>) -> Self {
        Self { backend, options }
    }

    pub fn backend(&self) -> LpBackend {
        self.backend
    }

    pub fn options(&self) -> &SolveOptions<T> {
        &self.options
    }

    /// Binds `problem` to a fresh simplex minimizer over its standard form.
    pub fn simplex(
        &self,
        problem: &LpProblem<T>,
    ) -> SolverResult<(LpStandardForm<T>, SimplexMinimizer<T>)> {
        let standard = LpStandardForm::new(problem)?;
        let method = SimplexMethod::new(standard.form().clone(), self.options.tolerance.epsilon());
        Ok((standard, IterativeMinimizer::new(method, self.options.clone())))
    }

    pub fn solve(&self, problem: &LpProblem<T>) -> SolverResult<LpSolution<T>> {
        match self.backend {
            LpBackend::Simplex => self.solve_simplex(problem),
            LpBackend::InteriorPoint => self.solve_interior_point(problem),
        }
    }

    fn solve_simplex(&self, problem: &LpProblem<T>) -> SolverResult<LpSolution<T>> {
        let (standard, mut minimizer) = self.simplex(problem)?;
        let solution = minimizer.search().map_err(|e| standard.translate(e))?;
        Ok(Self::simplex_solution(problem, &standard, solution))
    }

    fn simplex_solution(
        problem: &LpProblem<T>,
        standard: &LpStandardForm<T>,
        solution: SimplexSolution<T>,
    ) -> LpSolution<T> {
        let x = standard.recover(&solution.z);
        LpSolution {
            objective_value: dot(problem.cost(), &x),
            x,
            status: solution.status,
            backend: LpBackend::Simplex,
            iterations: solution.iterations,
            inequality_dual: None,
            basis: Some(solution.basis),
            stats: solution.stats,
        }
    }

    fn solve_interior_point(&self, problem: &LpProblem<T>) -> SolverResult<LpSolution<T>> {
        let ipm = InteriorPointSolver::new(self.options.clone());
        let mut minimizer = match ipm.solve_lp(problem) {
            Ok(minimizer) => minimizer,
            Err(SolverError::Problem(err)) if problem.normalized_inequalities().is_empty() => {
                info!(%err, "LP has no inequality rows; using the simplex backend");
                return self.solve_simplex(problem);
            }
            Err(err) => return Err(err),
        };
        match minimizer.search() {
            Ok(solution) if solution.status != Status::MaxIterations => {
                Ok(minimizer.method().lp_solution(problem, solution))
            }
            Ok(solution) => {
                warn!(
                    iterations = solution.iterations,
                    "interior point hit the iteration cap; classifying with simplex"
                );
                self.classify(problem, Ok(minimizer.method().lp_solution(problem, solution)))
            }
            Err(err @ SolverError::NumericalBreakdown(_)) => {
                warn!(%err, "interior point broke down; classifying with simplex");
                self.classify(problem, Err(err))
            }
            Err(err @ (SolverError::Unbounded { .. } | SolverError::Infeasible { .. })) => {
                info!(%err, "interior point found a certificate; confirming with simplex");
                self.classify(problem, Err(err))
            }
            Err(err) => Err(err),
        }
    }

    /// Runs the simplex backend after an interior-point failure or certificate. Its
    /// unboundedness or infeasibility verdict, or an optimal answer, replaces the IPM outcome.
    fn classify(
        &self,
        problem: &LpProblem<T>,
        fallback: SolverResult<LpSolution<T>>,
    ) -> SolverResult<LpSolution<T>> {
        match self.solve_simplex(problem) {
            Ok(solution) if solution.status == Status::Optimal => Ok(solution),
            Ok(_) => fallback,
            Err(err @ (SolverError::Unbounded { .. } | SolverError::Infeasible { .. })) => Err(err),
            Err(_) => fallback,
        }
    }
}
