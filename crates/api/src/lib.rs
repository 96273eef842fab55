#![forbid(unsafe_code)]

use conicrs_algos::{ActiveSetSolver, InteriorPointSolver, LpSolver};
use conicrs_core::error::SolverError;
use conicrs_core::math::RealNumber;
use conicrs_core::matrix::DenseMatrix;
use conicrs_core::problem::{
    Bounds, ConeBlock, ConstraintSet, LinearConstraints, LpProblem, Problem, QpProblem,
    SocpProblem,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use conicrs_core::options::{LpBackend, Method, SolveOptions};
pub use conicrs_core::solution::{ConicSolution, LpSolution, QpSolution, Status};
pub use conicrs_core::stats::SolveStats;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("problem validation failed: {0}")]
    InvalidProblem(String),
    #[error("method {method:?} cannot solve {kind} problems")]
    Unsupported { method: Method, kind: &'static str },
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Collects the constraint systems shared by the LP and QP builders.
#[derive(Debug, Clone)]
struct ConstraintParts<T> {
    less_equal: Option<LinearConstraints<T>>,
    greater_equal: Option<LinearConstraints<T>>,
    equalities: Option<LinearConstraints<T>>,
    bounds: Option<Bounds<T>>,
}

impl<T> Default for ConstraintParts<T> {
    fn default() -> Self {
        Self {
            less_equal: None,
            greater_equal: None,
            equalities: None,
            bounds: None,
        }
    }
}

impl<T> ConstraintParts<T> {
    fn into_set(self) -> ConstraintSet<T> {
        ConstraintSet {
            less_equal: self.less_equal,
            greater_equal: self.greater_equal,
            equalities: self.equalities,
            bounds: self.bounds,
        }
    }
}

/// Matrix arguments accept a [`DenseMatrix`] or a borrowed
/// [`CscMatrix`](conicrs_core::matrix::CscMatrix).
#[derive(Debug, Clone)]
pub struct QpBuilder<T: RealNumber> {
    quadratic: Option<DenseMatrix<T>>,
    linear: Option<Vec<T>>,
    constraints: ConstraintParts<T>,
}

impl<T> Default for QpBuilder<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            quadratic: None,
            linear: None,
            constraints: ConstraintParts::default(),
        }
    }
}

impl<T> QpBuilder<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quadratic(mut self, matrix: impl Into<DenseMatrix<T>>) -> Self {
        self.quadratic = Some(matrix.into());
        self
    }

    pub fn linear(mut self, vector: Vec<T>) -> Self {
        self.linear = Some(vector);
        self
    }

    pub fn less_equal(mut self, matrix: impl Into<DenseMatrix<T>>, rhs: Vec<T>) -> Self {
        self.constraints.less_equal = Some(LinearConstraints::new(matrix.into(), rhs));
        self
    }

    pub fn greater_equal(mut self, matrix: impl Into<DenseMatrix<T>>, rhs: Vec<T>) -> Self {
        self.constraints.greater_equal = Some(LinearConstraints::new(matrix.into(), rhs));
        self
    }

    pub fn equalities(mut self, matrix: impl Into<DenseMatrix<T>>, rhs: Vec<T>) -> Self {
        self.constraints.equalities = Some(LinearConstraints::new(matrix.into(), rhs));
        self
    }

    pub fn bounds(mut self, bounds: Bounds<T>) -> Self {
        self.constraints.bounds = Some(bounds);
        self
    }

    pub fn build(self) -> Result<QpProblem<T>, ApiError> {
        let quadratic = self
            .quadratic
            .ok_or_else(|| ApiError::InvalidProblem("quadratic matrix missing".into()))?;
        let linear = self
            .linear
            .ok_or_else(|| ApiError::InvalidProblem("linear term missing".into()))?;
        QpProblem::new(quadratic, linear, self.constraints.into_set())
            .map_err(|err| ApiError::InvalidProblem(err.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct LpBuilder<T: RealNumber> {
    cost: Option<Vec<T>>,
    constraints: ConstraintParts<T>,
}

impl<T> Default for LpBuilder<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            cost: None,
            constraints: ConstraintParts::default(),
        }
    }
}

impl<T> LpBuilder<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cost(mut self, cost: Vec<T>) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn less_equal(mut self, matrix: impl Into<DenseMatrix<T>>, rhs: Vec<T>) -> Self {
        self.constraints.less_equal = Some(LinearConstraints::new(matrix.into(), rhs));
        self
    }

    pub fn greater_equal(mut self, matrix: impl Into<DenseMatrix<T>>, rhs: Vec<T>) -> Self {
        self.constraints.greater_equal = Some(LinearConstraints::new(matrix.into(), rhs));
        self
    }

    pub fn equalities(mut self, matrix: impl Into<DenseMatrix<T>>, rhs: Vec<T>) -> Self {
        self.constraints.equalities = Some(LinearConstraints::new(matrix.into(), rhs));
        self
    }

    pub fn bounds(mut self, bounds: Bounds<T>) -> Self {
        self.constraints.bounds = Some(bounds);
        self
    }

    pub fn build(self) -> Result<LpProblem<T>, ApiError> {
        let cost = self
            .cost
            .ok_or_else(|| ApiError::InvalidProblem("objective vector missing".into()))?;
        LpProblem::new(cost, self.constraints.into_set())
            .map_err(|err| ApiError::InvalidProblem(err.to_string()))
    }
}

/// Assembles `maximize bᵀy` over a list of cone blocks `c_i − A_iᵀy ∈ K`.
#[derive(Debug, Clone)]
pub struct SocpBuilder<T: RealNumber> {
    b: Option<Vec<T>>,
    blocks: Vec<(DenseMatrix<T>, Vec<T>)>,
    equalities: Option<LinearConstraints<T>>,
}

impl<T> Default for SocpBuilder<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            b: None,
            blocks: Vec::new(),
            equalities: None,
        }
    }
}

impl<T> SocpBuilder<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objective(mut self, b: Vec<T>) -> Self {
        self.b = Some(b);
        self
    }

    /// Appends a block given its transposed map `A_iᵀ` (d × m) and offset `c_i`.
    pub fn block(mut self, a_t: impl Into<DenseMatrix<T>>, c: Vec<T>) -> Self {
        self.blocks.push((a_t.into(), c));
        self
    }

    pub fn equalities(mut self, matrix: impl Into<DenseMatrix<T>>, rhs: Vec<T>) -> Self {
        self.equalities = Some(LinearConstraints::new(matrix.into(), rhs));
        self
    }

    pub fn build(self) -> Result<SocpProblem<T>, ApiError> {
        let b = self
            .b
            .ok_or_else(|| ApiError::InvalidProblem("objective vector missing".into()))?;
        let blocks = self
            .blocks
            .into_iter()
            .map(|(a_t, c)| ConeBlock::new(a_t, c))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ApiError::InvalidProblem(err.to_string()))?;
        SocpProblem::new(b, blocks, self.equalities)
            .map_err(|err| ApiError::InvalidProblem(err.to_string()))
    }
}

/// Result of solving any [`Problem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Solution<T> {
    Lp(LpSolution<T>),
    Qp(QpSolution<T>),
    Socp(ConicSolution<T>),
}

impl<T> Solution<T>
where
    T: RealNumber,
{
    pub fn status(&self) -> Status {
        match self {
            Solution::Lp(s) => s.status,
            Solution::Qp(s) => s.status,
            Solution::Socp(s) => s.status,
        }
    }

    pub fn objective_value(&self) -> T {
        match self {
            Solution::Lp(s) => s.objective_value,
            Solution::Qp(s) => s.objective_value,
            Solution::Socp(s) => s.objective_value,
        }
    }

    pub fn iterations(&self) -> usize {
        match self {
            Solution::Lp(s) => s.iterations,
            Solution::Qp(s) => s.iterations,
            Solution::Socp(s) => s.iterations,
        }
    }

    /// The primal point: `x` for LP/QP, `y` for SOCP.
    pub fn point(&self) -> &[T] {
        match self {
            Solution::Lp(s) => &s.x,
            Solution::Qp(s) => &s.x,
            Solution::Socp(s) => s.y(),
        }
    }
}

/// Facade choosing a backend per problem family from a single [`Method`].
///
/// LPs map `ActiveSet` onto the simplex backend, which is the pivoting method for that family.
/// SOCPs only accept `InteriorPoint`.
#[derive(Debug, Clone)]
pub struct Solver<T: RealNumber> {
    method: Method,
    options: SolveOptions<T>,
}

impl<T> Solver<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self {
            method: Method::InteriorPoint,
            options: SolveOptions::default(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn options(mut self, options: SolveOptions<T>) -> Self {
        self.options = options;
        self
    }

    pub fn solve_qp(&self, problem: &QpProblem<T>) -> Result<QpSolution<T>, ApiError> {
        match self.method {
            Method::ActiveSet => {
                let mut minimizer = ActiveSetSolver::new(self.options.clone()).solve(problem)?;
                Ok(minimizer.search()?)
            }
            Method::InteriorPoint => {
                let mut minimizer =
                    InteriorPointSolver::new(self.options.clone()).solve_qp(problem)?;
                let conic = minimizer.search()?;
                Ok(minimizer.method().qp_solution(problem, conic))
            }
            Method::Simplex => Err(ApiError::Unsupported {
                method: self.method,
                kind: "qp",
            }),
        }
    }

    pub fn solve_lp(&self, problem: &LpProblem<T>) -> Result<LpSolution<T>, ApiError> {
        let backend = match self.method {
            Method::InteriorPoint => LpBackend::InteriorPoint,
            Method::ActiveSet | Method::Simplex => LpBackend::Simplex,
        };
        Ok(LpSolver::new(backend, self.options.clone()).solve(problem)?)
    }

    pub fn solve_socp(&self, problem: &SocpProblem<T>) -> Result<ConicSolution<T>, ApiError> {
        match self.method {
            Method::InteriorPoint => {
                let mut minimizer = InteriorPointSolver::new(self.options.clone()).solve(problem)?;
                Ok(minimizer.search()?)
            }
            method => Err(ApiError::Unsupported {
                method,
                kind: "socp",
            }),
        }
    }

    pub fn solve(&self, problem: &Problem<T>) -> Result<Solution<T>, ApiError> {
        info!(kind = problem.kind(), method = ?self.method, nvars = problem.nvars(), "solving");
        match problem {
            Problem::Lp(lp) => self.solve_lp(lp).map(Solution::Lp),
            Problem::Qp(qp) => self.solve_qp(qp).map(Solution::Qp),
            Problem::Socp(socp) => self.solve_socp(socp).map(Solution::Socp),
        }
    }
}

impl<T> Default for Solver<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Solves independent problems in parallel, one sequential solve per problem.
pub fn solve_batch<T: RealNumber>(
    solver: &Solver<T>,
    problems: &[Problem<T>],
) -> Vec<Result<Solution<T>, ApiError>> {
    problems
        .par_iter()
        .map(|problem| solver.solve(problem))
        .collect()
}

pub fn solve_qp<T: RealNumber>(
    problem: &QpProblem<T>,
    options: SolveOptions<T>,
) -> Result<QpSolution<T>, ApiError> {
    Solver::new()
        .method(Method::ActiveSet)
        .options(options)
        .solve_qp(problem)
}

pub fn solve_lp<T: RealNumber>(
    problem: &LpProblem<T>,
    options: SolveOptions<T>,
) -> Result<LpSolution<T>, ApiError> {
    Solver::new().options(options).solve_lp(problem)
}

pub fn solve_socp<T: RealNumber>(
    problem: &SocpProblem<T>,
    options: SolveOptions<T>,
) -> Result<ConicSolution<T>, ApiError> {
    Solver::new().options(options).solve_socp(problem)
}
