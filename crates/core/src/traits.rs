use crate::error::SolverResult;
use crate::math::RealNumber;

/// Factorize-once, solve-many backend for symmetric KKT systems.
pub trait KktSolver<T: RealNumber>: Send {
    type Pattern;
    type Matrix;

    fn analyze_pattern(&mut self, pattern: &Self::Pattern) -> SolverResult<()>;

    fn factor(&mut self, matrix: &Self::Matrix) -> SolverResult<()>;

    fn solve(&self, rhs: &mut [T]) -> SolverResult<()>;
}
