use crate::problem::ProblemError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error(transparent)]
    Problem(#[from] ProblemError),
    #[error("problem is unbounded along column {column}")]
    Unbounded { column: usize },
    #[error("problem is infeasible (violation {violation:.3e})")]
    Infeasible { violation: f64 },
    #[error("numerical breakdown: {0}")]
    NumericalBreakdown(String),
    #[error("invalid starting point: {0}")]
    InvalidStart(String),
}

pub type SolverResult<T> = Result<T, SolverError>;

impl SolverError {
    pub fn dimension(message: impl Into<String>) -> Self {
        SolverError::Problem(ProblemError::DimensionMismatch(message.into()))
    }

    pub fn breakdown(message: impl Into<String>) -> Self {
        SolverError::NumericalBreakdown(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_payload() {
        let err = SolverError::Unbounded { column: 3 };
        assert_eq!(err.to_string(), "problem is unbounded along column 3");
        let err: SolverError = ProblemError::DimensionMismatch("x".into()).into();
        assert_eq!(err.to_string(), "dimension mismatch: x");
        assert!(SolverError::Infeasible { violation: 0.5 }
            .to_string()
            .contains("5.000e-1"));
    }
}
