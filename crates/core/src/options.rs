use crate::math::{constant, RealNumber};
use crate::tolerance::TolerancePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    ActiveSet,
    InteriorPoint,
    Simplex,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LpBackend {
    InteriorPoint,
    Simplex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveOptions<T> {
    pub tolerance: TolerancePolicy<T>,
    pub max_iterations: usize,
    pub max_time: Option<Duration>,
    /// Fraction of the maximal cone step taken by the interior-point method, in (0, 1).
    pub step_fraction: T,
    /// Overrides the active-set multiplier sign test; `None` uses `√ε·max(1, ‖H‖∞)`.
    pub multiplier_tolerance: Option<T>,
    pub refinement_steps: usize,
}

impl<T> SolveOptions<T>
where
    T: RealNumber,
{
    pub fn with_tolerance(tolerance: T) -> Self {
        Self {
            tolerance: TolerancePolicy::absolute(tolerance),
            ..Self::default()
        }
    }

    pub fn tolerance(mut self, policy: TolerancePolicy<T>) -> Self {
        self.tolerance = policy;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn max_time(mut self, limit: Duration) -> Self {
        self.max_time = Some(limit);
        self
    }

    pub fn step_fraction(mut self, fraction: T) -> Self {
        self.step_fraction = fraction;
        self
    }

    pub fn multiplier_tolerance(mut self, tolerance: T) -> Self {
        self.multiplier_tolerance = Some(tolerance);
        self
    }
}

impl<T> Default for SolveOptions<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            tolerance: TolerancePolicy::absolute(constant(1e-8)),
            max_iterations: 500,
            max_time: None,
            step_fraction: constant(0.9),
            multiplier_tolerance: None,
            refinement_steps: 5,
        }
    }
}
