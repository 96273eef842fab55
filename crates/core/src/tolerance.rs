use crate::math::{constant, RealNumber};
use serde::{Deserialize, Serialize};

/// Decides whether a residual norm counts as converged. NaN is never small.
pub trait Tolerance<T: RealNumber> {
    fn is_small(&self, norm: T) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsoluteTolerance<T> {
    pub epsilon: T,
}

impl<T> AbsoluteTolerance<T>
where
    T: RealNumber,
{
    pub fn new(epsilon: T) -> Self {
        Self { epsilon }
    }
}

impl<T> Default for AbsoluteTolerance<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self::new(constant(1e-4))
    }
}

impl<T> Tolerance<T> for AbsoluteTolerance<T>
where
    T: RealNumber,
{
    fn is_small(&self, norm: T) -> bool {
        norm <= self.epsilon
    }
}

/// `norm / base ≤ ε` with `base` fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeTolerance<T> {
    pub base: T,
    pub epsilon: T,
}

impl<T> RelativeTolerance<T>
where
    T: RealNumber,
{
    pub fn new(base: T, epsilon: T) -> Self {
        Self { base, epsilon }
    }

    pub fn with_base(base: T) -> Self {
        Self::new(base, constant(1e-4))
    }
}

impl<T> Tolerance<T> for RelativeTolerance<T>
where
    T: RealNumber,
{
    fn is_small(&self, norm: T) -> bool {
        norm / self.base <= self.epsilon
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
pub enum TolerancePolicy<T> {
    Absolute(AbsoluteTolerance<T>),
    Relative(RelativeTolerance<T>),
}

impl<T> TolerancePolicy<T>
where
    T: RealNumber,
{
    pub fn absolute(epsilon: T) -> Self {
        TolerancePolicy::Absolute(AbsoluteTolerance::new(epsilon))
    }

    pub fn relative(base: T, epsilon: T) -> Self {
        TolerancePolicy::Relative(RelativeTolerance::new(base, epsilon))
    }

    pub fn epsilon(&self) -> T {
        match self {
            TolerancePolicy::Absolute(rule) => rule.epsilon,
            TolerancePolicy::Relative(rule) => rule.epsilon,
        }
    }

    pub fn all_small(&self, norms: &[T]) -> bool {
        norms.iter().all(|norm| self.is_small(*norm))
    }
}

impl<T> Tolerance<T> for TolerancePolicy<T>
where
    T: RealNumber,
{
    fn is_small(&self, norm: T) -> bool {
        match self {
            TolerancePolicy::Absolute(rule) => rule.is_small(norm),
            TolerancePolicy::Relative(rule) => rule.is_small(norm),
        }
    }
}

impl<T> Default for TolerancePolicy<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        TolerancePolicy::Absolute(AbsoluteTolerance::default())
    }
}
