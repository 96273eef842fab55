use crate::math::RealNumber;
use crate::options::LpBackend;
use crate::problem::ConstraintRef;
use crate::stats::SolveStats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    Optimal,
    MaxIterations,
    MaxTime,
}

impl Status {
    pub fn is_optimal(self) -> bool {
        self == Status::Optimal
    }
}

/// Interior-point iterate: cone primal `x`, cone slack `s`, variables `y` and equality
/// multipliers `z`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimalDualSolution<T> {
    pub x: Vec<T>,
    pub s: Vec<T>,
    pub y: Vec<T>,
    pub z: Vec<T>,
}

impl<T> PrimalDualSolution<T>
where
    T: RealNumber,
{
    pub fn new(x: Vec<T>, s: Vec<T>, y: Vec<T>) -> Self {
        Self {
            x,
            s,
            y,
            z: Vec::new(),
        }
    }

    pub fn with_equality_multipliers(mut self, z: Vec<T>) -> Self {
        self.z = z;
        self
    }

    /// `xᵀs / len(s)`.
    pub fn complementarity(&self) -> T {
        if self.s.is_empty() {
            return T::zero();
        }
        let n = T::from_usize(self.s.len()).unwrap_or_else(T::one);
        crate::math::dot(&self.x, &self.s) / n
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConicSolution<T> {
    pub point: PrimalDualSolution<T>,
    pub objective_value: T,
    pub status: Status,
    pub iterations: usize,
    pub stats: SolveStats<T>,
}

pub type SocpSolution<T> = ConicSolution<T>;

impl<T> ConicSolution<T>
where
    T: RealNumber,
{
    pub fn y(&self) -> &[T] {
        &self.point.y
    }

    pub fn dual_variables(&self) -> &[T] {
        &self.point.x
    }

    pub fn slack(&self) -> &[T] {
        &self.point.s
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QpSolution<T> {
    pub x: Vec<T>,
    /// Terminal working set, excluding equalities.
    pub active_set: Vec<ConstraintRef>,
    /// Multipliers matching `active_set`, non-negative at optimality.
    pub multipliers: Vec<T>,
    pub equality_multipliers: Vec<T>,
    pub objective_value: T,
    pub status: Status,
    pub iterations: usize,
    pub stats: SolveStats<T>,
}

impl<T> QpSolution<T>
where
    T: RealNumber,
{
    pub fn minimizer(&self) -> &[T] {
        &self.x
    }

    pub fn multiplier(&self, constraint: ConstraintRef) -> Option<T> {
        self.active_set
            .iter()
            .position(|c| *c == constraint)
            .map(|idx| self.multipliers[idx])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpSolution<T> {
    pub x: Vec<T>,
    pub objective_value: T,
    pub status: Status,
    pub backend: LpBackend,
    pub iterations: usize,
    /// Multipliers of the normalized `≥` rows, when the backend produces them.
    pub inequality_dual: Option<Vec<T>>,
    /// Terminal standard-form basis of the simplex backend.
    pub basis: Option<Vec<usize>>,
    pub stats: SolveStats<T>,
}

impl<T> LpSolution<T>
where
    T: RealNumber,
{
    pub fn minimizer(&self) -> &[T] {
        &self.x
    }
}
