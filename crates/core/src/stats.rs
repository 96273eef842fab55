use crate::math::RealNumber;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Linear-algebra work done by a single iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepWork {
    pub factorizations: usize,
    pub linear_solves: usize,
    pub regularized_pivots: usize,
}

impl StepWork {
    pub fn absorb(&mut self, other: StepWork) {
        self.factorizations += other.factorizations;
        self.linear_solves += other.linear_solves;
        self.regularized_pivots += other.regularized_pivots;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord<T> {
    pub iteration: usize,
    pub primal_residual: T,
    pub dual_residual: T,
    pub gap: T,
    pub step_length: T,
    pub objective: T,
    pub working_set: usize,
    pub work: StepWork,
    pub elapsed: Duration,
}

impl<T> IterationRecord<T>
where
    T: RealNumber,
{
    pub fn new(
        iteration: usize,
        primal_residual: T,
        dual_residual: T,
        gap: T,
        step_length: T,
        objective: T,
    ) -> Self {
        Self {
            iteration,
            primal_residual,
            dual_residual,
            gap,
            step_length,
            objective,
            working_set: 0,
            work: StepWork::default(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_working_set(mut self, size: usize) -> Self {
        self.working_set = size;
        self
    }

    pub fn with_work(mut self, work: StepWork) -> Self {
        self.work = work;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveStats<T> {
    pub history: Vec<IterationRecord<T>>,
    pub solve_time: Duration,
    pub factorizations: usize,
    pub linear_solves: usize,
    pub regularized_pivots: usize,
}

impl<T> SolveStats<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            solve_time: Duration::ZERO,
            factorizations: 0,
            linear_solves: 0,
            regularized_pivots: 0,
        }
    }

    pub fn push(&mut self, record: IterationRecord<T>) {
        self.factorizations += record.work.factorizations;
        self.linear_solves += record.work.linear_solves;
        self.regularized_pivots += record.work.regularized_pivots;
        self.history.push(record);
    }

    pub fn last(&self) -> Option<&IterationRecord<T>> {
        self.history.last()
    }
}

impl<T> Default for SolveStats<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_accumulates_work() {
        let mut stats = SolveStats::<f64>::new();
        let work = StepWork {
            factorizations: 1,
            linear_solves: 2,
            regularized_pivots: 0,
        };
        stats.push(IterationRecord::new(0, 1.0, 1.0, 0.5, 1.0, 0.0).with_work(work));
        stats.push(IterationRecord::new(1, 0.1, 0.1, 0.05, 0.9, 0.0).with_work(work));
        assert_eq!(stats.factorizations, 2);
        assert_eq!(stats.linear_solves, 4);
        assert_eq!(stats.last().map(|r| r.iteration), Some(1));
    }
}
