//! Shared lifecycle for iterative solvers.
//!
//! A method exposes a pure `step(state) -> (state, record)`. [`IterativeMinimizer`] owns the
//! mutable state and drives the loop: it applies the tolerance policy, the iteration cap and the
//! optional wall-clock cap, and feeds every accepted iterate to a monitor.
//!
//! Every `search*` call re-seeds the state and solves from scratch, so calling `search()` twice
//! on the same minimizer returns identical results.

use crate::error::{SolverError, SolverResult};
use crate::math::{to_f64, RealNumber, Timer};
use crate::monitor::IterationMonitor;
use crate::options::SolveOptions;
use crate::solution::Status;
use crate::stats::{IterationRecord, SolveStats};
use crate::tolerance::TolerancePolicy;
use tracing::{debug, info};

pub trait IterativeMethod<T: RealNumber> {
    /// What a caller supplies to seed the method.
    type Start;
    type State: Clone;
    type Output;

    /// Validates a caller-supplied start and converts it into a state.
    fn prepare(&self, start: Self::Start) -> SolverResult<Self::State>;

    /// The method's own manufactured starting state.
    fn default_start(&self) -> SolverResult<Self::State>;

    fn step(&self, state: &Self::State) -> SolverResult<(Self::State, IterationRecord<T>)>;

    fn is_converged(&self, state: &Self::State, tolerance: &TolerancePolicy<T>) -> bool;

    fn finish(&self, state: Self::State, status: Status, stats: SolveStats<T>) -> Self::Output;
}

pub struct IterativeMinimizer<T, M>
where
    T: RealNumber,
    M: IterativeMethod<T>,
{
    method: M,
    options: SolveOptions<T>,
    state: Option<M::State>,
    iterations: usize,
    stats: SolveStats<T>,
    timer: Timer,
}

impl<T, M> IterativeMinimizer<T, M>
where
    T: RealNumber,
    M: IterativeMethod<T>,
{
    pub fn new(method: M, options: SolveOptions<T>) -> Self {
        Self {
            method,
            options,
            state: None,
            iterations: 0,
            stats: SolveStats::new(),
            timer: Timer::start(),
        }
    }

    pub fn method(&self) -> &M {
        &self.method
    }

    pub fn options(&self) -> &SolveOptions<T> {
        &self.options
    }

    pub fn state(&self) -> Option<&M::State> {
        self.state.as_ref()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn stats(&self) -> &SolveStats<T> {
        &self.stats
    }

    pub fn set_initials(&mut self, start: M::Start) -> SolverResult<()> {
        let state = self.method.prepare(start)?;
        self.reset(state);
        Ok(())
    }

    pub fn is_converged(&self) -> bool {
        self.state
            .as_ref()
            .map(|state| self.method.is_converged(state, &self.options.tolerance))
            .unwrap_or(false)
    }

    /// Performs one iteration, seeding the default start first when no state exists.
    pub fn step(&mut self) -> SolverResult<IterationRecord<T>> {
        if self.state.is_none() {
            let state = self.method.default_start()?;
            self.reset(state);
        }
        let current = self.current()?;
        let (next, mut record) = self.method.step(current)?;
        record.iteration = self.iterations;
        record.elapsed = self.timer.elapsed();
        debug!(
            iteration = record.iteration,
            primal_residual = to_f64(record.primal_residual),
            dual_residual = to_f64(record.dual_residual),
            gap = to_f64(record.gap),
            step = to_f64(record.step_length),
            working_set = record.working_set,
            "step"
        );
        self.iterations += 1;
        self.stats.push(record.clone());
        self.state = Some(next);
        Ok(record)
    }

    /// Solves from the method's default start.
    pub fn search(&mut self) -> SolverResult<M::Output> {
        self.search_with(None, &mut ())
    }

    pub fn search_from(&mut self, start: M::Start) -> SolverResult<M::Output> {
        self.search_with(Some(start), &mut ())
    }

    pub fn search_with<Mon>(
        &mut self,
        start: Option<M::Start>,
        monitor: &mut Mon,
    ) -> SolverResult<M::Output>
    where
        Mon: IterationMonitor<M::State, T>,
    {
        let state = match start {
            Some(start) => self.method.prepare(start)?,
            None => self.method.default_start()?,
        };
        self.reset(state);
        let status = self.run(monitor)?;
        let state = self.current()?.clone();
        let mut stats = self.stats.clone();
        stats.solve_time = self.timer.elapsed();
        info!(
            ?status,
            iterations = self.iterations,
            elapsed_ms = stats.solve_time.as_secs_f64() * 1e3,
            "search finished"
        );
        Ok(self.method.finish(state, status, stats))
    }

    fn run<Mon>(&mut self, monitor: &mut Mon) -> SolverResult<Status>
    where
        Mon: IterationMonitor<M::State, T>,
    {
        loop {
            if self.method.is_converged(self.current()?, &self.options.tolerance) {
                return Ok(Status::Optimal);
            }
            if self.iterations >= self.options.max_iterations {
                return Ok(Status::MaxIterations);
            }
            if let Some(limit) = self.options.max_time {
                if self.timer.elapsed() >= limit {
                    return Ok(Status::MaxTime);
                }
            }
            let record = self.step()?;
            monitor.observe(self.current()?, &record);
        }
    }

    fn reset(&mut self, state: M::State) {
        self.state = Some(state);
        self.iterations = 0;
        self.stats = SolveStats::new();
        self.timer = Timer::start();
    }

    fn current(&self) -> SolverResult<&M::State> {
        self.state
            .as_ref()
            .ok_or_else(|| SolverError::InvalidStart("minimizer has no current iterate".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{IterationCounter, StateHistory};
    use crate::tolerance::Tolerance;
    use std::time::Duration;

    /// Newton iteration for `√a`.
    struct SquareRoot {
        target: f64,
    }

    impl IterativeMethod<f64> for SquareRoot {
        type Start = f64;
        type State = f64;
        type Output = (f64, Status, usize);

        fn prepare(&self, start: f64) -> SolverResult<f64> {
            if start <= 0.0 {
                return Err(SolverError::InvalidStart("start must be positive".into()));
            }
            Ok(start)
        }

        fn default_start(&self) -> SolverResult<f64> {
            Ok(self.target.max(1.0))
        }

        fn step(&self, state: &f64) -> SolverResult<(f64, IterationRecord<f64>)> {
            let next = 0.5 * (state + self.target / state);
            let residual = (next * next - self.target).abs();
            Ok((next, IterationRecord::new(0, residual, 0.0, 0.0, 1.0, next)))
        }

        fn is_converged(&self, state: &f64, tolerance: &TolerancePolicy<f64>) -> bool {
            tolerance.is_small((state * state - self.target).abs())
        }

        fn finish(&self, state: f64, status: Status, stats: SolveStats<f64>) -> Self::Output {
            (state, status, stats.history.len())
        }
    }

    fn minimizer(max_iterations: usize) -> IterativeMinimizer<f64, SquareRoot> {
        let options = SolveOptions::with_tolerance(1e-12).max_iterations(max_iterations);
        IterativeMinimizer::new(SquareRoot { target: 2.0 }, options)
    }

    #[test]
    fn search_converges_from_default_start() {
        let (root, status, iterations) = minimizer(50).search().expect("search");
        assert_eq!(status, Status::Optimal);
        assert!((root - 2.0_f64.sqrt()).abs() < 1e-10);
        assert!(iterations > 0 && iterations < 10);
    }

    #[test]
    fn repeated_search_is_identical() {
        let mut minimizer = minimizer(50);
        let first = minimizer.search().expect("first");
        let second = minimizer.search().expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn iteration_cap_returns_last_iterate() {
        let (root, status, iterations) = minimizer(1).search_from(100.0).expect("search");
        assert_eq!(status, Status::MaxIterations);
        assert_eq!(iterations, 1);
        assert!((root - 50.01).abs() < 1e-12);
    }

    #[test]
    fn zero_time_budget_stops_immediately() {
        let options = SolveOptions::with_tolerance(1e-12).max_time(Duration::ZERO);
        let mut minimizer = IterativeMinimizer::new(SquareRoot { target: 2.0 }, options);
        let (_, status, iterations) = minimizer.search().expect("search");
        assert_eq!(status, Status::MaxTime);
        assert_eq!(iterations, 0);
    }

    #[test]
    fn manual_stepping_and_start_validation() {
        let mut minimizer = minimizer(50);
        assert!(matches!(
            minimizer.set_initials(-1.0),
            Err(SolverError::InvalidStart(_))
        ));
        assert!(minimizer.state().is_none());
        minimizer.set_initials(1.0).expect("valid start");
        let record = minimizer.step().expect("step");
        assert_eq!(record.iteration, 0);
        assert_eq!(minimizer.state(), Some(&1.5));
        while !minimizer.is_converged() {
            minimizer.step().expect("step");
        }
        assert!(minimizer.iterations() >= 3);
        assert_eq!(minimizer.stats().history.len(), minimizer.iterations());
    }

    #[test]
    fn monitors_see_every_accepted_iterate() {
        let mut minimizer = minimizer(50);
        let mut counter = IterationCounter::new();
        let (_, _, iterations) = minimizer
            .search_with(Some(3.0), &mut counter)
            .expect("search");
        assert_eq!(counter.count(), iterations);

        let mut history = StateHistory::new();
        minimizer
            .search_with(Some(3.0), &mut history)
            .expect("search");
        assert!(history.states().iter().all(|x| *x > 0.0));
        assert_eq!(history.len(), minimizer.iterations());
    }
}
