use crate::math::{to_f64, RealNumber};
use crate::stats::IterationRecord;
use tracing::debug;

/// Observes accepted iterates. Monitors never influence the iteration.
pub trait IterationMonitor<S, T: RealNumber> {
    fn observe(&mut self, state: &S, record: &IterationRecord<T>);
}

impl<S, T: RealNumber> IterationMonitor<S, T> for () {
    fn observe(&mut self, _state: &S, _record: &IterationRecord<T>) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IterationCounter {
    count: usize,
}

impl IterationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl<S, T: RealNumber> IterationMonitor<S, T> for IterationCounter {
    fn observe(&mut self, _state: &S, _record: &IterationRecord<T>) {
        self.count += 1;
    }
}

/// Keeps every iteration record and emits it as a `debug` event.
#[derive(Debug, Clone)]
pub struct TraceMonitor<T> {
    records: Vec<IterationRecord<T>>,
}

impl<T> TraceMonitor<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[IterationRecord<T>] {
        &self.records
    }

    pub fn gaps(&self) -> Vec<T> {
        self.records.iter().map(|r| r.gap).collect()
    }
}

impl<T> Default for TraceMonitor<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, T: RealNumber> IterationMonitor<S, T> for TraceMonitor<T> {
    fn observe(&mut self, _state: &S, record: &IterationRecord<T>) {
        debug!(
            iteration = record.iteration,
            primal_residual = to_f64(record.primal_residual),
            dual_residual = to_f64(record.dual_residual),
            gap = to_f64(record.gap),
            step = to_f64(record.step_length),
            "iterate accepted"
        );
        self.records.push(record.clone());
    }
}

/// Clones every accepted state, in order.
#[derive(Debug, Clone)]
pub struct StateHistory<S> {
    states: Vec<S>,
}

impl<S> StateHistory<S> {
    pub fn new() -> Self {
        Self { states: Vec::new() }
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl<S> Default for StateHistory<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone, T: RealNumber> IterationMonitor<S, T> for StateHistory<S> {
    fn observe(&mut self, state: &S, _record: &IterationRecord<T>) {
        self.states.push(state.clone());
    }
}
