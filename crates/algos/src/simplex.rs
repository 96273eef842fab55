//! Two-phase dense tableau simplex for `minimize cᵀz subject to Az = b, z ≥ 0`.
//!
//! Each step performs one Bland's-rule pivot. Phase one minimizes the sum of artificial
//! variables; the switch to phase two (drive artificials out, drop redundant rows) is itself
//! a step.

use conicrs_core::error::{SolverError, SolverResult};
use conicrs_core::iterative::IterativeMethod;
use conicrs_core::math::{norm_inf, to_f64, RealNumber};
use conicrs_core::matrix::DenseMatrix;
use conicrs_core::problem::{ProblemError, ProblemResult};
use conicrs_core::solution::Status;
use conicrs_core::stats::{IterationRecord, SolveStats};
use conicrs_core::tolerance::TolerancePolicy;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `minimize cᵀz` subject to `Az = b`, `z ≥ 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardForm<T> {
    pub matrix: DenseMatrix<T>,
    pub rhs: Vec<T>,
    pub cost: Vec<T>,
}

impl<T> StandardForm<T>
where
    T: RealNumber,
{
    pub fn new(matrix: DenseMatrix<T>, rhs: Vec<T>, cost: Vec<T>) -> ProblemResult<Self> {
        matrix.validate()?;
        if matrix.ncols != cost.len() || matrix.nrows != rhs.len() {
            return Err(ProblemError::DimensionMismatch(format!(
                "standard form is {}×{} with {} costs and {} right-hand sides",
                matrix.nrows,
                matrix.ncols,
                cost.len(),
                rhs.len()
            )));
        }
        if cost.is_empty() {
            return Err(ProblemError::DimensionMismatch(
                "standard form has no columns".into(),
            ));
        }
        Ok(Self { matrix, rhs, cost })
    }

    pub fn ncols(&self) -> usize {
        self.cost.len()
    }

    pub fn nrows(&self) -> usize {
        self.rhs.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Feasibility,
    Optimality,
}

/// Tableau rows `[coefficients | artificials | rhs]` with one basic column per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Tableau<T> {
    rows: Vec<Vec<T>>,
    basis: Vec<usize>,
    phase: Phase,
}

impl<T> Tableau<T>
where
    T: RealNumber,
{
    pub fn basis(&self) -> &[usize] {
        &self.basis
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn rhs(&self, row: usize) -> T {
        self.rows[row][self.rows[row].len() - 1]
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let p = self.rows[row][col];
        for v in self.rows[row].iter_mut() {
            *v = *v / p;
        }
        let pivot_row = self.rows[row].clone();
        for (i, other) in self.rows.iter_mut().enumerate() {
            if i == row {
                continue;
            }
            let factor = other[col];
            if factor != T::zero() {
                for (o, pv) in other.iter_mut().zip(pivot_row.iter()) {
                    *o -= factor * *pv;
                }
            }
        }
        self.basis[row] = col;
    }
}

#[derive(Debug, Clone)]
pub struct SimplexSolution<T> {
    /// Standard-form point.
    pub z: Vec<T>,
    pub objective_value: T,
    pub basis: Vec<usize>,
    pub status: Status,
    pub iterations: usize,
    pub stats: SolveStats<T>,
}

pub struct SimplexMethod<T> {
    form: StandardForm<T>,
    tolerance: T,
}

impl<T> SimplexMethod<T>
where
    T: RealNumber,
{
    /// `tolerance` is the pricing and pivot threshold.
    pub fn new(form: StandardForm<T>, tolerance: T) -> Self {
        Self { form, tolerance }
    }

    pub fn form(&self) -> &StandardForm<T> {
        &self.form
    }

    fn n(&self) -> usize {
        self.form.ncols()
    }

    fn width(&self) -> usize {
        self.form.ncols() + self.form.nrows()
    }

    /// Rows flipped to `b ≥ 0` with an artificial basis.
    fn initial_tableau(&self) -> Tableau<T> {
        let m = self.form.nrows();
        let n = self.n();
        let mut rows = Vec::with_capacity(m);
        for (i, coefficients) in self.form.matrix.rows().enumerate() {
            let sign = if self.form.rhs[i] < T::zero() {
                -T::one()
            } else {
                T::one()
            };
            let mut row: Vec<T> = coefficients.iter().map(|v| sign * *v).collect();
            row.extend((0..m).map(|k| if k == i { T::one() } else { T::zero() }));
            row.push(sign * self.form.rhs[i]);
            rows.push(row);
        }
        Tableau {
            rows,
            basis: (n..n + m).collect(),
            phase: Phase::Feasibility,
        }
    }

    fn phase_cost(&self, phase: Phase) -> Vec<T> {
        let n = self.n();
        match phase {
            Phase::Feasibility => (0..self.width())
                .map(|j| if j < n { T::zero() } else { T::one() })
                .collect(),
            Phase::Optimality => {
                let mut cost = self.form.cost.clone();
                cost.resize(self.width(), T::zero());
                cost
            }
        }
    }

    fn reduced_costs(&self, tableau: &Tableau<T>, cost: &[T]) -> Vec<T> {
        let mut d = cost.to_vec();
        for (row, &basic) in tableau.rows.iter().zip(tableau.basis.iter()) {
            let cb = cost[basic];
            if cb != T::zero() {
                for (dj, a) in d.iter_mut().zip(row.iter()) {
                    *dj -= cb * *a;
                }
            }
        }
        d
    }

    fn objective(&self, tableau: &Tableau<T>, cost: &[T]) -> T {
        tableau
            .basis
            .iter()
            .enumerate()
            .fold(T::zero(), |acc, (i, &basic)| acc + cost[basic] * tableau.rhs(i))
    }

    /// Bland's rule: first eligible column with a negative reduced cost.
    fn entering(&self, tableau: &Tableau<T>) -> Option<usize> {
        let cost = self.phase_cost(tableau.phase);
        let limit = match tableau.phase {
            Phase::Feasibility => self.width(),
            Phase::Optimality => self.n(),
        };
        self.reduced_costs(tableau, &cost)[..limit]
            .iter()
            .position(|d| *d < -self.tolerance)
    }

    /// Minimum ratio row, ties broken by the smallest basic index.
    fn leaving(&self, tableau: &Tableau<T>, col: usize) -> Option<(usize, T)> {
        let mut best: Option<(usize, T)> = None;
        for (i, row) in tableau.rows.iter().enumerate() {
            let a = row[col];
            if a > self.tolerance {
                let ratio = tableau.rhs(i) / a;
                let better = match best {
                    None => true,
                    Some((r, current)) => {
                        ratio < current - self.tolerance
                            || ((ratio - current).abs() <= self.tolerance
                                && tableau.basis[i] < tableau.basis[r])
                    }
                };
                if better {
                    best = Some((i, ratio));
                }
            }
        }
        best
    }

    fn start_optimality(&self, mut tableau: Tableau<T>) -> SolverResult<Tableau<T>> {
        let cost = self.phase_cost(Phase::Feasibility);
        let infeasibility = self.objective(&tableau, &cost);
        if infeasibility > self.tolerance * (T::one() + norm_inf(&self.form.rhs)) {
            return Err(SolverError::Infeasible {
                violation: to_f64(infeasibility),
            });
        }
        let n = self.n();
        let mut i = 0;
        while i < tableau.rows.len() {
            if tableau.basis[i] >= n {
                let replacement = tableau.rows[i][..n]
                    .iter()
                    .position(|v| v.abs() > self.tolerance);
                match replacement {
                    Some(col) => tableau.pivot(i, col),
                    None => {
                        debug!(row = i, "dropping redundant constraint row");
                        tableau.rows.remove(i);
                        tableau.basis.remove(i);
                        continue;
                    }
                }
            }
            i += 1;
        }
        tableau.phase = Phase::Optimality;
        Ok(tableau)
    }

    fn point(&self, tableau: &Tableau<T>) -> Vec<T> {
        let mut z = vec![T::zero(); self.n()];
        for (i, &basic) in tableau.basis.iter().enumerate() {
            if basic < self.n() {
                z[basic] = tableau.rhs(i);
            }
        }
        z
    }
}

impl<T> IterativeMethod<T> for SimplexMethod<T>
where
    T: RealNumber,
{
    /// A phase-two basis: one standard-form column per row.
    type Start = Vec<usize>;
    type State = Tableau<T>;
    type Output = SimplexSolution<T>;

    fn prepare(&self, basis: Vec<usize>) -> SolverResult<Tableau<T>> {
        let n = self.n();
        if basis.len() != self.form.nrows() {
            return Err(SolverError::dimension(format!(
                "basis has {} columns for {} rows",
                basis.len(),
                self.form.nrows()
            )));
        }
        let mut tableau = self.initial_tableau();
        for (k, &col) in basis.iter().enumerate() {
            if col >= n || basis[..k].contains(&col) {
                return Err(SolverError::InvalidStart(format!(
                    "basis column {col} is out of range or repeated"
                )));
            }
            let row = (0..tableau.rows.len())
                .find(|&i| tableau.basis[i] >= n && tableau.rows[i][col].abs() > self.tolerance)
                .ok_or_else(|| SolverError::InvalidStart("basis matrix is singular".into()))?;
            tableau.pivot(row, col);
        }
        if (0..tableau.rows.len()).any(|i| tableau.rhs(i) < -self.tolerance) {
            return Err(SolverError::InvalidStart(
                "basis is not primal feasible".into(),
            ));
        }
        tableau.phase = Phase::Optimality;
        Ok(tableau)
    }

    fn default_start(&self) -> SolverResult<Tableau<T>> {
        Ok(self.initial_tableau())
    }

    fn step(&self, state: &Tableau<T>) -> SolverResult<(Tableau<T>, IterationRecord<T>)> {
        let mut next = state.clone();
        let phase_cost = self.phase_cost(state.phase);
        let mut step_length = T::zero();
        match self.entering(state) {
            Some(col) => {
                let (row, ratio) = self
                    .leaving(state, col)
                    .ok_or(SolverError::Unbounded { column: col })?;
                next.pivot(row, col);
                step_length = ratio;
            }
            None if state.phase == Phase::Feasibility => {
                next = self.start_optimality(next)?;
            }
            None => {}
        }
        let infeasibility = match next.phase {
            Phase::Feasibility => self.objective(&next, &phase_cost),
            Phase::Optimality => T::zero(),
        };
        let cost = self.phase_cost(Phase::Optimality);
        let pricing = self
            .reduced_costs(&next, &self.phase_cost(next.phase))
            .iter()
            .fold(T::zero(), |acc, d| acc.max(-*d));
        let record = IterationRecord::new(
            0,
            infeasibility,
            pricing,
            T::zero(),
            step_length,
            self.objective(&next, &cost),
        )
        .with_working_set(next.basis.len());
        Ok((next, record))
    }

    fn is_converged(&self, state: &Tableau<T>, _tolerance: &TolerancePolicy<T>) -> bool {
        state.phase == Phase::Optimality && self.entering(state).is_none()
    }

    fn finish(
        &self,
        state: Tableau<T>,
        status: Status,
        stats: SolveStats<T>,
    ) -> SimplexSolution<T> {
        let z = self.point(&state);
        let cost = self.phase_cost(Phase::Optimality);
        SimplexSolution {
            objective_value: self.objective(&state, &cost),
            z,
            basis: state.basis,
            status,
            iterations: stats.history.len(),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use conicrs_core::iterative::IterativeMinimizer;
    use conicrs_core::options::SolveOptions;

    fn form(rows: &[Vec<f64>], rhs: Vec<f64>, cost: Vec<f64>) -> StandardForm<f64> {
        StandardForm::new(DenseMatrix::from_rows(rows).expect("rows"), rhs, cost).expect("form")
    }

    fn minimizer(form: StandardForm<f64>) -> IterativeMinimizer<f64, SimplexMethod<f64>> {
        IterativeMinimizer::new(SimplexMethod::new(form, 1e-9), SolveOptions::with_tolerance(1e-9))
    }

    /// maximize 3x + 5y s.t. x ≤ 4, 2y ≤ 12, 3x + 2y ≤ 18.
    fn textbook() -> StandardForm<f64> {
        form(
            &[
                vec![1.0, 0.0, 1.0, 0.0, 0.0],
                vec![0.0, 2.0, 0.0, 1.0, 0.0],
                vec![3.0, 2.0, 0.0, 0.0, 1.0],
            ],
            vec![4.0, 12.0, 18.0],
            vec![-3.0, -5.0, 0.0, 0.0, 0.0],
        )
    }

    #[test]
    fn solves_textbook_problem() {
        let solution = minimizer(textbook()).search().expect("solve");
        assert_eq!(solution.status, Status::Optimal);
        assert_abs_diff_eq!(solution.z[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.z[1], 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.objective_value, -36.0, epsilon = 1e-9);
    }

    #[test]
    fn warm_basis_skips_phase_one() {
        let mut minimizer = minimizer(textbook());
        let solution = minimizer.search_from(vec![0, 1, 2]).expect("solve");
        assert_eq!(solution.iterations, 0);
        assert_abs_diff_eq!(solution.objective_value, -36.0, epsilon = 1e-9);
        assert!(matches!(
            minimizer.search_from(vec![0, 0, 1]),
            Err(SolverError::InvalidStart(_))
        ));
        assert!(matches!(
            minimizer.search_from(vec![0, 1, 4]),
            Err(SolverError::InvalidStart(_))
        ));
    }

    #[test]
    fn reports_unbounded_column() {
        let result = minimizer(form(&[vec![1.0, -1.0, -1.0]], vec![1.0], vec![-1.0, 0.0, 0.0]))
            .search();
        assert_eq!(result.unwrap_err(), SolverError::Unbounded { column: 1 });
    }

    #[test]
    fn reports_infeasible_system() {
        let result = minimizer(form(
            &[vec![1.0, 1.0, 1.0, 0.0], vec![1.0, 1.0, 0.0, -1.0]],
            vec![1.0, 3.0],
            vec![1.0, 1.0, 0.0, 0.0],
        ))
        .search();
        assert!(matches!(result, Err(SolverError::Infeasible { .. })));
    }

    #[test]
    fn redundant_rows_are_dropped() {
        let solution = minimizer(form(
            &[vec![1.0, 1.0], vec![2.0, 2.0]],
            vec![1.0, 2.0],
            vec![1.0, 2.0],
        ))
        .search()
        .expect("solve");
        assert_eq!(solution.basis.len(), 1);
        assert_abs_diff_eq!(solution.z[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.objective_value, 1.0, epsilon = 1e-9);
    }
}
