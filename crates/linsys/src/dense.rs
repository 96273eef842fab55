use conicrs_core::error::{SolverError, SolverResult};
use conicrs_core::math::{constant, norm_inf, to_f64, RealNumber};
use conicrs_core::matrix::DenseMatrix;
use conicrs_core::traits::KktSolver;
use tracing::trace;

/// Dimension and expected inertia: the first `positive` pivots should be positive, the rest
/// negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KktPattern {
    dimension: usize,
    positive: usize,
}

impl KktPattern {
    pub fn new(dimension: usize, positive: usize) -> Self {
        Self {
            dimension,
            positive: positive.min(dimension),
        }
    }

    pub fn definite(dimension: usize) -> Self {
        Self::new(dimension, dimension)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn positive(&self) -> usize {
        self.positive
    }
}

#[derive(Debug, Clone)]
pub struct DenseKktMatrix<T: RealNumber> {
    pub dimension: usize,
    pub data: Vec<T>,
}

impl<T> DenseKktMatrix<T>
where
    T: RealNumber,
{
    pub fn new(dimension: usize, data: Vec<T>) -> Self {
        assert_eq!(dimension * dimension, data.len());
        Self { dimension, data }
    }

    /// `[[top, Cᵀ], [C, 0]]`.
    pub fn from_blocks(top: &DenseMatrix<T>, constraints: &DenseMatrix<T>) -> Self {
        let n = top.nrows;
        let k = constraints.nrows;
        let dimension = n + k;
        let mut data = vec![T::zero(); dimension * dimension];
        for i in 0..n {
            data[i * dimension..i * dimension + n].copy_from_slice(top.row(i));
        }
        for r in 0..k {
            for (j, &value) in constraints.row(r).iter().enumerate() {
                data[(n + r) * dimension + j] = value;
                data[j * dimension + n + r] = value;
            }
        }
        Self { dimension, data }
    }

    fn entry(&self, row: usize, col: usize) -> T {
        self.data[row * self.dimension + col]
    }

    fn mul_vec(&self, x: &[T]) -> Vec<T> {
        (0..self.dimension)
            .map(|i| {
                self.data[i * self.dimension..(i + 1) * self.dimension]
                    .iter()
                    .zip(x.iter())
                    .fold(T::zero(), |acc, (a, b)| acc + *a * *b)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LdlSettings<T> {
    /// Pivots with the expected sign but below `pivot_tolerance·scale` are replaced.
    pub pivot_tolerance: T,
    /// Replacement magnitude, relative to `scale`.
    pub dynamic_regularization: T,
    /// Added to the positive block diagonal before factorizing.
    pub static_primal: T,
    /// Subtracted from the negative block diagonal before factorizing.
    pub static_dual: T,
    pub refinement_steps: usize,
}

impl<T> Default for LdlSettings<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            pivot_tolerance: constant(1e-13),
            dynamic_regularization: constant(1e-9),
            static_primal: T::zero(),
            static_dual: constant(1e-10),
            refinement_steps: 5,
        }
    }
}

/// Dense LDLᵀ without pivoting. Regularizes toward the expected inertia and refines solves
/// against the unregularized matrix.
pub struct DenseKktSolver<T: RealNumber> {
    dimension: usize,
    positive: usize,
    l: Vec<T>,
    d: Vec<T>,
    original: Vec<T>,
    analyzed: bool,
    last_factor: usize,
    regularized: usize,
    settings: LdlSettings<T>,
}

impl<T> DenseKktSolver<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self::with_settings(LdlSettings::default())
    }

    pub fn with_settings(settings: LdlSettings<T>) -> Self {
        Self {
            dimension: 0,
            positive: 0,
            l: Vec::new(),
            d: Vec::new(),
            original: Vec::new(),
            analyzed: false,
            last_factor: 0,
            regularized: 0,
            settings,
        }
    }

    pub fn settings(&self) -> &LdlSettings<T> {
        &self.settings
    }

    pub fn regularized_pivots(&self) -> usize {
        self.regularized
    }

    pub fn factorizations(&self) -> usize {
        self.last_factor
    }

    fn l(&self, row: usize, col: usize) -> T {
        let idx = row * self.dimension + col;
        self.l[idx]
    }

    fn l_mut(&mut self, row: usize, col: usize) -> &mut T {
        let idx = row * self.dimension + col;
        &mut self.l[idx]
    }

    fn expected_sign(&self, index: usize) -> T {
        if index < self.positive {
            T::one()
        } else {
            -T::one()
        }
    }

    fn substitute(&self, rhs: &mut [T]) {
        for i in 0..self.dimension {
            for j in 0..i {
                let lij = self.l(i, j);
                rhs[i] -= lij * rhs[j];
            }
        }
        for i in 0..self.dimension {
            rhs[i] = rhs[i] / self.d[i];
        }
        for i in (0..self.dimension).rev() {
            for j in (i + 1)..self.dimension {
                let lji = self.l(j, i);
                rhs[i] -= lji * rhs[j];
            }
        }
    }

    fn residual(&self, b: &[T], x: &[T]) -> Vec<T> {
        let matrix = DenseKktMatrix {
            dimension: self.dimension,
            data: self.original.clone(),
        };
        matrix
            .mul_vec(x)
            .iter()
            .zip(b.iter())
            .map(|(kx, bi)| *bi - *kx)
            .collect()
    }
}

impl<T> Default for DenseKktSolver<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> KktSolver<T> for DenseKktSolver<T>
where
    T: RealNumber,
{
    type Pattern = KktPattern;
    type Matrix = DenseKktMatrix<T>;

    fn analyze_pattern(&mut self, pattern: &Self::Pattern) -> SolverResult<()> {
        self.dimension = pattern.dimension();
        self.positive = pattern.positive();
        self.l = vec![T::zero(); self.dimension * self.dimension];
        self.d = vec![T::zero(); self.dimension];
        self.analyzed = true;
        Ok(())
    }

    fn factor(&mut self, matrix: &Self::Matrix) -> SolverResult<()> {
        if !self.analyzed {
            self.analyze_pattern(&KktPattern::definite(matrix.dimension))?;
        }
        if matrix.dimension != self.dimension {
            return Err(SolverError::dimension(format!(
                "matrix dimension {} does not match analysed dimension {}",
                matrix.dimension, self.dimension
            )));
        }
        self.original.clone_from(&matrix.data);
        let mut work = matrix.clone();
        for i in 0..self.dimension {
            let idx = i * self.dimension + i;
            if i < self.positive {
                work.data[idx] += self.settings.static_primal;
            } else {
                work.data[idx] -= self.settings.static_dual;
            }
        }
        for i in 0..self.dimension {
            for j in 0..self.dimension {
                *self.l_mut(i, j) = if i == j { T::one() } else { T::zero() };
            }
        }

        let scale = (0..self.dimension)
            .map(|i| work.entry(i, i).abs())
            .fold(T::one(), |acc, v| acc.max(v));
        let pivot_floor = self.settings.pivot_tolerance * scale;
        let wrong_sign_limit = T::epsilon().sqrt() * scale;
        self.regularized = 0;

        for j in 0..self.dimension {
            let mut d_j = work.entry(j, j);
            for k in 0..j {
                let l_jk = self.l(j, k);
                d_j -= l_jk * l_jk * self.d[k];
            }
            if !d_j.is_finite() {
                return Err(SolverError::breakdown(format!(
                    "non-finite pivot encountered at column {j}"
                )));
            }
            let sign = self.expected_sign(j);
            if d_j * sign <= pivot_floor {
                if d_j * sign < -wrong_sign_limit {
                    return Err(SolverError::breakdown(format!(
                        "pivot at column {j} has the wrong sign (d_j = {:.3e})",
                        to_f64(d_j)
                    )));
                }
                trace!(column = j, pivot = to_f64(d_j), "regularizing pivot");
                d_j = sign * self.settings.dynamic_regularization * scale;
                self.regularized += 1;
            }
            self.d[j] = d_j;

            for i in (j + 1)..self.dimension {
                let mut lij = work.entry(i, j);
                for k in 0..j {
                    lij -= self.l(i, k) * self.l(j, k) * self.d[k];
                }
                lij = lij / self.d[j];
                *self.l_mut(i, j) = lij;
            }
        }
        self.last_factor += 1;
        Ok(())
    }

    fn solve(&self, rhs: &mut [T]) -> SolverResult<()> {
        if rhs.len() != self.dimension {
            return Err(SolverError::dimension(format!(
                "rhs length {} does not match dimension {}",
                rhs.len(),
                self.dimension
            )));
        }
        let b = rhs.to_vec();
        self.substitute(rhs);
        let target = T::epsilon() * (T::one() + norm_inf(&b));
        for _ in 0..self.settings.refinement_steps {
            let mut r = self.residual(&b, rhs);
            if norm_inf(&r) <= target {
                break;
            }
            self.substitute(&mut r);
            for (xi, ri) in rhs.iter_mut().zip(r.iter()) {
                *xi += *ri;
            }
        }
        if rhs.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::breakdown("linear solve produced non-finite values"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn factor(data: Vec<f64>, dimension: usize, positive: usize) -> DenseKktSolver<f64> {
        let mut solver = DenseKktSolver::new();
        solver
            .analyze_pattern(&KktPattern::new(dimension, positive))
            .expect("analyze");
        solver
            .factor(&DenseKktMatrix::new(dimension, data))
            .expect("factor");
        solver
    }

    #[test]
    fn solves_positive_definite_system() {
        let solver = factor(vec![4.0, 1.0, 1.0, 3.0], 2, 2);
        let mut rhs = vec![1.0, 2.0];
        solver.solve(&mut rhs).expect("solve");
        assert_abs_diff_eq!(rhs[0], 1.0 / 11.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rhs[1], 7.0 / 11.0, epsilon = 1e-12);
        assert_eq!(solver.regularized_pivots(), 0);
    }

    #[test]
    fn solves_equality_constrained_kkt() {
        // min x² + y² s.t. x + y = 1
        let top = DenseMatrix::from_rows(&[vec![2.0, 0.0], vec![0.0, 2.0]]).expect("top");
        let rows = DenseMatrix::from_rows(&[vec![1.0, 1.0]]).expect("rows");
        let kkt = DenseKktMatrix::from_blocks(&top, &rows);
        let mut solver = DenseKktSolver::new();
        solver.analyze_pattern(&KktPattern::new(3, 2)).expect("analyze");
        solver.factor(&kkt).expect("factor");
        let mut rhs = vec![0.0, 0.0, 1.0];
        solver.solve(&mut rhs).expect("solve");
        assert_abs_diff_eq!(rhs[0], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(rhs[1], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(rhs[2], -1.0, epsilon = 1e-8);
    }

    #[test]
    fn singular_pivot_is_regularized() {
        let solver = factor(vec![1.0, 0.0, 0.0, 0.0], 2, 2);
        assert_eq!(solver.regularized_pivots(), 1);
        let mut rhs = vec![2.0, 0.0];
        solver.solve(&mut rhs).expect("solve");
        assert_abs_diff_eq!(rhs[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rhs[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn indefinite_matrix_breaks_down() {
        let mut solver = DenseKktSolver::new();
        let err = solver
            .factor(&DenseKktMatrix::new(2, vec![1.0, 0.0, 0.0, -5.0]))
            .unwrap_err();
        assert!(matches!(err, SolverError::NumericalBreakdown(_)));
    }

    #[test]
    fn non_finite_entries_break_down() {
        let mut solver = DenseKktSolver::new();
        let err = solver
            .factor(&DenseKktMatrix::new(1, vec![f64::NAN]))
            .unwrap_err();
        assert!(matches!(err, SolverError::NumericalBreakdown(_)));
    }

    #[test]
    fn rhs_length_is_checked() {
        let solver = factor(vec![1.0], 1, 1);
        let mut rhs = vec![1.0, 2.0];
        assert!(matches!(
            solver.solve(&mut rhs),
            Err(SolverError::Problem(_))
        ));
    }
}
