use crate::cone::ConeLayout;
use conicrs_core::math::{constant, dot, RealNumber};
use conicrs_core::matrix::DenseMatrix;
use conicrs_core::problem::{
    ConstraintRef, LpProblem, NormalizedInequalities, ProblemError, ProblemResult, QpProblem,
    SocpProblem,
};

/// Common interior-point form:
///
/// ```text
/// minimize   ½ yᵀH y − bᵀy
/// subject to c − G y ∈ K,   E y = e
/// ```
///
/// SOCPs map in directly with `H = 0`. QPs and LPs negate their linear term and put each
/// normalized inequality `aᵢᵀy ≥ rᵢ` into its own one-dimensional cone.
#[derive(Debug, Clone)]
pub struct ConicForm<T> {
    pub hessian: Option<DenseMatrix<T>>,
    pub b: Vec<T>,
    pub g: DenseMatrix<T>,
    pub c: Vec<T>,
    pub layout: ConeLayout,
    pub equality_matrix: DenseMatrix<T>,
    pub equality_rhs: Vec<T>,
    /// User-facing constraint behind each cone row, empty for native SOCPs.
    pub origins: Vec<ConstraintRef>,
}

impl<T> ConicForm<T>
where
    T: RealNumber,
{
    pub fn from_socp(problem: &SocpProblem<T>) -> ProblemResult<Self> {
        let m = problem.n_vars();
        let (equality_matrix, equality_rhs) = match problem.equalities() {
            Some(eq) => (eq.matrix.clone(), eq.rhs.clone()),
            None => (DenseMatrix::empty(m), Vec::new()),
        };
        let form = Self {
            hessian: None,
            b: problem.b().to_vec(),
            g: problem.a_stacked(),
            c: problem.c_stacked(),
            layout: ConeLayout::new(problem.dims()),
            equality_matrix,
            equality_rhs,
            origins: Vec::new(),
        };
        form.validate()?;
        Ok(form)
    }

    pub fn from_qp(problem: &QpProblem<T>) -> ProblemResult<Self> {
        let n = problem.nvars();
        let (equality_matrix, equality_rhs) = problem.constraints().equality_system(n);
        Self::from_rows(
            Some(problem.quadratic().clone()),
            problem.linear(),
            problem.normalized_inequalities(),
            equality_matrix,
            equality_rhs,
        )
    }

    pub fn from_lp(problem: &LpProblem<T>) -> ProblemResult<Self> {
        let n = problem.nvars();
        let (equality_matrix, equality_rhs) = problem.constraints().equality_system(n);
        Self::from_rows(
            None,
            problem.cost(),
            problem.normalized_inequalities(),
            equality_matrix,
            equality_rhs,
        )
    }

    fn from_rows(
        hessian: Option<DenseMatrix<T>>,
        linear: &[T],
        rows: NormalizedInequalities<T>,
        equality_matrix: DenseMatrix<T>,
        equality_rhs: Vec<T>,
    ) -> ProblemResult<Self> {
        let form = Self {
            hessian,
            b: linear.iter().map(|v| -*v).collect(),
            g: rows.matrix.scaled(-T::one()),
            c: rows.rhs.iter().map(|v| -*v).collect(),
            layout: ConeLayout::orthant(rows.rhs.len()),
            equality_matrix,
            equality_rhs,
            origins: rows.origins,
        };
        form.validate()?;
        Ok(form)
    }

    fn validate(&self) -> ProblemResult<()> {
        if self.layout.total() == 0 {
            return Err(ProblemError::DimensionMismatch(
                "interior-point form needs at least one cone constraint".into(),
            ));
        }
        if self.g.nrows != self.layout.total() || self.c.len() != self.layout.total() {
            return Err(ProblemError::DimensionMismatch(format!(
                "cone map has {} rows for total cone dimension {}",
                self.g.nrows,
                self.layout.total()
            )));
        }
        if self.equality_matrix.nrows != self.equality_rhs.len() {
            return Err(ProblemError::DimensionMismatch(
                "equality rows do not match their right-hand side".into(),
            ));
        }
        Ok(())
    }

    /// Number of free variables `m`.
    pub fn n_vars(&self) -> usize {
        self.b.len()
    }

    /// Total cone dimension `N`.
    pub fn cone_dim(&self) -> usize {
        self.layout.total()
    }

    pub fn n_equalities(&self) -> usize {
        self.equality_rhs.len()
    }

    pub fn hessian_mul(&self, y: &[T]) -> Vec<T> {
        match &self.hessian {
            Some(h) => h.mul_vec(y),
            None => vec![T::zero(); y.len()],
        }
    }

    /// `bᵀy − ½ yᵀHy`, the maximized value.
    pub fn objective(&self, y: &[T]) -> T {
        let quadratic = match &self.hessian {
            Some(h) => constant::<T>(0.5) * dot(y, &h.mul_vec(y)),
            None => T::zero(),
        };
        dot(&self.b, y) - quadratic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conicrs_core::problem::{Bounds, ConstraintSet, LinearConstraints};

    #[test]
    fn qp_rows_become_orthant_cones() {
        let h = DenseMatrix::identity(2);
        let constraints = ConstraintSet {
            less_equal: Some(LinearConstraints::new(
                DenseMatrix::from_rows(&[vec![1.0, 1.0]]).expect("row"),
                vec![4.0],
            )),
            bounds: Some(Bounds::non_negative(2)),
            ..ConstraintSet::default()
        };
        let qp = QpProblem::new(h, vec![1.0, -2.0], constraints).expect("qp");
        let form = ConicForm::from_qp(&qp).expect("form");
        assert_eq!(form.b, vec![-1.0, 2.0]);
        assert_eq!(form.layout.dims(), &[1, 1, 1]);
        // 4 − x − y ≥ 0
        assert_eq!(form.g.row(0), &[1.0, 1.0]);
        assert_eq!(form.c[0], 4.0);
        assert_eq!(form.origins[0], ConstraintRef::LessEqual(0));
        assert_eq!(form.origins[2], ConstraintRef::Lower(1));
    }

    #[test]
    fn form_without_cones_is_rejected() {
        let qp = QpProblem::new(DenseMatrix::identity(1), vec![1.0], ConstraintSet::default())
            .expect("qp");
        assert!(matches!(
            ConicForm::from_qp(&qp),
            Err(ProblemError::DimensionMismatch(_))
        ));
    }
}
