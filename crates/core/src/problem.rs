use crate::math::RealNumber;
use crate::matrix::DenseMatrix;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProblemError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("invalid structure: {0}")]
    InvalidStructure(String),
}

pub type ProblemResult<T> = Result<T, ProblemError>;

fn check_finite<T: RealNumber>(values: &[T], what: &str) -> ProblemResult<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(idx) => Err(ProblemError::InvalidStructure(format!(
            "{what} has a non-finite entry at index {idx}"
        ))),
        None => Ok(()),
    }
}

/// Per-variable bounds. In JSON a `null` entry stands for an open side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: RealNumber + Serialize",
    deserialize = "T: RealNumber + Deserialize<'de>"
))]
pub struct Bounds<T> {
    #[serde(with = "open_lower")]
    pub lower: Vec<T>,
    #[serde(with = "open_upper")]
    pub upper: Vec<T>,
}

fn serialize_open<T, S>(values: &[T], serializer: S) -> Result<S::Ok, S::Error>
where
    T: RealNumber + Serialize,
    S: Serializer,
{
    let entries: Vec<Option<T>> = values
        .iter()
        .map(|v| if v.is_infinite() { None } else { Some(*v) })
        .collect();
    entries.serialize(serializer)
}

fn deserialize_open<'de, T, D>(deserializer: D, open: T) -> Result<Vec<T>, D::Error>
where
    T: RealNumber + Deserialize<'de>,
    D: Deserializer<'de>,
{
    let entries: Vec<Option<T>> = Vec::deserialize(deserializer)?;
    Ok(entries.into_iter().map(|v| v.unwrap_or(open)).collect())
}

mod open_lower {
    use super::*;

    pub fn serialize<T, S>(values: &[T], serializer: S) -> Result<S::Ok, S::Error>
    where
        T: RealNumber + Serialize,
        S: Serializer,
    {
        serialize_open(values, serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        T: RealNumber + Deserialize<'de>,
        D: Deserializer<'de>,
    {
        deserialize_open(deserializer, T::neg_infinity())
    }
}

mod open_upper {
    use super::*;

    pub fn serialize<T, S>(values: &[T], serializer: S) -> Result<S::Ok, S::Error>
    where
        T: RealNumber + Serialize,
        S: Serializer,
    {
        serialize_open(values, serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        T: RealNumber + Deserialize<'de>,
        D: Deserializer<'de>,
    {
        deserialize_open(deserializer, T::infinity())
    }
}

impl<T> Bounds<T>
where
    T: RealNumber,
{
    pub fn unbounded(dim: usize) -> Self {
        Self {
            lower: vec![T::neg_infinity(); dim],
            upper: vec![T::infinity(); dim],
        }
    }

    pub fn non_negative(dim: usize) -> Self {
        Self {
            lower: vec![T::zero(); dim],
            upper: vec![T::infinity(); dim],
        }
    }

    pub fn validate(&self) -> ProblemResult<()> {
        if self.lower.len() != self.upper.len() {
            return Err(ProblemError::DimensionMismatch(format!(
                "lower len {} != upper len {}",
                self.lower.len(),
                self.upper.len()
            )));
        }
        for (i, (lo, hi)) in self.lower.iter().zip(self.upper.iter()).enumerate() {
            if lo.is_nan() || hi.is_nan() {
                return Err(ProblemError::InvalidStructure(format!(
                    "NaN bound at index {i}"
                )));
            }
            if lo > hi {
                return Err(ProblemError::InvalidStructure(format!(
                    "lower bound exceeds upper bound at index {i}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearConstraints<T> {
    pub matrix: DenseMatrix<T>,
    pub rhs: Vec<T>,
}

impl<T> LinearConstraints<T>
where
    T: RealNumber,
{
    pub fn new(matrix: DenseMatrix<T>, rhs: Vec<T>) -> Self {
        Self { matrix, rhs }
    }

    pub fn nrows(&self) -> usize {
        self.matrix.nrows
    }

    fn validate(&self, nvars: usize, label: &str) -> ProblemResult<()> {
        self.matrix.validate()?;
        if self.matrix.ncols != nvars {
            return Err(ProblemError::DimensionMismatch(format!(
                "{label} matrix columns {} != nvars {nvars}",
                self.matrix.ncols
            )));
        }
        if self.matrix.nrows != self.rhs.len() {
            return Err(ProblemError::DimensionMismatch(format!(
                "{label} rows {} != rhs len {}",
                self.matrix.nrows,
                self.rhs.len()
            )));
        }
        check_finite(&self.matrix.data, label)?;
        check_finite(&self.rhs, label)
    }
}

/// Identifies the user-facing constraint a normalized row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintRef {
    LessEqual(usize),
    GreaterEqual(usize),
    Equality(usize),
    Lower(usize),
    Upper(usize),
}

impl fmt::Display for ConstraintRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintRef::LessEqual(i) => write!(f, "le[{i}]"),
            ConstraintRef::GreaterEqual(i) => write!(f, "ge[{i}]"),
            ConstraintRef::Equality(i) => write!(f, "eq[{i}]"),
            ConstraintRef::Lower(j) => write!(f, "lower[{j}]"),
            ConstraintRef::Upper(j) => write!(f, "upper[{j}]"),
        }
    }
}

/// Inequalities rewritten as `a_iᵀx ≥ r_i`.
#[derive(Debug, Clone)]
pub struct NormalizedInequalities<T> {
    pub matrix: DenseMatrix<T>,
    pub rhs: Vec<T>,
    pub origins: Vec<ConstraintRef>,
}

impl<T> NormalizedInequalities<T>
where
    T: RealNumber,
{
    pub fn len(&self) -> usize {
        self.rhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rhs.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: RealNumber + Serialize",
    deserialize = "T: RealNumber + Deserialize<'de>"
))]
pub struct ConstraintSet<T> {
    #[serde(default)]
    pub less_equal: Option<LinearConstraints<T>>,
    #[serde(default)]
    pub greater_equal: Option<LinearConstraints<T>>,
    #[serde(default)]
    pub equalities: Option<LinearConstraints<T>>,
    #[serde(default)]
    pub bounds: Option<Bounds<T>>,
}

impl<T> Default for ConstraintSet<T> {
    fn default() -> Self {
        Self {
            less_equal: None,
            greater_equal: None,
            equalities: None,
            bounds: None,
        }
    }
}

impl<T> ConstraintSet<T>
where
    T: RealNumber,
{
    pub fn validate(&self, nvars: usize) -> ProblemResult<()> {
        if let Some(bounds) = &self.bounds {
            if bounds.lower.len() != nvars {
                return Err(ProblemError::DimensionMismatch(format!(
                    "bounds size {} != nvars {nvars}",
                    bounds.lower.len()
                )));
            }
            bounds.validate()?;
        }
        if let Some(le) = &self.less_equal {
            le.validate(nvars, "less-equal")?;
        }
        if let Some(ge) = &self.greater_equal {
            ge.validate(nvars, "greater-equal")?;
        }
        if let Some(eq) = &self.equalities {
            eq.validate(nvars, "equality")?;
        }
        Ok(())
    }

    pub fn normalized_inequalities(&self, nvars: usize) -> NormalizedInequalities<T> {
        let mut data = Vec::new();
        let mut rhs = Vec::new();
        let mut origins = Vec::new();
        if let Some(ge) = &self.greater_equal {
            for (i, row) in ge.matrix.rows().enumerate() {
                data.extend_from_slice(row);
                rhs.push(ge.rhs[i]);
                origins.push(ConstraintRef::GreaterEqual(i));
            }
        }
        if let Some(le) = &self.less_equal {
            for (i, row) in le.matrix.rows().enumerate() {
                data.extend(row.iter().map(|v| -*v));
                rhs.push(-le.rhs[i]);
                origins.push(ConstraintRef::LessEqual(i));
            }
        }
        if let Some(bounds) = &self.bounds {
            for (j, lo) in bounds.lower.iter().enumerate() {
                if lo.is_finite() {
                    let mut row = vec![T::zero(); nvars];
                    row[j] = T::one();
                    data.extend(row);
                    rhs.push(*lo);
                    origins.push(ConstraintRef::Lower(j));
                }
            }
            for (j, hi) in bounds.upper.iter().enumerate() {
                if hi.is_finite() {
                    let mut row = vec![T::zero(); nvars];
                    row[j] = -T::one();
                    data.extend(row);
                    rhs.push(-*hi);
                    origins.push(ConstraintRef::Upper(j));
                }
            }
        }
        NormalizedInequalities {
            matrix: DenseMatrix {
                nrows: rhs.len(),
                ncols: nvars,
                data,
            },
            rhs,
            origins,
        }
    }

    /// Equality rows, empty when none are present.
    pub fn equality_system(&self, nvars: usize) -> (DenseMatrix<T>, Vec<T>) {
        match &self.equalities {
            Some(eq) => (eq.matrix.clone(), eq.rhs.clone()),
            None => (DenseMatrix::empty(nvars), Vec::new()),
        }
    }

    pub fn n_equalities(&self) -> usize {
        self.equalities.as_ref().map(|eq| eq.nrows()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: RealNumber + Deserialize<'de>"))]
struct LpProblemRepr<T> {
    cost: Vec<T>,
    #[serde(default)]
    constraints: ConstraintSet<T>,
}

/// `minimize cᵀx` subject to the linear systems in `constraints`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "LpProblemRepr<T>",
    bound(
        serialize = "T: RealNumber + Serialize",
        deserialize = "T: RealNumber + Deserialize<'de>"
    )
)]
pub struct LpProblem<T> {
    cost: Vec<T>,
    constraints: ConstraintSet<T>,
}

impl<T> TryFrom<LpProblemRepr<T>> for LpProblem<T>
where
    T: RealNumber,
{
    type Error = ProblemError;

    fn try_from(repr: LpProblemRepr<T>) -> ProblemResult<Self> {
        Self::new(repr.cost, repr.constraints)
    }
}

impl<T> LpProblem<T>
where
    T: RealNumber,
{
    pub fn new(cost: Vec<T>, constraints: ConstraintSet<T>) -> ProblemResult<Self> {
        let problem = Self { cost, constraints };
        problem.validate()?;
        Ok(problem)
    }

    pub fn nvars(&self) -> usize {
        self.cost.len()
    }

    pub fn cost(&self) -> &[T] {
        &self.cost
    }

    pub fn constraints(&self) -> &ConstraintSet<T> {
        &self.constraints
    }

    pub fn objective(&self, x: &[T]) -> T {
        crate::math::dot(&self.cost, x)
    }

    pub fn validate(&self) -> ProblemResult<()> {
        let n = self.nvars();
        if n == 0 {
            return Err(ProblemError::DimensionMismatch(
                "problem has no variables".into(),
            ));
        }
        check_finite(&self.cost, "cost")?;
        self.constraints.validate(n)
    }

    pub fn normalized_inequalities(&self) -> NormalizedInequalities<T> {
        self.constraints.normalized_inequalities(self.nvars())
    }

    /// Degenerate-cone embedding: `maximize −cᵀy` with one 1-dimensional cone per inequality row.
    pub fn to_socp(&self) -> ProblemResult<SocpProblem<T>> {
        let rows = self.normalized_inequalities();
        let blocks = rows
            .matrix
            .rows()
            .zip(rows.rhs.iter())
            .map(|(row, r)| {
                let a_t = DenseMatrix {
                    nrows: 1,
                    ncols: row.len(),
                    data: row.iter().map(|v| -*v).collect(),
                };
                ConeBlock::new(a_t, vec![-*r])
            })
            .collect::<ProblemResult<Vec<_>>>()?;
        SocpProblem::new(
            self.cost.iter().map(|v| -*v).collect(),
            blocks,
            self.constraints.equalities.clone(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: RealNumber + Deserialize<'de>"))]
struct QpProblemRepr<T> {
    quadratic: DenseMatrix<T>,
    linear: Vec<T>,
    #[serde(default)]
    constraints: ConstraintSet<T>,
}

/// `minimize ½xᵀHx + pᵀx` subject to the linear systems in `constraints`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "QpProblemRepr<T>",
    bound(
        serialize = "T: RealNumber + Serialize",
        deserialize = "T: RealNumber + Deserialize<'de>"
    )
)]
pub struct QpProblem<T> {
    quadratic: DenseMatrix<T>,
    linear: Vec<T>,
    constraints: ConstraintSet<T>,
}

impl<T> TryFrom<QpProblemRepr<T>> for QpProblem<T>
where
    T: RealNumber,
{
    type Error = ProblemError;

    fn try_from(repr: QpProblemRepr<T>) -> ProblemResult<Self> {
        Self::new(repr.quadratic, repr.linear, repr.constraints)
    }
}

impl<T> QpProblem<T>
where
    T: RealNumber,
{
    pub fn new(
        quadratic: DenseMatrix<T>,
        linear: Vec<T>,
        constraints: ConstraintSet<T>,
    ) -> ProblemResult<Self> {
        let problem = Self {
            quadratic,
            linear,
            constraints,
        };
        problem.validate()?;
        Ok(problem)
    }

    pub fn nvars(&self) -> usize {
        self.linear.len()
    }

    pub fn quadratic(&self) -> &DenseMatrix<T> {
        &self.quadratic
    }

    pub fn linear(&self) -> &[T] {
        &self.linear
    }

    pub fn constraints(&self) -> &ConstraintSet<T> {
        &self.constraints
    }

    pub fn validate(&self) -> ProblemResult<()> {
        let n = self.nvars();
        if n == 0 {
            return Err(ProblemError::DimensionMismatch(
                "problem has no variables".into(),
            ));
        }
        self.quadratic.validate()?;
        if self.quadratic.ncols != n || self.quadratic.nrows != n {
            return Err(ProblemError::DimensionMismatch(format!(
                "quadratic matrix must be square and match variable dimension {n}"
            )));
        }
        check_finite(&self.quadratic.data, "quadratic")?;
        check_finite(&self.linear, "linear")?;
        let tol = crate::math::constant::<T>(1e-9) * (T::one() + self.quadratic.norm_inf());
        if !self.quadratic.is_symmetric(tol) {
            return Err(ProblemError::InvalidStructure(
                "quadratic matrix must be symmetric".into(),
            ));
        }
        self.constraints.validate(n)
    }

    pub fn normalized_inequalities(&self) -> NormalizedInequalities<T> {
        self.constraints.normalized_inequalities(self.nvars())
    }

    pub fn objective(&self, x: &[T]) -> T {
        let hx = self.quadratic.mul_vec(x);
        crate::math::constant::<T>(0.5) * crate::math::dot(x, &hx)
            + crate::math::dot(&self.linear, x)
    }

    pub fn gradient(&self, x: &[T]) -> Vec<T> {
        let mut g = self.quadratic.mul_vec(x);
        crate::math::axpy(T::one(), &self.linear, &mut g);
        g
    }
}

/// One cone constraint `c − A_iᵀy ∈ K_d`, storing the transposed map `A_iᵀ` (d × m).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConeBlock<T> {
    a_t: DenseMatrix<T>,
    c: Vec<T>,
}

impl<T> ConeBlock<T>
where
    T: RealNumber,
{
    pub fn new(a_t: DenseMatrix<T>, c: Vec<T>) -> ProblemResult<Self> {
        let block = Self { a_t, c };
        block.validate()?;
        Ok(block)
    }

    fn validate(&self) -> ProblemResult<()> {
        self.a_t.validate()?;
        if self.c.is_empty() {
            return Err(ProblemError::DimensionMismatch(
                "cone block must have dimension at least 1".into(),
            ));
        }
        if self.a_t.nrows != self.c.len() {
            return Err(ProblemError::DimensionMismatch(format!(
                "cone block map has {} rows but offset has {} entries",
                self.a_t.nrows,
                self.c.len()
            )));
        }
        check_finite(&self.a_t.data, "cone block map")?;
        check_finite(&self.c, "cone block offset")
    }

    pub fn dim(&self) -> usize {
        self.c.len()
    }

    pub fn a_t(&self) -> &DenseMatrix<T> {
        &self.a_t
    }

    pub fn c(&self) -> &[T] {
        &self.c
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: RealNumber + Deserialize<'de>"))]
struct SocpProblemRepr<T> {
    b: Vec<T>,
    blocks: Vec<ConeBlock<T>>,
    #[serde(default)]
    equalities: Option<LinearConstraints<T>>,
}

/// `maximize bᵀy` subject to `c_i − A_iᵀy ∈ K_i` for every block and optional `Ey = e`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "SocpProblemRepr<T>",
    bound(deserialize = "T: RealNumber + Deserialize<'de>")
)]
pub struct SocpProblem<T> {
    b: Vec<T>,
    blocks: Vec<ConeBlock<T>>,
    equalities: Option<LinearConstraints<T>>,
}

impl<T> TryFrom<SocpProblemRepr<T>> for SocpProblem<T>
where
    T: RealNumber,
{
    type Error = ProblemError;

    fn try_from(repr: SocpProblemRepr<T>) -> ProblemResult<Self> {
        Self::new(repr.b, repr.blocks, repr.equalities)
    }
}

impl<T> SocpProblem<T>
where
    T: RealNumber,
{
    pub fn new(
        b: Vec<T>,
        blocks: Vec<ConeBlock<T>>,
        equalities: Option<LinearConstraints<T>>,
    ) -> ProblemResult<Self> {
        let problem = Self {
            b,
            blocks,
            equalities,
        };
        problem.validate()?;
        Ok(problem)
    }

    /// Builds the blocks by splitting a stacked map and offset along `dims`.
    pub fn from_stacked(
        b: Vec<T>,
        a: &DenseMatrix<T>,
        c: &[T],
        dims: &[usize],
    ) -> ProblemResult<Self> {
        a.validate()?;
        let total: usize = dims.iter().sum();
        if total != a.nrows || total != c.len() {
            return Err(ProblemError::DimensionMismatch(format!(
                "sum of cone dimensions {total} != stacked rows {} / offset len {}",
                a.nrows,
                c.len()
            )));
        }
        let mut blocks = Vec::with_capacity(dims.len());
        let mut offset = 0;
        for &d in dims {
            let rows: Vec<usize> = (offset..offset + d).collect();
            blocks.push(ConeBlock::new(
                a.select_rows(&rows),
                c[offset..offset + d].to_vec(),
            )?);
            offset += d;
        }
        Self::new(b, blocks, None)
    }

    pub fn validate(&self) -> ProblemResult<()> {
        let m = self.b.len();
        if m == 0 {
            return Err(ProblemError::DimensionMismatch(
                "problem has no variables".into(),
            ));
        }
        if self.blocks.is_empty() {
            return Err(ProblemError::DimensionMismatch(
                "at least one cone block is required".into(),
            ));
        }
        check_finite(&self.b, "objective")?;
        for (i, block) in self.blocks.iter().enumerate() {
            block.validate()?;
            if block.a_t.ncols != m {
                return Err(ProblemError::DimensionMismatch(format!(
                    "cone block {i} has {} columns, expected {m}",
                    block.a_t.ncols
                )));
            }
        }
        if let Some(eq) = &self.equalities {
            eq.validate(m, "equality")?;
        }
        Ok(())
    }

    pub fn n_vars(&self) -> usize {
        self.b.len()
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn dims(&self) -> Vec<usize> {
        self.blocks.iter().map(ConeBlock::dim).collect()
    }

    pub fn total_dim(&self) -> usize {
        self.blocks.iter().map(ConeBlock::dim).sum()
    }

    pub fn b(&self) -> &[T] {
        &self.b
    }

    pub fn blocks(&self) -> &[ConeBlock<T>] {
        &self.blocks
    }

    /// Map `A_iᵀ` of block `i`, or `None` past the last block.
    pub fn a(&self, i: usize) -> Option<&DenseMatrix<T>> {
        self.blocks.get(i).map(ConeBlock::a_t)
    }

    /// Offset `c_i` of block `i`, or `None` past the last block.
    pub fn c(&self, i: usize) -> Option<&[T]> {
        self.blocks.get(i).map(ConeBlock::c)
    }

    /// Vertical concatenation of every block map.
    pub fn a_stacked(&self) -> DenseMatrix<T> {
        let mut data = Vec::with_capacity(self.total_dim() * self.n_vars());
        for block in &self.blocks {
            data.extend_from_slice(&block.a_t.data);
        }
        DenseMatrix {
            nrows: self.total_dim(),
            ncols: self.n_vars(),
            data,
        }
    }

    pub fn c_stacked(&self) -> Vec<T> {
        self.blocks
            .iter()
            .flat_map(|block| block.c.iter().copied())
            .collect()
    }

    pub fn equalities(&self) -> Option<&LinearConstraints<T>> {
        self.equalities.as_ref()
    }

    pub fn objective(&self, y: &[T]) -> T {
        crate::math::dot(&self.b, y)
    }
}

#[derive(Debug, Clone)]
pub enum Problem<T> {
    Lp(LpProblem<T>),
    Qp(QpProblem<T>),
    Socp(SocpProblem<T>),
}

impl<T> Problem<T>
where
    T: RealNumber,
{
    pub fn nvars(&self) -> usize {
        match self {
            Problem::Lp(lp) => lp.nvars(),
            Problem::Qp(qp) => qp.nvars(),
            Problem::Socp(socp) => socp.n_vars(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Problem::Lp(_) => "lp",
            Problem::Qp(_) => "qp",
            Problem::Socp(_) => "socp",
        }
    }
}

impl<T> From<LpProblem<T>> for Problem<T> {
    fn from(problem: LpProblem<T>) -> Self {
        Problem::Lp(problem)
    }
}

impl<T> From<QpProblem<T>> for Problem<T> {
    fn from(problem: QpProblem<T>) -> Self {
        Problem::Qp(problem)
    }
}

impl<T> From<SocpProblem<T>> for Problem<T> {
    fn from(problem: SocpProblem<T>) -> Self {
        Problem::Socp(problem)
    }
}
