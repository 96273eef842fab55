use crate::math::{dot, RealNumber};
use crate::problem::{ProblemError, ProblemResult};
use serde::{Deserialize, Serialize};
use sprs::CsMat;

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix<T> {
    pub nrows: usize,
    pub ncols: usize,
    pub data: Vec<T>,
}

impl<T> DenseMatrix<T>
where
    T: RealNumber,
{
    pub fn new(nrows: usize, ncols: usize, data: Vec<T>) -> ProblemResult<Self> {
        let matrix = Self { nrows, ncols, data };
        matrix.validate()?;
        Ok(matrix)
    }

    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![T::zero(); nrows * ncols],
        }
    }

    /// A matrix with no rows but a fixed column count.
    pub fn empty(ncols: usize) -> Self {
        Self::zeros(0, ncols)
    }

    pub fn identity(n: usize) -> Self {
        let mut matrix = Self::zeros(n, n);
        for i in 0..n {
            matrix.set(i, i, T::one());
        }
        matrix
    }

    pub fn from_rows(rows: &[Vec<T>]) -> ProblemResult<Self> {
        let ncols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * ncols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != ncols {
                return Err(ProblemError::DimensionMismatch(format!(
                    "row {i} has {} entries, expected {ncols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            nrows: rows.len(),
            ncols,
            data,
        })
    }

    pub fn validate(&self) -> ProblemResult<()> {
        if self.data.len() != self.nrows * self.ncols {
            return Err(ProblemError::DimensionMismatch(format!(
                "dense data length {} != {} x {}",
                self.data.len(),
                self.nrows,
                self.ncols
            )));
        }
        Ok(())
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn is_empty(&self) -> bool {
        self.nrows == 0 || self.ncols == 0
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.ncols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.ncols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.ncols..(row + 1) * self.ncols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.nrows).map(move |i| self.row(i))
    }

    pub fn column(&self, col: usize) -> Vec<T> {
        (0..self.nrows).map(|i| self.get(i, col)).collect()
    }

    pub fn mul_vec(&self, x: &[T]) -> Vec<T> {
        assert_eq!(x.len(), self.ncols, "matrix-vector dimension mismatch");
        self.rows().map(|row| dot(row, x)).collect()
    }

    pub fn tr_mul_vec(&self, y: &[T]) -> Vec<T> {
        assert_eq!(y.len(), self.nrows, "transposed matrix-vector dimension mismatch");
        let mut out = vec![T::zero(); self.ncols];
        for (row, &weight) in self.rows().zip(y.iter()) {
            if weight == T::zero() {
                continue;
            }
            for (o, &a) in out.iter_mut().zip(row.iter()) {
                *o += a * weight;
            }
        }
        out
    }

    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.ncols, self.nrows);
        for i in 0..self.nrows {
            for j in 0..self.ncols {
                out.set(j, i, self.get(i, j));
            }
        }
        out
    }

    /// `AᵀA`.
    pub fn gram(&self) -> Self {
        let n = self.ncols;
        let mut out = Self::zeros(n, n);
        for row in self.rows() {
            for i in 0..n {
                if row[i] == T::zero() {
                    continue;
                }
                for j in i..n {
                    let value = out.get(i, j) + row[i] * row[j];
                    out.set(i, j, value);
                }
            }
        }
        for i in 0..n {
            for j in 0..i {
                let value = out.get(j, i);
                out.set(i, j, value);
            }
        }
        out
    }

    pub fn vstack(blocks: &[&DenseMatrix<T>]) -> ProblemResult<Self> {
        let ncols = blocks.first().map(|b| b.ncols).unwrap_or(0);
        let mut data = Vec::new();
        let mut nrows = 0;
        for (i, block) in blocks.iter().enumerate() {
            if block.ncols != ncols {
                return Err(ProblemError::DimensionMismatch(format!(
                    "block {i} has {} columns, expected {ncols}",
                    block.ncols
                )));
            }
            data.extend_from_slice(&block.data);
            nrows += block.nrows;
        }
        Ok(Self { nrows, ncols, data })
    }

    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * self.ncols);
        for &i in rows {
            data.extend_from_slice(self.row(i));
        }
        Self {
            nrows: rows.len(),
            ncols: self.ncols,
            data,
        }
    }

    pub fn scaled(&self, factor: T) -> Self {
        Self {
            nrows: self.nrows,
            ncols: self.ncols,
            data: self.data.iter().map(|v| *v * factor).collect(),
        }
    }

    /// Maximum absolute row sum.
    pub fn norm_inf(&self) -> T {
        self.rows()
            .map(|row| row.iter().fold(T::zero(), |acc, v| acc + v.abs()))
            .fold(T::zero(), |acc, v| acc.max(v))
    }

    pub fn is_symmetric(&self, tol: T) -> bool {
        if self.nrows != self.ncols {
            return false;
        }
        for i in 0..self.nrows {
            for j in 0..i {
                if (self.get(i, j) - self.get(j, i)).abs() > tol {
                    return false;
                }
            }
        }
        true
    }

    pub fn to_csc(&self) -> CscMatrix<T> {
        let mut indptr = Vec::with_capacity(self.ncols + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for col in 0..self.ncols {
            for row in 0..self.nrows {
                let value = self.get(row, col);
                if value != T::zero() {
                    indices.push(row);
                    data.push(value);
                }
            }
            indptr.push(indices.len());
        }
        CscMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            indptr,
            indices,
            data,
        }
    }
}

impl<T> From<&CscMatrix<T>> for DenseMatrix<T>
where
    T: RealNumber,
{
    fn from(matrix: &CscMatrix<T>) -> Self {
        matrix.to_dense()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CscMatrix<T> {
    pub nrows: usize,
    pub ncols: usize,
    pub indptr: Vec<usize>,
    pub indices: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> CscMatrix<T>
where
    T: RealNumber,
{
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn validate(&self) -> ProblemResult<()> {
        if self.indptr.len() != self.ncols + 1 {
            return Err(ProblemError::DimensionMismatch(format!(
                "indptr length {} != ncols + 1 ({})",
                self.indptr.len(),
                self.ncols + 1
            )));
        }
        if self.indices.len() != self.data.len() {
            return Err(ProblemError::DimensionMismatch(format!(
                "indices length {} != data length {}",
                self.indices.len(),
                self.data.len()
            )));
        }
        if self.indptr.last().copied() != Some(self.data.len()) {
            return Err(ProblemError::InvalidStructure(
                "last indptr entry must equal nnz".into(),
            ));
        }
        if self.indptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(ProblemError::InvalidStructure(
                "indptr must be non-decreasing".into(),
            ));
        }
        if let Some(row) = self.indices.iter().find(|&&row| row >= self.nrows) {
            return Err(ProblemError::DimensionMismatch(format!(
                "row index {row} out of range for {} rows",
                self.nrows
            )));
        }
        Ok(())
    }

    pub fn to_dense(&self) -> DenseMatrix<T> {
        let mut dense = DenseMatrix::zeros(self.nrows, self.ncols);
        for col in 0..self.ncols {
            for idx in self.indptr[col]..self.indptr[col + 1] {
                let row = self.indices[idx];
                let value = dense.get(row, col) + self.data[idx];
                dense.set(row, col, value);
            }
        }
        dense
    }

    pub fn to_csmat(&self) -> ProblemResult<CsMat<T>> {
        self.validate()?;
        let mut columns = self.sorted_columns();
        let mut indptr = Vec::with_capacity(self.ncols + 1);
        let mut indices = Vec::with_capacity(self.nnz());
        let mut data = Vec::with_capacity(self.nnz());
        indptr.push(0);
        for column in columns.iter_mut() {
            for (row, value) in column.drain(..) {
                indices.push(row);
                data.push(value);
            }
            indptr.push(indices.len());
        }
        Ok(CsMat::new_csc((self.nrows, self.ncols), indptr, indices, data))
    }

    pub fn from_csmat(matrix: &CsMat<T>) -> Self {
        let (nrows, ncols) = matrix.shape();
        let mut columns: Vec<Vec<(usize, T)>> = vec![Vec::new(); ncols];
        for (outer, lane) in matrix.outer_iterator().enumerate() {
            for (inner, value) in lane.iter() {
                let (row, col) = if matrix.is_csc() {
                    (inner, outer)
                } else {
                    (outer, inner)
                };
                columns[col].push((row, *value));
            }
        }
        let mut indptr = Vec::with_capacity(ncols + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for mut column in columns {
            column.sort_by_key(|(row, _)| *row);
            for (row, value) in column {
                indices.push(row);
                data.push(value);
            }
            indptr.push(indices.len());
        }
        Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        }
    }

    fn sorted_columns(&self) -> Vec<Vec<(usize, T)>> {
        (0..self.ncols)
            .map(|col| {
                let mut entries: Vec<(usize, T)> = (self.indptr[col]..self.indptr[col + 1])
                    .map(|idx| (self.indices[idx], self.data[idx]))
                    .collect();
                entries.sort_by_key(|(row, _)| *row);
                entries
            })
            .collect()
    }
}
