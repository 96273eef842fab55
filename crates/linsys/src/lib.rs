#![forbid(unsafe_code)]

pub mod dense;

pub use dense::{DenseKktMatrix, DenseKktSolver, KktPattern, LdlSettings};
