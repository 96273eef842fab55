#![forbid(unsafe_code)]

pub mod active_set;
pub mod cone;
pub mod conic;
pub mod ipm;
pub mod lp;
pub mod simplex;

pub use active_set::{ActiveSetMethod, ActiveSetMinimizer, ActiveSetSolver, ActiveSetState};
pub use cone::{ConeLayout, NtScaling};
pub use conic::ConicForm;
pub use ipm::{InteriorPointMinimizer, InteriorPointSolver, PrimalDualInteriorPoint};
pub use lp::{LpSolver, LpStandardForm, SimplexMinimizer};
pub use simplex::{Phase, SimplexMethod, SimplexSolution, StandardForm, Tableau};
