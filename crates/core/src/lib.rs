#![forbid(unsafe_code)]

pub mod error;
pub mod iterative;
pub mod math;
pub mod matrix;
pub mod monitor;
pub mod options;
pub mod problem;
pub mod solution;
pub mod stats;
pub mod tolerance;
pub mod traits;

pub use error::*;
pub use iterative::*;
pub use math::*;
pub use matrix::*;
pub use monitor::*;
pub use options::*;
pub use problem::*;
pub use solution::*;
pub use stats::*;
pub use tolerance::*;
pub use traits::*;
