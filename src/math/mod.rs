//! Mathematical utilities: bound transforms, replicate statistics and damped least squares.

pub mod bounds;
pub mod ols;
pub mod stats;

pub use bounds::*;
pub use ols::*;
pub use stats::*;
