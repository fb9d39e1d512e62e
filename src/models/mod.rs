//! Saturating-binding (Hill) model.
//!
//! The model is implemented as small, pure functions so that the fitter,
//! the report builder and the plot sinks can share them.

pub mod model;

pub use model::*;
