//! Measurement data: replicate aggregation and synthetic plates.

pub mod aggregate;
pub mod sample;

pub use aggregate::*;
pub use sample::*;
