//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - plate layout and region descriptors (`ReplicateLayout`, `RegionDescriptor`)
//! - raw and aggregated measurements (`RawGrid`, `ConcentrationSeries`)
//! - model parameters and fit outputs (`ModelParameters`, `FitResult`, etc.)
//! - the run configuration (`PipelineConfig`)

pub mod types;

pub use types::*;
