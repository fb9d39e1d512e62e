//! Input/output helpers.
//!
//! - raw export sanitisation + region parsing (`ingest`)
//! - dataset identity per input file (`manifest`)
//! - per-dataset reports and the EC50 table (`export`)
//! - fits JSON read/write (`curve`)

pub mod curve;
pub mod export;
pub mod ingest;
pub mod manifest;

pub use curve::*;
pub use export::*;
pub use ingest::*;
pub use manifest::*;
