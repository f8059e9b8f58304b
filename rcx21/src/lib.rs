//!
//! # Rcx21 Parasitic Extraction
//!
//! Windowed extraction of wire resistance, ground capacitance and coupling capacitance,
//! from an [RcModel](models::RcModel) of the interconnect stack.
//!
//! * [HostDb] supplies the layer stack and wire [Shape]s
//! * [SpatialWindowEngine] sweeps the die, pairing each shape with its nearby neighbors
//! * [MeasurementContext] resolves each shape and pair against the model's corners
//! * [Extractor] drives the engine and reports results to a [ResultSink]
//!

// Internal modules & re-exports
pub use rcx21models as models;
pub use rcx21utils as utils;

/// Coordinate and length type, nm
pub use rcx21models::Int;

pub mod error;
pub use error::*;

pub mod geom;
pub use geom::*;

pub mod stack;
pub use stack::*;

pub mod data;
pub use data::*;

pub mod plane;
pub use plane::*;

pub mod window;
pub use window::*;

pub mod measure;
pub use measure::*;

pub mod extract;
pub use extract::*;

// Unit tests
#[cfg(test)]
mod tests;
