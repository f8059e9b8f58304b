//!
//! # Rcx21 RC Models
//!
//! Characterized parasitic-capacitance and resistance models of an interconnect stack,
//! and their lookup engine.
//!
//! Models are organized as a hierarchy of tables:
//!
//! * [RcModel]: one [CornerModel] per density-rate process corner
//! * [CornerModel]: one [LayerRelationTable] per layer
//! * [LayerRelationTable]: one [WidthIndexedTable] per [RelationKind]
//! * [WidthIndexedTable]: [DistanceTable]s by neighbor-layer relation and wire width
//! * [DistanceTable]: [DistanceSample]s by separation, densified for constant-time lookup
//!
//! Models are read from and written to extraction rule files (see [read] and [write]),
//! or built from characterization sweeps (see [SweepBuilder]).
//!

// Internal modules & re-exports
pub use rcx21utils as utils;

pub mod error;
pub use error::*;

pub mod distance;
pub use distance::*;

pub mod width;
pub use width::*;

pub mod relation;
pub use relation::*;

pub mod corner;
pub use corner::*;

pub mod read;
pub mod write;

pub mod sweep;
pub use sweep::*;

pub mod charlog;
pub use charlog::*;
