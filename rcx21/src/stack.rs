//!
//! # Layer Stack
//!
//! Routing-layer metadata, as provided by the host database.
//! Layer indices match the RC model's: zero is the substrate, routing layers count up from one.
//!

// Crates.io
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Local imports
use crate::geom::Dir;
use crate::Int;

/// # Routing Layer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LayerInfo {
    /// Layer index, one-based
    pub index: usize,
    pub name: String,
    /// Preferred routing direction
    pub dir: Dir,
    /// Track pitch, nm
    pub pitch: Int,
    /// Minimum width, nm
    pub width: Int,
    /// Resistance of one via cut up to the next layer, ohms
    #[serde(default)]
    pub via_resistance: f64,
}
impl LayerInfo {
    pub fn new(index: usize, name: impl Into<String>, dir: Dir, pitch: Int, width: Int) -> Self {
        Self {
            index,
            name: name.into(),
            dir,
            pitch,
            width,
            via_resistance: 0.0,
        }
    }
    pub fn with_via_resistance(mut self, via_resistance: f64) -> Self {
        self.via_resistance = via_resistance;
        self
    }
    /// Boolean indication of whether this layer can be extracted.
    /// Layers without a positive pitch and width cannot.
    pub fn is_usable(&self) -> bool {
        self.pitch > 0 && self.width > 0
    }
}

/// # Layer Stack
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LayerStack {
    pub layers: Vec<LayerInfo>,
}
impl LayerStack {
    pub fn new(layers: Vec<LayerInfo>) -> Self {
        Self { layers }
    }
    /// Add a [LayerInfo]
    pub fn add(&mut self, layer: LayerInfo) -> &mut Self {
        self.layers.push(layer);
        self
    }
    /// Get the layer with index `index`
    pub fn get(&self, index: usize) -> Option<&LayerInfo> {
        self.layers.iter().find(|l| l.index == index)
    }
    /// Number of layer slots, including the substrate
    pub fn layer_count(&self) -> usize {
        self.layers.iter().map(|l| l.index + 1).max().unwrap_or(1)
    }
    /// Layers with positive pitch and width.
    /// Others are skipped, with a warning.
    pub fn usable(&self) -> Vec<&LayerInfo> {
        self.layers
            .iter()
            .filter(|l| {
                if !l.is_usable() {
                    warn!(
                        "Skipping layer {} ({}): pitch {} width {}",
                        l.index, l.name, l.pitch, l.width
                    );
                }
                l.is_usable()
            })
            .collect()
    }
    /// Largest pitch among usable layers
    pub fn max_pitch(&self) -> Option<Int> {
        self.layers.iter().filter(|l| l.is_usable()).map(|l| l.pitch).max()
    }
}
