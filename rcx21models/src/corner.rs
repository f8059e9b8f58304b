//!
//! # Corner Models
//!
//! [CornerModel]: every layer's relationship tables for one process corner.
//! [RcModel]: the set of corners along the density-rate axis,
//! plus the options they were built with.
//!

// Std-Lib
use std::path::Path;

// Crates.io
use derive_builder::Builder;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Local imports
use crate::distance::{DistanceSample, Int, DEFAULT_DIST_UNIT, DEFAULT_MODULO};
use crate::error::RcxResult;
use crate::relation::{
    index_over, index_over_under, index_under, LayerRelationTable, RelationKind,
};
use crate::utils::SerdeFile;
use crate::width::WidthIndexedTable;

/// # Diagonal Coupling Models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DiagModel {
    /// No diagonal tables
    None,
    /// Per-width diagonal tables, one per layer above (`DIAGMODEL ON`)
    Simple,
    /// Per-width, per-diagonal-width, per-diagonal-distance tables (`DIAGMODEL TRUE`)
    Full,
}
impl Default for DiagModel {
    fn default() -> Self {
        Self::None
    }
}

///
/// # Rule-File and Model Options
///
/// Options governing how an [RcModel] is read and built.
/// Header flags in a rule file override `diag_model` and `reverse_over_under`.
///
#[derive(Debug, Clone, Builder, Serialize, Deserialize, JsonSchema, PartialEq)]
#[builder(pattern = "owned", setter(into))]
pub struct RuleOptions {
    /// Indices of the `DensityModel` blocks to load. `None` loads all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub corners: Option<Vec<usize>>,
    /// Take the over-layer of OverUnder sub-blocks from their headers,
    /// rather than from their position
    #[serde(default)]
    #[builder(default)]
    pub reverse_over_under: bool,
    /// Diagonal model
    #[serde(default)]
    #[builder(default)]
    pub diag_model: DiagModel,
    /// Database-unit scale factor applied to lengths and values
    #[serde(default = "default_db_factor")]
    #[builder(default = "1.0")]
    pub db_factor: f64,
    /// Dense-table step, nm
    #[serde(default = "default_dist_unit")]
    #[builder(default = "DEFAULT_DIST_UNIT")]
    pub dist_unit: Int,
    /// Bucket-map quantization step, nm
    #[serde(default = "default_modulo")]
    #[builder(default = "DEFAULT_MODULO")]
    pub modulo: Int,
}
fn default_db_factor() -> f64 {
    1.0
}
fn default_dist_unit() -> Int {
    DEFAULT_DIST_UNIT
}
fn default_modulo() -> Int {
    DEFAULT_MODULO
}
impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            corners: None,
            reverse_over_under: false,
            diag_model: DiagModel::None,
            db_factor: default_db_factor(),
            dist_unit: default_dist_unit(),
            modulo: default_modulo(),
        }
    }
}
impl SerdeFile for RuleOptions {}

///
/// # Corner Model
///
/// One [LayerRelationTable] per layer slot, for a single process corner.
/// Slot zero is the substrate.
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CornerModel {
    /// Density rate of this corner
    pub rate: f64,
    layers: Vec<LayerRelationTable>,
}
impl CornerModel {
    /// Create a new [CornerModel] with all tables unbuilt
    pub fn new(layer_count: usize, rate: f64, diag: DiagModel) -> Self {
        let layers = (0..layer_count)
            .map(|met| LayerRelationTable::new(met, layer_count, diag))
            .collect();
        Self { rate, layers }
    }
    /// Number of layer slots, including the substrate
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
    pub fn layer(&self, met: usize) -> Option<&LayerRelationTable> {
        self.layers.get(met)
    }
    pub fn layer_mut(&mut self, met: usize) -> Option<&mut LayerRelationTable> {
        self.layers.get_mut(met)
    }
    /// Get the table of `kind` for layer `met`, if built
    pub fn table(&self, met: usize, kind: RelationKind) -> Option<&WidthIndexedTable> {
        self.layer(met)?.get(kind)
    }
    /// Install `table` on its layer
    pub fn install(&mut self, table: WidthIndexedTable) -> RcxResult<()> {
        let met = table.met;
        match self.layers.get_mut(met) {
            Some(layer) => layer.install(table),
            None => crate::RcxError::fail(format!("Layer {} out of range", met)),
        }
    }
    /// Look up relation `rel` of `kind` on layer `met`
    pub fn lookup(
        &self,
        met: usize,
        kind: RelationKind,
        rel: usize,
        width: Int,
        separation: Int,
    ) -> Option<DistanceSample> {
        self.table(met, kind)?.lookup(rel, width, separation)
    }
    /// Look up layer `met` over layer `under`, zero being the substrate
    pub fn lookup_over(&self, met: usize, under: usize, width: Int, separation: Int) -> Option<DistanceSample> {
        let rel = index_over(met, under)?;
        self.lookup(met, RelationKind::Over, rel, width, separation)
    }
    /// Look up layer `met` under layer `over`
    pub fn lookup_under(&self, met: usize, over: usize, width: Int, separation: Int) -> Option<DistanceSample> {
        let rel = index_under(met, over, self.layer_count())?;
        self.lookup(met, RelationKind::Under, rel, width, separation)
    }
    /// Look up layer `met` between layers `under` and `over`
    pub fn lookup_over_under(
        &self,
        met: usize,
        under: usize,
        over: usize,
        width: Int,
        separation: Int,
    ) -> Option<DistanceSample> {
        let rel = match index_over_under(met, under, over, self.layer_count()) {
            Ok(rel) => rel,
            Err(e) => {
                debug!("{}", e);
                return None;
            }
        };
        self.lookup(met, RelationKind::OverUnder, rel, width, separation)
    }
    ///
    /// Look up layer `met` diagonally under layer `over`.
    ///
    /// Full diagonal models resolve the diagonal width and distance buckets,
    /// and fall back to [WidthIndexedTable::diag_coupling] when no same-layer `separation` is given.
    /// Simple models use the per-width tables at `diag_dist`.
    ///
    pub fn lookup_diag_under(
        &self,
        met: usize,
        over: usize,
        width: Int,
        diag_width: Int,
        diag_dist: Int,
        separation: Option<Int>,
    ) -> Option<DistanceSample> {
        let rel = index_under(met, over, self.layer_count())?;
        let table = self.table(met, RelationKind::DiagUnder)?;
        if table.diag_plane(rel).is_some() {
            return match separation {
                Some(s) => table.lookup_diag(rel, width, diag_width, diag_dist, s),
                None => table.diag_coupling(rel, width, diag_width, diag_dist),
            };
        }
        table.lookup(rel, width, diag_dist)
    }
    /// Resistance per unit length of layer `met` at `width` and `separation`.
    /// Uses the ResOver table when built, and the substrate Over table otherwise.
    pub fn resistance(&self, met: usize, width: Int, separation: Int) -> Option<f64> {
        let kind = match self.table(met, RelationKind::ResOver) {
            Some(t) if t.is_populated() => RelationKind::ResOver,
            _ => RelationKind::Over,
        };
        self.lookup(met, kind, 0, width, separation)
            .map(|s| s.resistance)
    }
    /// Low bound for layer `met` at `width`: isolated wire over the substrate.
    pub fn min_estimate(&self, met: usize, width: Int) -> Option<DistanceSample> {
        let mut rc = self.table(met, RelationKind::Over)?.fringe(0, width)?;
        if let Some(res) = self.resistance(met, width, 0) {
            rc.resistance = res;
        }
        Some(rc)
    }
    ///
    /// High bound for layer `met` at `width` and `separation`.
    ///
    /// The top layer uses its isolated Over sample above the layer below;
    /// the bottom layer its Under sample beneath the layer above;
    /// interior layers the OverUnder sample between both neighbors.
    ///
    pub fn max_estimate(&self, met: usize, width: Int, separation: Int) -> Option<DistanceSample> {
        let top = self.layer_count().checked_sub(1)?;
        if met == 0 || met > top {
            return None;
        }
        let mut rc = if met == top {
            self.table(met, RelationKind::Over)?.fringe(met - 1, width)?
        } else if met == 1 {
            self.lookup_under(met, met + 1, width, separation)?
        } else {
            self.lookup_over_under(met, met - 1, met + 1, width, separation)?
        };
        if let Some(res) = self.resistance(met, width, separation) {
            rc.resistance = res;
        }
        Some(rc)
    }
    /// Densify every built table
    pub fn densify_all(&mut self, dist_unit: Int) {
        for layer in self.layers.iter_mut() {
            layer.densify_all(dist_unit);
        }
    }
    /// Scale duplicate-tail resistances of every built table
    pub fn scale_resistance(&mut self, multiplier: f64) {
        for layer in self.layers.iter_mut() {
            layer.scale_resistance(multiplier);
        }
    }
    /// Applicable (layer, relationship) pairs without a built table
    pub fn missing(&self) -> Vec<(usize, RelationKind)> {
        self.layers
            .iter()
            .flat_map(|l| l.missing().into_iter().map(move |k| (l.met(), k)))
            .collect()
    }
}

/// # Corner Bounds
/// Low and high estimates for one layer in one corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerBounds {
    pub corner: usize,
    pub rate: f64,
    pub lo: Option<DistanceSample>,
    pub hi: Option<DistanceSample>,
}

///
/// # RC Model
///
/// [CornerModel]s along the density-rate axis.
/// Built once, by reading a rule file or from a characterization sweep,
/// and read-only thereafter.
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcModel {
    layer_count: usize,
    rates: Vec<f64>,
    corners: Vec<CornerModel>,
    options: RuleOptions,
}
impl RcModel {
    /// Create a new [RcModel] with one empty corner per entry in `rates`
    pub fn new(layer_count: usize, rates: Vec<f64>, options: RuleOptions) -> Self {
        let corners = rates
            .iter()
            .map(|&r| CornerModel::new(layer_count, r, options.diag_model))
            .collect();
        Self {
            layer_count,
            rates,
            corners,
            options,
        }
    }
    /// Read from rule-file content `src`
    pub fn from_rules(src: &str, options: &RuleOptions) -> RcxResult<Self> {
        crate::read::parse_str(src, options)
    }
    /// Read from rule file `fname`
    pub fn open_rules(fname: impl AsRef<Path>, options: &RuleOptions) -> RcxResult<Self> {
        crate::read::parse_file(fname, options)
    }
    /// Write to rule file `fname`
    pub fn save_rules(&self, fname: impl AsRef<Path>) -> RcxResult<()> {
        crate::write::save(self, fname)
    }
    /// Write to rule-file format [String]
    pub fn to_rules_string(&self) -> RcxResult<String> {
        crate::write::to_string(self)
    }
    /// Number of layer slots, including the substrate
    pub fn layer_count(&self) -> usize {
        self.layer_count
    }
    /// Density-rate axis
    pub fn rates(&self) -> &[f64] {
        &self.rates
    }
    pub fn corners(&self) -> &[CornerModel] {
        &self.corners
    }
    pub fn corner(&self, idx: usize) -> Option<&CornerModel> {
        self.corners.get(idx)
    }
    pub fn corner_mut(&mut self, idx: usize) -> Option<&mut CornerModel> {
        self.corners.get_mut(idx)
    }
    pub fn corner_count(&self) -> usize {
        self.corners.len()
    }
    pub fn options(&self) -> &RuleOptions {
        &self.options
    }
    pub(crate) fn options_mut(&mut self) -> &mut RuleOptions {
        &mut self.options
    }
    ///
    /// Index of the corner nearest density rate `rate`.
    ///
    /// An exact match wins. Otherwise the bracketing corner with the smaller deficit,
    /// with ties going to the lower index.
    /// Returns `None` for an empty model or a NaN `rate`.
    ///
    pub fn nearest_corner_index(&self, rate: f64) -> Option<usize> {
        if rate.is_nan() {
            return None;
        }
        if let Some(idx) = self.rates.iter().position(|&r| r == rate) {
            return Some(idx);
        }
        let mut best: Option<(usize, f64)> = None;
        for (idx, &r) in self.rates.iter().enumerate() {
            let deficit = (r - rate).abs();
            match best {
                Some((_, d)) if d <= deficit => (),
                _ => best = Some((idx, deficit)),
            }
        }
        best.map(|(idx, _)| idx)
    }
    /// Densify every table of every corner
    pub fn densify_all(&mut self) {
        let unit = self.options.dist_unit;
        for corner in self.corners.iter_mut() {
            corner.densify_all(unit);
        }
    }
    /// Scale duplicate-tail resistances across all corners
    pub fn scale_resistance(&mut self, multiplier: f64) {
        for corner in self.corners.iter_mut() {
            corner.scale_resistance(multiplier);
        }
    }
    /// Log the applicable tables missing from each corner
    pub fn log_missing(&self) {
        for (idx, corner) in self.corners.iter().enumerate() {
            for (met, kind) in corner.missing() {
                debug!("Corner {}: no {} table for layer {}", idx, kind, met);
            }
        }
    }
    /// Low and high bounds of layer `met`, for each corner
    pub fn bounds(&self, met: usize, width: Int, spacing: Int) -> Vec<CornerBounds> {
        self.corners
            .iter()
            .enumerate()
            .map(|(corner, c)| CornerBounds {
                corner,
                rate: c.rate,
                lo: c.min_estimate(met, width),
                hi: c.max_estimate(met, width, spacing),
            })
            .collect()
    }
}
/// Snapshots carry measured samples only. Run [RcModel::densify_all] after opening.
impl SerdeFile for RcModel {}
