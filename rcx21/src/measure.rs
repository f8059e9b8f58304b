//!
//! # Measurement Context
//!
//! Per-query bundle of layer relationship, width and spacing,
//! resolved against each tracked corner and accumulated per corner.
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Local imports
use crate::models::{index_over, index_over_under, index_under, CornerModel, DistanceSample, RelationKind};
use crate::Int;

/// # Accumulated RC Values, for one corner
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RcTotals {
    pub coupling: f64,
    pub fringe: f64,
    pub diagonal: f64,
    pub resistance: f64,
}

///
/// # Measurement Context
///
/// `under` alone measures layer `met` over `under`; `over` alone, under `over`;
/// both, between the two. Layer zero is the substrate.
///
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementContext {
    pub met: usize,
    pub under: Option<usize>,
    pub over: Option<usize>,
    pub width: Int,
    /// Same-layer neighbor separation. `None` for isolated wires.
    pub separation: Option<Int>,
    /// Diagonal neighbor (width, distance)
    pub diag: Option<(Int, Int)>,
    pub same_net: bool,
    totals: Vec<RcTotals>,
}
impl MeasurementContext {
    /// Create a context for layer `met` at `width`, accumulating into `slots` corners
    pub fn new(met: usize, width: Int, slots: usize) -> Self {
        Self {
            met,
            under: None,
            over: None,
            width,
            separation: None,
            diag: None,
            same_net: false,
            totals: vec![RcTotals::default(); slots],
        }
    }
    pub fn under(mut self, under: usize) -> Self {
        self.under = Some(under);
        self
    }
    pub fn over(mut self, over: usize) -> Self {
        self.over = Some(over);
        self
    }
    pub fn separation(mut self, separation: Int) -> Self {
        self.separation = Some(separation);
        self
    }
    pub fn diag(mut self, diag_width: Int, diag_dist: Int) -> Self {
        self.diag = Some((diag_width, diag_dist));
        self
    }
    pub fn same_net(mut self, same_net: bool) -> Self {
        self.same_net = same_net;
        self
    }
    /// Boolean indication of whether neighbor coupling applies:
    /// a same-layer separation or a diagonal neighbor is set.
    pub fn is_separation_based(&self) -> bool {
        self.separation.is_some() || self.diag.is_some()
    }
    ///
    /// Look up this context in `corner`.
    ///
    /// Isolated contexts use the relation's widest-separation sample.
    /// Resistance is taken from the layer's ResOver table when built.
    /// Returns `None` where the corner has no applicable table.
    ///
    pub fn resolve(&self, corner: &CornerModel) -> Option<DistanceSample> {
        let (met, width, lc) = (self.met, self.width, corner.layer_count());
        let isolated = |kind: RelationKind, rel: usize| corner.table(met, kind)?.fringe(rel, width);
        let mut rc = match (self.under, self.over) {
            (Some(u), None) => match self.separation {
                Some(s) => corner.lookup_over(met, u, width, s),
                None => isolated(RelationKind::Over, index_over(met, u)?),
            },
            (None, Some(o)) => match (self.diag, self.separation) {
                (Some((dw, dd)), s) => corner.lookup_diag_under(met, o, width, dw, dd, s),
                (None, Some(s)) => corner.lookup_under(met, o, width, s),
                (None, None) => isolated(RelationKind::Under, index_under(met, o, lc)?),
            },
            (Some(u), Some(o)) => match self.separation {
                Some(s) => corner.lookup_over_under(met, u, o, width, s),
                None => isolated(RelationKind::OverUnder, index_over_under(met, u, o, lc).ok()?),
            },
            (None, None) => None,
        }?;
        if let Some(res) = corner.resistance(met, width, self.separation.unwrap_or(0)) {
            rc.resistance = res;
        }
        Some(rc)
    }
    ///
    /// Add `sample`, scaled by `length`, to corner slot `slot`.
    ///
    /// Same-net neighbors add half their fringe and no coupling.
    /// Out-of-range slots are ignored.
    ///
    pub fn accumulate(&mut self, sample: &DistanceSample, length: Int, slot: usize) {
        let coupled = self.is_separation_based();
        let same_net = self.same_net;
        let totals = match self.totals.get_mut(slot) {
            Some(t) => t,
            None => return,
        };
        let len = length as f64;
        if same_net {
            totals.fringe += 0.5 * len * sample.fringe;
        } else {
            totals.fringe += len * sample.fringe;
            if coupled {
                totals.coupling += len * sample.coupling;
                totals.diagonal += len * sample.diagonal;
            }
        }
        totals.resistance += len * sample.resistance;
    }
    /// Resolve against each of `corners` in turn, accumulating over `length`.
    /// Corners without an applicable table contribute nothing.
    pub fn measure<'c>(&mut self, corners: impl IntoIterator<Item = &'c CornerModel>, length: Int) {
        for (slot, corner) in corners.into_iter().enumerate() {
            if let Some(rc) = self.resolve(corner) {
                self.accumulate(&rc, length, slot);
            }
        }
    }
    /// Accumulated totals, one per corner slot
    pub fn totals(&self) -> &[RcTotals] {
        &self.totals
    }
}
