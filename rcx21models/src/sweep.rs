//!
//! # Characterization Sweeps
//!
//! Procedural [RcModel] construction from characterized pattern samples,
//! as produced by a field-solver sweep.
//!

// Std-Lib
use std::collections::BTreeMap;

// Crates.io
use log::info;
use serde::{Deserialize, Serialize};

// Local imports
use crate::corner::{DiagModel, RcModel, RuleOptions};
use crate::distance::{DistanceSample, Int};
use crate::error::{RcxError, RcxResult};
use crate::relation::{index_over, index_over_under, index_under, is_applicable, relation_count, RelationKind};
use crate::width::WidthIndexedTable;

///
/// # Pattern Sample
///
/// One characterized (pattern, separation) point.
/// `under` and `over` name the neighbor layers, as required by `kind`:
/// `under` for Over and ResOver, `over` for Under and DiagUnder, both for OverUnder.
///
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternSample {
    /// Corner index
    pub corner: usize,
    /// Layer index
    pub met: usize,
    pub kind: RelationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub under: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub over: Option<usize>,
    /// Wire width, nm
    pub width: Int,
    /// Diagonal neighbor (width, distance), nm. Full diagonal models only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diag: Option<(Int, Int)>,
    pub sample: DistanceSample,
}
impl PatternSample {
    /// Pattern identifier, as recorded in measurement logs, e.g. `M2oM1_W200_S120`
    pub fn pattern_id(&self) -> String {
        let mut id = format!("M{}", self.met);
        if let Some(u) = self.under {
            id.push_str(&format!("oM{}", u));
        }
        if let Some(o) = self.over {
            id.push_str(&format!("uM{}", o));
        }
        if self.kind == RelationKind::DiagUnder {
            id.push_str("_diag");
        }
        id.push_str(&format!("_W{}", self.width));
        if let Some((dw, dd)) = self.diag {
            id.push_str(&format!("_DW{}_DD{}", dw, dd));
        }
        id.push_str(&format!("_S{}", self.sample.separation));
        id
    }
    /// Relation index within a stack of `layer_count` slots
    fn relation_index(&self, layer_count: usize) -> RcxResult<usize> {
        let rel = match (self.kind, self.under, self.over) {
            (RelationKind::Over | RelationKind::ResOver, Some(u), _) => index_over(self.met, u),
            (RelationKind::Under | RelationKind::DiagUnder, _, Some(o)) => {
                index_under(self.met, o, layer_count)
            }
            (RelationKind::OverUnder, Some(u), Some(o)) => {
                Some(index_over_under(self.met, u, o, layer_count)?)
            }
            _ => None,
        };
        match rel {
            Some(rel) => Ok(rel),
            None => RcxError::fail(format!("Invalid neighbor layers for pattern {}", self.pattern_id())),
        }
    }
}

///
/// # Sweep Builder
///
/// Collects [PatternSample]s and builds an [RcModel] from them.
/// Samples may arrive in any order.
///
#[derive(Debug, Clone)]
pub struct SweepBuilder {
    layer_count: usize,
    rates: Vec<f64>,
    options: RuleOptions,
    samples: Vec<(usize, PatternSample)>,
}
impl SweepBuilder {
    /// Create a new [SweepBuilder] for `layer_count` slots (including the substrate) and density `rates`
    pub fn new(layer_count: usize, rates: Vec<f64>, options: RuleOptions) -> Self {
        Self {
            layer_count,
            rates,
            options,
            samples: Vec::new(),
        }
    }
    /// Add a sample. Fails for samples the layer stack or diagonal model cannot hold.
    pub fn add(&mut self, sample: PatternSample) -> RcxResult<&mut Self> {
        if sample.corner >= self.rates.len() {
            return RcxError::fail(format!("Corner {} out of range", sample.corner));
        }
        if !is_applicable(sample.kind, sample.met, self.layer_count, self.options.diag_model) {
            return RcxError::fail(format!(
                "{} not applicable to layer {}",
                sample.kind, sample.met
            ));
        }
        if sample.diag.is_some()
            && (sample.kind != RelationKind::DiagUnder || self.options.diag_model != DiagModel::Full)
        {
            return RcxError::fail(format!(
                "Diagonal parameters require a full diagonal model: {}",
                sample.pattern_id()
            ));
        }
        let rel = sample.relation_index(self.layer_count)?;
        self.samples.push((rel, sample));
        Ok(self)
    }
    /// Number of samples collected
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    /// Build the [RcModel]. Tables are densified.
    pub fn build(self) -> RcxResult<RcModel> {
        let Self {
            layer_count,
            rates,
            options,
            samples,
        } = self;
        let mut groups: BTreeMap<(usize, usize, RelationKind), Vec<(usize, PatternSample)>> = BTreeMap::new();
        for (rel, s) in samples {
            groups.entry((s.corner, s.met, s.kind)).or_default().push((rel, s));
        }
        let mut model = RcModel::new(layer_count, rates, options.clone());
        let ntables = groups.len();
        for ((corner, met, kind), mut group) in groups {
            group.sort_by_key(|(rel, s)| (*rel, s.width, s.diag, s.sample.separation));
            let widths = sorted_unique(group.iter().map(|(_, s)| s.width));
            let count = relation_count(kind, met, layer_count);
            let mut table = WidthIndexedTable::new(kind, met, count, &widths, options.modulo);

            // Diagonal axes, per relation
            let mut axes: BTreeMap<usize, (Vec<Int>, Vec<Int>)> = BTreeMap::new();
            for (rel, s) in group.iter() {
                if let Some((dw, dd)) = s.diag {
                    let entry = axes.entry(*rel).or_default();
                    entry.0.push(dw);
                    entry.1.push(dd);
                }
            }
            for (rel, (dws, dds)) in axes.iter_mut() {
                *dws = sorted_unique(dws.iter().copied());
                *dds = sorted_unique(dds.iter().copied());
                table.set_diag_axes(*rel, dws, dds, options.modulo)?;
            }

            for (rel, s) in group {
                let wi = position(&widths, s.width)?;
                let dest = match s.diag {
                    Some((dw, dd)) => {
                        let (dws, dds) = axes.get(&rel).ok_or_else(|| RcxError::msg("Missing diagonal axes"))?;
                        let (dwi, dsi) = (position(dws, dw)?, position(dds, dd)?);
                        table.diag_table_mut(rel, wi, dwi, dsi)
                    }
                    None => table.table_mut(rel, wi),
                };
                match dest {
                    Some(t) => t.add_measured(s.sample),
                    None => return RcxError::fail(format!("No table for pattern {}", s.pattern_id())),
                }
            }
            match model.corner_mut(corner) {
                Some(c) => c.install(table)?,
                None => return RcxError::fail(format!("Corner {} out of range", corner)),
            }
        }
        model.densify_all();
        info!("Built {} tables across {} corners", ntables, model.corner_count());
        Ok(model)
    }
}

/// Sort and de-duplicate `vals`
fn sorted_unique(vals: impl Iterator<Item = Int>) -> Vec<Int> {
    let mut v: Vec<Int> = vals.collect();
    v.sort_unstable();
    v.dedup();
    v
}
/// Index of `val` in sorted `vals`
fn position(vals: &[Int], val: Int) -> RcxResult<usize> {
    vals.binary_search(&val)
        .map_err(|_| RcxError::msg(format!("Value {} not characterized", val)))
}
