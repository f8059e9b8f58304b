//!
//! # Layer Relationships
//!
//! Relationship kinds between a layer and its neighbors in the process stack,
//! the index arithmetic mapping neighbor layers to table indices,
//! and the per-layer [LayerRelationTable].
//!

// Std-Lib
use std::collections::BTreeMap;

// Crates.io
use serde::{Deserialize, Serialize};

// Local imports
use crate::distance::Int;
use crate::error::{RcxError, RcxResult};
use crate::utils::{enumstr, EnumStr};
use crate::width::WidthIndexedTable;
use crate::DiagModel;

enumstr!(
    /// # Layer Relationship Kinds
    ///
    /// Ordered as written in rule files.
    RelationKind {
        ResOver: "RESOVER",
        Over: "OVER",
        Under: "UNDER",
        DiagUnder: "DIAGUNDER",
        OverUnder: "OVERUNDER",
    }
);

/// Number of layers above, from the first, carrying full diagonal tables
pub const DIAG_LAYER_SPAN: usize = 4;

/// Boolean indication of whether layer `met` in a stack of `layer_count` slots
/// can have a relationship of kind `kind`.
/// Slot zero is the substrate, and has no relationships.
pub fn is_applicable(kind: RelationKind, met: usize, layer_count: usize, diag: DiagModel) -> bool {
    use RelationKind::*;
    if met == 0 || met >= layer_count {
        return false;
    }
    match kind {
        Over | ResOver => true,
        Under => met + 1 < layer_count,
        DiagUnder => diag != DiagModel::None && met + 1 < layer_count,
        OverUnder => met > 1 && met + 1 < layer_count,
    }
}

/// Number of relation indices of kind `kind` for layer `met`.
pub fn relation_count(kind: RelationKind, met: usize, layer_count: usize) -> usize {
    use RelationKind::*;
    match kind {
        Over | ResOver => met,
        Under | DiagUnder => layer_count.saturating_sub(met + 1),
        OverUnder => max_over_under_index(met, layer_count).map_or(0, |n| n + 1),
    }
}

/// Linear index of the (under, over) pair for layer `met`.
/// No range checks.
fn over_under_raw(met: usize, under: usize, over: usize, layer_count: usize) -> isize {
    let (met, under, over, lc) = (met as isize, under as isize, over as isize, layer_count as isize);
    (lc - met - 1) * (under - 1) + (over - met - 1)
}

///
/// Index of the OverUnder relation between layer `met`, layer `under` below it, and layer `over` above it:
/// `(layer_count - met - 1) * (under - 1) + (over - met - 1)`.
///
/// Valid pairs satisfy `1 <= under < met < over < layer_count`.
/// All others produce [RcxError::IndexOutOfRange].
///
pub fn index_over_under(met: usize, under: usize, over: usize, layer_count: usize) -> RcxResult<usize> {
    let oob = || RcxError::IndexOutOfRange {
        met,
        under,
        over,
        layer_count,
    };
    if !(1 <= under && under < met && met < over && over < layer_count) {
        return Err(oob());
    }
    let n = over_under_raw(met, under, over, layer_count);
    match max_over_under_index(met, layer_count) {
        Some(max) if n >= 0 && n as usize <= max => Ok(n as usize),
        _ => Err(oob()),
    }
}

/// Maximum OverUnder index for layer `met`, found by scanning all valid (under, over) pairs.
/// Returns `None` when no valid pair exists.
pub fn max_over_under_index(met: usize, layer_count: usize) -> Option<usize> {
    let mut max: Option<usize> = None;
    for under in 1..met {
        for over in met + 1..layer_count {
            let n = over_under_raw(met, under, over, layer_count);
            if n >= 0 {
                max = Some(max.map_or(n as usize, |m| m.max(n as usize)));
            }
        }
    }
    max
}

/// Index of the Under (and DiagUnder) relation between `met` and layer `over` above it
pub fn index_under(met: usize, over: usize, layer_count: usize) -> Option<usize> {
    if over > met && over < layer_count {
        Some(over - met - 1)
    } else {
        None
    }
}

/// Index of the Over relation between `met` and layer `under` below it, zero being the substrate
pub fn index_over(met: usize, under: usize) -> Option<usize> {
    if under < met {
        Some(under)
    } else {
        None
    }
}

/// # Relationship Slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelationSlot {
    /// The layer's position in the stack precludes the relationship
    Absent,
    /// Applicable, but no table has been loaded
    Unbuilt,
    /// Loaded table
    Built(Box<WidthIndexedTable>),
}

/// # Relationship Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationStatus {
    Absent,
    Unbuilt,
    Built,
}

///
/// # Layer Relation Table
///
/// The [WidthIndexedTable]s of every relationship kind for a single layer.
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerRelationTable {
    met: usize,
    slots: BTreeMap<RelationKind, RelationSlot>,
}
impl LayerRelationTable {
    /// Create a new [LayerRelationTable] for layer `met`.
    /// Every applicable relationship starts out [RelationSlot::Unbuilt].
    pub fn new(met: usize, layer_count: usize, diag: DiagModel) -> Self {
        let slots = RelationKind::variants()
            .iter()
            .map(|&kind| {
                let slot = match is_applicable(kind, met, layer_count, diag) {
                    true => RelationSlot::Unbuilt,
                    false => RelationSlot::Absent,
                };
                (kind, slot)
            })
            .collect();
        Self { met, slots }
    }
    /// Layer index
    pub fn met(&self) -> usize {
        self.met
    }
    /// Status of relationship `kind`
    pub fn status(&self, kind: RelationKind) -> RelationStatus {
        match self.slots.get(&kind) {
            Some(RelationSlot::Built(_)) => RelationStatus::Built,
            Some(RelationSlot::Unbuilt) => RelationStatus::Unbuilt,
            Some(RelationSlot::Absent) | None => RelationStatus::Absent,
        }
    }
    /// Get the table of kind `kind`, if built
    pub fn get(&self, kind: RelationKind) -> Option<&WidthIndexedTable> {
        match self.slots.get(&kind) {
            Some(RelationSlot::Built(t)) => Some(t.as_ref()),
            _ => None,
        }
    }
    /// Get a mutable reference to the table of kind `kind`, if built
    pub fn get_mut(&mut self, kind: RelationKind) -> Option<&mut WidthIndexedTable> {
        match self.slots.get_mut(&kind) {
            Some(RelationSlot::Built(t)) => Some(t.as_mut()),
            _ => None,
        }
    }
    /// Install `table`, replacing any existing table of its kind.
    /// Fails for relationships not applicable to this layer.
    pub fn install(&mut self, table: WidthIndexedTable) -> RcxResult<()> {
        if table.met != self.met {
            return RcxError::fail(format!(
                "Cannot install layer-{} {} table on layer {}",
                table.met, table.kind, self.met
            ));
        }
        let met = self.met;
        match self.slots.get_mut(&table.kind) {
            Some(slot) if !matches!(slot, RelationSlot::Absent) => {
                *slot = RelationSlot::Built(Box::new(table));
                Ok(())
            }
            _ => RcxError::fail(format!(
                "{} relationship not applicable to layer {}",
                table.kind, met
            )),
        }
    }
    /// Iterate over all built tables
    pub fn tables(&self) -> impl Iterator<Item = &WidthIndexedTable> {
        self.slots.values().filter_map(|s| match s {
            RelationSlot::Built(t) => Some(t.as_ref()),
            _ => None,
        })
    }
    /// Applicable relationships for which no table is built
    pub fn missing(&self) -> Vec<RelationKind> {
        self.slots
            .iter()
            .filter(|(_, s)| matches!(s, RelationSlot::Unbuilt))
            .map(|(k, _)| *k)
            .collect()
    }
    /// Densify every built table
    pub fn densify_all(&mut self, dist_unit: Int) {
        for slot in self.slots.values_mut() {
            if let RelationSlot::Built(t) = slot {
                t.densify_all(dist_unit);
            }
        }
    }
    /// Scale duplicate-tail resistances of every built table
    pub fn scale_resistance(&mut self, multiplier: f64) {
        for slot in self.slots.values_mut() {
            if let RelationSlot::Built(t) = slot {
                t.scale_resistance(multiplier);
            }
        }
    }
}
