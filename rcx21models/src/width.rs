//!
//! # Width-Indexed Tables
//!
//! [DistanceTable]s for one relationship kind of one layer,
//! arranged by neighbor-layer relation index and wire width,
//! plus the diagonal planes of the diagonal-under relationship.
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Local imports
use crate::distance::{DistanceSample, DistanceTable, Int};
use crate::error::{RcxError, RcxResult};
use crate::relation::RelationKind;

///
/// # Bucket Map
///
/// Maps arbitrary values onto indices of an ascending list of characterized values.
/// Each value maps to the bucket of the nearest characterized value not exceeding it,
/// quantized with step `modulo`.
///
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketMap {
    values: Vec<Int>,
    modulo: Int,
    map: Vec<usize>,
}
impl BucketMap {
    /// Create a [BucketMap] over ascending `values` with step `modulo`.
    ///
    /// For each consecutive pair `(v_j, v_j+1)`, every quantized step from `v_j` through `v_j+1`
    /// (and short of the last value) maps to `j`. Shared endpoints therefore
    /// map to the upper bucket.
    pub fn new(values: &[Int], modulo: Int) -> Self {
        let modulo = modulo.max(1);
        let mut map = Vec::new();
        if let (Some(&first), Some(&last)) = (values.first(), values.last()) {
            let n = ((last - first) / modulo).max(0) as usize + 1;
            map = vec![0; n];
            for (jj, pair) in values.windows(2).enumerate() {
                let mut v = pair[0];
                while v <= pair[1] {
                    if v < last {
                        let idx = ((v - first) / modulo) as usize;
                        if idx < n {
                            map[idx] = jj;
                        }
                    }
                    v += modulo;
                }
            }
        }
        Self {
            values: values.to_vec(),
            modulo,
            map,
        }
    }
    /// Bucket index for `value`.
    /// Values at or above the last characterized value map to the last bucket,
    /// values below the first to bucket zero.
    /// Returns `None` only for an empty map.
    pub fn bucket(&self, value: Int) -> Option<usize> {
        let first = *self.values.first()?;
        let last_idx = self.values.len() - 1;
        if value >= self.values[last_idx] {
            return Some(last_idx);
        }
        if value < first {
            return Some(0);
        }
        let idx = ((value - first) / self.modulo) as usize;
        Some(self.map.get(idx).copied().unwrap_or(last_idx))
    }
    /// Characterized values
    pub fn values(&self) -> &[Int] {
        &self.values
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// # Diagonal Axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagAxis {
    /// Width of the diagonal neighbor
    Width,
    /// Lateral distance to the diagonal neighbor
    Distance,
}

///
/// # Diagonal Plane
///
/// Per-relation tables for diagonal coupling, indexed by
/// (width, diagonal width, diagonal distance).
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagPlane {
    widths: BucketMap,
    dists: BucketMap,
    tables: Vec<DistanceTable>,
}
impl DiagPlane {
    pub fn diag_widths(&self) -> &[Int] {
        self.widths.values()
    }
    pub fn diag_dists(&self) -> &[Int] {
        self.dists.values()
    }
}

///
/// # Width-Indexed Table
///
/// All [DistanceTable]s of one [RelationKind] for layer `met`,
/// stored in a flat arena indexed by `(relation_index, width_index)`.
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidthIndexedTable {
    /// Relationship kind
    pub kind: RelationKind,
    /// Layer index
    pub met: usize,
    relation_count: usize,
    widths: BucketMap,
    tables: Vec<DistanceTable>,
    diag: Vec<Option<DiagPlane>>,
}
impl WidthIndexedTable {
    /// Create a new, empty [WidthIndexedTable]
    pub fn new(
        kind: RelationKind,
        met: usize,
        relation_count: usize,
        widths: &[Int],
        modulo: Int,
    ) -> Self {
        let widths = BucketMap::new(widths, modulo);
        let n = relation_count * widths.len();
        Self {
            kind,
            met,
            relation_count,
            tables: vec![DistanceTable::default(); n],
            diag: vec![None; relation_count],
            widths,
        }
    }
    /// Number of neighbor-layer relations
    pub fn relation_count(&self) -> usize {
        self.relation_count
    }
    /// Characterized widths
    pub fn widths(&self) -> &[Int] {
        self.widths.values()
    }
    /// Flat-arena index of `(rel, wi)`
    fn slot(&self, rel: usize, wi: usize) -> Option<usize> {
        let nw = self.widths.len();
        if rel < self.relation_count && wi < nw {
            Some(rel * nw + wi)
        } else {
            None
        }
    }
    /// Get the [DistanceTable] at relation `rel`, width index `wi`
    pub fn table(&self, rel: usize, wi: usize) -> Option<&DistanceTable> {
        self.tables.get(self.slot(rel, wi)?)
    }
    /// Get a mutable reference to the [DistanceTable] at relation `rel`, width index `wi`
    pub fn table_mut(&mut self, rel: usize, wi: usize) -> Option<&mut DistanceTable> {
        let idx = self.slot(rel, wi)?;
        self.tables.get_mut(idx)
    }
    /// Width bucket for `width`
    pub fn bucket_for(&self, width: Int) -> Option<usize> {
        self.widths.bucket(width)
    }
    /// Look up relation `rel` at `width` and `separation`
    pub fn lookup(&self, rel: usize, width: Int, separation: Int) -> Option<DistanceSample> {
        let wi = self.bucket_for(width)?;
        self.table(rel, wi)?.lookup(separation)
    }
    /// Isolated-wire sample of relation `rel` at `width`
    pub fn fringe(&self, rel: usize, width: Int) -> Option<DistanceSample> {
        let wi = self.bucket_for(width)?;
        self.table(rel, wi)?.last()
    }
    /// Boolean indication of whether any measured data is present
    pub fn is_populated(&self) -> bool {
        self.tables.iter().any(|t| !t.is_empty())
            || self
                .diag
                .iter()
                .flatten()
                .any(|p| p.tables.iter().any(|t| !t.is_empty()))
    }

    /// Set the diagonal axes of relation `rel`, allocating its [DiagPlane].
    pub fn set_diag_axes(
        &mut self,
        rel: usize,
        diag_widths: &[Int],
        diag_dists: &[Int],
        modulo: Int,
    ) -> RcxResult<()> {
        if self.kind != RelationKind::DiagUnder {
            return RcxError::fail(format!(
                "Diagonal axes set on {} table for layer {}",
                self.kind, self.met
            ));
        }
        if rel >= self.relation_count {
            return RcxError::fail(format!(
                "Diagonal relation {} out of range for layer {}",
                rel, self.met
            ));
        }
        let n = self.widths.len() * diag_widths.len() * diag_dists.len();
        self.diag[rel] = Some(DiagPlane {
            widths: BucketMap::new(diag_widths, modulo),
            dists: BucketMap::new(diag_dists, modulo),
            tables: vec![DistanceTable::default(); n],
        });
        Ok(())
    }
    /// Diagonal plane of relation `rel`, if populated
    pub fn diag_plane(&self, rel: usize) -> Option<&DiagPlane> {
        self.diag.get(rel)?.as_ref()
    }
    /// Diagonal bucket for `value` along `axis`.
    /// Returns `None` if relation `rel` has no diagonal plane.
    pub fn diag_bucket_for(&self, rel: usize, value: Int, axis: DiagAxis) -> Option<usize> {
        let plane = self.diag_plane(rel)?;
        match axis {
            DiagAxis::Width => plane.widths.bucket(value),
            DiagAxis::Distance => plane.dists.bucket(value),
        }
    }
    /// Flat index within a [DiagPlane]
    fn diag_slot(&self, plane: &DiagPlane, wi: usize, dwi: usize, dsi: usize) -> Option<usize> {
        let (ndw, nds) = (plane.widths.len(), plane.dists.len());
        if wi < self.widths.len() && dwi < ndw && dsi < nds {
            Some((wi * ndw + dwi) * nds + dsi)
        } else {
            None
        }
    }
    /// Get the diagonal [DistanceTable] at `(rel, wi, dwi, dsi)`
    pub fn diag_table(&self, rel: usize, wi: usize, dwi: usize, dsi: usize) -> Option<&DistanceTable> {
        let plane = self.diag_plane(rel)?;
        let idx = self.diag_slot(plane, wi, dwi, dsi)?;
        plane.tables.get(idx)
    }
    /// Get a mutable reference to the diagonal [DistanceTable] at `(rel, wi, dwi, dsi)`
    pub fn diag_table_mut(
        &mut self,
        rel: usize,
        wi: usize,
        dwi: usize,
        dsi: usize,
    ) -> Option<&mut DistanceTable> {
        let idx = {
            let plane = self.diag.get(rel)?.as_ref()?;
            self.diag_slot(plane, wi, dwi, dsi)?
        };
        self.diag.get_mut(rel)?.as_mut()?.tables.get_mut(idx)
    }
    /// Look up the diagonal table for `(width, diag_width, diag_dist)` at `separation`
    pub fn lookup_diag(
        &self,
        rel: usize,
        width: Int,
        diag_width: Int,
        diag_dist: Int,
        separation: Int,
    ) -> Option<DistanceSample> {
        let wi = self.bucket_for(width)?;
        let dwi = self.diag_bucket_for(rel, diag_width, DiagAxis::Width)?;
        let dsi = self.diag_bucket_for(rel, diag_dist, DiagAxis::Distance)?;
        self.diag_table(rel, wi, dwi, dsi)?.lookup(separation)
    }
    ///
    /// Diagonal coupling to a neighbor `diag_dist` away, with no same-layer neighbor.
    ///
    /// Uses the isolated-wire sample of each characterized diagonal distance.
    /// Between characterized distances the diagonal component is linearly interpolated;
    /// below the first it holds flat; beyond the last it decays as `1/diag_dist`.
    ///
    pub fn diag_coupling(
        &self,
        rel: usize,
        width: Int,
        diag_width: Int,
        diag_dist: Int,
    ) -> Option<DistanceSample> {
        let wi = self.bucket_for(width)?;
        let dwi = self.diag_bucket_for(rel, diag_width, DiagAxis::Width)?;
        let plane = self.diag_plane(rel)?;
        let dists = plane.dists.values();
        let at = |dsi: usize| -> Option<DistanceSample> {
            let mut s = self.diag_table(rel, wi, dwi, dsi)?.last()?;
            s.separation = dists[dsi];
            Some(s)
        };
        let last = dists.len().checked_sub(1)?;
        if diag_dist <= dists[0] {
            return at(0);
        }
        if diag_dist >= dists[last] {
            let mut s = at(last)?;
            if diag_dist > dists[last] && diag_dist > 0 {
                s.diagonal = s.diagonal * dists[last] as f64 / diag_dist as f64;
            }
            s.separation = diag_dist;
            return Some(s);
        }
        let dsi = plane.dists.bucket(diag_dist)?.min(last - 1);
        let (lo, hi) = (at(dsi)?, at(dsi + 1)?);
        Some(DistanceSample::interpolate(diag_dist, &lo, &hi))
    }

    /// Densify every [DistanceTable], with step `dist_unit`
    pub fn densify_all(&mut self, dist_unit: Int) {
        let diag_tables = self.diag.iter_mut().flatten().flat_map(|p| p.tables.iter_mut());
        for table in self.tables.iter_mut().chain(diag_tables) {
            table.densify(dist_unit, None);
        }
    }
    /// Apply [DistanceTable::scale_resistance_for_duplicate_tail] to every table
    pub fn scale_resistance(&mut self, multiplier: f64) {
        let diag_tables = self.diag.iter_mut().flatten().flat_map(|p| p.tables.iter_mut());
        for table in self.tables.iter_mut().chain(diag_tables) {
            table.scale_resistance_for_duplicate_tail(multiplier);
        }
    }
}
