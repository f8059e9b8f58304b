//!
//! # Bucket Planes
//!
//! Live shapes of the current window, per layer,
//! ordered by their low sweep-axis edge.
//!

// Std-Lib
use std::collections::{BTreeMap, HashMap};

// Crates.io
use slotmap::{new_key_type, SlotMap};

// Local imports
use crate::data::{Shape, ShapeId};
use crate::Int;

new_key_type! {
    /// Keys for live [Shape]s
    pub struct ShapeKey;
}

/// Single-layer index of live shapes
#[derive(Debug, Default)]
struct LayerPlane {
    /// Shape keys by low sweep-axis edge
    buckets: BTreeMap<Int, Vec<ShapeKey>>,
    /// Largest sweep-axis extent ever inserted
    max_extent: Int,
}

///
/// # Bucket Planes
///
/// Arena of live [Shape]s, indexed per layer.
/// Only layers named at construction accept shapes.
///
#[derive(Debug, Default)]
pub struct BucketPlanes {
    shapes: SlotMap<ShapeKey, Shape>,
    ids: HashMap<ShapeId, ShapeKey>,
    layers: BTreeMap<usize, LayerPlane>,
}
impl BucketPlanes {
    /// Create empty planes for `layers`
    pub fn new(layers: impl IntoIterator<Item = usize>) -> Self {
        Self {
            layers: layers.into_iter().map(|l| (l, LayerPlane::default())).collect(),
            ..Default::default()
        }
    }
    /// Boolean indication of whether `layer` has a plane
    pub fn has_layer(&self, layer: usize) -> bool {
        self.layers.contains_key(&layer)
    }
    /// Insert `shape`. Returns `None` if already live, or if its layer has no plane.
    pub fn insert(&mut self, shape: Shape) -> Option<ShapeKey> {
        if self.ids.contains_key(&shape.id) {
            return None;
        }
        let plane = self.layers.get_mut(&shape.layer)?;
        let span = shape.sweep_span();
        let key = self.shapes.insert(shape);
        plane.buckets.entry(span.lo).or_default().push(key);
        plane.max_extent = plane.max_extent.max(span.len());
        self.ids.insert(shape.id, key);
        Some(key)
    }
    pub fn get(&self, key: ShapeKey) -> Option<&Shape> {
        self.shapes.get(key)
    }
    /// Boolean indication of whether shape `id` is live
    pub fn contains(&self, id: ShapeId) -> bool {
        self.ids.contains_key(&id)
    }
    /// Live shapes on `layer` whose sweep-axis span intersects `[lo, hi]`
    pub fn query(&self, layer: usize, lo: Int, hi: Int) -> Vec<ShapeKey> {
        let plane = match self.layers.get(&layer) {
            Some(p) => p,
            None => return Vec::new(),
        };
        if hi < lo {
            return Vec::new();
        }
        plane
            .buckets
            .range(lo.saturating_sub(plane.max_extent)..=hi)
            .flat_map(|(_, keys)| keys.iter().copied())
            .filter(|k| match self.shapes.get(*k) {
                Some(s) => s.sweep_span().hi >= lo,
                None => false,
            })
            .collect()
    }
    /// Release every shape whose high sweep-axis edge is below `edge`.
    /// Returns the released shapes.
    pub fn release_before(&mut self, edge: Int) -> Vec<Shape> {
        let mut released = Vec::new();
        let shapes = &mut self.shapes;
        for plane in self.layers.values_mut() {
            let mut emptied = Vec::new();
            for (lo, keys) in plane.buckets.range_mut(..edge) {
                keys.retain(|k| {
                    let hi = match shapes.get(*k) {
                        Some(s) => s.sweep_span().hi,
                        None => return false,
                    };
                    if hi >= edge {
                        return true;
                    }
                    released.extend(shapes.remove(*k));
                    false
                });
                if keys.is_empty() {
                    emptied.push(*lo);
                }
            }
            for lo in emptied {
                plane.buckets.remove(&lo);
            }
        }
        for shape in released.iter() {
            self.ids.remove(&shape.id);
        }
        released
    }
    /// Release every live shape
    pub fn drain(&mut self) -> Vec<Shape> {
        self.ids.clear();
        for plane in self.layers.values_mut() {
            plane.buckets.clear();
        }
        self.shapes.drain().map(|(_, shape)| shape).collect()
    }
    /// Number of live shapes
    pub fn len(&self) -> usize {
        self.shapes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
