//!
//! # Extraction Data Model
//!
//! [Shape]s and their identifiers, the [HostDb] and [ResultSink] collaborator traits,
//! and their in-memory implementations [Design] and [Parasitics].
//!

// Std-Lib
use std::collections::BTreeMap;

// Crates.io
use derive_more::{Display, From};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Local imports
use crate::geom::{Dir, Rect, Span};
use crate::stack::LayerStack;
use crate::utils::SerdeFile;
use crate::Int;

/// # Shape Identifier
/// Unique per shape within a design.
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct ShapeId(pub usize);

/// # Wire Identifier
/// Parasitics are reported per wire. A wire may comprise several shapes.
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct WireId(pub usize);

/// # Net Identifier
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct NetId(pub usize);

/// # Shape Kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ShapeKind {
    /// Routed wire segment
    Wire,
    /// Single via cut, from `layer` up to the next
    Via,
}
impl Default for ShapeKind {
    fn default() -> Self {
        Self::Wire
    }
}

///
/// # Shape
///
/// Axis-aligned rectangle of a routed wire or via, running along `dir`.
/// Its "wire axis" is `dir`; its "sweep axis" is the perpendicular,
/// along which the window engine advances.
/// Vias have no direction of their own, and are oriented to each pass in turn.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Shape {
    pub id: ShapeId,
    pub wire: WireId,
    pub net: NetId,
    /// Layer index. The lower layer, for vias.
    pub layer: usize,
    pub dir: Dir,
    #[serde(default)]
    pub kind: ShapeKind,
    pub rect: Rect,
}
impl Shape {
    pub fn is_via(&self) -> bool {
        self.kind == ShapeKind::Via
    }
    /// This shape, running along `dir`
    pub fn oriented(&self, dir: Dir) -> Self {
        Self { dir, ..*self }
    }
    /// Extent along the sweep axis
    pub fn sweep_span(&self) -> Span {
        Span::new(self.rect.lo(!self.dir), self.rect.hi(!self.dir))
    }
    /// Extent along the wire axis
    pub fn wire_span(&self) -> Span {
        Span::new(self.rect.lo(self.dir), self.rect.hi(self.dir))
    }
    /// Wire width, across its direction
    pub fn width(&self) -> Int {
        self.rect.size(!self.dir)
    }
    /// Wire length, along its direction
    pub fn length(&self) -> Int {
        self.rect.size(self.dir)
    }
}

///
/// # Host Database
///
/// Source of the layer stack and shapes to be extracted.
///
pub trait HostDb {
    /// Layer stack
    fn layers(&self) -> &LayerStack;
    /// Die area. All shapes lie within it.
    fn die(&self) -> Rect;
    /// Shapes running along `dir`, and vias, whose low sweep-axis edge lies in `[lo, hi)`.
    /// Vias may be returned in any orientation.
    fn shapes(&self, dir: Dir, lo: Int, hi: Int) -> Vec<Shape>;
    /// Total number of shapes, all directions
    fn shape_count(&self) -> usize;
}

///
/// # Result Sink
///
/// Receiver of extracted parasitics, one value per tracked corner.
/// Each call adds to any value previously reported for the same wire or pair.
///
pub trait ResultSink {
    fn add_resistance(&mut self, wire: WireId, values: &[f64]);
    fn add_ground(&mut self, wire: WireId, values: &[f64]);
    fn add_coupling(&mut self, a: WireId, b: WireId, values: &[f64]);
}

///
/// # In-Memory Design
///
/// Linear-scan [HostDb] implementation, suitable for tests and snapshots.
///
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Design {
    pub name: String,
    pub stack: LayerStack,
    /// Die area. Defaults to the bounding box of all shapes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub die: Option<Rect>,
    pub shapes: Vec<Shape>,
}
impl Design {
    pub fn new(name: impl Into<String>, stack: LayerStack) -> Self {
        Self {
            name: name.into(),
            stack,
            ..Default::default()
        }
    }
    /// Add a wire shape, assigning its [ShapeId]
    pub fn add_wire(
        &mut self,
        wire: impl Into<WireId>,
        net: impl Into<NetId>,
        layer: usize,
        dir: Dir,
        rect: Rect,
    ) -> ShapeId {
        let id = ShapeId(self.shapes.len());
        self.shapes.push(Shape {
            id,
            wire: wire.into(),
            net: net.into(),
            layer,
            dir,
            kind: ShapeKind::Wire,
            rect,
        });
        id
    }
    /// Add a via cut from `layer` to the layer above, assigning its [ShapeId]
    pub fn add_via(&mut self, wire: impl Into<WireId>, net: impl Into<NetId>, layer: usize, rect: Rect) -> ShapeId {
        let id = ShapeId(self.shapes.len());
        self.shapes.push(Shape {
            id,
            wire: wire.into(),
            net: net.into(),
            layer,
            dir: Dir::Horiz,
            kind: ShapeKind::Via,
            rect,
        });
        id
    }
    /// Bounding box of all shapes. Zero-sized at the origin if there are none.
    pub fn bbox(&self) -> Rect {
        let mut shapes = self.shapes.iter();
        match shapes.next() {
            Some(first) => shapes.fold(first.rect, |bbox, s| bbox.union(&s.rect)),
            None => Rect::default(),
        }
    }
}
impl HostDb for Design {
    fn layers(&self) -> &LayerStack {
        &self.stack
    }
    fn die(&self) -> Rect {
        self.die.unwrap_or_else(|| self.bbox())
    }
    fn shapes(&self, dir: Dir, lo: Int, hi: Int) -> Vec<Shape> {
        self.shapes
            .iter()
            .filter(|s| s.is_via() || s.dir == dir)
            .map(|s| s.oriented(dir))
            .filter(|s| {
                let edge = s.sweep_span().lo;
                edge >= lo && edge < hi
            })
            .collect()
    }
    fn shape_count(&self) -> usize {
        self.shapes.len()
    }
}
impl SerdeFile for Design {}

///
/// # Extracted Parasitics
///
/// In-memory [ResultSink]. Coupling is keyed by the ordered wire pair, lower [WireId] first.
/// Snapshots are JSON or YAML. TOML tables cannot be keyed by [WireId].
///
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Parasitics {
    /// Density rate of each tracked corner
    pub rates: Vec<f64>,
    pub resistance: BTreeMap<WireId, Vec<f64>>,
    pub ground: BTreeMap<WireId, Vec<f64>>,
    pub coupling: BTreeMap<WireId, BTreeMap<WireId, Vec<f64>>>,
}
impl Parasitics {
    pub fn new(rates: Vec<f64>) -> Self {
        Self {
            rates,
            ..Default::default()
        }
    }
    pub fn resistance(&self, wire: WireId) -> Option<&[f64]> {
        self.resistance.get(&wire).map(|v| v.as_slice())
    }
    pub fn ground(&self, wire: WireId) -> Option<&[f64]> {
        self.ground.get(&wire).map(|v| v.as_slice())
    }
    /// Coupling between `a` and `b`, in either order
    pub fn coupling(&self, a: WireId, b: WireId) -> Option<&[f64]> {
        let (a, b) = ordered(a, b);
        self.coupling.get(&a)?.get(&b).map(|v| v.as_slice())
    }
    /// Number of coupled wire pairs
    pub fn coupling_count(&self) -> usize {
        self.coupling.values().map(|m| m.len()).sum()
    }
    /// Sum of all coupling to `wire`
    pub fn total_coupling(&self, wire: WireId) -> Vec<f64> {
        let mut total = vec![0.0; self.rates.len()];
        for (a, others) in self.coupling.iter() {
            for (b, vals) in others.iter() {
                if *a == wire || *b == wire {
                    add_into(&mut total, vals);
                }
            }
        }
        total
    }
}
impl ResultSink for Parasitics {
    fn add_resistance(&mut self, wire: WireId, values: &[f64]) {
        add_into(self.resistance.entry(wire).or_default(), values);
    }
    fn add_ground(&mut self, wire: WireId, values: &[f64]) {
        add_into(self.ground.entry(wire).or_default(), values);
    }
    fn add_coupling(&mut self, a: WireId, b: WireId, values: &[f64]) {
        let (a, b) = ordered(a, b);
        let dest = self.coupling.entry(a).or_default().entry(b).or_default();
        add_into(dest, values);
    }
}
impl SerdeFile for Parasitics {}

fn ordered(a: WireId, b: WireId) -> (WireId, WireId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
/// Element-wise add `values` into `dest`, growing it as needed
fn add_into(dest: &mut Vec<f64>, values: &[f64]) {
    if dest.len() < values.len() {
        dest.resize(values.len(), 0.0);
    }
    for (d, v) in dest.iter_mut().zip(values.iter()) {
        *d += v;
    }
}
