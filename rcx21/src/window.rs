//!
//! # Spatial Window Engine
//!
//! Sweeps the die in windows along each direction, keeping only nearby shapes live,
//! and reports every shape and every coupled shape pair exactly once.
//! Vias are live in both passes.
//!
//! The engine is a state machine:
//! `Init -> {Fill -> Process -> Advance}* -> Done`,
//! running a pass over horizontal wires, then one over vertical wires.
//!

// Std-Lib
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Crates.io
use derive_builder::Builder;
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Local imports
use crate::data::{HostDb, Shape, ShapeId};
use crate::error::{ExtractError, ExtractResult};
use crate::geom::{Dir, Rect};
use crate::plane::{BucketPlanes, ShapeKey};
use crate::utils::SerdeFile;
use crate::Int;

/// Default coupling reach, in tracks
pub const DEFAULT_COUPLING_DISTANCE: usize = 4;
/// Default window step, in tracks
pub const DEFAULT_STEP_TRACKS: usize = 1000;
/// Wire directions, in pass order
pub const PASSES: [Dir; 2] = [Dir::Horiz, Dir::Vert];

///
/// # Window Options
///
/// Both distances are in tracks of the stack's largest pitch.
///
#[derive(Debug, Clone, Builder, Serialize, Deserialize, JsonSchema, PartialEq)]
#[builder(pattern = "owned", setter(into))]
pub struct WindowOptions {
    /// Largest sweep-axis gap between coupled shapes
    #[serde(default = "default_coupling_distance")]
    #[builder(default = "DEFAULT_COUPLING_DISTANCE")]
    pub coupling_distance: usize,
    /// Window advance per step
    #[serde(default = "default_step_tracks")]
    #[builder(default = "DEFAULT_STEP_TRACKS")]
    pub step_tracks: usize,
}
fn default_coupling_distance() -> usize {
    DEFAULT_COUPLING_DISTANCE
}
fn default_step_tracks() -> usize {
    DEFAULT_STEP_TRACKS
}
impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            coupling_distance: DEFAULT_COUPLING_DISTANCE,
            step_tracks: DEFAULT_STEP_TRACKS,
        }
    }
}
impl SerdeFile for WindowOptions {}

///
/// # Cancellation Flag
///
/// Shared between the caller and a running extraction.
/// Checked once per window.
///
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);
impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }
    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// # Engine States
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Init,
    Fill,
    Process,
    Advance,
    Done,
}

/// # Window Statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStats {
    /// Windows filled, across both passes
    pub windows: usize,
    /// Shapes visited
    pub shapes: usize,
    /// Coupled pairs reported
    pub pairs: usize,
    /// Largest number of simultaneously live shapes
    pub peak_live: usize,
}

///
/// # Coupled Shape Pair
///
/// Shapes on the same or adjacent layers, running in the same direction,
/// within coupling reach of one another. `a` has the lower [ShapeId].
///
#[derive(Debug, Clone, Copy)]
pub struct CouplingPair<'p> {
    pub a: &'p Shape,
    pub b: &'p Shape,
    /// Sweep-axis gap. Non-positive for stacked shapes.
    pub gap: Int,
    /// Wire-axis overlap, always positive
    pub overlap: Int,
}
impl<'p> CouplingPair<'p> {
    /// Sweep-axis separation, clamped to zero
    pub fn separation(&self) -> Int {
        self.gap.max(0)
    }
    pub fn is_same_layer(&self) -> bool {
        self.a.layer == self.b.layer
    }
    pub fn is_same_net(&self) -> bool {
        self.a.net == self.b.net
    }
    /// The (lower, upper) layer shapes
    pub fn by_layer(&self) -> (&'p Shape, &'p Shape) {
        if self.a.layer <= self.b.layer {
            (self.a, self.b)
        } else {
            (self.b, self.a)
        }
    }
}

///
/// # Window Visitor
///
/// Receives each shape and each coupled pair, once per run.
/// Each shape is released once its pairs have all been visited:
/// once per run for wires, once per pass for vias.
///
pub trait WindowVisitor {
    fn visit_shape(&mut self, _shape: &Shape) -> ExtractResult<()> {
        Ok(())
    }
    fn visit_pair(&mut self, pair: &CouplingPair) -> ExtractResult<()>;
    fn release_shape(&mut self, _shape: &Shape) -> ExtractResult<()> {
        Ok(())
    }
}

///
/// # Spatial Window Engine
///
#[derive(Debug)]
pub struct SpatialWindowEngine {
    options: WindowOptions,
    state: WindowState,
    /// Usable layer indices
    layers: Vec<usize>,
    reach: Int,
    trailing_margin: Int,
    step: Int,
    /// Index into [PASSES]
    pass: usize,
    dir: Dir,
    die: Rect,
    low: Int,
    hi: Int,
    planes: BucketPlanes,
    /// Shapes inserted by the latest fill
    fresh: Vec<ShapeKey>,
    /// Reported pairs among live shapes, lower id first
    processed: HashSet<(ShapeId, ShapeId)>,
    stats: WindowStats,
}
impl SpatialWindowEngine {
    pub fn new(options: WindowOptions) -> Self {
        Self {
            options,
            state: WindowState::Init,
            layers: Vec::new(),
            reach: 0,
            trailing_margin: 0,
            step: 1,
            pass: 0,
            dir: PASSES[0],
            die: Rect::default(),
            low: 0,
            hi: 0,
            planes: BucketPlanes::default(),
            fresh: Vec::new(),
            processed: HashSet::new(),
            stats: WindowStats::default(),
        }
    }
    pub fn state(&self) -> WindowState {
        self.state
    }
    pub fn stats(&self) -> &WindowStats {
        &self.stats
    }
    /// Coupling reach, nm. Set during `Init`.
    pub fn reach(&self) -> Int {
        self.reach
    }
    /// Current window, `[low, hi)` along the sweep axis
    pub fn window(&self) -> (Int, Int) {
        (self.low, self.hi)
    }
    /// Number of live shapes
    pub fn live(&self) -> usize {
        self.planes.len()
    }
    /// Run both passes over `host`, from the start
    pub fn run<H, V>(&mut self, host: &H, visitor: &mut V, cancel: Option<&Cancel>) -> ExtractResult<WindowStats>
    where
        H: HostDb + ?Sized,
        V: WindowVisitor + ?Sized,
    {
        self.state = WindowState::Init;
        self.stats = WindowStats::default();
        while self.state != WindowState::Done {
            self.step(host, visitor, cancel)?;
        }
        Ok(self.stats.clone())
    }
    /// Perform the current state's work, and move to the next state, which is returned
    pub fn step<H, V>(&mut self, host: &H, visitor: &mut V, cancel: Option<&Cancel>) -> ExtractResult<WindowState>
    where
        H: HostDb + ?Sized,
        V: WindowVisitor + ?Sized,
    {
        self.state = match self.state {
            WindowState::Init => self.init(host)?,
            WindowState::Fill => self.fill(host, visitor)?,
            WindowState::Process => self.process(visitor)?,
            WindowState::Advance => self.advance(visitor, cancel)?,
            WindowState::Done => WindowState::Done,
        };
        Ok(self.state)
    }
    fn init<H: HostDb + ?Sized>(&mut self, host: &H) -> ExtractResult<WindowState> {
        let usable = host.layers().usable();
        let max_pitch = match usable.iter().map(|l| l.pitch).max() {
            Some(p) => p,
            None => {
                warn!("No usable routing layers");
                return Ok(WindowState::Done);
            }
        };
        self.layers = usable.iter().map(|l| l.index).collect();
        let cd = self.options.coupling_distance as Int;
        self.reach = cd * max_pitch;
        self.trailing_margin = (cd + 2) * max_pitch;
        self.step = (self.options.step_tracks as Int * max_pitch).max(1);
        self.die = host.die();
        debug!(
            "Window engine: {} layers, reach {}, margin {}, step {}",
            self.layers.len(),
            self.reach,
            self.trailing_margin,
            self.step
        );
        self.begin_pass(0);
        Ok(WindowState::Fill)
    }
    /// Reset the planes and frontiers for pass `pass`
    fn begin_pass(&mut self, pass: usize) {
        self.pass = pass;
        self.dir = PASSES[pass % PASSES.len()];
        self.planes = BucketPlanes::new(self.layers.iter().copied());
        self.fresh.clear();
        self.processed.clear();
        self.low = self.die.lo(!self.dir);
        self.hi = self.window_end(self.low);
        debug!("Starting {:?} pass at {}", self.dir, self.low);
    }
    /// End of the window starting at `low`.
    /// The last window reaches one past the die edge, so shapes on the edge are included.
    fn window_end(&self, low: Int) -> Int {
        let die_hi = self.die.hi(!self.dir);
        let hi = low.saturating_add(self.step);
        if hi > die_hi {
            die_hi + 1
        } else {
            hi
        }
    }
    fn fill<H, V>(&mut self, host: &H, visitor: &mut V) -> ExtractResult<WindowState>
    where
        H: HostDb + ?Sized,
        V: WindowVisitor + ?Sized,
    {
        for shape in host.shapes(self.dir, self.low, self.hi) {
            let shape = if shape.is_via() {
                shape.oriented(self.dir)
            } else if shape.dir == self.dir {
                shape
            } else {
                continue;
            };
            if let Some(key) = self.planes.insert(shape) {
                if !shape.is_via() || self.pass == 0 {
                    visitor.visit_shape(&shape)?;
                    self.stats.shapes += 1;
                }
                self.fresh.push(key);
            }
        }
        self.stats.windows += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.planes.len());
        Ok(WindowState::Process)
    }
    fn process<V: WindowVisitor + ?Sized>(&mut self, visitor: &mut V) -> ExtractResult<WindowState> {
        let fresh = std::mem::take(&mut self.fresh);
        for key in fresh {
            let shape = match self.planes.get(key) {
                Some(s) => *s,
                None => continue,
            };
            let sweep = shape.sweep_span();
            let wire = shape.wire_span();
            for layer in shape.layer.saturating_sub(1)..=shape.layer + 1 {
                for other_key in self.planes.query(layer, sweep.lo - self.reach, sweep.hi + self.reach) {
                    if other_key == key {
                        continue;
                    }
                    let other = match self.planes.get(other_key) {
                        Some(s) => *s,
                        None => continue,
                    };
                    if other.wire == shape.wire {
                        continue;
                    }
                    // Via pairs are found in both passes
                    if self.pass > 0 && shape.is_via() && other.is_via() {
                        continue;
                    }
                    let gap = sweep.gap(&other.sweep_span());
                    let overlap = wire.overlap(&other.wire_span());
                    if gap > self.reach || overlap <= 0 {
                        continue;
                    }
                    let (a, b) = if shape.id < other.id {
                        (shape, other)
                    } else {
                        (other, shape)
                    };
                    if !self.processed.insert((a.id, b.id)) {
                        continue;
                    }
                    visitor.visit_pair(&CouplingPair {
                        a: &a,
                        b: &b,
                        gap,
                        overlap,
                    })?;
                    self.stats.pairs += 1;
                }
            }
        }
        Ok(WindowState::Advance)
    }
    fn advance<V: WindowVisitor + ?Sized>(
        &mut self,
        visitor: &mut V,
        cancel: Option<&Cancel>,
    ) -> ExtractResult<WindowState> {
        if cancel.map_or(false, |c| c.is_cancelled()) {
            info!("Extraction cancelled at {:?} window {}", self.dir, self.low);
            return Err(ExtractError::Cancelled);
        }
        if self.hi > self.die.hi(!self.dir) {
            // Past the die edge. Release everything, then flip direction or finish.
            for shape in self.planes.drain() {
                visitor.release_shape(&shape)?;
            }
            if self.pass + 1 < PASSES.len() {
                self.begin_pass(self.pass + 1);
                return Ok(WindowState::Fill);
            }
            self.planes = BucketPlanes::default();
            self.processed.clear();
            return Ok(WindowState::Done);
        }
        self.low = self.hi;
        self.hi = self.window_end(self.low);
        let released = self.planes.release_before(self.low - self.trailing_margin);
        for shape in released.iter() {
            visitor.release_shape(shape)?;
        }
        if !released.is_empty() {
            let planes = &self.planes;
            self.processed.retain(|(a, b)| planes.contains(*a) && planes.contains(*b));
        }
        Ok(WindowState::Fill)
    }
}
