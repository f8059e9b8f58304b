//!
//! # Extraction Orchestrator
//!
//! [Extractor] selects the model corners to track, drives the [SpatialWindowEngine]
//! over a [HostDb], and reports per-wire and per-pair parasitics to a [ResultSink].
//!

// Std-Lib
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

// Crates.io
use derive_builder::Builder;
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Local imports
use crate::data::{HostDb, Parasitics, ResultSink, Shape, ShapeId, WireId};
use crate::error::{ExtractError, ExtractResult};
use crate::measure::{MeasurementContext, RcTotals};
use crate::geom::Span;
use crate::models::{CornerModel, RcModel, RuleOptions};
use crate::utils::SerdeFile;
use crate::window::{Cancel, CouplingPair, SpatialWindowEngine, WindowOptions, WindowStats, WindowVisitor};
use crate::Int;

///
/// # Extraction Options
///
#[derive(Debug, Clone, Default, Builder, Serialize, Deserialize, JsonSchema, PartialEq)]
#[builder(pattern = "owned", setter(into))]
pub struct ExtractOptions {
    /// Extraction rule file. Required by [Extractor::load].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub rules: Option<PathBuf>,
    #[serde(default)]
    #[builder(default)]
    pub rule_options: RuleOptions,
    #[serde(default)]
    #[builder(default)]
    pub window: WindowOptions,
    /// Density rates to extract, each mapped to its nearest corner.
    /// `None` extracts every corner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub rates: Option<Vec<f64>>,
    /// Multiplier for duplicate-tail resistances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub scale_resistance: Option<f64>,
}
impl SerdeFile for ExtractOptions {}

/// # Extraction Statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractStats {
    pub window: WindowStats,
    /// Tracked corner indices
    pub corners: Vec<usize>,
    /// Density rates of the tracked corners
    pub rates: Vec<f64>,
    /// Distinct wires extracted
    pub wires: usize,
    /// Pairs reported as coupling
    pub couplings: usize,
}

///
/// # Extractor
///
/// Holds an [RcModel] and the corners tracked from it.
/// Every reported value is a slice with one entry per tracked corner, in [Extractor::corners] order.
///
#[derive(Debug, Clone)]
pub struct Extractor {
    model: RcModel,
    options: ExtractOptions,
    corners: Vec<usize>,
}
impl Extractor {
    ///
    /// Create an [Extractor] from `model`.
    ///
    /// Tracks the nearest corner to each of `options.rates`, or every corner if unset,
    /// and applies `options.scale_resistance`.
    /// Fails with [ExtractError::NoModel] if no corner can be tracked.
    ///
    pub fn new(mut model: RcModel, options: ExtractOptions) -> ExtractResult<Self> {
        if model.corner_count() == 0 {
            return Err(ExtractError::NoModel("Model has no corners".into()));
        }
        let corners = match &options.rates {
            None => (0..model.corner_count()).collect::<Vec<_>>(),
            Some(rates) => {
                let mut corners = Vec::with_capacity(rates.len());
                for &rate in rates.iter() {
                    match model.nearest_corner_index(rate) {
                        Some(idx) => corners.push(idx),
                        None => return Err(ExtractError::NoModel(format!("No corner for density rate {}", rate))),
                    }
                }
                corners
            }
        };
        if corners.is_empty() {
            return Err(ExtractError::NoModel("No density rates requested".into()));
        }
        if let Some(multiplier) = options.scale_resistance {
            model.scale_resistance(multiplier);
        }
        debug!("Tracking corners {:?}", corners);
        Ok(Self {
            model,
            options,
            corners,
        })
    }
    /// Create an [Extractor] from the rule file named in `options`
    pub fn load(options: &ExtractOptions) -> ExtractResult<Self> {
        let path = match &options.rules {
            Some(p) => p,
            None => return Err(ExtractError::NoModel("No rule file".into())),
        };
        let model = RcModel::open_rules(path, &options.rule_options)?;
        model.log_missing();
        info!("Loaded {} corners from {:?}", model.corner_count(), path);
        Self::new(model, options.clone())
    }
    pub fn model(&self) -> &RcModel {
        &self.model
    }
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }
    /// Tracked corner indices
    pub fn corners(&self) -> &[usize] {
        &self.corners
    }
    /// Density rates of the tracked corners
    pub fn rates(&self) -> Vec<f64> {
        self.corners
            .iter()
            .filter_map(|&c| self.model.rates().get(c).copied())
            .collect()
    }
    /// Extract `host`, reporting to `sink`
    pub fn run<H, S>(&self, host: &H, sink: &mut S, cancel: Option<&Cancel>) -> ExtractResult<ExtractStats>
    where
        H: HostDb + ?Sized,
        S: ResultSink + ?Sized,
    {
        let corners: Vec<&CornerModel> = self.corners.iter().filter_map(|&c| self.model.corner(c)).collect();
        info!(
            "Extracting {} shapes at {} corners",
            host.shape_count(),
            corners.len()
        );
        let via_resistance = host
            .layers()
            .layers
            .iter()
            .map(|l| (l.index, l.via_resistance))
            .collect();
        let mut visitor = ExtractVisitor {
            corners,
            via_resistance,
            sink,
            sides: HashMap::new(),
            progress: Progress::new(host.shape_count()),
            wires: HashSet::new(),
            couplings: 0,
        };
        let mut engine = SpatialWindowEngine::new(self.options.window.clone());
        let window = engine.run(host, &mut visitor, cancel)?;
        info!(
            "Extracted {} wires, {} coupled pairs, in {} windows",
            visitor.wires.len(),
            visitor.couplings,
            window.windows
        );
        Ok(ExtractStats {
            window,
            corners: self.corners.clone(),
            rates: self.rates(),
            wires: visitor.wires.len(),
            couplings: visitor.couplings,
        })
    }
    /// Extract `host` into a new [Parasitics]
    pub fn extract<H: HostDb + ?Sized>(&self, host: &H) -> ExtractResult<Parasitics> {
        let mut parasitics = Parasitics::new(self.rates());
        self.run(host, &mut parasitics, None)?;
        Ok(parasitics)
    }
}

/// Progress reporting, every 5% of shapes
#[derive(Debug)]
struct Progress {
    total: usize,
    done: usize,
    next: usize,
}
impl Progress {
    fn new(total: usize) -> Self {
        Self {
            total,
            done: 0,
            next: 5,
        }
    }
    fn tick(&mut self) {
        self.done += 1;
        if self.total == 0 {
            return;
        }
        let pct = self.done * 100 / self.total;
        if pct >= self.next {
            info!("Extraction {}% ({} of {} shapes)", pct, self.done, self.total);
            self.next = (pct / 5 + 1) * 5;
        }
    }
}

/// Same-layer neighbor along one side of a wire
#[derive(Debug, Clone)]
struct Cover {
    /// Wire-axis overlap with the neighbor
    span: Span,
    separation: Int,
    /// Fringe per nm, per corner
    fringe: Vec<f64>,
}

/// Fringe along `span`, per corner.
/// Each point takes its nearest cover's fringe, or `isolated` where uncovered.
fn side_fringe(span: Span, covers: &[Cover], isolated: &[f64]) -> Vec<f64> {
    let mut edges = vec![span.lo, span.hi];
    for c in covers.iter() {
        edges.push(c.span.lo.max(span.lo).min(span.hi));
        edges.push(c.span.hi.max(span.lo).min(span.hi));
    }
    edges.sort_unstable();
    edges.dedup();
    let mut total = vec![0.0; isolated.len()];
    for seg in edges.windows(2) {
        let (lo, hi) = (seg[0], seg[1]);
        let nearest = covers
            .iter()
            .filter(|c| c.span.lo <= lo && c.span.hi >= hi)
            .min_by_key(|c| c.separation);
        let values = nearest.map_or(isolated, |c| c.fringe.as_slice());
        let len = (hi - lo) as f64;
        for (t, v) in total.iter_mut().zip(values.iter()) {
            *t += len * v;
        }
    }
    total
}

///
/// Window visitor converting shapes and pairs to parasitics.
///
/// Resistance is reported as each shape is visited.
/// Ground waits for each wire's release, when all of its neighbors are known.
///
struct ExtractVisitor<'a, S: ResultSink + ?Sized> {
    corners: Vec<&'a CornerModel>,
    /// Per-cut via resistance, by lower layer
    via_resistance: HashMap<usize, f64>,
    sink: &'a mut S,
    /// Neighbor covers of each live wire, low side then high side
    sides: HashMap<ShapeId, [Vec<Cover>; 2]>,
    progress: Progress,
    wires: HashSet<WireId>,
    couplings: usize,
}
impl<'a, S: ResultSink + ?Sized> ExtractVisitor<'a, S> {
    /// Measure `ctx` over `length` at every tracked corner
    fn measure(&self, mut ctx: MeasurementContext, length: Int) -> Vec<RcTotals> {
        ctx.measure(self.corners.iter().copied(), length);
        ctx.totals().to_vec()
    }
    fn context(&self, met: usize, shape: &Shape) -> MeasurementContext {
        MeasurementContext::new(met, shape.width(), self.corners.len())
    }
    fn couple(&mut self, a: WireId, b: WireId, values: Vec<f64>) {
        if values.iter().any(|v| *v != 0.0) {
            self.sink.add_coupling(a, b, &values);
            self.couplings += 1;
        }
    }
    /// Record `other` as a neighbor of wire `shape`
    fn cover(&mut self, shape: &Shape, other: &Shape, separation: Int, fringe: Vec<f64>) {
        let (mine, theirs) = (shape.sweep_span(), other.sweep_span());
        let side = (theirs.lo + theirs.hi >= mine.lo + mine.hi) as usize;
        let (wa, wb) = (shape.wire_span(), other.wire_span());
        if let Some(sides) = self.sides.get_mut(&shape.id) {
            sides[side].push(Cover {
                span: Span::new(wa.lo.max(wb.lo), wa.hi.min(wb.hi)),
                separation,
                fringe,
            });
        }
    }
    /// Same-layer neighbors: per-side fringe, and coupling unless on the same net
    fn visit_neighbors(&mut self, pair: &CouplingPair) {
        let (a, b) = (pair.a, pair.b);
        let same_net = pair.is_same_net();
        let sep = pair.separation();
        let under = a.layer.saturating_sub(1);
        let mut couplings: Vec<Vec<f64>> = Vec::with_capacity(2);
        for &(shape, other) in [(a, b), (b, a)].iter() {
            if shape.is_via() {
                continue;
            }
            let ctx = self
                .context(shape.layer, shape)
                .under(under)
                .separation(sep)
                .same_net(same_net);
            let per_nm = self.measure(ctx, 1);
            self.cover(shape, other, sep, per_nm.iter().map(|t| t.fringe).collect());
            couplings.push(per_nm.iter().map(|t| t.coupling).collect());
        }
        if same_net || couplings.is_empty() {
            return;
        }
        let scale = pair.overlap as f64 / couplings.len() as f64;
        let cc = (0..self.corners.len())
            .map(|i| scale * couplings.iter().filter_map(|c| c.get(i)).sum::<f64>())
            .collect();
        self.couple(a.wire, b.wire, cc);
    }
}
impl<'a, S: ResultSink + ?Sized> WindowVisitor for ExtractVisitor<'a, S> {
    /// Resistance of each wire over its length, and of each via cut
    fn visit_shape(&mut self, shape: &Shape) -> ExtractResult<()> {
        let res: Vec<f64> = if shape.is_via() {
            let cut = self.via_resistance.get(&shape.layer).copied().unwrap_or(0.0);
            vec![cut; self.corners.len()]
        } else {
            self.sides.insert(shape.id, Default::default());
            let ctx = self.context(shape.layer, shape).under(0);
            self.measure(ctx, shape.length()).iter().map(|t| t.resistance).collect()
        };
        self.sink.add_resistance(shape.wire, &res);
        self.wires.insert(shape.wire);
        self.progress.tick();
        Ok(())
    }
    ///
    /// Same-layer neighbors couple at their separation, averaged over both wires' widths.
    /// Adjacent-layer wires couple diagonally when offset,
    /// and through the lower wire's Under plate value when stacked.
    ///
    fn visit_pair(&mut self, pair: &CouplingPair) -> ExtractResult<()> {
        if pair.is_same_layer() {
            if !(pair.a.is_via() && pair.b.is_via()) {
                self.visit_neighbors(pair);
            }
            return Ok(());
        }
        if pair.is_same_net() || pair.a.is_via() || pair.b.is_via() {
            return Ok(());
        }
        let (lower, upper) = pair.by_layer();
        let values: Vec<f64> = if pair.gap > 0 {
            let ctx = self
                .context(lower.layer, lower)
                .over(upper.layer)
                .diag(upper.width(), pair.gap);
            self.measure(ctx, pair.overlap)
                .iter()
                .map(|t| t.coupling + t.diagonal)
                .collect()
        } else {
            let ctx = self.context(lower.layer, lower).over(upper.layer);
            self.measure(ctx, pair.overlap).iter().map(|t| t.fringe).collect()
        };
        self.couple(lower.wire, upper.wire, values);
        Ok(())
    }
    ///
    /// Ground of a released wire, over both of its sides.
    /// The model's fringe covers both sides, so each contributes half.
    ///
    fn release_shape(&mut self, shape: &Shape) -> ExtractResult<()> {
        if shape.is_via() {
            return Ok(());
        }
        let sides = match self.sides.remove(&shape.id) {
            Some(s) => s,
            None => return Ok(()),
        };
        let ctx = self.context(shape.layer, shape).under(0);
        let isolated: Vec<f64> = self.measure(ctx, 1).iter().map(|t| t.fringe).collect();
        let span = shape.wire_span();
        let mut ground = vec![0.0; isolated.len()];
        for covers in sides.iter() {
            for (g, f) in ground.iter_mut().zip(side_fringe(span, covers, &isolated)) {
                *g += 0.5 * f;
            }
        }
        self.sink.add_ground(shape.wire, &ground);
        Ok(())
    }
}
