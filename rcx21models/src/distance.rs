//!
//! # Distance Tables
//!
//! Separation-indexed capacitance and resistance samples for a single
//! (layer, relationship, width) combination, and their densified form.
//!

// Crates.io
use serde::{Deserialize, Serialize};

/// Coordinate and length type, in nanometers
pub type Int = isize;

/// Separation encoding "near-infinite" spacing
pub const NEAR_INFINITE_SEPARATION: Int = 99_000;
/// Separation encoding "infinite" spacing
pub const INFINITE_SEPARATION: Int = 100_000;
/// Default dense-table step, in nanometers
pub const DEFAULT_DIST_UNIT: Int = 4;
/// Default bucket-map quantization step, in nanometers
pub const DEFAULT_MODULO: Int = 4;

/// Resistances closer than this are considered equal
const RES_EPSILON: f64 = 1e-6;

/// # Distance Sample
///
/// Characterized per-unit-length values at one separation.
///
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceSample {
    /// Edge-to-edge separation, nm
    pub separation: Int,
    /// Coupling capacitance to the neighbor
    pub coupling: f64,
    /// Fringe (ground) capacitance
    pub fringe: f64,
    /// Diagonal coupling capacitance
    pub diagonal: f64,
    /// Resistance
    pub resistance: f64,
}
impl DistanceSample {
    /// Create a new [DistanceSample] with zero diagonal component
    pub fn new(separation: Int, coupling: f64, fringe: f64, resistance: f64) -> Self {
        Self {
            separation,
            coupling,
            fringe,
            diagonal: 0.0,
            resistance,
        }
    }
    /// Set the diagonal component
    pub fn with_diagonal(mut self, diagonal: f64) -> Self {
        self.diagonal = diagonal;
        self
    }
    /// Total capacitance: coupling, fringe and diagonal
    pub fn total(&self) -> f64 {
        self.coupling + self.fringe + self.diagonal
    }
    /// Sample at separation `d` on the line through `lo` and `hi`.
    /// Extrapolates for `d` outside `[lo, hi]`.
    /// Equal-separation endpoints yield a copy of `hi`.
    pub fn interpolate(d: Int, lo: &Self, hi: &Self) -> Self {
        if lo.separation == hi.separation {
            return Self {
                separation: d,
                ..*hi
            };
        }
        let line = |y1: f64, y2: f64| line_segment(d, lo.separation, hi.separation, y1, y2);
        Self {
            separation: d,
            coupling: line(lo.coupling, hi.coupling),
            fringe: line(lo.fringe, hi.fringe),
            diagonal: line(lo.diagonal, hi.diagonal),
            resistance: line(lo.resistance, hi.resistance),
        }
    }
    /// Boolean indication of an "open spacing" sentinel separation
    pub fn is_sentinel(&self) -> bool {
        self.separation == NEAR_INFINITE_SEPARATION || self.separation == INFINITE_SEPARATION
    }
}

/// Value at `x` of the line through `(x1, y1)` and `(x2, y2)`
fn line_segment(x: Int, x1: Int, x2: Int, y1: f64, y2: f64) -> f64 {
    let slope = (y2 - y1) / (x2 - x1) as f64;
    y2 - slope * (x2 - x) as f64
}

///
/// # Distance Table
///
/// Owns the `measured` samples, ordered by separation,
/// and a dense table with uniform separation step built by [DistanceTable::densify].
///
/// The dense table is stored compactly: values are materialized through the
/// last interpolated position, plus a single tail slot for open-spacing tables.
/// Its logical length is reported by [DistanceTable::dense_len].
///
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DistanceTable {
    measured: Vec<DistanceSample>,
    #[serde(skip)]
    dense: Dense,
}

/// Densified lookup state
#[derive(Debug, Default, Clone)]
struct Dense {
    /// Separation step. Zero until densified.
    unit: Int,
    /// Maximum distance requested at densification
    span: Option<Int>,
    /// Logical length
    len: usize,
    /// Materialized values, indexed by `separation / unit`
    values: Vec<DistanceSample>,
    /// Value of the final logical slot, for open-spacing tables
    tail: Option<DistanceSample>,
}

impl DistanceTable {
    /// Create a new, empty [DistanceTable]
    pub fn new() -> Self {
        Self::default()
    }
    /// Create from a list of `measured` samples
    pub fn from_measured(measured: impl Into<Vec<DistanceSample>>) -> Self {
        Self {
            measured: measured.into(),
            dense: Dense::default(),
        }
    }
    /// Append a measured sample.
    /// Callers are responsible for non-decreasing separation order.
    pub fn add_measured(&mut self, sample: DistanceSample) {
        self.measured.push(sample);
    }
    /// Measured samples, as read or characterized
    pub fn measured(&self) -> &[DistanceSample] {
        &self.measured
    }
    pub fn len(&self) -> usize {
        self.measured.len()
    }
    pub fn is_empty(&self) -> bool {
        self.measured.is_empty()
    }
    /// The last measured sample: the isolated-wire values for open-spacing tables
    pub fn last(&self) -> Option<DistanceSample> {
        self.measured.last().copied()
    }
    /// Boolean indication of whether [DistanceTable::densify] has been run
    pub fn is_dense(&self) -> bool {
        self.dense.unit > 0
    }
    /// Logical length of the dense table
    pub fn dense_len(&self) -> usize {
        self.dense.len
    }
    /// Dense-table step, if densified
    pub fn dist_unit(&self) -> Option<Int> {
        match self.dense.unit {
            0 => None,
            u => Some(u),
        }
    }
    /// Number of samples preceding an open-spacing tail.
    /// Returns `None` unless the table ends in [INFINITE_SEPARATION]
    /// with at least one finite sample before it.
    fn finite_count(&self) -> Option<usize> {
        let cnt = self.measured.len();
        if cnt < 2 || self.measured[cnt - 1].separation != INFINITE_SEPARATION {
            return None;
        }
        if cnt >= 3 && self.measured[cnt - 2].separation == NEAR_INFINITE_SEPARATION {
            return Some(cnt - 2);
        }
        Some(cnt - 1)
    }
    ///
    /// Build the dense table, with step `dist_unit`, through `max_distance`.
    /// A `max_distance` of `None` spans through the last measured separation.
    /// Returns the logical length, `ceil(span / dist_unit) + 1`.
    ///
    /// Positions through the first measured separation copy the first sample.
    /// Positions between consecutive samples are linearly interpolated.
    /// For open-spacing tables without an explicit `max_distance`,
    /// interpolation stops at the last finite sample,
    /// and the final slot holds the first sentinel sample with its diagonal cleared.
    ///
    pub fn densify(&mut self, dist_unit: Int, max_distance: Option<Int>) -> usize {
        let unit = dist_unit.max(1);
        self.dense = Dense {
            unit,
            span: max_distance,
            ..Dense::default()
        };
        let cnt = self.measured.len();
        if cnt == 0 {
            return 0;
        }
        let last = self.measured[cnt - 1];
        let span = max_distance.unwrap_or(last.separation).max(0);
        let len = ((span + unit - 1) / unit) as usize + 1;

        let (finite, tail) = match (max_distance, self.finite_count()) {
            (None, Some(n)) => (
                n,
                Some(DistanceSample {
                    diagonal: 0.0,
                    ..self.measured[n]
                }),
            ),
            _ => (cnt, None),
        };
        let limit = match tail {
            Some(_) => self.measured[finite - 1].separation.min(span),
            None => span,
        };

        let mut values: Vec<DistanceSample> = Vec::new();
        let mut set = |d: Int, sample: DistanceSample| {
            let idx = (d / unit) as usize;
            if idx >= len {
                return;
            }
            if idx >= values.len() {
                values.resize(idx + 1, DistanceSample::default());
            }
            values[idx] = sample;
        };

        // Flat extrapolation below the first sample
        let first = self.measured[0];
        let mut d = 0;
        while d <= first.separation && d <= limit {
            set(
                d,
                DistanceSample {
                    separation: d,
                    ..first
                },
            );
            d += unit;
        }
        // Interpolation between each bracketing pair
        for pair in self.measured[..finite].windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if hi.separation <= lo.separation {
                continue;
            }
            let mut d = lo.separation;
            while d <= hi.separation && d <= limit {
                set(d, DistanceSample::interpolate(d, lo, hi));
                d += unit;
            }
        }

        self.dense.values = values;
        self.dense.len = len;
        self.dense.tail = tail;
        len
    }
    /// Dense-table value at index `idx`
    pub fn dense_at(&self, idx: usize) -> Option<DistanceSample> {
        if let Some(v) = self.dense.values.get(idx) {
            return Some(*v);
        }
        match self.dense.tail {
            Some(tail) if idx + 1 == self.dense.len => Some(tail),
            _ => None,
        }
    }
    ///
    /// Look up the sample for `separation`.
    ///
    /// Returns an owned copy. `None` indicates no data, and is treated by callers as no contribution.
    ///
    /// * Separations at or below the first sample return the first sample.
    /// * For open-spacing tables, the last finite sample is returned on exact match,
    ///   a synthetic sample with `1/separation` coupling decay up to twice its separation,
    ///   and the final sentinel sample beyond that.
    /// * Separations within one step of the last sample of other tables return the last sample.
    /// * All others index the dense table.
    ///
    pub fn lookup(&self, separation: Int) -> Option<DistanceSample> {
        let first = self.measured.first()?;
        if separation <= first.separation {
            return Some(*first);
        }
        let last = self.measured[self.measured.len() - 1];
        if let Some(n) = self.finite_count() {
            if separation == NEAR_INFINITE_SEPARATION && n + 1 < self.measured.len() {
                return Some(self.measured[n]);
            }
            let tail = self.measured[n - 1];
            if separation == tail.separation {
                return Some(tail);
            }
            if separation > tail.separation {
                if separation <= 2 * tail.separation {
                    return Some(self.asymptote(separation, n));
                }
                return Some(last);
            }
        } else if last.separation > 0 && separation >= last.separation - self.dense.unit {
            return Some(last);
        }
        if self.dense.unit <= 0 {
            return None;
        }
        self.dense_at((separation / self.dense.unit) as usize)
    }
    /// Synthetic sample beyond the last of `n` finite samples.
    /// Starts from a zeroed sample; coupling decays as `1/separation`, fringe holds flat,
    /// resistance and diagonal extrapolate along the last two finite samples.
    ///
    /// OpenRCX instead extrapolates from the last finite sample and the open-spacing row when
    /// the latter is present, carrying the open row's zeroes into the slope.
    fn asymptote(&self, separation: Int, n: usize) -> DistanceSample {
        let tail = self.measured[n - 1];
        let mut rc = DistanceSample {
            separation,
            ..DistanceSample::default()
        };
        if n >= 2 {
            let ex = DistanceSample::interpolate(separation, &self.measured[n - 2], &tail);
            rc.resistance = ex.resistance;
            rc.diagonal = ex.diagonal;
        } else {
            rc.resistance = tail.resistance;
            rc.diagonal = tail.diagonal;
        }
        rc.coupling = tail.coupling * tail.separation as f64 / separation as f64;
        rc.fringe = tail.fringe;
        rc
    }
    /// Multiply the resistance of each sample matching the last sample's resistance by `multiplier`.
    /// Rebuilds the dense table if one was built.
    pub fn scale_resistance_for_duplicate_tail(&mut self, multiplier: f64) {
        let last = match self.measured.last() {
            Some(s) => s.resistance,
            None => return,
        };
        for sample in self.measured.iter_mut() {
            if (sample.resistance - last).abs() < RES_EPSILON {
                sample.resistance *= multiplier;
            }
        }
        if self.is_dense() {
            self.densify(self.dense.unit, self.dense.span);
        }
    }
}
