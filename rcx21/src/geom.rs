//!
//! # Geometry Module
//!
//! Axis-aligned [Point]s, [Dir]ections and [Rect]angles,
//! plus the sweep-axis and wire-axis views of them used by the window engine.
//!

// Crates.io
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Local imports
use crate::Int;

/// # Point in two-dimensional layout-space
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    pub x: Int,
    pub y: Int,
}
impl Point {
    /// Create a new [Point] from (x,y) coordinates
    pub fn new(x: Int, y: Int) -> Self {
        Self { x, y }
    }
    /// Create a new [Point] which serves as an offset in direction `dir`
    pub fn offset(val: Int, dir: Dir) -> Self {
        match dir {
            Dir::Horiz => Self { x: val, y: 0 },
            Dir::Vert => Self { x: 0, y: val },
        }
    }
    /// Get the coordinate associated with direction `dir`
    pub fn coord(&self, dir: Dir) -> Int {
        match dir {
            Dir::Horiz => self.x,
            Dir::Vert => self.y,
        }
    }
}

/// Direction Enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Dir {
    Horiz,
    Vert,
}
impl Dir {
    /// Whichever direction we are, return the other one.
    pub fn other(self) -> Self {
        match self {
            Self::Horiz => Self::Vert,
            Self::Vert => Self::Horiz,
        }
    }
}
impl std::ops::Not for Dir {
    type Output = Self;
    /// Exclamation Operator returns the opposite direction
    fn not(self) -> Self::Output {
        self.other()
    }
}

/// # Rectangle
///
/// Axis-aligned rectangle, specified by two opposite corners.
/// [Rect::new] orders them such that `p0` is the lower-left.
///
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct Rect {
    pub p0: Point,
    pub p1: Point,
}
impl Rect {
    /// Create a new [Rect] from any two opposite corners
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            p0: Point::new(a.x.min(b.x), a.y.min(b.y)),
            p1: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }
    /// Create from (x0, y0, x1, y1) coordinates
    pub fn from_coords(x0: Int, y0: Int, x1: Int, y1: Int) -> Self {
        Self::new(Point::new(x0, y0), Point::new(x1, y1))
    }
    /// Calculate our center-point
    pub fn center(&self) -> Point {
        Point::new((self.p0.x + self.p1.x) / 2, (self.p0.y + self.p1.y) / 2)
    }
    /// Low coordinate along `dir`
    pub fn lo(&self, dir: Dir) -> Int {
        self.p0.coord(dir).min(self.p1.coord(dir))
    }
    /// High coordinate along `dir`
    pub fn hi(&self, dir: Dir) -> Int {
        self.p0.coord(dir).max(self.p1.coord(dir))
    }
    /// Extent along `dir`
    pub fn size(&self, dir: Dir) -> Int {
        self.hi(dir) - self.lo(dir)
    }
    /// Smallest [Rect] containing both `self` and `other`
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            Point::new(self.lo(Dir::Horiz).min(other.lo(Dir::Horiz)), self.lo(Dir::Vert).min(other.lo(Dir::Vert))),
            Point::new(self.hi(Dir::Horiz).max(other.hi(Dir::Horiz)), self.hi(Dir::Vert).max(other.hi(Dir::Vert))),
        )
    }
}

///
/// # Span
///
/// Closed interval along a single axis.
///
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Span {
    pub lo: Int,
    pub hi: Int,
}
impl Span {
    pub fn new(lo: Int, hi: Int) -> Self {
        Self {
            lo: lo.min(hi),
            hi: lo.max(hi),
        }
    }
    pub fn len(&self) -> Int {
        self.hi - self.lo
    }
    pub fn is_empty(&self) -> bool {
        self.hi == self.lo
    }
    /// Distance between `self` and `other`. Non-positive when they overlap.
    pub fn gap(&self, other: &Span) -> Int {
        self.lo.max(other.lo) - self.hi.min(other.hi)
    }
    /// Length common to `self` and `other`. Non-positive when they are disjoint.
    pub fn overlap(&self, other: &Span) -> Int {
        -self.gap(other)
    }
}
