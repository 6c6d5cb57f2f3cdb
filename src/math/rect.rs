//! Axis-aligned rectangles in grid (s,t) space or the world XZ plane

use std::fmt;

use crate::core::types::Vec2;

/// Tolerance used by containment tests, so dyadic tile subdivisions that
/// round in the last bit still land inside their parent rectangle.
const CONTAINS_EPSILON: f32 = 1e-6;

/// Rectangle `[min.x, max.x] × [min.y, max.y]`.
///
/// Used both for `(s1, t1, s2, t2)` regions of normalized grid space and for
/// `(x1, z1, x2, z2)` footprints in the world plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl GridRect {
    /// Create a rectangle from two opposite corners in any order.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            min: Vec2::new(x1.min(x2), y1.min(y2)),
            max: Vec2::new(x1.max(x2), y1.max(y2)),
        }
    }

    /// The whole normalized grid `[0,1]²`.
    pub fn unit() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// Degenerate rectangle covering a single point.
    pub fn point(p: Vec2) -> Self {
        Self { min: p, max: p }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// True when the rectangle has no area.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x - CONTAINS_EPSILON
            && p.x <= self.max.x + CONTAINS_EPSILON
            && p.y >= self.min.y - CONTAINS_EPSILON
            && p.y <= self.max.y + CONTAINS_EPSILON
    }

    /// True when `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &GridRect) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Map local coordinates `uv ∈ [0,1]²` into this rectangle.
    pub fn lerp(&self, uv: Vec2) -> Vec2 {
        self.min + self.size() * uv
    }

    /// Inverse of [`GridRect::lerp`]: local coordinates of `p` in this rectangle.
    pub fn normalize(&self, p: Vec2) -> Vec2 {
        let size = self.size();
        Vec2::new(
            if size.x != 0.0 { (p.x - self.min.x) / size.x } else { 0.0 },
            if size.y != 0.0 { (p.y - self.min.y) / size.y } else { 0.0 },
        )
    }

    /// Cell `(ix, iy)` of an `n × n` subdivision.
    pub fn subdivide(&self, ix: u32, iy: u32, n: u32) -> GridRect {
        let step = self.size() / n as f32;
        let min = self.min + step * Vec2::new(ix as f32, iy as f32);
        let max = if ix + 1 == n && iy + 1 == n {
            self.max
        } else {
            Vec2::new(
                if ix + 1 == n { self.max.x } else { min.x + step.x },
                if iy + 1 == n { self.max.y } else { min.y + step.y },
            )
        };
        GridRect { min, max }
    }
}

impl Default for GridRect {
    fn default() -> Self {
        Self::unit()
    }
}

impl fmt::Display for GridRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}]-[{:.4}, {:.4}]",
            self.min.x, self.min.y, self.max.x, self.max.y
        )
    }
}
