//! The logical lattice a triangulator refines over, its boundary-level
//! table, and the per-query set of enabled points.

use crate::core::error::Error;
use crate::core::types::Result;

/// Largest accepted complexity (4097² lattice points).
pub const MAX_COMPLEXITY: u32 = 12;

/// Square lattice of `2^complexity + 1` samples per side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogicalGrid {
    complexity: u32,
    size: usize,
}

impl LogicalGrid {
    pub fn new(complexity: u32) -> Result<Self> {
        if complexity == 0 || complexity > MAX_COMPLEXITY {
            return Err(Error::InvalidArgument(format!(
                "complexity must be in 1..={}, got {}",
                MAX_COMPLEXITY, complexity
            )));
        }
        Ok(Self {
            complexity,
            size: (1usize << complexity) + 1,
        })
    }

    pub fn complexity(&self) -> u32 {
        self.complexity
    }

    /// Samples per side.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Index of the last row/column (`size - 1`, a power of two).
    pub fn last(&self) -> usize {
        self.size - 1
    }

    pub fn center(&self) -> (usize, usize) {
        let c = self.last() / 2;
        (c, c)
    }

    /// SW, SE, NE, NW.
    pub fn corners(&self) -> [(usize, usize); 4] {
        let n = self.last();
        [(0, 0), (n, 0), (n, n), (0, n)]
    }

    pub fn point_count(&self) -> usize {
        self.size * self.size
    }

    /// Upper bound on vertices: every lattice point plus four skirt rings.
    pub fn capacity(&self) -> usize {
        self.point_count() + 4 * self.size
    }

    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.size + x
    }

    /// `base + delta` if it stays on the lattice.
    pub fn offset(&self, base: usize, delta: isize) -> Option<usize> {
        base.checked_add_signed(delta).filter(|&v| v < self.size)
    }

    /// `(x, y) / last`, the point's position in `[0,1]²`.
    pub fn uv(&self, x: usize, y: usize) -> glam::Vec2 {
        let n = self.last() as f32;
        glam::Vec2::new(x as f32 / n, y as f32 / n)
    }
}

/// Grid border, in counter-clockwise traversal order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Edge {
    South,
    East,
    North,
    West,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::South, Edge::East, Edge::North, Edge::West];

    pub fn ordinal(self) -> usize {
        match self {
            Edge::South => 0,
            Edge::East => 1,
            Edge::North => 2,
            Edge::West => 3,
        }
    }

    /// The `i`-th lattice point along this edge, walking counter-clockwise.
    pub fn point(self, grid: &LogicalGrid, i: usize) -> (usize, usize) {
        let n = grid.last();
        match self {
            Edge::South => (i, 0),
            Edge::East => (n, i),
            Edge::North => (n - i, n),
            Edge::West => (0, n - i),
        }
    }
}

/// Per-index refinement level: `size - 1` on the border, otherwise the
/// largest power of two dividing the index.
#[derive(Clone, Debug)]
pub struct BoundaryTable {
    levels: Vec<usize>,
}

impl BoundaryTable {
    pub fn new(grid: &LogicalGrid) -> Self {
        let last = grid.last();
        let levels = (0..grid.size())
            .map(|n| {
                if n == 0 || n == last {
                    last
                } else {
                    1 << n.trailing_zeros()
                }
            })
            .collect();
        Self { levels }
    }

    pub fn level(&self, n: usize) -> usize {
        self.levels[n]
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Lattice points switched on by one refinement pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnabledSet {
    size: usize,
    bits: Vec<bool>,
    count: usize,
}

impl EnabledSet {
    pub fn new(grid: &LogicalGrid) -> Self {
        Self {
            size: grid.size(),
            bits: vec![false; grid.point_count()],
            count: 0,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.size && y < self.size && self.bits[y * self.size + x]
    }

    /// Enable `(x, y)`. Returns `false` if it already was.
    pub fn set(&mut self, x: usize, y: usize) -> bool {
        let slot = &mut self.bits[y * self.size + x];
        if *slot {
            return false;
        }
        *slot = true;
        self.count += 1;
        true
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Enabled points in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let size = self.size;
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(move |(i, _)| (i % size, i / size))
    }

    pub fn is_superset_of(&self, other: &EnabledSet) -> bool {
        self.size == other.size
            && self
                .bits
                .iter()
                .zip(&other.bits)
                .all(|(mine, theirs)| *mine || !*theirs)
    }
}
