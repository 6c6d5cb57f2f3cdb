//! Restricted-quadtree refinement
//!
//! Every non-corner lattice point owns a cell: a square for quad centers, a
//! diamond for edge midpoints. A cell is split when its height error,
//! weighted by eye distance and cell size, exceeds the tolerance. Enabling a
//! point recursively enables the points it depends on so the resulting set
//! always triangulates without cracks.

use glam::Vec3;

use super::lattice::{BoundaryTable, EnabledSet, LogicalGrid};
use super::mesh::{Placement, VertexMap};

const DELTA_SCALE: f32 = 5.0;
/// Fraction of the error removed at (or beyond) the focus threshold.
const FAR_ATTENUATION: f32 = 0.85;
/// Inside this fraction of the threshold the error is boosted.
const NEAR_FRACTION: f32 = 0.15;
const NEAR_BOOST: f32 = 10.0;

/// Eye position plus the distance at which its influence tops out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyeFocus {
    /// World-space position (before the triangulator's offset).
    pub position: Vec3,
    pub threshold: f32,
}

/// Parameters of one refinement pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefineQuery {
    /// Split threshold; negative refines the full lattice.
    pub tolerance: f32,
    pub focus: Option<EyeFocus>,
}

impl RefineQuery {
    pub fn new(tolerance: f32) -> Self {
        Self {
            tolerance,
            focus: None,
        }
    }

    pub fn with_focus(mut self, position: Vec3, threshold: f32) -> Self {
        self.focus = Some(EyeFocus {
            position,
            threshold,
        });
        self
    }
}

/// Corners of the area a point subdivides.
struct Cell {
    corners: [Option<(usize, usize)>; 4],
    extent: usize,
}

pub(crate) struct Refiner<'a> {
    grid: LogicalGrid,
    boundary: &'a BoundaryTable,
    heights: &'a [f32],
    placement: &'a Placement,
    mask: Option<&'a VertexMap>,
    enabled: EnabledSet,
}

impl<'a> Refiner<'a> {
    /// `heights` are scaled sample heights in row-major lattice order.
    /// With a `mask`, points without a mapped vertex are never enabled.
    pub fn new(
        grid: LogicalGrid,
        boundary: &'a BoundaryTable,
        heights: &'a [f32],
        placement: &'a Placement,
        mask: Option<&'a VertexMap>,
    ) -> Self {
        Self {
            grid,
            boundary,
            heights,
            placement,
            mask,
            enabled: EnabledSet::new(&grid),
        }
    }

    pub fn run(mut self, query: &RefineQuery) -> EnabledSet {
        for (x, y) in self.grid.corners() {
            self.enabled.set(x, y);
        }
        let (cx, cy) = self.grid.center();
        self.enabled.set(cx, cy);

        let size = self.grid.size();
        for y in 0..size {
            for x in 0..size {
                if self.enabled.get(x, y) {
                    continue;
                }
                let Some(cell) = self.cell(x, y) else {
                    continue;
                };
                if self.split_quad(x, y, &cell, query) {
                    self.enable_point(x, y);
                }
            }
        }
        self.enabled
    }

    fn height(&self, x: usize, y: usize) -> f32 {
        self.heights[self.grid.index(x, y)]
    }

    fn cell(&self, x: usize, y: usize) -> Option<Cell> {
        let bx = self.boundary.level(x);
        let by = self.boundary.level(y);
        let grid = &self.grid;
        if bx == by {
            if bx == grid.last() {
                return None;
            }
            let l = bx;
            return Some(Cell {
                corners: [
                    Some((x - l, y - l)),
                    Some((x + l, y - l)),
                    Some((x + l, y + l)),
                    Some((x - l, y + l)),
                ],
                extent: 2 * l,
            });
        }
        let l = bx.min(by);
        let d = l as isize;
        let at = |dx: isize, dy: isize| Some((grid.offset(x, dx)?, grid.offset(y, dy)?));
        Some(Cell {
            corners: [at(-d, 0), at(d, 0), at(0, -d), at(0, d)],
            extent: 2 * l,
        })
    }

    /// Whether the cell's height error at this query exceeds the tolerance.
    fn split_quad(&self, x: usize, y: usize, cell: &Cell, query: &RefineQuery) -> bool {
        if query.tolerance < 0.0 {
            return true;
        }
        let (sum, n) = cell
            .corners
            .iter()
            .flatten()
            .fold((0.0f32, 0usize), |(sum, n), &(cx, cy)| (sum + self.height(cx, cy), n + 1));
        if n == 0 {
            return false;
        }
        let center = self.height(x, y);
        let extent = cell.extent as f32;
        let mut delta = (sum / n as f32 - center).abs() * DELTA_SCALE / extent;

        if let Some(focus) = query.focus {
            if focus.threshold > 0.0 {
                let world = self.placement.world_position(self.grid.uv(x, y), center);
                let d = focus.position.distance(world);
                let falloff = (d / focus.threshold).clamp(0.0, 1.0);
                delta *= 1.0 - FAR_ATTENUATION * falloff;
                if d < NEAR_FRACTION * focus.threshold {
                    delta *= NEAR_BOOST;
                }
            }
        }

        delta *= extent.log2();
        delta > query.tolerance
    }

    fn enable_point(&mut self, x: usize, y: usize) {
        if x >= self.grid.size() || y >= self.grid.size() || self.enabled.get(x, y) {
            return;
        }
        if let Some(mask) = self.mask {
            if !mask.contains(x, y) {
                return;
            }
        }
        self.enabled.set(x, y);
        for (dx, dy) in self.dependencies(x, y).into_iter().flatten() {
            self.enable_point(dx, dy);
        }
    }

    /// The two points whose presence keeps `(x, y)` crack free.
    fn dependencies(&self, x: usize, y: usize) -> [Option<(usize, usize)>; 2] {
        let bx = self.boundary.level(x);
        let by = self.boundary.level(y);
        let grid = &self.grid;
        let at = |dx: isize, dy: isize| Some((grid.offset(x, dx)?, grid.offset(y, dy)?));

        if bx == by {
            let l = bx;
            // The grid center depends only on the always-enabled corners.
            if 2 * l >= grid.last() {
                return [None, None];
            }
            let sx: isize = if self.boundary.level(x + l) == 2 * l { 1 } else { -1 };
            let sy: isize = if self.boundary.level(y + l) == 2 * l { 1 } else { -1 };
            let d = l as isize;
            return [at(sx * d, -sy * d), at(-sx * d, sy * d)];
        }

        let d = bx.min(by) as isize;
        if bx < by {
            [at(0, -d), at(0, d)]
        } else {
            [at(-d, 0), at(d, 0)]
        }
    }
}
