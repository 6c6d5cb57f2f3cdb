//! Triangle-strip emission over an enabled set
//!
//! The grid is split into four wedges around its center. Each wedge is a
//! right isosceles triangle that is bisected recursively while the midpoint
//! of its hypotenuse is enabled. Strip parity tracks which side of the
//! strip the next vertex lands on; when a vertex would land on the wrong
//! side, the second-to-last vertex is repeated to swap it.

use super::lattice::{EnabledSet, Edge, LogicalGrid};
use super::mesh::VertexMap;

type Point = (usize, usize);

struct StripBuilder {
    indices: Vec<u32>,
    parity: u32,
}

impl StripBuilder {
    fn start(first: u32, parity: u32) -> Self {
        Self {
            indices: vec![first, first],
            parity,
        }
    }

    fn append(&mut self, v: u32, parity: u32) {
        let n = self.indices.len();
        if v == self.indices[n - 1] || v == self.indices[n - 2] {
            return;
        }
        if parity != self.parity {
            self.parity = parity;
        } else {
            let bridge = self.indices[n - 2];
            self.indices.push(bridge);
        }
        self.indices.push(v);
    }

    fn push_raw(&mut self, v: u32) {
        self.indices.push(v);
    }
}

struct Emitter<'a> {
    grid: &'a LogicalGrid,
    enabled: &'a EnabledSet,
    map: &'a VertexMap,
    strip: StripBuilder,
}

impl Emitter<'_> {
    fn active(&self, (x, y): Point) -> Option<u32> {
        if self.enabled.get(x, y) {
            self.map.vertex(x, y)
        } else {
            None
        }
    }

    fn append(&mut self, p: Point, parity: u32) {
        if let Some(v) = self.active(p) {
            self.strip.append(v, parity);
        }
    }

    /// Emit triangle `(a; b, c)`, `a` being the right-angle apex.
    fn refine_sub(&mut self, a: Point, b: Point, c: Point, level: u32) {
        if level > 1 && (b.0 + c.0) % 2 == 0 && (b.1 + c.1) % 2 == 0 {
            let m = ((b.0 + c.0) / 2, (b.1 + c.1) / 2);
            if self.active(m).is_some() {
                self.refine_sub(m, b, a, level - 1);
                self.append(a, level & 1);
                self.refine_sub(m, a, c, level - 1);
                return;
            }
        }
        self.append(a, level & 1);
    }
}

/// Strip indices for `enabled`, optionally followed by the skirt ring.
pub(crate) fn emit(
    grid: &LogicalGrid,
    enabled: &EnabledSet,
    map: &VertexMap,
    skirts: bool,
) -> Vec<u32> {
    let [sw, se, ne, nw] = grid.corners();
    let center = grid.center();
    let level = 2 * grid.complexity();

    let first = map.vertex(sw.0, sw.1).unwrap_or(0);
    let mut emitter = Emitter {
        grid,
        enabled,
        map,
        strip: StripBuilder::start(first, level & 1),
    };

    for (b, c) in [(sw, se), (se, ne), (ne, nw), (nw, sw)] {
        emitter.refine_sub(center, b, c, level);
        emitter.append(c, (level + 1) & 1);
    }

    if skirts {
        emitter.emit_skirts();
    }
    emitter.strip.indices
}

impl Emitter<'_> {
    /// Zig-zag between each enabled border vertex and the skirt vertex
    /// beneath it, counter-clockwise around the grid.
    fn emit_skirts(&mut self) {
        if self.strip.indices.len() % 2 == 1 {
            if let Some(&last) = self.strip.indices.last() {
                self.strip.push_raw(last);
            }
        }
        for edge in Edge::ALL {
            for i in 0..self.grid.size() {
                let p = edge.point(self.grid, i);
                if let (Some(v), Some(s)) = (self.active(p), self.map.skirt(edge, i)) {
                    self.strip.push_raw(v);
                    self.strip.push_raw(s);
                }
            }
        }
    }
}
