//! Vertex data shared by every refinement of one triangulator state

use std::sync::Arc;

use glam::{Vec2, Vec3};

use super::lattice::{BoundaryTable, Edge, EnabledSet, LogicalGrid};
use super::refine::{RefineQuery, Refiner};
use super::strip;
use crate::grid::GridSampler;
use crate::math::GridRect;

/// Where the lattice lands in world space and in grid space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// World-space X/Z extent (`min.y`/`max.y` map to Z).
    pub spatial: GridRect,
    pub elevation: f32,
    /// Multiplier applied to sampled heights.
    pub height: f32,
    /// Grid-space rectangle handed to the sampler.
    pub tex: GridRect,
    /// Subtracted from every emitted coordinate.
    pub offset: Vec3,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            spatial: GridRect::unit(),
            elevation: 0.0,
            height: 1.0,
            tex: GridRect::unit(),
            offset: Vec3::ZERO,
        }
    }
}

impl Placement {
    pub fn grid_coord(&self, uv: Vec2) -> Vec2 {
        self.tex.lerp(uv)
    }

    /// World position of lattice point `uv` at scaled height `h`.
    pub fn world_position(&self, uv: Vec2, h: f32) -> Vec3 {
        let xz = self.spatial.lerp(uv);
        Vec3::new(xz.x, self.elevation + h, xz.y)
    }
}

/// Lattice point and skirt slot to vertex index.
#[derive(Clone, Debug)]
pub struct VertexMap {
    lattice: Vec<Option<u32>>,
    skirts: [Vec<Option<u32>>; 4],
    size: usize,
    grid_vertices: usize,
    skirt_vertices: usize,
}

impl VertexMap {
    /// Number every point of `base` row-major, then a skirt vertex for each
    /// enabled border point, edge by edge.
    pub fn build(grid: &LogicalGrid, base: &EnabledSet) -> Self {
        let size = grid.size();
        let mut lattice = vec![None; grid.point_count()];
        let mut next = 0u32;
        for (x, y) in base.iter() {
            lattice[grid.index(x, y)] = Some(next);
            next += 1;
        }
        let grid_vertices = next as usize;

        let skirts = Edge::ALL.map(|edge| {
            (0..size)
                .map(|i| {
                    let (x, y) = edge.point(grid, i);
                    base.get(x, y).then(|| {
                        let v = next;
                        next += 1;
                        v
                    })
                })
                .collect::<Vec<_>>()
        });

        Self {
            lattice,
            skirts,
            size,
            grid_vertices,
            skirt_vertices: next as usize - grid_vertices,
        }
    }

    pub fn vertex(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.size || y >= self.size {
            return None;
        }
        self.lattice[y * self.size + x]
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        self.vertex(x, y).is_some()
    }

    pub fn skirt(&self, edge: Edge, i: usize) -> Option<u32> {
        self.skirts[edge.ordinal()].get(i).copied().flatten()
    }

    pub fn grid_vertices(&self) -> usize {
        self.grid_vertices
    }

    pub fn skirt_vertices(&self) -> usize {
        self.skirt_vertices
    }
}

/// Everything that determines a [`GridMesh`].
#[derive(Clone)]
pub(crate) struct MeshParams {
    pub sampler: Arc<dyn GridSampler>,
    pub grid: LogicalGrid,
    pub placement: Placement,
    /// Tolerance of the pass that fixes the vertex mapping.
    pub tolerance: f32,
    pub skirt_depth: f32,
}

/// Sampled lattice, its vertex mapping and the vertex arrays.
///
/// Immutable once built; refinements only produce an [`EnabledSet`] and an
/// index strip, so one mesh serves any number of concurrent queries.
pub struct GridMesh {
    grid: LogicalGrid,
    boundary: BoundaryTable,
    placement: Placement,
    heights: Vec<f32>,
    map: VertexMap,
    coordinates: Vec<Vec3>,
    normals: Vec<Vec3>,
    grid_coords: Vec<Vec2>,
    min_y: f32,
    max_y: f32,
}

impl GridMesh {
    pub(crate) fn build(params: &MeshParams) -> Self {
        let grid = params.grid;
        let placement = params.placement;
        let boundary = BoundaryTable::new(&grid);
        let size = grid.size();

        let mut heights = Vec::with_capacity(grid.point_count());
        for y in 0..size {
            for x in 0..size {
                let st = placement.grid_coord(grid.uv(x, y));
                heights.push(params.sampler.sample_height(st.x, st.y) * placement.height);
            }
        }

        let base = Refiner::new(grid, &boundary, &heights, &placement, None)
            .run(&RefineQuery::new(params.tolerance));
        let map = VertexMap::build(&grid, &base);

        let mut mesh = Self {
            grid,
            boundary,
            placement,
            heights,
            map,
            coordinates: Vec::with_capacity(grid.capacity()),
            normals: Vec::with_capacity(grid.capacity()),
            grid_coords: Vec::with_capacity(grid.capacity()),
            min_y: f32::MAX,
            max_y: f32::MIN,
        };
        mesh.fill_vertices(&base, params.skirt_depth);

        log::trace!(
            "Built grid mesh: complexity {}, {} vertices ({} skirt)",
            grid.complexity(),
            mesh.vertex_count(),
            mesh.map.skirt_vertices()
        );
        mesh
    }

    fn fill_vertices(&mut self, base: &EnabledSet, skirt_depth: f32) {
        for (x, y) in base.iter() {
            let position = self.local_position(x, y);
            self.min_y = self.min_y.min(position.y);
            self.max_y = self.max_y.max(position.y);
            self.coordinates.push(position);
            self.normals.push(self.lattice_normal(x, y));
            self.grid_coords.push(self.placement.grid_coord(self.grid.uv(x, y)));
        }

        for edge in Edge::ALL {
            for i in 0..self.grid.size() {
                let (x, y) = edge.point(&self.grid, i);
                if self.map.skirt(edge, i).is_none() {
                    continue;
                }
                self.coordinates
                    .push(self.local_position(x, y) - Vec3::Y * skirt_depth);
                self.normals.push(self.lattice_normal(x, y));
                self.grid_coords.push(self.placement.grid_coord(self.grid.uv(x, y)));
            }
        }

        // Unused tail slots repeat the last real vertex.
        let capacity = self.grid.capacity();
        if let (Some(&c), Some(&n), Some(&g)) = (
            self.coordinates.last(),
            self.normals.last(),
            self.grid_coords.last(),
        ) {
            self.coordinates.resize(capacity, c);
            self.normals.resize(capacity, n);
            self.grid_coords.resize(capacity, g);
        }
    }

    fn local_position(&self, x: usize, y: usize) -> Vec3 {
        let h = self.heights[self.grid.index(x, y)];
        self.placement.world_position(self.grid.uv(x, y), h) - self.placement.offset
    }

    /// Area-weighted normal from the four lattice neighbours.
    fn lattice_normal(&self, x: usize, y: usize) -> Vec3 {
        let last = self.grid.last();
        let c = self.local_position(x, y);
        let e = self.local_position((x + 1).min(last), y) - c;
        let n = self.local_position(x, (y + 1).min(last)) - c;
        let w = self.local_position(x.saturating_sub(1), y) - c;
        let s = self.local_position(x, y.saturating_sub(1)) - c;
        let sum = n.cross(e) + w.cross(n) + s.cross(w) + e.cross(s);
        sum.try_normalize().unwrap_or(Vec3::Y)
    }

    /// Enabled points for `query`, restricted to the mapped vertices.
    pub fn refine(&self, query: &RefineQuery) -> EnabledSet {
        Refiner::new(
            self.grid,
            &self.boundary,
            &self.heights,
            &self.placement,
            Some(&self.map),
        )
        .run(query)
    }

    /// Triangle-strip indices for `query`.
    pub fn index(&self, query: &RefineQuery, skirts: bool) -> Vec<u32> {
        let enabled = self.refine(query);
        strip::emit(&self.grid, &enabled, &self.map, skirts)
    }

    pub fn grid(&self) -> &LogicalGrid {
        &self.grid
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn vertex_map(&self) -> &VertexMap {
        &self.map
    }

    pub fn coordinates(&self) -> &[Vec3] {
        &self.coordinates
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn grid_coords(&self) -> &[Vec2] {
        &self.grid_coords
    }

    /// Real vertices, skirts included; the arrays are longer.
    pub fn vertex_count(&self) -> usize {
        self.map.grid_vertices() + self.map.skirt_vertices()
    }

    pub fn min_y(&self) -> f32 {
        self.min_y
    }

    pub fn max_y(&self) -> f32 {
        self.max_y
    }
}
