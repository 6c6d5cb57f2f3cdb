//! Adaptive restricted-quadtree triangulation of one grid sampler
//!
//! A [`GridTriangulator`] samples a `(2^c + 1)²` lattice once, fixes a
//! vertex mapping from a base tolerance, and then emits a single
//! generalized triangle strip per refinement query. Queries only touch
//! per-call scratch, so strips for several tolerances can be produced in
//! parallel ([`GridTriangulator::lod_indices`]) or in the background
//! ([`GridTriangulator::index_async`]).

pub mod lattice;
pub mod mesh;
pub mod refine;
mod strip;
pub mod worker;

use std::sync::Arc;

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use crate::core::types::Result;
use crate::grid::GridSampler;
use crate::math::GridRect;

pub use lattice::{BoundaryTable, Edge, EnabledSet, LogicalGrid, MAX_COMPLEXITY};
pub use mesh::{GridMesh, Placement, VertexMap};
pub use refine::{EyeFocus, RefineQuery};
pub use worker::IndexWorker;

use mesh::MeshParams;

/// Default split tolerance.
pub const DEFAULT_TOLERANCE: f32 = 0.02;
/// Default skirt depth below the grid border, in world units.
pub const DEFAULT_SKIRT_DEPTH: f32 = 0.05;

/// Triangulates one sampler over a fixed-resolution logical grid.
///
/// Geometry setters (sampler, complexity, bounds, offset, skirt depth) mark
/// the mesh stale; it is rebuilt on the next query. Changing the tolerance
/// keeps the vertex mapping, so a finer tolerance afterwards can only enable
/// points the first mapping already contains.
pub struct GridTriangulator {
    params: MeshParams,
    skirts: bool,
    changed: bool,
    mesh: Option<Arc<GridMesh>>,
    default_index: Option<Vec<u32>>,
}

impl GridTriangulator {
    pub fn new(sampler: Arc<dyn GridSampler>, complexity: u32) -> Result<Self> {
        Ok(Self {
            params: MeshParams {
                sampler,
                grid: LogicalGrid::new(complexity)?,
                placement: Placement::default(),
                tolerance: DEFAULT_TOLERANCE,
                skirt_depth: DEFAULT_SKIRT_DEPTH,
            },
            skirts: true,
            changed: true,
            mesh: None,
            default_index: None,
        })
    }

    pub fn with_skirts(mut self, skirts: bool) -> Self {
        self.set_skirts(skirts);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.set_tolerance(tolerance);
        self
    }

    fn invalidate(&mut self) {
        self.changed = true;
        self.default_index = None;
    }

    pub fn set_sampler(&mut self, sampler: Arc<dyn GridSampler>) {
        self.params.sampler = sampler;
        self.invalidate();
    }

    /// Change the lattice resolution. Rejects 0 and values above
    /// [`MAX_COMPLEXITY`], leaving the triangulator unchanged.
    pub fn set_complexity(&mut self, complexity: u32) -> Result<()> {
        let grid = LogicalGrid::new(complexity)?;
        if grid != self.params.grid {
            self.params.grid = grid;
            self.invalidate();
        }
        Ok(())
    }

    /// World-space X/Z rectangle, base elevation and height multiplier.
    pub fn set_spatial_bounds(&mut self, rect: GridRect, elevation: f32, height: f32) {
        let placement = &mut self.params.placement;
        placement.spatial = rect;
        placement.elevation = elevation;
        placement.height = height;
        self.invalidate();
    }

    /// Grid-space rectangle the lattice samples.
    pub fn set_grid_bounds(&mut self, rect: GridRect) {
        self.params.placement.tex = rect;
        self.invalidate();
    }

    pub fn set_offset(&mut self, offset: Vec3) {
        self.params.placement.offset = offset;
        self.invalidate();
    }

    pub fn set_skirt_depth(&mut self, depth: f32) {
        self.params.skirt_depth = depth;
        self.invalidate();
    }

    pub fn set_skirts(&mut self, skirts: bool) {
        if skirts != self.skirts {
            self.skirts = skirts;
            self.default_index = None;
        }
    }

    /// Default tolerance for [`index`](Self::index). Does not rebuild the
    /// vertex mapping.
    pub fn set_tolerance(&mut self, tolerance: f32) {
        if tolerance != self.params.tolerance {
            self.params.tolerance = tolerance;
            self.default_index = None;
        }
    }

    pub fn tolerance(&self) -> f32 {
        self.params.tolerance
    }

    pub fn complexity(&self) -> u32 {
        self.params.grid.complexity()
    }

    pub fn size(&self) -> usize {
        self.params.grid.size()
    }

    pub fn placement(&self) -> &Placement {
        &self.params.placement
    }

    pub fn skirts(&self) -> bool {
        self.skirts
    }

    /// Whether the next query rebuilds the mesh.
    pub fn is_changed(&self) -> bool {
        self.changed || self.mesh.is_none()
    }

    /// Current mesh, rebuilding it if a geometry parameter changed.
    pub fn mesh(&mut self) -> &Arc<GridMesh> {
        if self.changed {
            self.mesh = None;
            self.changed = false;
        }
        let params = &self.params;
        self.mesh.get_or_insert_with(|| Arc::new(GridMesh::build(params)))
    }

    pub fn coordinates(&mut self) -> &[Vec3] {
        self.mesh().coordinates()
    }

    pub fn normals(&mut self) -> &[Vec3] {
        self.mesh().normals()
    }

    pub fn grid_coords(&mut self) -> &[Vec2] {
        self.mesh().grid_coords()
    }

    pub fn vertex_count(&mut self) -> usize {
        self.mesh().vertex_count()
    }

    pub fn min_y(&mut self) -> f32 {
        self.mesh().min_y()
    }

    pub fn max_y(&mut self) -> f32 {
        self.mesh().max_y()
    }

    /// Strip at the current tolerance, cached until a parameter changes.
    pub fn index(&mut self) -> &[u32] {
        let mesh = self.mesh().clone();
        let query = RefineQuery::new(self.params.tolerance);
        let skirts = self.skirts;
        self.default_index
            .get_or_insert_with(|| mesh.index(&query, skirts))
    }

    pub fn index_for(&mut self, query: &RefineQuery) -> Vec<u32> {
        let skirts = self.skirts;
        self.mesh().index(query, skirts)
    }

    pub fn enabled_points(&mut self, query: &RefineQuery) -> EnabledSet {
        self.mesh().refine(query)
    }

    /// One strip per tolerance, computed in parallel over the same mesh.
    pub fn lod_indices(&mut self, tolerances: &[f32]) -> Vec<Vec<u32>> {
        let mesh = self.mesh().clone();
        let skirts = self.skirts;
        tolerances
            .par_iter()
            .map(|&tolerance| mesh.index(&RefineQuery::new(tolerance), skirts))
            .collect()
    }

    /// Compute the strip for `query` on `worker` and hand it to `callback`.
    ///
    /// If the mesh is stale the worker builds a fresh one for this job
    /// without caching it here.
    pub fn index_async<F>(&self, worker: &IndexWorker, query: RefineQuery, callback: F)
    where
        F: FnOnce(Result<Vec<u32>>) + Send + 'static,
    {
        let skirts = self.skirts;
        let ready = match (&self.mesh, self.changed) {
            (Some(mesh), false) => Ok(mesh.clone()),
            _ => Err(self.params.clone()),
        };
        worker.submit(
            move || {
                let mesh = ready.unwrap_or_else(|params| Arc::new(GridMesh::build(&params)));
                Ok(mesh.index(&query, skirts))
            },
            callback,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::grid::{FlatSampler, FnSampler, NoiseParams, NoiseSampler};
    use std::sync::mpsc;
    use std::time::Duration;

    fn noise(complexity: u32) -> GridTriangulator {
        let sampler = Arc::new(NoiseSampler::new(NoiseParams::default()));
        GridTriangulator::new(sampler, complexity)
            .unwrap()
            .with_skirts(false)
    }

    /// Unit spike of height 1 at the grid center.
    fn spike(complexity: u32) -> GridTriangulator {
        let sampler = Arc::new(FnSampler::new(|s: f32, t: f32| {
            if (s - 0.5).abs() < 1e-4 && (t - 0.5).abs() < 1e-4 { 1.0 } else { 0.0 }
        }));
        GridTriangulator::new(sampler, complexity)
            .unwrap()
            .with_skirts(false)
    }

    /// Signed area in lattice X/Z of each non-degenerate triangle.
    fn strip_areas(coords: &[Vec3], strip: &[u32]) -> Vec<(usize, f32)> {
        strip
            .windows(3)
            .enumerate()
            .filter(|(_, w)| w[0] != w[1] && w[1] != w[2] && w[0] != w[2])
            .map(|(i, w)| {
                let a = coords[w[0] as usize];
                let b = coords[w[1] as usize];
                let c = coords[w[2] as usize];
                let (u, v) = (b - a, c - a);
                (i, u.x * v.z - u.z * v.x)
            })
            .collect()
    }

    fn assert_valid_strip(tri: &mut GridTriangulator, strip: &[u32]) {
        let count = tri.vertex_count() as u32;
        assert!(strip.len() >= 3);
        assert_eq!(strip[0], strip[1]);
        assert!(strip.iter().all(|&i| i < count));
        assert!(strip[2..].windows(2).all(|w| w[0] != w[1]));

        let coords = tri.coordinates().to_vec();
        for (i, area) in strip_areas(&coords, strip) {
            let expected_negative = i % 2 == 0;
            assert_eq!(area < 0.0, expected_negative, "winding flips at {}", i);
        }
    }

    #[test]
    fn test_rejects_zero_complexity() {
        let sampler = Arc::new(FlatSampler::new(0.0));
        assert!(matches!(
            GridTriangulator::new(sampler, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_complexity_keeps_state_on_error() {
        let mut tri = noise(3);
        assert!(tri.set_complexity(0).is_err());
        assert_eq!(tri.complexity(), 3);
        tri.set_complexity(2).unwrap();
        assert_eq!(tri.size(), 5);
    }

    #[test]
    fn test_flat_grid_is_four_triangles() {
        let mut tri = GridTriangulator::new(Arc::new(FlatSampler::new(0.0)), 4)
            .unwrap()
            .with_skirts(false)
            .with_tolerance(0.0);
        let query = RefineQuery::new(0.0);
        assert_eq!(tri.enabled_points(&query).count(), 5);
        let strip = tri.index().to_vec();
        let coords = tri.coordinates().to_vec();
        assert_eq!(strip_areas(&coords, &strip).len(), 4);
        assert_valid_strip(&mut tri, &strip);
    }

    #[test]
    fn test_flat_strip_covers_tile() {
        let mut tri = GridTriangulator::new(Arc::new(FlatSampler::new(0.0)), 3)
            .unwrap()
            .with_skirts(false);
        tri.set_spatial_bounds(GridRect::new(0.0, 0.0, 8.0, 8.0), 0.0, 1.0);
        // Full mapping first, so both passes can refine.
        for tolerance in [-1.0, 0.0] {
            tri.set_tolerance(tolerance);
            let strip = tri.index().to_vec();
            let coords = tri.coordinates().to_vec();
            let area: f32 = strip_areas(&coords, &strip)
                .iter()
                .map(|(_, a)| a.abs() * 0.5)
                .sum();
            assert!((area - 64.0).abs() < 1e-3, "area {}", area);
        }
    }

    #[test]
    fn test_negative_tolerance_enables_full_lattice() {
        let mut tri = noise(3).with_tolerance(-1.0);
        let set = tri.enabled_points(&RefineQuery::new(-1.0));
        assert_eq!(set.count(), 81);
        let strip = tri.index().to_vec();
        assert_valid_strip(&mut tri, &strip);
    }

    #[test]
    fn test_spike_refines_towards_center() {
        let mut tri = spike(3).with_tolerance(0.0);
        let coarse = tri.enabled_points(&RefineQuery::new(10.0));
        let fine = tri.enabled_points(&RefineQuery::new(0.0));
        assert_eq!(coarse.count(), 5);
        assert!(fine.count() > coarse.count());
        // Neighbours of the spike are split, far corners of the lattice are not.
        assert!(fine.get(3, 3) && fine.get(5, 5));
        assert!(!fine.get(1, 7));
        let strip = tri.index().to_vec();
        assert_valid_strip(&mut tri, &strip);
    }

    #[test]
    fn test_refinement_is_monotonic() {
        let mut tri = noise(4).with_tolerance(-1.0);
        let mut previous: Option<EnabledSet> = None;
        for tolerance in [0.5, 0.2, 0.05, 0.01, 0.0] {
            let set = tri.enabled_points(&RefineQuery::new(tolerance));
            if let Some(prev) = &previous {
                assert!(set.is_superset_of(prev), "tolerance {}", tolerance);
            }
            previous = Some(set);
        }
    }

    #[test]
    fn test_dependency_closure() {
        let mut tri = noise(5).with_tolerance(-1.0);
        let grid = LogicalGrid::new(5).unwrap();
        let boundary = BoundaryTable::new(&grid);
        let mut diagonal_checked = 0;
        for tolerance in [0.1, 0.02, 0.005] {
            let set = tri.enabled_points(&RefineQuery::new(tolerance));
            for (x, y) in set.iter() {
                let (bx, by) = (boundary.level(x), boundary.level(y));
                let deps = if bx == by {
                    // Quad centers need the two diamond parents on the
                    // diagonal leading away from the coarser corner.
                    let l = bx;
                    if 2 * l >= grid.last() {
                        continue;
                    }
                    let sx: isize = if boundary.level(x + l) == 2 * l { 1 } else { -1 };
                    let sy: isize = if boundary.level(y + l) == 2 * l { 1 } else { -1 };
                    let d = l as isize;
                    diagonal_checked += 1;
                    [(sx * d, -sy * d), (-sx * d, sy * d)]
                } else {
                    // Edge midpoints need both neighbouring quad centers.
                    let l = bx.min(by) as isize;
                    if bx < by { [(0, -l), (0, l)] } else { [(-l, 0), (l, 0)] }
                };
                for (dx, dy) in deps {
                    if let (Some(nx), Some(ny)) = (grid.offset(x, dx), grid.offset(y, dy)) {
                        assert!(set.get(nx, ny), "({}, {}) without ({}, {})", x, y, nx, ny);
                    }
                }
            }
            let strip = tri.index_for(&RefineQuery::new(tolerance));
            assert_valid_strip(&mut tri, &strip);
        }
        assert!(diagonal_checked > 0);
    }

    #[test]
    fn test_rough_strip_covers_tile() {
        let mut tri = noise(4).with_tolerance(-1.0);
        tri.set_spatial_bounds(GridRect::new(0.0, 0.0, 8.0, 8.0), 0.0, 4.0);
        let queries = [
            RefineQuery::new(0.2),
            RefineQuery::new(0.05),
            RefineQuery::new(0.01),
            RefineQuery::new(0.0),
            RefineQuery::new(0.05).with_focus(Vec3::ZERO, 4.0),
            RefineQuery::new(0.01).with_focus(Vec3::new(8.0, 0.0, 4.0), 2.0),
        ];
        for query in &queries {
            let strip = tri.index_for(query);
            assert_valid_strip(&mut tri, &strip);

            let coords = tri.coordinates().to_vec();
            let area: f32 = strip_areas(&coords, &strip)
                .iter()
                .map(|(_, a)| a.abs() * 0.5)
                .sum();
            assert!((area - 64.0).abs() < 1e-3, "area {} at {:?}", area, query);

            let mesh = tri.mesh().clone();
            for (x, y) in tri.enabled_points(query).iter() {
                let vertex = mesh.vertex_map().vertex(x, y).unwrap();
                assert!(strip.contains(&vertex), "({}, {}) unused", x, y);
            }
        }
    }

    #[test]
    fn test_eye_focus_refines_nearby() {
        // Ridges on every odd column: only the finest cells carry error.
        let sampler = Arc::new(FnSampler::new(|s: f32, _t: f32| {
            if ((s * 32.0).round() as i32) % 2 == 1 { 0.05 } else { 0.0 }
        }));
        let mut tri = GridTriangulator::new(sampler, 5)
            .unwrap()
            .with_skirts(false)
            .with_tolerance(-1.0);
        let query = RefineQuery::new(0.05).with_focus(Vec3::ZERO, 1.0);
        let focused = tri.enabled_points(&query);
        let nearby = focused.iter().filter(|&(x, y)| x < 8 && y < 8).count();
        let far = focused.iter().filter(|&(x, y)| x > 24 && y > 24).count();
        assert!(nearby > far, "{} near vs {} far", nearby, far);

        let strip = tri.index_for(&query);
        assert_valid_strip(&mut tri, &strip);
    }

    #[test]
    fn test_determinism() {
        let mut a = noise(4);
        let mut b = noise(4);
        assert_eq!(a.coordinates(), b.coordinates());
        let first = a.index().to_vec();
        assert_eq!(first, a.index().to_vec());
        assert_eq!(first, b.index().to_vec());
    }

    #[test]
    fn test_tolerance_change_keeps_mapping() {
        let mut tri = noise(4).with_tolerance(0.2);
        let count = tri.vertex_count();
        tri.set_tolerance(0.0);
        assert!(!tri.is_changed());
        assert_eq!(tri.vertex_count(), count);

        tri.set_offset(Vec3::new(1.0, 0.0, 0.0));
        assert!(tri.is_changed());
        tri.set_tolerance(0.0);
        assert!(tri.vertex_count() >= count);
    }

    #[test]
    fn test_skirts_extend_strip() {
        let mut tri = noise(3);
        let plain = tri.index_for(&RefineQuery::new(0.02));
        tri.set_skirts(true);
        let skirted = tri.index().to_vec();
        assert!(skirted.len() > plain.len());
        assert_eq!(&skirted[..plain.len()], &plain[..]);
        let count = tri.vertex_count() as u32;
        assert!(skirted.iter().all(|&i| i < count));
    }

    #[test]
    fn test_min_max_y() {
        let mut tri = spike(2);
        tri.set_spatial_bounds(GridRect::unit(), 10.0, 2.0);
        assert_eq!(tri.min_y(), 10.0);
        assert_eq!(tri.max_y(), 12.0);
    }

    #[test]
    fn test_lod_indices_match_serial() {
        let mut tri = noise(4);
        let tolerances = [0.2, 0.05, 0.0];
        let parallel = tri.lod_indices(&tolerances);
        for (tolerance, strip) in tolerances.iter().zip(&parallel) {
            assert_eq!(strip, &tri.index_for(&RefineQuery::new(*tolerance)));
        }
    }

    #[test]
    fn test_index_async_matches_sync() {
        let worker = IndexWorker::new(2).unwrap();
        let mut tri = noise(4);
        let expected = tri.index_for(&RefineQuery::new(0.05));

        let (tx, rx) = mpsc::channel();
        tri.index_async(&worker, RefineQuery::new(0.05), move |result| {
            let _ = tx.send(result);
        });
        let strip = rx.recv_timeout(Duration::from_secs(10)).unwrap().unwrap();
        assert_eq!(strip, expected);
    }

    #[test]
    fn test_index_async_reports_sampler_panic() {
        let worker = IndexWorker::new(1).unwrap();
        let sampler = Arc::new(FnSampler::new(|_s: f32, _t: f32| -> f32 {
            panic!("corrupt height map")
        }));
        let tri = GridTriangulator::new(sampler, 2).unwrap();

        let (tx, rx) = mpsc::channel();
        tri.index_async(&worker, RefineQuery::new(0.0), move |result| {
            let _ = tx.send(result);
        });
        let result = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(result, Err(Error::Worker(_))));
    }
}
