//! Quadtree of terrain tiles with nested finer terrains as LOD alternatives

use std::time::Instant;

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use super::config::TerrainConfig;
use super::lod::{LodChoice, LodSwitch};
use super::tile::{TerrainTile, TileCoord, TileHandles};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::GridRect;
use crate::resource::{Detail, GridResourceProvider, SharedProvider, lock_provider};

/// Where a terrain sits in world space and which part of the grid it shows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainExtent {
    /// World position of the tile-(0, 0) corner at base elevation.
    pub origin: Vec3,
    /// Side length in world units along X and Z.
    pub scale: f32,
    /// World height of a sample value of 1.
    pub height: f32,
    /// Grid-space rectangle spread over the terrain.
    pub tex_rect: GridRect,
}

impl Default for TerrainExtent {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            scale: 1.0,
            height: 1.0,
            tex_rect: GridRect::unit(),
        }
    }
}

impl TerrainExtent {
    fn validate(&self) -> Result<()> {
        if self.scale.is_nan() || self.scale <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "terrain scale must be positive, got {}",
                self.scale
            )));
        }
        if self.tex_rect.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "terrain grid rectangle {} is empty",
                self.tex_rect
            )));
        }
        Ok(())
    }
}

/// Prepared content of a terrain.
pub enum TerrainNode {
    Group(Vec<TerrainNode>),
    Tile(TerrainTile),
    /// Coarse tile drawn beyond the switch distance, finer terrain inside it.
    Lod {
        switch: LodSwitch,
        coarse: TerrainTile,
        fine: Box<ChunkedTerrain>,
    },
}

impl TerrainNode {
    fn collect_tiles<'a>(&'a self, out: &mut Vec<&'a TerrainTile>) {
        match self {
            TerrainNode::Group(children) => {
                for child in children {
                    child.collect_tiles(out);
                }
            }
            TerrainNode::Tile(tile) => out.push(tile),
            TerrainNode::Lod { coarse, .. } => out.push(coarse),
        }
    }

    fn collect_tiles_mut<'a>(&'a mut self, out: &mut Vec<&'a mut TerrainTile>) {
        match self {
            TerrainNode::Group(children) => {
                for child in children {
                    child.collect_tiles_mut(out);
                }
            }
            TerrainNode::Tile(tile) => out.push(tile),
            TerrainNode::Lod { coarse, .. } => out.push(coarse),
        }
    }

    fn for_each_fine(&mut self, f: &mut dyn FnMut(&mut ChunkedTerrain) -> Result<()>) -> Result<()> {
        match self {
            TerrainNode::Group(children) => {
                for child in children {
                    child.for_each_fine(f)?;
                }
                Ok(())
            }
            TerrainNode::Tile(_) => Ok(()),
            TerrainNode::Lod { fine, .. } => f(fine),
        }
    }

    fn update_lod(&mut self, eye: Vec3) -> Result<()> {
        match self {
            TerrainNode::Group(children) => {
                for child in children {
                    child.update_lod(eye)?;
                }
                Ok(())
            }
            TerrainNode::Tile(_) => Ok(()),
            TerrainNode::Lod { switch, fine, .. } => match switch.select(eye) {
                LodChoice::Fine => {
                    fine.set_up()?;
                    fine.update_lod(eye)
                }
                LodChoice::Coarse => {
                    if fine.is_prepared() || fine.outstanding_handles() > 0 {
                        fine.clean_up()?;
                    }
                    Ok(())
                }
            },
        }
    }

    fn visible_tiles<'a>(&'a self, eye: Vec3, out: &mut Vec<&'a TerrainTile>) {
        match self {
            TerrainNode::Group(children) => {
                for child in children {
                    child.visible_tiles(eye, out);
                }
            }
            TerrainNode::Tile(tile) => out.push(tile),
            TerrainNode::Lod {
                switch,
                coarse,
                fine,
            } => {
                if switch.select(eye) == LodChoice::Fine && fine.is_set_up() {
                    fine.collect_visible(eye, out);
                } else {
                    out.push(coarse);
                }
            }
        }
    }
}

/// Handles carried into an expansion and the ones it ends up holding.
/// Handles left from an earlier expansion are handed back out in tile
/// order before anything new is pinned.
struct TilePins {
    held: std::vec::IntoIter<TileHandles>,
    pinned: Vec<TileHandles>,
}

impl TilePins {
    fn into_handles(self) -> Vec<TileHandles> {
        let mut handles = self.pinned;
        handles.extend(self.held);
        handles
    }
}

/// Square terrain split into `2^d × 2^d` tiles, each triangulated from the
/// sampler and surface the shared provider selects for its grid rectangle.
///
/// While the geometry depth is below `max_geom_depth`, every tile is paired
/// with a lazy finer terrain over the same rectangle, one depth further.
pub struct ChunkedTerrain {
    provider: SharedProvider,
    config: TerrainConfig,
    extent: TerrainExtent,
    geom_depth: u32,
    lazy: bool,
    root: Option<TerrainNode>,
    set_up: bool,
    handles: Vec<TileHandles>,
}

impl ChunkedTerrain {
    /// Build and set up the top-level terrain immediately.
    pub fn new(provider: SharedProvider, config: TerrainConfig, extent: TerrainExtent) -> Result<Self> {
        Self::top_level(provider, config, extent, false)
    }

    /// Top-level terrain whose content waits for [`prepare`](Self::prepare).
    pub fn new_lazy(provider: SharedProvider, config: TerrainConfig, extent: TerrainExtent) -> Result<Self> {
        Self::top_level(provider, config, extent, true)
    }

    fn top_level(
        provider: SharedProvider,
        config: TerrainConfig,
        extent: TerrainExtent,
        lazy: bool,
    ) -> Result<Self> {
        lock_provider(&provider)?.set_fallback(config.fallback);
        Self::with_depth(provider, config, extent, 0, lazy)
    }

    fn with_depth(
        provider: SharedProvider,
        config: TerrainConfig,
        extent: TerrainExtent,
        geom_depth: u32,
        lazy: bool,
    ) -> Result<Self> {
        config.validate()?;
        extent.validate()?;
        let mut terrain = Self {
            provider,
            config,
            extent,
            geom_depth,
            lazy,
            root: None,
            set_up: false,
            handles: Vec::new(),
        };
        if !lazy {
            terrain.set_up()?;
        }
        Ok(terrain)
    }

    /// Expand the quadtree: pin every tile's resources and build its
    /// geometry. Does nothing if already prepared.
    ///
    /// Handles still held after a [`tear_down`](Self::tear_down) are reused,
    /// so each tile holds at most one sampler/surface pin at a time.
    pub fn prepare(&mut self) -> Result<()> {
        if self.root.is_some() {
            return Ok(());
        }
        let start = Instant::now();

        let mut pins = TilePins {
            held: std::mem::take(&mut self.handles).into_iter(),
            pinned: Vec::new(),
        };
        let built = match lock_provider(&self.provider) {
            Ok(mut provider) => self.build_tree(&mut provider, &mut pins),
            Err(e) => Err(e),
        };
        // Keep whatever is pinned so clean_up can release it even on error.
        self.handles = pins.into_handles();
        let mut root = built?;

        let mut tiles = Vec::new();
        root.collect_tiles_mut(&mut tiles);
        tiles.par_iter_mut().for_each(|tile| {
            tile.build_geometry();
        });
        let count = tiles.len();

        self.root = Some(root);
        log::info!(
            "Prepared terrain at depth {}: {} tiles in {:.2?}",
            self.geom_depth,
            count,
            start.elapsed()
        );
        Ok(())
    }

    fn build_tree(
        &self,
        provider: &mut GridResourceProvider,
        pins: &mut TilePins,
    ) -> Result<TerrainNode> {
        let n = self.config.tiles_per_side();
        if self.config.spatial_depth == 0 {
            return self.add_tiles(provider, pins, (0, 0, n, n));
        }
        self.add_tree_level(provider, pins, (0, 0, n, n), 0)
    }

    /// Split the tile range `(x1, z1, x2, z2)` into quadrants, materializing
    /// tiles at the last level.
    fn add_tree_level(
        &self,
        provider: &mut GridResourceProvider,
        pins: &mut TilePins,
        (x1, z1, x2, z2): (u32, u32, u32, u32),
        level: u32,
    ) -> Result<TerrainNode> {
        let xm = (x1 + x2) / 2;
        let zm = (z1 + z2) / 2;
        let quadrants = [(x1, z1, xm, zm), (xm, z1, x2, zm), (x1, zm, xm, z2), (xm, zm, x2, z2)];

        let mut children = Vec::with_capacity(4);
        for range in quadrants {
            let child = if level + 1 >= self.config.spatial_depth {
                self.add_tiles(provider, pins, range)?
            } else {
                self.add_tree_level(provider, pins, range, level + 1)?
            };
            children.push(child);
        }
        Ok(TerrainNode::Group(children))
    }

    fn add_tiles(
        &self,
        provider: &mut GridResourceProvider,
        pins: &mut TilePins,
        (x1, z1, x2, z2): (u32, u32, u32, u32),
    ) -> Result<TerrainNode> {
        let mut nodes = Vec::new();
        for iz in z1..z2 {
            for ix in x1..x2 {
                nodes.push(self.add_tile(provider, pins, TileCoord { ix, iz })?);
            }
        }
        if nodes.len() == 1 {
            if let Some(node) = nodes.pop() {
                return Ok(node);
            }
        }
        Ok(TerrainNode::Group(nodes))
    }

    fn add_tile(
        &self,
        provider: &mut GridResourceProvider,
        pins: &mut TilePins,
        coord: TileCoord,
    ) -> Result<TerrainNode> {
        let n = self.config.tiles_per_side();
        let spatial_rect = self.spatial_rect().subdivide(coord.ix, coord.iz, n);
        let grid_rect = self.extent.tex_rect.subdivide(coord.ix, coord.iz, n);

        let tile_handles = match pins.held.next() {
            Some(held) => held,
            None => {
                let detail = Detail::Level(self.geom_depth);
                let sampler = provider.find_sampler(grid_rect, detail)?;
                let surface = match provider.find_surface(grid_rect, detail) {
                    Ok(surface) => surface,
                    Err(e) => {
                        provider.release_sampler(&sampler)?;
                        return Err(e);
                    }
                };
                TileHandles { sampler, surface }
            }
        };
        pins.pinned.push(tile_handles.clone());

        let tile = TerrainTile::new(
            coord,
            spatial_rect,
            grid_rect,
            self.extent.origin.y,
            self.extent.height,
            &self.config,
            tile_handles,
        )?;

        if self.geom_depth >= self.config.max_geom_depth {
            return Ok(TerrainNode::Tile(tile));
        }

        let tile_size = self.extent.scale / n as f32;
        let fine = ChunkedTerrain::with_depth(
            self.provider.clone(),
            self.config.clone(),
            TerrainExtent {
                origin: Vec3::new(spatial_rect.min.x, self.extent.origin.y, spatial_rect.min.y),
                scale: tile_size,
                height: self.extent.height,
                tex_rect: grid_rect,
            },
            self.geom_depth + 1,
            true,
        )?;
        let center = spatial_rect.center();
        let switch = LodSwitch::new(
            Vec3::new(center.x, self.extent.origin.y, center.y),
            tile_size * self.config.lod_factor,
        )?;
        Ok(TerrainNode::Lod {
            switch,
            coarse: tile,
            fine: Box::new(fine),
        })
    }

    /// Attach the prepared content, preparing it first if needed.
    pub fn set_up(&mut self) -> Result<()> {
        self.prepare()?;
        self.set_up = true;
        Ok(())
    }

    /// Detach and drop the content. Nested finer terrains are torn down and
    /// cleaned up with it. This node's own handles stay pinned until
    /// [`clean_up`](Self::clean_up) and are reused by the next `prepare`.
    pub fn tear_down(&mut self) -> Result<()> {
        self.set_up = false;
        if let Some(mut root) = self.root.take() {
            root.for_each_fine(&mut |fine| fine.clean_up())?;
        }
        Ok(())
    }

    /// Release every sampler and surface this node's tiles acquired.
    /// Tears the node down first if it still holds content.
    pub fn clean_up(&mut self) -> Result<()> {
        self.tear_down()?;
        let mut provider = lock_provider(&self.provider)?;
        let handles = std::mem::take(&mut self.handles);
        let mut first_err = None;
        for h in &handles {
            let released = provider
                .release_sampler(&h.sampler)
                .and(provider.release_surface(&h.surface));
            if let Err(e) = released {
                log::error!("Failed to release tile handles: {}", e);
                first_err.get_or_insert(e);
            }
        }
        log::debug!(
            "Released {} tile handles at depth {}",
            handles.len(),
            self.geom_depth
        );
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stream nested terrains in or out for `eye`: finer terrains whose
    /// switch selects them are prepared and set up, the others released.
    pub fn update_lod(&mut self, eye: Vec3) -> Result<()> {
        match self.root.as_mut() {
            Some(root) => root.update_lod(eye),
            None => Ok(()),
        }
    }

    /// Tiles a renderer should draw for `eye`; empty unless set up.
    pub fn visible_tiles(&self, eye: Vec3) -> Vec<&TerrainTile> {
        let mut out = Vec::new();
        self.collect_visible(eye, &mut out);
        out
    }

    fn collect_visible<'a>(&'a self, eye: Vec3, out: &mut Vec<&'a TerrainTile>) {
        if !self.set_up {
            return;
        }
        if let Some(root) = &self.root {
            root.visible_tiles(eye, out);
        }
    }

    /// World height of the terrain above `(x, z)`, from whatever sampler is
    /// already cached for that point. Points outside clamp to the border.
    pub fn pick_y(&self, x: f32, z: f32) -> Result<f32> {
        let uv = self
            .spatial_rect()
            .normalize(Vec2::new(x, z))
            .clamp(Vec2::ZERO, Vec2::ONE);
        let st = self.extent.tex_rect.lerp(uv);
        let sampler = lock_provider(&self.provider)?.find_sampler(GridRect::point(st), Detail::Any)?;
        Ok(sampler.sample_height(st.x, st.y) * self.extent.height + self.extent.origin.y)
    }

    /// World X/Z rectangle covered by the terrain.
    pub fn spatial_rect(&self) -> GridRect {
        let o = self.extent.origin;
        GridRect::new(o.x, o.z, o.x + self.extent.scale, o.z + self.extent.scale)
    }

    /// Tiles of this terrain (nested terrains excluded); 0 until prepared.
    pub fn tile_count(&self) -> usize {
        self.tiles().len()
    }

    /// Grid rectangles of this terrain's tiles, in tree order.
    pub fn tile_rects(&self) -> Vec<GridRect> {
        self.tiles().iter().map(|t| t.grid_rect()).collect()
    }

    pub fn tiles(&self) -> Vec<&TerrainTile> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.collect_tiles(&mut out);
        }
        out
    }

    pub fn root(&self) -> Option<&TerrainNode> {
        self.root.as_ref()
    }

    pub fn is_prepared(&self) -> bool {
        self.root.is_some()
    }

    pub fn is_set_up(&self) -> bool {
        self.set_up
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn geom_depth(&self) -> u32 {
        self.geom_depth
    }

    pub fn extent(&self) -> &TerrainExtent {
        &self.extent
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Tile handle pairs pinned and not yet released.
    pub fn outstanding_handles(&self) -> usize {
        self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::grid::{
        AppearanceId, FnSampler, GridSampler, GridSurface, HeightFieldSampler, RectSurface,
    };
    use crate::resource::{SpecDescriptor, SpecId};
    use std::sync::Arc;

    /// Level-0 ramp over the whole grid plus one level-1 spec per quadrant.
    fn provider() -> SharedProvider {
        let mut provider = GridResourceProvider::new();
        provider.add_sampler(SpecDescriptor::new(0, GridRect::unit()), |_| {
            Ok(Arc::new(FnSampler::new(|s: f32, t: f32| (s + t) * 0.5)) as Arc<dyn GridSampler>)
        });
        for iz in 0..2 {
            for ix in 0..2 {
                provider.add_sampler(
                    SpecDescriptor::new(1, GridRect::unit().subdivide(ix, iz, 2)),
                    |d| {
                        let data = vec![0.25; 4];
                        Ok(Arc::new(HeightFieldSampler::new(d.rect, 2, 2, data)?)
                            as Arc<dyn GridSampler>)
                    },
                );
            }
        }
        provider.add_surface(SpecDescriptor::new(0, GridRect::unit()), |d| {
            Ok(Arc::new(RectSurface::new(AppearanceId(1), d.rect)) as Arc<dyn GridSurface>)
        });
        provider.into_shared()
    }

    fn config() -> TerrainConfig {
        TerrainConfig {
            complexity: 3,
            ..Default::default()
        }
    }

    fn extent() -> TerrainExtent {
        TerrainExtent {
            origin: Vec3::new(100.0, 10.0, 200.0),
            scale: 64.0,
            height: 8.0,
            tex_rect: GridRect::unit(),
        }
    }

    fn sampler_refs(provider: &SharedProvider, id: usize) -> usize {
        lock_provider(provider)
            .unwrap()
            .samplers()
            .get(SpecId(id))
            .unwrap()
            .ref_count()
    }

    #[test]
    fn test_eager_terrain_builds_tiles() {
        let shared = provider();
        let terrain = ChunkedTerrain::new(shared.clone(), config(), extent()).unwrap();
        assert!(terrain.is_set_up());
        assert_eq!(terrain.tile_count(), 4);
        assert!(terrain.tiles().iter().all(|t| t.geometry().is_some()));
        assert_eq!(sampler_refs(&shared, 0), 4);
        assert_eq!(lock_provider(&shared).unwrap().outstanding_refs(), 8);
    }

    #[test]
    fn test_tile_rects_partition_grid() {
        let terrain = ChunkedTerrain::new(
            provider(),
            TerrainConfig { spatial_depth: 2, ..config() },
            extent(),
        )
        .unwrap();
        let rects = terrain.tile_rects();
        assert_eq!(rects.len(), 16);
        let area: f32 = rects.iter().map(|r| r.width() * r.height()).sum();
        assert!((area - 1.0).abs() < 1e-5);
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                assert_ne!(a, b);
            }
        }
        // Tiles sit where their grid rectangle says.
        for tile in terrain.tiles() {
            let expected = tile.grid_rect().center() * 64.0;
            let center = tile.spatial_rect().center() - Vec2::new(100.0, 200.0);
            assert!((center - expected).length() < 1e-3);
        }
    }

    #[test]
    fn test_single_tile_depth_zero() {
        let terrain = ChunkedTerrain::new(
            provider(),
            TerrainConfig { spatial_depth: 0, ..config() },
            extent(),
        )
        .unwrap();
        assert_eq!(terrain.tile_rects(), vec![GridRect::unit()]);
    }

    #[test]
    fn test_lazy_lifecycle_roundtrip() {
        let shared = provider();
        let mut terrain = ChunkedTerrain::new_lazy(shared.clone(), config(), extent()).unwrap();
        assert!(!terrain.is_prepared());
        assert_eq!(terrain.tile_count(), 0);
        assert_eq!(sampler_refs(&shared, 0), 0);

        terrain.prepare().unwrap();
        assert!(!terrain.is_set_up());
        terrain.set_up().unwrap();
        assert!(terrain.is_set_up());
        let first = terrain.tile_rects();

        terrain.tear_down().unwrap();
        assert!(!terrain.is_set_up());
        assert_eq!(terrain.tile_count(), 0);
        assert_eq!(sampler_refs(&shared, 0), 4);

        terrain.clean_up().unwrap();
        assert_eq!(lock_provider(&shared).unwrap().outstanding_refs(), 0);
        assert!(!lock_provider(&shared).unwrap().samplers().get(SpecId(0)).unwrap().is_cached());

        terrain.prepare().unwrap();
        terrain.set_up().unwrap();
        assert_eq!(terrain.tile_rects(), first);
        assert_eq!(sampler_refs(&shared, 0), 4);
    }

    #[test]
    fn test_set_up_tear_down_cycles_keep_refs_stable() {
        let shared = provider();
        let mut terrain = ChunkedTerrain::new_lazy(shared.clone(), config(), extent()).unwrap();
        for _ in 0..3 {
            terrain.set_up().unwrap();
            assert_eq!(terrain.outstanding_handles(), 4);
            assert_eq!(lock_provider(&shared).unwrap().outstanding_refs(), 8);
            terrain.tear_down().unwrap();
            assert_eq!(terrain.outstanding_handles(), 4);
            assert_eq!(lock_provider(&shared).unwrap().outstanding_refs(), 8);
        }
        // The ramp stayed pinned the whole time, so it was loaded once.
        let instantiations = lock_provider(&shared)
            .unwrap()
            .samplers()
            .get(SpecId(0))
            .unwrap()
            .instantiations();
        assert_eq!(instantiations, 1);

        terrain.clean_up().unwrap();
        assert_eq!(lock_provider(&shared).unwrap().outstanding_refs(), 0);
    }

    #[test]
    fn test_clean_up_releases_remaining_handles_after_error() {
        let shared = provider();
        let mut terrain = ChunkedTerrain::new(shared.clone(), config(), extent()).unwrap();
        let sampler = terrain.tiles()[0].handles().sampler.clone();
        {
            let mut provider = lock_provider(&shared).unwrap();
            for _ in 0..4 {
                provider.release_sampler(&sampler).unwrap();
            }
        }

        assert!(matches!(
            terrain.clean_up(),
            Err(Error::RefCountUnderflow { .. })
        ));
        assert_eq!(terrain.outstanding_handles(), 0);
        // Every surface pin was still released.
        assert_eq!(lock_provider(&shared).unwrap().outstanding_refs(), 0);
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let shared = provider();
        let mut terrain = ChunkedTerrain::new_lazy(shared.clone(), config(), extent()).unwrap();
        terrain.prepare().unwrap();
        terrain.prepare().unwrap();
        terrain.set_up().unwrap();
        assert_eq!(sampler_refs(&shared, 0), 4);
        assert_eq!(terrain.outstanding_handles(), 4);
    }

    #[test]
    fn test_pick_y() {
        let terrain = ChunkedTerrain::new(provider(), config(), extent()).unwrap();
        // Ramp (s + t) / 2 scaled by 8 above y = 10.
        let y = terrain.pick_y(100.0 + 32.0, 200.0 + 32.0).unwrap();
        assert!((y - 14.0).abs() < 1e-4);
        let corner = terrain.pick_y(0.0, 0.0).unwrap();
        assert!((corner - 10.0).abs() < 1e-4);
        let far = terrain.pick_y(1000.0, 1000.0).unwrap();
        assert!((far - 18.0).abs() < 1e-4);
    }

    #[test]
    fn test_pick_y_does_not_pin() {
        let shared = provider();
        let terrain = ChunkedTerrain::new_lazy(shared.clone(), config(), extent()).unwrap();
        terrain.pick_y(110.0, 210.0).unwrap();
        assert_eq!(lock_provider(&shared).unwrap().outstanding_refs(), 0);
    }

    #[test]
    fn test_nested_lod_streams_finer_terrain() {
        let shared = provider();
        let mut terrain = ChunkedTerrain::new(
            shared.clone(),
            TerrainConfig { max_geom_depth: 1, lod_factor: 0.5, ..config() },
            extent(),
        )
        .unwrap();
        assert_eq!(terrain.tile_count(), 4);
        // Finer terrains are lazy, so only the level-0 ramp is pinned.
        assert_eq!(lock_provider(&shared).unwrap().outstanding_refs(), 8);

        let far = Vec3::new(-1000.0, 0.0, -1000.0);
        terrain.update_lod(far).unwrap();
        assert_eq!(terrain.visible_tiles(far).len(), 4);

        // Over the first tile's center; the switch distance is 16.
        let near = Vec3::new(116.0, 10.0, 216.0);
        terrain.update_lod(near).unwrap();
        let visible = terrain.visible_tiles(near);
        assert_eq!(visible.len(), 3 + 4);
        // Level-1 quadrant spec pinned by the four finer tiles.
        assert_eq!(sampler_refs(&shared, 1), 4);

        terrain.update_lod(far).unwrap();
        assert_eq!(sampler_refs(&shared, 1), 0);
        assert_eq!(terrain.visible_tiles(far).len(), 4);
    }

    #[test]
    fn test_tear_down_cascades_to_nested() {
        let shared = provider();
        let mut terrain = ChunkedTerrain::new(
            shared.clone(),
            TerrainConfig { max_geom_depth: 1, lod_factor: 0.5, ..config() },
            extent(),
        )
        .unwrap();
        terrain.update_lod(Vec3::new(116.0, 10.0, 216.0)).unwrap();
        assert!(lock_provider(&shared).unwrap().outstanding_refs() > 8);

        terrain.clean_up().unwrap();
        assert_eq!(lock_provider(&shared).unwrap().outstanding_refs(), 0);
    }

    #[test]
    fn test_invalid_construction() {
        assert!(matches!(
            ChunkedTerrain::new(provider(), TerrainConfig { complexity: 0, ..config() }, extent()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(ChunkedTerrain::new(
            provider(),
            config(),
            TerrainExtent { scale: 0.0, ..extent() }
        )
        .is_err());
    }

    #[test]
    fn test_missing_surface_unpins_sampler() {
        let mut bare = GridResourceProvider::new();
        bare.add_sampler(SpecDescriptor::new(0, GridRect::unit()), |_| {
            Ok(Arc::new(FnSampler::new(|_s: f32, _t: f32| 0.0)) as Arc<dyn GridSampler>)
        });
        let shared = bare.into_shared();
        let mut terrain = ChunkedTerrain::new_lazy(shared.clone(), config(), extent()).unwrap();
        assert!(matches!(
            terrain.prepare(),
            Err(Error::NoMatchingSpec { .. })
        ));
        assert!(!terrain.is_prepared());
        assert_eq!(terrain.outstanding_handles(), 0);
        assert_eq!(sampler_refs(&shared, 0), 0);
    }
}
