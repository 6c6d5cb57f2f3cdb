//! One leaf of the terrain quadtree

use glam::{Vec2, Vec3};

use super::config::TerrainConfig;
use crate::core::types::Result;
use crate::grid::{AppearanceId, GridSampler, GridSurface};
use crate::math::{Aabb, GridRect};
use crate::resource::Acquired;
use crate::triangulator::GridTriangulator;

/// Tile index within its terrain, `(0, 0)` at the origin corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub ix: u32,
    pub iz: u32,
}

/// Renderer-facing buffers of a tile, in tile-local coordinates.
#[derive(Clone, Debug)]
pub struct TileGeometry {
    pub coordinates: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// One coordinate array per texture unit of the surface.
    pub tex_coords: Vec<Vec<Vec2>>,
    /// Triangle strip; skip the first entry when drawing.
    pub index: Vec<u32>,
    pub appearance: AppearanceId,
    /// Add to local coordinates to get world positions.
    pub translation: Vec3,
    /// World-space bounds of the tile surface.
    pub bounds: Aabb,
}

/// Sampler/surface pair a tile pinned in the provider.
#[derive(Clone, Debug)]
pub struct TileHandles {
    pub sampler: Acquired<dyn GridSampler>,
    pub surface: Acquired<dyn GridSurface>,
}

pub struct TerrainTile {
    coord: TileCoord,
    spatial_rect: GridRect,
    grid_rect: GridRect,
    translation: Vec3,
    handles: TileHandles,
    triangulator: GridTriangulator,
    geometry: Option<TileGeometry>,
}

impl TerrainTile {
    /// Set up the triangulator for world rectangle `spatial_rect` (X/Z),
    /// sampling `grid_rect`. Coordinates are emitted relative to the tile's
    /// center at `elevation`.
    pub fn new(
        coord: TileCoord,
        spatial_rect: GridRect,
        grid_rect: GridRect,
        elevation: f32,
        height: f32,
        config: &TerrainConfig,
        handles: TileHandles,
    ) -> Result<Self> {
        let center = spatial_rect.center();
        let translation = Vec3::new(center.x, elevation, center.y);

        let mut triangulator =
            GridTriangulator::new(handles.sampler.resource().clone(), config.complexity)?
                .with_tolerance(config.tolerance);
        triangulator.set_spatial_bounds(spatial_rect, elevation, height);
        triangulator.set_grid_bounds(grid_rect);
        triangulator.set_offset(translation);
        triangulator.set_skirt_depth(config.skirt_depth);

        Ok(Self {
            coord,
            spatial_rect,
            grid_rect,
            translation,
            handles,
            triangulator,
            geometry: None,
        })
    }

    /// Triangulate and map texture coordinates, caching the result.
    pub fn build_geometry(&mut self) -> &TileGeometry {
        let tri = &mut self.triangulator;
        let index = tri.index().to_vec();
        let coordinates = tri.coordinates().to_vec();
        let normals = tri.normals().to_vec();
        let grid_vertices = tri.mesh().vertex_map().grid_vertices();

        let surface = &self.handles.surface;
        let grid_coords = tri.grid_coords();
        let tex_coords = (0..surface.texture_units())
            .map(|unit| {
                grid_coords
                    .iter()
                    .map(|st| surface.map(st.x, st.y, unit))
                    .collect()
            })
            .collect();

        // Skirts hang below the surface and stay out of the bounds.
        let bounds = Aabb::from_points(&coordinates[..grid_vertices])
            .unwrap_or_default()
            .translated(self.translation);

        log::trace!(
            "Tile ({}, {}): {} strip indices",
            self.coord.ix,
            self.coord.iz,
            index.len()
        );

        self.geometry.insert(TileGeometry {
            coordinates,
            normals,
            tex_coords,
            index,
            appearance: surface.appearance(),
            translation: self.translation,
            bounds,
        })
    }

    pub fn geometry(&self) -> Option<&TileGeometry> {
        self.geometry.as_ref()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.geometry.as_ref().map(|g| g.bounds)
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// World X/Z rectangle.
    pub fn spatial_rect(&self) -> GridRect {
        self.spatial_rect
    }

    /// Grid-space rectangle the tile samples.
    pub fn grid_rect(&self) -> GridRect {
        self.grid_rect
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn handles(&self) -> &TileHandles {
        &self.handles
    }

    pub fn triangulator_mut(&mut self) -> &mut GridTriangulator {
        &mut self.triangulator
    }
}
