//! Chunked terrain configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::resource::FallbackPolicy;
use crate::triangulator::{DEFAULT_SKIRT_DEPTH, DEFAULT_TOLERANCE, LogicalGrid};

/// Deepest accepted quadtree.
pub const MAX_SPATIAL_DEPTH: u32 = 8;

/// Tuning for a [`ChunkedTerrain`](super::ChunkedTerrain) and every nested
/// terrain it spawns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Per-tile grid exponent (`2^c + 1` samples per side)
    pub complexity: u32,
    /// Tolerance of the pass that fixes each tile's vertex mapping
    pub tolerance: f32,
    /// Skirt drop below tile borders, in world units
    pub skirt_depth: f32,
    /// Quadtree depth; each terrain holds `2^d × 2^d` tiles
    pub spatial_depth: u32,
    /// Deepest nested LOD level
    pub max_geom_depth: u32,
    /// LOD switch distance as a multiple of the tile size
    pub lod_factor: f32,
    /// What the provider does when no spec covers a tile
    pub fallback: FallbackPolicy,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            complexity: 4,
            tolerance: DEFAULT_TOLERANCE,
            skirt_depth: DEFAULT_SKIRT_DEPTH,
            spatial_depth: 1,
            max_geom_depth: 0,
            lod_factor: 1.5,
            fallback: FallbackPolicy::FirstSpec,
        }
    }
}

impl TerrainConfig {
    pub fn validate(&self) -> Result<()> {
        LogicalGrid::new(self.complexity)?;
        if self.spatial_depth > MAX_SPATIAL_DEPTH {
            return Err(Error::InvalidArgument(format!(
                "spatial depth {} exceeds {}",
                self.spatial_depth, MAX_SPATIAL_DEPTH
            )));
        }
        if self.lod_factor.is_nan() || self.lod_factor <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "lod factor must be positive, got {}",
                self.lod_factor
            )));
        }
        if self.skirt_depth < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "skirt depth must not be negative, got {}",
                self.skirt_depth
            )));
        }
        Ok(())
    }

    /// Tiles along one side of a terrain.
    pub fn tiles_per_side(&self) -> u32 {
        1 << self.spatial_depth
    }

    /// Save as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
