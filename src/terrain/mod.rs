//! Chunked level-of-detail terrain
//!
//! A [`ChunkedTerrain`] covers a square of world space with a quadtree of
//! [`TerrainTile`]s. Each tile pins a sampler and a surface from the shared
//! resource provider and triangulates them with its own
//! [`GridTriangulator`](crate::triangulator::GridTriangulator). Tiles can
//! carry a lazily built finer terrain behind a [`LodSwitch`].

pub mod chunked;
pub mod config;
pub mod lod;
pub mod tile;

pub use chunked::{ChunkedTerrain, TerrainExtent, TerrainNode};
pub use config::{MAX_SPATIAL_DEPTH, TerrainConfig};
pub use lod::{LodChoice, LodSwitch};
pub use tile::{TerrainTile, TileCoord, TileGeometry, TileHandles};
