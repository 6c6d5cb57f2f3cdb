//! Geometric helpers shared by the resource cache and the terrain tree

pub mod aabb;
pub mod rect;

pub use aabb::Aabb;
pub use rect::GridRect;
