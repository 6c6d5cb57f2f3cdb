//! Strata - chunked level-of-detail terrain triangulation

pub mod core;
pub mod math;
pub mod grid;
pub mod resource;
pub mod triangulator;
pub mod terrain;
