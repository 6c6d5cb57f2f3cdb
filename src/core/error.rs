//! Error types for the terrain core

use thiserror::Error;

use crate::math::GridRect;
use crate::resource::ResourceKind;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A resource spec was released more often than it was acquired.
    #[error("Reference count underflow on {kind} spec (detail {detail}, rect {rect})")]
    RefCountUnderflow {
        kind: ResourceKind,
        detail: u32,
        rect: GridRect,
    },

    #[error("No {kind} spec covers {rect}")]
    NoMatchingSpec { kind: ResourceKind, rect: GridRect },

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
