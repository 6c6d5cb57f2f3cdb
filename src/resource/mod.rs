//! Reference-counted cache of samplers and surfaces
//!
//! A [`GridResourceProvider`] holds one [`SpecTable`] per resource kind.
//! Each [`ResourceSpec`] describes a variant at some detail level over a
//! rectangle of grid space; the concrete resource is built lazily on first
//! lookup and evicted when the last pinned handle is released.

pub mod provider;
pub mod spec;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use provider::{lock_provider, GridResourceProvider, SharedProvider};
pub use spec::{Acquired, Loader, ResourceSpec, SpecDescriptor, SpecId, SpecTable};

/// Which cache a spec belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Sampler,
    Surface,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Sampler => write!(f, "sampler"),
            ResourceKind::Surface => write!(f, "surface"),
        }
    }
}

/// Requested resolution of a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detail {
    /// Closest level not above this one; the handle pins the spec.
    Level(u32),
    /// Whatever is already cached, any level; never pins.
    Any,
}

/// What to do when no spec rectangle contains the query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackPolicy {
    /// Log a warning and use the first registered spec.
    #[default]
    FirstSpec,
    /// Fail with [`Error::NoMatchingSpec`](crate::core::Error::NoMatchingSpec).
    Strict,
}
