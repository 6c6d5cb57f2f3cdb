//! Grid data sources: height samplers and texture surfaces

pub mod sampler;
pub mod surface;

pub use sampler::{
    FlatSampler, FnSampler, GridSampler, HeightFieldSampler, NoiseParams, NoiseSampler,
};
pub use surface::{AppearanceId, GridSurface, RectSurface};

/// Anything the resource provider caches and eventually evicts.
pub trait GridResource: Send + Sync {
    /// Free secondary memory (backing arrays, decoded images).
    ///
    /// Called exactly once when the owning spec's reference count drops to
    /// zero. The resource may still be referenced afterwards and must stay
    /// memory safe, but its contents are unspecified.
    fn release(&self) {}
}
