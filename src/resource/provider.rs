//! Provider owning the sampler and surface caches for a terrain

use std::sync::{Arc, Mutex, MutexGuard};

use super::spec::{Acquired, Loader, ResourceSpec, SpecDescriptor, SpecId, SpecTable};
use super::{Detail, FallbackPolicy, ResourceKind};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::grid::{GridSampler, GridSurface};
use crate::math::GridRect;

/// Provider shared by every node of a chunked terrain.
///
/// All spec lookups and reference-count changes go through this one lock.
pub type SharedProvider = Arc<Mutex<GridResourceProvider>>;

/// Lock a shared provider, reporting poisoning as a resource error.
pub fn lock_provider(provider: &SharedProvider) -> Result<MutexGuard<'_, GridResourceProvider>> {
    provider
        .lock()
        .map_err(|_| Error::Resource("resource provider lock poisoned".into()))
}

/// Cache of height samplers and texture surfaces keyed by detail level and
/// grid rectangle.
pub struct GridResourceProvider {
    samplers: SpecTable<dyn GridSampler>,
    surfaces: SpecTable<dyn GridSurface>,
    fallback: FallbackPolicy,
}

impl GridResourceProvider {
    pub fn new() -> Self {
        Self::with_fallback(FallbackPolicy::default())
    }

    pub fn with_fallback(fallback: FallbackPolicy) -> Self {
        Self {
            samplers: SpecTable::new(ResourceKind::Sampler),
            surfaces: SpecTable::new(ResourceKind::Surface),
            fallback,
        }
    }

    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    pub fn set_fallback(&mut self, fallback: FallbackPolicy) {
        self.fallback = fallback;
    }

    /// Wrap into the shared, lock-protected form used by [`ChunkedTerrain`].
    ///
    /// [`ChunkedTerrain`]: crate::terrain::ChunkedTerrain
    pub fn into_shared(self) -> SharedProvider {
        Arc::new(Mutex::new(self))
    }

    /// Register a sampler spec whose instance `loader` builds on first use.
    pub fn add_sampler<F>(&mut self, descriptor: SpecDescriptor, loader: F) -> SpecId
    where
        F: Fn(&SpecDescriptor) -> Result<Arc<dyn GridSampler>> + Send + Sync + 'static,
    {
        let loader: Loader<dyn GridSampler> = Box::new(loader);
        self.samplers.add(ResourceSpec::new(descriptor, loader))
    }

    /// Register a sampler spec backed by an existing instance.
    pub fn add_sampler_resource(
        &mut self,
        descriptor: SpecDescriptor,
        sampler: Arc<dyn GridSampler>,
    ) -> SpecId {
        self.add_sampler(descriptor, move |_| Ok(sampler.clone()))
    }

    /// Register a surface spec whose instance `loader` builds on first use.
    pub fn add_surface<F>(&mut self, descriptor: SpecDescriptor, loader: F) -> SpecId
    where
        F: Fn(&SpecDescriptor) -> Result<Arc<dyn GridSurface>> + Send + Sync + 'static,
    {
        let loader: Loader<dyn GridSurface> = Box::new(loader);
        self.surfaces.add(ResourceSpec::new(descriptor, loader))
    }

    /// Register a surface spec backed by an existing instance.
    pub fn add_surface_resource(
        &mut self,
        descriptor: SpecDescriptor,
        surface: Arc<dyn GridSurface>,
    ) -> SpecId {
        self.add_surface(descriptor, move |_| Ok(surface.clone()))
    }

    /// Best sampler for `rect` at `detail`; pins it unless `detail` is `Any`.
    pub fn find_sampler(&mut self, rect: GridRect, detail: Detail) -> Result<Acquired<dyn GridSampler>> {
        self.samplers.find(&rect, detail, self.fallback)
    }

    /// Best surface for `rect` at `detail`; pins it unless `detail` is `Any`.
    pub fn find_surface(&mut self, rect: GridRect, detail: Detail) -> Result<Acquired<dyn GridSurface>> {
        self.surfaces.find(&rect, detail, self.fallback)
    }

    pub fn release_sampler(&mut self, handle: &Acquired<dyn GridSampler>) -> Result<()> {
        self.samplers.release(handle)
    }

    pub fn release_surface(&mut self, handle: &Acquired<dyn GridSurface>) -> Result<()> {
        self.surfaces.release(handle)
    }

    pub fn samplers(&self) -> &SpecTable<dyn GridSampler> {
        &self.samplers
    }

    pub fn surfaces(&self) -> &SpecTable<dyn GridSurface> {
        &self.surfaces
    }

    /// Sum of outstanding pins over both kinds.
    pub fn outstanding_refs(&self) -> usize {
        self.samplers.iter().map(|(_, s)| s.ref_count()).sum::<usize>()
            + self.surfaces.iter().map(|(_, s)| s.ref_count()).sum::<usize>()
    }
}

impl Default for GridResourceProvider {
    fn default() -> Self {
        Self::new()
    }
}
