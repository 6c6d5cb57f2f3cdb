//! Resource specs: one lazily instantiated, reference-counted cache entry
//! per detail level and grid rectangle.

use std::fmt;
use std::sync::Arc;

use super::{Detail, FallbackPolicy, ResourceKind};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::grid::GridResource;
use crate::math::GridRect;

/// Index of a spec inside its [`SpecTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecId(pub usize);

/// Static description of a cached resource variant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpecDescriptor {
    /// Resolution tier, 0 = coarsest.
    pub detail: u32,
    /// Region of grid space the resource can answer for.
    pub rect: GridRect,
    /// Lower bound hint for sampled values.
    pub min_value: f32,
    /// Upper bound hint for sampled values.
    pub max_value: f32,
}

impl SpecDescriptor {
    pub fn new(detail: u32, rect: GridRect) -> Self {
        Self {
            detail,
            rect,
            min_value: 0.0,
            max_value: 1.0,
        }
    }

    pub fn with_range(mut self, min_value: f32, max_value: f32) -> Self {
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }
}

/// Constructs the concrete resource the first time a spec is used.
pub type Loader<T> = Box<dyn Fn(&SpecDescriptor) -> Result<Arc<T>> + Send + Sync>;

/// One cache entry.
///
/// Invariant: the cached instance is present iff `ref_count > 0`, or it was
/// instantiated by an unpinned lookup and not referenced since.
pub struct ResourceSpec<T: ?Sized> {
    descriptor: SpecDescriptor,
    loader: Loader<T>,
    cached: Option<Arc<T>>,
    ref_count: usize,
    instantiations: usize,
}

impl<T: ?Sized + GridResource> ResourceSpec<T> {
    pub fn new(descriptor: SpecDescriptor, loader: Loader<T>) -> Self {
        Self {
            descriptor,
            loader,
            cached: None,
            ref_count: 0,
            instantiations: 0,
        }
    }

    pub fn descriptor(&self) -> &SpecDescriptor {
        &self.descriptor
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    /// How many times the loader has run.
    pub fn instantiations(&self) -> usize {
        self.instantiations
    }

    fn instantiate(&mut self, kind: ResourceKind) -> Result<Arc<T>> {
        if let Some(resource) = &self.cached {
            return Ok(resource.clone());
        }

        let resource = (self.loader)(&self.descriptor).map_err(|e| {
            Error::Resource(format!(
                "failed to load {} (detail {}, rect {}): {}",
                kind, self.descriptor.detail, self.descriptor.rect, e
            ))
        })?;
        self.instantiations += 1;
        log::debug!(
            "Instantiated {} (detail {}, rect {})",
            kind,
            self.descriptor.detail,
            self.descriptor.rect
        );
        self.cached = Some(resource.clone());
        Ok(resource)
    }

    fn acquire(&mut self, kind: ResourceKind, pin: bool) -> Result<Arc<T>> {
        let resource = self.instantiate(kind)?;
        if pin {
            self.ref_count += 1;
        }
        Ok(resource)
    }

    /// Drop one reference. Returns `true` when the resource was evicted.
    fn release(&mut self, kind: ResourceKind) -> Result<bool> {
        if self.ref_count == 0 {
            return Err(Error::RefCountUnderflow {
                kind,
                detail: self.descriptor.detail,
                rect: self.descriptor.rect,
            });
        }

        self.ref_count -= 1;
        if self.ref_count > 0 {
            return Ok(false);
        }

        if let Some(resource) = self.cached.take() {
            resource.release();
            log::debug!(
                "Evicted {} (detail {}, rect {})",
                kind,
                self.descriptor.detail,
                self.descriptor.rect
            );
        }
        Ok(true)
    }
}

/// A resource handed out by the provider, valid until released.
pub struct Acquired<T: ?Sized> {
    spec: SpecId,
    resource: Arc<T>,
    pinned: bool,
}

impl<T: ?Sized> Acquired<T> {
    pub fn spec(&self) -> SpecId {
        self.spec
    }

    pub fn resource(&self) -> &Arc<T> {
        &self.resource
    }

    /// True if acquiring this handle incremented the spec's reference count.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }
}

impl<T: ?Sized> Clone for Acquired<T> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec,
            resource: self.resource.clone(),
            pinned: self.pinned,
        }
    }
}

impl<T: ?Sized> std::ops::Deref for Acquired<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.resource
    }
}

impl<T: ?Sized> fmt::Debug for Acquired<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquired")
            .field("spec", &self.spec)
            .field("pinned", &self.pinned)
            .finish()
    }
}

/// Arena of specs of one resource kind, shared selection and refcount logic.
pub struct SpecTable<T: ?Sized> {
    kind: ResourceKind,
    specs: Vec<ResourceSpec<T>>,
}

impl<T: ?Sized + GridResource> SpecTable<T> {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            specs: Vec::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn add(&mut self, spec: ResourceSpec<T>) -> SpecId {
        self.specs.push(spec);
        SpecId(self.specs.len() - 1)
    }

    pub fn get(&self, id: SpecId) -> Option<&ResourceSpec<T>> {
        self.specs.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpecId, &ResourceSpec<T>)> {
        self.specs.iter().enumerate().map(|(i, s)| (SpecId(i), s))
    }

    /// Best spec for `rect` at `detail`, or `None` if no rectangle contains it.
    ///
    /// `Level(d)` picks the containing spec whose detail is the closest value
    /// not above `d`, falling back to the coarsest containing spec. `Any`
    /// prefers the finest spec that is already cached.
    pub fn select(&self, rect: &GridRect, detail: Detail) -> Option<SpecId> {
        let containing = move || {
            self.iter()
                .filter(move |(_, s)| s.descriptor.rect.contains_rect(rect))
        };
        // Ties keep the earliest registered spec
        let finest = |best: Option<(SpecId, u32)>, (id, d): (SpecId, u32)| match best {
            Some((_, bd)) if bd >= d => best,
            _ => Some((id, d)),
        };
        let coarsest = move || {
            containing()
                .map(|(id, s)| (id, s.descriptor.detail))
                .fold(None, |best: Option<(SpecId, u32)>, (id, d)| match best {
                    Some((_, bd)) if bd <= d => best,
                    _ => Some((id, d)),
                })
                .map(|(id, _)| id)
        };

        let preferred = match detail {
            Detail::Level(level) => containing()
                .map(|(id, s)| (id, s.descriptor.detail))
                .filter(|&(_, d)| d <= level)
                .fold(None, finest),
            Detail::Any => containing()
                .filter(|(_, s)| s.is_cached())
                .map(|(id, s)| (id, s.descriptor.detail))
                .fold(None, finest),
        };

        preferred.map(|(id, _)| id).or_else(coarsest)
    }

    /// Look up, lazily instantiate, and (for concrete levels) pin a resource.
    pub fn find(
        &mut self,
        rect: &GridRect,
        detail: Detail,
        policy: FallbackPolicy,
    ) -> Result<Acquired<T>> {
        let id = match self.select(rect, detail) {
            Some(id) => id,
            None if self.specs.is_empty() || policy == FallbackPolicy::Strict => {
                return Err(Error::NoMatchingSpec {
                    kind: self.kind,
                    rect: *rect,
                });
            }
            None => {
                log::warn!(
                    "No {} spec covers {}, falling back to the first registered spec",
                    self.kind,
                    rect
                );
                SpecId(0)
            }
        };

        let pinned = matches!(detail, Detail::Level(_));
        let kind = self.kind;
        let resource = self.specs[id.0].acquire(kind, pinned)?;
        Ok(Acquired {
            spec: id,
            resource,
            pinned,
        })
    }

    /// Release a handle obtained from [`SpecTable::find`].
    ///
    /// Unpinned handles never touched the reference count and are ignored.
    /// Releasing more often than acquiring is an error.
    pub fn release(&mut self, handle: &Acquired<T>) -> Result<()> {
        if !handle.pinned {
            log::trace!("Ignoring release of unpinned {} handle {:?}", self.kind, handle.spec);
            return Ok(());
        }

        let kind = self.kind;
        let spec = self.specs.get_mut(handle.spec.0).ok_or_else(|| {
            Error::Resource(format!("unknown {} spec {:?}", kind, handle.spec))
        })?;
        spec.release(kind)?;
        Ok(())
    }
}
