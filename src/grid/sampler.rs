//! Height samplers: the data sources the triangulator refines over
//!
//! Samplers are evaluated in global normalized grid coordinates. A sampler
//! registered for a sub-rectangle of the grid only has to answer inside
//! that rectangle; heights are conventionally normalized to `[0, 1]` and
//! rescaled by the consumer's height factor.

use std::sync::RwLock;

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use super::GridResource;
use crate::core::error::Error;
use crate::core::types::{Result, Vec2, Vec3};
use crate::math::GridRect;

/// Step used by the finite-difference defaults, in grid units.
const SLOPE_EPSILON: f32 = 1.0 / 1024.0;

/// Source of height data over normalized grid coordinates.
pub trait GridSampler: GridResource {
    /// Height at `(s, t)`.
    fn sample_height(&self, s: f32, t: f32) -> f32;

    /// Surface normal at `(s, t)`, in grid space with +Y up.
    fn sample_normal(&self, s: f32, t: f32) -> Vec3 {
        let g = gradient(self, s, t);
        Vec3::new(-g.x, 1.0, -g.y).normalize()
    }

    /// Unit tangent along +s.
    fn sample_tangent(&self, s: f32, t: f32) -> Vec3 {
        let g = gradient(self, s, t);
        Vec3::new(1.0, g.x, 0.0).normalize()
    }

    /// Unit binormal along +t.
    fn sample_binormal(&self, s: f32, t: f32) -> Vec3 {
        let g = gradient(self, s, t);
        Vec3::new(0.0, g.y, 1.0).normalize()
    }
}

/// Central-difference height gradient `(dh/ds, dh/dt)`.
fn gradient<S: GridSampler + ?Sized>(sampler: &S, s: f32, t: f32) -> Vec2 {
    let e = SLOPE_EPSILON;
    Vec2::new(
        (sampler.sample_height(s + e, t) - sampler.sample_height(s - e, t)) / (2.0 * e),
        (sampler.sample_height(s, t + e) - sampler.sample_height(s, t - e)) / (2.0 * e),
    )
}

/// Constant-height sampler.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatSampler {
    pub height: f32,
}

impl FlatSampler {
    pub fn new(height: f32) -> Self {
        Self { height }
    }
}

impl GridResource for FlatSampler {}

impl GridSampler for FlatSampler {
    fn sample_height(&self, _s: f32, _t: f32) -> f32 {
        self.height
    }

    fn sample_normal(&self, _s: f32, _t: f32) -> Vec3 {
        Vec3::Y
    }
}

/// Sampler backed by a closure `(s, t) -> height`.
pub struct FnSampler<F> {
    f: F,
}

impl<F> FnSampler<F>
where
    F: Fn(f32, f32) -> f32 + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> GridResource for FnSampler<F> where F: Fn(f32, f32) -> f32 + Send + Sync {}

impl<F> GridSampler for FnSampler<F>
where
    F: Fn(f32, f32) -> f32 + Send + Sync,
{
    fn sample_height(&self, s: f32, t: f32) -> f32 {
        (self.f)(s, t)
    }
}

/// Bilinearly interpolated height array covering a rectangle of grid space.
///
/// `release()` frees the backing array; a released sampler answers `0.0`.
#[derive(Debug)]
pub struct HeightFieldSampler {
    rect: GridRect,
    width: usize,
    depth: usize,
    data: RwLock<Vec<f32>>,
}

impl HeightFieldSampler {
    /// Wrap a row-major `width × depth` array (rows run along +t).
    pub fn new(rect: GridRect, width: usize, depth: usize, data: Vec<f32>) -> Result<Self> {
        if width < 2 || depth < 2 {
            return Err(Error::InvalidArgument(format!(
                "height field needs at least 2x2 samples, got {}x{}",
                width, depth
            )));
        }
        if data.len() != width * depth {
            return Err(Error::InvalidArgument(format!(
                "height field expects {} samples, got {}",
                width * depth,
                data.len()
            )));
        }
        Ok(Self {
            rect,
            width,
            depth,
            data: RwLock::new(data),
        })
    }

    pub fn rect(&self) -> GridRect {
        self.rect
    }

    /// True once `release()` has dropped the samples.
    pub fn is_released(&self) -> bool {
        self.data.read().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

impl GridResource for HeightFieldSampler {
    fn release(&self) {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.clear();
        data.shrink_to_fit();
    }
}

impl GridSampler for HeightFieldSampler {
    fn sample_height(&self, s: f32, t: f32) -> f32 {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        if data.is_empty() {
            return 0.0;
        }

        let uv = self.rect.normalize(Vec2::new(s, t)).clamp(Vec2::ZERO, Vec2::ONE);
        let fx = uv.x * (self.width - 1) as f32;
        let fy = uv.y * (self.depth - 1) as f32;
        let x0 = (fx.floor() as usize).min(self.width - 2);
        let y0 = (fy.floor() as usize).min(self.depth - 2);
        let ax = fx - x0 as f32;
        let ay = fy - y0 as f32;

        let at = |x: usize, y: usize| data[y * self.width + x];
        let south = at(x0, y0) * (1.0 - ax) + at(x0 + 1, y0) * ax;
        let north = at(x0, y0 + 1) * (1.0 - ax) + at(x0 + 1, y0 + 1) * ax;
        south * (1.0 - ay) + north * ay
    }
}

/// Parameters for [`NoiseSampler`]
#[derive(Clone, Debug)]
pub struct NoiseParams {
    pub seed: u32,
    pub frequency: f32,   // Noise periods across the unit grid
    pub octaves: u32,     // FBM octaves (detail levels)
    pub persistence: f32, // FBM persistence (0.5 typical)
    pub lacunarity: f32,  // FBM lacunarity (2.0 typical)
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            frequency: 4.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Procedural fractal Brownian motion heights, normalized to `[0, 1]`.
pub struct NoiseSampler {
    params: NoiseParams,
    noise: Fbm<Perlin>,
}

impl NoiseSampler {
    pub fn new(params: NoiseParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { params, noise }
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }
}

impl GridResource for NoiseSampler {}

impl GridSampler for NoiseSampler {
    fn sample_height(&self, s: f32, t: f32) -> f32 {
        let nx = (s * self.params.frequency) as f64;
        let nz = (t * self.params.frequency) as f64;
        let value = self.noise.get([nx, nz]);
        (((value + 1.0) / 2.0) as f32).clamp(0.0, 1.0)
    }
}
