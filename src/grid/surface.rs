//! Texture surfaces: map grid coordinates to texture coordinates

use super::GridResource;
use crate::core::types::Vec2;
use crate::math::GridRect;

/// Opaque handle to an externally owned appearance (material, texture set).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AppearanceId(pub u64);

/// Texture-coordinate source for one tile or region.
pub trait GridSurface: GridResource {
    /// Appearance the renderer should bind for this surface.
    fn appearance(&self) -> AppearanceId;

    /// Number of texture units `map` can answer for.
    fn texture_units(&self) -> usize;

    /// Texture coordinate of grid point `(s, t)` for `unit`.
    fn map(&self, s: f32, t: f32, unit: usize) -> Vec2;
}

/// Surface whose texture covers one rectangle of grid space.
///
/// Unit 0 stretches the texture once across the rectangle; each further
/// unit repeats it `repeat[unit]` times (detail maps).
#[derive(Clone, Debug)]
pub struct RectSurface {
    appearance: AppearanceId,
    rect: GridRect,
    repeat: Vec<f32>,
}

impl RectSurface {
    /// Single-unit surface.
    pub fn new(appearance: AppearanceId, rect: GridRect) -> Self {
        Self {
            appearance,
            rect,
            repeat: vec![1.0],
        }
    }

    /// Add a detail unit repeating `repeat` times across the rectangle.
    pub fn with_detail_unit(mut self, repeat: f32) -> Self {
        self.repeat.push(repeat);
        self
    }

    pub fn rect(&self) -> GridRect {
        self.rect
    }
}

impl GridResource for RectSurface {}

impl GridSurface for RectSurface {
    fn appearance(&self) -> AppearanceId {
        self.appearance
    }

    fn texture_units(&self) -> usize {
        self.repeat.len()
    }

    fn map(&self, s: f32, t: f32, unit: usize) -> Vec2 {
        let repeat = self.repeat.get(unit).copied().unwrap_or(1.0);
        self.rect.normalize(Vec2::new(s, t)) * repeat
    }
}
