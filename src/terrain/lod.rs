//! Distance switch between a coarse tile and its nested finer terrain

use glam::Vec3;

use crate::core::error::Error;
use crate::core::types::Result;

/// Which alternative of a switch to draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LodChoice {
    Coarse,
    Fine,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodSwitch {
    center: Vec3,
    threshold: f32,
}

impl LodSwitch {
    pub fn new(center: Vec3, threshold: f32) -> Result<Self> {
        if threshold.is_nan() || threshold <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "lod threshold must be positive, got {}",
                threshold
            )));
        }
        Ok(Self { center, threshold })
    }

    /// Fine strictly inside the threshold distance, coarse at or beyond it.
    pub fn select(&self, eye: Vec3) -> LodChoice {
        if eye.distance(self.center) < self.threshold {
            LodChoice::Fine
        } else {
            LodChoice::Coarse
        }
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}
