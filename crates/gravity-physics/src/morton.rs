//! Morton (Z-order) keys over a 2-D quantization window

use glam::Vec2;
use rayon::prelude::*;
use thiserror::Error;

use crate::constants::MORTON_GRID_RESOLUTION;

/// Smallest half-extent [`QuantizationWindow::fit`] will produce
pub const MIN_WINDOW_HALF_EXTENT: f32 = 1.0e-3;

/// Margin added around the bounding box by [`QuantizationWindow::fit`]
const FIT_PADDING: f32 = 1.05;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WindowError {
    #[error("window center {0} is not finite")]
    NonFiniteCenter(Vec2),
    #[error("window half-extent {0} must be positive and finite on both axes")]
    Degenerate(Vec2),
    #[error("cannot fit a window around zero positions")]
    NoPositions,
}

/// Axis-aligned region that positions are quantized against.
///
/// Positions outside the window clamp to its border, so they still get a
/// valid key; they just lose spatial resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationWindow {
    center: Vec2,
    half_extent: Vec2,
}

impl QuantizationWindow {
    pub fn new(center: Vec2, half_extent: Vec2) -> Result<Self, WindowError> {
        if !center.is_finite() {
            return Err(WindowError::NonFiniteCenter(center));
        }
        if !half_extent.is_finite() || half_extent.x <= 0.0 || half_extent.y <= 0.0 {
            return Err(WindowError::Degenerate(half_extent));
        }
        Ok(Self {
            center,
            half_extent,
        })
    }

    /// Square window around the bounding box of `positions`, slightly padded
    pub fn fit(positions: &[Vec2]) -> Result<Self, WindowError> {
        let first = *positions.first().ok_or(WindowError::NoPositions)?;
        let (min, max) = positions
            .iter()
            .fold((first, first), |(min, max), &p| (min.min(p), max.max(p)));

        let half = ((max - min).max_element() * 0.5 * FIT_PADDING).max(MIN_WINDOW_HALF_EXTENT);
        Self::new((min + max) * 0.5, Vec2::splat(half))
    }

    pub fn center(&self) -> Vec2 {
        self.center
    }

    pub fn half_extent(&self) -> Vec2 {
        self.half_extent
    }

    pub fn min(&self) -> Vec2 {
        self.center - self.half_extent
    }

    /// Full width and height
    pub fn extent(&self) -> Vec2 {
        self.half_extent * 2.0
    }

    /// Reciprocal of the extent; quantization multiplies by this on CPU and GPU alike
    pub fn inv_extent(&self) -> Vec2 {
        self.extent().recip()
    }

    /// Average distance between bodies if `num_bodies` were spread evenly over the window
    pub fn mean_spacing(&self, num_bodies: u32) -> f32 {
        self.extent().max_element() / (num_bodies.max(1) as f32).sqrt()
    }

    /// Grid cell of `position`, clamped into `[0, 65535]` on each axis
    pub fn quantize(&self, position: Vec2) -> (u32, u32) {
        let scale = MORTON_GRID_RESOLUTION as f32;
        let t = ((position - self.min()) * self.inv_extent()).clamp(Vec2::ZERO, Vec2::ONE);
        let cell = (t * scale).min(Vec2::splat(scale - 1.0));
        (cell.x as u32, cell.y as u32)
    }
}

/// Spread the low 16 bits of `v` so they occupy the even bit positions
pub fn expand_bits(v: u32) -> u32 {
    let mut x = v & 0x0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333;
    x = (x | (x << 1)) & 0x5555_5555;
    x
}

/// Interleave x (even bits) and y (odd bits)
pub fn interleave(x: u32, y: u32) -> u32 {
    expand_bits(x) | (expand_bits(y) << 1)
}

pub fn morton_code(window: &QuantizationWindow, position: Vec2) -> u32 {
    let (x, y) = window.quantize(position);
    interleave(x, y)
}

/// Keys for every body, indexed by original body index
pub fn morton_codes(window: &QuantizationWindow, positions: &[Vec2]) -> Vec<u32> {
    positions
        .par_iter()
        .map(|&p| morton_code(window, p))
        .collect()
}
