//! 2D pan/zoom camera

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use gravity_physics::{QuantizationWindow, WindowError};

/// Camera uniform for GPU
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    // xy: center, zw: half size (world units)
    pub view: [f32; 4],
    // xy: viewport size in pixels, z: splat radius in pixels, w: exposure
    pub viewport: [f32; 4],
}

/// Axis-aligned view onto the simulation plane. World y points up, screen y down.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera2d {
    pub center: Vec2,
    pub half_size: Vec2,
    viewport: Vec2,
}

impl Camera2d {
    /// Camera centered on the origin showing `half_height` world units above and below
    pub fn new(width: u32, height: u32, half_height: f32) -> Self {
        let mut camera = Self {
            center: Vec2::ZERO,
            half_size: Vec2::splat(half_height),
            viewport: Vec2::ONE,
        };
        camera.resize(width, height);
        camera
    }

    /// Keep the vertical extent and widen or narrow to the new aspect ratio
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Vec2::new(width.max(1) as f32, height.max(1) as f32);
        self.half_size.x = self.half_size.y * self.viewport.x / self.viewport.y;
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn delta_px_to_world(&self, delta_px: Vec2) -> Vec2 {
        let delta_ndc = Vec2::new(2.0 * delta_px.x / self.viewport.x, -2.0 * delta_px.y / self.viewport.y);
        delta_ndc * self.half_size
    }

    /// World position under a pixel (origin top-left)
    pub fn canvas_px_to_world(&self, px: Vec2) -> Vec2 {
        let ndc = Vec2::new(
            2.0 * px.x / self.viewport.x - 1.0,
            1.0 - 2.0 * px.y / self.viewport.y,
        );
        self.center + ndc * self.half_size
    }

    /// Drag the view so the world follows the pointer
    pub fn pan(&mut self, delta_px: Vec2) {
        self.center -= self.delta_px_to_world(delta_px);
    }

    /// Scale the view by `factor` keeping the world point under `px` fixed
    pub fn zoom_about(&mut self, factor: f32, px: Vec2) {
        let anchor = self.canvas_px_to_world(px);
        self.half_size *= factor;
        self.center += (anchor - self.center) * (1.0 - factor);
    }

    /// The visible region, used as the Morton quantization window
    pub fn quantization_window(&self) -> Result<QuantizationWindow, WindowError> {
        QuantizationWindow::new(self.center, self.half_size)
    }

    pub fn to_uniform(&self, splat_radius_px: f32, exposure: f32) -> CameraUniform {
        CameraUniform {
            view: [self.center.x, self.center.y, self.half_size.x, self.half_size.y],
            viewport: [self.viewport.x, self.viewport.y, splat_radius_px, exposure],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aspect_follows_viewport() {
        let camera = Camera2d::new(1600, 800, 10.0);
        assert_eq!(camera.half_size, Vec2::new(20.0, 10.0));
    }

    #[test]
    fn test_pixel_to_world() {
        let camera = Camera2d::new(200, 100, 10.0);
        assert_eq!(camera.canvas_px_to_world(Vec2::new(100.0, 50.0)), Vec2::ZERO);
        assert_eq!(camera.canvas_px_to_world(Vec2::ZERO), Vec2::new(-20.0, 10.0));
        assert_eq!(camera.canvas_px_to_world(Vec2::new(200.0, 100.0)), Vec2::new(20.0, -10.0));
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let mut camera = Camera2d::new(200, 100, 10.0);
        camera.center = Vec2::new(3.0, -1.0);
        let px = Vec2::new(40.0, 70.0);
        let before = camera.canvas_px_to_world(px);

        camera.zoom_about((120.0f32 * 0.0015).exp(), px);
        let after = camera.canvas_px_to_world(px);
        assert_relative_eq!(before.x, after.x, epsilon = 1e-4);
        assert_relative_eq!(before.y, after.y, epsilon = 1e-4);
    }

    #[test]
    fn test_pan_follows_pointer() {
        let mut camera = Camera2d::new(200, 100, 10.0);
        let grabbed = camera.canvas_px_to_world(Vec2::new(50.0, 50.0));
        camera.pan(Vec2::new(30.0, -20.0));
        let under_pointer = camera.canvas_px_to_world(Vec2::new(80.0, 30.0));
        assert_relative_eq!(grabbed.x, under_pointer.x, epsilon = 1e-5);
        assert_relative_eq!(grabbed.y, under_pointer.y, epsilon = 1e-5);
    }
}
