//! Pointer and keyboard handling for the simulation view

use glam::Vec2;
use gravity_renderer::Camera2d;

/// Zoom rate per pixel of scroll
const ZOOM_SPEED: f32 = 0.0015;
/// Pixels per scroll-wheel line
const PIXELS_PER_LINE: f32 = 100.0;
/// Steepness of the user-mass slider; larger gives flatter center and steeper ends
const MASS_SLIDER_STEEPNESS: f32 = 10.0;
/// Largest user-body mass, reached at either end of the slider
pub const MAX_USER_MASS: f32 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    /// Dragging pans the view
    #[default]
    Camera,
    /// Dragging moves the user body
    Body,
}

impl InteractionMode {
    pub fn toggled(self) -> Self {
        match self {
            InteractionMode::Camera => InteractionMode::Body,
            InteractionMode::Body => InteractionMode::Camera,
        }
    }
}

/// Map a slider position in `[-1, 1]` to a signed mass. Negative masses repel.
pub fn user_mass_from_slider(slider: f32) -> f32 {
    let s = slider.clamp(-1.0, 1.0);
    (MASS_SLIDER_STEEPNESS * s).sinh() / MASS_SLIDER_STEEPNESS.sinh() * MAX_USER_MASS
}

/// Camera scale factor for a scroll of `delta_px` pixels, positive zooming out
pub fn zoom_factor(delta_px: f32) -> f32 {
    (delta_px * ZOOM_SPEED).exp()
}

/// Pixel-equivalent of a winit wheel event, positive when scrolling towards the user
pub fn scroll_delta_px(delta: &winit::event::MouseScrollDelta) -> f32 {
    match delta {
        winit::event::MouseScrollDelta::LineDelta(_x, y) => -y * PIXELS_PER_LINE,
        winit::event::MouseScrollDelta::PixelDelta(pos) => -pos.y as f32,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Interaction {
    pub mode: InteractionMode,
    /// Raw slider position in `[-1, 1]`
    pub mass_slider: f32,
    user_body_position: Vec2,
    dragging: bool,
    cursor_px: Option<Vec2>,
}

impl Interaction {
    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggled();
        log::info!("Interaction mode: {:?}", self.mode);
    }

    /// Mass the user body should carry right now; zero outside body mode
    pub fn user_mass(&self) -> f32 {
        match self.mode {
            InteractionMode::Camera => 0.0,
            InteractionMode::Body => user_mass_from_slider(self.mass_slider),
        }
    }

    pub fn user_body_position(&self) -> Vec2 {
        self.user_body_position
    }

    pub fn set_dragging(&mut self, pressed: bool) {
        self.dragging = pressed;
    }

    pub fn cursor_px(&self) -> Option<Vec2> {
        self.cursor_px
    }

    /// Track the cursor and apply a drag. Returns true when the user body moved.
    pub fn cursor_moved(&mut self, px: Vec2, camera: &mut Camera2d) -> bool {
        let last = self.cursor_px.replace(px);
        if !self.dragging {
            return false;
        }

        match self.mode {
            InteractionMode::Camera => {
                if let Some(last) = last {
                    camera.pan(px - last);
                }
                false
            }
            InteractionMode::Body => {
                self.user_body_position = camera.canvas_px_to_world(px);
                true
            }
        }
    }

    /// Zoom about the cursor, or about the view center before the cursor is known
    pub fn scroll(&mut self, delta_px: f32, camera: &mut Camera2d) {
        let anchor = self.cursor_px.unwrap_or(camera.viewport() * 0.5);
        camera.zoom_about(zoom_factor(delta_px), anchor);
    }
}
