//! Simulation parameters for runtime tuning

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use gravity_physics::{softening_length, ForceParams, QuantizationWindow};

use crate::SimError;

/// Host-side settings; everything the GUI and CLI can change
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub grav_constant: f32,
    /// Size of one substep
    pub delta_time: f32,
    /// Softening as a multiple of the mean inter-body spacing
    pub epsilon_multiplier: f32,
    /// Barnes-Hut opening angle
    pub bh_theta: f32,
    /// Full pipeline passes per frame
    pub substeps: u32,
}

impl SimConfig {
    /// Frame length the default time step is derived from
    pub const FRAME_TIME: f32 = 0.1 / 60.0;

    /// Exclusive upper bound on `bh_theta`. At 1 or above a node that contains
    /// the body itself can pass the opening test.
    pub const MAX_THETA: f32 = 1.0;

    /// Default config running `substeps` passes per frame with the same total frame time
    pub fn with_substeps(substeps: u32) -> Self {
        let substeps = substeps.max(1);
        Self {
            delta_time: Self::FRAME_TIME / substeps as f32,
            substeps,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !self.grav_constant.is_finite() {
            return Err(SimError::InvalidConfig(format!(
                "gravitational constant must be finite, got {}",
                self.grav_constant
            )));
        }
        if !self.delta_time.is_finite() || self.delta_time <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "time step must be positive, got {}",
                self.delta_time
            )));
        }
        if !(0.0..Self::MAX_THETA).contains(&self.bh_theta) {
            return Err(SimError::InvalidConfig(format!(
                "opening angle must be in [0, {}), got {}",
                Self::MAX_THETA,
                self.bh_theta
            )));
        }
        if !self.epsilon_multiplier.is_finite() || self.epsilon_multiplier < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "epsilon multiplier must be non-negative, got {}",
                self.epsilon_multiplier
            )));
        }
        if self.substeps == 0 {
            return Err(SimError::InvalidConfig(
                "at least one substep per frame is required".into(),
            ));
        }
        Ok(())
    }

    /// Softening length for `num_bodies` bodies spread over `window`
    pub fn epsilon(&self, window: &QuantizationWindow, num_bodies: u32) -> f32 {
        softening_length(self.epsilon_multiplier, window.mean_spacing(num_bodies))
    }

    pub fn force_params(&self, window: &QuantizationWindow, num_bodies: u32) -> ForceParams {
        ForceParams {
            grav_constant: self.grav_constant,
            theta: self.bh_theta,
            epsilon: self.epsilon(window, num_bodies),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grav_constant: 1.0,
            delta_time: Self::FRAME_TIME,
            epsilon_multiplier: 1.0,
            bh_theta: 0.6,
            substeps: 1,
        }
    }
}

/// Uniform block shared by every compute kernel
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SimParams {
    // Group 1: Physics
    // x: G, y: dt, z: epsilon (softening length), w: theta
    pub physics: [f32; 4],

    // Group 2: Quantization window
    // xy: window min corner, zw: reciprocal of the window extent
    pub window: [f32; 4],

    // Group 3: Counts
    // x: num_bodies, y: padding, z: padding, w: padding
    pub counts: [u32; 4],
}

impl SimParams {
    pub fn new(config: &SimConfig, window: &QuantizationWindow, num_bodies: u32) -> Self {
        let min = window.min();
        let inv_extent = window.inv_extent();
        Self {
            physics: [
                config.grav_constant,
                config.delta_time,
                config.epsilon(window, num_bodies),
                config.bh_theta,
            ],
            window: [min.x, min.y, inv_extent.x, inv_extent.y],
            counts: [num_bodies, 0, 0, 0],
        }
    }
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            physics: [
                1.0,             // G
                0.1 / 60.0,      // dt
                0.0,             // epsilon
                0.6,             // theta
            ],
            window: [
                -10.0, -10.0, // min corner
                0.05, 0.05,   // 1 / extent
            ],
            counts: [0, 0, 0, 0],
        }
    }
}

/// Interactive "phantom" body written over slot 0 while its mass is non-zero
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserBody {
    pub position: Vec2,
    pub mass: f32,
}

impl UserBody {
    pub fn is_active(&self) -> bool {
        self.mass != 0.0 && self.mass.is_finite() && self.position.is_finite()
    }
}
