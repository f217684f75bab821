//! # Gravity Renderer
//!
//! Density visualization of the simulation's position buffer.

pub mod camera;
pub mod density;

pub use camera::*;
pub use density::*;
