//! # Gravity Simulation Engine
//!
//! GPU Barnes-Hut N-body simulation. Every substep runs six compute stages:
//! Morton keys, key sort, LBVH build, bottom-up aggregation, force walk and a
//! kick-drift-kick update, all on device-resident buffers.

pub mod error;
pub mod gpu;
pub mod params;
pub mod pipelines;
pub mod simulation;
pub mod sort;

pub use error::*;
pub use gpu::*;
pub use params::*;
pub use simulation::*;
pub use sort::*;
