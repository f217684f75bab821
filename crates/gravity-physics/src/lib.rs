//! # Gravity Physics
//!
//! Host-side data model for the 2-D Barnes-Hut engine, plus a CPU reference
//! implementation of every pipeline stage: Morton keys, key sort, LBVH build,
//! bottom-up aggregation, force walk and leapfrog integration.
//!
//! The GPU kernels in `gravity-simulation` follow these functions step for step,
//! so the reference doubles as the oracle for their tests.

pub mod aggregate;
pub mod body;
pub mod constants;
pub mod forces;
pub mod integrator;
pub mod lbvh;
pub mod morton;
pub mod reference;
pub mod sort;

pub use aggregate::*;
pub use body::*;
pub use constants::*;
pub use forces::*;
pub use integrator::*;
pub use lbvh::*;
pub use morton::*;
pub use reference::*;
pub use sort::*;
