//! Engine error type

use gravity_physics::{SeedError, WindowError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Seed(#[from] SeedError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("{requested} bodies exceed what this device can hold (at most {max})")]
    BodyCountTooLarge { requested: u32, max: u32 },
    #[error("device ran out of memory while allocating buffers for {0} bodies")]
    OutOfMemory(u32),
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(String),
    #[error("failed to create GPU device: {0}")]
    DeviceRequest(String),
    #[error("buffer readback failed: {0}")]
    Readback(String),
    #[error("simulation has no bodies seeded since the last resize")]
    NotSeeded,
}
