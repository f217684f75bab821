//! Body seeds and the flat tree node layout shared with the GPU

use bytemuck::Zeroable;
use glam::Vec2;
use thiserror::Error;

use crate::constants::{INVALID_NODE, MAX_BODIES};

/// Reasons a [`BodySeed`] cannot be uploaded
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeedError {
    #[error("seed contains no bodies")]
    Empty,
    #[error(
        "seed arrays disagree in length: {masses} masses, {positions} positions, {velocities} velocities"
    )]
    LengthMismatch {
        masses: usize,
        positions: usize,
        velocities: usize,
    },
    #[error("seed holds {0} bodies, more than the supported maximum")]
    TooManyBodies(usize),
    #[error("body {index} has a non-finite {field}")]
    NonFinite { index: usize, field: &'static str },
    #[error("body {index} has negative mass {mass}")]
    NegativeMass { index: usize, mass: f32 },
}

/// Initial state for every body, supplied by scenario code.
///
/// The engine never invents bodies; it only uploads what it is given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodySeed {
    pub masses: Vec<f32>,
    pub positions: Vec<Vec2>,
    pub velocities: Vec<Vec2>,
}

impl BodySeed {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            masses: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, mass: f32, position: Vec2, velocity: Vec2) {
        self.masses.push(mass);
        self.positions.push(position);
        self.velocities.push(velocity);
    }

    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Check lengths, finiteness and mass signs before anything is allocated
    pub fn validate(&self) -> Result<(), SeedError> {
        let (masses, positions, velocities) =
            (self.masses.len(), self.positions.len(), self.velocities.len());
        if masses != positions || masses != velocities {
            return Err(SeedError::LengthMismatch {
                masses,
                positions,
                velocities,
            });
        }
        if masses == 0 {
            return Err(SeedError::Empty);
        }
        if masses > MAX_BODIES as usize {
            return Err(SeedError::TooManyBodies(masses));
        }

        for (index, ((&mass, position), velocity)) in self
            .masses
            .iter()
            .zip(&self.positions)
            .zip(&self.velocities)
            .enumerate()
        {
            if !mass.is_finite() {
                return Err(SeedError::NonFinite {
                    index,
                    field: "mass",
                });
            }
            if mass < 0.0 {
                return Err(SeedError::NegativeMass { index, mass });
            }
            if !position.is_finite() {
                return Err(SeedError::NonFinite {
                    index,
                    field: "position",
                });
            }
            if !velocity.is_finite() {
                return Err(SeedError::NonFinite {
                    index,
                    field: "velocity",
                });
            }
        }
        Ok(())
    }

    pub fn total_mass(&self) -> f32 {
        self.masses.iter().sum()
    }

    /// Sum of `m * v`
    pub fn total_momentum(&self) -> Vec2 {
        total_momentum(&self.masses, &self.velocities)
    }

    /// Positions in the `vec2<f32>` layout the GPU buffers use
    pub fn position_data(&self) -> Vec<[f32; 2]> {
        self.positions.iter().map(|p| p.to_array()).collect()
    }

    pub fn velocity_data(&self) -> Vec<[f32; 2]> {
        self.velocities.iter().map(|v| v.to_array()).collect()
    }
}

pub fn total_momentum(masses: &[f32], velocities: &[Vec2]) -> Vec2 {
    masses
        .iter()
        .zip(velocities)
        .map(|(&m, &v)| m * v)
        .fold(Vec2::ZERO, |acc, p| acc + p)
}

/// One slot of the flat LBVH array.
///
/// Internal nodes occupy slots `[0, N-1)` with the root at slot 0; the leaf for
/// sorted rank `k` lives in slot `N-1+k`. For `N == 1` the lone leaf is slot 0
/// and is also the root.
///
/// Matches `TreeNode` in the WGSL kernels (48 bytes, 4-byte aligned fields).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Zeroable)]
pub struct TreeNode {
    pub center_of_mass: [f32; 2],
    pub aabb_min: [f32; 2],
    pub aabb_max: [f32; 2],
    pub total_mass: f32,
    /// Size measure used by the opening test (the AABB diagonal)
    pub length: f32,

    /// Child references: an internal index, or a rank tagged with `LEAF_FLAG`
    pub left_child: u32,
    pub right_child: u32,
    pub parent: u32,
    pub _padding: u32,
}

impl TreeNode {
    /// A node with no links and no mass
    pub fn unlinked() -> Self {
        Self {
            left_child: INVALID_NODE,
            right_child: INVALID_NODE,
            parent: INVALID_NODE,
            ..Self::zeroed()
        }
    }

    pub fn center_of_mass(&self) -> Vec2 {
        Vec2::from_array(self.center_of_mass)
    }

    pub fn aabb_min(&self) -> Vec2 {
        Vec2::from_array(self.aabb_min)
    }

    pub fn aabb_max(&self) -> Vec2 {
        Vec2::from_array(self.aabb_max)
    }
}

impl Default for TreeNode {
    fn default() -> Self {
        Self::unlinked()
    }
}

// Safety: TreeNode is repr(C) and made only of f32/u32 fields with no implicit padding
unsafe impl bytemuck::Pod for TreeNode {}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_body_seed() -> BodySeed {
        let mut seed = BodySeed::with_capacity(2);
        seed.push(1.0, Vec2::new(-1.0, 0.0), Vec2::new(0.0, -0.5));
        seed.push(1.0, Vec2::new(1.0, 0.0), Vec2::new(0.0, 0.5));
        seed
    }

    #[test]
    fn test_tree_node_matches_gpu_layout() {
        assert_eq!(std::mem::size_of::<TreeNode>(), 48);
        assert_eq!(std::mem::align_of::<TreeNode>(), 4);
    }

    #[test]
    fn test_valid_seed() {
        let seed = two_body_seed();
        assert_eq!(seed.validate(), Ok(()));
        assert_eq!(seed.len(), 2);
        assert_eq!(seed.total_mass(), 2.0);
        assert_eq!(seed.total_momentum(), Vec2::ZERO);
    }

    #[test]
    fn test_empty_seed_rejected() {
        assert_eq!(BodySeed::default().validate(), Err(SeedError::Empty));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut seed = two_body_seed();
        seed.velocities.pop();
        assert_eq!(
            seed.validate(),
            Err(SeedError::LengthMismatch {
                masses: 2,
                positions: 2,
                velocities: 1,
            })
        );
    }

    #[test]
    fn test_bad_values_rejected() {
        let mut seed = two_body_seed();
        seed.positions[1].x = f32::NAN;
        assert_eq!(
            seed.validate(),
            Err(SeedError::NonFinite {
                index: 1,
                field: "position",
            })
        );

        let mut seed = two_body_seed();
        seed.masses[0] = -2.0;
        assert_eq!(
            seed.validate(),
            Err(SeedError::NegativeMass {
                index: 0,
                mass: -2.0,
            })
        );
    }
}
