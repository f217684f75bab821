//! Softened gravity and the Barnes-Hut tree walk
//!
//! NOTE: These mirror `barnes_hut.wgsl` for testing; the simulation itself
//! evaluates forces on the GPU.

use glam::Vec2;
use rayon::prelude::*;

use crate::body::TreeNode;
use crate::constants::{LEAF_FLAG, TRAVERSAL_STACK_SIZE};
use crate::lbvh::is_leaf_ref;

/// Constants of the force law for one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceParams {
    pub grav_constant: f32,
    /// Opening angle; 0 sums every leaf exactly
    pub theta: f32,
    /// Softening length
    pub epsilon: f32,
}

/// Softening scaled to the mean inter-body spacing of the window
pub fn softening_length(epsilon_multiplier: f32, mean_spacing: f32) -> f32 {
    epsilon_multiplier * mean_spacing
}

/// Acceleration per unit `G` at `position` due to a point `mass` at `source`:
/// `m r / (|r|^2 + eps^2)^(3/2)`
pub fn point_mass_accel(position: Vec2, source: Vec2, mass: f32, epsilon_sq: f32) -> Vec2 {
    let r = source - position;
    let dist_sq = r.length_squared() + epsilon_sq;
    if dist_sq <= 0.0 {
        return Vec2::ZERO;
    }
    let inv_dist = dist_sq.sqrt().recip();
    r * (mass * inv_dist * inv_dist * inv_dist)
}

/// Barnes-Hut acceleration on the body with sorted rank `rank`.
///
/// Leaves are always summed exactly, except the body's own leaf. An internal
/// node is accepted as a point mass when `length / distance < theta`.
pub fn tree_accel(nodes: &[TreeNode], num_bodies: usize, rank: u32, position: Vec2, params: &ForceParams) -> Vec2 {
    if num_bodies < 2 {
        return Vec2::ZERO;
    }
    let epsilon_sq = params.epsilon * params.epsilon;
    let leaf_base = num_bodies - 1;

    let mut acc = Vec2::ZERO;
    let mut stack = [0u32; TRAVERSAL_STACK_SIZE];
    let mut top = 1;

    while top > 0 {
        top -= 1;
        let child = stack[top];

        if is_leaf_ref(child) {
            let leaf_rank = child & !LEAF_FLAG;
            if leaf_rank != rank {
                let leaf = &nodes[leaf_base + leaf_rank as usize];
                acc += point_mass_accel(position, leaf.center_of_mass(), leaf.total_mass, epsilon_sq);
            }
            continue;
        }

        let node = &nodes[child as usize];
        let distance = (node.center_of_mass() - position).length();
        if node.length < params.theta * distance {
            acc += point_mass_accel(position, node.center_of_mass(), node.total_mass, epsilon_sq);
        } else if top + 2 <= TRAVERSAL_STACK_SIZE {
            stack[top] = node.left_child;
            stack[top + 1] = node.right_child;
            top += 2;
        }
    }
    acc * params.grav_constant
}

/// Tree accelerations for every body, indexed by original body index
pub fn tree_accelerations(
    nodes: &[TreeNode],
    sorted_body_indices: &[u32],
    positions: &[Vec2],
    params: &ForceParams,
) -> Vec<Vec2> {
    let n = sorted_body_indices.len();
    let by_rank: Vec<Vec2> = sorted_body_indices
        .par_iter()
        .enumerate()
        .map(|(rank, &body)| tree_accel(nodes, n, rank as u32, positions[body as usize], params))
        .collect();

    let mut accelerations = vec![Vec2::ZERO; n];
    for (&body, acc) in sorted_body_indices.iter().zip(by_rank) {
        accelerations[body as usize] = acc;
    }
    accelerations
}

/// Brute-force O(N^2) accelerations with the same softened law
pub fn direct_accelerations(masses: &[f32], positions: &[Vec2], params: &ForceParams) -> Vec<Vec2> {
    let epsilon_sq = params.epsilon * params.epsilon;
    positions
        .par_iter()
        .enumerate()
        .map(|(i, &position)| {
            let acc = positions
                .iter()
                .zip(masses)
                .enumerate()
                .filter(|(j, _)| *j != i)
                .fold(Vec2::ZERO, |acc, (_, (&source, &mass))| {
                    acc + point_mass_accel(position, source, mass, epsilon_sq)
                });
            acc * params.grav_constant
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_mass_direction_and_magnitude() {
        let acc = point_mass_accel(Vec2::ZERO, Vec2::new(2.0, 0.0), 8.0, 0.0);
        assert_relative_eq!(acc.x, 2.0);
        assert_eq!(acc.y, 0.0);
    }

    #[test]
    fn test_coincident_bodies_without_softening() {
        let acc = point_mass_accel(Vec2::ONE, Vec2::ONE, 1.0, 0.0);
        assert_eq!(acc, Vec2::ZERO);
    }

    #[test]
    fn test_softening_caps_close_encounters() {
        let soft = point_mass_accel(Vec2::ZERO, Vec2::new(1e-4, 0.0), 1.0, 0.01);
        assert!(soft.x > 0.0 && soft.x < 1.0);
    }

    #[test]
    fn test_direct_pair_is_antisymmetric() {
        let params = ForceParams {
            grav_constant: 1.0,
            theta: 0.0,
            epsilon: 0.1,
        };
        let acc = direct_accelerations(&[1.0, 1.0], &[Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)], &params);
        assert_relative_eq!(acc[0].x, -acc[1].x);
        assert!(acc[0].x > 0.0);
    }
}
