//! Bottom-up mass aggregation with an atomic fan-in per internal node
//!
//! One task per leaf writes the leaf's aggregate and climbs towards the root.
//! At each internal node it bumps that node's arrival counter: the first
//! arrival stops, the second combines both children and keeps climbing. Every
//! internal node is therefore combined exactly once, by whichever child
//! finished last, with no locks.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::OnceLock;

use glam::Vec2;
use rayon::prelude::*;

use crate::body::TreeNode;
use crate::constants::INVALID_NODE;
use crate::lbvh::node_slot;

/// Mass summary of a subtree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeAggregate {
    pub center_of_mass: Vec2,
    pub total_mass: f32,
    pub aabb_min: Vec2,
    pub aabb_max: Vec2,
    pub length: f32,
}

impl NodeAggregate {
    pub fn leaf(position: Vec2, mass: f32) -> Self {
        Self {
            center_of_mass: position,
            total_mass: mass,
            aabb_min: position,
            aabb_max: position,
            length: 0.0,
        }
    }

    /// Mass-weighted centroid, bounding box union and its diagonal
    pub fn combine(a: &Self, b: &Self) -> Self {
        let total_mass = a.total_mass + b.total_mass;
        // Signed masses are allowed, so only an exact zero sum has no centroid
        let center_of_mass = if total_mass != 0.0 {
            (a.center_of_mass * a.total_mass + b.center_of_mass * b.total_mass) / total_mass
        } else {
            // Massless subtree: keep a finite point inside the box
            (a.center_of_mass + b.center_of_mass) * 0.5
        };
        let aabb_min = a.aabb_min.min(b.aabb_min);
        let aabb_max = a.aabb_max.max(b.aabb_max);
        Self {
            center_of_mass,
            total_mass,
            aabb_min,
            aabb_max,
            length: (aabb_max - aabb_min).length(),
        }
    }

    fn write_to(&self, node: &mut TreeNode) {
        node.center_of_mass = self.center_of_mass.to_array();
        node.total_mass = self.total_mass;
        node.aabb_min = self.aabb_min.to_array();
        node.aabb_max = self.aabb_max.to_array();
        node.length = self.length;
    }
}

impl From<&TreeNode> for NodeAggregate {
    fn from(node: &TreeNode) -> Self {
        Self {
            center_of_mass: node.center_of_mass(),
            total_mass: node.total_mass,
            aabb_min: node.aabb_min(),
            aabb_max: node.aabb_max(),
            length: node.length,
        }
    }
}

/// Fill the aggregates of every node whose links were set by
/// [`build_topology`](crate::lbvh::build_topology).
///
/// `positions` and `masses` are indexed by original body index. Returns the
/// number of internal nodes that were combined, which is `N-1` whenever the
/// topology is well formed.
pub fn fill_aggregates(
    nodes: &mut [TreeNode],
    sorted_body_indices: &[u32],
    masses: &[f32],
    positions: &[Vec2],
) -> usize {
    let n = sorted_body_indices.len();
    if n == 0 {
        return 0;
    }

    let slots: Vec<OnceLock<NodeAggregate>> = (0..nodes.len()).map(|_| OnceLock::new()).collect();
    let arrivals: Vec<AtomicU32> = (0..n - 1).map(|_| AtomicU32::new(0)).collect();
    let combined = AtomicUsize::new(0);
    let topology: &[TreeNode] = nodes;

    (0..n).into_par_iter().for_each(|rank| {
        let body = sorted_body_indices[rank] as usize;
        let leaf_slot = n - 1 + rank;
        let _ = slots[leaf_slot].set(NodeAggregate::leaf(positions[body], masses[body]));

        let mut node = topology[leaf_slot].parent;
        while node != INVALID_NODE {
            let index = node as usize;
            // AcqRel: the second arrival must see the sibling's finished aggregate
            if arrivals[index].fetch_add(1, Ordering::AcqRel) == 0 {
                return;
            }

            let inner = &topology[index];
            let (Some(left), Some(right)) = (
                slots[node_slot(inner.left_child, n)].get(),
                slots[node_slot(inner.right_child, n)].get(),
            ) else {
                return;
            };
            if slots[index].set(NodeAggregate::combine(left, right)).is_ok() {
                combined.fetch_add(1, Ordering::Relaxed);
            }
            node = inner.parent;
        }
    });

    for (node, slot) in nodes.iter_mut().zip(slots) {
        if let Some(aggregate) = slot.into_inner() {
            aggregate.write_to(node);
        }
    }
    combined.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lbvh::build_topology;
    use approx::assert_relative_eq;

    #[test]
    fn test_combine_weights_by_mass() {
        let a = NodeAggregate::leaf(Vec2::new(0.0, 0.0), 3.0);
        let b = NodeAggregate::leaf(Vec2::new(4.0, 0.0), 1.0);
        let c = NodeAggregate::combine(&a, &b);
        assert_eq!(c.total_mass, 4.0);
        assert_eq!(c.center_of_mass, Vec2::new(1.0, 0.0));
        assert_eq!(c.aabb_min, Vec2::ZERO);
        assert_eq!(c.aabb_max, Vec2::new(4.0, 0.0));
        assert_eq!(c.length, 4.0);
    }

    #[test]
    fn test_combine_keeps_weighting_for_negative_total() {
        let a = NodeAggregate::leaf(Vec2::new(0.0, 0.0), -1.0e5);
        let b = NodeAggregate::leaf(Vec2::new(10.0, 0.0), 1.0);
        let c = NodeAggregate::combine(&a, &b);
        assert_eq!(c.total_mass, -99_999.0);
        assert_relative_eq!(c.center_of_mass.x, 10.0 / -99_999.0, max_relative = 1e-5);
        assert_eq!(c.center_of_mass.y, 0.0);
        assert_eq!(c.aabb_max, Vec2::new(10.0, 0.0));
    }

    #[test]
    fn test_combine_massless_children_stays_finite() {
        let a = NodeAggregate::leaf(Vec2::new(-1.0, 0.0), 0.0);
        let b = NodeAggregate::leaf(Vec2::new(1.0, 2.0), 0.0);
        let c = NodeAggregate::combine(&a, &b);
        assert_eq!(c.center_of_mass, Vec2::new(0.0, 1.0));
        assert_relative_eq!(c.length, 8.0f32.sqrt());
    }

    #[test]
    fn test_root_holds_whole_system() {
        let positions = vec![
            Vec2::new(-2.0, 1.0),
            Vec2::new(3.0, -1.0),
            Vec2::new(0.5, 4.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, -3.0),
        ];
        let masses = vec![1.0, 2.0, 0.5, 4.0, 1.5];
        let keys = vec![0b0001, 0b0100, 0b0101, 0b1000, 0b1100];
        let indices: Vec<u32> = (0..5).collect();

        let mut nodes = build_topology(&keys, &indices);
        let combined = fill_aggregates(&mut nodes, &indices, &masses, &positions);
        assert_eq!(combined, 4);

        let total: f32 = masses.iter().sum();
        let center = positions
            .iter()
            .zip(&masses)
            .fold(Vec2::ZERO, |acc, (&p, &m)| acc + p * m)
            / total;
        let root = &nodes[0];
        assert_relative_eq!(root.total_mass, total);
        assert_relative_eq!(root.center_of_mass[0], center.x, epsilon = 1e-5);
        assert_relative_eq!(root.center_of_mass[1], center.y, epsilon = 1e-5);
        assert_eq!(root.aabb_min, [-2.0, -3.0]);
        assert_eq!(root.aabb_max, [3.0, 4.0]);
    }

    #[test]
    fn test_single_body_fill() {
        let mut nodes = build_topology(&[0], &[0]);
        let combined = fill_aggregates(&mut nodes, &[0], &[2.0], &[Vec2::new(1.0, -1.0)]);
        assert_eq!(combined, 0);
        assert_eq!(nodes[0].total_mass, 2.0);
        assert_eq!(nodes[0].center_of_mass, [1.0, -1.0]);
        assert_eq!(nodes[0].length, 0.0);
    }
}
