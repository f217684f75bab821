//! Linear BVH topology from sorted Morton keys (Karras 2012)
//!
//! Every internal node's children are a pure function of the sorted keys, so
//! all `N-1` nodes are built independently. Duplicate keys are ordered by the
//! original body index, which turns the key array into a strictly increasing
//! sequence of 64-bit "augmented" keys.

use rayon::prelude::*;
use thiserror::Error;

use crate::body::TreeNode;
use crate::constants::{INVALID_NODE, LEAF_FLAG};

/// Tag a sorted rank as a leaf child reference
pub fn leaf_ref(rank: u32) -> u32 {
    rank | LEAF_FLAG
}

/// Whether a (valid) child reference names a leaf
pub fn is_leaf_ref(child: u32) -> bool {
    child & LEAF_FLAG != 0
}

/// Slot in the flat node array for a child reference
pub fn node_slot(child: u32, num_bodies: usize) -> usize {
    if is_leaf_ref(child) {
        num_bodies - 1 + (child & !LEAF_FLAG) as usize
    } else {
        child as usize
    }
}

/// Total node count for `num_bodies` bodies
pub fn node_count(num_bodies: usize) -> usize {
    (2 * num_bodies).saturating_sub(1)
}

/// Length of the common prefix of the augmented keys at sorted positions `i`
/// and `j`, or -1 when `j` is outside `[0, N)`.
pub fn common_prefix(keys: &[u32], body_indices: &[u32], i: i64, j: i64) -> i32 {
    if j < 0 || j >= keys.len() as i64 {
        return -1;
    }
    let (i, j) = (i as usize, j as usize);
    if keys[i] == keys[j] {
        32 + (body_indices[i] ^ body_indices[j]).leading_zeros() as i32
    } else {
        (keys[i] ^ keys[j]).leading_zeros() as i32
    }
}

/// Children of internal node `index`, as tagged child references
pub fn internal_children(keys: &[u32], body_indices: &[u32], index: u32) -> (u32, u32) {
    let delta = |j: i64| common_prefix(keys, body_indices, index as i64, j);
    let i = index as i64;

    // Direction of the range covered by this node
    let d: i64 = if delta(i + 1) - delta(i - 1) >= 0 { 1 } else { -1 };
    let delta_min = delta(i - d);

    // Upper bound for the range length, then binary search for the other end
    let mut l_max: i64 = 2;
    while delta(i + l_max * d) > delta_min {
        l_max *= 2;
    }
    let mut l: i64 = 0;
    let mut t = l_max / 2;
    while t >= 1 {
        if delta(i + (l + t) * d) > delta_min {
            l += t;
        }
        t /= 2;
    }
    let j = i + l * d;

    // Split position: the last key sharing more than the node's common prefix
    let delta_node = delta(j);
    let mut s: i64 = 0;
    let mut step = l;
    loop {
        step = (step + 1) / 2;
        if delta(i + (s + step) * d) > delta_node {
            s += step;
        }
        if step <= 1 {
            break;
        }
    }
    let gamma = i + s * d + d.min(0);

    let left = if i.min(j) == gamma {
        leaf_ref(gamma as u32)
    } else {
        gamma as u32
    };
    let right = if i.max(j) == gamma + 1 {
        leaf_ref((gamma + 1) as u32)
    } else {
        (gamma + 1) as u32
    };
    (left, right)
}

/// Build child and parent links for all `2N-1` nodes. Aggregates stay zeroed.
///
/// `sorted_keys` must be ascending and ties must be ordered by ascending
/// `sorted_body_indices`, which is what a stable sort of identity indices gives.
pub fn build_topology(sorted_keys: &[u32], sorted_body_indices: &[u32]) -> Vec<TreeNode> {
    let n = sorted_keys.len();
    let mut nodes = vec![TreeNode::unlinked(); node_count(n)];
    if n < 2 {
        return nodes;
    }

    let links: Vec<(u32, u32)> = (0..(n - 1) as u32)
        .into_par_iter()
        .map(|i| internal_children(sorted_keys, sorted_body_indices, i))
        .collect();

    for (index, &(left, right)) in links.iter().enumerate() {
        nodes[index].left_child = left;
        nodes[index].right_child = right;
        nodes[node_slot(left, n)].parent = index as u32;
        nodes[node_slot(right, n)].parent = index as u32;
    }
    nodes[0].parent = INVALID_NODE;
    nodes
}

/// Structural defects found by [`check_topology`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("expected {expected} nodes for {num_bodies} bodies, found {found}")]
    WrongNodeCount {
        num_bodies: usize,
        expected: usize,
        found: usize,
    },
    #[error("root has parent {0}")]
    RootHasParent(u32),
    #[error("internal node {node} has invalid child reference {child}")]
    BadChild { node: usize, child: u32 },
    #[error("slot {slot} is claimed by parents {first} and {second}")]
    SharedChild { slot: usize, first: usize, second: usize },
    #[error("slot {slot} records parent {recorded} but belongs to {actual}")]
    ParentMismatch {
        slot: usize,
        recorded: u32,
        actual: u32,
    },
    #[error("slot {0} is unreachable from the root")]
    Unreachable(usize),
}

/// Check the tree shape: `N-1` internal nodes with two children each, every
/// other slot claimed exactly once, parent links consistent, and every leaf
/// reaching the root.
pub fn check_topology(nodes: &[TreeNode], num_bodies: usize) -> Result<(), TopologyError> {
    let expected = node_count(num_bodies);
    if nodes.len() != expected {
        return Err(TopologyError::WrongNodeCount {
            num_bodies,
            expected,
            found: nodes.len(),
        });
    }
    if nodes.is_empty() {
        return Ok(());
    }
    if nodes[0].parent != INVALID_NODE {
        return Err(TopologyError::RootHasParent(nodes[0].parent));
    }

    let internal = num_bodies - 1;
    let mut owner: Vec<Option<usize>> = vec![None; nodes.len()];
    for (node, inner) in nodes.iter().enumerate().take(internal) {
        for child in [inner.left_child, inner.right_child] {
            let valid = if is_leaf_ref(child) {
                child != INVALID_NODE && ((child & !LEAF_FLAG) as usize) < num_bodies
            } else {
                (child as usize) < internal && child != 0
            };
            if !valid {
                return Err(TopologyError::BadChild { node, child });
            }
            let slot = node_slot(child, num_bodies);
            if let Some(first) = owner[slot] {
                return Err(TopologyError::SharedChild {
                    slot,
                    first,
                    second: node,
                });
            }
            owner[slot] = Some(node);
            if nodes[slot].parent != node as u32 {
                return Err(TopologyError::ParentMismatch {
                    slot,
                    recorded: nodes[slot].parent,
                    actual: node as u32,
                });
            }
        }
    }

    // Every leaf must climb to the root within `internal` steps
    for rank in 0..num_bodies {
        let mut slot = internal + rank;
        let mut steps = 0;
        while slot != 0 {
            if steps > internal || owner[slot].is_none() {
                return Err(TopologyError::Unreachable(internal + rank));
            }
            slot = nodes[slot].parent as usize;
            steps += 1;
        }
    }
    Ok(())
}
