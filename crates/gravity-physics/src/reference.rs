//! CPU reference of the whole substep pipeline
//!
//! Runs the same six stages as the GPU engine, in the same order, over host
//! vectors. Used as the oracle in tests and for offline experiments.

use glam::Vec2;

use crate::aggregate::fill_aggregates;
use crate::body::{total_momentum, BodySeed, SeedError, TreeNode};
use crate::forces::{tree_accelerations, ForceParams};
use crate::integrator::leapfrog_step;
use crate::lbvh::build_topology;
use crate::morton::{morton_codes, QuantizationWindow};
use crate::sort::sort_pairs;

/// Everything one substep needs besides the body state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub forces: ForceParams,
    pub delta_time: f32,
    pub window: QuantizationWindow,
}

pub struct ReferenceSimulation {
    masses: Vec<f32>,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    accelerations: Vec<Vec2>,
    /// Keys by sorted rank after the last substep
    sorted_keys: Vec<u32>,
    /// Original body index by sorted rank after the last substep
    body_indices: Vec<u32>,
    nodes: Vec<TreeNode>,
}

impl ReferenceSimulation {
    pub fn new(seed: &BodySeed) -> Result<Self, SeedError> {
        seed.validate()?;
        let n = seed.len();
        Ok(Self {
            masses: seed.masses.clone(),
            positions: seed.positions.clone(),
            velocities: seed.velocities.clone(),
            accelerations: vec![Vec2::ZERO; n],
            sorted_keys: Vec::new(),
            body_indices: Vec::new(),
            nodes: Vec::new(),
        })
    }

    pub fn num_bodies(&self) -> usize {
        self.masses.len()
    }

    /// Stages 1 to 4: keys, sort, topology and aggregates for the current positions
    pub fn build_tree(&mut self, window: &QuantizationWindow) -> usize {
        let mut keys = morton_codes(window, &self.positions);
        let mut indices: Vec<u32> = (0..self.num_bodies() as u32).collect();
        sort_pairs(&mut keys, &mut indices);

        let mut nodes = build_topology(&keys, &indices);
        let combined = fill_aggregates(&mut nodes, &indices, &self.masses, &self.positions);

        self.sorted_keys = keys;
        self.body_indices = indices;
        self.nodes = nodes;
        combined
    }

    /// One full pipeline pass
    pub fn substep(&mut self, params: &StepParams) {
        self.build_tree(&params.window);
        self.accelerations = tree_accelerations(&self.nodes, &self.body_indices, &self.positions, &params.forces);
        leapfrog_step(
            &mut self.positions,
            &mut self.velocities,
            &self.accelerations,
            params.delta_time,
        );
    }

    pub fn advance(&mut self, params: &StepParams, substeps: u32) {
        for _ in 0..substeps {
            self.substep(params);
        }
    }

    pub fn masses(&self) -> &[f32] {
        &self.masses
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities
    }

    /// Accelerations used by the last substep, by original body index
    pub fn accelerations(&self) -> &[Vec2] {
        &self.accelerations
    }

    pub fn sorted_keys(&self) -> &[u32] {
        &self.sorted_keys
    }

    pub fn body_indices(&self) -> &[u32] {
        &self.body_indices
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn total_momentum(&self) -> Vec2 {
        total_momentum(&self.masses, &self.velocities)
    }
}
