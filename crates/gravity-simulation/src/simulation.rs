//! GPU-based Barnes-Hut simulation manager
//!
//! NOTE: The fill stage relies on one atomic counter per internal node. WGSL
//! atomics are relaxed and `storageBarrier()` cannot be used in the divergent
//! climb, so the second arrival at a node reads its sibling's aggregate
//! through plain storage loads issued after the atomic. The counters are
//! cleared with `clear_buffer` before every fill.

use glam::Vec2;
use gravity_physics::{node_count, BodySeed, QuantizationWindow, TreeNode, WORKGROUP_SIZE};
use wgpu::util::DeviceExt;

use crate::gpu::{max_bodies, read_buffer, workgroup_count};
use crate::pipelines::SimPipelines;
use crate::sort::{KeySorter, RadixSorter};
use crate::{SimConfig, SimError, SimParams, UserBody};

/// Everything sized by the body count
struct SimBuffers {
    num_bodies: u32,
    masses: wgpu::Buffer,
    positions: wgpu::Buffer,
    velocities: wgpu::Buffer,
    accelerations: wgpu::Buffer,
    /// Keys by body index after stage 1, by sorted rank after stage 2
    morton_codes: wgpu::Buffer,
    /// Identity after stage 1, original body index by sorted rank after stage 2
    body_indices: wgpu::Buffer,
    nodes: wgpu::Buffer,
    node_status: wgpu::Buffer,
}

impl SimBuffers {
    fn new(device: &wgpu::Device, num_bodies: u32) -> Result<Self, SimError> {
        let n = num_bodies as u64;
        let storage = |label: &str, size: u64, extra: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | extra,
                mapped_at_creation: false,
            })
        };

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        let masses = storage("Mass Buffer", n * 4, wgpu::BufferUsages::COPY_DST);
        let positions = storage("Position Buffer", n * 8, wgpu::BufferUsages::COPY_DST);
        let velocities = storage("Velocity Buffer", n * 8, wgpu::BufferUsages::COPY_DST);
        let accelerations = storage("Acceleration Buffer", n * 8, wgpu::BufferUsages::empty());
        let morton_codes = storage("Morton Code Buffer", n * 4, wgpu::BufferUsages::empty());
        let body_indices = storage("Body Index Buffer", n * 4, wgpu::BufferUsages::empty());
        let nodes = storage(
            "Tree Node Buffer",
            node_count(num_bodies as usize) as u64 * std::mem::size_of::<TreeNode>() as u64,
            wgpu::BufferUsages::empty(),
        );
        // A zero-sized binding is invalid, so N = 1 still gets one counter
        let node_status = storage(
            "Node Status Buffer",
            n.saturating_sub(1).max(1) * 4,
            wgpu::BufferUsages::COPY_DST,
        );

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            log::error!("Buffer allocation failed: {error}");
            return Err(SimError::OutOfMemory(num_bodies));
        }

        Ok(Self {
            num_bodies,
            masses,
            positions,
            velocities,
            accelerations,
            morton_codes,
            body_indices,
            nodes,
            node_status,
        })
    }
}

struct SimBindGroups {
    morton: wgpu::BindGroup,
    tree: wgpu::BindGroup,
    forces: wgpu::BindGroup,
    integrate: wgpu::BindGroup,
}

fn bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    buffers: &[&wgpu::Buffer],
) -> wgpu::BindGroup {
    let entries: Vec<wgpu::BindGroupEntry> = buffers
        .iter()
        .enumerate()
        .map(|(binding, buffer)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: buffer.as_entire_binding(),
        })
        .collect();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    })
}

impl SimBindGroups {
    fn new(
        device: &wgpu::Device,
        pipelines: &SimPipelines,
        buffers: &SimBuffers,
        params_buffer: &wgpu::Buffer,
    ) -> Self {
        let morton = bind_group(
            device,
            "Morton Bind Group",
            &pipelines.morton_layout,
            &[
                params_buffer,
                &buffers.positions,
                &buffers.morton_codes,
                &buffers.body_indices,
            ],
        );
        let tree = bind_group(
            device,
            "Tree Bind Group",
            &pipelines.tree_layout,
            &[
                params_buffer,
                &buffers.positions,
                &buffers.masses,
                &buffers.morton_codes,
                &buffers.body_indices,
                &buffers.nodes,
                &buffers.node_status,
            ],
        );
        let forces = bind_group(
            device,
            "Force Bind Group",
            &pipelines.force_layout,
            &[
                params_buffer,
                &buffers.positions,
                &buffers.body_indices,
                &buffers.nodes,
                &buffers.accelerations,
            ],
        );
        let integrate = bind_group(
            device,
            "Integration Bind Group",
            &pipelines.integrate_layout,
            &[
                params_buffer,
                &buffers.positions,
                &buffers.velocities,
                &buffers.accelerations,
            ],
        );
        Self {
            morton,
            tree,
            forces,
            integrate,
        }
    }
}

/// The simulation context: one buffer set for the current body count, the
/// pipelines that run over it, and the host-side settings.
///
/// Several instances can share a device; nothing is global.
pub struct GravitySimulation {
    device: wgpu::Device,
    queue: wgpu::Queue,

    config: SimConfig,
    window: QuantizationWindow,
    max_bodies: u32,

    params_buffer: wgpu::Buffer,
    pipelines: SimPipelines,
    buffers: SimBuffers,
    bind_groups: SimBindGroups,
    sorter: Box<dyn KeySorter>,

    seeded: bool,
    /// Slot 0's seeded mass, restored when the user body is released
    slot_zero_mass: f32,
    user_body: Option<UserBody>,
    user_body_applied: bool,
}

impl GravitySimulation {
    /// Create a simulation for `seed.len()` bodies using the built-in radix sort
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: SimConfig,
        seed: &BodySeed,
    ) -> Result<Self, SimError> {
        let sorter = Box::new(RadixSorter::new(&device));
        Self::with_sorter(device, queue, config, seed, sorter)
    }

    /// Create a simulation with a caller-supplied key sorter
    pub fn with_sorter(
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: SimConfig,
        seed: &BodySeed,
        mut sorter: Box<dyn KeySorter>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        seed.validate()?;
        let max_bodies = max_bodies(&device.limits());
        let num_bodies = checked_body_count(seed.len(), max_bodies)?;
        let window = QuantizationWindow::fit(&seed.positions)?;

        log::info!("Initializing GravitySimulation with {num_bodies} bodies...");

        let params = SimParams::new(&config, &window, num_bodies);
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sim Params Buffer"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let pipelines = SimPipelines::new(&device);
        let buffers = SimBuffers::new(&device, num_bodies)?;
        log::info!("Buffers created");

        sorter.prepare(&device, &buffers.morton_codes, &buffers.body_indices, num_bodies)?;
        let bind_groups = SimBindGroups::new(&device, &pipelines, &buffers, &params_buffer);
        log::info!("Bind groups created");

        let mut simulation = Self {
            device,
            queue,
            config,
            window,
            max_bodies,
            params_buffer,
            pipelines,
            buffers,
            bind_groups,
            sorter,
            seeded: false,
            slot_zero_mass: 0.0,
            user_body: None,
            user_body_applied: false,
        };
        simulation.seed(seed)?;
        Ok(simulation)
    }

    /// Reallocate every buffer for `num_bodies` bodies.
    ///
    /// The new buffers hold no bodies; [`seed`](Self::seed) must run before the
    /// next [`advance`](Self::advance).
    pub fn set_num_bodies(&mut self, num_bodies: u32) -> Result<(), SimError> {
        let num_bodies = checked_body_count(num_bodies as usize, self.max_bodies)?;

        let buffers = SimBuffers::new(&self.device, num_bodies)?;
        self.sorter
            .prepare(&self.device, &buffers.morton_codes, &buffers.body_indices, num_bodies)?;
        self.bind_groups = SimBindGroups::new(&self.device, &self.pipelines, &buffers, &self.params_buffer);
        self.buffers = buffers;

        self.seeded = false;
        self.user_body_applied = false;
        log::info!("Resized simulation to {num_bodies} bodies");
        Ok(())
    }

    /// Upload initial masses, positions and velocities and refit the quantization window
    pub fn seed(&mut self, seed: &BodySeed) -> Result<(), SimError> {
        seed.validate()?;
        if seed.len() != self.buffers.num_bodies as usize {
            return Err(SimError::InvalidConfig(format!(
                "seed has {} bodies but buffers hold {}",
                seed.len(),
                self.buffers.num_bodies
            )));
        }

        self.queue
            .write_buffer(&self.buffers.masses, 0, bytemuck::cast_slice(&seed.masses));
        self.queue.write_buffer(
            &self.buffers.positions,
            0,
            bytemuck::cast_slice(&seed.position_data()),
        );
        self.queue.write_buffer(
            &self.buffers.velocities,
            0,
            bytemuck::cast_slice(&seed.velocity_data()),
        );

        self.window = QuantizationWindow::fit(&seed.positions)?;
        self.slot_zero_mass = seed.masses[0];
        self.user_body_applied = false;
        self.seeded = true;
        log::debug!("Seeded {} bodies, window {:?}", seed.len(), self.window);
        Ok(())
    }

    /// Resize and reseed in one go
    pub fn reset(&mut self, seed: &BodySeed) -> Result<(), SimError> {
        seed.validate()?;
        self.set_num_bodies(seed.len() as u32)?;
        self.seed(seed)
    }

    /// Run `substeps` full pipeline passes and submit them
    pub fn advance(&mut self) -> Result<(), SimError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Simulation Encoder"),
            });
        self.encode_frame(&mut encoder)?;
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Record one frame's substeps into `encoder`, so render work can follow
    /// in the same submission.
    ///
    /// Parameter and user-body uploads go through the queue and land before
    /// the encoder's commands execute.
    pub fn encode_frame(&mut self, encoder: &mut wgpu::CommandEncoder) -> Result<(), SimError> {
        if !self.seeded {
            return Err(SimError::NotSeeded);
        }
        self.write_params();
        self.apply_user_body();

        for _ in 0..self.config.substeps {
            self.encode_tree(encoder);
            self.encode_forces(encoder);
            self.encode_integrate(encoder);
        }
        Ok(())
    }

    /// Run stages 1 to 5 at the current positions without moving anything.
    ///
    /// Leaves the sorted keys, tree and accelerations in their buffers for
    /// inspection.
    pub fn evaluate_forces(&mut self) -> Result<(), SimError> {
        if !self.seeded {
            return Err(SimError::NotSeeded);
        }
        self.write_params();
        self.apply_user_body();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Force Evaluation Encoder"),
            });
        self.encode_tree(&mut encoder);
        self.encode_forces(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn body_workgroups(&self) -> u32 {
        workgroup_count(self.buffers.num_bodies, WORKGROUP_SIZE)
    }

    /// Stages 1 to 4: keys, sort, topology, aggregates
    fn encode_tree(&self, encoder: &mut wgpu::CommandEncoder) {
        let n = self.buffers.num_bodies;

        // Step 1: Morton keys
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Morton Code Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipelines.morton);
            compute_pass.set_bind_group(0, &self.bind_groups.morton, &[]);
            compute_pass.dispatch_workgroups(self.body_workgroups(), 1, 1);
        }

        // Step 2: Sort keys, carrying body indices along
        self.sorter.encode(encoder);

        // Step 3: Build topology
        if n > 1 {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("LBVH Build Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipelines.build);
            compute_pass.set_bind_group(0, &self.bind_groups.tree, &[]);
            compute_pass.dispatch_workgroups(workgroup_count(n - 1, WORKGROUP_SIZE), 1, 1);
        }

        // Step 4: Aggregate bottom-up
        {
            encoder.clear_buffer(&self.buffers.node_status, 0, None);

            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("LBVH Fill Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipelines.fill);
            compute_pass.set_bind_group(0, &self.bind_groups.tree, &[]);
            compute_pass.dispatch_workgroups(self.body_workgroups(), 1, 1);
        }
    }

    /// Stage 5: one tree walk per sorted rank
    fn encode_forces(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Barnes-Hut Force Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&self.pipelines.forces);
        compute_pass.set_bind_group(0, &self.bind_groups.forces, &[]);
        compute_pass.dispatch_workgroups(self.body_workgroups(), 1, 1);
    }

    /// Stage 6: half kick, drift, half kick with the same accelerations
    fn encode_integrate(&self, encoder: &mut wgpu::CommandEncoder) {
        let workgroups = self.body_workgroups();
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Leapfrog Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_bind_group(0, &self.bind_groups.integrate, &[]);

        compute_pass.set_pipeline(&self.pipelines.half_kick);
        compute_pass.dispatch_workgroups(workgroups, 1, 1);

        compute_pass.set_pipeline(&self.pipelines.drift);
        compute_pass.dispatch_workgroups(workgroups, 1, 1);

        compute_pass.set_pipeline(&self.pipelines.half_kick);
        compute_pass.dispatch_workgroups(workgroups, 1, 1);
    }

    fn write_params(&self) {
        let params = SimParams::new(&self.config, &self.window, self.buffers.num_bodies);
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&[params]));
    }

    fn apply_user_body(&mut self) {
        match self.user_body {
            Some(body) if body.is_active() => {
                self.queue
                    .write_buffer(&self.buffers.masses, 0, bytemuck::cast_slice(&[body.mass]));
                self.queue.write_buffer(
                    &self.buffers.positions,
                    0,
                    bytemuck::cast_slice(&[body.position.to_array()]),
                );
                self.queue
                    .write_buffer(&self.buffers.velocities, 0, bytemuck::cast_slice(&[[0.0f32; 2]]));
                self.user_body_applied = true;
            }
            _ if self.user_body_applied => {
                self.queue.write_buffer(
                    &self.buffers.masses,
                    0,
                    bytemuck::cast_slice(&[self.slot_zero_mass]),
                );
                self.user_body_applied = false;
            }
            _ => {}
        }
    }

    /// Pin body 0 to `position` with `mass` from the next frame on. A zero mass
    /// releases it and restores its seeded mass.
    pub fn set_user_body(&mut self, position: Vec2, mass: f32) {
        self.user_body = (mass != 0.0).then_some(UserBody { position, mass });
    }

    pub fn user_body(&self) -> Option<UserBody> {
        self.user_body
    }

    pub fn set_config(&mut self, config: SimConfig) -> Result<(), SimError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Quantization window for the next frame, typically the camera's view
    pub fn set_window(&mut self, window: QuantizationWindow) {
        self.window = window;
    }

    pub fn window(&self) -> &QuantizationWindow {
        &self.window
    }

    pub fn num_bodies(&self) -> u32 {
        self.buffers.num_bodies
    }

    pub fn max_bodies(&self) -> u32 {
        self.max_bodies
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Softening length currently in effect
    pub fn epsilon(&self) -> f32 {
        self.config.epsilon(&self.window, self.buffers.num_bodies)
    }

    /// Device-resident positions (`vec2<f32>` per body) for rendering.
    ///
    /// Replaced on resize; re-fetch after [`set_num_bodies`](Self::set_num_bodies).
    pub fn position_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.positions
    }

    pub fn read_positions(&self) -> Result<Vec<Vec2>, SimError> {
        let raw: Vec<[f32; 2]> = self.read(&self.buffers.positions, self.buffers.num_bodies as usize)?;
        Ok(raw.into_iter().map(Vec2::from_array).collect())
    }

    pub fn read_velocities(&self) -> Result<Vec<Vec2>, SimError> {
        let raw: Vec<[f32; 2]> = self.read(&self.buffers.velocities, self.buffers.num_bodies as usize)?;
        Ok(raw.into_iter().map(Vec2::from_array).collect())
    }

    /// Accelerations from the last force stage, by original body index
    pub fn read_accelerations(&self) -> Result<Vec<Vec2>, SimError> {
        let raw: Vec<[f32; 2]> = self.read(&self.buffers.accelerations, self.buffers.num_bodies as usize)?;
        Ok(raw.into_iter().map(Vec2::from_array).collect())
    }

    pub fn read_masses(&self) -> Result<Vec<f32>, SimError> {
        self.read(&self.buffers.masses, self.buffers.num_bodies as usize)
    }

    /// Morton keys in sorted order, as left by the last substep
    pub fn read_morton_codes(&self) -> Result<Vec<u32>, SimError> {
        self.read(&self.buffers.morton_codes, self.buffers.num_bodies as usize)
    }

    /// Original body index for each sorted rank
    pub fn read_body_indices(&self) -> Result<Vec<u32>, SimError> {
        self.read(&self.buffers.body_indices, self.buffers.num_bodies as usize)
    }

    /// All `2N-1` nodes: internal nodes first, then leaves by sorted rank
    pub fn read_nodes(&self) -> Result<Vec<TreeNode>, SimError> {
        self.read(&self.buffers.nodes, node_count(self.buffers.num_bodies as usize))
    }

    fn read<T: bytemuck::Pod>(&self, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<T>, SimError> {
        read_buffer(&self.device, &self.queue, buffer, count)
    }
}

fn checked_body_count(requested: usize, max: u32) -> Result<u32, SimError> {
    if requested == 0 {
        return Err(SimError::InvalidConfig(
            "body count must be positive".into(),
        ));
    }
    match u32::try_from(requested) {
        Ok(count) if count <= max => Ok(count),
        _ => Err(SimError::BodyCountTooLarge {
            requested: u32::try_from(requested).unwrap_or(u32::MAX),
            max,
        }),
    }
}
