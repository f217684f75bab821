//! Device-resident key/value sorting
//!
//! The engine only relies on the [`KeySorter`] contract: after the recorded
//! commands run, `keys` is ascending and `values` was permuted alongside it,
//! with equal keys keeping their relative order. [`RadixSorter`] is the
//! default implementation.

use bytemuck::{Pod, Zeroable};
use gravity_physics::{RADIX_BITS, RADIX_BLOCK_SIZE, RADIX_BUCKETS, RADIX_PASSES};
use wgpu::util::DeviceExt;

use crate::gpu::workgroup_count;
use crate::pipelines::{storage_entry, uniform_entry};
use crate::SimError;

/// Stable in-place sort of `u32` keys with `u32` payloads, on the device
pub trait KeySorter: Send {
    /// Bind to the engine's key and value buffers. Called again after every
    /// resize, since the buffers are reallocated.
    fn prepare(
        &mut self,
        device: &wgpu::Device,
        keys: &wgpu::Buffer,
        values: &wgpu::Buffer,
        count: u32,
    ) -> Result<(), SimError>;

    /// Record the sort into `encoder`
    fn encode(&self, encoder: &mut wgpu::CommandEncoder);
}

/// Per-pass uniform (matches WGSL)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SortParams {
    num_keys: u32,
    shift: u32,
    num_blocks: u32,
    _padding: u32,
}

/// Buffers and bind groups tied to one key/value pair
struct SortBindings {
    num_blocks: u32,
    _scratch_keys: wgpu::Buffer,
    _scratch_values: wgpu::Buffer,
    _block_offsets: wgpu::Buffer,
    _params_buffers: Vec<wgpu::Buffer>,
    /// One per pass; even passes read the caller's buffers, odd passes the scratch pair
    pass_bind_groups: Vec<wgpu::BindGroup>,
}

/// Least-significant-digit radix sort, 4 bits per pass.
///
/// Each pass counts digits per 256-key block, scans the digit-major block
/// histogram in a single workgroup, then scatters every key to its digit's
/// offset plus its rank among equal digits earlier in the block. The pass
/// count is even, so the result lands back in the caller's buffers.
pub struct RadixSorter {
    bind_group_layout: wgpu::BindGroupLayout,
    count_pipeline: wgpu::ComputePipeline,
    scan_pipeline: wgpu::ComputePipeline,
    scatter_pipeline: wgpu::ComputePipeline,
    bindings: Option<SortBindings>,
}

impl RadixSorter {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Radix Sort Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/radix_sort.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Radix Sort Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
                storage_entry(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Radix Sort Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let count_pipeline = make_pipeline("Radix Count Pipeline", "count_main");
        let scan_pipeline = make_pipeline("Radix Scan Pipeline", "scan_main");
        let scatter_pipeline = make_pipeline("Radix Scatter Pipeline", "scatter_main");

        log::info!("Radix sorter pipelines created");

        Self {
            bind_group_layout,
            count_pipeline,
            scan_pipeline,
            scatter_pipeline,
            bindings: None,
        }
    }
}

impl KeySorter for RadixSorter {
    fn prepare(
        &mut self,
        device: &wgpu::Device,
        keys: &wgpu::Buffer,
        values: &wgpu::Buffer,
        count: u32,
    ) -> Result<(), SimError> {
        if count == 0 {
            return Err(SimError::InvalidConfig("cannot sort zero keys".into()));
        }
        let num_blocks = workgroup_count(count, RADIX_BLOCK_SIZE);
        let key_bytes = count as u64 * 4;

        let scratch = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: key_bytes,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            })
        };
        let scratch_keys = scratch("Radix Scratch Keys Buffer");
        let scratch_values = scratch("Radix Scratch Values Buffer");

        let block_offsets = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Radix Block Offsets Buffer"),
            size: (RADIX_BUCKETS as u64) * num_blocks as u64 * 4,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        // All passes are recorded into one submission, so each needs its own shift
        let params_buffers: Vec<wgpu::Buffer> = (0..RADIX_PASSES)
            .map(|pass| {
                let params = SortParams {
                    num_keys: count,
                    shift: pass * RADIX_BITS,
                    num_blocks,
                    _padding: 0,
                };
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Radix Pass Params Buffer"),
                    contents: bytemuck::cast_slice(&[params]),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            })
            .collect();

        let pass_bind_groups = params_buffers
            .iter()
            .enumerate()
            .map(|(pass, params_buffer)| {
                let (src, dst) = if pass % 2 == 0 {
                    ((keys, values), (&scratch_keys, &scratch_values))
                } else {
                    ((&scratch_keys, &scratch_values), (keys, values))
                };
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Radix Pass Bind Group"),
                    layout: &self.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: params_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: src.0.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: src.1.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: dst.0.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: dst.1.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: block_offsets.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();

        log::debug!("Radix sorter bound to {count} keys in {num_blocks} blocks");

        self.bindings = Some(SortBindings {
            num_blocks,
            _scratch_keys: scratch_keys,
            _scratch_values: scratch_values,
            _block_offsets: block_offsets,
            _params_buffers: params_buffers,
            pass_bind_groups,
        });
        Ok(())
    }

    fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        let Some(bindings) = &self.bindings else {
            log::warn!("Radix sorter used before prepare(); skipping sort");
            return;
        };

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Radix Sort Pass"),
            timestamp_writes: None,
        });
        for bind_group in &bindings.pass_bind_groups {
            compute_pass.set_bind_group(0, bind_group, &[]);

            compute_pass.set_pipeline(&self.count_pipeline);
            compute_pass.dispatch_workgroups(bindings.num_blocks, 1, 1);

            compute_pass.set_pipeline(&self.scan_pipeline);
            compute_pass.dispatch_workgroups(1, 1, 1);

            compute_pass.set_pipeline(&self.scatter_pipeline);
            compute_pass.dispatch_workgroups(bindings.num_blocks, 1, 1);
        }
    }
}
