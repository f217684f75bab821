//! Device setup, resource limits and blocking debug readbacks

use bytemuck::Pod;
use gravity_physics::{TreeNode, MAX_BODIES, RADIX_BLOCK_SIZE, WORKGROUP_SIZE};

use crate::SimError;

/// Request an adapter and device without a surface, for tests and offline runs
pub async fn request_headless_device() -> Result<(wgpu::Device, wgpu::Queue), SimError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| SimError::NoAdapter(e.to_string()))?;

    log::info!("Using GPU: {}", adapter.get_info().name);

    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("Headless Device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        })
        .await
        .map_err(|e| SimError::DeviceRequest(e.to_string()))
}

/// Largest body count whose buffers and dispatches fit within `limits`.
///
/// The node array (`2N-1` nodes of 48 bytes) is by far the biggest binding.
pub fn max_bodies(limits: &wgpu::Limits) -> u32 {
    let max_binding = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    let node_size = std::mem::size_of::<TreeNode>() as u64;
    let by_nodes = (max_binding / node_size + 1) / 2;

    let max_groups = limits.max_compute_workgroups_per_dimension as u64;
    let by_dispatch = (max_groups * WORKGROUP_SIZE as u64).min(max_groups * RADIX_BLOCK_SIZE as u64);

    by_nodes.min(by_dispatch).min(MAX_BODIES as u64) as u32
}

/// Workgroups needed to cover `count` invocations
pub fn workgroup_count(count: u32, workgroup_size: u32) -> u32 {
    count.div_ceil(workgroup_size).max(1)
}

/// Copy the first `count` elements of `buffer` to the host, blocking until done.
///
/// The buffer needs `COPY_SRC`. Meant for debugging and tests, never the frame loop.
pub fn read_buffer<T: Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    count: usize,
) -> Result<Vec<T>, SimError> {
    let size = (count * std::mem::size_of::<T>()) as u64;
    if size == 0 {
        return Ok(Vec::new());
    }

    let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging_buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })
        .map_err(|e| SimError::Readback(e.to_string()))?;
    receiver
        .recv()
        .map_err(|e| SimError::Readback(e.to_string()))?
        .map_err(|e| SimError::Readback(e.to_string()))?;

    let data = {
        let mapped = slice.get_mapped_range();
        bytemuck::cast_slice::<u8, T>(&mapped).to_vec()
    };
    staging_buffer.unmap();
    Ok(data)
}
