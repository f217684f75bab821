//! Compute pipelines for the six substep stages
//!
//! Pipelines depend only on the device, so they are built once and survive
//! resizes; bind groups are rebuilt with the buffers.

macro_rules! simulation_shader {
    ($file:literal) => {
        concat!(include_str!("shaders/common.wgsl"), "\n", include_str!($file))
    };
}

pub(crate) fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

pub struct SimPipelines {
    pub morton_layout: wgpu::BindGroupLayout,
    pub tree_layout: wgpu::BindGroupLayout,
    pub force_layout: wgpu::BindGroupLayout,
    pub integrate_layout: wgpu::BindGroupLayout,

    pub morton: wgpu::ComputePipeline,
    pub build: wgpu::ComputePipeline,
    pub fill: wgpu::ComputePipeline,
    pub forces: wgpu::ComputePipeline,
    pub half_kick: wgpu::ComputePipeline,
    pub drift: wgpu::ComputePipeline,
}

impl SimPipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        // Load compute shaders
        let morton_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Morton Code Shader"),
            source: wgpu::ShaderSource::Wgsl(simulation_shader!("shaders/morton.wgsl").into()),
        });

        let tree_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("LBVH Shader"),
            source: wgpu::ShaderSource::Wgsl(simulation_shader!("shaders/lbvh.wgsl").into()),
        });

        let force_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Barnes-Hut Force Shader"),
            source: wgpu::ShaderSource::Wgsl(simulation_shader!("shaders/barnes_hut.wgsl").into()),
        });

        let integrate_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Leapfrog Shader"),
            source: wgpu::ShaderSource::Wgsl(simulation_shader!("shaders/integrate.wgsl").into()),
        });

        log::info!("Shaders loaded");

        let morton_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Morton Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),  // positions
                storage_entry(2, false), // morton_codes
                storage_entry(3, false), // body_indices
            ],
        });

        let tree_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tree Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),  // positions
                storage_entry(2, true),  // masses
                storage_entry(3, true),  // morton_codes
                storage_entry(4, true),  // body_indices
                storage_entry(5, false), // nodes
                storage_entry(6, false), // node_status
            ],
        });

        let force_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Force Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),  // positions
                storage_entry(2, true),  // body_indices
                storage_entry(3, true),  // nodes
                storage_entry(4, false), // accelerations
            ],
        });

        let integrate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Integration Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, false), // positions
                storage_entry(2, false), // velocities
                storage_entry(3, true),  // accelerations
            ],
        });

        let morton = compute_pipeline(device, "Morton Pipeline", &morton_layout, &morton_shader, "morton_main");
        let build = compute_pipeline(device, "LBVH Build Pipeline", &tree_layout, &tree_shader, "build_main");
        let fill = compute_pipeline(device, "LBVH Fill Pipeline", &tree_layout, &tree_shader, "fill_main");
        let forces = compute_pipeline(device, "Force Pipeline", &force_layout, &force_shader, "forces_main");
        let half_kick = compute_pipeline(
            device,
            "Half Kick Pipeline",
            &integrate_layout,
            &integrate_shader,
            "half_kick_main",
        );
        let drift = compute_pipeline(device, "Drift Pipeline", &integrate_layout, &integrate_shader, "drift_main");

        log::info!("Pipelines created");

        Self {
            morton_layout,
            tree_layout,
            force_layout,
            integrate_layout,
            morton,
            build,
            fill,
            forces,
            half_kick,
            drift,
        }
    }
}
