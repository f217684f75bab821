//! GPU Barnes-Hut Gravity Simulation
//!
//! Simulates a large 2-D population of point masses with a linear BVH rebuilt
//! every substep, and renders their density.

mod gui;
mod interaction;
mod pacing;
mod scenario;

use anyhow::Context as _;
use clap::Parser;
use glam::Vec2;
use gravity_renderer::{Camera2d, DensityRenderer};
use gravity_simulation::{GravitySimulation, SimConfig};
use gui::{Gui, UiState};
use interaction::Interaction;
use pacing::{FramePacer, SimStats};
use scenario::Scenario;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

/// Simulation rate; rendering is not capped
const TARGET_FPS: f32 = 60.0;
/// Margin around the seeded bodies in the initial view
const INITIAL_VIEW_MARGIN: f32 = 1.2;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "GPU Barnes-Hut gravity simulation")]
struct Args {
    /// Number of bodies
    #[arg(short = 'n', long, default_value_t = 50_000)]
    bodies: u32,

    /// Full pipeline passes per frame
    #[arg(long, default_value_t = 1)]
    substeps: u32,

    /// Barnes-Hut opening angle
    #[arg(long, default_value_t = 0.6)]
    theta: f32,

    /// Initial conditions
    #[arg(long, value_enum, default_value_t = Scenario::Galaxy)]
    scenario: Scenario,

    /// RNG seed for reproducible initial conditions
    #[arg(long)]
    seed: Option<u64>,

    /// Gravitational constant
    #[arg(long, default_value_t = 1.0)]
    grav_constant: f32,

    /// Softening as a multiple of the mean inter-body spacing
    #[arg(long, default_value_t = 1.0)]
    epsilon_multiplier: f32,
}

impl Args {
    fn sim_config(&self) -> SimConfig {
        SimConfig {
            grav_constant: self.grav_constant,
            bh_theta: self.theta,
            epsilon_multiplier: self.epsilon_multiplier,
            ..SimConfig::with_substeps(self.substeps)
        }
    }
}

struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    simulation: GravitySimulation,
    renderer: DensityRenderer,
    camera: Camera2d,

    gui: Gui,
    ui_state: UiState,
    interaction: Interaction,

    seed: Option<u64>,
    pacer: FramePacer,
    stats: SimStats,
}

impl GpuState {
    async fn new(window: Arc<Window>, args: &Args) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // Create wgpu instance
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;

        // Request adapter
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no compatible GPU adapter")?;

        log::info!("✓ Using GPU: {}", adapter.get_info().name);

        // Large body counts need the adapter's full buffer limits
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create device")?;

        // Configure surface
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoNoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        // Seed and create simulation
        let sim_config = args.sim_config();
        let seed = args
            .scenario
            .generate(args.bodies as usize, sim_config.grav_constant, args.seed);
        let simulation = GravitySimulation::new(device.clone(), queue.clone(), sim_config, &seed)
            .context("failed to create simulation")?;
        log::info!("✓ Simulation initialized");

        // Create renderer
        let renderer = DensityRenderer::new(&device, &config);
        log::info!("✓ Renderer initialized");

        // Frame the seeded bodies
        let window_extent = simulation.window().half_extent();
        let mut camera = Camera2d::new(
            config.width,
            config.height,
            window_extent.max_element() * INITIAL_VIEW_MARGIN,
        );
        camera.center = simulation.window().center();

        // Create GUI
        let gui = Gui::new(&device, config.format, &window);
        let ui_state = UiState {
            body_count: simulation.num_bodies(),
            max_bodies: simulation.max_bodies(),
            epsilon: simulation.epsilon(),
            config: simulation.config().clone(),
            scenario: args.scenario,
            requested_bodies: simulation.num_bodies() as i64,
            ..Default::default()
        };

        Ok(Self {
            surface,
            device,
            queue,
            config,
            simulation,
            renderer,
            camera,
            gui,
            ui_state,
            interaction: Interaction::default(),
            seed: args.seed,
            pacer: FramePacer::new(TARGET_FPS),
            stats: SimStats::new(Instant::now()),
        })
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.renderer.resize(&self.device, &self.config);
            self.camera.resize(new_size.width, new_size.height);
        }
    }

    /// Push GUI edits into the simulation
    fn apply_ui_changes(&mut self) {
        if self.ui_state.config != *self.simulation.config() {
            if let Err(e) = self.simulation.set_config(self.ui_state.config.clone()) {
                log::warn!("Rejected settings: {e}");
                self.ui_state.config = self.simulation.config().clone();
            }
        }

        if std::mem::take(&mut self.ui_state.reset_requested) {
            match self.ui_state.requested_body_count() {
                Some(num_bodies) => self.reseed(num_bodies),
                None => log::warn!("Ignoring body count {}", self.ui_state.requested_bodies),
            }
        }

        self.interaction.mode = self.ui_state.mode;
        self.interaction.mass_slider = self.ui_state.mass_slider;
    }

    fn reseed(&mut self, num_bodies: u32) {
        let seed = self.ui_state.scenario.generate(
            num_bodies as usize,
            self.simulation.config().grav_constant,
            self.seed,
        );
        match self.simulation.reset(&seed) {
            Ok(()) => log::info!("✓ Reset to {num_bodies} bodies"),
            Err(e) => log::error!("Reset failed: {e}"),
        }
        self.ui_state.body_count = self.simulation.num_bodies();
    }

    fn render(&mut self, window: &Window) -> Result<(f32, f32), wgpu::SurfaceError> {
        let now = Instant::now();
        self.apply_ui_changes();

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let stepped = self.simulation.is_seeded() && self.pacer.should_step(now);
        if stepped {
            match self.camera.quantization_window() {
                Ok(quantization_window) => self.simulation.set_window(quantization_window),
                Err(e) => log::debug!("Keeping previous quantization window: {e}"),
            }
            self.simulation.set_user_body(
                self.interaction.user_body_position(),
                self.interaction.user_mass(),
            );
            if let Err(e) = self.simulation.encode_frame(&mut encoder) {
                log::error!("Simulation step failed: {e}");
            }
        }

        // Render after the substeps, relying on queue order
        self.renderer.render(
            &self.device,
            &self.queue,
            &mut encoder,
            &view,
            &self.camera,
            self.simulation.position_buffer(),
            self.simulation.num_bodies(),
            &self.ui_state.style,
        );

        let (fps, avg_frame_time) = self.stats.record(now, stepped);
        self.ui_state.fps = fps;
        self.ui_state.frame_time = avg_frame_time;
        self.ui_state.epsilon = self.simulation.epsilon();
        self.ui_state.mode = self.interaction.mode;

        self.gui.render(
            &self.device,
            &self.queue,
            &mut encoder,
            window,
            &view,
            &mut self.ui_state,
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok((fps, avg_frame_time))
    }
}

struct App {
    args: Args,
    window: Option<Arc<Window>>,
    gpu_state: Option<GpuState>,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attributes = Window::default_attributes()
            .with_title("LBVH Gravity")
            .with_inner_size(winit::dpi::LogicalSize::new(1600, 900));

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("failed to create window")?,
        );
        self.window = Some(window.clone());
        self.gpu_state = Some(pollster::block_on(GpuState::new(window, &self.args))?);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.start(event_loop) {
                log::error!("Startup failed: {e:#}");
                self.fatal = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        // Handle GUI events
        if let (Some(gpu_state), Some(window)) = (&mut self.gpu_state, &self.window) {
            if gpu_state.gui.handle_event(window, &event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => event_loop.exit(),

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::KeyV),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.interaction.toggle_mode();
                    gpu_state.ui_state.mode = gpu_state.interaction.mode;
                }
            }

            WindowEvent::Resized(physical_size) => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.resize(physical_size);
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    if let Some(gpu_state) = &mut self.gpu_state {
                        gpu_state
                            .interaction
                            .set_dragging(state == ElementState::Pressed);
                    }
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    let px = Vec2::new(position.x as f32, position.y as f32);
                    gpu_state.interaction.cursor_moved(px, &mut gpu_state.camera);
                }
            }

            WindowEvent::MouseWheel { delta, .. } => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    let delta_px = interaction::scroll_delta_px(&delta);
                    gpu_state.interaction.scroll(delta_px, &mut gpu_state.camera);
                }
            }

            WindowEvent::RedrawRequested => {
                if let (Some(window), Some(gpu_state)) = (&self.window, &mut self.gpu_state) {
                    match gpu_state.render(window) {
                        Ok((fps, frame_time)) => {
                            window.set_title(&format!(
                                "LBVH Gravity - {:.0} FPS ({:.2}ms) - {} bodies",
                                fps,
                                frame_time,
                                gpu_state.simulation.num_bodies()
                            ));
                        }
                        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                            gpu_state.resize(window.inner_size())
                        }
                        Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                        Err(e) => log::warn!("Render error: {e:?}"),
                    }
                }
            }

            _ => {}
        }

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logger (RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("Starting gravity simulation: {args:?}");

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        args,
        window: None,
        gpu_state: None,
        fatal: None,
    };

    event_loop.run_app(&mut app)?;

    match app.fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
