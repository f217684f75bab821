use egui::Context;
use egui_wgpu::Renderer;
use egui_winit::State;
use gravity_renderer::DensityStyle;
use gravity_simulation::SimConfig;
use wgpu::{Device, TextureFormat};
use winit::{event::WindowEvent, window::Window};

use crate::interaction::{user_mass_from_slider, InteractionMode};
use crate::scenario::Scenario;

/// Body counts offered by the selector
const BODY_COUNT_PRESETS: [u32; 6] = [1_000, 10_000, 50_000, 100_000, 500_000, 1_000_000];

/// Largest opening angle the slider offers; must stay below `SimConfig::MAX_THETA`
const THETA_SLIDER_MAX: f32 = 0.95;

pub struct UiState {
    pub fps: f32,
    pub frame_time: f32,
    pub body_count: u32,
    pub max_bodies: u32,
    pub epsilon: f32,
    pub config: SimConfig,
    pub style: DensityStyle,
    pub scenario: Scenario,
    pub mode: InteractionMode,
    /// Raw user-mass slider in `[-1, 1]`
    pub mass_slider: f32,
    /// Body count typed into the selector, applied on reset
    pub requested_bodies: i64,
    /// Set by the GUI; the app reseeds and clears it
    pub reset_requested: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            fps: 0.0,
            frame_time: 0.0,
            body_count: 0,
            max_bodies: 0,
            epsilon: 0.0,
            config: SimConfig::default(),
            style: DensityStyle::default(),
            scenario: Scenario::default(),
            mode: InteractionMode::default(),
            mass_slider: 0.0,
            requested_bodies: 0,
            reset_requested: false,
        }
    }
}

impl UiState {
    /// Body count to reseed with, or `None` when the typed value is not usable
    pub fn requested_body_count(&self) -> Option<u32> {
        if self.requested_bodies <= 0 {
            return None;
        }
        u32::try_from(self.requested_bodies).ok()
    }
}

pub struct Gui {
    context: Context,
    state: State,
    renderer: Renderer,
}

impl Gui {
    pub fn new(device: &Device, output_color_format: TextureFormat, window: &Window) -> Self {
        let context = Context::default();
        let id = context.viewport_id();

        let state = State::new(
            context.clone(),
            id,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(device.limits().max_texture_dimension_2d as usize),
        );

        let renderer = Renderer::new(
            device,
            output_color_format,
            egui_wgpu::RendererOptions::default(),
        );

        Self {
            context,
            state,
            renderer,
        }
    }

    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let response = self.state.on_window_event(window, event);
        response.consumed
    }

    pub fn render(
        &mut self,
        device: &Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        window: &Window,
        view: &wgpu::TextureView,
        ui_state: &mut UiState,
    ) {
        let raw_input = self.state.take_egui_input(window);

        let full_output = self.context.run(raw_input, |ctx| {
            Self::ui(ctx, ui_state);
        });

        self.state
            .handle_platform_output(window, full_output.platform_output);

        let clipped_primitives = self
            .context
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        let size = window.inner_size();
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [size.width, size.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            self.renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.renderer.update_buffers(
            device,
            queue,
            encoder,
            &clipped_primitives,
            &screen_descriptor,
        );

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.renderer.render(
                &mut render_pass.forget_lifetime(),
                &clipped_primitives,
                &screen_descriptor,
            );
        }

        for id in &full_output.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }

    fn ui(ctx: &Context, state: &mut UiState) {
        // Diagnostics Panel (Top Left)
        egui::Window::new("Diagnostics")
            .anchor(egui::Align2::LEFT_TOP, [10.0, 10.0])
            .resizable(false)
            .collapsible(true)
            .show(ctx, |ui| {
                ui.label(format!("FPS: {:.1}", state.fps));
                ui.label(format!("Frame Time: {:.2} ms", state.frame_time));
                ui.label(format!("Bodies: {}", state.body_count));
                ui.label(format!("Softening: {:.4}", state.epsilon));
            });

        // Bodies Panel (Top Right)
        egui::Window::new("Bodies")
            .anchor(egui::Align2::RIGHT_TOP, [-10.0, 10.0])
            .resizable(false)
            .collapsible(true)
            .show(ctx, |ui| {
                egui::ComboBox::from_label("Scenario")
                    .selected_text(state.scenario.label())
                    .show_ui(ui, |ui| {
                        for scenario in Scenario::ALL {
                            ui.selectable_value(&mut state.scenario, scenario, scenario.label());
                        }
                    });

                ui.horizontal(|ui| {
                    ui.label("Count");
                    ui.add(
                        egui::DragValue::new(&mut state.requested_bodies)
                            .range(1..=state.max_bodies.max(1) as i64)
                            .speed(100.0),
                    );
                });
                ui.horizontal_wrapped(|ui| {
                    for preset in BODY_COUNT_PRESETS {
                        if preset <= state.max_bodies && ui.small_button(format!("{preset}")).clicked() {
                            state.requested_bodies = preset as i64;
                        }
                    }
                });

                if ui.button("Reset").clicked() {
                    state.reset_requested = true;
                }

                ui.separator();
                ui.heading("Interaction");
                ui.horizontal(|ui| {
                    ui.radio_value(&mut state.mode, InteractionMode::Camera, "Camera");
                    ui.radio_value(&mut state.mode, InteractionMode::Body, "Body");
                });
                ui.add(egui::Slider::new(&mut state.mass_slider, -1.0..=1.0).text("User Mass"));
                ui.label(format!("Mass: {:.1}", user_mass_from_slider(state.mass_slider)));
                ui.label("V toggles mode");
            });

        // Physics Controls (Bottom Left)
        egui::Window::new("Physics Controls")
            .anchor(egui::Align2::LEFT_BOTTOM, [10.0, -10.0])
            .resizable(false)
            .collapsible(true)
            .show(ctx, |ui| {
                ui.heading("Gravity");
                ui.add(
                    egui::Slider::new(&mut state.config.grav_constant, 0.0..=10.0)
                        .text("Gravity (G)"),
                );
                ui.add(
                    egui::Slider::new(&mut state.config.epsilon_multiplier, 0.0..=10.0)
                        .text("Softening Multiplier"),
                );

                ui.separator();
                ui.heading("Barnes-Hut");
                ui.add(egui::Slider::new(&mut state.config.bh_theta, 0.0..=THETA_SLIDER_MAX).text("Theta"));

                ui.separator();
                ui.heading("Integration");
                ui.add(
                    egui::Slider::new(&mut state.config.delta_time, 1.0e-5..=1.0e-2)
                        .text("Time Step (dt)")
                        .logarithmic(true),
                );
                ui.add(egui::Slider::new(&mut state.config.substeps, 1..=16).text("Substeps"));

                ui.separator();
                ui.heading("Rendering");
                ui.add(
                    egui::Slider::new(&mut state.style.splat_radius, 0.5..=8.0)
                        .text("Splat Radius"),
                );
                ui.add(
                    egui::Slider::new(&mut state.style.exposure, 0.01..=2.0)
                        .text("Exposure")
                        .logarithmic(true),
                );
            });
    }
}
