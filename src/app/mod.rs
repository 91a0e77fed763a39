pub mod cli;
mod camera_controller;
mod input_state;
mod ui;

use std::sync::Arc;
use std::time::Instant;
use color_eyre::eyre::eyre;
use color_eyre::{Report, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, StartCause, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::app::camera_controller::{CameraController, FITTED_MESH_RADIUS};
use crate::app::cli::Cli;
use crate::app::input_state::InputState;
use crate::app::ui::{FrameTimer, MeshSummary};
use crate::mesh::{load_obj, MeshData};
use crate::renderer::camera::Camera;
use crate::renderer::config::RenderConfig;
use crate::renderer::Renderer;

pub struct App {
    renderer: Option<Renderer>,
    imgui: imgui::Context,
    camera_controller: CameraController,

    mesh: MeshData,
    mesh_summary: MeshSummary,
    config: RenderConfig,
    window_size: (u32, u32),

    // State
    input_state: InputState,
    frame_timer: FrameTimer,
    prev_frame_time: Instant,
    delta_time_secs: f32,
    request_redraws: bool,
    close_requested: bool,
    error: Option<Report>,
}

impl App {
    pub fn new(cli: &Cli) -> Result<Self> {
        let mesh = load_obj(&cli.mesh, cli.front_face.into())?;
        if mesh.indices.is_empty() {
            return Err(eyre!("{} contains no faces", cli.mesh.display()));
        }
        let mesh_name = cli
            .mesh
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| cli.mesh.display().to_string());
        let mesh_summary = MeshSummary::new(mesh_name, &mesh);
        log::info!(
            "Loaded {}: {} vertices, {} triangles",
            mesh_summary.name,
            mesh_summary.vertices,
            mesh_summary.triangles,
        );

        let mut imgui = imgui::Context::create();
        imgui.set_ini_filename(None);

        let mut camera_controller = CameraController::new(Camera::new());
        camera_controller.frame_radius(FITTED_MESH_RADIUS);

        Ok(Self {
            renderer: None,
            imgui,
            camera_controller,

            mesh,
            mesh_summary,
            config: cli.render_config(),
            window_size: cli.window_size(),

            input_state: InputState::default(),
            frame_timer: FrameTimer::new(120),
            prev_frame_time: Instant::now(),
            delta_time_secs: 0.0,
            request_redraws: false,
            close_requested: false,
            error: None,
        })
    }

    /// Runs the event loop until the window closes or a frame fails.
    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Wait);
        event_loop.run_app(&mut self)?;

        // Tear the renderer down before reporting
        self.renderer.take();
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn init_renderer(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (width, height) = self.window_size;
        let attributes = Window::default_attributes()
            .with_title(format!("strata - {}", self.mesh_summary.name))
            .with_inner_size(LogicalSize::new(width, height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let renderer = Renderer::new(window.clone(), &self.mesh, &mut self.imgui, self.config.clone())?;
        self.renderer = Some(renderer);
        window.request_redraw();
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let window = renderer.window().clone();

        let io = self.imgui.io_mut();
        let size = window.inner_size();
        let scale = window.scale_factor() as f32;
        io.display_size = [size.width as f32 / scale, size.height as f32 / scale];
        io.display_framebuffer_scale = [scale, scale];
        io.delta_time = self.delta_time_secs.max(f32::EPSILON);
        let ui_captures_mouse = io.want_capture_mouse;

        self.camera_controller.process_input(
            &mut self.input_state,
            &window,
            self.delta_time_secs,
            ui_captures_mouse,
        );
        self.input_state.reset_frame();
        self.frame_timer.record(self.delta_time_secs);

        let stats = renderer.stats();
        let ui = self.imgui.new_frame();
        ui::draw_stats_window(
            ui,
            &self.frame_timer,
            &self.mesh_summary,
            &stats,
            &mut self.request_redraws,
        );
        let draw_data = self.imgui.render();

        renderer.draw(self.camera_controller.get_camera(), draw_data)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Report) {
        log::error!("{error:#}");
        self.error.get_or_insert(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: StartCause) {
        let curr_frame_time = Instant::now();
        self.delta_time_secs = curr_frame_time.duration_since(self.prev_frame_time).as_secs_f32();
        self.prev_frame_time = curr_frame_time;
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_none() {
            if let Err(error) = self.init_renderer(event_loop) {
                self.fail(event_loop, error);
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if window_id != renderer.window().id() {
            return;
        }

        let scale_factor = renderer.window().scale_factor();
        ui::feed_window_event(self.imgui.io_mut(), &event, scale_factor);
        self.input_state.process_window_events(&event);

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                renderer.request_resize();
                renderer.window().request_redraw();
            }
            WindowEvent::RedrawRequested => {
                if let Err(error) = self.redraw() {
                    self.fail(event_loop, error);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: key,
                    state: ElementState::Pressed,
                    repeat: false,
                    ..
                },
                ..
            } => match key.as_ref() {
                Key::Character("r") => {
                    self.request_redraws = !self.request_redraws;
                    log::info!("Continuous redraw: {}", self.request_redraws);
                }
                Key::Named(NamedKey::Escape) => {
                    self.close_requested = true;
                }
                _ => {}
            },
            // Any other input may change the overlay or the camera
            WindowEvent::CursorMoved { .. }
            | WindowEvent::MouseInput { .. }
            | WindowEvent::MouseWheel { .. } => {
                renderer.window().request_redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
            return;
        }

        if let Some(renderer) = self.renderer.as_ref() {
            if self.request_redraws {
                renderer.window().request_redraw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer.take();
    }
}
