use std::collections::VecDeque;
use imgui::{Condition, Io, MouseButton as ImguiMouseButton};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use crate::mesh::MeshData;
use crate::renderer::RenderStats;

/// Rolling window of recent frame times
pub struct FrameTimer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, delta_secs: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(delta_secs);
    }

    /// Mean frame time in milliseconds
    pub fn average_ms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32 * 1000.0
    }

    pub fn fps(&self) -> f32 {
        let ms = self.average_ms();
        if ms > 0.0 { 1000.0 / ms } else { 0.0 }
    }
}

/// Mesh figures shown in the stats window, computed once at load
pub struct MeshSummary {
    pub name: String,
    pub vertices: usize,
    pub triangles: usize,
    pub groups: usize,
}

impl MeshSummary {
    pub fn new(name: impl Into<String>, mesh: &MeshData) -> Self {
        Self {
            name: name.into(),
            vertices: mesh.vertices.len(),
            triangles: mesh.triangle_count(),
            groups: mesh.groups.len(),
        }
    }
}

/// Forwards the mouse events ImGui cares about. Positions are converted to logical pixels.
pub fn feed_window_event(io: &mut Io, event: &WindowEvent, scale_factor: f64) {
    match event {
        WindowEvent::CursorMoved { position, .. } => {
            let logical = position.to_logical::<f32>(scale_factor);
            io.add_mouse_pos_event([logical.x, logical.y]);
        }
        WindowEvent::MouseInput { state, button, .. } => {
            let button = match button {
                MouseButton::Left => ImguiMouseButton::Left,
                MouseButton::Right => ImguiMouseButton::Right,
                MouseButton::Middle => ImguiMouseButton::Middle,
                MouseButton::Back => ImguiMouseButton::Extra1,
                MouseButton::Forward => ImguiMouseButton::Extra2,
                MouseButton::Other(_) => return,
            };
            io.add_mouse_button_event(button, *state == ElementState::Pressed);
        }
        WindowEvent::MouseWheel { delta, .. } => {
            let [x, y] = match delta {
                MouseScrollDelta::LineDelta(x, y) => [*x, *y],
                MouseScrollDelta::PixelDelta(pos) => {
                    let logical = pos.to_logical::<f32>(scale_factor);
                    [logical.x / 20.0, logical.y / 20.0]
                }
            };
            io.add_mouse_wheel_event([x, y]);
        }
        WindowEvent::CursorLeft { .. } => {
            io.add_mouse_pos_event([f32::MAX, f32::MAX]);
        }
        _ => {}
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

pub fn draw_stats_window(
    ui: &imgui::Ui,
    timer: &FrameTimer,
    mesh: &MeshSummary,
    stats: &RenderStats,
    continuous_redraw: &mut bool,
) {
    ui.window("Stats")
        .position([12.0, 12.0], Condition::FirstUseEver)
        .size([320.0, 0.0], Condition::FirstUseEver)
        .always_auto_resize(true)
        .build(|| {
            ui.text(format!("{:.2} ms ({:.0} fps)", timer.average_ms(), timer.fps()));
            ui.text(format!(
                "{}x{} {:?}, {} backbuffers",
                stats.extent.width, stats.extent.height, stats.present_mode, stats.backbuffers,
            ));
            ui.text(format!("Frames: {}  Overlay draws: {}", stats.frames, stats.overlay_draws));
            if stats.validation {
                ui.text("Validation layer enabled");
            }
            ui.checkbox("Continuous redraw (r)", continuous_redraw);

            ui.separator();
            ui.text(&mesh.name);
            ui.text(format!(
                "{} vertices, {} triangles, {} groups",
                mesh.vertices, mesh.triangles, mesh.groups,
            ));

            ui.separator();
            for arena in &stats.arenas {
                let percent = if arena.size > 0 { arena.used * 100 / arena.size } else { 0 };
                ui.text(format!(
                    "{}: {} / {} ({}%, {} bound)",
                    arena.name,
                    format_bytes(arena.used),
                    format_bytes(arena.size),
                    percent,
                    arena.bound,
                ));
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_timer_averages_recent_samples() {
        let mut timer = FrameTimer::new(2);
        assert_eq!(timer.average_ms(), 0.0);
        timer.record(0.010);
        timer.record(0.020);
        timer.record(0.030);
        assert!((timer.average_ms() - 25.0).abs() < 1e-3);
        assert!((timer.fps() - 40.0).abs() < 1e-2);
    }

    #[test]
    fn byte_sizes_pick_a_readable_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn cursor_position_reaches_imgui_in_logical_pixels() {
        let mut imgui = imgui::Context::create();
        imgui.set_ini_filename(None);
        let io = imgui.io_mut();
        let device_id = unsafe { winit::event::DeviceId::dummy() };
        feed_window_event(
            io,
            &WindowEvent::CursorMoved {
                device_id,
                position: winit::dpi::PhysicalPosition::new(200.0, 100.0),
            },
            2.0,
        );

        io.display_size = [400.0, 300.0];
        io.delta_time = 1.0 / 60.0;
        let _ = imgui.fonts().build_rgba32_texture();
        let ui = imgui.new_frame();
        assert_eq!(ui.io().mouse_pos, [100.0, 50.0]);
        imgui.render();
    }
}
