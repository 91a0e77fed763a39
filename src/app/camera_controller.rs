use std::f32::consts::PI;
use glam::{FloatExt, Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use winit::dpi::PhysicalPosition;
use winit::window::Window;
use crate::app::input_state::InputState;
use crate::renderer::camera::{calculate_direction, calculate_pitch, calculate_yaw, Camera};

/// Radius of the sphere enclosing the mesh after it is fitted into the unit cube
pub const FITTED_MESH_RADIUS: f32 = 1.732_050_8;

/// Orbits a camera around its pivot: right-drag rotates, the wheel zooms.
pub struct CameraController {
    camera: Camera,

    rotation_sensitivity: f32,
    rotation_smoothing_speed: f32,
    rotation_desired_pivot_to_eye: Vec3,
    rotation_current_pivot_to_eye: Vec3,
    rotation_max_angle_y: f32,

    zoom_sensitivity: f32,
    zoom_smoothing_speed: f32,
    zoom_desired_distance: f32,
    zoom_current_distance: f32,
}

impl CameraController {
    pub fn new(camera: Camera) -> Self {
        let zoom_current_distance = camera.get_pivot().distance(camera.get_position());
        let rotation_current_pivot_to_eye = camera.get_position() - camera.get_pivot();
        Self {
            camera,

            rotation_sensitivity: 2.0,
            rotation_smoothing_speed: 10.0,
            rotation_desired_pivot_to_eye: rotation_current_pivot_to_eye,
            rotation_current_pivot_to_eye,
            rotation_max_angle_y: 80.0_f32.to_radians(),

            zoom_sensitivity: 2.0,
            zoom_smoothing_speed: 4.0,
            zoom_desired_distance: zoom_current_distance,
            zoom_current_distance,
        }
    }

    /// Places the camera so a sphere of `radius` around the pivot fills the view.
    pub fn frame_radius(&mut self, radius: f32) {
        let distance = framing_distance(radius, self.camera.get_fov_y())
            .clamp(self.camera.get_near() + 0.1, self.camera.get_far() - 0.1);
        let direction = Vec3::new(1.0, 0.8, 1.6).normalize();
        self.zoom_current_distance = distance;
        self.zoom_desired_distance = distance;
        self.rotation_current_pivot_to_eye = direction * distance;
        self.rotation_desired_pivot_to_eye = self.rotation_current_pivot_to_eye;
        self.camera.set_position(self.camera.get_pivot() + self.rotation_current_pivot_to_eye);
    }

    pub fn get_camera(&self) -> &Camera {
        &self.camera
    }

    pub fn zoom_distance(&self) -> f32 {
        self.zoom_current_distance
    }

    /// Applies this frame's input. Mouse input is ignored while `ui_captures_mouse` is set,
    /// except to finish a drag already in progress.
    pub fn process_input(
        &mut self,
        input_state: &mut InputState,
        window: &Window,
        delta_time: f32,
        ui_captures_mouse: bool,
    ) {
        let window_size = window.inner_size();
        let window_center = Vec2::new(
            window_size.width as f32 / 2.0,
            window_size.height as f32 / 2.0,
        );

        if input_state.mouse_right_just_pressed && !ui_captures_mouse {
            window.set_cursor_visible(false);
            // Set the cursor position to the center of the viewport
            set_window_mouse_pos(window, window_center);
            input_state.mouse_curr_pos = window_center;
            input_state.mouse_prev_pos = input_state.mouse_curr_pos;
        } else if input_state.mouse_right_just_released {
            window.set_cursor_visible(true);
            // Reset the cursor position to the position where the right mouse button was pressed
            set_window_mouse_pos(window, input_state.mouse_right_just_pressed_pos);
            input_state.mouse_curr_pos = input_state.mouse_right_just_pressed_pos;
            input_state.mouse_prev_pos = input_state.mouse_curr_pos;
        }

        if input_state.mouse_right_down && !ui_captures_mouse {
            self.set_desired_rotation_pivot_to_eye(
                input_state.mouse_prev_pos,
                input_state.mouse_curr_pos,
                window_size.width as f32,
                window_size.height as f32,
            );

            if mouse_near_border(
                input_state.mouse_curr_pos,
                Vec2::new(window_size.width as f32, window_size.height as f32),
                (window_size.width.min(window_size.height) / 4) as f32,
            ) {
                let prev_to_curr = input_state.mouse_curr_pos - input_state.mouse_prev_pos;
                input_state.mouse_prev_pos = window_center;
                input_state.mouse_curr_pos = input_state.mouse_prev_pos + prev_to_curr;
                set_window_mouse_pos(window, input_state.mouse_curr_pos);
            }
        }

        if !ui_captures_mouse {
            self.set_desired_zoom_distance(input_state.mouse_wheel_delta_y * self.zoom_sensitivity);
        }

        self.update(delta_time);
    }

    /// Moves the current rotation and zoom toward their targets.
    pub fn update(&mut self, delta_time: f32) {
        self.update_zoom_lerp(delta_time);
        self.update_rotation_slerp(delta_time);
    }

    fn set_desired_zoom_distance(&mut self, delta: f32) {
        if delta == 0.0 {
            return;
        }

        let cam = &self.camera;

        // Scale delta by the current distance to make zooming speed independent of distance
        let delta = delta * self.zoom_current_distance * 0.1;
        self.zoom_desired_distance = (self.zoom_current_distance - delta)
            .clamp(cam.get_near() + 0.1, cam.get_far() - 0.1);
    }

    fn set_desired_rotation_pivot_to_eye(
        &mut self,
        prev_mouse_pos: Vec2,
        curr_mouse_pos: Vec2,
        viewport_width: f32,
        viewport_height: f32,
    ) {
        if viewport_width <= 0.0 || viewport_height <= 0.0 {
            return;
        }
        let cam = &self.camera;

        // Left to right = 2*PI = 360deg, top to bottom = PI = 180deg
        let delta_angle_x = 2.0 * PI / viewport_width;
        let delta_angle_y = PI / viewport_height;
        let angle_x = (prev_mouse_pos.x - curr_mouse_pos.x) * delta_angle_x * self.rotation_sensitivity;
        let angle_y = (prev_mouse_pos.y - curr_mouse_pos.y) * delta_angle_y * self.rotation_sensitivity;

        if angle_x == 0.0 && angle_y == 0.0 {
            return;
        }

        let rot_x = Mat4::from_axis_angle(cam.get_up(), angle_x);
        let rot_y = Mat4::from_axis_angle(cam.get_right(), angle_y);

        let v = self.rotation_current_pivot_to_eye;
        let new_piv_to_eye = (rot_x * rot_y * Vec4::new(v.x, v.y, v.z, 1.0)).xyz();

        self.rotation_desired_pivot_to_eye =
            if calculate_pitch(new_piv_to_eye).abs() <= self.rotation_max_angle_y {
                new_piv_to_eye
            } else {
                let pitch = self.rotation_max_angle_y * new_piv_to_eye.y.signum();
                calculate_direction(pitch, calculate_yaw(new_piv_to_eye))
            };
    }

    fn update_rotation_slerp(&mut self, delta_time: f32) {
        let t = 1.0 - (-self.rotation_smoothing_speed * delta_time).exp();
        self.rotation_current_pivot_to_eye = slerp(
            self.rotation_current_pivot_to_eye,
            self.rotation_desired_pivot_to_eye,
            t,
        ) * self.zoom_current_distance;
        self.camera.set_position(self.camera.get_pivot() + self.rotation_current_pivot_to_eye);
    }

    fn update_zoom_lerp(&mut self, delta_time: f32) {
        let t = 1.0 - (-self.zoom_smoothing_speed * delta_time).exp();
        self.zoom_current_distance = self.zoom_current_distance.lerp(self.zoom_desired_distance, t);
        self.camera.set_position(
            self.camera.get_pivot() - self.camera.get_forward() * self.zoom_current_distance,
        );
    }
}

/// Distance at which a sphere of `radius` exactly fits a vertical field of view of `fov_y`
pub fn framing_distance(radius: f32, fov_y: f32) -> f32 {
    radius / (fov_y * 0.5).sin()
}

fn set_window_mouse_pos(window: &Window, pos: Vec2) {
    if let Err(e) = window.set_cursor_position(PhysicalPosition::new(pos.x as f64, pos.y as f64)) {
        log::debug!("Failed to set cursor position: {e}");
    }
}

fn mouse_near_border(pos: Vec2, window_size: Vec2, border_px: f32) -> bool {
    pos.x < border_px
        || pos.y < border_px
        || pos.x > window_size.x - border_px
        || pos.y > window_size.y - border_px
}

fn slerp(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    let a = a.normalize();
    let b = b.normalize();

    // Clamp to avoid numerical errors
    let dot = a.dot(b).clamp(-1.0, 1.0);
    let theta = dot.acos();

    // If the angle is very small, fallback to LERP (avoids division by 0)
    if theta.abs() < 1e-6 {
        return a.lerp(b, t).normalize();
    }

    let sin_theta = theta.sin();
    let a_part = (((1.0 - t) * theta).sin() / sin_theta) * a;
    let b_part = ((t * theta).sin() / sin_theta) * b;

    a_part + b_part
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framed_sphere_touches_the_view_edges() {
        let fov = 45.0_f32.to_radians();
        let distance = framing_distance(1.0, fov);
        // Tangent line from the eye to the sphere makes half the field of view with the axis
        assert!(((1.0 / distance).asin() - fov * 0.5).abs() < 1e-5);
    }

    #[test]
    fn framing_keeps_pivot_in_front_of_camera() {
        let mut controller = CameraController::new(Camera::new());
        controller.frame_radius(FITTED_MESH_RADIUS);
        let camera = controller.get_camera();
        let to_pivot = (camera.get_pivot() - camera.get_position()).normalize();
        assert!(to_pivot.abs_diff_eq(camera.get_forward(), 1e-5));
        assert!((controller.zoom_distance() - camera.get_position().length()).abs() < 1e-4);
    }

    #[test]
    fn update_without_input_keeps_camera_still() {
        let mut controller = CameraController::new(Camera::new());
        controller.frame_radius(FITTED_MESH_RADIUS);
        let before = controller.get_camera().get_position();
        controller.update(1.0 / 60.0);
        assert!(controller.get_camera().get_position().abs_diff_eq(before, 1e-4));
    }

    #[test]
    fn slerp_stays_on_unit_sphere() {
        let halfway = slerp(Vec3::X, Vec3::Z, 0.5);
        assert!((halfway.length() - 1.0).abs() < 1e-5);
        assert!(halfway.abs_diff_eq(Vec3::new(1.0, 0.0, 1.0).normalize(), 1e-5));
    }

    #[test]
    fn border_detection() {
        let size = Vec2::new(800.0, 600.0);
        assert!(mouse_near_border(Vec2::new(5.0, 300.0), size, 150.0));
        assert!(!mouse_near_border(Vec2::new(400.0, 300.0), size, 150.0));
    }
}
