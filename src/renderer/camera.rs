use ash::vk;
use glam::{Mat4, Vec3};

pub fn calculate_pitch(forward: Vec3) -> f32 {
    let forward = forward.normalize();
    forward.y.clamp(-1.0, 1.0).asin()
}

pub fn calculate_yaw(forward: Vec3) -> f32 {
    let forward = forward.normalize();
    forward.z.atan2(forward.x)
}

pub fn calculate_direction(pitch: f32, yaw: f32) -> Vec3 {
    Vec3::new(
        yaw.cos() * pitch.cos(),
        pitch.sin(),
        yaw.sin() * pitch.cos(),
    )
}

/// Width over height, or 1 for a degenerate extent
pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.width == 0 || extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    }
}

pub struct Camera {
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    right: Vec3,
    world_up: Vec3,
    fov_y_deg: f32,
    near: f32,
    far: f32,
    pivot: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    const DEFAULT_FOV_Y_DEG: f32 = 45.0;

    pub fn new() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            world_up: Vec3::Y,
            fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            near: 0.1,
            far: 100.0,
            pivot: Vec3::ZERO,
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.look_at(self.pivot);
    }

    pub fn look_at(&mut self, target: Vec3) {
        if target == self.position {
            return;
        }
        self.pivot = target;
        self.forward = (target - self.position).normalize();
        self.right = self.forward.cross(self.world_up).normalize();
        self.up = self.right.cross(self.forward).normalize();
    }

    pub fn get_viewproj_mat(&self, aspect_ratio: f32) -> Mat4 {
        self.get_proj_mat(aspect_ratio) * self.get_view_mat()
    }

    pub fn get_view_mat(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    /// Right-handed perspective with Y flipped for Vulkan's downward framebuffer Y axis
    pub fn get_proj_mat(&self, aspect_ratio: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            aspect_ratio,
            self.near,
            self.far,
        );
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn get_position(&self) -> Vec3 {
        self.position
    }

    pub fn get_forward(&self) -> Vec3 {
        self.forward
    }

    pub fn get_up(&self) -> Vec3 {
        self.up
    }

    pub fn get_right(&self) -> Vec3 {
        self.right
    }

    pub fn get_near(&self) -> f32 {
        self.near
    }

    pub fn get_far(&self) -> f32 {
        self.far
    }

    pub fn get_fov_y(&self) -> f32 {
        self.fov_y_deg.to_radians()
    }

    pub fn get_pivot(&self) -> Vec3 {
        self.pivot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_builds_orthonormal_basis() {
        let mut camera = Camera::new();
        camera.set_position(Vec3::new(3.0, 2.0, 4.0));
        let (f, r, u) = (camera.get_forward(), camera.get_right(), camera.get_up());
        assert!((f.length() - 1.0).abs() < 1e-5);
        assert!(f.dot(r).abs() < 1e-5);
        assert!(f.dot(u).abs() < 1e-5);
        assert!(r.dot(u).abs() < 1e-5);
        assert!(u.y > 0.0);
        assert!(f.abs_diff_eq(-Vec3::new(3.0, 2.0, 4.0).normalize(), 1e-5));
    }

    #[test]
    fn projection_maps_world_up_to_framebuffer_top() {
        let camera = Camera::new();
        let clip = camera.get_viewproj_mat(1.0) * Vec3::new(0.0, 1.0, 0.0).extend(1.0);
        let ndc_y = clip.y / clip.w;
        assert!(ndc_y < 0.0, "Vulkan NDC y grows downward, got {ndc_y}");
        let depth = clip.z / clip.w;
        assert!((0.0..=1.0).contains(&depth));
    }

    #[test]
    fn direction_round_trips_through_pitch_and_yaw() {
        let direction = Vec3::new(1.0, 0.5, -2.0).normalize();
        let rebuilt = calculate_direction(calculate_pitch(direction), calculate_yaw(direction));
        assert!(rebuilt.abs_diff_eq(direction, 1e-5));
    }

    #[test]
    fn degenerate_extent_has_unit_aspect() {
        assert_eq!(aspect_ratio(vk::Extent2D { width: 0, height: 10 }), 1.0);
        assert_eq!(aspect_ratio(vk::Extent2D { width: 200, height: 100 }), 2.0);
    }
}
