use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

/// Mouse state accumulated from window events between two frames
#[derive(Default)]
pub struct InputState {
    pub mouse_curr_pos: Vec2,
    pub mouse_prev_pos: Vec2,
    pub mouse_wheel_delta_y: f32,
    pub mouse_left_down: bool,

    pub mouse_right_just_pressed: bool,
    pub mouse_right_just_released: bool,
    pub mouse_right_down: bool,
    pub mouse_right_just_pressed_pos: Vec2,
}

impl InputState {
    pub fn process_window_events(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                match state {
                    ElementState::Pressed => {
                        self.mouse_right_just_pressed = true;
                        self.mouse_right_just_released = false;
                        self.mouse_right_down = true;
                        self.mouse_right_just_pressed_pos = self.mouse_curr_pos;
                    }
                    ElementState::Released => {
                        self.mouse_right_just_pressed = false;
                        self.mouse_right_just_released = true;
                        self.mouse_right_down = false;
                    }
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.mouse_left_down = state.is_pressed();
            }
            WindowEvent::CursorMoved {
                position,
                ..
            } => {
                self.mouse_prev_pos = self.mouse_curr_pos;
                self.mouse_curr_pos = Vec2::new(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel {
                delta,
                ..
            } => {
                // Only the direction matters; trackpads report wildly different magnitudes
                match delta {
                    MouseScrollDelta::LineDelta(_x, y) => {
                        self.mouse_wheel_delta_y += y.signum();
                    }
                    MouseScrollDelta::PixelDelta(pos) => {
                        self.mouse_wheel_delta_y += pos.y.signum() as f32;
                    }
                }
            }
            WindowEvent::Focused(false) => {
                self.mouse_left_down = false;
                if self.mouse_right_down {
                    self.mouse_right_down = false;
                    self.mouse_right_just_released = true;
                }
            }
            _ => {}
        }
    }

    /// Reset the input states for the next frame.
    pub fn reset_frame(&mut self) {
        self.mouse_wheel_delta_y = 0.0;
        self.mouse_prev_pos = self.mouse_curr_pos;
        self.mouse_right_just_pressed = false;
        self.mouse_right_just_released = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;
    use winit::event::{DeviceId, TouchPhase};

    fn device_id() -> DeviceId {
        unsafe { DeviceId::dummy() }
    }

    fn cursor_to(x: f64, y: f64) -> WindowEvent {
        WindowEvent::CursorMoved {
            device_id: device_id(),
            position: PhysicalPosition::new(x, y),
        }
    }

    fn right_button(state: ElementState) -> WindowEvent {
        WindowEvent::MouseInput {
            device_id: device_id(),
            state,
            button: MouseButton::Right,
        }
    }

    #[test]
    fn right_drag_records_press_position_and_motion() {
        let mut input = InputState::default();
        input.process_window_events(&cursor_to(10.0, 20.0));
        input.process_window_events(&right_button(ElementState::Pressed));
        input.process_window_events(&cursor_to(15.0, 25.0));

        assert!(input.mouse_right_down);
        assert!(input.mouse_right_just_pressed);
        assert_eq!(input.mouse_right_just_pressed_pos, Vec2::new(10.0, 20.0));
        assert_eq!(input.mouse_curr_pos - input.mouse_prev_pos, Vec2::new(5.0, 5.0));

        input.reset_frame();
        assert!(!input.mouse_right_just_pressed);
        assert_eq!(input.mouse_prev_pos, input.mouse_curr_pos);

        input.process_window_events(&right_button(ElementState::Released));
        assert!(!input.mouse_right_down);
        assert!(input.mouse_right_just_released);
    }

    #[test]
    fn wheel_accumulates_direction_until_reset() {
        let mut input = InputState::default();
        for delta in [MouseScrollDelta::LineDelta(0.0, 3.0), MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 40.0))] {
            input.process_window_events(&WindowEvent::MouseWheel {
                device_id: device_id(),
                delta,
                phase: TouchPhase::Moved,
            });
        }
        assert_eq!(input.mouse_wheel_delta_y, 2.0);
        input.reset_frame();
        assert_eq!(input.mouse_wheel_delta_y, 0.0);
    }

    #[test]
    fn losing_focus_ends_a_drag() {
        let mut input = InputState::default();
        input.process_window_events(&right_button(ElementState::Pressed));
        input.process_window_events(&WindowEvent::Focused(false));
        assert!(!input.mouse_right_down);
        assert!(input.mouse_right_just_released);
    }
}
