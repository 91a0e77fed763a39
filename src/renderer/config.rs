/// Renderer options chosen at startup, such as present mode and validation layers
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Wait for vertical blank (FIFO) instead of preferring MAILBOX/IMMEDIATE
    pub vsync: bool,
    /// Enable `VK_LAYER_KHRONOS_validation` and route its messages into the log
    pub validation: bool,
    /// Color the framebuffer is cleared to before the overlay draws
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            validation: cfg!(debug_assertions),
            clear_color: [0.08, 0.09, 0.11, 1.0],
        }
    }
}
