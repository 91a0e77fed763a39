//! The render graph: one render pass with a fixed list of subpasses, each recorded by a [`Pass`].

pub mod multipass;
pub mod overlay;
pub mod pipeline;
pub mod render_pass;
pub mod scene;

use ash::vk;
use color_eyre::Result;

pub use multipass::{MultiPass, PassBuilders, PassChain, RecordChain};
pub use overlay::OverlayPass;
pub use pipeline::PipelineBuilder;
pub use render_pass::RenderPass;
pub use scene::ScenePass;

/// Render pass scoped commands, the only ones [`MultiPass`] issues itself.
pub trait RenderPassEncoder {
    fn begin_render_pass(&mut self, begin: &RenderPassBegin);
    fn next_subpass(&mut self);
    fn end_render_pass(&mut self);
}

#[derive(Clone, Copy)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
    /// One per attachment, in attachment order: color, then depth/stencil
    pub clear_values: [vk::ClearValue; 2],
}

/// Identifies the subpass a [`Pass`] records into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subpass {
    pub render_pass: vk::RenderPass,
    pub index: u32,
}

/// One subpass's renderer. Built once against its [`Subpass`]; pipelines and other fixed state
/// exist before construction returns.
pub trait Pass {
    /// Rebuilds whatever depends on the framebuffer size.
    fn resize(&mut self, _extent: vk::Extent2D) -> Result<()> {
        Ok(())
    }
}

/// Records a [`Pass`] through encoder type `E`.
pub trait RecordPass<E>: Pass {
    /// Appends draw commands. The encoder is already inside this pass's subpass.
    fn record_pass(&self, encoder: &mut E) -> Result<()>;
}
