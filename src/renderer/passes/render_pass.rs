use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

pub const COLOR_ATTACHMENT: u32 = 0;
pub const DEPTH_STENCIL_ATTACHMENT: u32 = 1;
pub const SUBPASS_COUNT: u32 = 2;

/// Color plus depth/stencil, both cleared on load. Only color is stored.
pub fn attachment_descriptions(
    color_format: vk::Format,
    depth_format: vk::Format,
    color_final_layout: vk::ImageLayout,
) -> [vk::AttachmentDescription; 2] {
    [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(color_final_layout),
        vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ]
}

/// Acquisition ordering into subpass 0, and the overlay's depth/stencil writes ahead of the
/// scene's stencil reads.
pub fn subpass_dependencies() -> [vk::SubpassDependency; 2] {
    let fragment_tests = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | fragment_tests)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | fragment_tests)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(1)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | fragment_tests)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | fragment_tests)
            .src_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ
                    | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    ]
}

/// The overlay subpass followed by the scene subpass, sharing both attachments.
pub struct RenderPass {
    pub handle: vk::RenderPass,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    device: Arc<ash::Device>,
}

impl RenderPass {
    /// `color_final_layout` is `PRESENT_SRC_KHR` for swapchain images.
    pub fn new(
        color_format: vk::Format,
        depth_format: vk::Format,
        color_final_layout: vk::ImageLayout,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let attachments = attachment_descriptions(color_format, depth_format, color_final_layout);
        let color_refs = [vk::AttachmentReference {
            attachment: COLOR_ATTACHMENT,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: DEPTH_STENCIL_ATTACHMENT,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref);
        let subpasses = [subpass; SUBPASS_COUNT as usize];
        let dependencies = subpass_dependencies();

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let handle = unsafe { device.create_render_pass(&info, None)? };

        Ok(Self {
            handle,
            color_format,
            depth_format,
            device,
        })
    }

    pub fn subpass_count(&self) -> u32 {
        SUBPASS_COUNT
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}

pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_attachments_clear_and_only_color_is_kept() {
        let [color, depth] = attachment_descriptions(
            vk::Format::B8G8R8A8_UNORM,
            vk::Format::D24_UNORM_S8_UINT,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.stencil_load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(depth.format, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn scene_waits_for_overlay_stencil_writes() {
        let deps = subpass_dependencies();
        assert_eq!(deps[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(deps[0].dst_subpass, 0);

        let overlay_to_scene = deps
            .iter()
            .find(|d| d.src_subpass == 0 && d.dst_subpass == 1)
            .unwrap();
        assert!(overlay_to_scene.src_access_mask.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(overlay_to_scene.dst_access_mask.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ));
        assert!(overlay_to_scene.dst_stage_mask.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
    }

    #[test]
    fn clear_values_follow_attachment_order() {
        let values = clear_values([0.1, 0.2, 0.3, 1.0]);
        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }
}
