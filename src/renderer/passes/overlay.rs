use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_descriptor::{DescriptorSetLayoutCreateFlags, DescriptorTotalCount};
use imgui::{DrawCmd, DrawData, DrawIdx, DrawVert};
use crate::renderer::core::command_encoder::CommandEncoder;
use crate::renderer::core::descriptor::{DescriptorAllocator, DescriptorAshDevice, DescriptorSet};
use crate::renderer::core::device::RenderDevice;
use crate::renderer::memory::Memory;
use crate::renderer::passes::pipeline::PipelineBuilder;
use crate::renderer::passes::scene::OVERLAY_STENCIL_REFERENCE;
use crate::renderer::passes::{Pass, RecordPass, Subpass};
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::image::{Image, ImageCreateInfo};
use crate::renderer::resources::shader::{spirv, GraphicsShader};
use crate::renderer::shader_data::OverlayPushConstants;

/// Initial geometry capacity, in vertices and indices
const INITIAL_VERTEX_CAPACITY: u64 = 4096;
const INITIAL_INDEX_CAPACITY: u64 = 8192;

/// One indexed draw, already resolved against the shared vertex and index buffers
#[derive(Debug, Clone, Copy, PartialEq)]
struct OverlayDraw {
    scissor: vk::Rect2D,
    index_count: u32,
    first_index: u32,
    vertex_offset: i32,
}

/// Host-visible vertex and index buffers the overlay rewrites every frame.
/// Replaced as a whole when a frame outgrows it.
struct OverlayGeometry {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    memory: Memory,
}

impl OverlayGeometry {
    fn new(vertex_capacity: u64, index_capacity: u64, device: &RenderDevice) -> Result<Self> {
        let logical = device.logical.clone();
        let mut vertex_buffer = Buffer::new(
            vertex_capacity * size_of::<DrawVert>() as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            logical.clone(),
        )?;
        let mut index_buffer = Buffer::new(
            index_capacity * size_of::<DrawIdx>() as u64,
            vk::BufferUsageFlags::INDEX_BUFFER,
            logical.clone(),
        )?;
        let memory = Memory::for_requirements(
            "overlay geometry",
            &[vertex_buffer.requirements, index_buffer.requirements],
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &device.memory_types,
            logical,
        )?;
        memory.bind_buffers(&mut [&mut vertex_buffer, &mut index_buffer])?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            memory,
        })
    }

    fn vertex_capacity(&self) -> u64 {
        self.vertex_buffer.size / size_of::<DrawVert>() as u64
    }

    fn index_capacity(&self) -> u64 {
        self.index_buffer.size / size_of::<DrawIdx>() as u64
    }
}

/// Draws ImGui output first, marking every covered pixel in the stencil buffer.
pub struct OverlayPass {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_set: Option<DescriptorSet>,
    descriptor_allocator: Arc<Mutex<DescriptorAllocator>>,
    sampler: vk::Sampler,
    shader: GraphicsShader,
    subpass: Subpass,
    extent: vk::Extent2D,

    draws: Vec<OverlayDraw>,
    push_constants: OverlayPushConstants,
    viewport: vk::Viewport,

    // Resources before the arenas they are bound into
    geometry: OverlayGeometry,
    font_atlas: Image,
    font_memory: Memory,

    device: Arc<ash::Device>,
}

impl OverlayPass {
    pub fn new(
        subpass: Subpass,
        imgui: &mut imgui::Context,
        extent: vk::Extent2D,
        device: &RenderDevice,
    ) -> Result<Self> {
        let logical = device.logical.clone();

        let (font_atlas, font_memory) = upload_font_atlas(imgui.fonts(), device)?;
        let geometry = OverlayGeometry::new(INITIAL_VERTEX_CAPACITY, INITIAL_INDEX_CAPACITY, device)?;

        let shader = GraphicsShader::new(&spirv::OVERLAY_VERT, &spirv::OVERLAY_FRAG, logical.clone())?;
        let sampler = create_sampler(&logical)?;
        let descriptor_set_layout = create_descriptor_set_layout(&logical)
            .inspect_err(|_| unsafe { logical.destroy_sampler(sampler, None) })?;

        let mut pass = Self {
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            descriptor_set_layout,
            descriptor_set: None,
            descriptor_allocator: device.descriptor_allocator.clone(),
            sampler,
            shader,
            subpass,
            extent,

            draws: Vec::new(),
            push_constants: OverlayPushConstants::default(),
            viewport: vk::Viewport::default(),

            geometry,
            font_atlas,
            font_memory,

            device: logical,
        };

        // From here on Drop cleans up whatever was created
        pass.descriptor_set = Some(pass.allocate_descriptor_set()?);
        pass.pipeline_layout = create_pipeline_layout(&pass.device, descriptor_set_layout)?;
        pass.pipeline = PipelineBuilder::new(&pass.shader, pass.pipeline_layout, subpass)
            .with_vertex_input(&[overlay_binding_description()], &overlay_attribute_descriptions())
            .with_alpha_blending_enabled()
            .with_depth_stencil(depth_stencil_state())
            .build(&pass.device)?;

        // A single texture is bound for every draw
        imgui.fonts().tex_id = imgui::TextureId::new(0);

        log::info!(
            "Overlay pass ready: {}x{} font atlas",
            pass.font_atlas.extent.width,
            pass.font_atlas.extent.height,
        );

        Ok(pass)
    }

    /// Copies this frame's ImGui geometry into the overlay buffers and resolves its draw list.
    /// Must not be called while a previous frame that reads the buffers is still executing.
    pub fn prepare(&mut self, draw_data: &DrawData, device: &RenderDevice) -> Result<()> {
        self.draws.clear();

        let fb_width = draw_data.display_size[0] * draw_data.framebuffer_scale[0];
        let fb_height = draw_data.display_size[1] * draw_data.framebuffer_scale[1];
        if fb_width <= 0.0 || fb_height <= 0.0 || draw_data.total_idx_count <= 0 {
            return Ok(());
        }

        let vertex_count = draw_data.total_vtx_count as u64;
        let index_count = draw_data.total_idx_count as u64;
        if vertex_count > self.geometry.vertex_capacity() || index_count > self.geometry.index_capacity() {
            let vertex_capacity = grown_capacity(self.geometry.vertex_capacity(), vertex_count);
            let index_capacity = grown_capacity(self.geometry.index_capacity(), index_count);
            log::debug!("Growing overlay geometry to {vertex_capacity} vertices, {index_capacity} indices");
            self.geometry = OverlayGeometry::new(vertex_capacity, index_capacity, device)?;
        }

        let mut vertex_base = 0u64;
        let mut index_base = 0u64;
        for draw_list in draw_data.draw_lists() {
            let vertices = draw_list.vtx_buffer();
            let indices = draw_list.idx_buffer();
            if !vertices.is_empty() {
                self.geometry.vertex_buffer.write(vertices, vertex_base * size_of::<DrawVert>() as u64)?;
            }
            if !indices.is_empty() {
                self.geometry.index_buffer.write(indices, index_base * size_of::<DrawIdx>() as u64)?;
            }

            for command in draw_list.commands() {
                match command {
                    DrawCmd::Elements { count, cmd_params } => {
                        let Some(scissor) = clip_rect_to_scissor(
                            cmd_params.clip_rect,
                            draw_data.display_pos,
                            draw_data.framebuffer_scale,
                            self.extent,
                        ) else {
                            continue;
                        };
                        self.draws.push(OverlayDraw {
                            scissor,
                            index_count: count as u32,
                            first_index: (index_base + cmd_params.idx_offset as u64) as u32,
                            vertex_offset: (vertex_base + cmd_params.vtx_offset as u64) as i32,
                        });
                    }
                    // Render state never changes between overlay draws
                    DrawCmd::ResetRenderState => {}
                    DrawCmd::RawCallback { .. } => {
                        log::warn!("Ignoring ImGui draw callback");
                    }
                }
            }

            vertex_base += vertices.len() as u64;
            index_base += indices.len() as u64;
        }

        self.push_constants = OverlayPushConstants::new(draw_data.display_pos, draw_data.display_size);
        self.viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: fb_width,
            height: fb_height,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        Ok(())
    }

    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }

    pub fn geometry_memory(&self) -> &Memory {
        &self.geometry.memory
    }

    pub fn font_memory(&self) -> &Memory {
        &self.font_memory
    }

    fn allocate_descriptor_set(&self) -> Result<DescriptorSet> {
        let mut allocator = self
            .descriptor_allocator
            .lock()
            .map_err(|_| eyre!("Descriptor allocator lock poisoned"))?;
        let set = unsafe {
            allocator
                .allocate(
                    &DescriptorAshDevice(self.device.clone()),
                    &self.descriptor_set_layout,
                    DescriptorSetLayoutCreateFlags::empty(),
                    &DescriptorTotalCount {
                        sampler: 1,
                        sampled_image: 1,
                        ..Default::default()
                    },
                    1,
                )?
                .drain(..)
                .next()
                .ok_or_eyre("Failed to allocate overlay descriptor set")?
        };

        let font_view = self
            .font_atlas
            .view()
            .ok_or_eyre("Font atlas has no image view")?;
        let image_infos = [vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: font_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let sampler_infos = [vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::UNDEFINED,
        }];
        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(*set.raw())
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                .image_info(&image_infos),
            vk::WriteDescriptorSet::default()
                .dst_set(*set.raw())
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::SAMPLER)
                .image_info(&sampler_infos),
        ];
        unsafe {
            self.device.update_descriptor_sets(&writes, &[]);
        }

        Ok(set)
    }
}

impl Pass for OverlayPass {
    /// Viewport and scissor are dynamic; only the clamp bounds change.
    fn resize(&mut self, extent: vk::Extent2D) -> Result<()> {
        self.extent = extent;
        self.draws.clear();
        Ok(())
    }
}

impl RecordPass<CommandEncoder<'_>> for OverlayPass {
    fn record_pass(&self, encoder: &mut CommandEncoder<'_>) -> Result<()> {
        if self.draws.is_empty() {
            return Ok(());
        }
        let descriptor_set = self
            .descriptor_set
            .as_ref()
            .ok_or_eyre("Overlay descriptor set missing")?;

        let cmd = encoder.command_buffer;
        unsafe {
            encoder.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            encoder.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[*descriptor_set.raw()],
                &[],
            );
            encoder.device.cmd_push_constants(
                cmd,
                self.pipeline_layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&self.push_constants),
            );
            encoder.device.cmd_bind_vertex_buffers(cmd, 0, &[self.geometry.vertex_buffer.buffer], &[0]);
            encoder.device.cmd_bind_index_buffer(
                cmd,
                self.geometry.index_buffer.buffer,
                0,
                vk::IndexType::UINT16,
            );
            encoder.device.cmd_set_viewport(cmd, 0, &[self.viewport]);
        }

        for draw in &self.draws {
            unsafe {
                encoder.device.cmd_set_scissor(cmd, 0, &[draw.scissor]);
                encoder.device.cmd_draw_indexed(cmd, draw.index_count, 1, draw.first_index, draw.vertex_offset, 0);
            }
        }

        Ok(())
    }
}

impl Drop for OverlayPass {
    fn drop(&mut self) {
        if let Some(set) = self.descriptor_set.take() {
            match self.descriptor_allocator.lock() {
                Ok(mut allocator) => unsafe {
                    allocator.free(&DescriptorAshDevice(self.device.clone()), [set]);
                },
                Err(_) => log::error!("Descriptor allocator lock poisoned; leaking overlay descriptor set"),
            }
        }
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Converts an ImGui clip rectangle into a framebuffer scissor, clamped to `extent`.
/// Returns `None` when nothing of the rectangle remains visible.
pub fn clip_rect_to_scissor(
    clip_rect: [f32; 4],
    display_pos: [f32; 2],
    framebuffer_scale: [f32; 2],
    extent: vk::Extent2D,
) -> Option<vk::Rect2D> {
    let min_x = ((clip_rect[0] - display_pos[0]) * framebuffer_scale[0]).max(0.0);
    let min_y = ((clip_rect[1] - display_pos[1]) * framebuffer_scale[1]).max(0.0);
    let max_x = ((clip_rect[2] - display_pos[0]) * framebuffer_scale[0]).min(extent.width as f32);
    let max_y = ((clip_rect[3] - display_pos[1]) * framebuffer_scale[1]).min(extent.height as f32);
    if max_x <= min_x || max_y <= min_y {
        return None;
    }

    Some(vk::Rect2D {
        offset: vk::Offset2D {
            x: min_x as i32,
            y: min_y as i32,
        },
        extent: vk::Extent2D {
            width: (max_x - min_x) as u32,
            height: (max_y - min_y) as u32,
        },
    })
}

/// Next capacity that holds `required`, doubling from the current one
pub fn grown_capacity(current: u64, required: u64) -> u64 {
    required.next_power_of_two().max(current)
}

/// Draws everywhere and writes the overlay reference into the stencil buffer.
pub fn depth_stencil_state() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    let stencil = vk::StencilOpState {
        fail_op: vk::StencilOp::KEEP,
        pass_op: vk::StencilOp::REPLACE,
        depth_fail_op: vk::StencilOp::KEEP,
        compare_op: vk::CompareOp::ALWAYS,
        compare_mask: 0xff,
        write_mask: 0xff,
        reference: OVERLAY_STENCIL_REFERENCE,
    };
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(false)
        .depth_write_enable(false)
        .depth_compare_op(vk::CompareOp::ALWAYS)
        .stencil_test_enable(true)
        .front(stencil)
        .back(stencil)
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0)
}

fn overlay_binding_description() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<DrawVert>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

fn overlay_attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: std::mem::offset_of!(DrawVert, pos) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: std::mem::offset_of!(DrawVert, uv) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R8G8B8A8_UNORM,
            offset: std::mem::offset_of!(DrawVert, col) as u32,
        },
    ]
}

fn upload_font_atlas(fonts: &mut imgui::FontAtlas, device: &RenderDevice) -> Result<(Image, Memory)> {
    let texture = fonts.build_rgba32_texture();
    let extent = vk::Extent2D {
        width: texture.width,
        height: texture.height,
    };

    let logical = device.logical.clone();
    let mut image = Image::new(
        &ImageCreateInfo::sampled(vk::Format::R8G8B8A8_UNORM, extent),
        logical.clone(),
    )?;
    let memory = Memory::for_requirements(
        "font atlas",
        &[image.requirements],
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        &device.memory_types,
        logical,
    )?;
    memory.bind_images(&mut [&mut image])?;
    image.create_view()?;

    let mut staging = device.create_staging_buffer(texture.data.len() as u64)?;
    staging.upload_to_image(texture.data, &mut image, device.transfer_context()?)?;

    Ok((image, memory))
}

fn create_sampler(device: &ash::Device) -> Result<vk::Sampler> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .min_lod(-1000.0)
        .max_lod(1000.0)
        .max_anisotropy(1.0);
    Ok(unsafe { device.create_sampler(&info, None)? })
}

fn create_descriptor_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT),
        vk::DescriptorSetLayoutBinding::default()
            .binding(1)
            .descriptor_type(vk::DescriptorType::SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT),
    ];
    let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    Ok(unsafe { device.create_descriptor_set_layout(&info, None)? })
}

fn create_pipeline_layout(
    device: &ash::Device,
    descriptor_set_layout: vk::DescriptorSetLayout,
) -> Result<vk::PipelineLayout> {
    let set_layouts = [descriptor_set_layout];
    let push_constant_ranges = [vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: size_of::<OverlayPushConstants>() as u32,
    }];
    let info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&push_constant_ranges);
    Ok(unsafe { device.create_pipeline_layout(&info, None)? })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 800, height: 600 };

    #[test]
    fn clip_rect_scales_into_framebuffer_pixels() {
        let scissor = clip_rect_to_scissor([10.0, 20.0, 110.0, 70.0], [0.0, 0.0], [2.0, 2.0], EXTENT)
            .unwrap();
        assert_eq!(scissor.offset, vk::Offset2D { x: 20, y: 40 });
        assert_eq!(scissor.extent, vk::Extent2D { width: 200, height: 100 });
    }

    #[test]
    fn clip_rect_is_clamped_to_the_framebuffer() {
        let scissor = clip_rect_to_scissor([-50.0, -50.0, 1000.0, 1000.0], [0.0, 0.0], [1.0, 1.0], EXTENT)
            .unwrap();
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(scissor.extent, EXTENT);
    }

    #[test]
    fn clip_rect_respects_display_origin() {
        let scissor = clip_rect_to_scissor([110.0, 60.0, 130.0, 90.0], [100.0, 50.0], [1.0, 1.0], EXTENT)
            .unwrap();
        assert_eq!(scissor.offset, vk::Offset2D { x: 10, y: 10 });
        assert_eq!(scissor.extent, vk::Extent2D { width: 20, height: 30 });
    }

    #[test]
    fn empty_or_offscreen_clip_rects_are_skipped() {
        assert!(clip_rect_to_scissor([50.0, 50.0, 50.0, 80.0], [0.0, 0.0], [1.0, 1.0], EXTENT).is_none());
        assert!(clip_rect_to_scissor([900.0, 0.0, 950.0, 10.0], [0.0, 0.0], [1.0, 1.0], EXTENT).is_none());
    }

    #[test]
    fn capacity_grows_to_power_of_two_and_never_shrinks() {
        assert_eq!(grown_capacity(4096, 5000), 8192);
        assert_eq!(grown_capacity(16384, 5000), 16384);
        assert_eq!(grown_capacity(0, 1), 1);
    }

    #[test]
    fn overlay_vertex_layout_matches_imgui() {
        assert_eq!(size_of::<DrawVert>(), 20);
        let offsets = overlay_attribute_descriptions().map(|a| a.offset);
        assert_eq!(offsets, [0, 8, 16]);
    }

    #[test]
    fn overlay_marks_stencil_without_depth() {
        let state = depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::FALSE);
        assert_eq!(state.front.compare_op, vk::CompareOp::ALWAYS);
        assert_eq!(state.front.pass_op, vk::StencilOp::REPLACE);
        assert_eq!(state.front.reference, OVERLAY_STENCIL_REFERENCE);
    }
}
