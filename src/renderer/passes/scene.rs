use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use glam::{Mat4, Vec3};
use crate::mesh::MeshData;
use crate::renderer::core::command_encoder::CommandEncoder;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::memory::Memory;
use crate::renderer::passes::pipeline::PipelineBuilder;
use crate::renderer::passes::{Pass, RecordPass, Subpass};
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::shader::{spirv, GraphicsShader};
use crate::renderer::shader_data::{PerVertexData, ScenePushConstants};

/// Largest single staging submission for mesh uploads
const STAGING_CAPACITY: u64 = 4 * 1024 * 1024;

/// Stencil value the overlay writes wherever it draws
pub const OVERLAY_STENCIL_REFERENCE: u32 = 1;

/// Draws the mesh with depth testing, skipping pixels the overlay already covers.
pub struct ScenePass {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    shader: GraphicsShader,
    subpass: Subpass,
    extent: vk::Extent2D,

    push_constants: ScenePushConstants,
    index_count: u32,

    // Buffers before the arena they are bound into
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    memory: Memory,

    device: Arc<ash::Device>,
}

impl ScenePass {
    pub fn new(
        subpass: Subpass,
        mesh: &MeshData,
        extent: vk::Extent2D,
        device: &RenderDevice,
    ) -> Result<Self> {
        if mesh.indices.is_empty() {
            return Err(eyre!("Mesh has no triangles to draw"));
        }

        let vertices = mesh.vertices.iter().map(PerVertexData::from).collect::<Vec<_>>();
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);

        let logical = device.logical.clone();
        let mut vertex_buffer = Buffer::new(
            vertex_bytes.len() as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            logical.clone(),
        )?;
        let mut index_buffer = Buffer::new(
            index_bytes.len() as u64,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            logical.clone(),
        )?;

        let memory = Memory::for_requirements(
            "scene geometry",
            &[vertex_buffer.requirements, index_buffer.requirements],
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            &device.memory_types,
            logical.clone(),
        )?;
        memory.bind_buffers(&mut [&mut vertex_buffer, &mut index_buffer])?;

        let staging_size = (vertex_bytes.len().max(index_bytes.len()) as u64).min(STAGING_CAPACITY);
        let mut staging = device.create_staging_buffer(staging_size)?;
        let transfer_context = device.transfer_context()?;
        staging.upload_to_buffer(vertex_bytes, &mut vertex_buffer, 0, transfer_context)?;
        staging.upload_to_buffer(index_bytes, &mut index_buffer, 0, transfer_context)?;

        let shader = GraphicsShader::new(&spirv::SCENE_VERT, &spirv::SCENE_FRAG, logical.clone())?;
        let pipeline_layout = create_pipeline_layout(&logical)?;
        let pipeline = create_pipeline(&logical, pipeline_layout, &shader, subpass, extent)
            .inspect_err(|_| unsafe { logical.destroy_pipeline_layout(pipeline_layout, None) })?;

        log::info!(
            "Scene pass ready: {} vertices, {} triangles, {} bytes of geometry",
            vertices.len(),
            mesh.triangle_count(),
            memory.used(),
        );

        Ok(Self {
            pipeline,
            pipeline_layout,
            shader,
            subpass,
            extent,

            push_constants: ScenePushConstants {
                viewproj: Mat4::IDENTITY,
                model: fit_to_unit_cube(mesh.bounds()),
            },
            index_count: mesh.indices.len() as u32,

            vertex_buffer,
            index_buffer,
            memory,

            device: logical,
        })
    }

    pub fn set_view_projection(&mut self, viewproj: Mat4) {
        self.push_constants.viewproj = viewproj;
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }
}

impl Pass for ScenePass {
    /// The viewport is baked into the pipeline, so a new size means a new pipeline.
    fn resize(&mut self, extent: vk::Extent2D) -> Result<()> {
        if extent == self.extent {
            return Ok(());
        }
        let pipeline = create_pipeline(
            &self.device,
            self.pipeline_layout,
            &self.shader,
            self.subpass,
            extent,
        )?;
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
        self.pipeline = pipeline;
        self.extent = extent;
        log::debug!("Rebuilt scene pipeline for {}x{}", extent.width, extent.height);
        Ok(())
    }
}

impl RecordPass<CommandEncoder<'_>> for ScenePass {
    fn record_pass(&self, encoder: &mut CommandEncoder<'_>) -> Result<()> {
        let cmd = encoder.command_buffer;
        unsafe {
            encoder.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            encoder.device.cmd_push_constants(
                cmd,
                self.pipeline_layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&self.push_constants),
            );
            encoder.device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            encoder.device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT32);
            encoder.device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
        }
        Ok(())
    }
}

impl Drop for ScenePass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}

/// Centers the mesh on the origin and scales its largest dimension to 2.
pub fn fit_to_unit_cube(bounds: Option<(Vec3, Vec3)>) -> Mat4 {
    let Some((min, max)) = bounds else {
        return Mat4::IDENTITY;
    };
    let size = (max - min).max_element();
    let scale = if size > f32::EPSILON { 2.0 / size } else { 1.0 };
    Mat4::from_scale(Vec3::splat(scale)) * Mat4::from_translation(-(min + max) * 0.5)
}

/// Depth test and write, and draw only where the overlay left the stencil untouched.
pub fn depth_stencil_state() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    let stencil = vk::StencilOpState {
        fail_op: vk::StencilOp::KEEP,
        pass_op: vk::StencilOp::KEEP,
        depth_fail_op: vk::StencilOp::KEEP,
        compare_op: vk::CompareOp::NOT_EQUAL,
        compare_mask: 0xff,
        write_mask: 0,
        reference: OVERLAY_STENCIL_REFERENCE,
    };
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS)
        .stencil_test_enable(true)
        .front(stencil)
        .back(stencil)
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0)
}

fn create_pipeline_layout(device: &ash::Device) -> Result<vk::PipelineLayout> {
    let push_constant_ranges = [vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: size_of::<ScenePushConstants>() as u32,
    }];
    let info = vk::PipelineLayoutCreateInfo::default()
        .push_constant_ranges(&push_constant_ranges);
    Ok(unsafe { device.create_pipeline_layout(&info, None)? })
}

fn create_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    shader: &GraphicsShader,
    subpass: Subpass,
    extent: vk::Extent2D,
) -> Result<vk::Pipeline> {
    // Meshes are triangulated clockwise and the projection flips Y
    PipelineBuilder::new(shader, layout, subpass)
        .with_vertex_input(
            &[PerVertexData::binding_description()],
            &PerVertexData::attribute_descriptions(),
        )
        .with_cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::CLOCKWISE)
        .with_depth_stencil(depth_stencil_state())
        .with_static_viewport(extent)
        .build(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_matrix_fits_bounds_into_unit_cube() {
        let model = fit_to_unit_cube(Some((Vec3::new(2.0, 0.0, 0.0), Vec3::new(6.0, 2.0, 1.0))));
        let lo = model.transform_point3(Vec3::new(2.0, 0.0, 0.0));
        let hi = model.transform_point3(Vec3::new(6.0, 2.0, 1.0));
        assert!(lo.abs_diff_eq(Vec3::new(-1.0, -0.5, -0.25), 1e-6));
        assert!(hi.abs_diff_eq(Vec3::new(1.0, 0.5, 0.25), 1e-6));
    }

    #[test]
    fn degenerate_bounds_do_not_scale() {
        let point = Vec3::new(1.0, 1.0, 1.0);
        let model = fit_to_unit_cube(Some((point, point)));
        assert!(model.transform_point3(point).abs_diff_eq(Vec3::ZERO, 1e-6));
        assert_eq!(fit_to_unit_cube(None), Mat4::IDENTITY);
    }

    #[test]
    fn scene_reads_but_never_writes_stencil() {
        let state = depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::TRUE);
        assert_eq!(state.stencil_test_enable, vk::TRUE);
        for face in [state.front, state.back] {
            assert_eq!(face.compare_op, vk::CompareOp::NOT_EQUAL);
            assert_eq!(face.write_mask, 0);
            assert_eq!(face.reference, OVERLAY_STENCIL_REFERENCE);
        }
    }
}
