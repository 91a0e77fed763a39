use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::passes::Subpass;
use crate::renderer::resources::shader::GraphicsShader;

/// Graphics pipeline state for one subpass, assembled the same way for every pass.
///
/// Viewport and scissor are dynamic unless a static extent is given.
pub struct PipelineBuilder<'s> {
    shader: &'s GraphicsShader,
    layout: vk::PipelineLayout,
    subpass: Subpass,

    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
    color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    static_extent: Option<vk::Extent2D>,
}

impl<'s> PipelineBuilder<'s> {
    pub fn new(shader: &'s GraphicsShader, layout: vk::PipelineLayout, subpass: Subpass) -> Self {
        Self {
            shader,
            layout,
            subpass,

            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            input_assembly: vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
                .primitive_restart_enable(false),
            rasterization: vk::PipelineRasterizationStateCreateInfo::default()
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(vk::CullModeFlags::NONE)
                .front_face(vk::FrontFace::CLOCKWISE),
            color_blend_attachment: vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false),
            depth_stencil: vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::ALWAYS)
                .min_depth_bounds(0.0)
                .max_depth_bounds(1.0),
            static_extent: None,
        }
    }

    pub fn with_vertex_input(
        mut self,
        bindings: &[vk::VertexInputBindingDescription],
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_bindings = bindings.to_vec();
        self.vertex_attributes = attributes.to_vec();
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.rasterization.cull_mode = cull_mode;
        self.rasterization.front_face = front_face;
        self
    }

    pub fn with_alpha_blending_enabled(mut self) -> Self {
        self.color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD);
        self
    }

    pub fn with_depth_stencil(mut self, state: vk::PipelineDepthStencilStateCreateInfo<'static>) -> Self {
        self.depth_stencil = state;
        self
    }

    /// Bakes viewport and scissor to cover `extent`. The pipeline must be rebuilt on resize.
    pub fn with_static_viewport(mut self, extent: vk::Extent2D) -> Self {
        self.static_extent = Some(extent);
        self
    }

    fn dynamic_states(&self) -> Vec<vk::DynamicState> {
        match self.static_extent {
            Some(_) => Vec::new(),
            None => vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    pub fn build(self, device: &ash::Device) -> Result<vk::Pipeline> {
        let stages = self.shader.stages();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let (viewports, scissors) = match self.static_extent {
            Some(extent) => (
                vec![vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: extent.width as f32,
                    height: extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }],
                vec![vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent,
                }],
            ),
            None => (Vec::new(), Vec::new()),
        };
        let viewport_state = if self.static_extent.is_some() {
            vk::PipelineViewportStateCreateInfo::default()
                .viewports(&viewports)
                .scissors(&scissors)
        } else {
            vk::PipelineViewportStateCreateInfo::default()
                .viewport_count(1)
                .scissor_count(1)
        };

        // 1 sample per pixel means no multisampling
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let blend_attachments = [self.color_blend_attachment];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_attachments);

        let dynamic_states = self.dynamic_states();
        let dynamic_info = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .layout(self.layout)
            .render_pass(self.subpass.render_pass)
            .subpass(self.subpass.index)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&self.input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&self.rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .depth_stencil_state(&self.depth_stencil)
            .dynamic_state(&dynamic_info);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, err)| eyre!("Failed to create graphics pipeline for subpass {}: {}", self.subpass.index, err))?
        };
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("Driver returned no pipeline for subpass {}", self.subpass.index))
    }
}
