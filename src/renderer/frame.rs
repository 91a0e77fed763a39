use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::queue::Queue;
use crate::renderer::memory::Memory;
use crate::renderer::resources::image::{Image, ImageCreateInfo};

/// Depth/stencil attachment shared by every backbuffer
pub struct DepthStencilTarget {
    // Image before the arena it is bound into
    pub image: Image,
    pub memory: Memory,
}

impl DepthStencilTarget {
    pub fn new(format: vk::Format, extent: vk::Extent2D, device: &RenderDevice) -> Result<Self> {
        let mut image = Image::new(
            &ImageCreateInfo::depth_stencil(format, extent),
            device.logical.clone(),
        )?;
        let memory = Memory::for_requirements(
            "depth/stencil",
            &[image.requirements],
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            &device.memory_types,
            device.logical.clone(),
        )?;
        memory.bind_images(&mut [&mut image])?;
        image.create_view()?;

        Ok(Self { image, memory })
    }
}

/// Everything recorded and synchronized per swapchain image
pub struct Backbuffer {
    pub framebuffer: vk::Framebuffer,
    pub command_buffer: vk::CommandBuffer,
    /// Signalled when this image's commands finish; presentation waits on it
    pub render_complete: vk::Semaphore,
}

/// Per-backbuffer framebuffers, command buffers and semaphores, plus the shared depth/stencil
/// target and acquisition semaphore. Rebuilt as a unit whenever the swapchain changes.
pub struct FrameResources {
    backbuffers: Vec<Backbuffer>,
    depth_stencil: Option<DepthStencilTarget>,
    command_pool: vk::CommandPool,
    image_acquired: vk::Semaphore,
    extent: vk::Extent2D,

    device: Arc<ash::Device>,
}

impl FrameResources {
    pub fn new(
        color_views: &[vk::ImageView],
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        device: &RenderDevice,
    ) -> Result<Self> {
        let logical = device.logical.clone();

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_queue.family.index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { logical.create_command_pool(&command_pool_info, None)? };
        let image_acquired = unsafe {
            logical
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .inspect_err(|_| logical.destroy_command_pool(command_pool, None))?
        };

        let mut frames = Self {
            backbuffers: Vec::new(),
            depth_stencil: None,
            command_pool,
            image_acquired,
            extent,

            device: logical,
        };
        frames.rebuild(color_views, extent, render_pass, device)?;

        Ok(frames)
    }

    /// Releases the old per-backbuffer set and builds one for `color_views` at `extent`.
    /// The device must be idle.
    pub fn rebuild(
        &mut self,
        color_views: &[vk::ImageView],
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        device: &RenderDevice,
    ) -> Result<()> {
        self.release();

        let depth_stencil = DepthStencilTarget::new(device.depth_format, extent, device)?;
        let depth_view = depth_stencil
            .image
            .view()
            .ok_or_else(|| eyre!("Depth/stencil image has no view"))?;
        self.depth_stencil = Some(depth_stencil);
        self.extent = extent;

        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .command_buffer_count(color_views.len() as u32)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffers = unsafe { self.device.allocate_command_buffers(&command_buffer_info)? };

        for (&color_view, command_buffer) in color_views.iter().zip(command_buffers) {
            let attachments = [color_view, depth_view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { self.device.create_framebuffer(&framebuffer_info, None)? };
            let render_complete = unsafe {
                self.device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                    .inspect_err(|_| self.device.destroy_framebuffer(framebuffer, None))?
            };
            self.backbuffers.push(Backbuffer {
                framebuffer,
                command_buffer,
                render_complete,
            });
        }

        log::debug!(
            "Built frame resources for {} backbuffers at {}x{}",
            self.backbuffers.len(),
            extent.width,
            extent.height,
        );

        Ok(())
    }

    /// Destroys the per-backbuffer set and the depth/stencil target. The device must be idle.
    pub fn release(&mut self) {
        let command_buffers = self
            .backbuffers
            .iter()
            .map(|b| b.command_buffer)
            .collect::<Vec<_>>();
        unsafe {
            for backbuffer in self.backbuffers.drain(..) {
                self.device.destroy_semaphore(backbuffer.render_complete, None);
                self.device.destroy_framebuffer(backbuffer.framebuffer, None);
            }
            if !command_buffers.is_empty() {
                self.device.free_command_buffers(self.command_pool, &command_buffers);
            }
        }
        self.depth_stencil = None;
    }

    pub fn backbuffer(&self, image_index: u32) -> Result<&Backbuffer> {
        self.backbuffers
            .get(image_index as usize)
            .ok_or_else(|| eyre!("No backbuffer for swapchain image {image_index}"))
    }

    pub fn backbuffer_count(&self) -> usize {
        self.backbuffers.len()
    }

    pub fn image_acquired(&self) -> vk::Semaphore {
        self.image_acquired
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn depth_stencil(&self) -> Option<&DepthStencilTarget> {
        self.depth_stencil.as_ref()
    }
}

impl Drop for FrameResources {
    fn drop(&mut self) {
        self.release();
        unsafe {
            self.device.destroy_semaphore(self.image_acquired, None);
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Submits frames and decides when the next one may start. Frames never overlap: each one
/// waits for the queue to drain before returning.
pub struct FrameScheduler {
    queue: Arc<Queue>,
    device: Arc<ash::Device>,
    frames_completed: u64,
}

impl FrameScheduler {
    pub fn new(queue: Arc<Queue>, device: Arc<ash::Device>) -> Self {
        Self {
            queue,
            device,
            frames_completed: 0,
        }
    }

    /// Submits `command_buffer`, waiting on `wait` before color output and signalling `signal`.
    pub fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
    ) -> Result<()> {
        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [signal];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.device
                .queue_submit(self.queue.handle, &[submit_info], vk::Fence::null())?;
        }
        Ok(())
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue.handle
    }

    /// Blocks until every submitted frame has retired.
    pub fn end_frame(&mut self) -> Result<()> {
        unsafe { self.device.queue_wait_idle(self.queue.handle)? };
        self.frames_completed += 1;
        Ok(())
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }
}
