use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::passes::{RenderPassBegin, RenderPassEncoder};

/// Records into one primary command buffer. Passes reach the raw handles for their draw calls.
pub struct CommandEncoder<'a> {
    pub device: &'a ash::Device,
    pub command_buffer: vk::CommandBuffer,

    is_recording: bool,
}

impl<'a> CommandEncoder<'a> {
    pub fn new(
        device: &'a ash::Device,
        command_buffer: vk::CommandBuffer,
    ) -> Self {
        Self {
            device,
            command_buffer,
            is_recording: false,
        }
    }

    pub fn begin_recording(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(eyre!("Command buffer is already recording"));
        }

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(self.command_buffer, &begin_info)?;
        }

        self.is_recording = true;

        Ok(())
    }

    pub fn end_recording(&mut self) -> Result<()> {
        if !self.is_recording {
            return Err(eyre!("Command buffer is not recording"));
        }

        unsafe {
            self.device.end_command_buffer(self.command_buffer)?;
        }

        self.is_recording = false;

        Ok(())
    }
}

impl RenderPassEncoder for CommandEncoder<'_> {
    fn begin_render_pass(&mut self, begin: &RenderPassBegin) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(begin.render_area)
            .clear_values(&begin.clear_values);
        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn next_subpass(&mut self) {
        unsafe {
            self.device.cmd_next_subpass(self.command_buffer, vk::SubpassContents::INLINE);
        }
    }

    fn end_render_pass(&mut self) {
        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer);
        }
    }
}

impl Drop for CommandEncoder<'_> {
    fn drop(&mut self) {
        if self.is_recording {
            log::warn!("Dropping CommandEncoder while still recording");
        }
    }
}
