use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::core::transfer::TransferContext;
use crate::renderer::memory::{Memory, MemoryError, MemoryTypeRegistry};
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::image::Image;

/// Host-visible, host-coherent source buffer for uploads into device-local resources.
pub struct StagingBuffer {
    // Declared before the arena so it is released first
    buffer: Buffer,
    memory: Memory,
}

impl StagingBuffer {
    pub fn new(
        capacity: u64,
        registry: &MemoryTypeRegistry,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let mut buffer = Buffer::new(capacity, vk::BufferUsageFlags::TRANSFER_SRC, device.clone())?;
        let memory = Memory::for_requirements(
            "staging",
            &[buffer.requirements],
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            registry,
            device,
        )?;
        memory.bind_buffers(&mut [&mut buffer])?;

        Ok(Self { buffer, memory })
    }

    pub fn capacity(&self) -> u64 {
        self.buffer.size
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Copies `data` into `dst` starting at `dst_offset`, in as many submissions as the staging
    /// capacity requires. `dst.occupied()` covers the written range once this returns.
    pub fn upload_to_buffer(
        &mut self,
        data: &[u8],
        dst: &mut Buffer,
        dst_offset: u64,
        transfer_context: &TransferContext,
    ) -> Result<()> {
        if !dst.is_bound() {
            return Err(MemoryError::NotBound.into());
        }
        if !dst.usage.contains(vk::BufferUsageFlags::TRANSFER_DST) {
            return Err(eyre!("Upload destination was not created with TRANSFER_DST usage"));
        }
        if dst_offset + data.len() as u64 > dst.size {
            return Err(eyre!(
                "Upload of {} bytes at offset {} overruns buffer of {} bytes",
                data.len(),
                dst_offset,
                dst.size,
            ));
        }

        let mut written = 0u64;
        for chunk in data.chunks(self.capacity() as usize) {
            self.buffer.write(chunk, 0)?;
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: dst_offset + written,
                size: chunk.len() as u64,
            };
            let src = self.buffer.buffer;
            let dst_buffer = dst.buffer;
            transfer_context.immediate_submit(|cmd, device| {
                unsafe {
                    device.cmd_copy_buffer(cmd, src, dst_buffer, &[region]);
                }
                Ok(())
            })?;
            written += chunk.len() as u64;
        }

        dst.set_occupied(dst.occupied().max(dst_offset + written));
        log::debug!("Uploaded {} bytes into buffer at offset {}", written, dst_offset);

        Ok(())
    }

    /// Fills a whole image with tightly packed texel data and leaves it shader-readable.
    pub fn upload_to_image(
        &mut self,
        data: &[u8],
        dst: &mut Image,
        transfer_context: &TransferContext,
    ) -> Result<()> {
        if !dst.is_bound() {
            return Err(MemoryError::NotBound.into());
        }
        if data.len() as u64 > self.capacity() {
            return Err(eyre!(
                "Image data of {} bytes exceeds staging capacity of {} bytes",
                data.len(),
                self.capacity(),
            ));
        }

        self.buffer.write(data, 0)?;

        let src = self.buffer.buffer;
        let image = dst.image;
        let extent = dst.extent;
        let range = dst.subresource_range();
        transfer_context.immediate_submit(|cmd, device| {
            let barrier_to_transfer = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

            let copy_region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: range.aspect_mask,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: extent,
            };

            let barrier_to_readable = barrier_to_transfer
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);

            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier_to_transfer],
                );
                device.cmd_copy_buffer_to_image(
                    cmd,
                    src,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[copy_region],
                );
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier_to_readable],
                );
            }

            Ok(())
        })?;

        dst.set_occupied(data.len() as u64);
        log::debug!(
            "Uploaded {} bytes into {}x{} image",
            data.len(),
            extent.width,
            extent.height,
        );

        Ok(())
    }
}
