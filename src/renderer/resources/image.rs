use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::memory::{Binding, MemoryError};

pub struct ImageCreateInfo {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl ImageCreateInfo {
    /// Shader-readable color image filled through a staging upload
    pub fn sampled(format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            format,
            extent,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    pub fn depth_stencil(format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            format,
            extent,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        }
    }

    /// Color attachment that can be copied out, for rendering without a window
    pub fn offscreen_color(format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            format,
            extent,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }
}

/// A 2D, single-mip, optimally tiled image. The view can only be created once memory is bound.
pub struct Image {
    pub image: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub aspect: vk::ImageAspectFlags,
    pub requirements: vk::MemoryRequirements,

    view: Option<vk::ImageView>,
    occupied: u64,
    binding: Option<Binding>,
    device: Arc<ash::Device>,
}

impl Image {
    pub fn new(
        create_info: &ImageCreateInfo,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        if create_info.extent.width == 0 || create_info.extent.height == 0 {
            return Err(eyre!("Cannot create an image with zero extent"));
        }

        let extent = vk::Extent3D {
            width: create_info.extent.width,
            height: create_info.extent.height,
            depth: 1,
        };
        let info = vk::ImageCreateInfo::default()
            .format(create_info.format)
            .usage(create_info.usage)
            .extent(extent)
            .image_type(vk::ImageType::TYPE_2D)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { device.create_image(&info, None)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        Ok(Self {
            image,
            format: create_info.format,
            extent,
            aspect: create_info.aspect,
            requirements,

            view: None,
            occupied: 0,
            binding: None,
            device,
        })
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn offset(&self) -> Option<u64> {
        self.binding.as_ref().map(|b| b.offset)
    }

    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    pub fn occupied(&self) -> u64 {
        self.occupied
    }

    pub(crate) fn set_occupied(&mut self, occupied: u64) {
        self.occupied = occupied;
    }

    pub(crate) fn attach(&mut self, binding: Binding) {
        self.binding = Some(binding);
        self.occupied = 0;
    }

    pub fn view(&self) -> Option<vk::ImageView> {
        self.view
    }

    /// Creates the full-image view, or returns the existing one.
    pub fn create_view(&mut self) -> Result<vk::ImageView> {
        if let Some(view) = self.view {
            return Ok(view);
        }
        if !self.is_bound() {
            return Err(MemoryError::NotBound.into());
        }

        let info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .image(self.image)
            .format(self.format)
            .subresource_range(self.subresource_range());
        let view = unsafe { self.device.create_image_view(&info, None)? };
        self.view = Some(view);

        Ok(view)
    }

    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if let Some(view) = self.view.take() {
                self.device.destroy_image_view(view, None);
            }
            self.device.destroy_image(self.image, None);
        }
        self.binding.take();
    }
}
