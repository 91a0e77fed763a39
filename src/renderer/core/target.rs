use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::swapchain::Swapchain;

pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}

/// Presentation target of the renderer: the window, its surface and the swapchain
pub struct RenderTarget {
    // Swapchain first so it is destroyed before the surface
    pub swapchain: Swapchain,
    pub surface: Surface,
    pub window: Arc<Window>,

    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    vsync: bool,
}

impl RenderTarget {
    pub fn new(
        window: Arc<Window>,
        surface: Surface,
        instance: &RenderInstance,
        device: &RenderDevice,
        vsync: bool,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(
            &instance.instance,
            device.physical,
            device.logical.clone(),
            &surface,
            Self::window_extent(&window),
            vsync,
            None,
        )?;

        Ok(Self {
            swapchain,
            surface,
            window,

            instance: instance.instance.clone(),
            physical_device: device.physical,
            vsync,
        })
    }

    pub fn window_extent(window: &Window) -> vk::Extent2D {
        let size = window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Replaces the swapchain with one sized to `extent`. The device must be idle.
    pub fn recreate(&mut self, extent: vk::Extent2D, device: Arc<ash::Device>) -> Result<()> {
        let swapchain = Swapchain::new(
            &self.instance,
            self.physical_device,
            device,
            &self.surface,
            extent,
            self.vsync,
            Some(&self.swapchain),
        )?;
        // The retired swapchain is destroyed here
        self.swapchain = swapchain;
        Ok(())
    }

    /// Acquires the next image, signalling `semaphore`. Returns the image index and whether the
    /// swapchain is suboptimal.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> ash::prelude::VkResult<(u32, bool)> {
        unsafe {
            self.swapchain.loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queues `image_index` for presentation after `wait` is signalled. Returns whether the
    /// swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> ash::prelude::VkResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.swapchain.loader.queue_present(queue, &present_info) }
    }
}
