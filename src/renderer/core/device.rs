use std::ffi::{c_char, CStr};
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::core::descriptor::{DescriptorAllocator, DescriptorAshDevice};
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::queue::{find_graphics_family, Queue, QueueFamily};
use crate::renderer::core::transfer::TransferContext;
use crate::renderer::memory::MemoryTypeRegistry;
use crate::renderer::resources::staging::StagingBuffer;

/// Depth/stencil formats in order of preference; all carry a stencil aspect for the overlay mask
pub const DEPTH_STENCIL_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
];

/// Logical device plus the state every renderer component shares
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,

    // The graphics queue also presents when there is a surface
    pub graphics_queue: Arc<Queue>,
    pub memory_types: MemoryTypeRegistry,
    pub depth_format: vk::Format,
    pub descriptor_allocator: Arc<Mutex<DescriptorAllocator>>,

    // Taken in Drop so its pool and fence go before the device
    transfer_context: Option<TransferContext>,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: Option<(vk::SurfaceKHR, &ash::khr::surface::Instance)>,
    ) -> Result<Self> {
        let (physical_device, graphics_queue_family) =
            Self::select_physical_device(&instance.instance, surface)?;

        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical_device)
        };
        log::info!(
            "Selected physical device: {:?} ({:?})",
            properties.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            properties.device_type,
        );

        let (logical_device, graphics_queue) = Self::create_logical_device(
            &instance.instance,
            physical_device,
            graphics_queue_family,
            surface.is_some(),
        )?;

        let memory_types = MemoryTypeRegistry::query(&instance.instance, physical_device);
        let depth_format = choose_depth_format(|format| unsafe {
            instance
                .instance
                .get_physical_device_format_properties(physical_device, format)
        })
        .ok_or_eyre("No supported depth/stencil format")?;
        log::debug!("Depth/stencil format: {:?}", depth_format);

        let logical_device = Arc::new(logical_device);
        let graphics_queue = Arc::new(graphics_queue);

        let transfer_context = TransferContext::new(
            graphics_queue.clone(),
            logical_device.clone(),
        )?;

        Ok(Self {
            logical: logical_device,
            physical: physical_device,
            properties,

            graphics_queue,
            memory_types,
            depth_format,
            descriptor_allocator: Arc::new(Mutex::new(DescriptorAllocator::new(0))),

            transfer_context: Some(transfer_context),
        })
    }

    pub fn transfer_context(&self) -> Result<&TransferContext> {
        self.transfer_context
            .as_ref()
            .ok_or_eyre("Transfer context already released")
    }

    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        self.transfer_context()?.immediate_submit(func)
    }

    pub fn create_staging_buffer(&self, capacity: u64) -> Result<StagingBuffer> {
        StagingBuffer::new(capacity, &self.memory_types, self.logical.clone())
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.logical.device_wait_idle()? };
        Ok(())
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: Option<(vk::SurfaceKHR, &ash::khr::surface::Instance)>,
    ) -> Result<(vk::PhysicalDevice, QueueFamily)> {
        let required_exts = Self::get_required_device_extensions(surface.is_some());

        unsafe {
            instance
                .enumerate_physical_devices()?
                .into_iter()
                // Filter out devices that do not support Vulkan 1.1 or the required extensions
                .filter(|device| {
                    let props = instance.get_physical_device_properties(*device);
                    if props.api_version < vk::API_VERSION_1_1 {
                        return false;
                    }
                    let supported = instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default();
                    required_exts.iter().all(|required| {
                        let found = supported
                            .iter()
                            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *required));
                        if !found {
                            log::warn!("Device extension not supported: {:?}", required);
                        }
                        found
                    })
                })
                .filter_map(|device| {
                    let families = instance.get_physical_device_queue_family_properties(device);
                    let index = find_graphics_family(&families, |i| match surface {
                        Some((surface, loader)) => loader
                            .get_physical_device_surface_support(device, i, surface)
                            .unwrap_or(false),
                        None => true,
                    })?;
                    Some((
                        device,
                        QueueFamily::new(index, families[index as usize]),
                    ))
                })
                .min_by_key(|(device, _)| {
                    let props = instance.get_physical_device_properties(*device);
                    match props.device_type {
                        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                        vk::PhysicalDeviceType::CPU => 3,
                        vk::PhysicalDeviceType::OTHER => 4,
                        _ => 5,
                    }
                })
                .ok_or_eyre("No suitable physical device found")
        }
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: QueueFamily,
        presents: bool,
    ) -> Result<(ash::Device, Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family.index)
                .queue_priorities(&queue_priorities),
        ];

        let device = {
            let enabled_extension_names = Self::get_required_device_extensions(presents)
                .iter()
                .map(|ext| ext.as_ptr())
                .collect::<Vec<*const c_char>>();
            let features = vk::PhysicalDeviceFeatures::default();

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&enabled_extension_names)
                .enabled_features(&features);

            unsafe {
                instance
                    .create_device(physical_device, &device_create_info, None)
                    .map_err(|e| eyre!("Failed to create logical device: {e}"))?
            }
        };

        let graphics_queue = unsafe {
            let queue = device.get_device_queue(graphics_queue_family.index, 0);
            Queue::new(graphics_queue_family, queue)
        };

        Ok((device, graphics_queue))
    }

    fn get_required_device_extensions(presents: bool) -> Vec<&'static CStr> {
        let mut exts = Vec::new();
        if presents {
            exts.push(ash::khr::swapchain::NAME);
        }

        #[cfg(target_os = "macos")]
        exts.push(ash::khr::portability_subset::NAME);

        exts
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle on shutdown: {}", e);
            }
            self.transfer_context.take();
            match self.descriptor_allocator.lock() {
                Ok(mut allocator) => {
                    allocator.cleanup(&DescriptorAshDevice(self.logical.clone()));
                }
                Err(_) => log::error!("Descriptor allocator lock poisoned on shutdown"),
            }
            self.logical.destroy_device(None);
        }
    }
}

/// First candidate usable as an optimally tiled depth/stencil attachment.
pub fn choose_depth_format(
    format_properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    DEPTH_STENCIL_CANDIDATES.into_iter().find(|&format| {
        format_properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_format_falls_back_in_preference_order() {
        let supported = |format: vk::Format| vk::FormatProperties {
            optimal_tiling_features: if format == vk::Format::D32_SFLOAT_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::SAMPLED_IMAGE
            },
            ..Default::default()
        };
        assert_eq!(choose_depth_format(supported), Some(vk::Format::D32_SFLOAT_S8_UINT));
        assert_eq!(choose_depth_format(|_| vk::FormatProperties::default()), None);
    }
}
