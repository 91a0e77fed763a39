pub mod camera;
pub mod config;
pub mod core;
pub mod frame;
pub mod memory;
pub mod passes;
pub mod resources;
pub mod shader_data;

use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use winit::window::Window;
use crate::mesh::MeshData;
use crate::renderer::camera::{aspect_ratio, Camera};
use crate::renderer::config::RenderConfig;
use crate::renderer::core::command_encoder::CommandEncoder;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::target::{RenderTarget, Surface};
use crate::renderer::frame::{FrameResources, FrameScheduler};
use crate::renderer::memory::Memory;
use crate::renderer::passes::render_pass::clear_values;
use crate::renderer::passes::{MultiPass, OverlayPass, RenderPass, ScenePass, Subpass};

/// Usage of one device memory arena, for display
#[derive(Debug, Clone)]
pub struct ArenaStats {
    pub name: String,
    pub size: u64,
    pub used: u64,
    pub bound: usize,
}

impl ArenaStats {
    pub fn of(memory: &Memory) -> Self {
        Self {
            name: memory.name().to_owned(),
            size: memory.size(),
            used: memory.used(),
            bound: memory.bound_count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderStats {
    pub frames: u64,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub backbuffers: usize,
    pub overlay_draws: usize,
    pub validation: bool,
    pub arenas: Vec<ArenaStats>,
}

pub struct Renderer {
    // Field order is destruction order: everything built on the device goes first
    frames: FrameResources,
    scheduler: FrameScheduler,
    multipass: MultiPass<(OverlayPass, ScenePass)>,
    render_pass: RenderPass,
    target: RenderTarget,
    device: RenderDevice,
    instance: RenderInstance,

    config: RenderConfig,
    resize_requested: bool,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        mesh: &MeshData,
        imgui: &mut imgui::Context,
        config: RenderConfig,
    ) -> Result<Self> {
        let instance = RenderInstance::new(Some(&window), &config)?;
        let (surface_handle, surface_loader) = instance.create_surface(&window)?;
        let surface = Surface {
            handle: surface_handle,
            loader: surface_loader,
        };
        let device = RenderDevice::new(&instance, Some((surface.handle, &surface.loader)))?;
        let target = RenderTarget::new(window, surface, &instance, &device, config.vsync)?;
        let extent = target.extent();

        let render_pass = RenderPass::new(
            target.swapchain.format.format,
            device.depth_format,
            vk::ImageLayout::PRESENT_SRC_KHR,
            device.logical.clone(),
        )?;
        let multipass = MultiPass::new(
            render_pass.handle,
            render_pass.subpass_count(),
            (
                |subpass: Subpass| OverlayPass::new(subpass, imgui, extent, &device),
                |subpass: Subpass| ScenePass::new(subpass, mesh, extent, &device),
            ),
        )?;

        let frames = FrameResources::new(
            &target.swapchain.image_views,
            extent,
            render_pass.handle,
            &device,
        )?;
        let scheduler = FrameScheduler::new(device.graphics_queue.clone(), device.logical.clone());

        log::info!(
            "Renderer ready: {}x{}, {:?}, {} backbuffers",
            extent.width,
            extent.height,
            target.swapchain.present_mode,
            frames.backbuffer_count(),
        );

        Ok(Self {
            frames,
            scheduler,
            multipass,
            render_pass,
            target,
            device,
            instance,

            config,
            resize_requested: false,
        })
    }

    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.target.window
    }

    /// Renders and presents one frame. Does nothing while the window has no area.
    pub fn draw(&mut self, camera: &Camera, draw_data: &imgui::DrawData) -> Result<()> {
        if self.resize_requested {
            self.recreate()?;
        }
        if is_zero_extent(RenderTarget::window_extent(&self.target.window)) || self.resize_requested {
            return Ok(());
        }

        let image_index = match self.acquire()? {
            Some(index) => index,
            None => return Ok(()),
        };

        let extent = self.frames.extent();
        {
            let (overlay, scene) = self.multipass.passes_mut();
            overlay.prepare(draw_data, &self.device)?;
            scene.set_view_projection(camera.get_viewproj_mat(aspect_ratio(extent)));
        }

        let backbuffer = self.frames.backbuffer(image_index)?;
        let logical = &self.device.logical;
        unsafe {
            logical.reset_command_buffer(
                backbuffer.command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;
        }
        let mut encoder = CommandEncoder::new(logical, backbuffer.command_buffer);
        encoder.begin_recording()?;
        self.multipass.record(
            &mut encoder,
            backbuffer.framebuffer,
            vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            },
            clear_values(self.config.clear_color),
        )?;
        encoder.end_recording()?;

        self.scheduler.submit(
            backbuffer.command_buffer,
            self.frames.image_acquired(),
            backbuffer.render_complete,
        )?;
        let presented = self.target.present(
            self.scheduler.queue(),
            image_index,
            backbuffer.render_complete,
        );
        self.scheduler.end_frame()?;

        match presented {
            Ok(false) => {}
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain stale after present");
                self.resize_requested = true;
            }
            Err(err) => return Err(err.into()),
        }

        Ok(())
    }

    /// Acquires the next swapchain image, recreating once if the swapchain is out of date.
    /// Returns `None` when the frame has to be skipped.
    fn acquire(&mut self) -> Result<Option<u32>> {
        let semaphore = self.frames.image_acquired();
        let (image_index, suboptimal) = match self.target.acquire_next_image(semaphore) {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date on acquire");
                self.recreate()?;
                if self.resize_requested {
                    return Ok(None);
                }
                match self.target.acquire_next_image(self.frames.image_acquired()) {
                    Ok(acquired) => acquired,
                    Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                        self.resize_requested = true;
                        return Ok(None);
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        };
        if suboptimal {
            self.resize_requested = true;
        }
        Ok(Some(image_index))
    }

    /// Rebuilds the swapchain and everything sized to it. Deferred while the window has no area.
    pub fn recreate(&mut self) -> Result<()> {
        let extent = RenderTarget::window_extent(&self.target.window);
        if is_zero_extent(extent) {
            self.resize_requested = true;
            return Ok(());
        }

        self.device.wait_idle()?;
        self.target.recreate(extent, self.device.logical.clone())?;
        if self.target.swapchain.format.format != self.render_pass.color_format {
            return Err(eyre!(
                "Swapchain format changed from {:?} to {:?}",
                self.render_pass.color_format,
                self.target.swapchain.format.format,
            ));
        }

        let extent = self.target.extent();
        self.frames.rebuild(
            &self.target.swapchain.image_views,
            extent,
            self.render_pass.handle,
            &self.device,
        )?;
        self.multipass.resize(extent)?;
        self.resize_requested = false;

        log::info!("Recreated swapchain at {}x{}", extent.width, extent.height);

        Ok(())
    }

    pub fn stats(&self) -> RenderStats {
        let (overlay, scene) = self.multipass.passes();
        let mut arenas = vec![
            ArenaStats::of(scene.memory()),
            ArenaStats::of(overlay.geometry_memory()),
            ArenaStats::of(overlay.font_memory()),
        ];
        if let Some(depth_stencil) = self.frames.depth_stencil() {
            arenas.push(ArenaStats::of(&depth_stencil.memory));
        }

        RenderStats {
            frames: self.scheduler.frames_completed(),
            extent: self.frames.extent(),
            present_mode: self.target.swapchain.present_mode,
            backbuffers: self.frames.backbuffer_count(),
            overlay_draws: overlay.draw_count(),
            validation: self.instance.validation_enabled(),
            arenas,
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle before teardown: {err}");
        }
    }
}

pub fn is_zero_extent(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}
