//! "Core" refers to the long-lived Vulkan objects the rest of the renderer is built on:
//! instance, device, queues, presentation target and the one-shot transfer path.

pub mod command_encoder;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod queue;
pub mod swapchain;
pub mod target;
pub mod transfer;
