//! Buffers, images and shaders: objects bound to device memory or handed to pipelines.

pub mod buffer;
pub mod image;
pub mod shader;
pub mod staging;

pub use buffer::Buffer;
pub use image::{Image, ImageCreateInfo};
pub use shader::GraphicsShader;
pub use staging::StagingBuffer;
