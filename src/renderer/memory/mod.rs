//! Device memory: which memory type a resource may live in, and where inside an allocation
//! it lives.

pub mod arena;
pub mod device_memory;
pub mod registry;

use ash::vk;

pub use arena::{ArenaLayout, Placement, SlotId};
pub use device_memory::{Binding, Memory};
pub use registry::{MemoryHeap, MemoryType, MemoryTypeRegistry};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("no memory type in mask {type_bits:#b} has properties {flags:?}")]
    NoCompatibleType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },
    #[error("memory type {memory_type} is not in the resource's mask {type_bits:#b}")]
    IncompatibleType { memory_type: u32, type_bits: u32 },
    #[error("arena exhausted: {requested} bytes requested, {free} bytes free")]
    Exhausted { requested: u64, free: u64 },
    #[error("no gap of {size} bytes aligned to {alignment} left in arena")]
    Fragmented { size: u64, alignment: u64 },
    #[error("resource is already bound to device memory")]
    AlreadyBound,
    #[error("resource is not bound to device memory")]
    NotBound,
    #[error("arena bookkeeping lock was poisoned")]
    Poisoned,
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
}

/// Rounds `value` up to the next multiple of `alignment` (zero means unaligned).
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

#[cfg(test)]
mod tests {
    use super::align_up;

    #[test]
    fn align_up_rounds_to_multiples() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(300, 4), 300);
        assert_eq!(align_up(301, 4), 304);
        assert_eq!(align_up(7, 0), 7);
        // Non power-of-two alignments are still handled
        assert_eq!(align_up(10, 6), 12);
    }
}
