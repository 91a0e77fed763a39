use ash::vk;
use crate::renderer::memory::MemoryError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryHeap {
    pub index: u32,
    pub size: u64,
    pub flags: vk::MemoryHeapFlags,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryType {
    /// Bit position of this type in a resource's `memory_type_bits`
    pub index: u32,
    pub heap_index: u32,
    pub property_flags: vk::MemoryPropertyFlags,
}

impl MemoryType {
    pub fn is_host_visible(&self) -> bool {
        self.property_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    pub fn accepts(&self, type_bits: u32) -> bool {
        self.index < 32 && type_bits & (1 << self.index) != 0
    }
}

/// Snapshot of the device's memory heaps and types, captured once at startup.
///
/// The types keep the order the driver reported them in, which is the driver's preference order.
#[derive(Debug, Clone, Default)]
pub struct MemoryTypeRegistry {
    heaps: Vec<MemoryHeap>,
    types: Vec<MemoryType>,
}

impl MemoryTypeRegistry {
    pub fn new(properties: &vk::PhysicalDeviceMemoryProperties) -> Self {
        let heaps = properties.memory_heaps[..properties.memory_heap_count as usize]
            .iter()
            .enumerate()
            .map(|(i, heap)| MemoryHeap {
                index: i as u32,
                size: heap.size,
                flags: heap.flags,
            })
            .collect();
        let types = properties.memory_types[..properties.memory_type_count as usize]
            .iter()
            .enumerate()
            .map(|(i, ty)| MemoryType {
                index: i as u32,
                heap_index: ty.heap_index,
                property_flags: ty.property_flags,
            })
            .collect();

        Self { heaps, types }
    }

    pub fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe {
            instance.get_physical_device_memory_properties(physical_device)
        };
        let registry = Self::new(&properties);
        for ty in &registry.types {
            log::debug!(
                "Memory type {}: heap {} ({} MiB), {:?}",
                ty.index,
                ty.heap_index,
                registry.heap(ty).map_or(0, |h| h.size / (1024 * 1024)),
                ty.property_flags,
            );
        }
        registry
    }

    pub fn from_parts(heaps: Vec<MemoryHeap>, types: Vec<MemoryType>) -> Self {
        Self { heaps, types }
    }

    pub fn heaps(&self) -> &[MemoryHeap] {
        &self.heaps
    }

    pub fn types(&self) -> &[MemoryType] {
        &self.types
    }

    pub fn heap(&self, ty: &MemoryType) -> Option<&MemoryHeap> {
        self.heaps.get(ty.heap_index as usize)
    }

    /// First memory type, in driver order, that `requirements` accepts and that has at least
    /// `required` property flags.
    pub fn find_compatible(
        &self,
        requirements: &vk::MemoryRequirements,
        required: vk::MemoryPropertyFlags,
    ) -> Option<MemoryType> {
        self.find_by_bits(requirements.memory_type_bits, required)
    }

    pub fn find_by_bits(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Option<MemoryType> {
        self.types
            .iter()
            .find(|ty| ty.accepts(type_bits) && ty.property_flags.contains(required))
            .copied()
    }

    /// Like [`find_by_bits`](Self::find_by_bits), treating a miss as an error.
    pub fn require(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Result<MemoryType, MemoryError> {
        self.find_by_bits(type_bits, required)
            .ok_or(MemoryError::NoCompatibleType { type_bits, flags: required })
    }
}
