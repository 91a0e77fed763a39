use std::sync::{Arc, Mutex, Weak};
use ash::vk;
use crate::renderer::memory::{
    align_up, ArenaLayout, MemoryError, MemoryType, MemoryTypeRegistry, Placement, SlotId,
};
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::image::Image;

/// Where a resource lives inside a [`Memory`] arena.
///
/// Holds only a weak reference to the arena's bookkeeping; dropping the binding hands the
/// slot back.
#[derive(Debug)]
pub struct Binding {
    pub memory: vk::DeviceMemory,
    pub offset: u64,
    pub size: u64,
    pub memory_type: MemoryType,
    slot: SlotId,
    layout: Weak<Mutex<ArenaLayout>>,
}

impl Binding {
    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        // The arena may already be gone if the owner broke drop order; the memory is freed
        // either way so there is nothing left to reclaim.
        match self.layout.upgrade() {
            Some(layout) => match layout.lock() {
                Ok(mut layout) => {
                    layout.release(self.slot);
                }
                Err(_) => log::error!("Arena lock poisoned while releasing {:?}", self.slot),
            },
            None => log::warn!("Resource outlived its memory arena ({:?})", self.slot),
        }
    }
}

/// One device allocation from a single memory type, subdivided among buffers or images.
///
/// Resources bound into an arena must be dropped before the arena; owners declare their
/// resources ahead of the arena so field drop order takes care of it.
pub struct Memory {
    memory: vk::DeviceMemory,
    memory_type: MemoryType,
    layout: Arc<Mutex<ArenaLayout>>,
    name: String,
    device: Arc<ash::Device>,
}

impl Memory {
    pub fn new(
        name: &str,
        size: u64,
        memory_type: MemoryType,
        device: Arc<ash::Device>,
    ) -> Result<Self, MemoryError> {
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type.index);
        let memory = unsafe { device.allocate_memory(&allocate_info, None)? };

        log::debug!(
            "Allocated arena '{}': {} bytes from memory type {} ({:?})",
            name,
            size,
            memory_type.index,
            memory_type.property_flags,
        );

        Ok(Self {
            memory,
            memory_type,
            layout: Arc::new(Mutex::new(ArenaLayout::new(size))),
            name: name.to_owned(),
            device,
        })
    }

    /// Sizes an arena to hold exactly `requirements`, bound in order, in the first memory type
    /// all of them accept that has `flags`.
    pub fn for_requirements(
        name: &str,
        requirements: &[vk::MemoryRequirements],
        flags: vk::MemoryPropertyFlags,
        registry: &MemoryTypeRegistry,
        device: Arc<ash::Device>,
    ) -> Result<Self, MemoryError> {
        let type_bits = requirements
            .iter()
            .fold(u32::MAX, |bits, req| bits & req.memory_type_bits);
        let memory_type = registry.require(type_bits, flags)?;
        Self::new(name, packed_size(requirements), memory_type, device)
    }

    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.with_layout(|l| l.size()).unwrap_or(0)
    }

    pub fn free(&self) -> u64 {
        self.with_layout(|l| l.free()).unwrap_or(0)
    }

    pub fn used(&self) -> u64 {
        self.with_layout(|l| l.used()).unwrap_or(0)
    }

    pub fn bound_count(&self) -> usize {
        self.with_layout(|l| l.slot_count()).unwrap_or(0)
    }

    /// Binds every buffer in one `vkBindBufferMemory2` call, at offsets assigned in slice order.
    pub fn bind_buffers(&self, buffers: &mut [&mut Buffer]) -> Result<(), MemoryError> {
        let requirements = buffers
            .iter()
            .map(|b| b.requirements)
            .collect::<smallvec::SmallVec<[_; 4]>>();
        let bound = buffers
            .iter()
            .map(|b| b.is_bound())
            .collect::<smallvec::SmallVec<[_; 4]>>();
        let placements = self.reserve(&requirements, &bound)?;

        let infos = buffers
            .iter()
            .zip(&placements)
            .map(|(buffer, placement)| {
                vk::BindBufferMemoryInfo::default()
                    .buffer(buffer.buffer)
                    .memory(self.memory)
                    .memory_offset(placement.offset)
            })
            .collect::<smallvec::SmallVec<[_; 4]>>();
        if let Err(e) = unsafe { self.device.bind_buffer_memory2(&infos) } {
            self.rollback(&placements);
            return Err(e.into());
        }

        for (buffer, placement) in buffers.iter_mut().zip(placements) {
            buffer.attach(self.binding(placement));
        }
        self.log_usage("buffers", buffers.len());

        Ok(())
    }

    /// Binds every image in one `vkBindImageMemory2` call, at offsets assigned in slice order.
    pub fn bind_images(&self, images: &mut [&mut Image]) -> Result<(), MemoryError> {
        let requirements = images
            .iter()
            .map(|i| i.requirements)
            .collect::<smallvec::SmallVec<[_; 4]>>();
        let bound = images
            .iter()
            .map(|i| i.is_bound())
            .collect::<smallvec::SmallVec<[_; 4]>>();
        let placements = self.reserve(&requirements, &bound)?;

        let infos = images
            .iter()
            .zip(&placements)
            .map(|(image, placement)| {
                vk::BindImageMemoryInfo::default()
                    .image(image.image)
                    .memory(self.memory)
                    .memory_offset(placement.offset)
            })
            .collect::<smallvec::SmallVec<[_; 4]>>();
        if let Err(e) = unsafe { self.device.bind_image_memory2(&infos) } {
            self.rollback(&placements);
            return Err(e.into());
        }

        for (image, placement) in images.iter_mut().zip(placements) {
            image.attach(self.binding(placement));
        }
        self.log_usage("images", images.len());

        Ok(())
    }

    fn reserve(
        &self,
        requirements: &[vk::MemoryRequirements],
        already_bound: &[bool],
    ) -> Result<Vec<Placement>, MemoryError> {
        let mut layout = self.layout.lock().map_err(|_| MemoryError::Poisoned)?;
        place_batch(&mut layout, self.memory_type, requirements, already_bound)
    }

    fn rollback(&self, placements: &[Placement]) {
        match self.layout.lock() {
            Ok(mut layout) => unplace_batch(&mut layout, placements),
            Err(_) => log::error!("Arena lock poisoned while rolling back '{}'", self.name),
        }
    }

    fn binding(&self, placement: Placement) -> Binding {
        Binding {
            memory: self.memory,
            offset: placement.offset,
            size: placement.size,
            memory_type: self.memory_type,
            slot: placement.slot,
            layout: Arc::downgrade(&self.layout),
        }
    }

    fn with_layout<T>(&self, f: impl FnOnce(&ArenaLayout) -> T) -> Option<T> {
        self.layout.lock().ok().map(|layout| f(&layout))
    }

    fn log_usage(&self, kind: &str, count: usize) {
        log::debug!(
            "Bound {} {} into '{}': {} of {} bytes used",
            count,
            kind,
            self.name,
            self.used(),
            self.size(),
        );
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        let live = self.bound_count();
        if live > 0 {
            log::warn!("Freeing arena '{}' with {} resources still bound", self.name, live);
        }
        unsafe {
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Checks a bind batch against `memory_type` and places it in `layout`.
///
/// Every precondition is checked before `layout` is touched; a rejected batch leaves it as it
/// was. `already_bound[i]` tells whether `requirements[i]`'s resource already has memory.
pub fn place_batch(
    layout: &mut ArenaLayout,
    memory_type: MemoryType,
    requirements: &[vk::MemoryRequirements],
    already_bound: &[bool],
) -> Result<Vec<Placement>, MemoryError> {
    if already_bound.iter().any(|&bound| bound) {
        return Err(MemoryError::AlreadyBound);
    }
    if let Some(req) = requirements.iter().find(|r| !memory_type.accepts(r.memory_type_bits)) {
        return Err(MemoryError::IncompatibleType {
            memory_type: memory_type.index,
            type_bits: req.memory_type_bits,
        });
    }
    let requests = requirements
        .iter()
        .map(|r| (r.size, r.alignment))
        .collect::<smallvec::SmallVec<[_; 4]>>();
    layout.reserve(&requests)
}

/// Hands back a batch placed by [`place_batch`] whose driver bind failed.
pub fn unplace_batch(layout: &mut ArenaLayout, placements: &[Placement]) {
    for placement in placements {
        layout.release(placement.slot);
    }
}

/// Bytes needed to place `requirements` back to back, each at its own alignment.
pub fn packed_size(requirements: &[vk::MemoryRequirements]) -> u64 {
    requirements.iter().fold(0, |cursor, req| {
        align_up(cursor, req.alignment) + align_up(req.size, req.alignment)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(size: u64, alignment: u64) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits: u32::MAX,
        }
    }

    fn device_local(index: u32) -> MemoryType {
        MemoryType {
            index,
            heap_index: 0,
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    #[test]
    fn bound_resource_rejects_whole_batch() {
        let mut layout = ArenaLayout::new(4096);
        let reqs = [req(512, 256), req(512, 256)];
        let result = place_batch(&mut layout, device_local(0), &reqs, &[false, true]);
        assert!(matches!(result, Err(MemoryError::AlreadyBound)));
        assert_eq!(layout.free(), 4096);
        assert_eq!(layout.slot_count(), 0);
    }

    #[test]
    fn type_outside_mask_rejects_whole_batch() {
        let mut layout = ArenaLayout::new(4096);
        layout.reserve(&[(1024, 256)]).unwrap();
        let reqs = [
            req(512, 256),
            vk::MemoryRequirements {
                size: 512,
                alignment: 256,
                memory_type_bits: 0b101,
            },
        ];
        match place_batch(&mut layout, device_local(1), &reqs, &[false, false]) {
            Err(MemoryError::IncompatibleType { memory_type, type_bits }) => {
                assert_eq!(memory_type, 1);
                assert_eq!(type_bits, 0b101);
            }
            other => panic!("expected IncompatibleType, got {other:?}"),
        }
        assert_eq!(layout.free(), 3072);
        assert_eq!(layout.slot_count(), 1);
    }

    #[test]
    fn accepted_batch_is_placed_in_order() {
        let mut layout = ArenaLayout::new(4096);
        let reqs = [req(100, 4), req(300, 256)];
        let placed = place_batch(&mut layout, device_local(3), &reqs, &[false, false]).unwrap();
        assert_eq!(placed.iter().map(|p| p.offset).collect::<Vec<_>>(), [0, 256]);
        assert_eq!(layout.slot_count(), 2);
    }

    #[test]
    fn failed_driver_bind_gives_the_batch_back() {
        let mut layout = ArenaLayout::new(4096);
        let kept = place_batch(&mut layout, device_local(0), &[req(1024, 256)], &[false]).unwrap();
        let before = layout.free();

        let reqs = [req(512, 256), req(512, 256)];
        let placed = place_batch(&mut layout, device_local(0), &reqs, &[false, false]).unwrap();
        unplace_batch(&mut layout, &placed);

        assert_eq!(layout.free(), before);
        assert_eq!(layout.slot_count(), 1);
        assert!(layout.placement(kept[0].slot).is_some());
    }

    #[test]
    fn packed_size_matches_sequential_layout() {
        let reqs = [req(100, 4), req(1000, 256), req(10, 16)];
        let mut layout = ArenaLayout::new(packed_size(&reqs));
        let requests = reqs.iter().map(|r| (r.size, r.alignment)).collect::<Vec<_>>();
        let placed = layout.reserve(&requests).unwrap();
        assert_eq!(placed[1].offset, 256);
        assert_eq!(placed[2].offset, 256 + 1024);
        assert_eq!(packed_size(&reqs), 256 + 1024 + 16);
    }
}
