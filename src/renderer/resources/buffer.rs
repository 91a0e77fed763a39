use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::memory::{Binding, MemoryError};

/// A buffer handle plus its measured requirements. Unbound until a [`Memory`] arena binds it.
///
/// [`Memory`]: crate::renderer::memory::Memory
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub requirements: vk::MemoryRequirements,

    /// Bytes from the start of the buffer that currently hold valid data
    occupied: u64,
    binding: Option<Binding>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        size: u64,
        usage: vk::BufferUsageFlags,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        if size == 0 {
            return Err(eyre!("Cannot create a zero-sized buffer"));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        Ok(Self {
            buffer,
            size,
            usage,
            requirements,

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

    /// Offset of this buffer inside its arena
    pub fn offset(&self) -> Option<u64> {
        self.binding.as_ref().map(|b| b.offset)
    }

    pub fn occupied(&self) -> u64 {
        self.occupied
    }

    pub(crate) fn set_occupied(&mut self, occupied: u64) {
        self.occupied = occupied.min(self.size);
    }

    pub(crate) fn attach(&mut self, binding: Binding) {
        self.binding = Some(binding);
        self.occupied = 0;
    }

    /// Copies `data` into the buffer at `start_offset` through a temporary mapping of that range.
    ///
    /// The buffer must be bound to host-visible memory. Host-coherent memory needs no flush.
    pub fn write<T>(
        &mut self,
        data: &[T],
        start_offset: u64,
    ) -> Result<presser::CopyRecord>
    where
        T: Copy,
    {
        let binding = self.binding.as_ref().ok_or(MemoryError::NotBound)?;
        if !binding.memory_type.is_host_visible() {
            return Err(eyre!("Cannot write to a buffer in memory that is not host visible"));
        }

        let len = std::mem::size_of_val(data) as u64;
        if len == 0 {
            return Err(eyre!("Nothing to write"));
        }
        if start_offset + len > self.size {
            return Err(eyre!(
                "Write of {} bytes at offset {} overruns buffer of {} bytes",
                len,
                start_offset,
                self.size,
            ));
        }

        let copy_record = unsafe {
            let mapped = self.device.map_memory(
                binding.memory,
                binding.offset + start_offset,
                len,
                vk::MemoryMapFlags::empty(),
            )?;
            let record = std::ptr::NonNull::new(mapped as *mut u8)
                .ok_or_else(|| eyre!("Mapped pointer was null"))
                .and_then(|ptr| {
                    let mut raw_allocation =
                        presser::RawAllocation::from_raw_parts(ptr, len as usize);
                    let mut slab = raw_allocation.borrow_as_slab();
                    Ok(presser::copy_from_slice_to_offset(data, &mut slab, 0)?)
                });
            self.device.unmap_memory(binding.memory);
            record?
        };

        self.occupied = self.occupied.max(start_offset + len);

        Ok(copy_record)
    }

    /// Reads back the occupied bytes of a host-visible buffer.
    pub fn read_occupied(&self) -> Result<Vec<u8>> {
        let binding = self.binding.as_ref().ok_or(MemoryError::NotBound)?;
        if !binding.memory_type.is_host_visible() {
            return Err(eyre!("Cannot read a buffer in memory that is not host visible"));
        }
        if self.occupied == 0 {
            return Ok(Vec::new());
        }

        let bytes = unsafe {
            let mapped = self.device.map_memory(
                binding.memory,
                binding.offset,
                self.occupied,
                vk::MemoryMapFlags::empty(),
            )?;
            let bytes =
                std::slice::from_raw_parts(mapped as *const u8, self.occupied as usize).to_vec();
            self.device.unmap_memory(binding.memory);
            bytes
        };

        Ok(bytes)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
        // Dropping the binding hands the slot back to the arena
        self.binding.take();
    }
}
