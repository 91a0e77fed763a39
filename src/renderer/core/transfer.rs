use std::cell::Cell;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use crate::renderer::core::queue::Queue;

/// Blocking one-shot submissions: a transient pool with a single command buffer and the fence
/// that retires it. Both are recycled after every submission.
pub struct TransferContext {
    fence: vk::Fence,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    submissions: Cell<u64>,

    queue: Arc<Queue>,
    device: Arc<ash::Device>,
}

impl TransferContext {
    pub fn new(queue: Arc<Queue>, device: Arc<ash::Device>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue.family.index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let allocated = unsafe {
            device
                .allocate_command_buffers(&allocate_info)
                .inspect_err(|_| device.destroy_command_pool(pool, None))?
        };
        let command_buffer = allocated
            .first()
            .copied()
            .ok_or_eyre("Driver allocated no transfer command buffer")?;

        let fence = unsafe {
            device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .inspect_err(|_| device.destroy_command_pool(pool, None))?
        };

        Ok(Self {
            fence,
            pool,
            command_buffer,
            submissions: Cell::new(0),

            queue,
            device,
        })
    }

    /// Records `func`, submits it and waits for the queue to finish it.
    ///
    /// A failing `func` is never submitted. The pool and fence are recycled whatever the
    /// outcome, so a failed call leaves no pending command buffer behind.
    pub fn immediate_submit<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let submitted = self.record_and_wait(func);
        let recycled = self.recycle();
        submitted?;
        recycled?;

        self.submissions.set(self.submissions.get() + 1);
        log::trace!("Transfer submission {} retired", self.submissions.get());

        Ok(())
    }

    /// Completed submissions so far
    pub fn submissions(&self) -> u64 {
        self.submissions.get()
    }

    fn record_and_wait<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let cmd = self.command_buffer;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &begin_info)? };

        let recorded = func(cmd, &self.device);
        unsafe { self.device.end_command_buffer(cmd)? };
        recorded?;

        let command_buffers = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device.queue_submit(self.queue.handle, &[submit], self.fence)?;
            self.device.wait_for_fences(&[self.fence], true, u64::MAX)?;
        }
        Ok(())
    }

    fn recycle(&self) -> Result<()> {
        unsafe {
            if self.device.get_fence_status(self.fence)? {
                self.device.reset_fences(&[self.fence])?;
            }
            self.device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }
}

impl Drop for TransferContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
