//! Command pool and submission helpers.
//!
//! Pure pass-throughs over the device handle; no negotiation logic lives
//! here.

use crate::device::LogicalDevice;
use crate::error::Result;
use ash::vk;

/// Command pool bound to one queue family.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index the pool was created on.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Reset the pool.
    ///
    /// # Safety
    /// No command buffer from this pool may be in use.
    pub unsafe fn reset(
        &self,
        device: &LogicalDevice,
        flags: vk::CommandPoolResetFlags,
    ) -> Result<()> {
        device.handle().reset_command_pool(self.pool, flags)?;
        Ok(())
    }

    /// Destroy the pool.
    ///
    /// # Safety
    /// The pool must not be in use.
    pub unsafe fn destroy(&self, device: &LogicalDevice) {
        device.handle().destroy_command_pool(self.pool, None);
    }
}

impl LogicalDevice {
    /// Create a command pool on the given queue family.
    ///
    /// # Safety
    /// The family index must be one the device was created with.
    pub unsafe fn create_command_pool(
        &self,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<CommandPool> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = self.handle().create_command_pool(&create_info, None)?;

        Ok(CommandPool { pool, queue_family })
    }

    /// Allocate command buffers from a pool.
    ///
    /// # Safety
    /// The pool must be valid and not in use by another thread.
    pub unsafe fn allocate_command_buffers(
        &self,
        pool: &CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.handle())
            .level(level)
            .command_buffer_count(count);

        let buffers = self.handle().allocate_command_buffers(&alloc_info)?;
        Ok(buffers)
    }

    /// Submit command buffers to a queue.
    ///
    /// # Safety
    /// All handles must be valid; submission ordering on the queue is the
    /// caller's responsibility.
    pub unsafe fn submit(
        &self,
        queue: vk::Queue,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> Result<()> {
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(command_buffers)
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .signal_semaphores(signal_semaphores);

        self.handle().queue_submit(queue, &[submit_info], fence)?;
        Ok(())
    }

    /// Allocate and begin a one-shot command buffer.
    ///
    /// # Safety
    /// The pool must be valid.
    pub unsafe fn begin_single_time_commands(
        &self,
        pool: &CommandPool,
    ) -> Result<vk::CommandBuffer> {
        let cmd = self.allocate_command_buffers(pool, vk::CommandBufferLevel::PRIMARY, 1)?[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.handle().begin_command_buffer(cmd, &begin_info)?;

        Ok(cmd)
    }

    /// End, submit, and wait out a one-shot command buffer, then free it.
    ///
    /// # Safety
    /// The command buffer must have been begun on this device from `pool`.
    pub unsafe fn end_single_time_commands(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        pool: &CommandPool,
    ) -> Result<()> {
        self.handle().end_command_buffer(command_buffer)?;

        let buffers = [command_buffer];
        self.submit(queue, &buffers, &[], &[], &[], vk::Fence::null())?;
        self.handle().queue_wait_idle(queue)?;

        self.handle().free_command_buffers(pool.handle(), &buffers);
        Ok(())
    }
}
