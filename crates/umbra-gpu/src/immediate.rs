//! Blocking one-shot command submission.
//!
//! Setup work (uploads, initial layout transitions, readbacks) is recorded into
//! a dedicated command buffer, submitted to the graphics queue, and waited on
//! with a dedicated fence before returning. Never use this inside the per-frame
//! render path: every call drains the queue.

use crate::command::{begin_command_buffer, end_command_buffer, CommandPool, VulkanRecorder};
use crate::error::Result;
use crate::sync::{create_fence, reset_fence, wait_for_fence};
use ash::vk;
use umbra_core::constants::FENCE_TIMEOUT_NS;

/// Dedicated pool, command buffer and fence for immediate submissions.
pub struct ImmediateSubmit {
    pool: CommandPool,
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
    queue: vk::Queue,
}

impl ImmediateSubmit {
    /// # Safety
    /// The device must be valid and `queue` must belong to `queue_family`.
    pub unsafe fn new(device: &ash::Device, queue_family: u32, queue: vk::Queue) -> Result<Self> {
        let pool = unsafe {
            CommandPool::new(
                device,
                queue_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };
        let cmd = unsafe { pool.allocate_command_buffer(device)? };
        let fence = unsafe { create_fence(device, false)? };

        Ok(Self {
            pool,
            cmd,
            fence,
            queue,
        })
    }

    /// Record with `f`, submit, and block until the GPU has finished.
    ///
    /// # Safety
    /// The device must be the one this executor was created with, and every
    /// handle recorded by `f` must be valid.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn submit<F>(&self, device: &ash::Device, f: F) -> Result<()>
    where
        F: FnOnce(&mut VulkanRecorder<'_>),
    {
        unsafe {
            begin_command_buffer(device, self.cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
            let mut recorder = VulkanRecorder::new(device, self.cmd);
            f(&mut recorder);
            end_command_buffer(device, self.cmd)?;

            let cmd_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(self.cmd)];
            let submit = vk::SubmitInfo2::default().command_buffer_infos(&cmd_infos);
            device.queue_submit2(self.queue, &[submit], self.fence)?;

            wait_for_fence(device, self.fence, FENCE_TIMEOUT_NS)?;
            reset_fence(device, self.fence)?;
            self.pool.reset(device)?;
        }
        Ok(())
    }

    /// # Safety
    /// No submission may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_fence(self.fence, None);
            self.pool.destroy(device);
        }
    }
}
