//! Synchronization primitives and frame slots.
//!
//! A frame slot owns everything one in-flight frame needs: a command pool and
//! buffer, the fence the GPU signals when the frame's work completes, and the
//! acquire/render semaphores. Slots rotate by `frame_number % slot_count`; a
//! slot's command buffer is only reset after its fence has been observed
//! signaled.

use crate::command::{begin_command_buffer, end_command_buffer, CommandPool};
use crate::error::{GpuError, Result};
use crate::swapchain::Swapchain;
use ash::vk;
use umbra_core::constants::FENCE_TIMEOUT_NS;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = unsafe { device.create_semaphore(&create_info, None)? };
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.create_fence(&create_info, None)? };
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<()> {
    unsafe { device.wait_for_fences(&[fence], true, timeout_ns)? };
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence])? };
    Ok(())
}

/// Where a frame slot is in the per-frame protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    /// Never used; its fence starts signaled.
    Idle,
    /// Fence observed signaled; the GPU is done with the slot.
    Ready,
    /// A swapchain image was acquired against the slot's semaphore.
    Acquired,
    /// Fence and command buffer reset, commands being recorded.
    Recording,
    /// Submitted; the fence will signal when the GPU finishes.
    Submitted,
}

/// Bookkeeping for the frame slot protocol.
///
/// Each slot walks `Ready -> Acquired -> Recording -> Submitted`, and only a
/// submitted slot lets the ring advance to the next frame. Calls made out of
/// order return [`GpuError::InvalidState`].
#[derive(Debug, Clone)]
pub struct FrameRing {
    phases: Vec<SlotPhase>,
    frame_number: u64,
}

impl FrameRing {
    pub fn new(slot_count: usize) -> Self {
        Self {
            phases: vec![SlotPhase::Idle; slot_count.max(1)],
            frame_number: 0,
        }
    }

    /// Slot used by frame `frame_number`.
    pub const fn slot_for(frame_number: u64, slot_count: usize) -> usize {
        (frame_number % slot_count as u64) as usize
    }

    pub fn slot_count(&self) -> usize {
        self.phases.len()
    }

    pub fn current(&self) -> usize {
        Self::slot_for(self.frame_number, self.phases.len())
    }

    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn phase(&self, slot: usize) -> SlotPhase {
        self.phases[slot]
    }

    fn step(&mut self, from: &[SlotPhase], to: SlotPhase) -> Result<()> {
        let slot = self.current();
        let phase = self.phases[slot];
        if !from.contains(&phase) {
            return Err(GpuError::InvalidState(format!(
                "Frame slot {slot} cannot move from {phase:?} to {to:?}"
            )));
        }
        self.phases[slot] = to;
        Ok(())
    }

    /// The current slot's fence was observed signaled.
    pub fn mark_waited(&mut self) -> Result<()> {
        self.step(
            &[SlotPhase::Idle, SlotPhase::Ready, SlotPhase::Submitted],
            SlotPhase::Ready,
        )
    }

    pub fn mark_acquired(&mut self) -> Result<()> {
        self.step(&[SlotPhase::Ready], SlotPhase::Acquired)
    }

    /// The slot's fence and command buffer are about to be reset.
    pub fn mark_recording(&mut self) -> Result<()> {
        self.step(&[SlotPhase::Acquired], SlotPhase::Recording)
    }

    pub fn mark_submitted(&mut self) -> Result<()> {
        self.step(&[SlotPhase::Recording], SlotPhase::Submitted)
    }

    /// Move to the next frame. The current slot must have been submitted.
    pub fn advance(&mut self) -> Result<()> {
        let slot = self.current();
        if self.phases[slot] != SlotPhase::Submitted {
            return Err(GpuError::InvalidState(format!(
                "Cannot advance past frame slot {slot} in {:?}",
                self.phases[slot]
            )));
        }
        self.frame_number += 1;
        Ok(())
    }
}

/// Per-frame command and synchronization resources.
pub struct FrameSlot {
    pub command_pool: CommandPool,
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by the GPU when this slot's submission completes.
    pub render_fence: vk::Fence,
    /// Signaled when the acquired swapchain image is ready to be written.
    pub swapchain_semaphore: vk::Semaphore,
    /// Signaled when rendering finishes; presentation waits on it.
    pub render_semaphore: vk::Semaphore,
}

impl FrameSlot {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        unsafe {
            let command_pool = CommandPool::new(
                device,
                queue_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?;
            let command_buffer = command_pool.allocate_command_buffer(device)?;

            Ok(Self {
                command_pool,
                command_buffer,
                render_fence: create_fence(device, true)?,
                swapchain_semaphore: create_semaphore(device)?,
                render_semaphore: create_semaphore(device)?,
            })
        }
    }

    /// # Safety
    /// The device must be valid and the slot's resources must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            self.command_pool.destroy(device);
            device.destroy_fence(self.render_fence, None);
            device.destroy_semaphore(self.swapchain_semaphore, None);
            device.destroy_semaphore(self.render_semaphore, None);
        }
    }
}

/// The rotating set of frame slots and the protocol that drives them.
///
/// One frame is:
/// [`wait`](Self::wait), [`acquire`](Self::acquire),
/// [`begin`](Self::begin), record, [`submit`](Self::submit),
/// [`present`](Self::present), [`advance`](Self::advance).
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    ring: FrameRing,
}

impl FrameSlots {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, queue_family: u32, count: usize) -> Result<Self> {
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count.max(1) {
            slots.push(unsafe { FrameSlot::new(device, queue_family)? });
        }
        let ring = FrameRing::new(slots.len());
        Ok(Self { slots, ring })
    }

    pub fn current_index(&self) -> usize {
        self.ring.current()
    }

    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.ring.current()]
    }

    pub const fn frame_number(&self) -> u64 {
        self.ring.frame_number()
    }

    pub const fn ring(&self) -> &FrameRing {
        &self.ring
    }

    /// Block until the GPU has finished the previous use of the current slot.
    ///
    /// # Safety
    /// The device must be valid.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn wait(&mut self, device: &ash::Device) -> Result<()> {
        unsafe { wait_for_fence(device, self.current().render_fence, FENCE_TIMEOUT_NS)? };
        self.ring.mark_waited()
    }

    /// Acquire the next swapchain image against the slot's acquire semaphore.
    ///
    /// Returns the image index and whether the swapchain is suboptimal. An
    /// out-of-date swapchain is reported as an error and leaves the slot ready
    /// for another attempt.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire(
        &mut self,
        loader: &ash::khr::swapchain::Device,
        swapchain: &Swapchain,
    ) -> Result<(u32, bool)> {
        if self.ring.phase(self.ring.current()) != SlotPhase::Ready {
            return Err(GpuError::InvalidState(
                "Acquire before the frame slot's fence was waited on".to_string(),
            ));
        }
        let acquired = unsafe {
            swapchain.acquire_next_image(
                loader,
                self.current().swapchain_semaphore,
                FENCE_TIMEOUT_NS,
            )?
        };
        self.ring.mark_acquired()?;
        Ok(acquired)
    }

    /// Reset the slot's fence and command pool and begin recording.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn begin(&mut self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        self.ring.mark_recording()?;
        let slot = self.current();
        unsafe {
            reset_fence(device, slot.render_fence)?;
            slot.command_pool.reset(device)?;
            begin_command_buffer(
                device,
                slot.command_buffer,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )?;
        }
        Ok(slot.command_buffer)
    }

    /// End recording and submit.
    ///
    /// Waits on the acquire semaphore at colour attachment output, signals the
    /// render semaphore after all graphics work, and signals the slot's fence.
    ///
    /// # Safety
    /// The device and queue must be valid.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn submit(&mut self, device: &ash::Device, queue: vk::Queue) -> Result<()> {
        self.ring.mark_submitted()?;
        let slot = self.current();

        let cmd_infos =
            [vk::CommandBufferSubmitInfo::default().command_buffer(slot.command_buffer)];
        let wait_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.swapchain_semaphore)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .value(1)];
        let signal_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.render_semaphore)
            .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS)
            .value(1)];

        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos)
            .command_buffer_infos(&cmd_infos);

        unsafe {
            end_command_buffer(device, slot.command_buffer)?;
            device.queue_submit2(queue, &[submit], slot.render_fence)?;
        }
        Ok(())
    }

    /// Present `image_index`, waiting on the slot's render semaphore.
    ///
    /// Returns `true` if the swapchain should be recreated.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        loader: &ash::khr::swapchain::Device,
        swapchain: &Swapchain,
        queue: vk::Queue,
        image_index: u32,
    ) -> Result<bool> {
        if self.ring.phase(self.ring.current()) != SlotPhase::Submitted {
            return Err(GpuError::InvalidState(
                "Present before the frame was submitted".to_string(),
            ));
        }
        unsafe {
            swapchain.present(
                loader,
                queue,
                image_index,
                &[self.current().render_semaphore],
            )
        }
    }

    pub fn advance(&mut self) -> Result<()> {
        self.ring.advance()
    }

    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for slot in &self.slots {
            unsafe { slot.destroy(device) };
        }
    }
}
