//! Per-frame synchronization objects
//!
//! A frame slot bundles what one frame in flight needs: a fence the host waits
//! on before reusing the slot, a semaphore signalled when the swapchain image
//! is acquired, a semaphore signalled when rendering finishes, and the command
//! buffer the frame is recorded into. Slots are created once with the device
//! context and reused every cycle.

use ash::{vk, Device};
use crate::render::vulkan::{VulkanResult, VulkanError};

/// Synchronization objects and command buffer for one frame in flight
pub struct FrameSlot {
    /// Signalled when the last submission from this slot has completed
    pub in_flight: vk::Fence,
    /// Signalled when the swapchain image for this slot is acquired
    pub image_acquired: vk::Semaphore,
    /// Signalled when rendering for this slot finishes; presentation waits on it
    pub render_finished: vk::Semaphore,
    /// Primary command buffer recorded anew each cycle
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    /// Create the slot's fence (already signalled) and semaphores
    pub fn new(device: &Device, command_buffer: vk::CommandBuffer) -> VulkanResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signalled so the first wait on a fresh slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                in_flight: device.create_fence(&fence_info, None).map_err(VulkanError::Api)?,
                image_acquired: device.create_semaphore(&semaphore_info, None).map_err(VulkanError::Api)?,
                render_finished: device.create_semaphore(&semaphore_info, None).map_err(VulkanError::Api)?,
                command_buffer,
            })
        }
    }

    /// Block until this slot's previous submission has completed
    pub fn wait(&self, device: &Device) -> VulkanResult<()> {
        unsafe {
            device.wait_for_fences(&[self.in_flight], true, u64::MAX)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset the fence right before it is handed to a queue submission
    pub fn reset_fence(&self, device: &Device) -> VulkanResult<()> {
        unsafe {
            device.reset_fences(&[self.in_flight])
                .map_err(VulkanError::Api)
        }
    }

    /// Destroy the fence and semaphores. The command buffer is freed with its pool.
    ///
    /// # Safety
    /// No submission using this slot may still be pending.
    pub(crate) unsafe fn destroy(&self, device: &Device) {
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_semaphore(self.image_acquired, None);
        device.destroy_fence(self.in_flight, None);
    }
}
