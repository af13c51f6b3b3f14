//! Renderer
//!
//! Joins the device context, the bound surface session and the frame cycler,
//! and implements the acquire / submit / present half of the frame loop.

use ash::vk;
use crate::render::vulkan::{
    frame::{FrameCycler, FrameOps},
    DeviceContext, FrameSlot, GraphicsPipeline, PipelineDescription, Surface, SurfaceSession,
    VulkanResult, VulkanError,
};

/// Result of presenting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was queued for presentation
    Presented,
    /// The swapchain no longer matches the surface; a rebuild is pending
    OutOfDate,
}

/// Map `vkAcquireNextImageKHR` onto the frame loop: suboptimal still yields
/// the image, out of date skips the frame, anything else is fatal
fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> VulkanResult<Option<u32>> {
    match result {
        Ok((image_index, _suboptimal)) => Ok(Some(image_index)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// Map `vkQueuePresentKHR` onto the frame loop, scheduling a rebuild when
/// the swapchain is out of date
fn settle_present(cycler: &mut FrameCycler, result: Result<bool, vk::Result>) -> VulkanResult<PresentOutcome> {
    match result {
        Ok(_suboptimal) => Ok(PresentOutcome::Presented),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            log::warn!("Swapchain out of date on present");
            cycler.request_rebuild();
            Ok(PresentOutcome::OutOfDate)
        }
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// [`FrameOps`] backed by the device and the bound session
struct VulkanFrameOps<'a> {
    context: &'a DeviceContext,
    session: &'a mut SurfaceSession,
}

impl FrameOps for VulkanFrameOps<'_> {
    fn wait_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.context.frame_slot(slot).wait(self.context.device())
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<Option<u32>> {
        let semaphore = self.context.frame_slot(slot).image_acquired;
        let result = unsafe {
            self.context.swapchain_loader().acquire_next_image(
                self.session.swapchain(),
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        classify_acquire(result)
    }

    fn rebuild_surface(&mut self) -> VulkanResult<Option<usize>> {
        self.session.rebuild(self.context)
    }
}

/// Device context plus at most one bound surface
pub struct Renderer {
    context: DeviceContext,
    session: Option<SurfaceSession>,
    cycler: FrameCycler,
    default_extent: vk::Extent2D,
}

impl Renderer {
    /// Wrap a device context; no surface is bound yet
    pub fn new(context: DeviceContext, default_extent: vk::Extent2D) -> Self {
        Self {
            context,
            session: None,
            cycler: FrameCycler::new(0),
            default_extent,
        }
    }

    /// Device context
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// The bound session, if any
    pub fn session(&self) -> Option<&SurfaceSession> {
        self.session.as_ref()
    }

    /// Take ownership of `surface` and build a session on it
    ///
    /// A previously bound surface is unbound first.
    pub fn bind_surface(&mut self, surface: vk::SurfaceKHR) -> VulkanResult<()> {
        self.unbind_surface()?;

        let surface = Surface::from_raw(&self.context, surface);
        let session = SurfaceSession::bind(&self.context, surface, self.default_extent)?;
        self.cycler = FrameCycler::new(session.image_count());
        self.session = Some(session);
        Ok(())
    }

    /// Wait for the device to go idle and release the bound session
    pub fn unbind_surface(&mut self) -> VulkanResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let idle = self.context.wait_idle();
        session.destroy(&self.context);
        self.cycler = FrameCycler::new(0);
        idle
    }

    /// Build a pipeline against the bound session's render pass
    pub fn make_pipeline(
        &self,
        vertex_code: &[u8],
        fragment_code: &[u8],
        description: &PipelineDescription,
    ) -> VulkanResult<GraphicsPipeline> {
        self.session
            .as_ref()
            .ok_or(VulkanError::NoSurfaceBound)?
            .make_pipeline(&self.context, vertex_code, fragment_code, description)
    }

    /// Rebuild the swapchain before the next acquire
    pub fn request_recreate_swapchain(&mut self) {
        self.cycler.request_rebuild();
    }

    /// Whether drawing is suspended until the surface regains an area
    pub fn surface_empty(&self) -> bool {
        self.cycler.surface_empty()
    }

    /// Next swapchain image and the frame slot to record it with
    ///
    /// `Ok(None)` means the swapchain is out of date; skip this frame.
    pub fn acquire_image(&mut self) -> VulkanResult<Option<(u32, &FrameSlot)>> {
        let session = self.session.as_mut().ok_or(VulkanError::NoSurfaceBound)?;
        let mut ops = VulkanFrameOps {
            context: &self.context,
            session,
        };

        Ok(self
            .cycler
            .acquire(&mut ops)?
            .map(|frame| (frame.image_index, self.context.frame_slot(frame.slot))))
    }

    /// Submit the current slot's command buffer and present `image_index`
    pub fn submit_and_present(&mut self, image_index: u32) -> VulkanResult<PresentOutcome> {
        let session = self.session.as_ref().ok_or(VulkanError::NoSurfaceBound)?;
        let device = self.context.device();
        let slot = self.context.frame_slot(self.cycler.current_slot());

        slot.reset_fence(device)?;

        let wait_semaphores = [slot.image_acquired];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [slot.command_buffer];
        let signal_semaphores = [slot.render_finished];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.queue_submit(self.context.queue(), &[submit_info.build()], slot.in_flight)
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [session.swapchain()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.context.swapchain_loader().queue_present(self.context.queue(), &present_info)
        };
        settle_present(&mut self.cycler, result)
    }

    /// Wait for the device to finish all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.unbind_surface() {
            log::error!("Failed to unbind surface: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::SwapchainState;

    #[test]
    fn test_acquire_success_and_suboptimal_yield_image() {
        assert_eq!(classify_acquire(Ok((2, false))).unwrap(), Some(2));
        assert_eq!(classify_acquire(Ok((1, true))).unwrap(), Some(1));
    }

    #[test]
    fn test_acquire_out_of_date_skips_frame() {
        assert_eq!(classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(), None);
    }

    #[test]
    fn test_acquire_other_errors_are_fatal() {
        let result = classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST));
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))));
    }

    #[test]
    fn test_present_success_and_suboptimal_keep_swapchain() {
        let mut cycler = FrameCycler::new(3);
        assert_eq!(settle_present(&mut cycler, Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(settle_present(&mut cycler, Ok(true)).unwrap(), PresentOutcome::Presented);
        assert_eq!(cycler.state(), SwapchainState::Stable);
    }

    #[test]
    fn test_present_out_of_date_schedules_rebuild() {
        let mut cycler = FrameCycler::new(3);
        let outcome = settle_present(&mut cycler, Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();

        assert_eq!(outcome, PresentOutcome::OutOfDate);
        assert_eq!(cycler.state(), SwapchainState::PendingRebuild);
    }

    #[test]
    fn test_present_other_errors_are_fatal() {
        let mut cycler = FrameCycler::new(3);
        let result = settle_present(&mut cycler, Err(vk::Result::ERROR_SURFACE_LOST_KHR));

        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))));
        assert_eq!(cycler.state(), SwapchainState::Stable);
    }
}
