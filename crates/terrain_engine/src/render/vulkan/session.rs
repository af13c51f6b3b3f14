//! Surface session
//!
//! Everything tied to one presentation surface: the surface itself, its
//! swapchain, the render pass and the framebuffers. Only one session exists
//! at a time. Binding builds it; [`SurfaceSession::destroy`] releases it
//! children first.

use ash::vk;
use crate::render::vulkan::{
    swapchain::{scissor_for, viewport_for},
    DeviceContext, FramebufferSet, GraphicsPipeline, PipelineDescription, RenderPass,
    Surface, Swapchain, SwapchainPlan, VulkanResult, VulkanError,
};

/// Fail when a rebuilt swapchain would no longer match the render pass
pub fn check_color_format(current: vk::Format, reported: vk::Format) -> VulkanResult<()> {
    if current == reported {
        Ok(())
    } else {
        Err(VulkanError::SurfaceFormatChanged { from: current, to: reported })
    }
}

/// Swapchain, render pass and framebuffers for a bound surface
pub struct SurfaceSession {
    surface: Surface,
    swapchain: Swapchain,
    render_pass: RenderPass,
    framebuffers: Option<FramebufferSet>,
    default_extent: vk::Extent2D,
}

impl SurfaceSession {
    /// Bind a surface: verify presentation support, then build the swapchain,
    /// render pass and framebuffers
    ///
    /// The surface is owned by the session from here on, and is destroyed
    /// again if binding fails.
    pub fn bind(context: &DeviceContext, surface: Surface, default_extent: vk::Extent2D) -> VulkanResult<Self> {
        match Self::build(context, &surface, default_extent) {
            Ok((swapchain, render_pass, framebuffers)) => {
                log::info!(
                    "Surface bound: {}x{}, {} images",
                    swapchain.extent().width, swapchain.extent().height, swapchain.image_count()
                );
                Ok(Self {
                    surface,
                    swapchain,
                    render_pass,
                    framebuffers: Some(framebuffers),
                    default_extent,
                })
            }
            Err(e) => {
                unsafe { surface.destroy() };
                Err(e)
            }
        }
    }

    fn build(
        context: &DeviceContext,
        surface: &Surface,
        default_extent: vk::Extent2D,
    ) -> VulkanResult<(Swapchain, RenderPass, FramebufferSet)> {
        let queue_family = context.queue_family();
        if !surface.supports_present(context.physical_device().device, queue_family)? {
            return Err(VulkanError::SurfaceNotSupported { queue_family });
        }

        let plan = SwapchainPlan::from_surface(context, surface, default_extent)?;
        if plan.is_zero_sized() {
            return Err(VulkanError::InitializationFailed("Surface has no area".to_string()));
        }

        let mut swapchain = Swapchain::new(context, surface, &plan)?;
        let render_pass = match RenderPass::new_forward_pass(context.device(), plan.format.format) {
            Ok(render_pass) => render_pass,
            Err(e) => {
                unsafe { swapchain.destroy(context) };
                return Err(e);
            }
        };
        match FramebufferSet::new(context, &render_pass, swapchain.image_views(), swapchain.extent()) {
            Ok(framebuffers) => Ok((swapchain, render_pass, framebuffers)),
            Err(e) => {
                unsafe {
                    render_pass.destroy(context.device());
                    swapchain.destroy(context);
                }
                Err(e)
            }
        }
    }

    /// Recreate the swapchain and framebuffers for the surface's current size
    ///
    /// Waits for the device to go idle first. Returns the new image count, or
    /// `None` without touching anything when the surface has no area.
    pub fn rebuild(&mut self, context: &DeviceContext) -> VulkanResult<Option<usize>> {
        context.wait_idle()?;

        let plan = SwapchainPlan::from_surface(context, &self.surface, self.default_extent)?;
        if plan.is_zero_sized() {
            log::debug!("Surface has no area, postponing swapchain rebuild");
            return Ok(None);
        }
        // The render pass and every pipeline built on it are tied to the color format
        check_color_format(self.swapchain.format().format, plan.format.format)?;

        unsafe {
            if let Some(mut framebuffers) = self.framebuffers.take() {
                framebuffers.destroy(context.device());
            }
            self.swapchain.destroy(context);
        }

        self.swapchain = Swapchain::new(context, &self.surface, &plan)?;
        self.framebuffers = Some(FramebufferSet::new(
            context,
            &self.render_pass,
            self.swapchain.image_views(),
            self.swapchain.extent(),
        )?);

        log::debug!(
            "Swapchain rebuilt: {}x{}, {} images",
            plan.extent.width, plan.extent.height, self.swapchain.image_count()
        );
        Ok(Some(self.swapchain.image_count()))
    }

    /// Build a pipeline compatible with this session's render pass
    pub fn make_pipeline(
        &self,
        context: &DeviceContext,
        vertex_code: &[u8],
        fragment_code: &[u8],
        description: &PipelineDescription,
    ) -> VulkanResult<GraphicsPipeline> {
        GraphicsPipeline::new(
            context.device(),
            self.render_pass.handle(),
            vertex_code,
            fragment_code,
            description,
            context.physical_device().max_push_constants_size(),
        )
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Viewport covering the current extent
    pub fn viewport(&self) -> vk::Viewport {
        viewport_for(self.swapchain.extent())
    }

    /// Scissor covering the current extent
    pub fn scissor(&self) -> vk::Rect2D {
        scissor_for(self.swapchain.extent())
    }

    /// Color format of the swapchain images
    pub fn color_format(&self) -> vk::Format {
        self.swapchain.format().format
    }

    /// Render pass handle
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Swapchain handle
    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain.handle()
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Framebuffer for a swapchain image
    pub fn framebuffer(&self, image_index: u32) -> VulkanResult<vk::Framebuffer> {
        self.framebuffers
            .as_ref()
            .filter(|framebuffers| (image_index as usize) < framebuffers.len())
            .map(|framebuffers| framebuffers.get(image_index))
            .ok_or_else(|| VulkanError::InitializationFailed(format!("No framebuffer for image {image_index}")))
    }

    /// Release framebuffers, render pass, swapchain, then the surface
    ///
    /// The caller must have waited for the device to go idle, and every
    /// pipeline built from this session must already be destroyed.
    pub fn destroy(mut self, context: &DeviceContext) {
        log::debug!("Destroying surface session");
        unsafe {
            if let Some(mut framebuffers) = self.framebuffers.take() {
                framebuffers.destroy(context.device());
            }
            self.render_pass.destroy(context.device());
            self.swapchain.destroy(context);
            self.surface.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_color_format_is_accepted() {
        assert!(check_color_format(vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_SRGB).is_ok());
    }

    #[test]
    fn test_changed_color_format_is_rejected() {
        let result = check_color_format(vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_UNORM);
        assert!(matches!(
            result,
            Err(VulkanError::SurfaceFormatChanged {
                from: vk::Format::B8G8R8A8_SRGB,
                to: vk::Format::R8G8B8A8_UNORM,
            })
        ));
    }
}
