//! Vulkan swapchain management
//!
//! Creation is split in two: [`SwapchainPlan`] decides format, extent and image
//! count from what the surface reports (pure, no GPU calls), and
//! [`Swapchain::new`] turns a plan into the swapchain and its image views.

use ash::{vk, Device};
use crate::render::vulkan::{DeviceContext, Surface, VulkanResult, VulkanError};

/// Format used when the surface offers it
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Extent used when the surface leaves the choice to the swapchain
pub const DEFAULT_EXTENT: vk::Extent2D = vk::Extent2D { width: 800, height: 600 };

/// Pick the preferred 8-bit BGRA sRGB format, else the first reported one
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == PREFERRED_SURFACE_FORMAT.format && sf.color_space == PREFERRED_SURFACE_FORMAT.color_space)
        .or_else(|| formats.first())
        .copied()
}

/// Resolve the swapchain extent
///
/// A current extent of `u32::MAX` means the surface size follows the
/// swapchain; `default` is then clamped into the allowed range. Any other
/// current extent is used as is.
pub fn resolve_extent(capabilities: &vk::SurfaceCapabilitiesKHR, default: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: default.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: default.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Viewport covering the whole extent with depth range 0..1
pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering the whole extent
pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Everything needed to create a swapchain, derived from a surface report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    /// Color format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Minimum number of images requested
    pub min_image_count: u32,
    /// Always FIFO: strict vsync queue, no tearing
    pub present_mode: vk::PresentModeKHR,
    /// Surface transform to apply
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPlan {
    /// Derive a plan from surface capabilities and formats
    pub fn new(
        capabilities: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        default_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let format = choose_surface_format(formats).ok_or_else(|| {
            VulkanError::InitializationFailed("Surface reports no formats".to_string())
        })?;

        Ok(Self {
            format,
            extent: resolve_extent(capabilities, default_extent),
            min_image_count: capabilities.min_image_count,
            present_mode: vk::PresentModeKHR::FIFO,
            pre_transform: capabilities.current_transform,
        })
    }

    /// Query the surface and derive a plan
    pub fn from_surface(context: &DeviceContext, surface: &Surface, default_extent: vk::Extent2D) -> VulkanResult<Self> {
        let physical_device = context.physical_device().device;
        let capabilities = surface.capabilities(physical_device)?;
        let formats = surface.formats(physical_device)?;
        Self::new(&capabilities, &formats, default_extent)
    }

    /// A zero-sized extent (minimised window) cannot back a swapchain
    pub fn is_zero_sized(&self) -> bool {
        self.extent.width == 0 || self.extent.height == 0
    }
}

/// Swapchain with its presentable images and one color view per image
pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for `surface` following `plan`
    pub fn new(context: &DeviceContext, surface: &Surface, plan: &SwapchainPlan) -> VulkanResult<Self> {
        let device = context.device();
        let loader = context.swapchain_loader();
        let queue_families = [context.queue_family()];

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(plan.min_image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_families)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true);

        let swapchain = unsafe {
            loader.create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let mut created = Self {
            swapchain,
            images: Vec::with_capacity(images.len()),
            image_views: Vec::with_capacity(images.len()),
            format: plan.format,
            extent: plan.extent,
        };

        for &image in &images {
            match create_image_view(device, image, plan.format.format, vk::ImageAspectFlags::COLOR) {
                Ok(view) => {
                    created.images.push(image);
                    created.image_views.push(view);
                }
                Err(e) => {
                    unsafe { created.destroy(context) };
                    return Err(e);
                }
            }
        }

        log::debug!(
            "Swapchain created: {} images, {}x{}, {:?}",
            created.images.len(), plan.extent.width, plan.extent.height, plan.format.format
        );
        Ok(created)
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get image count
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Release the image views and the swapchain. The surface is left alone.
    ///
    /// # Safety
    /// The device must be idle with respect to this swapchain's images, and
    /// framebuffers built on the image views must already be destroyed.
    pub(crate) unsafe fn destroy(&mut self, context: &DeviceContext) {
        for view in self.image_views.drain(..) {
            context.device().destroy_image_view(view, None);
        }
        self.images.clear();
        context.swapchain_loader().destroy_swapchain(self.swapchain, None);
        self.swapchain = vk::SwapchainKHR::null();
    }
}

/// Create a 2D single-mip image view for a swapchain or depth image
pub(crate) fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspects: vk::ImageAspectFlags,
) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspects,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device.create_image_view(&create_info, None)
            .map_err(VulkanError::Api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn test_concrete_extent_is_used_exactly() {
        let caps = capabilities((1024, 768), (1, 1), (4096, 4096));
        let extent = resolve_extent(&caps, DEFAULT_EXTENT);
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn test_sentinel_extent_uses_default_within_bounds() {
        let caps = capabilities((u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        let extent = resolve_extent(&caps, DEFAULT_EXTENT);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_sentinel_extent_is_clamped_componentwise() {
        // Width clamped down to max, height clamped up to min
        let caps = capabilities((u32::MAX, u32::MAX), (100, 700), (640, 2000));
        let extent = resolve_extent(&caps, DEFAULT_EXTENT);
        assert_eq!((extent.width, extent.height), (640, 700));
    }

    #[test]
    fn test_preferred_format_is_chosen() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_format_falls_back_to_first() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            // Right format, wrong color space
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_plan_uses_fifo_and_min_image_count() {
        let caps = capabilities((1280, 720), (1, 1), (4096, 4096));
        let formats = [PREFERRED_SURFACE_FORMAT];
        let plan = SwapchainPlan::new(&caps, &formats, DEFAULT_EXTENT).unwrap();
        assert_eq!(plan.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(plan.min_image_count, 2);
        assert_eq!(plan.extent, vk::Extent2D { width: 1280, height: 720 });
        assert!(!plan.is_zero_sized());
    }

    #[test]
    fn test_plan_is_stable_across_rebuilds() {
        let caps = capabilities((u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            PREFERRED_SURFACE_FORMAT,
        ];
        let first = SwapchainPlan::new(&caps, &formats, DEFAULT_EXTENT).unwrap();
        for _ in 0..3 {
            assert_eq!(SwapchainPlan::new(&caps, &formats, DEFAULT_EXTENT).unwrap(), first);
        }
    }

    #[test]
    fn test_plan_without_formats_fails() {
        let caps = capabilities((640, 480), (1, 1), (4096, 4096));
        assert!(SwapchainPlan::new(&caps, &[], DEFAULT_EXTENT).is_err());
    }

    #[test]
    fn test_minimised_surface_is_zero_sized() {
        let caps = capabilities((0, 0), (0, 0), (4096, 4096));
        let plan = SwapchainPlan::new(&caps, &[PREFERRED_SURFACE_FORMAT], DEFAULT_EXTENT).unwrap();
        assert!(plan.is_zero_sized());
    }

    #[test]
    fn test_viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        let viewport = viewport_for(extent);
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));

        let scissor = scissor_for(extent);
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!(scissor.extent, extent);
    }
}
