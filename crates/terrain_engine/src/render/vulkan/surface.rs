//! Vulkan surface management
//!
//! Wraps a platform surface handle handed over by the window, plus the
//! queries the swapchain needs. Destroyed by the owning surface session.

use ash::{vk, extensions::khr};
use crate::render::vulkan::{DeviceContext, VulkanResult, VulkanError};

/// Vulkan surface wrapper for presentation
pub struct Surface {
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Take ownership of a surface created by the windowing layer
    pub fn from_raw(context: &DeviceContext, surface: vk::SurfaceKHR) -> Self {
        Self {
            surface_loader: khr::Surface::new(context.entry(), context.instance()),
            surface,
        }
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get surface capabilities for a physical device
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(VulkanError::Api)
        }
    }

    /// Get surface formats for a physical device
    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(VulkanError::Api)
        }
    }

    /// Check if a queue family supports presentation to this surface
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family_index: u32) -> VulkanResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.surface)
                .map_err(VulkanError::Api)
        }
    }

    /// Destroy the surface
    ///
    /// # Safety
    /// Any swapchain created for this surface must already be destroyed.
    pub(crate) unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}
