//! Framebuffer management
//!
//! One depth image is shared by every framebuffer; each swapchain image gets
//! its own framebuffer pairing its color view with that depth view.

use ash::{vk, Device};
use crate::render::vulkan::{
    buffer::find_memory_type, render_pass::DEPTH_FORMAT, swapchain::create_image_view,
    DeviceContext, RenderPass, VulkanResult, VulkanError,
};

/// Depth image, its memory and its view
pub struct DepthBuffer {
    image: vk::Image,
    memory: vk::DeviceMemory,
    image_view: vk::ImageView,
}

impl DepthBuffer {
    /// Create a device-local depth buffer covering `extent`
    pub fn new(context: &DeviceContext, extent: vk::Extent2D) -> VulkanResult<Self> {
        let device = context.device();

        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(DEPTH_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device.create_image(&image_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let memory_requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = find_memory_type(
            &context.physical_device().memory_properties,
            memory_requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .and_then(|memory_type_index| {
            let alloc_info = vk::MemoryAllocateInfo::builder()
                .allocation_size(memory_requirements.size)
                .memory_type_index(memory_type_index);
            unsafe { device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api) }
        });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = unsafe { device.bind_image_memory(image, memory, 0) }
            .map_err(VulkanError::Api)
            .and_then(|()| create_image_view(device, image, DEPTH_FORMAT, vk::ImageAspectFlags::DEPTH));
        match view {
            Ok(image_view) => Ok(Self { image, memory, image_view }),
            Err(e) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                Err(e)
            }
        }
    }

    /// Get the image view handle
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// # Safety
    /// Framebuffers referencing the view must already be destroyed.
    unsafe fn destroy(&self, device: &Device) {
        device.destroy_image_view(self.image_view, None);
        device.destroy_image(self.image, None);
        device.free_memory(self.memory, None);
    }
}

/// Framebuffers for every swapchain image plus the shared depth buffer
pub struct FramebufferSet {
    framebuffers: Vec<vk::Framebuffer>,
    depth: DepthBuffer,
    extent: vk::Extent2D,
}

impl FramebufferSet {
    /// Build the depth buffer, then one framebuffer per color view
    pub fn new(
        context: &DeviceContext,
        render_pass: &RenderPass,
        color_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let depth = DepthBuffer::new(context, extent)?;
        let mut set = Self {
            framebuffers: Vec::with_capacity(color_views.len()),
            depth,
            extent,
        };

        for &color_view in color_views {
            let attachments = [color_view, set.depth.image_view()];
            let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            match unsafe { context.device().create_framebuffer(&framebuffer_create_info, None) } {
                Ok(framebuffer) => set.framebuffers.push(framebuffer),
                Err(e) => {
                    unsafe { set.destroy(context.device()) };
                    return Err(VulkanError::Api(e));
                }
            }
        }

        log::debug!("Created {} framebuffers at {}x{}", set.framebuffers.len(), extent.width, extent.height);
        Ok(set)
    }

    /// Get framebuffer for a specific swapchain image
    pub fn get(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize]
    }

    /// Get the number of framebuffers
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    /// Whether no framebuffers exist
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    /// Extent every framebuffer was created with
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Destroy the framebuffers, then the depth view, image and memory
    ///
    /// # Safety
    /// No pending command buffer may reference these framebuffers.
    pub(crate) unsafe fn destroy(&mut self, device: &Device) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer, None);
        }
        self.depth.destroy(device);
    }
}
