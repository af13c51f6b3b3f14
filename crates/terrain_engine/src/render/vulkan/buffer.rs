//! Buffer management for vertex and index data
//!
//! Buffers are allocated in host-visible, host-coherent memory, filled once at
//! creation through a mapping and never written again.

use ash::{vk, Device};
use crate::render::vulkan::{DeviceContext, VulkanResult, VulkanError};

/// Find a memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize].property_flags.contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Immutable GPU buffer with its backing memory
pub struct GpuBuffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl GpuBuffer {
    /// Create a buffer for `usage` and copy `data` into it
    pub fn with_data(context: &DeviceContext, usage: vk::BufferUsageFlags, data: &[u8]) -> VulkanResult<Self> {
        if data.is_empty() {
            return Err(VulkanError::InitializationFailed("Cannot create an empty buffer".to_string()));
        }
        let device = context.device().clone();
        let size = data.len() as vk::DeviceSize;

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device.create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        // TODO: copy through a staging buffer into device-local memory
        let memory_type_index = match find_memory_type(
            &context.physical_device().memory_properties,
            mem_requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        // From here on Drop cleans up
        let gpu_buffer = Self {
            device,
            buffer,
            memory,
            size,
        };

        unsafe {
            gpu_buffer.device.bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }
        gpu_buffer.write(data)?;

        log::debug!("Created {:?} buffer of {} bytes", usage, size);
        Ok(gpu_buffer)
    }

    fn write(&self, data: &[u8]) -> VulkanResult<()> {
        unsafe {
            let mapped = self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>(), data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
