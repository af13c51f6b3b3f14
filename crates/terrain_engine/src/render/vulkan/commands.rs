//! Command buffer management
//!
//! Type-safe command buffer recording: a render pass scope ends when its
//! [`ActiveRenderPass`] is dropped, and push constants are checked against the
//! size their pipeline declared.

use ash::{vk, Device};
use crate::render::vulkan::{VulkanResult, VulkanError, GpuBuffer, GraphicsPipeline};

/// Command pool. Destroyed explicitly by the device context.
pub struct CommandPool {
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers are short-lived and individually resettable
    pub fn new(device: &Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER | vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device.create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, device: &Device, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            device.allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Destroy the pool, freeing every buffer allocated from it
    ///
    /// # Safety
    /// None of the pool's command buffers may be pending execution.
    pub(crate) unsafe fn destroy(&self, device: &Device) {
        device.destroy_command_pool(self.command_pool, None);
    }
}

/// Records one frame's commands into a frame slot's command buffer
pub struct CommandRecorder<'a> {
    device: &'a Device,
    command_buffer: vk::CommandBuffer,
}

impl<'a> CommandRecorder<'a> {
    /// Begin one-time-submit recording
    pub fn begin(device: &'a Device, command_buffer: vk::CommandBuffer) -> VulkanResult<Self> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device.begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self { device, command_buffer })
    }

    /// Begin render pass
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> ActiveRenderPass<'_, 'a> {
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }

        ActiveRenderPass { recorder: self }
    }

    /// End command recording
    pub fn end(self) -> VulkanResult<vk::CommandBuffer> {
        unsafe {
            self.device.end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }
        Ok(self.command_buffer)
    }
}

/// Render pass scope; the pass ends on drop
pub struct ActiveRenderPass<'r, 'a> {
    recorder: &'r mut CommandRecorder<'a>,
}

impl ActiveRenderPass<'_, '_> {
    /// Set viewport
    pub fn set_viewport(&mut self, viewport: &vk::Viewport) {
        unsafe {
            self.recorder.device.cmd_set_viewport(self.recorder.command_buffer, 0, &[*viewport]);
        }
    }

    /// Set scissor
    pub fn set_scissor(&mut self, scissor: &vk::Rect2D) {
        unsafe {
            self.recorder.device.cmd_set_scissor(self.recorder.command_buffer, 0, &[*scissor]);
        }
    }

    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: &GraphicsPipeline) {
        unsafe {
            self.recorder.device.cmd_bind_pipeline(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.handle(),
            );
        }
    }

    /// Upload a push-constant payload to the vertex stage of `pipeline`
    ///
    /// Fails when the payload is larger than the range the pipeline declared.
    pub fn push_constants(&mut self, pipeline: &GraphicsPipeline, data: &[u8]) -> VulkanResult<()> {
        pipeline.check_push_constant_payload(data.len())?;
        unsafe {
            self.recorder.device.cmd_push_constants(
                self.recorder.command_buffer,
                pipeline.layout(),
                vk::ShaderStageFlags::VERTEX,
                0,
                data,
            );
        }
        Ok(())
    }

    /// Bind a vertex buffer at binding 0
    pub fn bind_vertex_buffer(&mut self, buffer: &GpuBuffer) {
        unsafe {
            self.recorder.device.cmd_bind_vertex_buffers(self.recorder.command_buffer, 0, &[buffer.handle()], &[0]);
        }
    }

    /// Bind a u32 index buffer
    pub fn bind_index_buffer(&mut self, buffer: &GpuBuffer) {
        unsafe {
            self.recorder.device.cmd_bind_index_buffer(self.recorder.command_buffer, buffer.handle(), 0, vk::IndexType::UINT32);
        }
    }

    /// Draw non-indexed vertices
    pub fn draw(&mut self, vertex_count: u32) {
        unsafe {
            self.recorder.device.cmd_draw(self.recorder.command_buffer, vertex_count, 1, 0, 0);
        }
    }

    /// Draw indexed
    pub fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.recorder.device.cmd_draw_indexed(self.recorder.command_buffer, index_count, 1, 0, 0, 0);
        }
    }
}

impl Drop for ActiveRenderPass<'_, '_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}
