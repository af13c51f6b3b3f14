//! Graphics pipeline factory
//!
//! Every pipeline shares the same fixed state: no culling, filled polygons,
//! depth test LESS with writes, one opaque color attachment, and dynamic
//! viewport and scissor so a swapchain rebuild never invalidates a pipeline.
//! What varies is captured by [`PipelineDescription`].

use ash::{vk, Device};
use crate::render::vulkan::{shader::ShaderModule, VulkanResult, VulkanError};

/// Vertex layout, topology and push-constant size of a pipeline
#[derive(Debug, Clone, Default)]
pub struct PipelineDescription {
    /// Vertex buffer bindings
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex attributes read from those bindings
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Bytes of push-constant data visible to the vertex stage
    pub push_constant_size: u32,
}

impl PipelineDescription {
    /// Describe a pipeline reading interleaved vertices of type `V` from binding 0
    ///
    /// `attributes` lists `(format, offset)` per shader location, starting at
    /// location 0.
    pub fn interleaved<V>(
        attributes: &[(vk::Format, u32)],
        topology: vk::PrimitiveTopology,
        push_constant_size: u32,
    ) -> Self {
        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<V>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        };

        let attributes = attributes
            .iter()
            .zip(0u32..)
            .map(|(&(format, offset), location)| vk::VertexInputAttributeDescription {
                binding: 0,
                location,
                format,
                offset,
            })
            .collect();

        Self {
            bindings: vec![binding],
            attributes,
            topology,
            push_constant_size,
        }
    }
}

/// Reject push-constant ranges larger than the device allows
pub fn check_push_constant_range(requested: u32, limit: u32) -> VulkanResult<()> {
    if requested > limit {
        return Err(VulkanError::PushConstantTooLarge { requested, limit });
    }
    Ok(())
}

/// Reject payloads larger than the range a pipeline declared
pub fn check_push_constant_payload(payload: usize, declared: u32) -> VulkanResult<()> {
    if payload > declared as usize {
        return Err(VulkanError::PushConstantOverflow { payload, declared });
    }
    Ok(())
}

/// Graphics pipeline and its layout
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    push_constant_size: u32,
}

impl GraphicsPipeline {
    /// Build a pipeline for subpass 0 of `render_pass`
    ///
    /// `max_push_constants_size` is the device limit the description's
    /// push-constant size is checked against.
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        vertex_code: &[u8],
        fragment_code: &[u8],
        description: &PipelineDescription,
        max_push_constants_size: u32,
    ) -> VulkanResult<Self> {
        check_push_constant_range(description.push_constant_size, max_push_constants_size)?;

        let vertex_shader = ShaderModule::from_bytes(device, vertex_code)?;
        let fragment_shader = ShaderModule::from_bytes(device, fragment_code)?;
        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&description.bindings)
            .vertex_attribute_descriptions(&description.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(description.topology)
            .primitive_restart_enable(false);

        // Counts only; the actual rectangles are recorded per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: description.push_constant_size,
        }];
        let layout_info = if description.push_constant_size > 0 {
            vk::PipelineLayoutCreateInfo::builder().push_constant_ranges(&push_constant_ranges)
        } else {
            vk::PipelineLayoutCreateInfo::builder()
        };
        let layout = unsafe {
            device.create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info.build()],
                None,
            )
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };

        log::debug!(
            "Created pipeline: {:?}, {} attributes, {} push-constant bytes",
            description.topology, description.attributes.len(), description.push_constant_size
        );

        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
            push_constant_size: description.push_constant_size,
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Push-constant bytes declared at creation
    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    /// Check a payload against the declared push-constant size
    pub fn check_push_constant_payload(&self, payload: usize) -> VulkanResult<()> {
        check_push_constant_payload(payload, self.push_constant_size)
    }

    /// Release the pipeline and its layout
    ///
    /// The device must no longer be executing commands that use it.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[repr(C)]
    struct TestVertex {
        position: [f32; 3],
        uv: [f32; 2],
    }

    #[test]
    fn test_interleaved_description() {
        let description = PipelineDescription::interleaved::<TestVertex>(
            &[(vk::Format::R32G32B32_SFLOAT, 0), (vk::Format::R32G32_SFLOAT, 12)],
            vk::PrimitiveTopology::TRIANGLE_LIST,
            64,
        );

        assert_eq!(description.bindings.len(), 1);
        assert_eq!(description.bindings[0].stride, 20);
        assert_eq!(description.attributes.len(), 2);
        assert_eq!(description.attributes[1].location, 1);
        assert_eq!(description.attributes[1].offset, 12);
        assert_eq!(description.attributes[1].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(description.push_constant_size, 64);
    }

    #[test]
    fn test_push_constant_range_limit() {
        assert!(check_push_constant_range(128, 128).is_ok());
        assert!(matches!(
            check_push_constant_range(132, 128),
            Err(VulkanError::PushConstantTooLarge { requested: 132, limit: 128 })
        ));
    }

    #[test]
    fn test_payload_up_to_declared_size_accepted() {
        assert!(check_push_constant_payload(68, 68).is_ok());
        assert!(check_push_constant_payload(64, 68).is_ok());
        assert!(check_push_constant_payload(0, 0).is_ok());
    }

    #[test]
    fn test_payload_over_declared_size_rejected() {
        assert!(matches!(
            check_push_constant_payload(72, 68),
            Err(VulkanError::PushConstantOverflow { payload: 72, declared: 68 })
        ));
        assert!(check_push_constant_payload(1, 0).is_err());
    }
}
