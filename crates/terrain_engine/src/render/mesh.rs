//! Mesh data and its GPU upload
//!
//! A [`Model`] is plain CPU-side geometry. [`UploadedModel`] is the same data
//! copied once into a vertex buffer and a `u32` index buffer.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use crate::render::vulkan::{DeviceContext, GpuBuffer, PipelineDescription, VulkanResult};

/// Vertex with position, normal and texture coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Unit normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<Vertex>() == 32);

impl Vertex {
    /// Shader inputs at locations 0, 1 and 2 of binding 0: `(format, offset)`
    pub const ATTRIBUTES: [(vk::Format, u32); 3] = [
        (vk::Format::R32G32B32_SFLOAT, 0),
        (vk::Format::R32G32B32_SFLOAT, 12),
        (vk::Format::R32G32_SFLOAT, 24),
    ];

    /// Pipeline description for indexed triangle lists of this vertex type
    pub fn pipeline_description(push_constant_size: u32) -> PipelineDescription {
        PipelineDescription::interleaved::<Self>(
            &Self::ATTRIBUTES,
            vk::PrimitiveTopology::TRIANGLE_LIST,
            push_constant_size,
        )
    }
}

/// Triangle-list geometry
#[derive(Debug, Clone, Default)]
pub struct Model {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Three indices per triangle
    pub indices: Vec<u32>,
}

/// A model's vertex and index buffers in device memory
pub struct UploadedModel {
    vertices: GpuBuffer,
    indices: GpuBuffer,
    index_count: u32,
}

impl UploadedModel {
    /// Copy `model` into a vertex buffer and an index buffer
    pub fn from_model(context: &DeviceContext, model: &Model) -> VulkanResult<Self> {
        let vertices = GpuBuffer::with_data(
            context,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&model.vertices),
        )?;
        let indices = GpuBuffer::with_data(
            context,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&model.indices),
        )?;

        Ok(Self {
            vertices,
            indices,
            index_count: model.indices.len() as u32,
        })
    }

    /// Vertex buffer
    pub fn vertices(&self) -> &GpuBuffer {
        &self.vertices
    }

    /// Index buffer of `u32` indices
    pub fn indices(&self) -> &GpuBuffer {
        &self.indices
    }

    /// Number of indices to draw
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_bytes_are_tightly_packed() {
        let vertex = Vertex {
            position: [1.0, 2.0, 3.0],
            normal: [0.0, -1.0, 0.0],
            tex_coord: [0.25, 0.75],
        };
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&vertex));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.0, -1.0, 0.0, 0.25, 0.75]);
    }

    #[test]
    fn test_vertex_pipeline_description() {
        let description = Vertex::pipeline_description(64);
        assert_eq!(description.bindings[0].stride, 32);
        assert_eq!(description.topology, vk::PrimitiveTopology::TRIANGLE_LIST);

        let layout: Vec<(u32, u32)> = description
            .attributes
            .iter()
            .map(|attribute| (attribute.location, attribute.offset))
            .collect();
        assert_eq!(layout, vec![(0, 0), (1, 12), (2, 24)]);
        assert_eq!(description.attributes[2].format, vk::Format::R32G32_SFLOAT);
    }
}
