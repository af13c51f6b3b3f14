//! Particle point cloud
//!
//! Particles carry only their launch state; the vertex shader integrates
//! position from launch position, velocity and elapsed time.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use crate::render::vulkan::{DeviceContext, GpuBuffer, PipelineDescription, VulkanResult};

/// Launch state of one particle
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// Position at t = 0
    pub pos0: [f32; 3],
    /// Velocity at t = 0
    pub v0: [f32; 3],
}

const _: () = assert!(std::mem::size_of::<Particle>() == 24);

impl Particle {
    /// Shader inputs at locations 0 and 1 of binding 0: `(format, offset)`
    pub const ATTRIBUTES: [(vk::Format, u32); 2] = [
        (vk::Format::R32G32B32_SFLOAT, 0),
        (vk::Format::R32G32B32_SFLOAT, 12),
    ];

    /// Pipeline description for point lists of particles
    pub fn pipeline_description(push_constant_size: u32) -> PipelineDescription {
        PipelineDescription::interleaved::<Self>(
            &Self::ATTRIBUTES,
            vk::PrimitiveTopology::POINT_LIST,
            push_constant_size,
        )
    }
}

/// The demo's fixed fountain of particles
pub fn make_particles() -> Vec<Particle> {
    vec![
        Particle { pos0: [0.0, 0.0, 0.0], v0: [0.0, 3.0, 0.1] },
        Particle { pos0: [0.0, 0.0, 0.0], v0: [0.1, 2.3, -0.1] },
        Particle { pos0: [0.0, 0.5, 0.0], v0: [-0.2, 2.4, -0.3] },
        Particle { pos0: [0.0, 0.0, 0.0], v0: [-0.02, 2.7, 0.22] },
    ]
}

/// Particles uploaded as a vertex buffer
pub struct ParticleCloud {
    buffer: GpuBuffer,
    count: u32,
}

impl ParticleCloud {
    /// Upload `particles` into a vertex buffer
    pub fn upload(context: &DeviceContext, particles: &[Particle]) -> VulkanResult<Self> {
        let buffer = GpuBuffer::with_data(
            context,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(particles),
        )?;
        Ok(Self {
            buffer,
            count: particles.len() as u32,
        })
    }

    /// Vertex buffer
    pub fn buffer(&self) -> &GpuBuffer {
        &self.buffer
    }

    /// Number of points to draw
    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fountain_particles() {
        let particles = make_particles();
        assert_eq!(particles.len(), 4);
        assert_eq!(particles[2].pos0, [0.0, 0.5, 0.0]);
        // Everything is launched upwards
        assert!(particles.iter().all(|p| p.v0[1] > 2.0));
    }

    #[test]
    fn test_particle_pipeline_description() {
        let description = Particle::pipeline_description(68);
        assert_eq!(description.bindings[0].stride, 24);
        assert_eq!(description.topology, vk::PrimitiveTopology::POINT_LIST);
        assert_eq!(description.attributes.len(), 2);
        assert_eq!(description.attributes[1].offset, 12);
        assert_eq!(description.push_constant_size, 68);
    }
}
