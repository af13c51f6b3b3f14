//! # Rendering
//!
//! - **Vulkan backend**: device context, surface session, pipelines, frame cycling
//! - **Mesh**: vertex format, CPU models and their upload
//! - **Terrain**: procedural height-map mesh
//! - **Particles**: launch-state point cloud
//! - **Camera**: orbit view and push-constant payloads

pub mod camera;
pub mod mesh;
pub mod particles;
pub mod terrain;
pub mod vulkan;

pub use camera::{MeshPushConstants, ParticlePushConstants};
pub use mesh::{Model, UploadedModel, Vertex};
pub use particles::{Particle, ParticleCloud};
