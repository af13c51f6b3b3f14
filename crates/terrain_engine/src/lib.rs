//! # Terrain Engine
//!
//! The Vulkan core of a small terrain and particle demo.
//!
//! ## Features
//!
//! - **Device context**: instance, device, queue, command pool and frame slots
//! - **Surface session**: swapchain, render pass and framebuffers, rebuilt on demand
//! - **Frame cycling**: two frames in flight with swapchain image ownership tracking
//! - **Pipelines and buffers**: fixed-state pipelines, host-visible vertex and index data
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use terrain_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let window = Window::new("Vulkan demo", 800, 600)?;
//!     let context = DeviceContext::new(&window.required_instance_extensions()?, "demo", false)?;
//!     let surface = window.create_vulkan_surface(context.instance().handle())?;
//!
//!     let mut renderer = Renderer::new(context, DEFAULT_EXTENT);
//!     renderer.bind_surface(surface)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::missing_safety_doc
)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for applications
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, DemoConfig},
        foundation::math::{Mat4, Vec3},
        render::{
            camera::{view_projection, MeshPushConstants, ParticlePushConstants},
            mesh::{Model, UploadedModel, Vertex},
            particles::{make_particles, Particle, ParticleCloud},
            terrain::make_terrain_model,
            vulkan::{
                swapchain::DEFAULT_EXTENT, CommandRecorder, DeviceContext, FrameSlot,
                GraphicsPipeline, PresentOutcome, Renderer, VulkanError, VulkanResult,
                Window, WindowError, WindowEvent,
            },
        },
    };
}
