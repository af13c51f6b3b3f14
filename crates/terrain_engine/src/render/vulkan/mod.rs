//! Vulkan rendering backend
//!
//! Ownership runs one way: the [`DeviceContext`] outlives everything, a
//! [`SurfaceSession`] lives between bind and unbind, and pipelines and buffers
//! are released before the session or context they were built from.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod frame;
pub mod framebuffer;
pub mod pipeline;
pub mod render_pass;
pub mod renderer;
pub mod session;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod window;

pub use buffer::GpuBuffer;
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use context::{DeviceContext, PhysicalDeviceInfo, VulkanError, VulkanResult};
pub use frame::{AcquiredFrame, FrameCycler, FrameOps, SwapchainState, MAX_FRAMES_IN_FLIGHT};
pub use framebuffer::{DepthBuffer, FramebufferSet};
pub use pipeline::{GraphicsPipeline, PipelineDescription};
pub use render_pass::RenderPass;
pub use renderer::{PresentOutcome, Renderer};
pub use session::SurfaceSession;
pub use surface::Surface;
pub use swapchain::{Swapchain, SwapchainPlan};
pub use sync::FrameSlot;
pub use window::{Window, WindowError, WindowEvent, WindowResult};
