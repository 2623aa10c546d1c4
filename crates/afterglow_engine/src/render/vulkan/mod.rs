//! Vulkan backend
//!
//! RAII wrappers over the native objects the render graph, framebuffer
//! manager and resource pools need. Every wrapper owns a cloned
//! `ash::Device` and destroys its handles on drop.

pub mod buffer;
pub mod commands;
pub mod framebuffer;
pub mod render_pass;
pub mod swapchain;
pub mod sync;

pub use buffer::{Buffer, DeviceUploader};
pub use commands::{CommandPool, DeviceEncoder};
pub use framebuffer::{DeviceFramebufferBackend, DeviceImage, Framebuffer};
pub use render_pass::RenderPass;
pub use swapchain::{SurfaceTarget, Swapchain};
pub use sync::{Fence, FenceFlag, FenceWaiter, FrameSync, Semaphore, SemaphoreFlag, Synchronizer};
