//! # Render pass graph
//!
//! Passes are declared as [`SubpassGraph`]s, wrapped in [`PassInterface`]s that
//! track imports, exports and barriers, and ordered by the [`PassManager`]
//! according to their [`Domain`]. The [`FramebufferManager`] allocates the
//! attachment images behind them and command buffers record against them.
//!
//! The `vulkan` module holds the device-backed implementations of the
//! backend traits; everything else is API-level bookkeeping that can be
//! driven by test doubles.

pub mod commands;
pub mod domain;
pub mod framebuffer_manager;
pub mod graph;
pub mod material;
pub mod pass_interface;
pub mod pass_manager;
pub mod pass_set;
pub mod passes;
pub mod vulkan;

pub use commands::{CommandEncoder, ComputeCommandBuffer, DrawCommandBuffer, RecordInfo};
pub use domain::Domain;
pub use framebuffer_manager::{AttachmentImage, FramebufferBackend, FramebufferManager, FramebufferObject, ImageRequest};
pub use graph::{PassUsage, SubpassGraph, SubpassGraphSnapshot};
pub use material::{MaterialDescriptor, MaterialResolver};
pub use pass_interface::{ColorSlot, ExtentMode, PassInterface};
pub use pass_manager::PassManager;
pub use pass_set::PassSet;
pub use passes::BloomPassSet;
