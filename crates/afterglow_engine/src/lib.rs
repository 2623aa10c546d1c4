//! # Afterglow Engine
//!
//! Render pass graph, framebuffer management and shared GPU resource pools on
//! Vulkan.
//!
//! ## Features
//!
//! - **Subpass graphs**: declarative attachments, subpasses and dependencies
//! - **Pass chain**: fixed passes ordered by domain plus pluggable pass sets (bloom)
//! - **Framebuffers**: attachment images shared across passes through imports
//! - **Command recording**: state-tracked draw and compute command buffers
//! - **Resource pools**: reference-counted meshes and textures with fence-synchronized eviction
//! - **Model cache**: binary cache of imported model data
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use afterglow_engine::prelude::*;
//! use ash::vk;
//!
//! fn build_passes() -> EngineResult<PassManager> {
//!     let config = RenderConfig::load_validated("render.toml")?;
//!     let mut passes = PassManager::from_config(
//!         &config,
//!         vk::Format::D32_SFLOAT_S8_UINT,
//!         vk::Format::B8G8R8A8_SRGB,
//!     )?;
//!     passes.finalize();
//!     Ok(passes)
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod error;
pub mod foundation;
pub mod render;
pub mod resources;

pub use error::{EngineError, EngineResult, ErrorKind};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{ColorSpace, ImportFlags, ModelAssetInfo, ObjImporter, TextureAssetInfo},
        config::{Config, PassSetup, RenderConfig},
        error::{EngineError, EngineResult, ErrorKind},
        foundation::logging,
        render::{
            DrawCommandBuffer, Domain, FramebufferManager, PassInterface, PassManager, PassSet, SubpassGraph,
        },
        resources::{MeshPool, SharedResourcePool, TexturePool},
    };
}
