//! Shared GPU resource pools
//!
//! Meshes and textures are cached by the asset descriptor they were loaded
//! from and evicted only after the frames that might still use them have
//! finished on the GPU.

pub mod mesh_pool;
pub mod shared_pool;
pub mod texture_pool;
pub mod upload;

pub use mesh_pool::{MeshBuffers, MeshPool, MeshReference, MeshResource};
pub use shared_pool::{ResourceReference, SharedResourcePool};
pub use texture_pool::{TexturePool, TextureReference, TextureResource};
pub use upload::{BufferUploader, TextureUploader};
