//! GPU upload seams used by the resource pools

use ash::vk;

use crate::assets::TextureInfo;
use crate::error::EngineResult;

/// Creates device buffers from CPU bytes
pub trait BufferUploader {
    /// Buffer type produced
    type Buffer;

    /// Upload `bytes` into a new buffer usable as `usage`, blocking until the copy is done
    fn upload_buffer(&self, bytes: &[u8], usage: vk::BufferUsageFlags) -> EngineResult<Self::Buffer>;
}

/// Creates sampled images from decoded pixels
pub trait TextureUploader {
    /// Texture type produced
    type Texture;

    /// Upload `pixels` described by `info`, blocking until the image is ready for sampling
    fn upload_texture(&self, info: &TextureInfo, pixels: &[u8]) -> EngineResult<Self::Texture>;
}
