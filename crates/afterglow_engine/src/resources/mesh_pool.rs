//! Shared pool of model meshes
//!
//! Each entry holds one index and one vertex buffer per mesh of the model
//! plus the whole-model bounding box.

use std::rc::Rc;

use ash::vk;

use super::shared_pool::{ResourceReference, SharedResourcePool};
use super::upload::BufferUploader;
use crate::assets::{Aabb, ModelAsset, ModelAssetInfo, ModelImporter};
use crate::config::RenderConfig;
use crate::error::EngineResult;
use crate::render::vulkan::sync::FenceWaiter;

/// GPU buffers of one mesh
#[derive(Debug)]
pub struct MeshBuffers<B> {
    /// `u32` index buffer
    pub index_buffer: B,
    /// Interleaved vertex buffer
    pub vertex_buffer: B,
    /// Number of indices
    pub index_count: u32,
    /// Byte size of one vertex
    pub vertex_stride: u32,
}

/// Pooled model
#[derive(Debug)]
pub struct MeshResource<B> {
    /// Buffers of every mesh, in file order
    pub meshes: Vec<MeshBuffers<B>>,
    /// Bounding box of the whole model
    pub aabb: Aabb,
}

/// Counted reference to a pooled model
pub type MeshReference<B> = ResourceReference<ModelAssetInfo, MeshResource<B>>;

/// Pool of models keyed by path and import flags
pub struct MeshPool<U: BufferUploader> {
    pool: SharedResourcePool<ModelAssetInfo, MeshResource<U::Buffer>>,
    uploader: Rc<U>,
    importer: Box<dyn ModelImporter>,
    cache_enabled: bool,
}

impl<U: BufferUploader> MeshPool<U> {
    /// Create an empty pool
    pub fn new(uploader: Rc<U>, importer: Box<dyn ModelImporter>, config: &RenderConfig) -> Self {
        Self {
            pool: SharedResourcePool::new(),
            uploader,
            importer,
            cache_enabled: config.model_cache_enabled,
        }
    }

    /// Reference to the model for `info`, loading and uploading it on first use
    pub fn mesh(&mut self, info: &ModelAssetInfo) -> EngineResult<MeshReference<U::Buffer>> {
        let uploader = Rc::clone(&self.uploader);
        let importer = self.importer.as_ref();
        let cache_enabled = self.cache_enabled;
        self.pool.acquire(info.clone(), |info| {
            let asset = ModelAsset::load(info, importer, cache_enabled)?;
            let vertex_stride = info.import_flags.vertex_stride();
            let meshes = asset
                .meshes()
                .iter()
                .map(|mesh| {
                    Ok(MeshBuffers {
                        index_buffer: uploader
                            .upload_buffer(bytemuck::cast_slice(&mesh.indices), vk::BufferUsageFlags::INDEX_BUFFER)?,
                        vertex_buffer: uploader.upload_buffer(&mesh.vertices, vk::BufferUsageFlags::VERTEX_BUFFER)?,
                        index_count: u32::try_from(mesh.indices.len()).unwrap_or(u32::MAX),
                        vertex_stride,
                    })
                })
                .collect::<EngineResult<Vec<_>>>()?;
            Ok(MeshResource { meshes, aabb: asset.aabb() })
        })
    }

    /// Evict models nobody references any more, see [`SharedResourcePool::update`]
    pub fn update(&mut self, fences: &dyn FenceWaiter) -> EngineResult<usize> {
        self.pool.update(fences)
    }

    /// Number of pooled models
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Whether no model is pooled
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;

    use ash::vk;

    use crate::assets::TextureInfo;
    use crate::error::EngineResult;
    use crate::resources::upload::{BufferUploader, TextureUploader};

    /// Uploader keeping copies of everything it was given
    #[derive(Default)]
    pub struct RecordingUploader {
        pub buffers: RefCell<Vec<(vk::BufferUsageFlags, usize)>>,
        pub textures: RefCell<Vec<TextureInfo>>,
    }

    impl BufferUploader for RecordingUploader {
        type Buffer = Vec<u8>;

        fn upload_buffer(&self, bytes: &[u8], usage: vk::BufferUsageFlags) -> EngineResult<Vec<u8>> {
            self.buffers.borrow_mut().push((usage, bytes.len()));
            Ok(bytes.to_vec())
        }
    }

    impl TextureUploader for RecordingUploader {
        type Texture = Vec<u8>;

        fn upload_texture(&self, info: &TextureInfo, pixels: &[u8]) -> EngineResult<Vec<u8>> {
            self.textures.borrow_mut().push(*info);
            Ok(pixels.to_vec())
        }
    }
}
