//! Shared pool of textures
//!
//! A request for a file that does not exist is redirected to the configured
//! default texture, so every missing texture shares one pool entry.

use std::path::Path;
use std::rc::Rc;

use log::error;

use super::shared_pool::{ResourceReference, SharedResourcePool};
use super::upload::TextureUploader;
use crate::assets::{ImageLoader, TextureAssetInfo, TextureInfo};
use crate::config::RenderConfig;
use crate::error::EngineResult;
use crate::render::vulkan::sync::FenceWaiter;

/// Pooled texture
#[derive(Debug)]
pub struct TextureResource<T> {
    /// Layout of the uploaded texels
    pub info: TextureInfo,
    /// Uploaded image
    pub texture: T,
}

/// Counted reference to a pooled texture
pub type TextureReference<T> = ResourceReference<TextureAssetInfo, TextureResource<T>>;

/// Pool of textures keyed by path and color space
pub struct TexturePool<U: TextureUploader> {
    pool: SharedResourcePool<TextureAssetInfo, TextureResource<U::Texture>>,
    uploader: Rc<U>,
    loader: Box<dyn ImageLoader>,
    default_texture_path: String,
}

impl<U: TextureUploader> TexturePool<U> {
    /// Create an empty pool
    pub fn new(uploader: Rc<U>, loader: Box<dyn ImageLoader>, config: &RenderConfig) -> Self {
        Self {
            pool: SharedResourcePool::new(),
            uploader,
            loader,
            default_texture_path: config.default_texture_path.clone(),
        }
    }

    /// Reference to the texture for `info`, loading and uploading it on first use
    ///
    /// The returned reference is keyed by the default texture path when the
    /// requested file is missing.
    pub fn texture(&mut self, info: &TextureAssetInfo) -> EngineResult<TextureReference<U::Texture>> {
        let mut key = info.clone();
        if !Path::new(&key.path).exists() {
            error!(
                "Texture file does not exist: \"{}\", replaced by the default texture",
                key.path
            );
            key.path.clone_from(&self.default_texture_path);
        }

        let uploader = Rc::clone(&self.uploader);
        let loader = self.loader.as_ref();
        self.pool.acquire(key, |key| {
            let image = loader.load(key)?;
            let texture = uploader.upload_texture(&image.info, &image.data)?;
            Ok(TextureResource { info: image.info, texture })
        })
    }

    /// Evict textures nobody references any more, see [`SharedResourcePool::update`]
    pub fn update(&mut self, fences: &dyn FenceWaiter) -> EngineResult<usize> {
        self.pool.update(fences)
    }

    /// Number of pooled textures
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Whether no texture is pooled
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{ColorSpace, FileImageLoader};
    use crate::resources::mesh_pool::test_support::RecordingUploader;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        uploader: Rc<RecordingUploader>,
        pool: TexturePool<RecordingUploader>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let default_path = dir.path().join("White.png");
        RgbaImage::from_pixel(1, 1, Rgba([255; 4])).save(&default_path).unwrap();
        RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255])).save(dir.path().join("blue.png")).unwrap();

        let config = RenderConfig::default().with_default_texture_path(default_path.to_string_lossy());
        let uploader = Rc::new(RecordingUploader::default());
        let pool = TexturePool::new(Rc::clone(&uploader), Box::new(FileImageLoader), &config);
        Fixture { dir, uploader, pool }
    }

    fn path_in(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn test_texture_keyed_by_color_space() {
        let mut f = fixture();
        let blue = path_in(&f.dir, "blue.png");
        let srgb = f.pool.texture(&TextureAssetInfo::new(blue.clone(), ColorSpace::Srgb)).unwrap();
        let again = f.pool.texture(&TextureAssetInfo::new(blue.clone(), ColorSpace::Srgb)).unwrap();
        let linear = f.pool.texture(&TextureAssetInfo::new(blue, ColorSpace::Linear)).unwrap();

        assert_eq!(srgb.id(), again.id());
        assert_ne!(srgb.id(), linear.id());
        assert_eq!(f.uploader.textures.borrow().len(), 2);
        assert_eq!(srgb.resource().info.width, 2);
        assert_eq!(linear.resource().info.color_space, ColorSpace::Linear);
        assert_eq!(&srgb.resource().texture[0..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_missing_files_share_the_default_texture() {
        let mut f = fixture();
        let a = f.pool.texture(&TextureAssetInfo::new(path_in(&f.dir, "a.png"), ColorSpace::Srgb)).unwrap();
        let b = f.pool.texture(&TextureAssetInfo::new(path_in(&f.dir, "b.png"), ColorSpace::Srgb)).unwrap();

        assert_eq!(a.id(), b.id());
        assert_eq!(a.key().path, path_in(&f.dir, "White.png"));
        assert_eq!(f.pool.len(), 1);
        assert_eq!(f.uploader.textures.borrow().len(), 1);
        assert_eq!(a.resource().info.width, 1);
    }

    #[test]
    fn test_missing_default_texture_is_an_error() {
        let uploader = Rc::new(RecordingUploader::default());
        let config = RenderConfig::default().with_default_texture_path("nowhere/White.png");
        let mut pool = TexturePool::new(uploader, Box::new(FileImageLoader), &config);

        assert!(pool.texture(&TextureAssetInfo::new("nowhere/else.png", ColorSpace::Srgb)).is_err());
        assert!(pool.is_empty());
    }
}
