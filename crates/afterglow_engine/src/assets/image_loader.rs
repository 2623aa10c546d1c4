//! Image decoding for texture upload
//!
//! Decoded data keeps its channel count and component type, except that RGB
//! images are padded to RGBA since three-channel formats are rarely sampleable.

use std::path::Path;

use image::DynamicImage;
use log::{debug, info};

use super::definitions::{Channel, ColorSpace, PixelFormat, TextureAssetInfo, TextureInfo};
use crate::error::{EngineError, EngineResult};

/// Decoded image ready for GPU upload
#[derive(Debug, Clone)]
pub struct ImageAsset {
    /// Dimensions and texel layout
    pub info: TextureInfo,
    /// Tightly packed texel bytes
    pub data: Vec<u8>,
}

impl ImageAsset {
    /// Decode an image file
    pub fn from_file(path: impl AsRef<Path>, color_space: ColorSpace) -> EngineResult<Self> {
        let path = path.as_ref();
        debug!("Loading image from: {}", path.display());
        let image = image::open(path)
            .map_err(|e| EngineError::Asset(format!("Failed to load image file {}: {e}", path.display())))?;
        let asset = Self::from_dynamic(image, color_space);
        info!("Loaded image {}x{} from {}", asset.info.width, asset.info.height, path.display());
        Ok(asset)
    }

    /// Decode an in-memory encoded image
    pub fn from_bytes(bytes: &[u8], color_space: ColorSpace) -> EngineResult<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| EngineError::Asset(format!("Failed to load image from bytes: {e}")))?;
        Ok(Self::from_dynamic(image, color_space))
    }

    /// Single-color RGBA8 image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4], color_space: ColorSpace) -> Self {
        let data = color.repeat((width * height) as usize);
        Self {
            info: texture_info(width, height, Channel::Rgba, PixelFormat::UnsignedInt8, color_space),
            data,
        }
    }

    fn from_dynamic(image: DynamicImage, color_space: ColorSpace) -> Self {
        let (width, height) = (image.width(), image.height());
        let (channels, format, data) = match image {
            DynamicImage::ImageLuma8(buffer) => (Channel::R, PixelFormat::UnsignedInt8, buffer.into_raw()),
            DynamicImage::ImageLumaA8(buffer) => (Channel::Rg, PixelFormat::UnsignedInt8, buffer.into_raw()),
            DynamicImage::ImageRgba8(buffer) => (Channel::Rgba, PixelFormat::UnsignedInt8, buffer.into_raw()),
            DynamicImage::ImageLuma16(buffer) => (Channel::R, PixelFormat::UnsignedInt16, bytes_of(buffer.as_raw())),
            DynamicImage::ImageLumaA16(buffer) => {
                (Channel::Rg, PixelFormat::UnsignedInt16, bytes_of(buffer.as_raw()))
            }
            image @ (DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_)) => {
                (Channel::Rgba, PixelFormat::UnsignedInt16, bytes_of(image.to_rgba16().as_raw()))
            }
            image @ (DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)) => {
                (Channel::Rgba, PixelFormat::Float, bytes_of(image.to_rgba32f().as_raw()))
            }
            // RGB8 and anything newer the decoder learns about
            image => (Channel::Rgba, PixelFormat::UnsignedInt8, image.to_rgba8().into_raw()),
        };
        Self {
            info: texture_info(width, height, channels, format, color_space),
            data,
        }
    }
}

fn bytes_of<T: bytemuck::Pod>(values: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

fn texture_info(width: u32, height: u32, channels: Channel, format: PixelFormat, color_space: ColorSpace) -> TextureInfo {
    TextureInfo {
        size: u64::from(width) * u64::from(height) * u64::from(channels.count()) * u64::from(format.byte_size()),
        format,
        width,
        height,
        depth: 1,
        channels,
        color_space,
    }
}

/// Loads the pixels behind a texture key
pub trait ImageLoader {
    /// Decode the image named by `info`
    fn load(&self, info: &TextureAssetInfo) -> EngineResult<ImageAsset>;
}

/// [`ImageLoader`] reading files through the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageLoader;

impl ImageLoader for FileImageLoader {
    fn load(&self, info: &TextureAssetInfo) -> EngineResult<ImageAsset> {
        ImageAsset::from_file(&info.path, info.color_space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_solid_color_image() {
        let image = ImageAsset::solid_color(4, 4, [255, 0, 0, 255], ColorSpace::Srgb);
        assert_eq!(image.info.size, 64);
        assert_eq!(image.data.len(), 64);
        assert_eq!(&image.data[0..4], &[255, 0, 0, 255]);
        assert_eq!(image.info.vk_format(), vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn test_rgb_is_padded_to_rgba() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rgb.png");
        RgbImage::from_pixel(3, 2, Rgb([10, 20, 30])).save(&path).unwrap();

        let image = FileImageLoader
            .load(&TextureAssetInfo::new(path.to_string_lossy(), ColorSpace::Linear))
            .unwrap();
        assert_eq!(image.info.channels, Channel::Rgba);
        assert_eq!(image.info.size, 3 * 2 * 4);
        assert_eq!(image.data.len() as u64, image.info.size);
        assert_eq!(&image.data[0..4], &[10, 20, 30, 255]);
        assert_eq!(image.info.color_space, ColorSpace::Linear);
    }

    #[test]
    fn test_gray_keeps_single_channel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gray.png");
        GrayImage::from_pixel(5, 1, Luma([7])).save(&path).unwrap();

        let image = ImageAsset::from_file(&path, ColorSpace::Linear).unwrap();
        assert_eq!(image.info.channels, Channel::R);
        assert_eq!(image.data, vec![7; 5]);
        assert_eq!(image.info.vk_format(), vk::Format::R8_UNORM);
    }

    #[test]
    fn test_missing_file_is_an_asset_error() {
        let result = ImageAsset::from_file("does/not/exist.png", ColorSpace::Srgb);
        assert!(matches!(result, Err(EngineError::Asset(_))));
    }
}
