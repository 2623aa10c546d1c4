//! Asset descriptors shared by importers, the model cache and the resource pools

use ash::vk;
use bitflags::bitflags;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Model import options; the low bits also select the vertex layout
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImportFlags: u32 {
        /// Compute tangents from texture coordinates
        const GENERATE_TANGENT = 1 << 0;
        /// Drop the normal attribute
        const IGNORE_VERTEX_NORMAL = 1 << 1;
        /// Drop the tangent attribute
        const IGNORE_VERTEX_TANGENT = 1 << 2;
        /// Drop the color attribute
        const IGNORE_VERTEX_COLOR = 1 << 3;
        /// Drop the first texture coordinate set
        const IGNORE_VERTEX_TEX_COORDS = 1 << 4;
        /// Keep texture coordinates as authored instead of flipping V
        const FLIP_UVS = 1 << 5;
        /// Discard authored normals and recompute them from faces
        const RECOMPUTE_NORMAL = 1 << 6;

        /// Vertices without normal mapping or lighting inputs
        const IGNORE_LIGHTING = Self::IGNORE_VERTEX_NORMAL.bits() | Self::IGNORE_VERTEX_TANGENT.bits();
        /// Position-only vertices
        const POSITION_ONLY = Self::IGNORE_VERTEX_NORMAL.bits()
            | Self::IGNORE_VERTEX_TANGENT.bits()
            | Self::IGNORE_VERTEX_COLOR.bits()
            | Self::IGNORE_VERTEX_TEX_COORDS.bits();
    }
}

impl ImportFlags {
    /// Bits that select the vertex layout
    pub const VERTEX_BITS_MASK: Self = Self::POSITION_ONLY;

    /// Vertex attributes produced under these flags, in memory order
    pub fn vertex_attributes(self) -> Vec<VertexAttribute> {
        let mut attributes = vec![VertexAttribute::Position];
        if !self.contains(Self::IGNORE_VERTEX_NORMAL) {
            attributes.push(VertexAttribute::Normal);
        }
        if !self.contains(Self::IGNORE_VERTEX_TANGENT) {
            attributes.push(VertexAttribute::Tangent);
        }
        if !self.contains(Self::IGNORE_VERTEX_COLOR) {
            attributes.push(VertexAttribute::Color);
        }
        if !self.contains(Self::IGNORE_VERTEX_TEX_COORDS) {
            attributes.push(VertexAttribute::TexCoord0);
        }
        attributes
    }

    /// Byte size of one vertex under these flags
    pub fn vertex_stride(self) -> u32 {
        self.vertex_attributes().iter().map(|attribute| attribute.size()).sum()
    }
}

impl Default for ImportFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Per-vertex attribute, all stored as tightly packed `f32`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexAttribute {
    /// xyz
    Position,
    /// xyz
    Normal,
    /// xyz
    Tangent,
    /// rgba
    Color,
    /// uv
    TexCoord0,
}

impl VertexAttribute {
    /// Number of `f32` components
    pub const fn components(self) -> u32 {
        match self {
            Self::Position | Self::Normal | Self::Tangent => 3,
            Self::Color => 4,
            Self::TexCoord0 => 2,
        }
    }

    /// Byte size
    pub const fn size(self) -> u32 {
        self.components() * 4
    }

    /// Matching vertex input format
    pub const fn format(self) -> vk::Format {
        match self.components() {
            2 => vk::Format::R32G32_SFLOAT,
            3 => vk::Format::R32G32B32_SFLOAT,
            _ => vk::Format::R32G32B32A32_SFLOAT,
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: [f32; 3],
    /// Maximum corner
    pub max: [f32; 3],
}

impl Aabb {
    /// Box that contains nothing; combining with it yields the other box
    pub const EMPTY: Self = Self {
        min: [f32::INFINITY; 3],
        max: [f32::NEG_INFINITY; 3],
    };

    /// Smallest box containing both boxes
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            min: std::array::from_fn(|axis| self.min[axis].min(other.min[axis])),
            max: std::array::from_fn(|axis| self.max[axis].max(other.max[axis])),
        }
    }

    /// Grow the box to contain `point`
    pub fn extend(&mut self, point: [f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(point[axis]);
            self.max[axis] = self.max[axis].max(point[axis]);
        }
    }

    /// True when no point was ever added
    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    /// Center point
    pub fn center(&self) -> Point3<f32> {
        Point3::from((Vector3::from(self.min) + Vector3::from(self.max)) * 0.5)
    }

    /// Edge lengths
    pub fn size(&self) -> Vector3<f32> {
        Vector3::from(self.max) - Vector3::from(self.min)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self { min: [0.0; 3], max: [0.0; 3] }
    }
}

/// Key of a model in the mesh pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ModelAssetInfo {
    /// Import options
    pub import_flags: ImportFlags,
    /// Source file path
    pub path: String,
}

impl ModelAssetInfo {
    /// Describe a model import
    pub fn new(path: impl Into<String>, import_flags: ImportFlags) -> Self {
        Self { import_flags, path: path.into() }
    }
}

/// How texel values are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Unknown
    Undefined,
    /// Linear data such as normal or roughness maps
    Linear,
    /// Gamma encoded color
    #[default]
    Srgb,
}

/// Key of a texture in the texture pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextureAssetInfo {
    /// Color space of the texels
    pub color_space: ColorSpace,
    /// Source file path
    pub path: String,
}

impl TextureAssetInfo {
    /// Describe a texture import
    pub fn new(path: impl Into<String>, color_space: ColorSpace) -> Self {
        Self { color_space, path: path.into() }
    }
}

/// Number of channels per texel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    /// Unknown
    #[default]
    None = 0,
    /// One channel
    R = 1,
    /// Two channels
    Rg = 2,
    /// Three channels, padded to four before upload
    Rgb = 3,
    /// Four channels
    Rgba = 4,
}

impl Channel {
    /// Channel count
    pub const fn count(self) -> u32 {
        self as u32
    }
}

/// Component type of a texel channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// Unknown
    #[default]
    Undefined,
    /// 8-bit unsigned normalized
    UnsignedInt8,
    /// 16-bit unsigned normalized
    UnsignedInt16,
    /// 16-bit float
    Half,
    /// 32-bit float
    Float,
}

impl PixelFormat {
    /// Bytes per channel
    pub const fn byte_size(self) -> u32 {
        match self {
            Self::Undefined => 0,
            Self::UnsignedInt8 => 1,
            Self::UnsignedInt16 | Self::Half => 2,
            Self::Float => 4,
        }
    }
}

/// Decoded texture description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    /// Total byte size of the pixel data
    pub size: u64,
    /// Channel component type
    pub format: PixelFormat,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Depth in texels, 1 for 2D images
    pub depth: u32,
    /// Channels per texel
    pub channels: Channel,
    /// Color space of the texels
    pub color_space: ColorSpace,
}

impl TextureInfo {
    /// Vulkan format for the upload, or `UNDEFINED` for combinations the device path does not take
    pub fn vk_format(&self) -> vk::Format {
        let srgb = self.color_space == ColorSpace::Srgb;
        match (self.format, self.channels) {
            (PixelFormat::UnsignedInt8, Channel::R) if srgb => vk::Format::R8_SRGB,
            (PixelFormat::UnsignedInt8, Channel::R) => vk::Format::R8_UNORM,
            (PixelFormat::UnsignedInt8, Channel::Rg) if srgb => vk::Format::R8G8_SRGB,
            (PixelFormat::UnsignedInt8, Channel::Rg) => vk::Format::R8G8_UNORM,
            (PixelFormat::UnsignedInt8, Channel::Rgba) if srgb => vk::Format::R8G8B8A8_SRGB,
            (PixelFormat::UnsignedInt8, Channel::Rgba) => vk::Format::R8G8B8A8_UNORM,
            (PixelFormat::UnsignedInt16, Channel::R) => vk::Format::R16_UNORM,
            (PixelFormat::UnsignedInt16, Channel::Rg) => vk::Format::R16G16_UNORM,
            (PixelFormat::UnsignedInt16, Channel::Rgba) => vk::Format::R16G16B16A16_UNORM,
            (PixelFormat::Half, Channel::Rgba) => vk::Format::R16G16B16A16_SFLOAT,
            (PixelFormat::Float, Channel::R) => vk::Format::R32_SFLOAT,
            (PixelFormat::Float, Channel::Rg) => vk::Format::R32G32_SFLOAT,
            (PixelFormat::Float, Channel::Rgba) => vk::Format::R32G32B32A32_SFLOAT,
            _ => vk::Format::UNDEFINED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vertex_layout_follows_flags() {
        assert_eq!(ImportFlags::empty().vertex_stride(), (3 + 3 + 3 + 4 + 2) * 4);
        assert_eq!(ImportFlags::POSITION_ONLY.vertex_stride(), 12);
        assert_eq!(
            ImportFlags::IGNORE_LIGHTING.vertex_attributes(),
            vec![VertexAttribute::Position, VertexAttribute::Color, VertexAttribute::TexCoord0]
        );
        // non-layout bits do not change the stride
        let flags = ImportFlags::GENERATE_TANGENT | ImportFlags::FLIP_UVS | ImportFlags::IGNORE_VERTEX_COLOR;
        assert_eq!(flags.vertex_stride(), (3 + 3 + 3 + 2) * 4);
        assert_eq!(flags & ImportFlags::VERTEX_BITS_MASK, ImportFlags::IGNORE_VERTEX_COLOR);
    }

    #[test]
    fn test_aabb_combine_ignores_empty() {
        let mut a = Aabb::EMPTY;
        assert!(a.is_empty());
        a.extend([1.0, -2.0, 0.5]);
        a.extend([-1.0, 2.0, 0.5]);
        let combined = Aabb::EMPTY.combine(&a);

        assert_eq!(combined, a);
        assert_relative_eq!(a.center(), Point3::new(0.0, 0.0, 0.5));
        assert_relative_eq!(a.size(), Vector3::new(2.0, 4.0, 0.0));
    }

    #[test]
    fn test_texture_formats() {
        let mut info = TextureInfo {
            size: 16,
            format: PixelFormat::UnsignedInt8,
            width: 2,
            height: 2,
            depth: 1,
            channels: Channel::Rgba,
            color_space: ColorSpace::Srgb,
        };
        assert_eq!(info.vk_format(), vk::Format::R8G8B8A8_SRGB);
        info.color_space = ColorSpace::Linear;
        assert_eq!(info.vk_format(), vk::Format::R8G8B8A8_UNORM);
        info.channels = Channel::Rgb;
        assert_eq!(info.vk_format(), vk::Format::UNDEFINED);
    }
}
