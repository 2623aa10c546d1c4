//! Asset descriptors, importers and the model cache

pub mod definitions;
pub mod image_loader;
pub mod model_asset;
pub mod model_cache;
pub mod obj_importer;

pub use definitions::{
    Aabb, Channel, ColorSpace, ImportFlags, ModelAssetInfo, PixelFormat, TextureAssetInfo, TextureInfo,
    VertexAttribute,
};
pub use image_loader::{FileImageLoader, ImageAsset, ImageLoader};
pub use model_asset::{ImportedModel, MeshData, ModelAsset, ModelImporter};
pub use model_cache::{cache_path, ModelCache};
pub use obj_importer::ObjImporter;
