//! Model loading through the binary cache
//!
//! [`ModelAsset::load`] reads `<path>.cache` when it is present and current,
//! otherwise it runs a [`ModelImporter`] and refreshes the cache.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use super::definitions::{Aabb, ModelAssetInfo};
use super::model_cache::{cache_path, ModelCache};
use crate::error::EngineResult;

/// Index and vertex data of one mesh
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    /// Triangle list indices
    pub indices: Vec<u32>,
    /// Interleaved vertices laid out by the import flags
    pub vertices: Vec<u8>,
}

/// Everything an importer produces for one model file
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedModel {
    /// Meshes in file order
    pub meshes: Vec<MeshData>,
    /// Bounding box of all meshes combined
    pub aabb: Aabb,
}

/// Parses a model file into meshes
pub trait ModelImporter {
    /// Import the file named by `info`, honoring its import flags
    fn import(&self, info: &ModelAssetInfo) -> EngineResult<ImportedModel>;
}

/// Loaded model
#[derive(Debug, Clone)]
pub struct ModelAsset {
    info: ModelAssetInfo,
    meshes: Vec<MeshData>,
    aabb: Aabb,
}

impl ModelAsset {
    /// Load a model, going through the cache when `use_cache` is set
    pub fn load(info: &ModelAssetInfo, importer: &dyn ModelImporter, use_cache: bool) -> EngineResult<Self> {
        if !use_cache {
            return Self::import(info, importer);
        }

        let source_modified = fs::metadata(&info.path)?.modified()?;
        let cache_file = cache_path(&info.path);
        if cache_file.exists() {
            match Self::from_cache(info, &cache_file, source_modified) {
                Ok(Some(asset)) => return Ok(asset),
                Ok(None) => debug!("Model cache is outdated: {}", cache_file.display()),
                Err(e) => warn!("Ignoring unreadable model cache {}: {}", cache_file.display(), e),
            }
        }

        let asset = Self::import(info, importer)?;
        if let Err(e) = asset.write_cache(&cache_file, source_modified) {
            warn!("Failed to write model cache {}: {}", cache_file.display(), e);
        }
        Ok(asset)
    }

    fn import(info: &ModelAssetInfo, importer: &dyn ModelImporter) -> EngineResult<Self> {
        info!("Model asset load begin: {}", info.path);
        let imported = importer.import(info)?;
        debug!("Model asset imported: {} ({} meshes)", info.path, imported.meshes.len());
        Ok(Self { info: info.clone(), meshes: imported.meshes, aabb: imported.aabb })
    }

    fn from_cache(
        info: &ModelAssetInfo,
        cache_file: &Path,
        source_modified: std::time::SystemTime,
    ) -> EngineResult<Option<Self>> {
        let mut cache = ModelCache::open(cache_file)?;
        if cache.outdated(info, source_modified) {
            return Ok(None);
        }
        let meshes = (0..cache.num_meshes())
            .map(|index| cache.read(index).map(|(indices, vertices)| MeshData { indices, vertices }))
            .collect::<EngineResult<Vec<_>>>()?;
        debug!("Model asset loaded from cache: {}", info.path);
        Ok(Some(Self { info: info.clone(), meshes, aabb: cache.aabb() }))
    }

    fn write_cache(&self, cache_file: &Path, source_modified: std::time::SystemTime) -> EngineResult<()> {
        let mut cache = ModelCache::create(cache_file);
        for mesh in &self.meshes {
            cache.record_write(&mesh.indices, &mesh.vertices)?;
        }
        cache.write(&self.info, source_modified, &self.aabb)
    }

    /// Descriptor the model was loaded with
    pub fn info(&self) -> &ModelAssetInfo {
        &self.info
    }

    /// Number of meshes
    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    /// All meshes
    pub fn meshes(&self) -> &[MeshData] {
        &self.meshes
    }

    /// Indices of one mesh
    pub fn indices(&self, mesh_index: usize) -> Option<&[u32]> {
        self.meshes.get(mesh_index).map(|mesh| mesh.indices.as_slice())
    }

    /// Vertex bytes of one mesh
    pub fn vertex_data(&self, mesh_index: usize) -> Option<&[u8]> {
        self.meshes.get(mesh_index).map(|mesh| mesh.vertices.as_slice())
    }

    /// Bounding box of the whole model
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::definitions::ImportFlags;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct CountingImporter {
        calls: Cell<usize>,
    }

    impl ModelImporter for CountingImporter {
        fn import(&self, info: &ModelAssetInfo) -> EngineResult<ImportedModel> {
            self.calls.set(self.calls.get() + 1);
            let stride = info.import_flags.vertex_stride() as usize;
            Ok(ImportedModel {
                meshes: vec![MeshData { indices: vec![0, 1, 2], vertices: vec![7; stride * 3] }],
                aabb: Aabb { min: [0.0; 3], max: [1.0; 3] },
            })
        }
    }

    fn importer() -> CountingImporter {
        CountingImporter { calls: Cell::new(0) }
    }

    #[test]
    fn test_second_load_reads_cache() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("triangle.obj");
        std::fs::write(&model, "o triangle\n").unwrap();
        let info = ModelAssetInfo::new(model.to_string_lossy(), ImportFlags::POSITION_ONLY);
        let importer = importer();

        let first = ModelAsset::load(&info, &importer, true).unwrap();
        assert!(cache_path(&info.path).exists());
        let second = ModelAsset::load(&info, &importer, true).unwrap();

        assert_eq!(importer.calls.get(), 1);
        assert_eq!(second.meshes(), first.meshes());
        assert_eq!(second.aabb(), first.aabb());
        assert_eq!(second.vertex_data(0).map(<[u8]>::len), Some(36));
    }

    #[test]
    fn test_changed_flags_reimport() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("quad.obj");
        std::fs::write(&model, "o quad\n").unwrap();
        let importer = importer();

        let path = model.to_string_lossy().into_owned();
        ModelAsset::load(&ModelAssetInfo::new(path.clone(), ImportFlags::empty()), &importer, true).unwrap();
        ModelAsset::load(&ModelAssetInfo::new(path, ImportFlags::FLIP_UVS), &importer, true).unwrap();

        assert_eq!(importer.calls.get(), 2);
    }

    #[test]
    fn test_corrupt_cache_falls_back_to_import() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("cube.obj");
        std::fs::write(&model, "o cube\n").unwrap();
        let info = ModelAssetInfo::new(model.to_string_lossy(), ImportFlags::empty());
        std::fs::write(cache_path(&info.path), b"not a cache").unwrap();
        let importer = importer();

        let asset = ModelAsset::load(&info, &importer, true).unwrap();
        assert_eq!(importer.calls.get(), 1);
        assert_eq!(asset.num_meshes(), 1);
        assert!(ModelCache::open(cache_path(&info.path)).is_ok());
    }

    #[test]
    fn test_cache_disabled_never_writes() {
        let dir = TempDir::new().unwrap();
        let info = ModelAssetInfo::new(dir.path().join("none.obj").to_string_lossy(), ImportFlags::empty());
        let importer = importer();

        ModelAsset::load(&info, &importer, false).unwrap();
        assert!(!cache_path(&info.path).exists());
    }
}
