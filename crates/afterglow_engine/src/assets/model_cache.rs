//! Binary cache of imported model data
//!
//! Importing large models is slow, so the index and vertex bytes of every mesh
//! are written next to the source file as `<model>.cache`. Layout, in native
//! (little-endian) byte order:
//!
//! | bytes | content |
//! |-------|---------|
//! | 56    | [`CacheHeader`] |
//! | 32 × n | one [`TableEntry`] per mesh |
//! | ...   | per mesh: `u32` indices, then vertex bytes |
//!
//! A cache is stale when its version, import flags or recorded source
//! modification time differ from the current ones.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use super::definitions::{Aabb, ImportFlags, ModelAssetInfo};
use crate::error::{EngineError, EngineResult};

/// File name suffix appended to the model path
pub const CACHE_SUFFIX: &str = ".cache";
/// Magic bytes at the start of every cache file
pub const CACHE_MAGIC: [u8; 4] = *b"amc\0";
/// Format version written by this build
pub const CACHE_VERSION: u16 = 2;

/// Fixed-size file header
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheHeader {
    /// Always [`CACHE_MAGIC`]
    pub magic: [u8; 4],
    /// Format version
    pub version: u16,
    reserved: u16,
    /// Raw [`ImportFlags`] bits the data was imported with
    pub import_flags: u32,
    /// Byte size of the mesh table
    pub table_byte_size: u32,
    /// Source modification time, seconds since the Unix epoch
    pub modified_secs: u64,
    /// Sub-second part of the modification time
    pub modified_nanos: u32,
    reserved_time: u32,
    /// Minimum corner of the whole-model bounding box
    pub aabb_min: [f32; 3],
    /// Maximum corner of the whole-model bounding box
    pub aabb_max: [f32; 3],
}

// SAFETY: repr(C), every field is plain data and the field order leaves no padding
unsafe impl bytemuck::Pod for CacheHeader {}
unsafe impl bytemuck::Zeroable for CacheHeader {}

/// Byte ranges of one mesh inside the file
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableEntry {
    /// Offset of the index bytes
    pub index_offset: u64,
    /// Length of the index bytes
    pub index_size: u64,
    /// Offset of the vertex bytes
    pub vertex_offset: u64,
    /// Length of the vertex bytes
    pub vertex_size: u64,
}

unsafe impl bytemuck::Pod for TableEntry {}
unsafe impl bytemuck::Zeroable for TableEntry {}

/// Split a timestamp into the header's seconds and nanoseconds
pub fn timestamp_parts(time: SystemTime) -> (u64, u32) {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    (since_epoch.as_secs(), since_epoch.subsec_nanos())
}

/// Cache path for a model source path
pub fn cache_path(model_path: impl AsRef<Path>) -> PathBuf {
    let mut path = model_path.as_ref().as_os_str().to_owned();
    path.push(CACHE_SUFFIX);
    PathBuf::from(path)
}

enum Mode {
    Read(BufReader<File>),
    Write(Vec<(Vec<u32>, Vec<u8>)>),
}

/// Reader or writer of one cache file
pub struct ModelCache {
    path: PathBuf,
    header: CacheHeader,
    table: Vec<TableEntry>,
    mode: Mode,
}

impl ModelCache {
    /// Open an existing cache and read its header and mesh table
    pub fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let mut reader = BufReader::new(File::open(&path)?);

        let mut header_bytes = [0u8; size_of::<CacheHeader>()];
        reader.read_exact(&mut header_bytes)?;
        let header: CacheHeader = bytemuck::pod_read_unaligned(&header_bytes);
        if header.magic != CACHE_MAGIC {
            return Err(cache_error(&path, "invalid file head"));
        }
        if header.table_byte_size as usize % size_of::<TableEntry>() != 0 {
            return Err(cache_error(&path, "mesh table size is not a whole number of entries"));
        }

        let mut table_bytes = vec![0u8; header.table_byte_size as usize];
        reader.read_exact(&mut table_bytes)?;
        let table = table_bytes
            .chunks_exact(size_of::<TableEntry>())
            .map(bytemuck::pod_read_unaligned)
            .collect();

        Ok(Self { path, header, table, mode: Mode::Read(reader) })
    }

    /// Start a new cache; nothing touches the disk until [`write`](Self::write)
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header: bytemuck::Zeroable::zeroed(),
            table: Vec::new(),
            mode: Mode::Write(Vec::new()),
        }
    }

    /// File header as read or last written
    pub fn header(&self) -> &CacheHeader {
        &self.header
    }

    /// Whole-model bounding box
    pub fn aabb(&self) -> Aabb {
        Aabb { min: self.header.aabb_min, max: self.header.aabb_max }
    }

    /// Number of meshes in the table
    pub fn num_meshes(&self) -> usize {
        self.table.len()
    }

    /// Index count of one mesh
    pub fn num_indices(&self, mesh_index: usize) -> EngineResult<usize> {
        Ok(self.entry(mesh_index)?.index_size as usize / size_of::<u32>())
    }

    /// Vertex byte size of one mesh
    pub fn vertex_data_size(&self, mesh_index: usize) -> EngineResult<usize> {
        Ok(self.entry(mesh_index)?.vertex_size as usize)
    }

    /// Whether the cache no longer matches `info` and the source modification time
    pub fn outdated(&self, info: &ModelAssetInfo, modified: SystemTime) -> bool {
        let (secs, nanos) = timestamp_parts(modified);
        self.header.version != CACHE_VERSION
            || self.header.import_flags != info.import_flags.bits()
            || self.header.modified_secs != secs
            || self.header.modified_nanos != nanos
    }

    /// Read the indices and vertex bytes of one mesh
    pub fn read(&mut self, mesh_index: usize) -> EngineResult<(Vec<u32>, Vec<u8>)> {
        let entry = *self.entry(mesh_index)?;
        if entry.index_size % size_of::<u32>() as u64 != 0 {
            return Err(cache_error(&self.path, "index data is not made of u32 values"));
        }
        let Mode::Read(reader) = &mut self.mode else {
            return Err(cache_error(&self.path, "read is for read mode only"));
        };

        let mut index_bytes = vec![0u8; entry.index_size as usize];
        reader.seek(SeekFrom::Start(entry.index_offset))?;
        reader.read_exact(&mut index_bytes)?;
        let mut vertex_bytes = vec![0u8; entry.vertex_size as usize];
        reader.seek(SeekFrom::Start(entry.vertex_offset))?;
        reader.read_exact(&mut vertex_bytes)?;

        Ok((bytemuck::pod_collect_to_vec(&index_bytes), vertex_bytes))
    }

    /// Queue one mesh for [`write`](Self::write)
    pub fn record_write(&mut self, indices: &[u32], vertex_data: &[u8]) -> EngineResult<()> {
        let Mode::Write(meshes) = &mut self.mode else {
            return Err(cache_error(&self.path, "record_write is for write mode only"));
        };
        meshes.push((indices.to_vec(), vertex_data.to_vec()));
        Ok(())
    }

    /// Write the header, table and every recorded mesh to disk
    pub fn write(&mut self, info: &ModelAssetInfo, source_modified: SystemTime, aabb: &Aabb) -> EngineResult<()> {
        let Mode::Write(meshes) = &self.mode else {
            return Err(cache_error(&self.path, "write is for write mode only"));
        };

        let table_byte_size = u32::try_from(meshes.len() * size_of::<TableEntry>())
            .map_err(|_| cache_error(&self.path, "too many meshes"))?;
        let (modified_secs, modified_nanos) = timestamp_parts(source_modified);
        let header = CacheHeader {
            magic: CACHE_MAGIC,
            version: CACHE_VERSION,
            reserved: 0,
            import_flags: info.import_flags.bits(),
            table_byte_size,
            modified_secs,
            modified_nanos,
            reserved_time: 0,
            aabb_min: aabb.min,
            aabb_max: aabb.max,
        };

        let mut offset = (size_of::<CacheHeader>() + table_byte_size as usize) as u64;
        let table: Vec<TableEntry> = meshes
            .iter()
            .map(|(indices, vertices)| {
                let index_size = (indices.len() * size_of::<u32>()) as u64;
                let entry = TableEntry {
                    index_offset: offset,
                    index_size,
                    vertex_offset: offset + index_size,
                    vertex_size: vertices.len() as u64,
                };
                offset += index_size + entry.vertex_size;
                entry
            })
            .collect();

        let mut writer = BufWriter::new(File::create(&self.path)?);
        writer.write_all(bytemuck::bytes_of(&header))?;
        writer.write_all(bytemuck::cast_slice(&table))?;
        for (indices, vertices) in meshes {
            writer.write_all(bytemuck::cast_slice(indices))?;
            writer.write_all(vertices)?;
        }
        writer.flush()?;

        debug!("Model cache written: {} ({} meshes, {} bytes)", self.path.display(), table.len(), offset);
        self.header = header;
        self.table = table;
        Ok(())
    }

    fn entry(&self, mesh_index: usize) -> EngineResult<&TableEntry> {
        self.table
            .get(mesh_index)
            .ok_or_else(|| cache_error(&self.path, &format!("mesh index {mesh_index} out of range")))
    }
}

/// Import flags stored in a header, dropping unknown bits
pub fn header_import_flags(header: &CacheHeader) -> ImportFlags {
    ImportFlags::from_bits_truncate(header.import_flags)
}

fn cache_error(path: &Path, reason: &str) -> EngineError {
    EngineError::Cache {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
