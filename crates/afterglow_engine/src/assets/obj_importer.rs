//! Wavefront OBJ importer
//!
//! Faces are fan-triangulated and every face corner becomes its own vertex.
//! `o` and `g` statements start a new mesh. Vertices are written in the
//! layout selected by the import flags.

use std::fs::File;
use std::io::{BufRead, BufReader};

use nalgebra::Vector3;

use super::definitions::{Aabb, ImportFlags, ModelAssetInfo, VertexAttribute};
use super::model_asset::{ImportedModel, MeshData, ModelImporter};
use crate::error::{EngineError, EngineResult};

const DEFAULT_NORMAL: [f32; 3] = [0.0, 1.0, 0.0];
const DEFAULT_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// [`ModelImporter`] for `.obj` files
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjImporter;

#[derive(Clone, Copy)]
struct Corner {
    position: [f32; 3],
    normal: Option<[f32; 3]>,
    tex_coord: [f32; 2],
}

#[derive(Default)]
struct MeshBuilder {
    corners: Vec<Corner>,
}

impl ModelImporter for ObjImporter {
    fn import(&self, info: &ModelAssetInfo) -> EngineResult<ImportedModel> {
        let reader = BufReader::new(File::open(&info.path)?);

        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut tex_coords = Vec::new();
        let mut builders = vec![MeshBuilder::default()];

        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };
            let parts: Vec<&str> = parts.collect();
            let at = |what: &str| EngineError::Asset(format!("{}:{}: {what}", info.path, line_number + 1));

            match keyword {
                "v" => positions.push(parse_floats::<3>(&parts).ok_or_else(|| at("invalid vertex"))?),
                "vn" => normals.push(parse_floats::<3>(&parts).ok_or_else(|| at("invalid normal"))?),
                "vt" => tex_coords.push(parse_floats::<2>(&parts).ok_or_else(|| at("invalid tex coord"))?),
                "o" | "g" => {
                    if builders.last().is_some_and(|builder| !builder.corners.is_empty()) {
                        builders.push(MeshBuilder::default());
                    }
                }
                "f" => {
                    if parts.len() < 3 {
                        return Err(at("face with fewer than three corners"));
                    }
                    let face = parts
                        .iter()
                        .map(|corner| resolve_corner(corner, &positions, &normals, &tex_coords))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| at("face index out of bounds"))?;
                    if let Some(builder) = builders.last_mut() {
                        for i in 1..face.len() - 1 {
                            builder.corners.extend([face[0], face[i], face[i + 1]]);
                        }
                    }
                }
                _ => {}
            }
        }

        let builders: Vec<MeshBuilder> = builders.into_iter().filter(|b| !b.corners.is_empty()).collect();
        if builders.is_empty() {
            return Err(EngineError::Asset(format!("No faces found in OBJ file: {}", info.path)));
        }

        let mut aabb = Aabb::EMPTY;
        let meshes = builders
            .iter()
            .map(|builder| {
                builder.corners.iter().for_each(|corner| aabb.extend(corner.position));
                build_mesh(builder, info.import_flags)
            })
            .collect();
        Ok(ImportedModel { meshes, aabb })
    }
}

fn parse_floats<const N: usize>(parts: &[&str]) -> Option<[f32; N]> {
    if parts.len() < N {
        return None;
    }
    let mut values = [0.0; N];
    for (value, part) in values.iter_mut().zip(parts) {
        *value = part.parse().ok()?;
    }
    Some(values)
}

/// Resolve one `v/vt/vn` corner; indices are 1-based, negative ones count from the end
fn resolve_corner(
    corner: &str,
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    tex_coords: &[[f32; 2]],
) -> Option<Corner> {
    let mut indices = corner.split('/');
    let position = *lookup(positions, indices.next()?)?;
    let tex_coord = match indices.next() {
        Some(index) if !index.is_empty() => *lookup(tex_coords, index)?,
        _ => [0.0, 0.0],
    };
    let normal = match indices.next() {
        Some(index) if !index.is_empty() => Some(*lookup(normals, index)?),
        _ => None,
    };
    Some(Corner { position, normal, tex_coord })
}

fn lookup<'a, T>(values: &'a [T], index: &str) -> Option<&'a T> {
    let index: i64 = index.parse().ok()?;
    let resolved = if index < 0 {
        values.len().checked_sub(usize::try_from(-index).ok()?)?
    } else {
        usize::try_from(index).ok()?.checked_sub(1)?
    };
    values.get(resolved)
}

fn build_mesh(builder: &MeshBuilder, flags: ImportFlags) -> MeshData {
    let attributes = flags.vertex_attributes();
    let corners = &builder.corners;
    let face_normals: Vec<[f32; 3]> = corners.chunks_exact(3).map(face_normal).collect();
    let face_tangents: Vec<[f32; 3]> = if flags.contains(ImportFlags::GENERATE_TANGENT) {
        corners.chunks_exact(3).map(face_tangent).collect()
    } else {
        vec![[0.0; 3]; face_normals.len()]
    };

    let mut floats: Vec<f32> = Vec::with_capacity(corners.len() * flags.vertex_stride() as usize / 4);
    for (index, corner) in corners.iter().enumerate() {
        let face = index / 3;
        for attribute in &attributes {
            match attribute {
                VertexAttribute::Position => floats.extend(corner.position),
                VertexAttribute::Normal => {
                    let normal = if flags.contains(ImportFlags::RECOMPUTE_NORMAL) {
                        face_normals[face]
                    } else {
                        corner.normal.unwrap_or(face_normals[face])
                    };
                    floats.extend(normal);
                }
                VertexAttribute::Tangent => floats.extend(face_tangents[face]),
                VertexAttribute::Color => floats.extend(DEFAULT_COLOR),
                VertexAttribute::TexCoord0 => {
                    let [u, v] = corner.tex_coord;
                    // flipped by default so that V runs top to bottom
                    let v = if flags.contains(ImportFlags::FLIP_UVS) { v } else { 1.0 - v };
                    floats.extend([u, v]);
                }
            }
        }
    }

    let count = u32::try_from(corners.len()).unwrap_or(u32::MAX);
    MeshData {
        indices: (0..count).collect(),
        vertices: bytemuck::cast_slice(&floats).to_vec(),
    }
}

fn face_normal(face: &[Corner]) -> [f32; 3] {
    let [a, b, c] = [0, 1, 2].map(|i| Vector3::from(face[i].position));
    (b - a)
        .cross(&(c - a))
        .try_normalize(f32::EPSILON)
        .map_or(DEFAULT_NORMAL, Into::into)
}

fn face_tangent(face: &[Corner]) -> [f32; 3] {
    let [a, b, c] = [0, 1, 2].map(|i| Vector3::from(face[i].position));
    let edge1 = b - a;
    let edge2 = c - a;
    let du1 = face[1].tex_coord[0] - face[0].tex_coord[0];
    let dv1 = face[1].tex_coord[1] - face[0].tex_coord[1];
    let du2 = face[2].tex_coord[0] - face[0].tex_coord[0];
    let dv2 = face[2].tex_coord[1] - face[0].tex_coord[1];
    let det = du1 * dv2 - du2 * dv1;
    if det.abs() <= f32::EPSILON {
        return [1.0, 0.0, 0.0];
    }
    ((edge1 * dv2 - edge2 * dv1) / det)
        .try_normalize(f32::EPSILON)
        .map_or([1.0, 0.0, 0.0], Into::into)
}
