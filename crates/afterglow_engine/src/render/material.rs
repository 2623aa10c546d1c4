//! Materials drawn by full-screen passes
//!
//! Passes describe the materials they need; a [`MaterialResolver`] owned by the
//! caller turns a material name into pipeline state and geometry.

use std::collections::BTreeMap;

use ash::vk;
use log::warn;

use crate::error::EngineResult;
use crate::render::commands::{DrawCommandBuffer, RecordInfo};

/// Shaders and parameters of one material
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDescriptor {
    /// Unique material name
    pub name: String,
    /// Pass the material renders in
    pub pass_name: String,
    /// Subpass the material renders in
    pub subpass_name: String,
    /// Vertex shader path
    pub vertex_shader: String,
    /// Fragment shader path
    pub fragment_shader: String,
    /// Scalar parameters
    pub scalars: BTreeMap<String, f32>,
    /// Vector parameters
    pub vectors: BTreeMap<String, [f32; 4]>,
}

impl MaterialDescriptor {
    /// Material without parameters
    pub fn new(
        name: impl Into<String>,
        pass_name: impl Into<String>,
        subpass_name: impl Into<String>,
        vertex_shader: impl Into<String>,
        fragment_shader: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pass_name: pass_name.into(),
            subpass_name: subpass_name.into(),
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
            scalars: BTreeMap::new(),
            vectors: BTreeMap::new(),
        }
    }

    /// Set a scalar parameter
    pub fn with_scalar(mut self, name: impl Into<String>, value: f32) -> Self {
        self.scalars.insert(name.into(), value);
        self
    }

    /// Set a vector parameter
    pub fn with_vector(mut self, name: impl Into<String>, value: [f32; 4]) -> Self {
        self.vectors.insert(name.into(), value);
        self
    }

    /// Scalar parameter
    pub fn scalar(&self, name: &str) -> Option<f32> {
        self.scalars.get(name).copied()
    }

    /// Vector parameter
    pub fn vector(&self, name: &str) -> Option<[f32; 4]> {
        self.vectors.get(name).copied()
    }
}

/// Pipeline state and geometry needed to draw a material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialBinding {
    /// Graphics pipeline
    pub pipeline: vk::Pipeline,
    /// Layout the descriptor sets were allocated against
    pub layout: vk::PipelineLayout,
    /// Sets bound from set 0
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    /// Geometry, a screen-covering quad for post effects
    pub record_info: RecordInfo,
}

/// Looks up compiled materials by name
pub trait MaterialResolver {
    /// Binding for `material`, `None` when it is not ready
    fn resolve(&self, material: &str) -> Option<MaterialBinding>;
}

/// Bind and draw `material`; a material the resolver does not know is skipped
pub fn draw_material(
    cmd: &mut DrawCommandBuffer<'_>,
    resolver: &dyn MaterialResolver,
    material: &str,
) -> EngineResult<bool> {
    let Some(binding) = resolver.resolve(material) else {
        warn!("Material {material} is not available, draw skipped");
        return Ok(false);
    };
    cmd.setup_pipeline(binding.pipeline)?;
    cmd.setup_descriptor_sets(binding.layout, &binding.descriptor_sets)?;
    cmd.draw(&binding.record_info)?;
    Ok(true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use ash::vk::Handle;
    use std::collections::HashMap;

    /// Resolver handing out a distinct pipeline per registered material
    #[derive(Debug, Default)]
    pub(crate) struct FixedResolver {
        bindings: HashMap<String, MaterialBinding>,
    }

    impl FixedResolver {
        pub(crate) fn with_materials<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
            let bindings = names
                .into_iter()
                .enumerate()
                .map(|(index, name)| {
                    let raw = index as u64 + 1;
                    let binding = MaterialBinding {
                        pipeline: vk::Pipeline::from_raw(raw),
                        layout: vk::PipelineLayout::from_raw(raw),
                        descriptor_sets: vec![vk::DescriptorSet::from_raw(raw)],
                        record_info: RecordInfo {
                            vertex_buffer: vk::Buffer::from_raw(100),
                            index_buffer: Some(vk::Buffer::from_raw(101)),
                            index_count: 6,
                            ..RecordInfo::default()
                        },
                    };
                    (name.to_owned(), binding)
                })
                .collect();
            Self { bindings }
        }
    }

    impl MaterialResolver for FixedResolver {
        fn resolve(&self, material: &str) -> Option<MaterialBinding> {
            self.bindings.get(material).cloned()
        }
    }
}
