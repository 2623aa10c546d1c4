//! Attachment and subpass declarations of one render pass
//!
//! A [`SubpassGraph`] is mutable while a pass is being declared. Once every
//! attachment and subpass is in place it is consumed by
//! [`SubpassGraph::finalize`], which produces a [`SubpassGraphSnapshot`] whose
//! subpass descriptions point into storage that can no longer change.

use std::collections::BTreeSet;

use ash::vk;
use log::warn;

use super::attachment::{ClearValue, DEPTH_READ_LAYOUT};
use super::dependency::{first_dependency, DependencyPreset};
use crate::error::{EngineError, EngineResult};

/// Whether a subpass input reads a color or a depth attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAttachmentKind {
    /// Color input
    Color,
    /// Depth input
    Depth,
}

/// Shader-facing record of an input attachment binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputAttachmentInfo {
    /// Subpass reading the attachment
    pub subpass: String,
    /// Attachment index within the render pass
    pub attachment_index: u32,
    /// Color or depth
    pub kind: InputAttachmentKind,
    /// Source attachment has more than one sample
    pub is_multisampled: bool,
    /// Name the shader refers to the input by
    pub name: String,
}

/// Attachment references of a single subpass
#[derive(Debug, Clone)]
pub struct SubpassRecord {
    name: String,
    bind_point: vk::PipelineBindPoint,
    input_refs: Vec<vk::AttachmentReference>,
    color_refs: Vec<vk::AttachmentReference>,
    resolve_refs: Vec<vk::AttachmentReference>,
    depth_ref: Option<vk::AttachmentReference>,
}

impl SubpassRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            input_refs: Vec::new(),
            color_refs: Vec::new(),
            resolve_refs: Vec::new(),
            depth_ref: None,
        }
    }

    /// Subpass name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input attachment references
    pub fn input_refs(&self) -> &[vk::AttachmentReference] {
        &self.input_refs
    }

    /// Color attachment references
    pub fn color_refs(&self) -> &[vk::AttachmentReference] {
        &self.color_refs
    }

    /// Resolve attachment references
    pub fn resolve_refs(&self) -> &[vk::AttachmentReference] {
        &self.resolve_refs
    }

    /// Depth attachment reference, if bound
    pub fn depth_ref(&self) -> Option<&vk::AttachmentReference> {
        self.depth_ref.as_ref()
    }

    fn description(&self) -> vk::SubpassDescription {
        let mut builder = vk::SubpassDescription::builder()
            .pipeline_bind_point(self.bind_point)
            .input_attachments(&self.input_refs)
            .color_attachments(&self.color_refs);
        if !self.resolve_refs.is_empty() {
            builder = builder.resolve_attachments(&self.resolve_refs);
        }
        if let Some(depth_ref) = self.depth_ref.as_ref() {
            builder = builder.depth_stencil_attachment(depth_ref);
        }
        builder.build()
    }
}

/// Mutable declaration of attachments, subpasses and their dependencies
#[derive(Debug, Default)]
pub struct SubpassGraph {
    reverse_depth: bool,
    attachments: Vec<vk::AttachmentDescription>,
    clear_values: Vec<ClearValue>,
    depth_indices: BTreeSet<u32>,
    subpasses: Vec<SubpassRecord>,
    dependencies: Vec<vk::SubpassDependency>,
    input_attachments: Vec<InputAttachmentInfo>,
}

impl SubpassGraph {
    /// Empty graph; `reverse_depth` selects the depth clear value
    pub fn new(reverse_depth: bool) -> Self {
        Self { reverse_depth, ..Self::default() }
    }

    /// Append a color attachment, returns its index
    pub fn append_attachment(&mut self, description: vk::AttachmentDescription) -> u32 {
        self.attachments.push(description);
        self.clear_values.push(ClearValue::BLACK);
        self.last_attachment_index()
    }

    /// Append a depth attachment cleared to the far plane, returns its index
    pub fn append_depth_attachment(&mut self, description: vk::AttachmentDescription) -> u32 {
        self.attachments.push(description);
        self.clear_values.push(ClearValue::far_depth(self.reverse_depth));
        let index = self.last_attachment_index();
        self.depth_indices.insert(index);
        index
    }

    fn last_attachment_index(&self) -> u32 {
        u32::try_from(self.attachments.len() - 1).unwrap_or(u32::MAX)
    }

    /// Append a graphics subpass, returns its index
    ///
    /// A name that already exists is left as is and its index is returned.
    pub fn append_subpass(&mut self, name: &str) -> u32 {
        if let Some(index) = self.subpass_index(name) {
            return index;
        }
        self.subpasses.push(SubpassRecord::new(name));
        u32::try_from(self.subpasses.len() - 1).unwrap_or(u32::MAX)
    }

    /// Bind a color attachment as output of `subpass`
    pub fn bind_color_attachment(&mut self, subpass: &str, index: u32) -> bool {
        self.bind_color_attachment_with_layout(subpass, index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
    }

    /// Bind a color attachment using an explicit layout
    pub fn bind_color_attachment_with_layout(&mut self, subpass: &str, index: u32, layout: vk::ImageLayout) -> bool {
        if !self.check_attachment(subpass, index) {
            return false;
        }
        self.record_mut(subpass, |record| record.color_refs.push(reference(index, layout)))
    }

    /// Bind a resolve target for the color attachments of `subpass`
    pub fn bind_resolve_attachment(&mut self, subpass: &str, index: u32) -> bool {
        if !self.check_attachment(subpass, index) {
            return false;
        }
        if self.is_depth_attachment(index) {
            warn!("Attachment {index} is a depth attachment and cannot be a resolve target");
            return false;
        }
        self.record_mut(subpass, |record| {
            record.resolve_refs.push(reference(index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        })
    }

    /// Bind the depth attachment of `subpass`
    pub fn bind_depth_attachment(&mut self, subpass: &str, index: u32) -> bool {
        self.bind_depth_attachment_with_layout(subpass, index, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
    }

    /// Bind the depth attachment using an explicit layout
    pub fn bind_depth_attachment_with_layout(&mut self, subpass: &str, index: u32, layout: vk::ImageLayout) -> bool {
        if !self.check_attachment(subpass, index) {
            return false;
        }
        if !self.is_depth_attachment(index) {
            warn!("Attachment {index} is not a depth attachment");
            return false;
        }
        self.record_mut(subpass, |record| record.depth_ref = Some(reference(index, layout)))
    }

    /// Bind a color attachment as shader input of `subpass`
    pub fn bind_input_color_attachment(&mut self, subpass: &str, input_name: &str, index: u32) -> bool {
        self.bind_input_attachment(
            subpass,
            input_name,
            index,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            InputAttachmentKind::Color,
        )
    }

    /// Bind a depth attachment as shader input of `subpass`
    pub fn bind_input_depth_attachment(&mut self, subpass: &str, input_name: &str, index: u32) -> bool {
        self.bind_input_attachment(subpass, input_name, index, DEPTH_READ_LAYOUT, InputAttachmentKind::Depth)
    }

    fn bind_input_attachment(
        &mut self,
        subpass: &str,
        input_name: &str,
        index: u32,
        layout: vk::ImageLayout,
        kind: InputAttachmentKind,
    ) -> bool {
        if !self.check_attachment(subpass, index) {
            return false;
        }
        let is_multisampled = self.attachments[index as usize].samples != vk::SampleCountFlags::TYPE_1;
        self.input_attachments.push(InputAttachmentInfo {
            subpass: subpass.to_owned(),
            attachment_index: index,
            kind,
            is_multisampled,
            name: input_name.to_owned(),
        });
        self.record_mut(subpass, |record| record.input_refs.push(reference(index, layout)))
    }

    /// Add a dependency between two subpasses, returns its index
    ///
    /// An empty `src` denotes work outside the render pass and always uses the
    /// external preset. Without a preset only the subpass indices are filled in.
    pub fn make_dependency(&mut self, src: &str, dst: &str, preset: Option<DependencyPreset>) -> EngineResult<usize> {
        let dst_index = self
            .subpass_index(dst)
            .ok_or_else(|| EngineError::UnknownSubpass(dst.to_owned()))?;
        let dependency = if src.is_empty() {
            first_dependency(dst_index)
        } else {
            let src_index = self
                .subpass_index(src)
                .ok_or_else(|| EngineError::UnknownSubpass(src.to_owned()))?;
            match preset {
                Some(preset) => preset(src_index, dst_index),
                None => vk::SubpassDependency::builder()
                    .src_subpass(src_index)
                    .dst_subpass(dst_index)
                    .build(),
            }
        };
        self.dependencies.push(dependency);
        Ok(self.dependencies.len() - 1)
    }

    /// Mutable access to a recorded dependency
    pub fn dependency_mut(&mut self, index: usize) -> Option<&mut vk::SubpassDependency> {
        self.dependencies.get_mut(index)
    }

    /// Override the clear value of an attachment
    pub fn set_clear_value(&mut self, index: u32, value: ClearValue) -> bool {
        match self.clear_values.get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => {
                warn!("Clear value index {index} out of range");
                false
            }
        }
    }

    /// Sample count used when rasterizing `subpass`, taken from its first color output
    pub fn rasterization_sample_count(&self, subpass: &str) -> vk::SampleCountFlags {
        let first_color = self
            .subpass(subpass)
            .and_then(|record| record.color_refs.first())
            .and_then(|color_ref| self.attachments.get(color_ref.attachment as usize));
        if let Some(attachment) = first_color {
            attachment.samples
        } else {
            warn!("Subpass {subpass} has no color attachment, assuming a single sample");
            vk::SampleCountFlags::TYPE_1
        }
    }

    /// Index of a named subpass
    pub fn subpass_index(&self, name: &str) -> Option<u32> {
        self.subpasses
            .iter()
            .position(|record| record.name == name)
            .and_then(|index| u32::try_from(index).ok())
    }

    /// Named subpass record
    pub fn subpass(&self, name: &str) -> Option<&SubpassRecord> {
        self.subpasses.iter().find(|record| record.name == name)
    }

    /// Name of the first declared subpass, empty when there is none
    pub fn first_subpass_name(&self) -> &str {
        self.subpasses.first().map_or("", |record| record.name.as_str())
    }

    /// Subpasses in declaration order
    pub fn subpasses(&self) -> &[SubpassRecord] {
        &self.subpasses
    }

    /// Number of subpasses
    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }

    /// Attachment descriptions in index order
    pub fn attachments(&self) -> &[vk::AttachmentDescription] {
        &self.attachments
    }

    /// Attachment description at `index`
    pub fn attachment(&self, index: u32) -> Option<&vk::AttachmentDescription> {
        self.attachments.get(index as usize)
    }

    /// Mutable attachment description at `index`
    pub fn attachment_mut(&mut self, index: u32) -> Option<&mut vk::AttachmentDescription> {
        self.attachments.get_mut(index as usize)
    }

    /// Number of attachments
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Whether `index` was appended through [`Self::append_depth_attachment`]
    pub fn is_depth_attachment(&self, index: u32) -> bool {
        self.depth_indices.contains(&index)
    }

    /// Clear values in attachment order
    pub fn clear_values(&self) -> &[ClearValue] {
        &self.clear_values
    }

    /// Recorded dependencies
    pub fn dependencies(&self) -> &[vk::SubpassDependency] {
        &self.dependencies
    }

    /// Recorded input attachments
    pub fn input_attachments(&self) -> &[InputAttachmentInfo] {
        &self.input_attachments
    }

    /// Depth convention the graph was created with
    pub fn reverse_depth(&self) -> bool {
        self.reverse_depth
    }

    /// Freeze the graph into a snapshot ready for render pass creation
    pub fn finalize(self) -> SubpassGraphSnapshot {
        SubpassGraphSnapshot::new(self)
    }

    fn check_attachment(&self, subpass: &str, index: u32) -> bool {
        if self.subpass_index(subpass).is_none() {
            warn!("Subpass {subpass} does not exist");
            return false;
        }
        if index as usize >= self.attachments.len() {
            warn!("Attachment index {index} out of range ({} attachments)", self.attachments.len());
            return false;
        }
        true
    }

    fn record_mut(&mut self, subpass: &str, apply: impl FnOnce(&mut SubpassRecord)) -> bool {
        match self.subpasses.iter_mut().find(|record| record.name == subpass) {
            Some(record) => {
                apply(record);
                true
            }
            None => false,
        }
    }
}

fn reference(attachment: u32, layout: vk::ImageLayout) -> vk::AttachmentReference {
    vk::AttachmentReference { attachment, layout }
}

/// Frozen subpass graph with native subpass descriptions
///
/// The descriptions hold pointers into the reference vectors owned by the
/// inner graph. The graph is never handed out mutably, so those pointers stay
/// valid for the lifetime of the snapshot.
#[derive(Debug)]
pub struct SubpassGraphSnapshot {
    graph: SubpassGraph,
    descriptions: Vec<vk::SubpassDescription>,
}

impl SubpassGraphSnapshot {
    fn new(graph: SubpassGraph) -> Self {
        let descriptions = graph.subpasses.iter().map(SubpassRecord::description).collect();
        Self { graph, descriptions }
    }

    /// Read-only view of the frozen graph
    pub fn graph(&self) -> &SubpassGraph {
        &self.graph
    }

    /// Attachment descriptions
    pub fn attachments(&self) -> &[vk::AttachmentDescription] {
        &self.graph.attachments
    }

    /// Native subpass descriptions
    pub fn subpass_descriptions(&self) -> &[vk::SubpassDescription] {
        &self.descriptions
    }

    /// Dependencies
    pub fn dependencies(&self) -> &[vk::SubpassDependency] {
        &self.graph.dependencies
    }

    /// Native clear values in attachment order
    pub fn clear_values(&self) -> Vec<vk::ClearValue> {
        self.graph.clear_values.iter().map(|value| value.to_vk()).collect()
    }

    /// Render pass create info borrowing this snapshot
    pub fn create_info(&self) -> vk::RenderPassCreateInfoBuilder<'_> {
        vk::RenderPassCreateInfo::builder()
            .attachments(self.attachments())
            .subpasses(&self.descriptions)
            .dependencies(self.dependencies())
    }
}
