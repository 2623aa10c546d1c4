//! Named rendering stage with cross-pass attachment bookkeeping
//!
//! A pass declares its attachments through a [`SubpassGraph`], records which
//! attachments it imports from an earlier pass and which it exports to later
//! ones, and accumulates the image barriers that hand its exports over.
//! Declaration ends with [`PassInterface::finalize`]; from then on the graph is
//! frozen inside a [`RenderPass`] and only framebuffers and barriers change.

use ash::{vk, Device};

use crate::error::{EngineError, EngineResult};
use crate::render::graph::{SubpassGraph, DEPTH_READ_LAYOUT};
use crate::render::vulkan::render_pass::RenderPass;

/// Default working format for color attachments
pub const DEFAULT_COLOR_FORMAT: vk::Format = vk::Format::B10G11R11_UFLOAT_PACK32;

/// Exported color attachment slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColorSlot {
    /// Multisampled scene color
    ColorMs,
    /// Resolved scene color
    Color,
    /// Geometry buffer slot A
    GBufferA,
    /// Geometry buffer slot B
    GBufferB,
    /// Geometry buffer slot C
    GBufferC,
    /// Geometry buffer slot D
    GBufferD,
    /// Geometry buffer slot E
    GBufferE,
    /// Geometry buffer slot F
    GBufferF,
}

impl ColorSlot {
    /// Number of slots
    pub const COUNT: usize = 8;

    /// Every slot in declaration order
    pub const ALL: [Self; Self::COUNT] = [
        Self::ColorMs,
        Self::Color,
        Self::GBufferA,
        Self::GBufferB,
        Self::GBufferC,
        Self::GBufferD,
        Self::GBufferE,
        Self::GBufferF,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// How a pass derives its framebuffer size
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtentMode {
    /// Absolute size
    Fixed(vk::Extent2D),
    /// Swapchain size multiplied by `scale`
    Swapchain {
        /// Scale relative to the swapchain
        scale: f32,
    },
}

impl Default for ExtentMode {
    fn default() -> Self {
        Self::Swapchain { scale: 1.0 }
    }
}

/// Attachment borrowed from an earlier pass instead of being allocated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportAttachment {
    /// Name of the pass the image comes from
    pub src_pass_name: String,
    /// Shader-facing name of the imported image
    pub attachment_name: String,
    /// Attachment index inside the source pass
    pub src_attachment_index: u32,
    /// Attachment index inside the importing pass
    pub dest_attachment_index: u32,
    /// Source attachment has more than one sample
    pub is_multisampled: bool,
}

/// Attachment offered to later passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportAttachment {
    /// Attachment index inside the exporting pass
    pub index: u32,
    /// Shader-facing name
    pub name: String,
}

/// Framebuffer handle bound to a pass together with its size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferBinding {
    /// Native framebuffer
    pub handle: vk::Framebuffer,
    /// Size the framebuffer was created with
    pub extent: vk::Extent2D,
}

enum PassStage {
    Declaring(SubpassGraph),
    Finalized(RenderPass),
}

/// One stage of the frame pipeline
pub struct PassInterface {
    name: String,
    extent_mode: ExtentMode,
    color_format: vk::Format,
    stage: PassStage,
    import_attachments: Vec<ImportAttachment>,
    export_colors: [Option<ExportAttachment>; ColorSlot::COUNT],
    export_depth: Option<ExportAttachment>,
    present_index: Option<u32>,
    barriers: Vec<vk::ImageMemoryBarrier>,
    barrier_stage_mask: vk::PipelineStageFlags,
    framebuffers: Vec<FramebufferBinding>,
}

impl PassInterface {
    /// New pass in declaration state
    pub fn new(name: impl Into<String>, extent_mode: ExtentMode, reverse_depth: bool) -> Self {
        Self {
            name: name.into(),
            extent_mode,
            color_format: DEFAULT_COLOR_FORMAT,
            stage: PassStage::Declaring(SubpassGraph::new(reverse_depth)),
            import_attachments: Vec::new(),
            export_colors: Default::default(),
            export_depth: None,
            present_index: None,
            barriers: Vec::new(),
            barrier_stage_mask: vk::PipelineStageFlags::empty(),
            framebuffers: Vec::new(),
        }
    }

    /// Override the working color format
    pub fn with_color_format(mut self, format: vk::Format) -> Self {
        self.color_format = format;
        self
    }

    /// Pass name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Working color format
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    /// Attachment declarations, frozen or not
    pub fn subpass_graph(&self) -> &SubpassGraph {
        match &self.stage {
            PassStage::Declaring(graph) => graph,
            PassStage::Finalized(render_pass) => render_pass.subpass_graph(),
        }
    }

    /// Mutable declarations, only while the pass is being declared
    pub fn subpass_graph_mut(&mut self) -> EngineResult<&mut SubpassGraph> {
        let name = &self.name;
        match &mut self.stage {
            PassStage::Declaring(graph) => Ok(graph),
            PassStage::Finalized(_) => Err(EngineError::invalid(format!(
                "Pass {name} is finalized and its subpass graph can no longer change"
            ))),
        }
    }

    /// Freeze the subpass graph; further calls do nothing
    pub fn finalize(&mut self) {
        if let PassStage::Declaring(graph) = &mut self.stage {
            let graph = std::mem::take(graph);
            self.stage = PassStage::Finalized(RenderPass::new(graph.finalize()));
        }
    }

    /// Whether the subpass graph is frozen
    pub fn is_finalized(&self) -> bool {
        matches!(self.stage, PassStage::Finalized(_))
    }

    /// Freeze if needed and create the native render pass
    pub fn build_render_pass(&mut self, device: &Device) -> EngineResult<()> {
        self.finalize();
        match &mut self.stage {
            PassStage::Finalized(render_pass) => render_pass.build(device),
            PassStage::Declaring(_) => Err(EngineError::invalid("Pass was not finalized")),
        }
    }

    /// Render pass, once finalized
    pub fn render_pass(&self) -> Option<&RenderPass> {
        match &self.stage {
            PassStage::Finalized(render_pass) => Some(render_pass),
            PassStage::Declaring(_) => None,
        }
    }

    /// Native render pass handle, null until built
    pub fn render_pass_handle(&self) -> vk::RenderPass {
        self.render_pass().map_or_else(vk::RenderPass::null, RenderPass::handle)
    }

    /// Extent mode
    pub fn extent_mode(&self) -> ExtentMode {
        self.extent_mode
    }

    /// Fixed extent; fails on swapchain-relative passes
    pub fn extent(&self) -> EngineResult<vk::Extent2D> {
        match self.extent_mode {
            ExtentMode::Fixed(extent) => Ok(extent),
            ExtentMode::Swapchain { .. } => Err(self.extent_mode_error("extent queried on a swapchain-relative pass")),
        }
    }

    /// Replace the fixed extent; fails on swapchain-relative passes
    pub fn set_extent(&mut self, extent: vk::Extent2D) -> EngineResult<()> {
        if let ExtentMode::Fixed(current) = &mut self.extent_mode {
            *current = extent;
            return Ok(());
        }
        Err(self.extent_mode_error("extent set on a swapchain-relative pass"))
    }

    /// Swapchain scale; fails on fixed passes
    pub fn scale(&self) -> EngineResult<f32> {
        match self.extent_mode {
            ExtentMode::Swapchain { scale } => Ok(scale),
            ExtentMode::Fixed(_) => Err(self.extent_mode_error("scale queried on a fixed-size pass")),
        }
    }

    /// Replace the swapchain scale; fails on fixed passes
    pub fn set_scale(&mut self, scale: f32) -> EngineResult<()> {
        if let ExtentMode::Swapchain { scale: current } = &mut self.extent_mode {
            *current = scale;
            return Ok(());
        }
        Err(self.extent_mode_error("scale set on a fixed-size pass"))
    }

    fn extent_mode_error(&self, reason: &str) -> EngineError {
        EngineError::ExtentMode { pass: self.name.clone(), reason: reason.to_owned() }
    }

    /// Framebuffer size for the given swapchain size, never below one texel
    pub fn resolve_extent(&self, swapchain_extent: vk::Extent2D) -> vk::Extent2D {
        match self.extent_mode {
            ExtentMode::Fixed(extent) => extent,
            ExtentMode::Swapchain { scale } => vk::Extent2D {
                width: scaled(swapchain_extent.width, scale),
                height: scaled(swapchain_extent.height, scale),
            },
        }
    }

    /// Record imports of `src`'s exports at `slot` and of its depth export
    ///
    /// Each import is recorded only when the source actually exports it and a
    /// destination index is given.
    pub fn record_import_attachments(
        &mut self,
        src: &PassInterface,
        slot: ColorSlot,
        dest_color: Option<u32>,
        dest_depth: Option<u32>,
    ) {
        if let (Some(export), Some(dest)) = (src.export_color(slot), dest_color) {
            self.import_attachments.push(src.import_record(export, dest));
        }
        if let (Some(export), Some(dest)) = (src.export_depth(), dest_depth) {
            self.import_attachments.push(src.import_record(export, dest));
        }
    }

    fn import_record(&self, export: &ExportAttachment, dest: u32) -> ImportAttachment {
        let is_multisampled = self
            .subpass_graph()
            .attachment(export.index)
            .is_some_and(|attachment| attachment.samples != vk::SampleCountFlags::TYPE_1);
        ImportAttachment {
            src_pass_name: self.name.clone(),
            attachment_name: export.name.clone(),
            src_attachment_index: export.index,
            dest_attachment_index: dest,
            is_multisampled,
        }
    }

    /// Recorded imports
    pub fn import_attachments(&self) -> &[ImportAttachment] {
        &self.import_attachments
    }

    /// Mutable imports, used to rename what a shader sees
    pub fn import_attachments_mut(&mut self) -> &mut [ImportAttachment] {
        &mut self.import_attachments
    }

    /// Import bound at `dest_index`, if any
    pub fn find_import_attachment(&self, dest_index: u32) -> Option<&ImportAttachment> {
        self.import_attachments
            .iter()
            .find(|import| import.dest_attachment_index == dest_index)
    }

    /// Offer `index` downstream under `slot`
    pub fn set_export_color_attachment(&mut self, slot: ColorSlot, index: u32, name: impl Into<String>, is_present: bool) {
        self.export_colors[slot.index()] = Some(ExportAttachment { index, name: name.into() });
        if is_present {
            self.present_index = Some(index);
        }
    }

    /// Offer `index` downstream as the depth export
    pub fn set_export_depth_attachment(&mut self, index: u32, name: impl Into<String>) {
        self.export_depth = Some(ExportAttachment { index, name: name.into() });
    }

    /// Color export at `slot`
    pub fn export_color(&self, slot: ColorSlot) -> Option<&ExportAttachment> {
        self.export_colors[slot.index()].as_ref()
    }

    /// Every color export with its slot
    pub fn export_colors(&self) -> impl Iterator<Item = (ColorSlot, &ExportAttachment)> {
        ColorSlot::ALL
            .into_iter()
            .filter_map(|slot| self.export_color(slot).map(|export| (slot, export)))
    }

    /// Depth export
    pub fn export_depth(&self) -> Option<&ExportAttachment> {
        self.export_depth.as_ref()
    }

    /// Whether `index` is exported under any color slot
    pub fn is_export_color_attachment(&self, index: u32) -> bool {
        self.export_colors().any(|(_, export)| export.index == index)
    }

    /// Attachment that receives the swapchain image
    pub fn present_attachment_index(&self) -> Option<u32> {
        self.present_index
    }

    /// Queue the hand-over barrier for a color export
    pub fn append_color_barrier(&mut self, image: vk::Image, index: u32) -> EngineResult<()> {
        let final_layout = self.final_layout(index)?;
        let (old_layout, new_layout) = if self.present_index == Some(index) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR)
        } else {
            (final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        };
        self.barriers.push(image_barrier(
            image,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            old_layout,
            new_layout,
            vk::ImageAspectFlags::COLOR,
        ));
        self.barrier_stage_mask |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        Ok(())
    }

    /// Queue the hand-over barrier for the depth export
    pub fn append_depth_barrier(&mut self, image: vk::Image) -> EngineResult<()> {
        let index = self
            .export_depth
            .as_ref()
            .map(|export| export.index)
            .ok_or_else(|| EngineError::invalid(format!("Pass {} exports no depth attachment", self.name)))?;
        let final_layout = self.final_layout(index)?;
        self.barriers.push(image_barrier(
            image,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            final_layout,
            DEPTH_READ_LAYOUT,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        ));
        self.barrier_stage_mask |= vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        Ok(())
    }

    fn final_layout(&self, index: u32) -> EngineResult<vk::ImageLayout> {
        self.subpass_graph()
            .attachment(index)
            .map(|attachment| attachment.final_layout)
            .ok_or_else(|| EngineError::invalid(format!("Pass {} has no attachment {index}", self.name)))
    }

    /// Drop all queued barriers
    pub fn clear_barriers(&mut self) {
        self.barriers.clear();
        self.barrier_stage_mask = vk::PipelineStageFlags::empty();
    }

    /// Queued barriers
    pub fn barriers(&self) -> &[vk::ImageMemoryBarrier] {
        &self.barriers
    }

    /// Union of the source stages of all queued barriers
    pub fn barrier_stage_mask(&self) -> vk::PipelineStageFlags {
        self.barrier_stage_mask
    }

    /// Replace the bound framebuffers
    pub fn set_framebuffers(&mut self, framebuffers: Vec<FramebufferBinding>) {
        self.framebuffers = framebuffers;
    }

    /// Bound framebuffers
    pub fn framebuffers(&self) -> &[FramebufferBinding] {
        &self.framebuffers
    }

    /// Framebuffer for a swapchain image; single framebuffer passes ignore the index
    pub fn framebuffer(&self, image_index: u32) -> Option<&FramebufferBinding> {
        if self.framebuffers.len() == 1 {
            self.framebuffers.first()
        } else {
            self.framebuffers.get(image_index as usize)
        }
    }
}

impl std::fmt::Debug for PassInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassInterface")
            .field("name", &self.name)
            .field("extent_mode", &self.extent_mode)
            .field("finalized", &self.is_finalized())
            .field("imports", &self.import_attachments.len())
            .field("barriers", &self.barriers.len())
            .finish()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn scaled(size: u32, scale: f32) -> u32 {
    ((size as f32 * scale) as u32).max(1)
}

fn image_barrier(
    image: vk::Image,
    src_access: vk::AccessFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    aspect_mask: vk::ImageAspectFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::graph::{depth_attachment, present_attachment, transfer_attachment, PassUsage};
    use ash::vk::Handle;

    fn exporting_pass(samples: vk::SampleCountFlags) -> PassInterface {
        let mut pass = PassInterface::new("Forward", ExtentMode::default(), true);
        let graph = pass.subpass_graph_mut().unwrap();
        let color = graph.append_attachment(transfer_attachment(DEFAULT_COLOR_FORMAT, PassUsage::EXPORT, samples));
        let depth = graph.append_depth_attachment(depth_attachment(vk::Format::D32_SFLOAT, PassUsage::EXPORT, samples));
        pass.set_export_color_attachment(ColorSlot::ColorMs, color, "sceneColorMSTexture", false);
        pass.set_export_depth_attachment(depth, "depthTexture");
        pass
    }

    #[test]
    fn test_record_import_attachments() {
        let src = exporting_pass(vk::SampleCountFlags::TYPE_4);
        let mut dest = PassInterface::new("Transparency", ExtentMode::default(), true);

        dest.record_import_attachments(&src, ColorSlot::ColorMs, Some(2), Some(3));
        dest.record_import_attachments(&src, ColorSlot::Color, Some(5), None);

        assert_eq!(dest.import_attachments().len(), 2);
        let color = dest.find_import_attachment(2).unwrap();
        assert_eq!(color.src_pass_name, "Forward");
        assert_eq!(color.attachment_name, "sceneColorMSTexture");
        assert_eq!(color.src_attachment_index, 0);
        assert!(color.is_multisampled);
        assert_eq!(dest.find_import_attachment(3).map(|i| i.src_attachment_index), Some(1));
        assert!(dest.find_import_attachment(5).is_none());
    }

    #[test]
    fn test_import_skipped_without_destination() {
        let src = exporting_pass(vk::SampleCountFlags::TYPE_1);
        let mut dest = PassInterface::new("PostProcess", ExtentMode::default(), true);
        dest.record_import_attachments(&src, ColorSlot::ColorMs, None, None);
        assert!(dest.import_attachments().is_empty());
    }

    #[test]
    fn test_barrier_stage_mask_accumulates() {
        let mut pass = exporting_pass(vk::SampleCountFlags::TYPE_1);
        let image = vk::Image::from_raw(7);

        pass.append_color_barrier(image, 0).unwrap();
        assert_eq!(pass.barrier_stage_mask(), vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        pass.append_depth_barrier(image).unwrap();
        assert_eq!(
            pass.barrier_stage_mask(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        );

        let color = pass.barriers()[0];
        assert_eq!(color.old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(color.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(color.src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        let depth = pass.barriers()[1];
        assert_eq!(depth.old_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(depth.new_layout, DEPTH_READ_LAYOUT);

        pass.clear_barriers();
        assert!(pass.barriers().is_empty());
        assert!(pass.barrier_stage_mask().is_empty());
    }

    #[test]
    fn test_present_pass_barrier_targets_presentation() {
        let mut pass = PassInterface::new("UserInterface", ExtentMode::default(), true);
        let index = pass
            .subpass_graph_mut()
            .unwrap()
            .append_attachment(present_attachment(vk::Format::B8G8R8A8_SRGB, PassUsage::EXPORT));
        pass.set_export_color_attachment(ColorSlot::Color, index, "sceneColorTexture", true);
        pass.append_color_barrier(vk::Image::from_raw(1), index).unwrap();

        assert_eq!(pass.present_attachment_index(), Some(index));
        assert_eq!(pass.barriers()[0].old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(pass.barriers()[0].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_depth_barrier_requires_depth_export() {
        let mut pass = PassInterface::new("Bloom0", ExtentMode::default(), true);
        assert!(pass.append_depth_barrier(vk::Image::null()).is_err());
    }

    #[test]
    fn test_extent_mode_queries() {
        let mut relative = PassInterface::new("DownSampling0", ExtentMode::Swapchain { scale: 0.5 }, true);
        assert!(matches!(relative.extent(), Err(EngineError::ExtentMode { .. })));
        assert!(relative.set_extent(vk::Extent2D { width: 1, height: 1 }).is_err());
        relative.set_scale(0.25).unwrap();
        assert_eq!(
            relative.resolve_extent(vk::Extent2D { width: 800, height: 600 }),
            vk::Extent2D { width: 200, height: 150 }
        );

        let mut fixed = PassInterface::new("Shadow", ExtentMode::Fixed(vk::Extent2D { width: 1024, height: 1024 }), true);
        assert!(fixed.scale().is_err());
        assert!(fixed.set_scale(2.0).is_err());
        fixed.set_extent(vk::Extent2D { width: 512, height: 512 }).unwrap();
        assert_eq!(fixed.resolve_extent(vk::Extent2D { width: 1, height: 1 }).width, 512);
    }

    #[test]
    fn test_tiny_swapchain_never_resolves_to_zero() {
        let pass = PassInterface::new("DownSampling5", ExtentMode::Swapchain { scale: 1.0 / 64.0 }, true);
        assert_eq!(
            pass.resolve_extent(vk::Extent2D { width: 32, height: 16 }),
            vk::Extent2D { width: 1, height: 1 }
        );
    }

    #[test]
    fn test_finalize_freezes_graph() {
        let mut pass = exporting_pass(vk::SampleCountFlags::TYPE_1);
        pass.subpass_graph_mut().unwrap().append_subpass("Forward");
        pass.finalize();
        pass.finalize();

        assert!(pass.is_finalized());
        assert!(pass.subpass_graph_mut().is_err());
        assert_eq!(pass.subpass_graph().attachment_count(), 2);
        assert_eq!(pass.render_pass_handle(), vk::RenderPass::null());
    }

    #[test]
    fn test_single_framebuffer_ignores_image_index() {
        let mut pass = PassInterface::new("Forward", ExtentMode::default(), true);
        let binding = FramebufferBinding {
            handle: vk::Framebuffer::from_raw(3),
            extent: vk::Extent2D { width: 4, height: 4 },
        };
        pass.set_framebuffers(vec![binding]);
        assert_eq!(pass.framebuffer(2), Some(&binding));
    }
}
