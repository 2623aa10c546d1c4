//! Graphics command recording with redundant bind elimination

use std::mem::size_of;

use ash::vk;
use log::trace;

use super::encoder::{CommandEncoder, RenderPassBegin};
use crate::error::{EngineError, EngineResult};
use crate::render::pass_interface::PassInterface;

const INDIRECT_STRIDE_ALIGNMENT: usize = 16;

const fn align_stride(size: usize) -> u32 {
    ((size + INDIRECT_STRIDE_ALIGNMENT - 1) / INDIRECT_STRIDE_ALIGNMENT * INDIRECT_STRIDE_ALIGNMENT) as u32
}

/// Stride between indexed indirect draw commands
pub const INDEXED_INDIRECT_STRIDE: u32 = align_stride(size_of::<vk::DrawIndexedIndirectCommand>());

/// Stride between non-indexed indirect draw commands
pub const INDIRECT_STRIDE: u32 = align_stride(size_of::<vk::DrawIndirectCommand>());

/// Buffers and counts of one draw
///
/// The variant is picked from which optional buffers are present: an index
/// buffer selects indexed drawing, an indirect buffer selects indirect drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    /// Vertex buffer bound at binding 0
    pub vertex_buffer: vk::Buffer,
    /// 32-bit index buffer
    pub index_buffer: Option<vk::Buffer>,
    /// Buffer of indirect draw commands
    pub indirect_buffer: Option<vk::Buffer>,
    /// Number of indirect commands
    pub indirect_command_count: u32,
    /// Index count of a direct indexed draw
    pub index_count: u32,
    /// Vertex count of a direct draw
    pub vertex_count: u32,
    /// Instance count of a direct draw
    pub instance_count: u32,
}

impl Default for RecordInfo {
    fn default() -> Self {
        Self {
            vertex_buffer: vk::Buffer::null(),
            index_buffer: None,
            indirect_buffer: None,
            indirect_command_count: 1,
            index_count: 0,
            vertex_count: 0,
            instance_count: 1,
        }
    }
}

/// Per-frame graphics command buffer
///
/// Expected order: `begin_record`, then per pass `begin_render_pass`,
/// pipeline and descriptor binds with draws, optional `next_subpass`,
/// `end_render_pass`, `barrier`, and finally `end_record`. Anything else is
/// rejected with [`EngineError::InvalidOperation`].
pub struct DrawCommandBuffer<'a> {
    encoder: &'a mut dyn CommandEncoder,
    reverse_depth: bool,
    recording: bool,
    in_render_pass: bool,
    current_pipeline: Option<vk::Pipeline>,
    current_descriptor_sets: Vec<vk::DescriptorSet>,
    current_layout: vk::PipelineLayout,
}

impl<'a> DrawCommandBuffer<'a> {
    /// Wrap an encoder
    pub fn new(encoder: &'a mut dyn CommandEncoder, reverse_depth: bool) -> Self {
        Self {
            encoder,
            reverse_depth,
            recording: false,
            in_render_pass: false,
            current_pipeline: None,
            current_descriptor_sets: Vec::new(),
            current_layout: vk::PipelineLayout::null(),
        }
    }

    /// Begin command recording
    pub fn begin_record(&mut self) -> EngineResult<()> {
        if self.recording {
            return Err(EngineError::invalid("Command buffer already recording"));
        }
        self.encoder.begin()?;
        self.recording = true;
        self.current_pipeline = None;
        self.current_descriptor_sets.clear();
        Ok(())
    }

    /// End command recording
    pub fn end_record(&mut self) -> EngineResult<()> {
        self.require_recording()?;
        if self.in_render_pass {
            return Err(EngineError::invalid("Render pass still open at end of recording"));
        }
        self.encoder.end()?;
        self.recording = false;
        Ok(())
    }

    /// Begin `pass` on the framebuffer for `image_index`
    pub fn begin_render_pass(&mut self, pass: &PassInterface, image_index: u32) -> EngineResult<()> {
        self.require_recording()?;
        if self.in_render_pass {
            return Err(EngineError::invalid("Render pass already open"));
        }
        let render_pass = pass
            .render_pass()
            .ok_or_else(|| EngineError::invalid(format!("Pass {} has no render pass", pass.name())))?;
        let framebuffer = pass
            .framebuffer(image_index)
            .ok_or_else(|| EngineError::invalid(format!("Pass {} has no framebuffer {image_index}", pass.name())))?;

        let render_area = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: framebuffer.extent };
        self.encoder.begin_render_pass(&RenderPassBegin {
            render_pass: render_pass.handle(),
            framebuffer: framebuffer.handle,
            render_area,
            clear_values: render_pass.clear_values(),
        });
        let viewport = self.viewport(framebuffer.extent);
        self.encoder.set_viewport(viewport);
        self.encoder.set_scissor(render_area);
        self.in_render_pass = true;
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn viewport(&self, extent: vk::Extent2D) -> vk::Viewport {
        let (min_depth, max_depth) = if self.reverse_depth { (1.0, 0.0) } else { (0.0, 1.0) };
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth,
            max_depth,
        }
    }

    /// Bind a graphics pipeline unless it is already bound; returns whether a bind was recorded
    pub fn setup_pipeline(&mut self, pipeline: vk::Pipeline) -> EngineResult<bool> {
        self.require_render_pass()?;
        if self.current_pipeline == Some(pipeline) {
            return Ok(false);
        }
        self.encoder.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline);
        self.current_pipeline = Some(pipeline);
        self.current_descriptor_sets.clear();
        Ok(true)
    }

    /// Bind descriptor sets unless the same sets are already bound
    pub fn setup_descriptor_sets(
        &mut self,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    ) -> EngineResult<bool> {
        self.require_render_pass()?;
        if self.current_pipeline.is_none() {
            return Err(EngineError::invalid("Descriptor sets bound before any pipeline"));
        }
        if self.current_layout == layout && self.current_descriptor_sets == sets {
            return Ok(false);
        }
        self.encoder.bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, layout, sets);
        self.current_descriptor_sets = sets.to_vec();
        self.current_layout = layout;
        Ok(true)
    }

    /// Record a draw, choosing the variant from `info`
    pub fn draw(&mut self, info: &RecordInfo) -> EngineResult<()> {
        self.require_render_pass()?;
        if self.current_pipeline.is_none() {
            return Err(EngineError::invalid("Draw recorded before any pipeline"));
        }
        self.encoder.bind_vertex_buffer(info.vertex_buffer);
        match (info.index_buffer, info.indirect_buffer) {
            (Some(index_buffer), Some(indirect_buffer)) => {
                self.encoder.bind_index_buffer(index_buffer);
                self.encoder
                    .draw_indexed_indirect(indirect_buffer, info.indirect_command_count, INDEXED_INDIRECT_STRIDE);
            }
            (Some(index_buffer), None) => {
                self.encoder.bind_index_buffer(index_buffer);
                self.encoder.draw_indexed(info.index_count, info.instance_count);
            }
            (None, Some(indirect_buffer)) => {
                self.encoder.draw_indirect(indirect_buffer, info.indirect_command_count, INDIRECT_STRIDE);
            }
            (None, None) => self.encoder.draw(info.vertex_count, info.instance_count),
        }
        Ok(())
    }

    /// Advance to the next subpass
    pub fn next_subpass(&mut self) -> EngineResult<()> {
        self.require_render_pass()?;
        self.encoder.next_subpass();
        Ok(())
    }

    /// End the open render pass
    pub fn end_render_pass(&mut self) -> EngineResult<()> {
        self.require_render_pass()?;
        self.encoder.end_render_pass();
        self.in_render_pass = false;
        Ok(())
    }

    /// Hand `pass`'s exports over to fragment shader reads in later passes
    pub fn barrier(&mut self, pass: &PassInterface) -> EngineResult<()> {
        self.require_recording()?;
        if self.in_render_pass {
            return Err(EngineError::invalid("Pass barrier recorded inside a render pass"));
        }
        if pass.barriers().is_empty() {
            trace!("Pass {} has no export barriers", pass.name());
            return Ok(());
        }
        self.encoder.pipeline_barrier(
            pass.barrier_stage_mask(),
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            pass.barriers(),
        );
        Ok(())
    }

    /// Whether recording is in progress
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    fn require_recording(&self) -> EngineResult<()> {
        if self.recording {
            Ok(())
        } else {
            Err(EngineError::invalid("Command buffer not recording"))
        }
    }

    fn require_render_pass(&self) -> EngineResult<()> {
        self.require_recording()?;
        if self.in_render_pass {
            Ok(())
        } else {
            Err(EngineError::invalid("No render pass is open"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::commands::encoder::test_support::{Recorded, RecordingEncoder};
    use crate::render::graph::{transfer_attachment, PassUsage};
    use crate::render::pass_interface::{ColorSlot, ExtentMode, FramebufferBinding};
    use ash::vk::Handle;

    fn ready_pass() -> PassInterface {
        let mut pass = PassInterface::new("Forward", ExtentMode::default(), true);
        let graph = pass.subpass_graph_mut().unwrap();
        let color = graph.append_attachment(transfer_attachment(
            vk::Format::R8G8B8A8_UNORM,
            PassUsage::EXPORT,
            vk::SampleCountFlags::TYPE_1,
        ));
        graph.append_subpass("Forward");
        graph.bind_color_attachment("Forward", color);
        pass.set_export_color_attachment(ColorSlot::Color, color, "sceneColorTexture", false);
        pass.finalize();
        pass.set_framebuffers(vec![FramebufferBinding {
            handle: vk::Framebuffer::from_raw(9),
            extent: vk::Extent2D { width: 640, height: 480 },
        }]);
        pass
    }

    #[test]
    fn test_indirect_strides() {
        assert_eq!(INDEXED_INDIRECT_STRIDE, 32);
        assert_eq!(INDIRECT_STRIDE, 16);
    }

    #[test]
    fn test_render_pass_sets_reverse_depth_viewport() {
        let pass = ready_pass();
        let mut encoder = RecordingEncoder::default();
        let mut cmd = DrawCommandBuffer::new(&mut encoder, true);
        cmd.begin_record().unwrap();
        cmd.begin_render_pass(&pass, 3).unwrap();
        cmd.end_render_pass().unwrap();
        cmd.end_record().unwrap();

        assert!(encoder.commands.contains(&Recorded::Viewport {
            width: 640.0,
            height: 480.0,
            min_depth: 1.0,
            max_depth: 0.0,
        }));
        assert!(matches!(
            encoder.commands[1],
            Recorded::BeginRenderPass { extent: vk::Extent2D { width: 640, height: 480 }, .. }
        ));
    }

    #[test]
    fn test_redundant_binds_are_skipped() {
        let pass = ready_pass();
        let mut encoder = RecordingEncoder::default();
        let mut cmd = DrawCommandBuffer::new(&mut encoder, false);
        let pipeline = vk::Pipeline::from_raw(1);
        let sets = [vk::DescriptorSet::from_raw(2)];

        cmd.begin_record().unwrap();
        cmd.begin_render_pass(&pass, 0).unwrap();
        assert!(cmd.setup_pipeline(pipeline).unwrap());
        assert!(!cmd.setup_pipeline(pipeline).unwrap());
        assert!(cmd.setup_descriptor_sets(vk::PipelineLayout::null(), &sets).unwrap());
        assert!(!cmd.setup_descriptor_sets(vk::PipelineLayout::null(), &sets).unwrap());
        assert!(cmd.setup_pipeline(vk::Pipeline::from_raw(5)).unwrap());
        assert!(cmd.setup_descriptor_sets(vk::PipelineLayout::null(), &sets).unwrap());
        cmd.end_render_pass().unwrap();
        cmd.end_record().unwrap();

        assert_eq!(encoder.count(|c| matches!(c, Recorded::BindPipeline(..))), 2);
        assert_eq!(encoder.count(|c| matches!(c, Recorded::BindDescriptorSets(..))), 2);
    }

    #[test]
    fn test_same_sets_under_a_new_layout_are_rebound() {
        let pass = ready_pass();
        let mut encoder = RecordingEncoder::default();
        let mut cmd = DrawCommandBuffer::new(&mut encoder, false);
        let sets = [vk::DescriptorSet::from_raw(2)];
        let layout = vk::PipelineLayout::from_raw(7);

        cmd.begin_record().unwrap();
        cmd.begin_render_pass(&pass, 0).unwrap();
        cmd.setup_pipeline(vk::Pipeline::from_raw(1)).unwrap();
        assert!(cmd.setup_descriptor_sets(layout, &sets).unwrap());
        assert!(cmd.setup_descriptor_sets(vk::PipelineLayout::from_raw(8), &sets).unwrap());
        assert!(cmd.setup_descriptor_sets(layout, &sets).unwrap());
        assert!(!cmd.setup_descriptor_sets(layout, &sets).unwrap());
        cmd.end_render_pass().unwrap();
        cmd.end_record().unwrap();

        assert_eq!(encoder.count(|c| matches!(c, Recorded::BindDescriptorSets(..))), 3);
    }

    #[test]
    fn test_draw_variants() {
        let pass = ready_pass();
        let mut encoder = RecordingEncoder::default();
        let mut cmd = DrawCommandBuffer::new(&mut encoder, false);
        let vertices = vk::Buffer::from_raw(10);
        let indices = vk::Buffer::from_raw(11);
        let indirect = vk::Buffer::from_raw(12);

        cmd.begin_record().unwrap();
        cmd.begin_render_pass(&pass, 0).unwrap();
        cmd.setup_pipeline(vk::Pipeline::from_raw(1)).unwrap();
        cmd.draw(&RecordInfo { vertex_buffer: vertices, vertex_count: 3, ..RecordInfo::default() }).unwrap();
        cmd.draw(&RecordInfo { vertex_buffer: vertices, index_buffer: Some(indices), index_count: 6, ..RecordInfo::default() })
            .unwrap();
        cmd.draw(&RecordInfo {
            vertex_buffer: vertices,
            indirect_buffer: Some(indirect),
            indirect_command_count: 4,
            ..RecordInfo::default()
        })
        .unwrap();
        cmd.draw(&RecordInfo {
            vertex_buffer: vertices,
            index_buffer: Some(indices),
            indirect_buffer: Some(indirect),
            indirect_command_count: 2,
            ..RecordInfo::default()
        })
        .unwrap();

        let commands = &encoder.commands;
        assert!(commands.contains(&Recorded::Draw { vertex_count: 3, instance_count: 1 }));
        assert!(commands.contains(&Recorded::DrawIndexed { index_count: 6, instance_count: 1 }));
        assert!(commands.contains(&Recorded::DrawIndirect { buffer: indirect, draw_count: 4, stride: 16 }));
        assert!(commands.contains(&Recorded::DrawIndexedIndirect { buffer: indirect, draw_count: 2, stride: 32 }));
    }

    #[test]
    fn test_ordering_violations_are_rejected() {
        let pass = ready_pass();
        let mut encoder = RecordingEncoder::default();
        let mut cmd = DrawCommandBuffer::new(&mut encoder, false);

        assert!(cmd.begin_render_pass(&pass, 0).is_err());
        cmd.begin_record().unwrap();
        assert!(cmd.setup_pipeline(vk::Pipeline::from_raw(1)).is_err());
        cmd.begin_render_pass(&pass, 0).unwrap();
        assert!(cmd.setup_descriptor_sets(vk::PipelineLayout::null(), &[]).is_err());
        assert!(cmd.draw(&RecordInfo::default()).is_err());
        assert!(cmd.barrier(&pass).is_err());
        assert!(cmd.end_record().is_err());
        cmd.end_render_pass().unwrap();
        assert!(cmd.end_render_pass().is_err());
        assert!(cmd.begin_record().is_err());
    }

    #[test]
    fn test_barrier_uses_accumulated_stage_mask() {
        let mut pass = ready_pass();
        pass.append_color_barrier(vk::Image::from_raw(4), 0).unwrap();
        let mut encoder = RecordingEncoder::default();
        let mut cmd = DrawCommandBuffer::new(&mut encoder, false);
        cmd.begin_record().unwrap();
        cmd.barrier(&pass).unwrap();
        pass.clear_barriers();
        cmd.barrier(&pass).unwrap();
        cmd.end_record().unwrap();

        assert_eq!(encoder.count(|c| matches!(c, Recorded::Barrier { .. })), 1);
        assert!(encoder.commands.contains(&Recorded::Barrier {
            src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            count: 1,
        }));
    }
}
