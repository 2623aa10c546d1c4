//! Command sink shared by draw and compute recording

use ash::vk;

use crate::error::EngineResult;

/// Everything needed to begin a render pass
#[derive(Clone)]
pub struct RenderPassBegin {
    /// Native render pass
    pub render_pass: vk::RenderPass,
    /// Framebuffer to render into
    pub framebuffer: vk::Framebuffer,
    /// Render area, the whole framebuffer
    pub render_area: vk::Rect2D,
    /// Clear values in attachment order
    pub clear_values: Vec<vk::ClearValue>,
}

/// Raw command recording into one command buffer
///
/// [`crate::render::vulkan::commands::DeviceEncoder`] records through the
/// device; tests substitute a recorder that keeps the command stream.
pub trait CommandEncoder {
    /// Begin recording
    fn begin(&mut self) -> EngineResult<()>;
    /// Finish recording
    fn end(&mut self) -> EngineResult<()>;
    /// Begin a render pass with inline contents
    fn begin_render_pass(&mut self, begin: &RenderPassBegin);
    /// Advance to the next subpass
    fn next_subpass(&mut self);
    /// End the current render pass
    fn end_render_pass(&mut self);
    /// Set viewport 0
    fn set_viewport(&mut self, viewport: vk::Viewport);
    /// Set scissor 0
    fn set_scissor(&mut self, scissor: vk::Rect2D);
    /// Bind a pipeline
    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    /// Bind descriptor sets starting at set 0
    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    );
    /// Bind vertex buffer 0
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);
    /// Bind a 32-bit index buffer
    fn bind_index_buffer(&mut self, buffer: vk::Buffer);
    /// Non-indexed draw
    fn draw(&mut self, vertex_count: u32, instance_count: u32);
    /// Indexed draw
    fn draw_indexed(&mut self, index_count: u32, instance_count: u32);
    /// Non-indexed indirect draw
    fn draw_indirect(&mut self, buffer: vk::Buffer, draw_count: u32, stride: u32);
    /// Indexed indirect draw
    fn draw_indexed_indirect(&mut self, buffer: vk::Buffer, draw_count: u32, stride: u32);
    /// Image memory barriers
    fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[vk::ImageMemoryBarrier],
    );
    /// Compute dispatch
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// One recorded call
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Recorded {
        Begin,
        End,
        BeginRenderPass { render_pass: vk::RenderPass, framebuffer: vk::Framebuffer, extent: vk::Extent2D },
        NextSubpass,
        EndRenderPass,
        Viewport { width: f32, height: f32, min_depth: f32, max_depth: f32 },
        Scissor(vk::Rect2D),
        BindPipeline(vk::PipelineBindPoint, vk::Pipeline),
        BindDescriptorSets(vk::PipelineBindPoint, Vec<vk::DescriptorSet>),
        BindVertexBuffer(vk::Buffer),
        BindIndexBuffer(vk::Buffer),
        Draw { vertex_count: u32, instance_count: u32 },
        DrawIndexed { index_count: u32, instance_count: u32 },
        DrawIndirect { buffer: vk::Buffer, draw_count: u32, stride: u32 },
        DrawIndexedIndirect { buffer: vk::Buffer, draw_count: u32, stride: u32 },
        Barrier { src_stage: vk::PipelineStageFlags, dst_stage: vk::PipelineStageFlags, count: usize },
        Dispatch(u32, u32, u32),
    }

    /// Encoder that keeps every call for inspection
    #[derive(Debug, Default)]
    pub(crate) struct RecordingEncoder {
        pub(crate) commands: Vec<Recorded>,
    }

    impl RecordingEncoder {
        pub(crate) fn count(&self, predicate: impl Fn(&Recorded) -> bool) -> usize {
            self.commands.iter().filter(|command| predicate(command)).count()
        }
    }

    impl CommandEncoder for RecordingEncoder {
        fn begin(&mut self) -> EngineResult<()> {
            self.commands.push(Recorded::Begin);
            Ok(())
        }

        fn end(&mut self) -> EngineResult<()> {
            self.commands.push(Recorded::End);
            Ok(())
        }

        fn begin_render_pass(&mut self, begin: &RenderPassBegin) {
            self.commands.push(Recorded::BeginRenderPass {
                render_pass: begin.render_pass,
                framebuffer: begin.framebuffer,
                extent: begin.render_area.extent,
            });
        }

        fn next_subpass(&mut self) {
            self.commands.push(Recorded::NextSubpass);
        }

        fn end_render_pass(&mut self) {
            self.commands.push(Recorded::EndRenderPass);
        }

        fn set_viewport(&mut self, viewport: vk::Viewport) {
            self.commands.push(Recorded::Viewport {
                width: viewport.width,
                height: viewport.height,
                min_depth: viewport.min_depth,
                max_depth: viewport.max_depth,
            });
        }

        fn set_scissor(&mut self, scissor: vk::Rect2D) {
            self.commands.push(Recorded::Scissor(scissor));
        }

        fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
            self.commands.push(Recorded::BindPipeline(bind_point, pipeline));
        }

        fn bind_descriptor_sets(
            &mut self,
            bind_point: vk::PipelineBindPoint,
            _layout: vk::PipelineLayout,
            sets: &[vk::DescriptorSet],
        ) {
            self.commands.push(Recorded::BindDescriptorSets(bind_point, sets.to_vec()));
        }

        fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
            self.commands.push(Recorded::BindVertexBuffer(buffer));
        }

        fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
            self.commands.push(Recorded::BindIndexBuffer(buffer));
        }

        fn draw(&mut self, vertex_count: u32, instance_count: u32) {
            self.commands.push(Recorded::Draw { vertex_count, instance_count });
        }

        fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
            self.commands.push(Recorded::DrawIndexed { index_count, instance_count });
        }

        fn draw_indirect(&mut self, buffer: vk::Buffer, draw_count: u32, stride: u32) {
            self.commands.push(Recorded::DrawIndirect { buffer, draw_count, stride });
        }

        fn draw_indexed_indirect(&mut self, buffer: vk::Buffer, draw_count: u32, stride: u32) {
            self.commands.push(Recorded::DrawIndexedIndirect { buffer, draw_count, stride });
        }

        fn pipeline_barrier(
            &mut self,
            src_stage: vk::PipelineStageFlags,
            dst_stage: vk::PipelineStageFlags,
            barriers: &[vk::ImageMemoryBarrier],
        ) {
            self.commands.push(Recorded::Barrier { src_stage, dst_stage, count: barriers.len() });
        }

        fn dispatch(&mut self, x: u32, y: u32, z: u32) {
            self.commands.push(Recorded::Dispatch(x, y, z));
        }
    }
}
