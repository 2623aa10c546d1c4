//! Command pool and device-backed command encoding

use ash::{vk, Device};

use crate::error::{EngineError, EngineResult};
use crate::render::commands::{CommandEncoder, RenderPassBegin};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> EngineResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool = unsafe { device.create_command_pool(&pool_create_info, None).map_err(EngineError::Api)? };
        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> EngineResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&alloc_info).map_err(EngineError::Api) }
    }

    /// Encoder recording into `command_buffer`
    pub fn encoder(&self, command_buffer: vk::CommandBuffer) -> DeviceEncoder {
        DeviceEncoder::new(self.device.clone(), command_buffer)
    }

    /// Record and submit a one-off command buffer, blocking until the queue is idle
    pub fn run_single_time(
        &self,
        queue: vk::Queue,
        record: impl FnOnce(&mut DeviceEncoder) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let command_buffers = self.allocate_command_buffers(1)?;
        let mut encoder = self.encoder(command_buffers[0]);
        let result = encoder.begin().and_then(|()| record(&mut encoder)).and_then(|()| encoder.end());
        let result = result.and_then(|()| {
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
            unsafe {
                self.device
                    .queue_submit(queue, &[submit_info], vk::Fence::null())
                    .and_then(|()| self.device.queue_wait_idle(queue))
                    .map_err(EngineError::Api)
            }
        });
        unsafe {
            self.device.free_command_buffers(self.command_pool, &command_buffers);
        }
        result
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Command buffers allocated from the pool must have finished executing
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// [`CommandEncoder`] recording through the logical device
pub struct DeviceEncoder {
    device: Device,
    command_buffer: vk::CommandBuffer,
}

impl DeviceEncoder {
    /// Wrap an allocated command buffer
    pub fn new(device: Device, command_buffer: vk::CommandBuffer) -> Self {
        Self { device, command_buffer }
    }

    /// Get the command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

impl CommandEncoder for DeviceEncoder {
    fn begin(&mut self) -> EngineResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .and_then(|()| self.device.begin_command_buffer(self.command_buffer, &begin_info))
                .map_err(EngineError::Api)
        }
    }

    fn end(&mut self) -> EngineResult<()> {
        unsafe { self.device.end_command_buffer(self.command_buffer).map_err(EngineError::Api) }
    }

    fn begin_render_pass(&mut self, begin: &RenderPassBegin) {
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(begin.render_area)
            .clear_values(&begin.clear_values);
        unsafe {
            self.device.cmd_begin_render_pass(self.command_buffer, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn next_subpass(&mut self) {
        unsafe {
            self.device.cmd_next_subpass(self.command_buffer, vk::SubpassContents::INLINE);
        }
    }

    fn end_render_pass(&mut self) {
        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer);
        }
    }

    fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe {
            self.device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
        }
    }

    fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe {
            self.device.cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
    }

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(self.command_buffer, bind_point, pipeline);
        }
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(self.command_buffer, bind_point, layout, 0, sets, &[]);
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer], &[0]);
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device.cmd_bind_index_buffer(self.command_buffer, buffer, 0, vk::IndexType::UINT32);
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        unsafe {
            self.device.cmd_draw(self.command_buffer, vertex_count, instance_count, 0, 0);
        }
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        unsafe {
            self.device.cmd_draw_indexed(self.command_buffer, index_count, instance_count, 0, 0, 0);
        }
    }

    fn draw_indirect(&mut self, buffer: vk::Buffer, draw_count: u32, stride: u32) {
        unsafe {
            self.device.cmd_draw_indirect(self.command_buffer, buffer, 0, draw_count, stride);
        }
    }

    fn draw_indexed_indirect(&mut self, buffer: vk::Buffer, draw_count: u32, stride: u32) {
        unsafe {
            self.device.cmd_draw_indexed_indirect(self.command_buffer, buffer, 0, draw_count, stride);
        }
    }

    fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                barriers,
            );
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        unsafe {
            self.device.cmd_dispatch(self.command_buffer, x, y, z);
        }
    }
}
