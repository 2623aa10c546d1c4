//! Compute command recording

use ash::vk;

use super::encoder::CommandEncoder;
use crate::error::{EngineError, EngineResult};

/// Per-frame compute command buffer
pub struct ComputeCommandBuffer<'a> {
    encoder: &'a mut dyn CommandEncoder,
    recording: bool,
    current_pipeline: Option<vk::Pipeline>,
    current_descriptor_sets: Vec<vk::DescriptorSet>,
    current_layout: vk::PipelineLayout,
}

impl<'a> ComputeCommandBuffer<'a> {
    /// Wrap an encoder
    pub fn new(encoder: &'a mut dyn CommandEncoder) -> Self {
        Self {
            encoder,
            recording: false,
            current_pipeline: None,
            current_descriptor_sets: Vec::new(),
            current_layout: vk::PipelineLayout::null(),
        }
    }

    /// Begin command recording
    pub fn begin_record(&mut self) -> EngineResult<()> {
        if self.recording {
            return Err(EngineError::invalid("Compute command buffer already recording"));
        }
        self.encoder.begin()?;
        self.recording = true;
        self.current_pipeline = None;
        self.current_descriptor_sets.clear();
        Ok(())
    }

    /// Bind a compute pipeline unless it is already bound
    pub fn setup_pipeline(&mut self, pipeline: vk::Pipeline) -> EngineResult<bool> {
        self.require_recording()?;
        if self.current_pipeline == Some(pipeline) {
            return Ok(false);
        }
        self.encoder.bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline);
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
        self.require_pipeline()?;
        if self.current_layout == layout && self.current_descriptor_sets == sets {
            return Ok(false);
        }
        self.encoder.bind_descriptor_sets(vk::PipelineBindPoint::COMPUTE, layout, sets);
        self.current_descriptor_sets = sets.to_vec();
        self.current_layout = layout;
        Ok(true)
    }

    /// Dispatch workgroups
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> EngineResult<()> {
        self.require_pipeline()?;
        self.encoder.dispatch(x, y, z);
        Ok(())
    }

    /// End command recording
    pub fn end_record(&mut self) -> EngineResult<()> {
        self.require_recording()?;
        self.encoder.end()?;
        self.recording = false;
        Ok(())
    }

    fn require_recording(&self) -> EngineResult<()> {
        if self.recording {
            Ok(())
        } else {
            Err(EngineError::invalid("Compute command buffer not recording"))
        }
    }

    fn require_pipeline(&self) -> EngineResult<()> {
        self.require_recording()?;
        if self.current_pipeline.is_some() {
            Ok(())
        } else {
            Err(EngineError::invalid("No compute pipeline bound"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::commands::encoder::test_support::{Recorded, RecordingEncoder};
    use ash::vk::Handle;

    #[test]
    fn test_dispatch_after_pipeline() {
        let mut encoder = RecordingEncoder::default();
        let mut cmd = ComputeCommandBuffer::new(&mut encoder);
        let sets = [vk::DescriptorSet::from_raw(3)];
        cmd.begin_record().unwrap();
        cmd.setup_pipeline(vk::Pipeline::from_raw(1)).unwrap();
        cmd.setup_descriptor_sets(vk::PipelineLayout::null(), &sets).unwrap();
        assert!(!cmd.setup_descriptor_sets(vk::PipelineLayout::null(), &sets).unwrap());
        cmd.dispatch(8, 8, 1).unwrap();
        cmd.end_record().unwrap();

        assert_eq!(
            encoder.commands,
            vec![
                Recorded::Begin,
                Recorded::BindPipeline(vk::PipelineBindPoint::COMPUTE, vk::Pipeline::from_raw(1)),
                Recorded::BindDescriptorSets(vk::PipelineBindPoint::COMPUTE, sets.to_vec()),
                Recorded::Dispatch(8, 8, 1),
                Recorded::End,
            ]
        );
    }

    #[test]
    fn test_descriptor_sets_before_pipeline_fail() {
        let mut encoder = RecordingEncoder::default();
        let mut cmd = ComputeCommandBuffer::new(&mut encoder);
        cmd.begin_record().unwrap();
        assert!(cmd.setup_descriptor_sets(vk::PipelineLayout::null(), &[]).is_err());
        assert!(cmd.dispatch(1, 1, 1).is_err());
    }
}
