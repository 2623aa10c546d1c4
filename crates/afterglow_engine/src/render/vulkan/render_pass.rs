//! Render pass management
//!
//! Owns the native render pass built from a frozen subpass graph, following
//! RAII principles. The graph stays attached so framebuffers and command
//! recording can query attachments and clear values afterwards.

use ash::{vk, Device};

use crate::error::{EngineError, EngineResult};
use crate::render::graph::{SubpassGraph, SubpassGraphSnapshot};

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    snapshot: SubpassGraphSnapshot,
    render_pass: vk::RenderPass,
    device: Option<Device>,
}

impl RenderPass {
    /// Wrap a snapshot; the native object is created by [`RenderPass::build`]
    pub fn new(snapshot: SubpassGraphSnapshot) -> Self {
        Self { snapshot, render_pass: vk::RenderPass::null(), device: None }
    }

    /// Create the native render pass
    pub fn build(&mut self, device: &Device) -> EngineResult<()> {
        if self.is_built() {
            return Err(EngineError::invalid("Render pass already built"));
        }
        let create_info = self.snapshot.create_info();
        let render_pass = unsafe { device.create_render_pass(&create_info, None).map_err(EngineError::Api)? };
        self.render_pass = render_pass;
        self.device = Some(device.clone());
        Ok(())
    }

    /// Whether the native object exists
    pub fn is_built(&self) -> bool {
        self.device.is_some()
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Frozen declaration this pass was built from
    pub fn snapshot(&self) -> &SubpassGraphSnapshot {
        &self.snapshot
    }

    /// Attachments and subpasses
    pub fn subpass_graph(&self) -> &SubpassGraph {
        self.snapshot.graph()
    }

    /// Clear values for render pass begin, in attachment order
    pub fn clear_values(&self) -> Vec<vk::ClearValue> {
        self.snapshot.clear_values()
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        if let Some(device) = self.device.take() {
            unsafe {
                device.destroy_render_pass(self.render_pass, None);
            }
        }
    }
}

impl std::fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("render_pass", &self.render_pass)
            .field("built", &self.is_built())
            .field("snapshot", &self.snapshot)
            .finish()
    }
}
