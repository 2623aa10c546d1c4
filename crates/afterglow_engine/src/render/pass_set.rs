//! Multi-pass units installed next to the fixed passes

use crate::error::EngineResult;
use crate::render::commands::DrawCommandBuffer;
use crate::render::domain::Domain;
use crate::render::material::{MaterialDescriptor, MaterialResolver};
use crate::render::pass_interface::PassInterface;

/// Group of passes visited right after the fixed pass of [`PassSet::begin_domain`]
pub trait PassSet {
    /// Set name
    fn name(&self) -> &str;

    /// Fixed pass this set follows
    fn begin_domain(&self) -> Domain;

    /// Fixed pass that consumes the set's output, if any
    fn export_domain(&self) -> Option<Domain> {
        None
    }

    /// Add the attachments and imports `export_pass` needs to read the set's output
    fn connect_export_pass(&self, _export_pass: &mut PassInterface) -> EngineResult<()> {
        Ok(())
    }

    /// Passes in execution order
    fn passes(&self) -> &[PassInterface];

    /// Mutable passes in execution order
    fn passes_mut(&mut self) -> &mut [PassInterface];

    /// Materials the set draws with
    fn materials(&self) -> &[MaterialDescriptor];

    /// Whether commands are recorded
    fn is_enabled(&self) -> bool;

    /// Toggle command recording
    fn set_enabled(&mut self, enabled: bool);

    /// Record every pass of the set
    fn submit_commands(&self, cmd: &mut DrawCommandBuffer<'_>, resolver: &dyn MaterialResolver) -> EngineResult<()>;

    /// Pass by name
    fn find_pass(&self, name: &str) -> Option<&PassInterface> {
        self.passes().iter().find(|pass| pass.name() == name)
    }

    /// Material by name
    fn find_material(&self, name: &str) -> Option<&MaterialDescriptor> {
        self.materials().iter().find(|material| material.name == name)
    }
}
