//! Screen-space effects writing the presentable image

use ash::vk;

use super::SCENE_COLOR_TEXTURE;
use crate::config::PassSetup;
use crate::error::EngineResult;
use crate::render::domain::Domain;
use crate::render::graph::{depth_attachment, present_attachment, transfer_attachment, PassUsage};
use crate::render::pass_interface::{ColorSlot, ExtentMode, PassInterface};

/// Reads the resolved scene and depth of `prev`, writes the swapchain image
pub fn build(setup: &PassSetup, prev: Option<&PassInterface>) -> EngineResult<PassInterface> {
    let name = Domain::PostProcess.name();
    let mut pass = PassInterface::new(name, ExtentMode::default(), setup.reverse_depth);
    let color_format = pass.color_format();

    let graph = pass.subpass_graph_mut()?;
    let import_color =
        graph.append_attachment(transfer_attachment(color_format, PassUsage::IMPORT, vk::SampleCountFlags::TYPE_1));
    let depth =
        graph.append_depth_attachment(depth_attachment(setup.depth_format, PassUsage::IMPORT, setup.msaa_samples));
    let export = graph.append_attachment(present_attachment(setup.present_format, PassUsage::EXPORT));

    graph.append_subpass(name);
    graph.bind_color_attachment(name, export);
    graph.make_dependency("", name, None)?;

    if let Some(prev) = prev {
        pass.record_import_attachments(prev, ColorSlot::Color, Some(import_color), Some(depth));
    }
    pass.set_export_color_attachment(ColorSlot::Color, export, SCENE_COLOR_TEXTURE, true);
    Ok(pass)
}
