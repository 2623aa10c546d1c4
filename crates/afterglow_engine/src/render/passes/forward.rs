//! Opaque scene pass

use ash::vk;

use super::{exports_color, exports_depth, DEPTH_TEXTURE, SCENE_COLOR_MS_TEXTURE, SCENE_COLOR_TEXTURE};
use crate::config::PassSetup;
use crate::error::EngineResult;
use crate::render::domain::Domain;
use crate::render::graph::{depth_attachment, transfer_attachment, PassUsage};
use crate::render::pass_interface::{ColorSlot, ExtentMode, PassInterface};

/// Multisampled color and depth resolved into a single-sampled color export
pub fn build(setup: &PassSetup, prev: Option<&PassInterface>) -> EngineResult<PassInterface> {
    let name = Domain::Forward.name();
    let mut pass = PassInterface::new(name, ExtentMode::default(), setup.reverse_depth);
    let color_format = pass.color_format();

    let color_usage =
        if exports_color(prev, ColorSlot::ColorMs) { PassUsage::IMPORT_EXPORT } else { PassUsage::EXPORT };
    let depth_usage = if exports_depth(prev) { PassUsage::IMPORT_EXPORT } else { PassUsage::EXPORT };

    let graph = pass.subpass_graph_mut()?;
    let color = graph.append_attachment(transfer_attachment(color_format, color_usage, setup.msaa_samples));
    let depth = graph.append_depth_attachment(depth_attachment(setup.depth_format, depth_usage, setup.msaa_samples));
    let resolve =
        graph.append_attachment(transfer_attachment(color_format, PassUsage::EXPORT, vk::SampleCountFlags::TYPE_1));

    graph.append_subpass(name);
    graph.bind_color_attachment(name, color);
    graph.bind_depth_attachment(name, depth);
    graph.bind_resolve_attachment(name, resolve);
    graph.make_dependency("", name, None)?;

    if let Some(prev) = prev {
        pass.record_import_attachments(prev, ColorSlot::ColorMs, Some(color), Some(depth));
    }
    pass.set_export_depth_attachment(depth, DEPTH_TEXTURE);
    pass.set_export_color_attachment(ColorSlot::ColorMs, color, SCENE_COLOR_MS_TEXTURE, false);
    pass.set_export_color_attachment(ColorSlot::Color, resolve, SCENE_COLOR_TEXTURE, false);
    Ok(pass)
}
