//! Interface overlay drawn onto the presented image

use ash::vk;

use super::{exports_color, presents, SCENE_COLOR_TEXTURE};
use crate::config::PassSetup;
use crate::error::EngineResult;
use crate::render::domain::Domain;
use crate::render::graph::{present_attachment, PassUsage};
use crate::render::pass_interface::{ColorSlot, ExtentMode, PassInterface};

/// Loads the presentable image of `prev` and draws on top of it
pub fn build(setup: &PassSetup, prev: Option<&PassInterface>) -> EngineResult<PassInterface> {
    let name = Domain::UserInterface.name();
    let mut pass =
        PassInterface::new(name, ExtentMode::default(), setup.reverse_depth).with_color_format(setup.present_format);
    let color_format = pass.color_format();

    let usage = if exports_color(prev, ColorSlot::Color) { PassUsage::IMPORT_EXPORT } else { PassUsage::EXPORT };
    let mut attachment = present_attachment(color_format, usage);
    if presents(prev) {
        attachment.initial_layout = vk::ImageLayout::PRESENT_SRC_KHR;
    }

    let graph = pass.subpass_graph_mut()?;
    let color = graph.append_attachment(attachment);
    graph.append_subpass(name);
    graph.bind_color_attachment(name, color);
    graph.make_dependency("", name, None)?;

    if let Some(prev) = prev {
        pass.record_import_attachments(prev, ColorSlot::Color, Some(color), None);
    }
    pass.set_export_color_attachment(ColorSlot::Color, color, SCENE_COLOR_TEXTURE, true);
    Ok(pass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::passes::post_process;

    #[test]
    fn test_overlay_loads_presented_image() {
        let setup = PassSetup::default();
        let post = post_process::build(&setup, None).unwrap();
        let pass = build(&setup, Some(&post)).unwrap();
        let attachment = pass.subpass_graph().attachment(0).unwrap();

        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(pass.present_attachment_index(), Some(0));
        assert_eq!(pass.find_import_attachment(0).map(|i| i.src_pass_name.as_str()), Some("PostProcess"));
    }

    #[test]
    fn test_standalone_overlay_clears_nothing_and_stores() {
        let pass = build(&PassSetup::default(), None).unwrap();
        let attachment = pass.subpass_graph().attachment(0).unwrap();
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert!(pass.import_attachments().is_empty());
    }
}
