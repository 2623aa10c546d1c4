//! Attachment descriptions and pass usage rules
//!
//! Import/Export is the vocabulary between render passes; Input/Output is
//! the vocabulary between subpasses of one render pass.

use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// How an attachment participates in the passes around its own pass
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassUsage: u32 {
        /// Contents come from an earlier pass and must be loaded
        const IMPORT = 1 << 0;
        /// Contents are read by a later pass and must be stored
        const EXPORT = 1 << 1;
        /// Both of the above
        const IMPORT_EXPORT = Self::IMPORT.bits() | Self::EXPORT.bits();
    }
}

impl PassUsage {
    /// Attachment lives only inside its own render pass
    pub const LOCAL: Self = Self::empty();

    /// Loads previous contents
    pub fn imports(self) -> bool {
        self.contains(Self::IMPORT)
    }

    /// Stores contents for later passes
    pub fn exports(self) -> bool {
        self.contains(Self::EXPORT)
    }
}

/// Layout a depth attachment is left in for sampling by later passes
pub const DEPTH_READ_LAYOUT: vk::ImageLayout = vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL;

/// Clear value recorded per attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// RGBA float clear
    Color([f32; 4]),
    /// Depth and stencil clear
    DepthStencil {
        /// Depth value
        depth: f32,
        /// Stencil value
        stencil: u32,
    },
}

impl ClearValue {
    /// Transparent black
    pub const BLACK: Self = Self::Color([0.0; 4]);

    /// Depth clear for the given convention, 0 is far under reverse depth
    pub fn far_depth(reverse_depth: bool) -> Self {
        Self::DepthStencil { depth: if reverse_depth { 0.0 } else { 1.0 }, stencil: 0 }
    }

    /// Native clear value
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Color(float32) => vk::ClearValue { color: vk::ClearColorValue { float32 } },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// All ops don't care, undefined layouts
pub fn empty_attachment(format: vk::Format, samples: vk::SampleCountFlags) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::DONT_CARE)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::UNDEFINED)
        .build()
}

/// Color attachment that ends up sampled by a shader
///
/// Multisampled attachments of this kind never need to be written out when
/// they are not exported, so tilers can keep them on chip.
pub fn transfer_attachment(
    format: vk::Format,
    usage: PassUsage,
    samples: vk::SampleCountFlags,
) -> vk::AttachmentDescription {
    let mut attachment = empty_attachment(format, samples);
    attachment.final_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
    apply_pass_usage(usage, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, &mut attachment);
    attachment
}

/// Color attachment that stays in attachment layout
pub fn non_transfer_attachment(
    format: vk::Format,
    usage: PassUsage,
    samples: vk::SampleCountFlags,
) -> vk::AttachmentDescription {
    let mut attachment = empty_attachment(format, samples);
    attachment.final_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
    apply_pass_usage(usage, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, &mut attachment);
    attachment
}

/// Depth attachment, cleared unless imported
pub fn depth_attachment(
    format: vk::Format,
    usage: PassUsage,
    samples: vk::SampleCountFlags,
) -> vk::AttachmentDescription {
    let mut attachment = empty_attachment(format, samples);
    attachment.load_op = vk::AttachmentLoadOp::CLEAR;
    attachment.final_layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
    apply_pass_usage(usage, DEPTH_READ_LAYOUT, &mut attachment);
    attachment
}

/// Single sampled attachment handed to the presentation engine
pub fn present_attachment(format: vk::Format, usage: PassUsage) -> vk::AttachmentDescription {
    let mut attachment = empty_attachment(format, vk::SampleCountFlags::TYPE_1);
    attachment.store_op = vk::AttachmentStoreOp::STORE;
    attachment.final_layout = vk::ImageLayout::PRESENT_SRC_KHR;
    apply_pass_usage(usage, vk::ImageLayout::PRESENT_SRC_KHR, &mut attachment);
    attachment
}

fn apply_pass_usage(usage: PassUsage, import_layout: vk::ImageLayout, attachment: &mut vk::AttachmentDescription) {
    if usage.imports() {
        attachment.load_op = vk::AttachmentLoadOp::LOAD;
        attachment.initial_layout = import_layout;
    }
    if usage.exports() {
        attachment.store_op = vk::AttachmentStoreOp::STORE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: vk::Format = vk::Format::B10G11R11_UFLOAT_PACK32;

    #[test]
    fn test_local_transfer_attachment_is_not_stored() {
        let attachment = transfer_attachment(FORMAT, PassUsage::LOCAL, vk::SampleCountFlags::TYPE_4);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(attachment.samples, vk::SampleCountFlags::TYPE_4);
    }

    #[test]
    fn test_import_loads_and_export_stores() {
        let imported = transfer_attachment(FORMAT, PassUsage::IMPORT, vk::SampleCountFlags::TYPE_1);
        assert_eq!(imported.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(imported.initial_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(imported.store_op, vk::AttachmentStoreOp::DONT_CARE);

        let both = transfer_attachment(FORMAT, PassUsage::IMPORT_EXPORT, vk::SampleCountFlags::TYPE_1);
        assert_eq!(both.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(both.store_op, vk::AttachmentStoreOp::STORE);
    }

    #[test]
    fn test_depth_clears_unless_imported() {
        let fresh = depth_attachment(vk::Format::D32_SFLOAT, PassUsage::EXPORT, vk::SampleCountFlags::TYPE_4);
        assert_eq!(fresh.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(fresh.store_op, vk::AttachmentStoreOp::STORE);

        let imported = depth_attachment(vk::Format::D32_SFLOAT, PassUsage::IMPORT, vk::SampleCountFlags::TYPE_4);
        assert_eq!(imported.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(imported.initial_layout, DEPTH_READ_LAYOUT);
        assert_eq!(imported.store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn test_present_attachment_always_stores() {
        let attachment = present_attachment(vk::Format::B8G8R8A8_SRGB, PassUsage::LOCAL);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(attachment.samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn test_far_depth_follows_convention() {
        assert_eq!(ClearValue::far_depth(true), ClearValue::DepthStencil { depth: 0.0, stencil: 0 });
        assert_eq!(ClearValue::far_depth(false), ClearValue::DepthStencil { depth: 1.0, stencil: 0 });
    }
}
