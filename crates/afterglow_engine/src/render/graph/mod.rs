//! Render pass declaration: attachments, subpasses and dependencies

pub mod attachment;
pub mod dependency;
pub mod subpass_graph;

pub use attachment::{
    depth_attachment, empty_attachment, non_transfer_attachment, present_attachment, transfer_attachment,
    ClearValue, PassUsage, DEPTH_READ_LAYOUT,
};
pub use dependency::{
    first_dependency, fragment_r_color, fragment_rw, fragment_rw_color_r_depth, fragment_w_color, DependencyPreset,
};
pub use subpass_graph::{
    InputAttachmentInfo, InputAttachmentKind, SubpassGraph, SubpassGraphSnapshot, SubpassRecord,
};
