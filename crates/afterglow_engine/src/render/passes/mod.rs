//! Built-in passes and pass sets
//!
//! Every fixed pass is built from the pass before it so it can import that
//! pass's color and depth exports. The chain is
//! `Forward -> Transparency -> PostProcess -> UserInterface`.

pub mod bloom;
pub mod forward;
pub mod post_process;
pub mod transparency;
pub mod user_interface;

use crate::render::pass_interface::{ColorSlot, PassInterface};

pub use bloom::{BloomPassSet, BLOOM_INTENSITIES, BLOOM_LEVELS};

/// Multisampled scene color export
pub const SCENE_COLOR_MS_TEXTURE: &str = "sceneColorMSTexture";
/// Resolved scene color export
pub const SCENE_COLOR_TEXTURE: &str = "sceneColorTexture";
/// Scene depth export
pub const DEPTH_TEXTURE: &str = "depthTexture";

fn exports_color(prev: Option<&PassInterface>, slot: ColorSlot) -> bool {
    prev.is_some_and(|pass| pass.export_color(slot).is_some())
}

fn exports_depth(prev: Option<&PassInterface>) -> bool {
    prev.is_some_and(|pass| pass.export_depth().is_some())
}

fn presents(prev: Option<&PassInterface>) -> bool {
    prev.is_some_and(|pass| pass.present_attachment_index().is_some())
}
