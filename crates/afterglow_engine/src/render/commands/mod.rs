//! Command recording for graphics and compute work

pub mod compute;
pub mod draw;
pub mod encoder;

pub use compute::ComputeCommandBuffer;
pub use draw::{DrawCommandBuffer, RecordInfo, INDEXED_INDIRECT_STRIDE, INDIRECT_STRIDE};
pub use encoder::{CommandEncoder, RenderPassBegin};
