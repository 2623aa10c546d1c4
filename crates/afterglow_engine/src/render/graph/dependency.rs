//! Subpass dependency presets

use ash::vk;

/// Stages where attachment writes happen
const ATTACHMENT_OUTPUT_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT.as_raw()
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS.as_raw(),
);

const ATTACHMENT_WRITE_ACCESS: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw() | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
);

/// Signature shared by the dependency presets, `(src, dst)` subpass indices
pub type DependencyPreset = fn(u32, u32) -> vk::SubpassDependency;

fn dependency(src: u32, dst: u32) -> vk::SubpassDependency {
    vk::SubpassDependency::builder().src_subpass(src).dst_subpass(dst).build()
}

/// Dependency from outside the render pass into its first writer
pub fn first_dependency(dst: u32) -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(dst)
        .src_stage_mask(ATTACHMENT_OUTPUT_STAGES)
        .dst_stage_mask(ATTACHMENT_OUTPUT_STAGES)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(ATTACHMENT_WRITE_ACCESS)
        .build()
}

/// Later subpass reads and writes both color and depth
pub fn fragment_rw(src: u32, dst: u32) -> vk::SubpassDependency {
    let mut result = dependency(src, dst);
    result.src_stage_mask = ATTACHMENT_OUTPUT_STAGES;
    result.dst_stage_mask = ATTACHMENT_OUTPUT_STAGES | vk::PipelineStageFlags::FRAGMENT_SHADER;
    result.src_access_mask = ATTACHMENT_WRITE_ACCESS;
    result.dst_access_mask = ATTACHMENT_WRITE_ACCESS | vk::AccessFlags::SHADER_READ;
    result
}

/// Later subpass reads and writes color, only reads depth
pub fn fragment_rw_color_r_depth(src: u32, dst: u32) -> vk::SubpassDependency {
    let mut result = fragment_rw(src, dst);
    result.dst_access_mask = vk::AccessFlags::SHADER_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    result
}

/// Later subpass samples the color written before it
pub fn fragment_r_color(src: u32, dst: u32) -> vk::SubpassDependency {
    let mut result = dependency(src, dst);
    result.src_stage_mask = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    result.dst_stage_mask = vk::PipelineStageFlags::FRAGMENT_SHADER;
    result.src_access_mask = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    result.dst_access_mask = vk::AccessFlags::SHADER_READ;
    result
}

/// Both subpasses write color
pub fn fragment_w_color(src: u32, dst: u32) -> vk::SubpassDependency {
    let mut result = dependency(src, dst);
    result.src_stage_mask = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    result.dst_stage_mask = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    result.src_access_mask = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    result.dst_access_mask = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_dependency_is_external() {
        let dep = first_dependency(0);
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert!(dep.src_access_mask.is_empty());
        assert!(dep.dst_access_mask.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_color_read_only_variant_drops_depth_write() {
        let dep = fragment_rw_color_r_depth(0, 1);
        assert!(dep.dst_stage_mask.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
        assert!(!dep.dst_access_mask.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(fragment_rw(0, 1).dst_access_mask.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_read_color_preset() {
        let dep = fragment_r_color(1, 2);
        assert_eq!((dep.src_subpass, dep.dst_subpass), (1, 2));
        assert_eq!(dep.dst_access_mask, vk::AccessFlags::SHADER_READ);
    }
}
