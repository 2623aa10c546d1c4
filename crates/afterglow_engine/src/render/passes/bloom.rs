//! Bloom pass set
//!
//! Six `DownSampling` passes halve the resolved scene color down to 1/64 of the
//! swapchain size. Six `Bloom` passes then walk back up from 1/64 to 1/2. Each
//! one blurs horizontally in a first subpass, then blurs vertically and adds
//! the next smaller level in a second. The post-process pass finally imports
//! the largest bloom level.
//!
//! ```text
//! Transparency -> DownSampling0 (1/2) -> ... -> DownSampling5 (1/64)
//!                                                      |
//! PostProcess <- Bloom0 (1/2) <- ... <- Bloom4 <- Bloom5 (1/64)
//! ```
//!
//! Every bloom level also imports the downsampled image of its own size.

use ash::vk;
use log::debug;

use crate::config::PassSetup;
use crate::error::{EngineError, EngineResult};
use crate::render::commands::DrawCommandBuffer;
use crate::render::domain::Domain;
use crate::render::graph::{fragment_r_color, transfer_attachment, PassUsage};
use crate::render::material::{draw_material, MaterialDescriptor, MaterialResolver};
use crate::render::pass_interface::{ColorSlot, ExtentMode, PassInterface};
use crate::render::pass_manager::PassManager;
use crate::render::pass_set::PassSet;

/// Number of downsampling and blur levels
pub const BLOOM_LEVELS: usize = 6;

/// Contribution per level, smallest level first
pub const BLOOM_INTENSITIES: [f32; BLOOM_LEVELS] = [0.175, 0.07, 0.06, 0.03, 0.03, 0.02];

const SET_NAME: &str = "Bloom";
const DOWN_SAMPLED_TEXTURE: &str = "downSampledTexture";
const BLOOM_COMBINED_TEXTURE: &str = "bloomCombinedTexture";
const HORIZONTAL_BLUR_TEXTURE: &str = "bloomHorizontalBlurTexture";

const HORIZONTAL_BLUR_SUBPASS: &str = "HorizontalBlur";
const VERTICAL_BLUR_COMBINATION_SUBPASS: &str = "VerticalBlurCombination";

const SCREEN_VERTEX_SHADER: &str = "Shaders/PostProcess_VS.hlsl";
const DOWN_SAMPLING_SHADER: &str = "Shaders/DownSampling_FS.hlsl";
const HORIZONTAL_BLUR_SHADER: &str = "Shaders/HorizontalBlur_FS.hlsl";
const VERTICAL_BLUR_COMBINATION_SHADER: &str = "Shaders/VerticalBlurCombination_FS.hlsl";

/// Swapchain scale of `level`, 1/2 for level 0 down to 1/64 for the last one
pub fn level_scale(level: usize) -> f32 {
    1.0 / (1_u32 << (level + 1)) as f32
}

/// Intensity of `level`; the smallest level contributes the most
pub fn level_intensity(level: usize) -> f32 {
    BLOOM_INTENSITIES[BLOOM_LEVELS - 1 - level]
}

/// Name of the downsampling pass and material of `level`
pub fn down_sampling_name(level: usize) -> String {
    format!("DownSampling{level}")
}

/// Name of the blur pass of `level`
pub fn bloom_pass_name(level: usize) -> String {
    format!("Bloom{level}")
}

/// Name of the horizontal blur material of `level`
pub fn horizontal_blur_name(level: usize) -> String {
    format!("{HORIZONTAL_BLUR_SUBPASS}{level}")
}

/// Name of the vertical blur and combination material of `level`
pub fn vertical_blur_combination_name(level: usize) -> String {
    format!("{VERTICAL_BLUR_COMBINATION_SUBPASS}{level}")
}

/// Downsample and blur chain between transparency and post-processing
pub struct BloomPassSet {
    passes: Vec<PassInterface>,
    // material names per subpass, parallel to `passes`
    pass_materials: Vec<Vec<String>>,
    materials: Vec<MaterialDescriptor>,
    enabled: bool,
}

impl BloomPassSet {
    /// Build every level from the fixed transparency pass
    pub fn new(setup: &PassSetup, manager: &PassManager) -> EngineResult<Self> {
        let import_pass = manager
            .find_pass(Domain::Transparency)
            .ok_or_else(|| EngineError::UnknownPass(Domain::Transparency.name().to_owned()))?;

        let mut set = Self {
            passes: Vec::with_capacity(BLOOM_LEVELS * 2),
            pass_materials: Vec::with_capacity(BLOOM_LEVELS * 2),
            materials: Vec::with_capacity(BLOOM_LEVELS * 3),
            enabled: true,
        };

        for level in 0..BLOOM_LEVELS {
            let src = set.passes.last().unwrap_or(import_pass);
            let pass = down_sampling_pass(setup, level, src)?;
            let material = level_material(down_sampling_name(level), pass.name(), pass.name(), DOWN_SAMPLING_SHADER, level)
                .with_scalar("useCombinedTexture", 1.0);
            set.push(pass, vec![material]);
        }

        for level in (0..BLOOM_LEVELS).rev() {
            let prev = set
                .passes
                .last()
                .ok_or_else(|| EngineError::invalid("Bloom levels need a downsampled source"))?;
            let down_sampling = &set.passes[level];
            let pass = bloom_pass(setup, level, prev, down_sampling)?;
            let use_combined = if level == BLOOM_LEVELS - 1 { 0.0 } else { 1.0 };
            let horizontal = level_material(
                horizontal_blur_name(level),
                pass.name(),
                HORIZONTAL_BLUR_SUBPASS,
                HORIZONTAL_BLUR_SHADER,
                level,
            )
            .with_scalar("useCombinedTexture", 1.0);
            let vertical = level_material(
                vertical_blur_combination_name(level),
                pass.name(),
                VERTICAL_BLUR_COMBINATION_SUBPASS,
                VERTICAL_BLUR_COMBINATION_SHADER,
                level,
            )
            .with_scalar("useCombinedTexture", use_combined);
            set.push(pass, vec![horizontal, vertical]);
        }

        debug!("Bloom pass set built with {} passes", set.passes.len());
        Ok(set)
    }

    fn push(&mut self, pass: PassInterface, materials: Vec<MaterialDescriptor>) {
        self.pass_materials.push(materials.iter().map(|material| material.name.clone()).collect());
        self.materials.extend(materials);
        self.passes.push(pass);
    }

    /// Resume recording
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Stop recording; passes and framebuffers stay in place
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Material names drawn by `pass_name`, one per subpass
    pub fn pass_materials(&self, pass_name: &str) -> Option<&[String]> {
        self.passes
            .iter()
            .position(|pass| pass.name() == pass_name)
            .map(|index| self.pass_materials[index].as_slice())
    }
}

impl PassSet for BloomPassSet {
    fn name(&self) -> &str {
        SET_NAME
    }

    fn begin_domain(&self) -> Domain {
        Domain::Transparency
    }

    fn export_domain(&self) -> Option<Domain> {
        Some(Domain::PostProcess)
    }

    fn connect_export_pass(&self, export_pass: &mut PassInterface) -> EngineResult<()> {
        let last = self
            .passes
            .last()
            .ok_or_else(|| EngineError::invalid("Bloom pass set has no passes"))?;
        let index = export_pass.subpass_graph_mut()?.append_attachment(transfer_attachment(
            last.color_format(),
            PassUsage::IMPORT,
            vk::SampleCountFlags::TYPE_1,
        ));
        export_pass.record_import_attachments(last, ColorSlot::Color, Some(index), None);
        Ok(())
    }

    fn passes(&self) -> &[PassInterface] {
        &self.passes
    }

    fn passes_mut(&mut self) -> &mut [PassInterface] {
        &mut self.passes
    }

    fn materials(&self) -> &[MaterialDescriptor] {
        &self.materials
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn submit_commands(&self, cmd: &mut DrawCommandBuffer<'_>, resolver: &dyn MaterialResolver) -> EngineResult<()> {
        if !self.enabled {
            return Ok(());
        }
        for (pass, materials) in self.passes.iter().zip(&self.pass_materials) {
            cmd.begin_render_pass(pass, 0)?;
            for (subpass, material) in materials.iter().enumerate() {
                if subpass > 0 {
                    cmd.next_subpass()?;
                }
                draw_material(cmd, resolver, material)?;
            }
            cmd.end_render_pass()?;
            cmd.barrier(pass)?;
        }
        Ok(())
    }
}

fn down_sampling_pass(setup: &PassSetup, level: usize, src: &PassInterface) -> EngineResult<PassInterface> {
    let name = down_sampling_name(level);
    let mut pass = PassInterface::new(&name, ExtentMode::Swapchain { scale: level_scale(level) }, setup.reverse_depth);
    let color_format = pass.color_format();

    let graph = pass.subpass_graph_mut()?;
    let import = graph.append_attachment(single_sampled(color_format, PassUsage::IMPORT));
    let export = graph.append_attachment(single_sampled(color_format, PassUsage::EXPORT));
    graph.append_subpass(&name);
    graph.bind_color_attachment(&name, export);
    graph.make_dependency("", &name, None)?;

    pass.record_import_attachments(src, ColorSlot::Color, Some(import), None);
    if level == 0 {
        rename_first_import(&mut pass, DOWN_SAMPLED_TEXTURE);
    }
    pass.set_export_color_attachment(ColorSlot::Color, export, DOWN_SAMPLED_TEXTURE, false);
    Ok(pass)
}

fn bloom_pass(
    setup: &PassSetup,
    level: usize,
    prev: &PassInterface,
    down_sampling: &PassInterface,
) -> EngineResult<PassInterface> {
    let name = bloom_pass_name(level);
    let mut pass = PassInterface::new(&name, ExtentMode::Swapchain { scale: level_scale(level) }, setup.reverse_depth);
    let color_format = pass.color_format();

    let graph = pass.subpass_graph_mut()?;
    let import = graph.append_attachment(single_sampled(color_format, PassUsage::IMPORT));
    let horizontal_blur = graph.append_attachment(single_sampled(color_format, PassUsage::LOCAL));
    let combination = graph.append_attachment(single_sampled(color_format, PassUsage::EXPORT));

    graph.append_subpass(HORIZONTAL_BLUR_SUBPASS);
    graph.bind_color_attachment(HORIZONTAL_BLUR_SUBPASS, horizontal_blur);
    graph.make_dependency("", HORIZONTAL_BLUR_SUBPASS, None)?;

    graph.append_subpass(VERTICAL_BLUR_COMBINATION_SUBPASS);
    graph.bind_input_color_attachment(VERTICAL_BLUR_COMBINATION_SUBPASS, HORIZONTAL_BLUR_TEXTURE, horizontal_blur);
    graph.bind_color_attachment(VERTICAL_BLUR_COMBINATION_SUBPASS, combination);
    graph.make_dependency(HORIZONTAL_BLUR_SUBPASS, VERTICAL_BLUR_COMBINATION_SUBPASS, Some(fragment_r_color))?;

    let down_sampled = graph.append_attachment(single_sampled(color_format, PassUsage::IMPORT));

    pass.record_import_attachments(prev, ColorSlot::Color, Some(import), None);
    pass.record_import_attachments(down_sampling, ColorSlot::Color, Some(down_sampled), None);
    // The smallest level has nothing to combine with, its blur source stands in
    if level == BLOOM_LEVELS - 1 {
        rename_first_import(&mut pass, BLOOM_COMBINED_TEXTURE);
    }
    pass.set_export_color_attachment(ColorSlot::Color, combination, BLOOM_COMBINED_TEXTURE, false);
    Ok(pass)
}

fn single_sampled(format: vk::Format, usage: PassUsage) -> vk::AttachmentDescription {
    transfer_attachment(format, usage, vk::SampleCountFlags::TYPE_1)
}

fn rename_first_import(pass: &mut PassInterface, name: &str) {
    if let Some(import) = pass.import_attachments_mut().first_mut() {
        import.attachment_name = name.to_owned();
    }
}

fn level_material(
    name: String,
    pass_name: &str,
    subpass_name: &str,
    fragment_shader: &str,
    level: usize,
) -> MaterialDescriptor {
    let scale = level_scale(level);
    let intensity = level_intensity(level);
    MaterialDescriptor::new(name, pass_name, subpass_name, SCREEN_VERTEX_SHADER, fragment_shader)
        .with_scalar("resolutionScale", scale)
        .with_scalar("resolutionInvScale", 1.0 / scale)
        .with_vector("bloomIntensity", [intensity, intensity, intensity, 0.0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::commands::encoder::test_support::{Recorded, RecordingEncoder};
    use crate::render::material::test_support::FixedResolver;
    use crate::render::pass_interface::FramebufferBinding;
    use approx::assert_relative_eq;
    use ash::vk::Handle;

    fn bloom() -> BloomPassSet {
        let manager = PassManager::new(PassSetup::default()).unwrap();
        BloomPassSet::new(manager.setup(), &manager).unwrap()
    }

    #[test]
    fn test_pass_names_and_scales() {
        let set = bloom();
        let names: Vec<&str> = set.passes().iter().map(PassInterface::name).collect();
        assert_eq!(
            names,
            [
                "DownSampling0", "DownSampling1", "DownSampling2", "DownSampling3", "DownSampling4", "DownSampling5",
                "Bloom5", "Bloom4", "Bloom3", "Bloom2", "Bloom1", "Bloom0",
            ]
        );
        let scale = |name: &str| set.find_pass(name).unwrap().scale().unwrap();
        assert_relative_eq!(scale("DownSampling0"), 0.5);
        assert_relative_eq!(scale("DownSampling5"), 1.0 / 64.0);
        assert_relative_eq!(scale("Bloom5"), 1.0 / 64.0);
        assert_relative_eq!(scale("Bloom0"), 0.5);
    }

    #[test]
    fn test_material_parameters() {
        let set = bloom();
        assert_eq!(set.materials().len(), BLOOM_LEVELS * 3);

        let smallest = set.find_material("VerticalBlurCombination5").unwrap();
        assert_eq!(smallest.pass_name, "Bloom5");
        assert_eq!(smallest.subpass_name, "VerticalBlurCombination");
        assert_relative_eq!(smallest.scalar("useCombinedTexture").unwrap(), 0.0);
        assert_relative_eq!(smallest.scalar("resolutionInvScale").unwrap(), 64.0);
        assert_eq!(smallest.vector("bloomIntensity"), Some([0.175, 0.175, 0.175, 0.0]));

        let largest = set.find_material("HorizontalBlur0").unwrap();
        assert_relative_eq!(largest.scalar("resolutionScale").unwrap(), 0.5);
        assert_relative_eq!(largest.scalar("useCombinedTexture").unwrap(), 1.0);
        assert_eq!(largest.vector("bloomIntensity"), Some([0.02, 0.02, 0.02, 0.0]));
        assert_eq!(largest.fragment_shader, "Shaders/HorizontalBlur_FS.hlsl");

        let intensities: Vec<f32> = (0..BLOOM_LEVELS)
            .rev()
            .map(|level| set.find_material(&vertical_blur_combination_name(level)).unwrap().vector("bloomIntensity").unwrap()[0])
            .collect();
        assert_eq!(intensities, BLOOM_INTENSITIES);

        let down = set.find_material("DownSampling3").unwrap();
        assert_eq!(down.subpass_name, "DownSampling3");
        assert_eq!(down.vertex_shader, "Shaders/PostProcess_VS.hlsl");
    }

    #[test]
    fn test_imports_follow_the_chain() {
        let set = bloom();

        let first = set.find_pass("DownSampling0").unwrap();
        let import = &first.import_attachments()[0];
        assert_eq!(import.src_pass_name, "Transparency");
        assert_eq!(import.attachment_name, DOWN_SAMPLED_TEXTURE);

        let second = set.find_pass("DownSampling1").unwrap();
        assert_eq!(second.import_attachments()[0].src_pass_name, "DownSampling0");

        let smallest = set.find_pass("Bloom5").unwrap();
        assert_eq!(smallest.import_attachments().len(), 2);
        assert_eq!(smallest.import_attachments()[0].src_pass_name, "DownSampling5");
        assert_eq!(smallest.import_attachments()[0].attachment_name, BLOOM_COMBINED_TEXTURE);
        assert_eq!(smallest.import_attachments()[1].dest_attachment_index, 3);

        let middle = set.find_pass("Bloom3").unwrap();
        assert_eq!(middle.import_attachments()[0].src_pass_name, "Bloom4");
        assert_eq!(middle.import_attachments()[0].attachment_name, BLOOM_COMBINED_TEXTURE);
        assert_eq!(middle.import_attachments()[1].src_pass_name, "DownSampling3");
        assert_eq!(middle.import_attachments()[1].attachment_name, DOWN_SAMPLED_TEXTURE);

        let graph = middle.subpass_graph();
        assert_eq!(graph.subpass_count(), 2);
        assert_eq!(graph.input_attachments()[0].name, HORIZONTAL_BLUR_TEXTURE);
        assert_eq!(graph.dependencies()[1].dst_access_mask, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_submit_records_named_materials() {
        let mut set = bloom();
        for pass in set.passes_mut() {
            pass.finalize();
            pass.set_framebuffers(vec![FramebufferBinding {
                handle: vk::Framebuffer::from_raw(1),
                extent: vk::Extent2D { width: 8, height: 8 },
            }]);
        }
        let names: Vec<String> = set.materials().iter().map(|m| m.name.clone()).collect();
        let resolver = FixedResolver::with_materials(names.iter().map(String::as_str));

        let mut encoder = RecordingEncoder::default();
        let mut cmd = DrawCommandBuffer::new(&mut encoder, true);
        cmd.begin_record().unwrap();
        set.submit_commands(&mut cmd, &resolver).unwrap();
        cmd.end_record().unwrap();

        assert_eq!(encoder.count(|c| matches!(c, Recorded::BeginRenderPass { .. })), BLOOM_LEVELS * 2);
        assert_eq!(encoder.count(|c| matches!(c, Recorded::NextSubpass)), BLOOM_LEVELS);
        assert_eq!(encoder.count(|c| matches!(c, Recorded::DrawIndexed { .. })), BLOOM_LEVELS * 3);
        assert_eq!(set.pass_materials("Bloom2"), Some(&["HorizontalBlur2".to_owned(), "VerticalBlurCombination2".to_owned()][..]));
    }

    #[test]
    fn test_disabled_set_records_nothing() {
        let mut set = bloom();
        set.disable();
        assert!(!set.is_enabled());

        let mut encoder = RecordingEncoder::default();
        let mut cmd = DrawCommandBuffer::new(&mut encoder, true);
        cmd.begin_record().unwrap();
        set.submit_commands(&mut cmd, &FixedResolver::default()).unwrap();
        cmd.end_record().unwrap();
        assert_eq!(encoder.commands, vec![Recorded::Begin, Recorded::End]);

        set.enable();
        assert!(set.is_enabled());
    }
}
