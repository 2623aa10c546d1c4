//! GPU images and framebuffers behind every pass
//!
//! Images are allocated per pass in attachment order. An imported attachment
//! reuses the `Rc` of the image built for the source pass, so passes must be
//! rebuilt in [`PassManager`] visit order. The present attachment gets a proxy
//! image for its export barrier, but its framebuffer slot is filled with the
//! swapchain's own view, one framebuffer per swapchain image.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use ash::vk;
use log::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::render::pass_interface::{ExtentMode, FramebufferBinding, PassInterface};
use crate::render::pass_manager::PassManager;

/// Image with a view usable as a framebuffer attachment
pub trait AttachmentImage {
    /// Native image
    fn image(&self) -> vk::Image;
    /// View covering the whole image
    fn view(&self) -> vk::ImageView;
}

/// Framebuffer object owned by the backend
pub trait FramebufferObject {
    /// Native framebuffer
    fn handle(&self) -> vk::Framebuffer;
}

/// Parameters of one attachment image; samplers always clamp to edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRequest {
    /// Pixel format
    pub format: vk::Format,
    /// Size in texels
    pub extent: vk::Extent2D,
    /// Sample count
    pub samples: vk::SampleCountFlags,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Aspect of the view
    pub aspect_mask: vk::ImageAspectFlags,
    /// Address mode of the sampler created with the image
    pub address_mode: vk::SamplerAddressMode,
}

impl ImageRequest {
    /// Color attachment, readable by later passes when `sampled`
    pub fn color(format: vk::Format, extent: vk::Extent2D, samples: vk::SampleCountFlags, sampled: bool) -> Self {
        let usage = if sampled {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::INPUT_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        };
        Self {
            format,
            extent,
            samples,
            usage,
            aspect_mask: vk::ImageAspectFlags::COLOR,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        }
    }

    /// Depth attachment, always readable by later passes
    pub fn depth(format: vk::Format, extent: vk::Extent2D, samples: vk::SampleCountFlags) -> Self {
        Self {
            format,
            extent,
            samples,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            aspect_mask: vk::ImageAspectFlags::DEPTH,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        }
    }
}

/// Device side of framebuffer management
pub trait FramebufferBackend {
    /// Attachment image type
    type Image: AttachmentImage;
    /// Framebuffer type
    type Framebuffer: FramebufferObject;

    /// Allocate an attachment image
    fn create_image(&mut self, request: &ImageRequest) -> EngineResult<Self::Image>;

    /// Create a framebuffer from positional attachment views
    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> EngineResult<Self::Framebuffer>;

    /// Current swapchain size
    fn swapchain_extent(&self) -> vk::Extent2D;

    /// One view per swapchain image
    fn swapchain_image_views(&self) -> Vec<vk::ImageView>;

    /// Acquire the next swapchain image; the flag reports a suboptimal swapchain
    fn acquire_next_image(&mut self, semaphore: vk::Semaphore) -> EngineResult<(u32, bool)>;

    /// Rebuild the swapchain for the current surface size
    fn recreate_swapchain(&mut self) -> EngineResult<()>;

    /// Block until the device is idle
    fn wait_idle(&self) -> EngineResult<()>;
}

/// Builds and rebuilds the images and framebuffers of every pass
pub struct FramebufferManager<B: FramebufferBackend> {
    backend: B,
    images: HashMap<String, Vec<Rc<B::Image>>>,
    framebuffers: HashMap<String, Vec<B::Framebuffer>>,
    swapchain_image_set_outdated: bool,
}

impl<B: FramebufferBackend> FramebufferManager<B> {
    /// Manager without any images
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            images: HashMap::new(),
            framebuffers: HashMap::new(),
            swapchain_image_set_outdated: false,
        }
    }

    /// Device backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable device backend
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Images of `pass_name` in attachment order
    pub fn images(&self, pass_name: &str) -> Option<&[Rc<B::Image>]> {
        self.images.get(pass_name).map(Vec::as_slice)
    }

    /// Image behind attachment `index` of `pass_name`
    pub fn image(&self, pass_name: &str, index: u32) -> Option<&Rc<B::Image>> {
        self.images.get(pass_name).and_then(|images| images.get(index as usize))
    }

    /// Rebuild images, export barriers and framebuffers of one pass
    ///
    /// Every pass this one imports from must already have been built.
    pub fn recreate_pass_framebuffers(&mut self, passes: &mut PassManager, pass_name: &str) -> EngineResult<()> {
        self.images.remove(pass_name);
        let swapchain_extent = self.backend.swapchain_extent();

        let pass = passes
            .find_pass_by_name(pass_name)
            .ok_or_else(|| EngineError::UnknownPass(pass_name.to_owned()))?;
        let extent = pass.resolve_extent(swapchain_extent);
        let images = self.build_images(pass, extent)?;
        let render_pass = pass.render_pass_handle();
        let present_index = pass.present_attachment_index();

        let mut framebuffers = Vec::new();
        match present_index {
            Some(present_index) => {
                for swapchain_view in self.backend.swapchain_image_views() {
                    let views = attachment_views(&images, Some((present_index, swapchain_view)));
                    framebuffers.push(self.backend.create_framebuffer(render_pass, &views, extent)?);
                }
            }
            None => {
                let views = attachment_views(&images, None);
                framebuffers.push(self.backend.create_framebuffer(render_pass, &views, extent)?);
            }
        }

        let is_final = passes.is_final_pass(pass_name);
        let pass = passes
            .find_pass_by_name_mut(pass_name)
            .ok_or_else(|| EngineError::UnknownPass(pass_name.to_owned()))?;
        pass.clear_barriers();
        // nothing reads the exports of the last pass
        if !is_final {
            let color_exports: Vec<u32> = pass.export_colors().map(|(_, export)| export.index).collect();
            for index in color_exports {
                pass.append_color_barrier(exported_image(&images, pass_name, index)?.image(), index)?;
            }
            if let Some(index) = pass.export_depth().map(|export| export.index) {
                pass.append_depth_barrier(exported_image(&images, pass_name, index)?.image())?;
            }
        }
        pass.set_framebuffers(
            framebuffers
                .iter()
                .map(|framebuffer| FramebufferBinding { handle: framebuffer.handle(), extent })
                .collect(),
        );

        debug!(
            "Pass {pass_name}: {} images, {} framebuffers at {}x{}",
            images.len(),
            framebuffers.len(),
            extent.width,
            extent.height
        );
        self.images.insert(pass_name.to_owned(), images);
        self.framebuffers.insert(pass_name.to_owned(), framebuffers);
        Ok(())
    }

    fn build_images(&mut self, pass: &PassInterface, extent: vk::Extent2D) -> EngineResult<Vec<Rc<B::Image>>> {
        let graph = pass.subpass_graph();
        let mut images = Vec::with_capacity(graph.attachment_count());
        for (index, attachment) in (0u32..).zip(graph.attachments()) {
            if let Some(import) = pass.find_import_attachment(index) {
                let image = self
                    .images
                    .get(&import.src_pass_name)
                    .ok_or_else(|| EngineError::UnknownPass(import.src_pass_name.clone()))?
                    .get(import.src_attachment_index as usize)
                    .ok_or_else(|| {
                        EngineError::invalid(format!(
                            "Pass {} imports missing attachment {} of {}",
                            pass.name(),
                            import.src_attachment_index,
                            import.src_pass_name
                        ))
                    })?;
                images.push(Rc::clone(image));
                continue;
            }
            let request = if graph.is_depth_attachment(index) {
                ImageRequest::depth(attachment.format, extent, attachment.samples)
            } else {
                let sampled = attachment.final_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                    || pass.present_attachment_index() == Some(index);
                ImageRequest::color(attachment.format, extent, attachment.samples, sampled)
            };
            images.push(Rc::new(self.backend.create_image(&request)?));
        }
        Ok(images)
    }

    /// Rebuild every pass in visit order
    pub fn recreate_all_framebuffers(&mut self, passes: &mut PassManager) -> EngineResult<()> {
        self.backend.wait_idle()?;
        for name in passes.pass_names() {
            self.recreate_pass_framebuffers(passes, &name)?;
        }
        self.swapchain_image_set_outdated = true;
        info!("Framebuffers created for {} passes", self.framebuffers.len());
        Ok(())
    }

    /// Rebuild passes sized from the swapchain and every pass importing from one of them
    pub fn recreate_swapchain_framebuffers(&mut self, passes: &mut PassManager) -> EngineResult<()> {
        self.backend.wait_idle()?;
        let mut rebuilt = HashSet::new();
        for name in passes.pass_names() {
            let Some(pass) = passes.find_pass_by_name(&name) else {
                continue;
            };
            let follows_swapchain = matches!(pass.extent_mode(), ExtentMode::Swapchain { .. });
            let imports_rebuilt = pass
                .import_attachments()
                .iter()
                .any(|import| rebuilt.contains(&import.src_pass_name));
            if follows_swapchain || imports_rebuilt {
                self.recreate_pass_framebuffers(passes, &name)?;
                rebuilt.insert(name);
            }
        }
        self.swapchain_image_set_outdated = true;
        info!("Rebuilt framebuffers of {} passes after swapchain change", rebuilt.len());
        Ok(())
    }

    /// Whether images changed since the last call; resets the flag
    pub fn take_swapchain_image_set_outdated_flag(&mut self) -> bool {
        std::mem::take(&mut self.swapchain_image_set_outdated)
    }

    /// Acquire the next swapchain image
    ///
    /// Returns `Ok(None)` when the swapchain was out of date. It has been
    /// rebuilt by then and the caller should skip the frame.
    pub fn acquire_next_image(
        &mut self,
        passes: &mut PassManager,
        semaphore: vk::Semaphore,
    ) -> EngineResult<Option<u32>> {
        match self.backend.acquire_next_image(semaphore) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("Swapchain is suboptimal, drawing image {index} anyway");
                }
                Ok(Some(index))
            }
            Err(err) if err.is_retryable() => {
                warn!("Swapchain out of date, rebuilding and skipping the frame");
                self.recreate_swapchain(passes)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Rebuild the swapchain and every framebuffer that depends on it
    pub fn recreate_swapchain(&mut self, passes: &mut PassManager) -> EngineResult<()> {
        self.backend.wait_idle()?;
        self.backend.recreate_swapchain()?;
        self.recreate_swapchain_framebuffers(passes)
    }
}

fn exported_image<'a, I>(images: &'a [Rc<I>], pass_name: &str, index: u32) -> EngineResult<&'a Rc<I>> {
    images.get(index as usize).ok_or_else(|| {
        EngineError::invalid(format!(
            "Pass {pass_name} exports attachment {index} but has {} attachments",
            images.len()
        ))
    })
}

fn attachment_views<I: AttachmentImage>(
    images: &[Rc<I>],
    present: Option<(u32, vk::ImageView)>,
) -> Vec<vk::ImageView> {
    (0u32..)
        .zip(images)
        .map(|(index, image)| match present {
            Some((present_index, swapchain_view)) if present_index == index => swapchain_view,
            _ => image.view(),
        })
        .collect()
}
