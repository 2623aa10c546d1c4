//! Swapchain creation and recreation

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};
use log::debug;

use crate::error::{EngineError, EngineResult};

/// Surface the swapchain presents to, owned by the caller
#[derive(Clone)]
pub struct SurfaceTarget {
    /// Surface handle
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader
    pub loader: Surface,
    /// Physical device presenting to the surface
    pub physical_device: vk::PhysicalDevice,
}

/// Swapchain wrapper with RAII cleanup of the swapchain and its views
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain, retiring `old_swapchain` when it is not null
    pub fn new(
        instance: &Instance,
        device: Device,
        target: &SurfaceTarget,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> EngineResult<Self> {
        let loader = SwapchainLoader::new(instance, &device);
        let (caps, formats, present_modes) = unsafe {
            let caps = target
                .loader
                .get_physical_device_surface_capabilities(target.physical_device, target.surface)?;
            let formats = target
                .loader
                .get_physical_device_surface_formats(target.physical_device, target.surface)?;
            let present_modes = target
                .loader
                .get_physical_device_surface_present_modes(target.physical_device, target.surface)?;
            (caps, formats, present_modes)
        };

        let format = choose_format(&formats)
            .ok_or_else(|| EngineError::invalid("Surface reports no formats"))?;
        let present_mode = present_modes
            .iter()
            .copied()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);
        let extent = choose_extent(&caps, window_extent);
        let image_count = if caps.max_image_count > 0 {
            (caps.min_image_count + 1).min(caps.max_image_count)
        } else {
            caps.min_image_count + 1
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(target.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };
        let images = unsafe { loader.get_swapchain_images(swapchain)? };
        let mut swapchain = Self {
            device,
            loader,
            swapchain,
            images,
            image_views: Vec::new(),
            format,
            extent,
        };
        // views pushed one by one so a failure still destroys the ones created so far
        for index in 0..swapchain.images.len() {
            let view = color_view(&swapchain.device, swapchain.images[index], format.format)?;
            swapchain.image_views.push(view);
        }

        debug!(
            "Swapchain created: {} images, {:?}, {}x{}, {:?}",
            swapchain.images.len(),
            format.format,
            extent.width,
            extent.height,
            present_mode
        );
        Ok(swapchain)
    }

    /// Acquire the next image; the flag reports a suboptimal swapchain
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> EngineResult<(u32, bool)> {
        unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
                .map_err(EngineError::Api)
        }
    }

    /// Present `image_index` once `wait_semaphore` signals
    pub fn present(&self, queue: vk::Queue, wait_semaphore: vk::Semaphore, image_index: u32) -> EngineResult<bool> {
        let swapchains = [self.swapchain];
        let wait_semaphores = [wait_semaphore];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.loader.queue_present(queue, &present_info).map_err(EngineError::Api) }
    }

    /// Swapchain size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Swapchain images
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One view per image
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn choose_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window_extent
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window_extent
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn color_view(device: &Device, image: vk::Image, format: vk::Format) -> EngineResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe { device.create_image_view(&create_info, None).map_err(EngineError::Api) }
}
