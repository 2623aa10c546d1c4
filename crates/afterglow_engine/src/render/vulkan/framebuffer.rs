//! Device-backed attachment images, framebuffers and the framebuffer backend
//!
//! Everything here follows RAII: dropping a value destroys the native objects
//! it owns.

use ash::{vk, Device, Instance};
use log::info;

use super::swapchain::{SurfaceTarget, Swapchain};
use crate::error::{EngineError, EngineResult};
use crate::render::framebuffer_manager::{AttachmentImage, FramebufferBackend, FramebufferObject, ImageRequest};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a single-layer framebuffer
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> EngineResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { device.create_framebuffer(&create_info, None).map_err(EngineError::Api)? };
        Ok(Self { device, framebuffer })
    }
}

impl FramebufferObject for Framebuffer {
    fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Attachment image with its memory, view and sampler
pub struct DeviceImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl DeviceImage {
    /// Allocate device-local memory for `request` and create the view and sampler
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        request: &ImageRequest,
    ) -> EngineResult<Self> {
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D { width: request.extent.width, height: request.extent.height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .format(request.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(request.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(request.samples);

        let mut image = Self {
            image: unsafe { device.create_image(&create_info, None)? },
            device,
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
        };

        let requirements = unsafe { image.device.get_image_memory_requirements(image.image) };
        let memory_type_index = find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            memory_properties,
        )?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        image.memory = unsafe { image.device.allocate_memory(&alloc_info, None)? };
        unsafe { image.device.bind_image_memory(image.image, image.memory, 0)? };

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(request.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: request.aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        image.view = unsafe { image.device.create_image_view(&view_info, None)? };

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(request.address_mode)
            .address_mode_v(request.address_mode)
            .address_mode_w(request.address_mode)
            .max_lod(1.0);
        image.sampler = unsafe { image.device.create_sampler(&sampler_info, None)? };
        Ok(image)
    }

    /// Sampler matching the requested address mode
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl AttachmentImage for DeviceImage {
    fn image(&self) -> vk::Image {
        self.image
    }

    fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for DeviceImage {
    fn drop(&mut self) {
        // null handles are ignored by the destroy calls
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Index of a memory type allowed by `type_filter` with all `properties`
pub fn find_memory_type(
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
) -> EngineResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && memory_properties.memory_types[i as usize].property_flags.contains(properties)
        })
        .ok_or_else(|| EngineError::invalid("Failed to find suitable memory type"))
}

/// [`FramebufferBackend`] creating real images and framebuffers on a device
pub struct DeviceFramebufferBackend {
    instance: Instance,
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    target: SurfaceTarget,
    window_extent: vk::Extent2D,
    swapchain: Option<Swapchain>,
}

impl DeviceFramebufferBackend {
    /// Create the backend and its first swapchain
    pub fn new(
        instance: Instance,
        device: Device,
        target: SurfaceTarget,
        window_extent: vk::Extent2D,
    ) -> EngineResult<Self> {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(target.physical_device) };
        let swapchain = Swapchain::new(&instance, device.clone(), &target, window_extent, vk::SwapchainKHR::null())?;
        Ok(Self {
            instance,
            device,
            memory_properties,
            target,
            window_extent,
            swapchain: Some(swapchain),
        })
    }

    /// Window size used when the surface leaves the swapchain size open
    pub fn set_window_extent(&mut self, extent: vk::Extent2D) {
        self.window_extent = extent;
    }

    /// Current swapchain
    pub fn swapchain(&self) -> EngineResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| EngineError::invalid("Swapchain is being recreated"))
    }
}

impl FramebufferBackend for DeviceFramebufferBackend {
    type Image = DeviceImage;
    type Framebuffer = Framebuffer;

    fn create_image(&mut self, request: &ImageRequest) -> EngineResult<DeviceImage> {
        DeviceImage::new(self.device.clone(), &self.memory_properties, request)
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> EngineResult<Framebuffer> {
        Framebuffer::new(self.device.clone(), render_pass, views, extent)
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map_or(self.window_extent, Swapchain::extent)
    }

    fn swapchain_image_views(&self) -> Vec<vk::ImageView> {
        self.swapchain
            .as_ref()
            .map(|swapchain| swapchain.image_views().to_vec())
            .unwrap_or_default()
    }

    fn acquire_next_image(&mut self, semaphore: vk::Semaphore) -> EngineResult<(u32, bool)> {
        self.swapchain()?.acquire_next_image(semaphore)
    }

    fn recreate_swapchain(&mut self) -> EngineResult<()> {
        let old = self.swapchain.take();
        let old_handle = old.as_ref().map_or(vk::SwapchainKHR::null(), Swapchain::handle);
        let swapchain = Swapchain::new(&self.instance, self.device.clone(), &self.target, self.window_extent, old_handle)?;
        let extent = swapchain.extent();
        self.swapchain = Some(swapchain);
        drop(old);
        info!("Swapchain recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn wait_idle(&self) -> EngineResult<()> {
        unsafe { self.device.device_wait_idle().map_err(EngineError::Api) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_memory_type_respects_filter_and_flags() {
        let mut properties = vk::PhysicalDeviceMemoryProperties { memory_type_count: 3, ..Default::default() };
        properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        properties.memory_types[1].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        properties.memory_types[2].property_flags =
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;

        let local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        assert_eq!(find_memory_type(0b111, local, &properties).unwrap(), 1);
        assert_eq!(find_memory_type(0b100, local, &properties).unwrap(), 2);
        assert!(find_memory_type(0b001, local, &properties).is_err());
    }
}
