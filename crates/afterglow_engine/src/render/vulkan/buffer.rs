//! Device buffers and the synchronous upload path used by the resource pools
//!
//! Uploads go through a host-visible staging buffer and a one-off command
//! buffer, and block until the queue is idle.

use ash::{vk, Device, Instance};

use super::commands::CommandPool;
use super::framebuffer::{find_memory_type, DeviceImage};
use crate::assets::TextureInfo;
use crate::error::{EngineError, EngineResult};
use crate::render::commands::CommandEncoder;
use crate::render::framebuffer_manager::{AttachmentImage, ImageRequest};
use crate::resources::{BufferUploader, TextureUploader};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory with `properties`
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> EngineResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size.max(1))
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let mut buffer = Self {
            buffer: unsafe { device.create_buffer(&buffer_info, None)? },
            device,
            memory: vk::DeviceMemory::null(),
            size,
        };

        let requirements = unsafe { buffer.device.get_buffer_memory_requirements(buffer.buffer) };
        let memory_type_index = find_memory_type(requirements.memory_type_bits, properties, memory_properties)?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        buffer.memory = unsafe { buffer.device.allocate_memory(&alloc_info, None)? };
        unsafe { buffer.device.bind_buffer_memory(buffer.buffer, buffer.memory, 0)? };
        Ok(buffer)
    }

    /// Copy `bytes` into host-visible memory
    pub fn write_bytes(&self, bytes: &[u8]) -> EngineResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(EngineError::invalid(format!(
                "write of {} bytes into a {} byte buffer",
                bytes.len(),
                self.size
            )));
        }
        if bytes.is_empty() {
            return Ok(());
        }
        unsafe {
            let mapped = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Uploads meshes and textures into device-local memory
pub struct DeviceUploader {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    command_pool: CommandPool,
    queue: vk::Queue,
}

impl DeviceUploader {
    /// Create an uploader submitting to `queue` from a pool on `queue_family_index`
    pub fn new(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        device: Device,
        queue: vk::Queue,
        queue_family_index: u32,
    ) -> EngineResult<Self> {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let command_pool = CommandPool::new(device.clone(), queue_family_index)?;
        Ok(Self { device, memory_properties, command_pool, queue })
    }

    fn staging(&self, bytes: &[u8]) -> EngineResult<Buffer> {
        let staging = Buffer::new(
            self.device.clone(),
            &self.memory_properties,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_bytes(bytes)?;
        Ok(staging)
    }
}

impl BufferUploader for DeviceUploader {
    type Buffer = Buffer;

    fn upload_buffer(&self, bytes: &[u8], usage: vk::BufferUsageFlags) -> EngineResult<Buffer> {
        let staging = self.staging(bytes)?;
        let buffer = Buffer::new(
            self.device.clone(),
            &self.memory_properties,
            staging.size(),
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        if bytes.is_empty() {
            return Ok(buffer);
        }

        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size: staging.size() };
        self.command_pool.run_single_time(self.queue, |encoder| {
            unsafe {
                self.device
                    .cmd_copy_buffer(encoder.handle(), staging.handle(), buffer.handle(), &[region]);
            }
            Ok(())
        })?;
        Ok(buffer)
    }
}

impl TextureUploader for DeviceUploader {
    type Texture = DeviceImage;

    fn upload_texture(&self, info: &TextureInfo, pixels: &[u8]) -> EngineResult<DeviceImage> {
        let format = info.vk_format();
        if format == vk::Format::UNDEFINED {
            return Err(EngineError::Asset(format!(
                "unsupported texel layout {:?} x {:?}",
                info.format, info.channels
            )));
        }
        if info.depth != 1 {
            return Err(EngineError::Asset(format!("3D textures are not supported (depth {})", info.depth)));
        }

        let request = ImageRequest {
            format,
            extent: vk::Extent2D { width: info.width, height: info.height },
            samples: vk::SampleCountFlags::TYPE_1,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            aspect_mask: vk::ImageAspectFlags::COLOR,
            address_mode: vk::SamplerAddressMode::REPEAT,
        };
        let texture = DeviceImage::new(self.device.clone(), &self.memory_properties, &request)?;
        let staging = self.staging(pixels)?;

        let image = texture.image();
        self.command_pool.run_single_time(self.queue, |encoder| {
            encoder.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[layout_transition(
                    image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::AccessFlags::empty(),
                    vk::AccessFlags::TRANSFER_WRITE,
                )],
            );
            let region = vk::BufferImageCopy::builder()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D { width: info.width, height: info.height, depth: 1 })
                .build();
            unsafe {
                self.device.cmd_copy_buffer_to_image(
                    encoder.handle(),
                    staging.handle(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            encoder.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[layout_transition(
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::AccessFlags::SHADER_READ,
                )],
            );
            Ok(())
        })?;
        Ok(texture)
    }
}

fn layout_transition(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access_mask: vk::AccessFlags,
    dst_access_mask: vk::AccessFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access_mask)
        .dst_access_mask(dst_access_mask)
        .build()
}
