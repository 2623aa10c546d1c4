//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences, plus the [`Synchronizer`] that
//! owns one set of them per frame in flight.
//!
//! # Frames in flight
//!
//! The CPU records frame *i + 1* while the GPU may still execute frame *i*.
//! Each frame slot therefore owns its own objects:
//!
//! ```text
//! ImageAvailable   acquire  -> render submit
//! RenderFinished   render   -> present
//! ComputeFinished  compute  -> render submit
//! RenderInFlight   render submit  -> CPU reuse of the frame's command buffer
//! ComputeInFlight  compute submit -> CPU reuse of the frame's command buffer
//! ```
//!
//! Resource pools do not hold fences themselves. They block through the
//! [`FenceWaiter`] trait before destroying anything the GPU may still read.

use ash::{vk, Device};

use crate::error::{EngineError, EngineResult};

/// Semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> EngineResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None).map_err(EngineError::Api)? };
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> EngineResult<Self> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None).map_err(EngineError::Api)? };
        Ok(Self { device, fence })
    }

    /// Wait for fence
    pub fn wait(&self, timeout: u64) -> EngineResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout).map_err(EngineError::Api) }
    }

    /// Reset fence
    pub fn reset(&self) -> EngineResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(EngineError::Api) }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Per-frame semaphores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreFlag {
    /// Swapchain image acquired
    ImageAvailable,
    /// Graphics work finished
    RenderFinished,
    /// Compute work finished
    ComputeFinished,
}

/// Per-frame fences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceFlag {
    /// Graphics submission of the frame still executing
    RenderInFlight,
    /// Compute submission of the frame still executing
    ComputeInFlight,
}

/// Blocks until GPU work guarded by a fence has completed
pub trait FenceWaiter {
    /// Wait for `flag` on every frame in flight
    fn wait_fence(&self, flag: FenceFlag) -> EngineResult<()>;
}

/// Synchronization objects of one frame slot
pub struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    compute_finished: Semaphore,
    render_in_flight: Fence,
    compute_in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects; fences start signaled
    pub fn new(device: &Device) -> EngineResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            compute_finished: Semaphore::new(device.clone())?,
            render_in_flight: Fence::new(device.clone(), true)?,
            compute_in_flight: Fence::new(device.clone(), true)?,
        })
    }

    /// Semaphore for `flag`
    pub fn semaphore(&self, flag: SemaphoreFlag) -> &Semaphore {
        match flag {
            SemaphoreFlag::ImageAvailable => &self.image_available,
            SemaphoreFlag::RenderFinished => &self.render_finished,
            SemaphoreFlag::ComputeFinished => &self.compute_finished,
        }
    }

    /// Fence for `flag`
    pub fn fence(&self, flag: FenceFlag) -> &Fence {
        match flag {
            FenceFlag::RenderInFlight => &self.render_in_flight,
            FenceFlag::ComputeInFlight => &self.compute_in_flight,
        }
    }
}

/// Synchronization objects for every frame in flight
pub struct Synchronizer {
    frames: Vec<FrameSync>,
    current_frame: usize,
}

impl Synchronizer {
    /// Create `frames_in_flight` frame slots
    pub fn new(device: &Device, frames_in_flight: usize) -> EngineResult<Self> {
        if frames_in_flight == 0 {
            return Err(EngineError::invalid("At least one frame in flight is required"));
        }
        let frames = (0..frames_in_flight)
            .map(|_| FrameSync::new(device))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self { frames, current_frame: 0 })
    }

    /// Index of the frame slot being recorded
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Move on to the next frame slot
    pub fn advance_frame(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.frames.len();
    }

    fn current(&self) -> &FrameSync {
        &self.frames[self.current_frame]
    }

    /// Current frame's semaphore
    pub fn semaphore(&self, flag: SemaphoreFlag) -> vk::Semaphore {
        self.current().semaphore(flag).handle()
    }

    /// Current frame's fence
    pub fn fence(&self, flag: FenceFlag) -> vk::Fence {
        self.current().fence(flag).handle()
    }

    /// Block on the current frame's fence
    pub fn wait(&self, flag: FenceFlag) -> EngineResult<()> {
        self.current().fence(flag).wait(u64::MAX)
    }

    /// Reset the current frame's fence before resubmitting
    pub fn reset(&self, flag: FenceFlag) -> EngineResult<()> {
        self.current().fence(flag).reset()
    }
}

impl FenceWaiter for Synchronizer {
    fn wait_fence(&self, flag: FenceFlag) -> EngineResult<()> {
        self.frames.iter().try_for_each(|frame| frame.fence(flag).wait(u64::MAX))
    }
}
