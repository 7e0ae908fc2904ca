// Synchronization primitives
//
// Fences for GPU-CPU sync, semaphores for GPU-GPU sync

use anyhow::{Context, Result};
use ash::vk;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    /// Signaled by acquire, waited on by the submit
    pub image_available: vk::Semaphore,
    /// Signaled by the submit, waited on by present
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
        };

        if let Err(e) = sync.create_objects(device) {
            sync.destroy(device);
            return Err(e).context("Failed to create frame sync objects");
        }

        Ok(sync)
    }

    fn create_objects(&mut self, device: &ash::Device) -> Result<(), vk::Result> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the first wait returns immediately
        let fence_info = vk::FenceCreateInfo::builder()
            .flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            self.image_available = device.create_semaphore(&semaphore_info, None)?;
            self.render_finished = device.create_semaphore(&semaphore_info, None)?;
            self.in_flight_fence = device.create_fence(&fence_info, None)?;
        }
        Ok(())
    }

    pub fn wait(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.wait_for_fences(&[self.in_flight_fence], true, u64::MAX) }
            .context("Failed to wait for in-flight fence")
    }

    pub fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_fences(&[self.in_flight_fence]) }
            .context("Failed to reset in-flight fence")
    }

    /// Null handles are skipped, which makes this safe on partial construction
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            if self.image_available != vk::Semaphore::null() {
                device.destroy_semaphore(self.image_available, None);
            }
            if self.render_finished != vk::Semaphore::null() {
                device.destroy_semaphore(self.render_finished, None);
            }
            if self.in_flight_fence != vk::Fence::null() {
                device.destroy_fence(self.in_flight_fence, None);
            }
        }
    }
}
