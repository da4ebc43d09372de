// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::frame::MAX_FRAMES_IN_FLIGHT;

/// `image_available` and `in_flight` are per frame slot; `render_finished` is
/// per chain image so a semaphore is never re-signaled while a present still
/// waits on it.
#[derive(Debug, Default)]
pub struct FrameSync {
    pub image_available: Vec<vk::Semaphore>,
    pub render_finished: Vec<vk::Semaphore>,
    pub in_flight: Vec<vk::Fence>,
}

unsafe fn semaphores(device: &ash::Device, n: usize, out: &mut Vec<vk::Semaphore>) -> Result<()> {
    let info = vk::SemaphoreCreateInfo {
        s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
        ..Default::default()
    };
    for _ in 0..n {
        out.push(unsafe { device.create_semaphore(&info, None) }.context("create_semaphore")?);
    }
    Ok(())
}

impl FrameSync {
    /// Fences start signaled so the first wait of each slot returns at once.
    ///
    /// # Safety
    /// `device` must be live.
    pub unsafe fn create(device: &ash::Device, image_count: usize) -> Result<Self> {
        let mut sync = FrameSync::default();
        if let Err(e) = unsafe { sync.build(device, image_count) } {
            unsafe { sync.destroy(device) };
            return Err(e);
        }
        Ok(sync)
    }

    unsafe fn build(&mut self, device: &ash::Device, image_count: usize) -> Result<()> {
        unsafe {
            semaphores(device, MAX_FRAMES_IN_FLIGHT, &mut self.image_available)?;
            semaphores(device, image_count, &mut self.render_finished)?;
        }
        let fence_info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            self.in_flight
                .push(unsafe { device.create_fence(&fence_info, None) }.context("create_fence")?);
        }
        Ok(())
    }

    /// Recreates the per-image semaphores at a new length.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn resize_render_finished(&mut self, device: &ash::Device, image_count: usize) -> Result<()> {
        unsafe {
            for s in self.render_finished.drain(..) {
                device.destroy_semaphore(s, None);
            }
            semaphores(device, image_count, &mut self.render_finished)
        }
    }

    /// # Safety
    /// Nothing in flight may wait on or signal these objects.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            for s in self.image_available.drain(..).chain(self.render_finished.drain(..)) {
                device.destroy_semaphore(s, None);
            }
            for f in self.in_flight.drain(..) {
                device.destroy_fence(f, None);
            }
        }
    }
}
