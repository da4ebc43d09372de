// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;

use crate::frame::MAX_FRAMES_IN_FLIGHT;

/// One resettable pool on the graphics family and a primary buffer per frame
/// slot.
#[derive(Debug, Default)]
pub struct CommandContext {
    pub pool: vk::CommandPool,
    pub buffers: Vec<vk::CommandBuffer>,
}

/// What a single recording draws into.
#[derive(Clone, Copy, Debug)]
pub struct RecordTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub clear: [f32; 4],
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

impl CommandContext {
    /// # Safety
    /// `family` must be a queue family the device was created with.
    pub unsafe fn create(device: &ash::Device, family: u32) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: family,
            ..Default::default()
        };
        let pool = unsafe { device.create_command_pool(&pool_info, None) }.context("create_command_pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: MAX_FRAMES_IN_FLIGHT as u32,
            ..Default::default()
        };
        match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => Ok(CommandContext { pool, buffers }),
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                Err(anyhow::Error::new(e).context("allocate_command_buffers"))
            }
        }
    }

    /// Re-records the buffer for `slot` to draw the triangle into `target`.
    ///
    /// # Safety
    /// The slot's buffer must not be pending execution.
    pub unsafe fn record(&self, device: &ash::Device, slot: usize, target: &RecordTarget) -> VkResult<()> {
        let cmd = self.buffers[slot];
        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                ..Default::default()
            };
            device.begin_command_buffer(cmd, &begin)?;

            let clear = vk::ClearValue {
                color: vk::ClearColorValue { float32: target.clear },
            };
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: target.render_pass,
                framebuffer: target.framebuffer,
                render_area: full_scissor(target.extent),
                clear_value_count: 1,
                p_clear_values: &clear,
                ..Default::default()
            };
            device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
            device.cmd_set_viewport(cmd, 0, &[full_viewport(target.extent)]);
            device.cmd_set_scissor(cmd, 0, &[full_scissor(target.extent)]);
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device.end_command_buffer(cmd)
        }
    }

    /// # Safety
    /// No buffer from the pool may be pending execution.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        // Destroying the pool frees its buffers.
        unsafe { device.destroy_command_pool(self.pool, None) };
        self.buffers.clear();
        self.pool = vk::CommandPool::null();
    }
}
