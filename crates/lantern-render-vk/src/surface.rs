// SPDX-License-Identifier: CEPL-1.0
use ash::khr::surface;
use ash::prelude::VkResult;
use ash::vk;
use lantern_render::{PresentPreference, RenderSize};

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Snapshot of what a physical device can do with a surface. Queried fresh for
/// every chain build because it changes with the window.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// # Safety
    /// `phys` and `surface` must be live handles from the instance behind `surf_i`.
    pub unsafe fn query(
        surf_i: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Self> {
        unsafe {
            Ok(SurfaceSupport {
                caps: surf_i.get_physical_device_surface_capabilities(phys, surface)?,
                formats: surf_i.get_physical_device_surface_formats(phys, surface)?,
                present_modes: surf_i.get_physical_device_surface_present_modes(phys, surface)?,
            })
        }
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// `None` only when the snapshot is not adequate.
    pub fn choose_format(&self) -> Option<vk::SurfaceFormatKHR> {
        self.formats
            .iter()
            .copied()
            .find(|f| {
                f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space
            })
            .or_else(|| self.formats.first().copied())
    }

    pub fn choose_present_mode(&self, pref: PresentPreference) -> vk::PresentModeKHR {
        match pref {
            PresentPreference::Mailbox
                if self.present_modes.contains(&vk::PresentModeKHR::MAILBOX) =>
            {
                vk::PresentModeKHR::MAILBOX
            }
            _ => vk::PresentModeKHR::FIFO,
        }
    }

    /// `current_extent.width == u32::MAX` means the surface follows whatever size
    /// the chain asks for.
    pub fn choose_extent(&self, want: RenderSize) -> vk::Extent2D {
        let caps = &self.caps;
        if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: want
                    .width
                    .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: want
                    .height
                    .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        }
    }

    /// `max_image_count == 0` means no upper bound.
    pub fn choose_image_count(&self, extra: u32) -> u32 {
        let wanted = self.caps.min_image_count.saturating_add(extra);
        if self.caps.max_image_count > 0 {
            wanted.min(self.caps.max_image_count)
        } else {
            wanted
        }
    }
}

// Info only
pub fn present_mode_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}
