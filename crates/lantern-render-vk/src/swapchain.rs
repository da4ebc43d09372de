// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::khr::{surface, swapchain};
use ash::vk;
use lantern_core::LOG_GENERAL;
use lantern_render::{PresentPreference, RenderSize};
use tracing::info;

use crate::queues::QueueIndices;
use crate::surface::{present_mode_name, SurfaceSupport};

/// Everything a chain build needs besides device handles.
#[derive(Clone, Copy, Debug)]
pub struct ChainRequest {
    pub size: RenderSize,
    pub present: PresentPreference,
    pub extra_images: u32,
}

/// The presentable chain plus the per-image views and framebuffers built on it.
///
/// `images`, `views` and `framebuffers` are either all empty or all the same
/// length.
#[derive(Debug, Default)]
pub struct PresentChain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

pub fn sharing_mode(indices: &QueueIndices) -> (vk::SharingMode, Vec<u32>) {
    if indices.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, indices.unique())
    }
}

/// Builds and tears down the per-image views and framebuffers of a chain.
pub trait ImageOps {
    fn build_images(&mut self, chain: &mut PresentChain) -> Result<()>;
    fn clean_up_images(&mut self, chain: &mut PresentChain);
}

/// Rebuilds views and framebuffers for the chain's current images. On failure
/// images, views and framebuffers are all left empty.
pub fn update_images<O: ImageOps + ?Sized>(ops: &mut O, chain: &mut PresentChain) -> Result<()> {
    ops.clean_up_images(chain);
    if let Err(e) = ops.build_images(chain) {
        ops.clean_up_images(chain);
        chain.images.clear();
        return Err(e.context("image views/framebuffers"));
    }
    Ok(())
}

/// [`ImageOps`] on a live device. Built only by the engine, from handles it owns.
pub struct DeviceImages<'a> {
    pub device: &'a ash::Device,
    pub render_pass: vk::RenderPass,
}

impl ImageOps for DeviceImages<'_> {
    fn build_images(&mut self, chain: &mut PresentChain) -> Result<()> {
        unsafe { chain.build_images(self.device, self.render_pass) }
    }

    fn clean_up_images(&mut self, chain: &mut PresentChain) {
        unsafe { chain.clean_up_images(self.device) }
    }
}

impl PresentChain {
    /// Builds a chain against fresh surface capabilities. `old` is handed to the
    /// driver as the retired chain and may be null.
    ///
    /// # Safety
    /// All handles must be live and belong to the same instance/device; `old`
    /// must not be destroyed before this returns.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn create(
        swap_d: &swapchain::Device,
        surf_i: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        indices: &QueueIndices,
        req: ChainRequest,
        old: vk::SwapchainKHR,
    ) -> Result<Self> {
        let support = unsafe { SurfaceSupport::query(surf_i, phys, surface) }
            .context("query surface support")?;
        let format = support
            .choose_format()
            .ok_or_else(|| anyhow!("surface reports no formats"))?;
        let present_mode = support.choose_present_mode(req.present);
        let extent = support.choose_extent(req.size);
        let min_image_count = support.choose_image_count(req.extra_images);
        let (image_sharing_mode, families) = sharing_mode(indices);

        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count,
            image_format: format.format,
            image_color_space: format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode,
            queue_family_index_count: families.len() as u32,
            p_queue_family_indices: families.as_ptr(),
            pre_transform: support.caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };

        let handle = unsafe { swap_d.create_swapchain(&info, None) }.context("create_swapchain")?;
        let images = match unsafe { swap_d.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swap_d.destroy_swapchain(handle, None) };
                return Err(anyhow!(e).context("get_swapchain_images"));
            }
        };

        info!(
            target: LOG_GENERAL,
            "swapchain {}x{} {:?} {} images={}",
            extent.width,
            extent.height,
            format.format,
            present_mode_name(present_mode),
            images.len()
        );

        Ok(PresentChain {
            handle,
            images,
            views: Vec::new(),
            framebuffers: Vec::new(),
            format: format.format,
            extent,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Appends a view and framebuffer per image; stops at the first failure.
    ///
    /// # Safety
    /// `render_pass` must be compatible with `self.format`.
    pub unsafe fn build_images(&mut self, device: &ash::Device, render_pass: vk::RenderPass) -> Result<()> {
        for &image in &self.images {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: self.format,
                components: vk::ComponentMapping::default(),
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = unsafe { device.create_image_view(&iv_info, None) }.context("create_image_view")?;
            self.views.push(view);

            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: 1,
                p_attachments: &view,
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { device.create_framebuffer(&fb_info, None) }.context("create_framebuffer")?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    /// Destroys framebuffers and views; the images stay owned by the chain.
    ///
    /// # Safety
    /// Nothing in flight may reference them.
    pub unsafe fn clean_up_images(&mut self, device: &ash::Device) {
        unsafe {
            for fb in self.framebuffers.drain(..) {
                device.destroy_framebuffer(fb, None);
            }
            for iv in self.views.drain(..) {
                device.destroy_image_view(iv, None);
            }
        }
    }

    /// # Safety
    /// Nothing in flight may reference the chain.
    pub unsafe fn destroy(&mut self, device: &ash::Device, swap_d: &swapchain::Device) {
        unsafe {
            self.clean_up_images(device);
            swap_d.destroy_swapchain(self.handle, None);
        }
        self.images.clear();
        self.handle = vk::SwapchainKHR::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_family_is_exclusive() {
        let idx = QueueIndices { graphics: Some(0), present: Some(0) };
        let (mode, families) = sharing_mode(&idx);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(families.is_empty());
    }

    #[test]
    fn split_families_are_concurrent() {
        let idx = QueueIndices { graphics: Some(2), present: Some(0) };
        let (mode, families) = sharing_mode(&idx);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(families, vec![0, 2]);
    }

    #[test]
    fn default_chain_is_empty_and_consistent() {
        let chain = PresentChain::default();
        assert_eq!(chain.image_count(), 0);
        assert_eq!(chain.views.len(), chain.framebuffers.len());
        assert_eq!(chain.handle, vk::SwapchainKHR::null());
    }
}
