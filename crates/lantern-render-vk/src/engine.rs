// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use lantern_core::LOG_GENERAL;
use lantern_render::{FrameStatus, RenderConfig, RenderSize};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::command::{CommandContext, RecordTarget};
use crate::debug::DebugMessenger;
use crate::device::{create_logical_device, select_physical_device};
use crate::error::FrameError;
use crate::frame::{run_guarded, FrameOps};
use crate::instance::create_instance;
use crate::lifecycle::{build_components, refresh_guarded, BuildOps, ChainOps, Component};
use crate::pipeline::Pipeline;
use crate::queues::{QueueIndices, Queues};
use crate::render_pass::create_render_pass;
use crate::shader::ShaderCode;
use crate::swapchain::{update_images, ChainRequest, DeviceImages, ImageOps, PresentChain};
use crate::sync::FrameSync;

/// Owns every Vulkan object needed to draw the triangle into one window.
///
/// Dropping it waits for the device to go idle and releases everything in
/// reverse creation order.
pub struct Engine {
    _entry: Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
    surf_i: surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    device: ash::Device,
    swap_d: swapchain::Device,
    queues: Queues,

    chain: PresentChain,
    render_pass: vk::RenderPass,
    pipeline: Pipeline,
    commands: CommandContext,
    sync: FrameSync,

    size: RenderSize,
    cfg: RenderConfig,
    valid: bool,
    current_frame: usize,
}

/// Surface, device and queues: failures here abort construction.
struct DeviceStage {
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    device: ash::Device,
    queues: Queues,
}

unsafe fn open_device(
    entry: &Entry,
    instance: &ash::Instance,
    surf_i: &surface::Instance,
    dh: RawDisplayHandle,
    wh: RawWindowHandle,
) -> Result<DeviceStage> {
    let surface = unsafe { ash_window::create_surface(entry, instance, dh, wh, None) }
        .context("create_surface")?;
    info!(target: LOG_GENERAL, "created surface");

    let opened = (|| -> Result<_> {
        let (phys, indices) = unsafe { select_physical_device(instance, surf_i, surface)? };
        let device = unsafe { create_logical_device(instance, phys, &indices)? };
        match unsafe { Queues::fetch(&device, indices) } {
            Some(queues) => Ok((phys, device, queues)),
            None => {
                unsafe { device.destroy_device(None) };
                Err(anyhow!("queue families unresolved: {indices:?}"))
            }
        }
    })();

    match opened {
        Ok((phys, device, queues)) => Ok(DeviceStage { surface, phys, device, queues }),
        Err(e) => {
            unsafe { surf_i.destroy_surface(surface, None) };
            Err(e)
        }
    }
}

/// Borrows what a chain rebuild touches.
struct ChainRebuilder<'a> {
    images: DeviceImages<'a>,
    swap_d: &'a swapchain::Device,
    surf_i: &'a surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    indices: QueueIndices,
    req: ChainRequest,
    present: vk::Queue,
    sync: &'a mut FrameSync,
}

impl ImageOps for ChainRebuilder<'_> {
    fn build_images(&mut self, chain: &mut PresentChain) -> Result<()> {
        self.images.build_images(chain)
    }

    fn clean_up_images(&mut self, chain: &mut PresentChain) {
        self.images.clean_up_images(chain)
    }
}

impl ChainOps for ChainRebuilder<'_> {
    fn create_chain(&mut self, old: vk::SwapchainKHR) -> Result<PresentChain> {
        unsafe {
            PresentChain::create(self.swap_d, self.surf_i, self.phys, self.surface, &self.indices, self.req, old)
        }
    }

    fn render_finished_len(&self) -> usize {
        self.sync.render_finished.len()
    }

    fn resize_render_finished(&mut self, image_count: usize) -> Result<()> {
        let device = self.images.device;
        unsafe {
            device.device_wait_idle().context("device_wait_idle")?;
            self.sync.resize_render_finished(device, image_count)
        }
    }

    fn retire(&mut self, mut chain: PresentChain) {
        let device = self.images.device;
        unsafe {
            if let Err(e) = device.queue_wait_idle(self.present) {
                warn!(target: LOG_GENERAL, "present queue wait before chain release: {e}");
            }
            chain.destroy(device, self.swap_d);
        }
    }
}

/// Builds the engine's components in place.
struct EngineBuilder<'a> {
    engine: &'a mut Engine,
    shader_dir: Option<&'a Path>,
}

impl BuildOps for EngineBuilder<'_> {
    fn build(&mut self, component: Component) -> Result<()> {
        let e = &mut *self.engine;
        unsafe {
            match component {
                Component::Chain => {
                    let req = e.chain_request();
                    e.chain = PresentChain::create(
                        &e.swap_d,
                        &e.surf_i,
                        e.phys,
                        e.surface,
                        &e.queues.indices,
                        req,
                        vk::SwapchainKHR::null(),
                    )?;
                }
                Component::RenderPass => e.render_pass = create_render_pass(&e.device, e.chain.format)?,
                Component::Images => {
                    let mut images = DeviceImages { device: &e.device, render_pass: e.render_pass };
                    update_images(&mut images, &mut e.chain)?;
                }
                Component::Pipeline => {
                    let code = ShaderCode::load(self.shader_dir)?;
                    e.pipeline = Pipeline::create(&e.device, e.render_pass, &code)?;
                }
                Component::Commands => {
                    let family = e.queues.indices.graphics.context("graphics family unresolved")?;
                    e.commands = CommandContext::create(&e.device, family)?;
                }
                Component::Sync => e.sync = FrameSync::create(&e.device, e.chain.image_count())?,
            }
        }
        Ok(())
    }
}

/// Borrows exactly what one frame touches.
struct FrameDriver<'a> {
    device: &'a ash::Device,
    swap_d: &'a swapchain::Device,
    queues: &'a Queues,
    chain: &'a PresentChain,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    commands: &'a CommandContext,
    sync: &'a FrameSync,
    clear: [f32; 4],
}

// All handles below were created by the owning engine, which only builds a
// driver while valid.
impl FrameOps for FrameDriver<'_> {
    fn wait_in_flight(&mut self, slot: usize) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[self.sync.in_flight[slot]], true, u64::MAX) }
    }

    fn acquire(&mut self, slot: usize) -> VkResult<(u32, bool)> {
        unsafe {
            self.swap_d.acquire_next_image(
                self.chain.handle,
                u64::MAX,
                self.sync.image_available[slot],
                vk::Fence::null(),
            )
        }
    }

    fn reset_in_flight(&mut self, slot: usize) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[self.sync.in_flight[slot]]) }
    }

    fn record(&mut self, slot: usize, image: u32) -> VkResult<()> {
        let framebuffer = self
            .chain
            .framebuffers
            .get(image as usize)
            .copied()
            .ok_or(vk::Result::ERROR_UNKNOWN)?;
        let target = RecordTarget {
            render_pass: self.render_pass,
            framebuffer,
            extent: self.chain.extent,
            pipeline: self.pipeline,
            clear: self.clear,
        };
        unsafe { self.commands.record(self.device, slot, &target) }
    }

    fn submit(&mut self, slot: usize, image: u32) -> VkResult<()> {
        let wait = [self.sync.image_available[slot]];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let cmds = [self.commands.buffers[slot]];
        let signal = [self.sync.render_finished[image as usize]];

        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: wait.len() as u32,
            p_wait_semaphores: wait.as_ptr(),
            p_wait_dst_stage_mask: stages.as_ptr(),
            command_buffer_count: cmds.len() as u32,
            p_command_buffers: cmds.as_ptr(),
            signal_semaphore_count: signal.len() as u32,
            p_signal_semaphores: signal.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.queues.graphics, std::slice::from_ref(&submit), self.sync.in_flight[slot])
        }
    }

    fn present(&mut self, image: u32) -> VkResult<bool> {
        let wait = [self.sync.render_finished[image as usize]];
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: wait.len() as u32,
            p_wait_semaphores: wait.as_ptr(),
            swapchain_count: 1,
            p_swapchains: &self.chain.handle,
            p_image_indices: &image,
            ..Default::default()
        };
        unsafe { self.swap_d.queue_present(self.queues.present, &present) }
    }
}

impl Engine {
    /// Instance, surface, device selection, device and queues must all succeed
    /// or this returns `Err`. Later components only clear `validate()`.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        shader_dir: Option<&Path>,
        cfg: &RenderConfig,
    ) -> Result<Self> {
        let entry = match &cfg.loader_path {
            Some(path) => {
                info!(target: LOG_GENERAL, "loading Vulkan from {}", path.display());
                unsafe { Entry::load_from(path) }
                    .with_context(|| format!("load Vulkan loader {}", path.display()))?
            }
            None => Entry::linked(),
        };
        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();

        let instance = create_instance(&entry, dh, cfg)?;
        let mut valid = true;

        let mut debug = None;
        if cfg.validation {
            match DebugMessenger::new(&entry, &instance) {
                Ok(m) => debug = Some(m),
                Err(e) => {
                    error!(target: LOG_GENERAL, "debug messenger: {e:#}");
                    valid = false;
                }
            }
        }

        let surf_i = surface::Instance::new(&entry, &instance);
        let stage = match unsafe { open_device(&entry, &instance, &surf_i, dh, wh) } {
            Ok(stage) => stage,
            Err(e) => {
                unsafe {
                    if let Some(d) = debug.as_mut() {
                        d.destroy();
                    }
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };
        let swap_d = swapchain::Device::new(&instance, &stage.device);

        let mut engine = Engine {
            _entry: entry,
            instance,
            debug,
            surf_i,
            surface: stage.surface,
            phys: stage.phys,
            device: stage.device,
            swap_d,
            queues: stage.queues,
            chain: PresentChain::default(),
            render_pass: vk::RenderPass::null(),
            pipeline: Pipeline::default(),
            commands: CommandContext::default(),
            sync: FrameSync::default(),
            size,
            cfg: cfg.clone(),
            valid,
            current_frame: 0,
        };
        let built = build_components(&mut EngineBuilder { engine: &mut engine, shader_dir });
        engine.valid &= built;

        if engine.valid {
            info!(
                target: LOG_GENERAL,
                "engine ready ({}x{}, {:?}, {} images)",
                engine.chain.extent.width,
                engine.chain.extent.height,
                engine.chain.format,
                engine.chain.image_count()
            );
        } else {
            error!(target: LOG_GENERAL, "engine constructed in an invalid state");
        }
        Ok(engine)
    }

    fn chain_request(&self) -> ChainRequest {
        ChainRequest {
            size: self.size,
            present: self.cfg.present_mode,
            extra_images: self.cfg.extra_images,
        }
    }

    pub fn validate(&self) -> bool {
        self.valid
    }

    /// Runs one frame. `Ok(Stale)` asks for `refresh`; `Err` is fatal.
    /// A fatal error also invalidates the engine.
    pub fn draw_frame(&mut self) -> Result<FrameStatus, FrameError> {
        if !self.valid {
            return Err(FrameError::InvalidEngine);
        }
        let mut driver = FrameDriver {
            device: &self.device,
            swap_d: &self.swap_d,
            queues: &self.queues,
            chain: &self.chain,
            render_pass: self.render_pass,
            pipeline: self.pipeline.primary(),
            commands: &self.commands,
            sync: &self.sync,
            clear: self.cfg.clear_color,
        };
        run_guarded(&mut self.valid, &mut driver, &mut self.current_frame)
    }

    /// Rebuilds the chain for the last size given to `set_size`, handing the
    /// old chain to the driver for reuse. A failed rebuild invalidates the
    /// engine.
    pub fn refresh(&mut self) -> bool {
        let req = self.chain_request();
        let mut ops = ChainRebuilder {
            images: DeviceImages { device: &self.device, render_pass: self.render_pass },
            swap_d: &self.swap_d,
            surf_i: &self.surf_i,
            phys: self.phys,
            surface: self.surface,
            indices: self.queues.indices,
            req,
            present: self.queues.present,
            sync: &mut self.sync,
        };
        refresh_guarded(&mut self.valid, &mut ops, &mut self.chain)
    }

    pub fn set_size(&mut self, size: RenderSize) {
        self.size = size;
    }

    /// Takes effect at the next recorded frame.
    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.cfg.clear_color = rgba;
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn image_count(&self) -> usize {
        self.chain.image_count()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.chain.extent
    }

    pub fn format(&self) -> vk::Format {
        self.chain.format
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            d.device_wait_idle().ok();

            self.sync.destroy(d);
            self.commands.destroy(d);
            self.pipeline.destroy(d);
            self.chain.destroy(d, &self.swap_d);
            d.destroy_render_pass(self.render_pass, None);
            d.destroy_device(None);

            self.surf_i.destroy_surface(self.surface, None);
            if let Some(debug) = self.debug.as_mut() {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
        debug!(target: LOG_GENERAL, "engine destroyed");
    }
}
