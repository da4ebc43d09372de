// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan backend: draws a single triangle into a window through a
//! recreatable swapchain with two frames in flight.

use anyhow::Result;
use lantern_render::{FrameStatus, RenderConfig, RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::Path;

mod command;
mod debug;
mod device;
mod engine;
mod error;
mod frame;
mod instance;
mod lifecycle;
mod pipeline;
mod queues;
mod render_pass;
mod shader;
mod surface;
mod swapchain;
mod sync;

pub use engine::Engine;
pub use error::FrameError;
pub use frame::MAX_FRAMES_IN_FLIGHT;

impl Renderer for Engine {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        shader_dir: Option<&Path>,
        cfg: &RenderConfig,
    ) -> Result<Self> {
        Engine::new(window, display, size, shader_dir, cfg)
    }

    fn validate(&self) -> bool {
        Engine::validate(self)
    }

    fn draw(&mut self) -> Result<FrameStatus> {
        Ok(self.draw_frame()?)
    }

    fn refresh(&mut self) -> bool {
        Engine::refresh(self)
    }

    fn set_size(&mut self, size: RenderSize) {
        Engine::set_size(self, size)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        Engine::set_clear_color(self, rgba)
    }
}
