// SPDX-License-Identifier: CEPL-1.0
//! Windowing for the host. winit is re-exported so the app depends on one
//! version through this crate.
pub use winit;

use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowAttributes};

pub const DEFAULT_TITLE: &str = "lantern";
pub const DEFAULT_SIZE: PhysicalSize<u32> = PhysicalSize::new(800, 600);

pub fn window_attributes(title: &str) -> WindowAttributes {
    Window::default_attributes()
        .with_title(title)
        .with_inner_size(DEFAULT_SIZE)
}
