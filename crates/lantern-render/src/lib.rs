// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Outcome of a frame that did not fail fatally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was presented and the chain still matches the surface.
    Presented,
    /// The chain no longer matches the surface; call `refresh` before drawing
    /// again. `presented` says whether this frame still reached the screen.
    Stale { presented: bool },
}

impl FrameStatus {
    pub fn is_stale(self) -> bool {
        matches!(self, FrameStatus::Stale { .. })
    }

    pub fn presented(self) -> bool {
        match self {
            FrameStatus::Presented => true,
            FrameStatus::Stale { presented } => presented,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentPreference {
    /// Low latency: mailbox when the surface offers it, FIFO otherwise.
    #[default]
    Mailbox,
    /// Always FIFO (strict vsync).
    Fifo,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub app_name: String,
    pub clear_color: [f32; 4],
    pub present_mode: PresentPreference,
    pub validation: bool,
    pub extra_images: u32,
    /// Vulkan loader library to open instead of the one linked at build time.
    pub loader_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            app_name: "lantern".to_owned(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            present_mode: PresentPreference::Mailbox,
            validation: cfg!(debug_assertions),
            extra_images: 2,
            loader_path: None,
        }
    }
}

/// The contract a managing application drives: create, draw, refresh, and
/// destroy (by dropping the renderer).
///
/// `new` failing and `validate` returning false are distinct outcomes and both
/// must be checked before the first `draw`.
pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        shader_dir: Option<&Path>,
        cfg: &RenderConfig,
    ) -> Result<Self>
    where
        Self: Sized;

    fn validate(&self) -> bool;

    /// Blocks until the current frame slot is free, then renders one frame.
    /// `Err` is fatal: the renderer must be dropped.
    fn draw(&mut self) -> Result<FrameStatus>;

    /// Rebuilds the presentation chain against the last size given to
    /// `set_size`. `false` is fatal.
    fn refresh(&mut self) -> bool;

    fn set_size(&mut self, size: RenderSize);

    fn set_clear_color(&mut self, rgba: [f32; 4]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_clears_to_opaque_black() {
        let cfg = RenderConfig::default();
        assert_eq!(cfg.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(cfg.present_mode, PresentPreference::Mailbox);
        assert_eq!(cfg.extra_images, 2);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: RenderConfig = toml::from_str("present_mode = \"fifo\"\n").unwrap();
        assert_eq!(cfg.present_mode, PresentPreference::Fifo);
        assert_eq!(cfg.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(cfg.app_name, "lantern");
    }

    #[test]
    fn empty_size_detection() {
        assert!(RenderSize { width: 0, height: 600 }.is_empty());
        assert!(RenderSize { width: 800, height: 0 }.is_empty());
        assert!(!RenderSize { width: 800, height: 600 }.is_empty());
    }

    #[test]
    fn only_stale_status_requests_refresh() {
        assert!(FrameStatus::Stale { presented: true }.is_stale());
        assert!(FrameStatus::Stale { presented: false }.is_stale());
        assert!(!FrameStatus::Presented.is_stale());
    }

    #[test]
    fn skipped_frames_are_not_presented() {
        assert!(FrameStatus::Presented.presented());
        assert!(FrameStatus::Stale { presented: true }.presented());
        assert!(!FrameStatus::Stale { presented: false }.presented());
    }

    #[test]
    fn loader_path_is_optional() {
        assert_eq!(RenderConfig::default().loader_path, None);
        let cfg: RenderConfig = toml::from_str("loader_path = \"/opt/vk/libvulkan.so.1\"\n").unwrap();
        assert_eq!(cfg.loader_path, Some(PathBuf::from("/opt/vk/libvulkan.so.1")));
    }
}
