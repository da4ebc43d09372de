// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use lantern_core::{init_tracing, init_tracing_with_file, LOG_GENERAL};
use lantern_render::{FrameStatus, RenderConfig, RenderSize, Renderer};
use lantern_render_vk::Engine;
use tracing::{error, info, warn};

use lantern_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file with a [render] table
    #[arg(long, default_value = "lantern.toml")]
    config: PathBuf,

    /// Directory holding tri.vert.spv / tri.frag.spv (built-in shaders otherwise)
    #[arg(long)]
    shaders: Option<PathBuf>,

    /// Exit after this many presented frames
    #[arg(long)]
    frames: Option<u64>,

    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Vulkan loader library to open instead of the linked one
    #[arg(long)]
    vulkan_loader: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct AppCfg {
    #[serde(default)]
    render: RenderConfig,
}

/// A missing file means defaults; a malformed one is an error.
fn load_cfg(path: &Path) -> Result<AppCfg> {
    match fs::read_to_string(path) {
        Ok(s) => toml::from_str::<AppCfg>(&s).with_context(|| format!("parse {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(AppCfg::default()),
        Err(e) => Err(anyhow!(e).context(format!("read {}", path.display()))),
    }
}

fn size_of(window: &Window) -> RenderSize {
    let s = window.inner_size();
    RenderSize {
        width: s.width,
        height: s.height,
    }
}

/// Counts frames that reached the screen against an optional limit.
#[derive(Debug, Default)]
struct FrameCounter {
    limit: Option<u64>,
    presented: u64,
}

impl FrameCounter {
    /// Returns true once the limit is reached.
    fn record(&mut self, status: FrameStatus) -> bool {
        if status.presented() {
            self.presented += 1;
        }
        self.limit.is_some_and(|n| self.presented >= n)
    }
}

struct App {
    cfg: AppCfg,
    shader_dir: Option<PathBuf>,
    counter: FrameCounter,

    // Declared before `window` so the engine is dropped first.
    engine: Option<Engine>,
    window: Option<Window>,
    render_size: RenderSize,

    exiting: bool,
    paused: bool,
    frames: u32,
    last_fps_instant: Instant,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(args: Args, cfg: AppCfg) -> Self {
        App {
            cfg,
            shader_dir: args.shaders,
            counter: FrameCounter { limit: args.frames, presented: 0 },
            engine: None,
            window: None,
            render_size: RenderSize::default(),
            exiting: false,
            paused: false,
            frames: 0,
            last_fps_instant: Instant::now(),
            failure: None,
        }
    }

    fn shut_down(&mut self, event_loop: &ActiveEventLoop, failure: Option<anyhow::Error>) {
        if let Some(e) = failure {
            error!(target: LOG_GENERAL, "{e:#}");
            self.failure.get_or_insert(e);
        }
        self.exiting = true;
        self.engine = None;
        self.window = None;
        event_loop.exit();
    }

    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(lantern_platform::window_attributes(&self.cfg.render.app_name))
            .context("create_window")?;
        self.render_size = size_of(&window);

        let engine = Engine::new(
            &window,
            &window,
            self.render_size,
            self.shader_dir.as_deref(),
            &self.cfg.render,
        )
        .context("engine init")?;
        self.window = Some(window);

        if !engine.validate() {
            return Err(anyhow!("engine failed validation"));
        }
        self.engine = Some(engine);
        Ok(())
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        let status = match engine.draw() {
            Ok(status) => status,
            Err(e) => return self.shut_down(event_loop, Some(e.context("draw"))),
        };
        if status.is_stale() && !engine.refresh() {
            self.shut_down(event_loop, Some(anyhow!("swapchain refresh failed")));
            return;
        }

        if status.presented() {
            self.frames = self.frames.saturating_add(1);
        }
        if self.counter.record(status) {
            info!(target: LOG_GENERAL, "drew {} frames, exiting", self.counter.presented);
            self.shut_down(event_loop, None);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.open(event_loop) {
                self.shut_down(event_loop, Some(e));
                return;
            }
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        self.paused = self.render_size.is_empty();
        info!(target: LOG_GENERAL, "resumed → paused={}", self.paused);

        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!(target: LOG_GENERAL, "CloseRequested");
                self.shut_down(event_loop, None);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize {
                    width: new_size.width,
                    height: new_size.height,
                };
                self.paused = self.render_size.is_empty();
                info!(
                    target: LOG_GENERAL,
                    "Resized → {}x{} (paused={})",
                    self.render_size.width,
                    self.render_size.height,
                    self.paused
                );

                if self.paused {
                    return;
                }
                if let Some(engine) = self.engine.as_mut() {
                    engine.set_size(self.render_size);
                    if !engine.refresh() {
                        self.shut_down(event_loop, Some(anyhow!("swapchain refresh failed")));
                        return;
                    }
                }
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                self.draw(event_loop);
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // minimized: sleep until the next resize
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!(target: LOG_GENERAL, "fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    match &args.log_file {
        Some(path) => {
            if let Err(e) = init_tracing_with_file(path) {
                init_tracing();
                warn!(target: LOG_GENERAL, "log file {}: {e}; logging to stdout only", path.display());
            }
        }
        None => init_tracing(),
    }

    let mut cfg = match load_cfg(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(target: LOG_GENERAL, "{e:#}; using defaults");
            AppCfg::default()
        }
    };
    if let Some(loader) = &args.vulkan_loader {
        cfg.render.loader_path = Some(loader.clone());
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(args, cfg);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_render::PresentPreference;

    fn scratch(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("lantern-{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_config_uses_defaults() {
        let cfg = load_cfg(Path::new("/nonexistent/lantern.toml")).unwrap();
        assert_eq!(cfg.render, RenderConfig::default());
    }

    #[test]
    fn render_table_is_read() {
        let path = scratch(
            "render.toml",
            "[render]\nclear_color = [0.1, 0.2, 0.3, 1.0]\npresent_mode = \"fifo\"\nextra_images = 1\n",
        );
        let cfg = load_cfg(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(cfg.render.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(cfg.render.present_mode, PresentPreference::Fifo);
        assert_eq!(cfg.render.extra_images, 1);
        assert_eq!(cfg.render.app_name, "lantern");
    }

    #[test]
    fn malformed_config_is_an_error() {
        let path = scratch("bad.toml", "[render]\npresent_mode = 3\n");
        let err = load_cfg(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(format!("{err:#}").contains("parse"));
    }

    #[test]
    fn cli_flags_parse() {
        let args = Args::parse_from(["lantern-app", "--shaders", "spv", "--frames", "10"]);
        assert_eq!(args.config, PathBuf::from("lantern.toml"));
        assert_eq!(args.shaders, Some(PathBuf::from("spv")));
        assert_eq!(args.frames, Some(10));
        assert_eq!(args.log_file, None);
        assert_eq!(args.vulkan_loader, None);
    }

    #[test]
    fn log_and_loader_flags_parse() {
        let args = Args::parse_from([
            "lantern-app",
            "--log-file",
            "lantern.log",
            "--vulkan-loader",
            "/opt/vk/libvulkan.so.1",
        ]);
        assert_eq!(args.log_file, Some(PathBuf::from("lantern.log")));
        assert_eq!(args.vulkan_loader, Some(PathBuf::from("/opt/vk/libvulkan.so.1")));
    }

    #[test]
    fn loader_path_reads_from_config() {
        let path = scratch("loader.toml", "[render]\nloader_path = \"/opt/vk/libvulkan.so.1\"\n");
        let cfg = load_cfg(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(cfg.render.loader_path, Some(PathBuf::from("/opt/vk/libvulkan.so.1")));
    }

    #[test]
    fn only_presented_frames_count_toward_the_limit() {
        let mut counter = FrameCounter { limit: Some(2), presented: 0 };
        assert!(!counter.record(FrameStatus::Stale { presented: false }));
        assert!(!counter.record(FrameStatus::Stale { presented: false }));
        assert!(!counter.record(FrameStatus::Presented));
        assert_eq!(counter.presented, 1);
        assert!(counter.record(FrameStatus::Stale { presented: true }));
        assert_eq!(counter.presented, 2);
    }

    #[test]
    fn unlimited_counter_never_stops() {
        let mut counter = FrameCounter::default();
        for _ in 0..5 {
            assert!(!counter.record(FrameStatus::Presented));
        }
        assert_eq!(counter.presented, 5);
    }
}
