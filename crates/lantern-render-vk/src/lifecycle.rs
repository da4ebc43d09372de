// SPDX-License-Identifier: CEPL-1.0
//! Component construction order and chain rebuilds, written against small
//! device traits.

use anyhow::Result;
use ash::vk;
use lantern_core::LOG_GENERAL;
use tracing::{debug, error, warn};

use crate::swapchain::{update_images, ImageOps, PresentChain};

/// The components built after the device, in creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    Chain,
    RenderPass,
    Images,
    Pipeline,
    Commands,
    Sync,
}

impl Component {
    pub fn name(self) -> &'static str {
        match self {
            Component::Chain => "present chain",
            Component::RenderPass => "render pass",
            Component::Images => "image views/framebuffers",
            Component::Pipeline => "pipeline",
            Component::Commands => "command context",
            Component::Sync => "frame sync",
        }
    }
}

pub trait BuildOps {
    fn build(&mut self, component: Component) -> Result<()>;
}

fn attempt<O: BuildOps>(ops: &mut O, component: Component, valid: &mut bool) -> bool {
    match ops.build(component) {
        Ok(()) => true,
        Err(e) => {
            error!(target: LOG_GENERAL, "{}: {e:#}", component.name());
            *valid = false;
            false
        }
    }
}

/// Builds every component, skipping those whose prerequisite failed. The
/// render pass and sync need the chain; images and pipeline need the render
/// pass; the command context is always attempted. Returns whether all built.
pub fn build_components<O: BuildOps>(ops: &mut O) -> bool {
    let mut valid = true;
    let chain_ok = attempt(ops, Component::Chain, &mut valid);
    let pass_ok = chain_ok && attempt(ops, Component::RenderPass, &mut valid);
    if pass_ok {
        attempt(ops, Component::Images, &mut valid);
        attempt(ops, Component::Pipeline, &mut valid);
    }
    attempt(ops, Component::Commands, &mut valid);
    if chain_ok {
        attempt(ops, Component::Sync, &mut valid);
    }
    valid
}

/// The device steps of a chain rebuild.
pub trait ChainOps: ImageOps {
    /// Creates a chain for the current size, passing `old` to the driver.
    fn create_chain(&mut self, old: vk::SwapchainKHR) -> Result<PresentChain>;
    fn render_finished_len(&self) -> usize;
    /// Waits for the device to go idle, then resizes to `image_count`.
    fn resize_render_finished(&mut self, image_count: usize) -> Result<()>;
    /// Waits for the present queue to drain, then destroys `chain`.
    fn retire(&mut self, chain: PresentChain);
}

/// Holds the replaced chain; retires it on every exit from `refresh_chain`.
struct Retiring<'a, O: ChainOps> {
    ops: &'a mut O,
    old: PresentChain,
}

impl<O: ChainOps> Drop for Retiring<'_, O> {
    fn drop(&mut self) {
        self.ops.retire(std::mem::take(&mut self.old));
    }
}

/// Replaces `live` with a freshly created chain. On failure `live` is left
/// with no images, views or framebuffers. The old chain is always retired.
pub fn refresh_chain<O: ChainOps>(ops: &mut O, live: &mut PresentChain) -> bool {
    let guard = Retiring { old: std::mem::take(live), ops };

    match guard.ops.create_chain(guard.old.handle) {
        Ok(chain) => *live = chain,
        Err(e) => {
            error!(target: LOG_GENERAL, "present chain: {e:#}");
            return false;
        }
    }

    if let Err(e) = update_images(&mut *guard.ops, live) {
        error!(target: LOG_GENERAL, "{e:#}");
        return false;
    }

    let count = live.image_count();
    let had = guard.ops.render_finished_len();
    if count != had {
        debug!(target: LOG_GENERAL, "image count changed {had} -> {count}");
        if let Err(e) = guard.ops.resize_render_finished(count) {
            error!(target: LOG_GENERAL, "render-finished semaphores: {e:#}");
            return false;
        }
    }
    true
}

/// [`refresh_chain`] for an engine carrying a validity flag. Refuses when
/// already invalid; otherwise the flag takes the outcome.
pub fn refresh_guarded<O: ChainOps>(valid: &mut bool, ops: &mut O, live: &mut PresentChain) -> bool {
    if !*valid {
        warn!(target: LOG_GENERAL, "refresh on an invalid engine");
        return false;
    }
    *valid = refresh_chain(ops, live);
    *valid
}
