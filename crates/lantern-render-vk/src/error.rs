// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// A per-frame failure the caller cannot recover from with `refresh`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("engine is not valid")]
    InvalidEngine,
    #[error("waiting on in-flight fence failed: {0}")]
    Wait(vk::Result),
    #[error("acquiring next image failed: {0}")]
    Acquire(vk::Result),
    #[error("resetting in-flight fence failed: {0}")]
    ResetFence(vk::Result),
    #[error("recording command buffer failed: {0}")]
    Record(vk::Result),
    #[error("queue submit failed: {0}")]
    Submit(vk::Result),
    #[error("queue present failed: {0}")]
    Present(vk::Result),
}
