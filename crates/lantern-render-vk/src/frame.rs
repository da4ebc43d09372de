// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use lantern_render::FrameStatus;

use crate::error::FrameError;

/// How many frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// The device-side steps of one frame. `slot` is the frame-in-flight index,
/// `image` the acquired chain image.
pub trait FrameOps {
    /// Blocks without timeout until the slot's previous submission retired.
    fn wait_in_flight(&mut self, slot: usize) -> VkResult<()>;
    /// `Ok((image, suboptimal))`; out-of-date arrives as `Err`.
    fn acquire(&mut self, slot: usize) -> VkResult<(u32, bool)>;
    fn reset_in_flight(&mut self, slot: usize) -> VkResult<()>;
    fn record(&mut self, slot: usize, image: u32) -> VkResult<()>;
    fn submit(&mut self, slot: usize, image: u32) -> VkResult<()>;
    /// `Ok(suboptimal)`; out-of-date arrives as `Err`.
    fn present(&mut self, image: u32) -> VkResult<bool>;
}

fn advance(slot: &mut usize) {
    *slot = (*slot + 1) % MAX_FRAMES_IN_FLIGHT;
}

/// Runs one frame and moves `slot` on unless the frame failed fatally.
pub fn run_frame<O: FrameOps>(ops: &mut O, slot: &mut usize) -> Result<FrameStatus, FrameError> {
    let s = *slot;
    ops.wait_in_flight(s).map_err(FrameError::Wait)?;

    let (image, mut stale) = match ops.acquire(s) {
        Ok(acquired) => acquired,
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            // The fence was not reset, so the next wait on this slot passes.
            advance(slot);
            return Ok(FrameStatus::Stale { presented: false });
        }
        Err(e) => return Err(FrameError::Acquire(e)),
    };

    ops.reset_in_flight(s).map_err(FrameError::ResetFence)?;
    ops.record(s, image).map_err(FrameError::Record)?;
    ops.submit(s, image).map_err(FrameError::Submit)?;

    let presented = match ops.present(image) {
        Ok(suboptimal) => {
            stale |= suboptimal;
            true
        }
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            stale = true;
            false
        }
        Err(e) => return Err(FrameError::Present(e)),
    };

    advance(slot);
    Ok(if stale {
        FrameStatus::Stale { presented }
    } else {
        FrameStatus::Presented
    })
}

/// [`run_frame`] behind the engine's validity flag. A fatal frame clears the
/// flag: its fence may never signal again, so the next call must not wait on it.
pub fn run_guarded<O: FrameOps>(
    valid: &mut bool,
    ops: &mut O,
    slot: &mut usize,
) -> Result<FrameStatus, FrameError> {
    if !*valid {
        return Err(FrameError::InvalidEngine);
    }
    let result = run_frame(ops, slot);
    if result.is_err() {
        *valid = false;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize, u32),
        Submit(usize, u32),
        Present(u32),
    }

    /// Fake device with scripted acquire/present results; unscripted calls
    /// succeed and images rotate through `image_count`.
    #[derive(Default)]
    struct Scripted {
        image_count: u32,
        next_image: u32,
        acquire: VecDeque<VkResult<(u32, bool)>>,
        present: VecDeque<VkResult<bool>>,
        record_err: Option<vk::Result>,
        submit_err: Option<vk::Result>,
        calls: Vec<Call>,
    }

    impl Scripted {
        fn new(image_count: u32) -> Self {
            Scripted { image_count, ..Default::default() }
        }

        fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| f(c)).count()
        }
    }

    impl FrameOps for Scripted {
        fn wait_in_flight(&mut self, slot: usize) -> VkResult<()> {
            self.calls.push(Call::Wait(slot));
            Ok(())
        }
        fn acquire(&mut self, slot: usize) -> VkResult<(u32, bool)> {
            self.calls.push(Call::Acquire(slot));
            self.acquire.pop_front().unwrap_or_else(|| {
                let i = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                Ok((i, false))
            })
        }
        fn reset_in_flight(&mut self, slot: usize) -> VkResult<()> {
            self.calls.push(Call::Reset(slot));
            Ok(())
        }
        fn record(&mut self, slot: usize, image: u32) -> VkResult<()> {
            self.calls.push(Call::Record(slot, image));
            self.record_err.map_or(Ok(()), Err)
        }
        fn submit(&mut self, slot: usize, image: u32) -> VkResult<()> {
            self.calls.push(Call::Submit(slot, image));
            self.submit_err.map_or(Ok(()), Err)
        }
        fn present(&mut self, image: u32) -> VkResult<bool> {
            self.calls.push(Call::Present(image));
            self.present.pop_front().unwrap_or(Ok(false))
        }
    }

    #[test]
    fn slot_cycles_through_zero_and_one() {
        let mut ops = Scripted::new(3);
        let mut slot = 0;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(slot);
            assert_eq!(run_frame(&mut ops, &mut slot), Ok(FrameStatus::Presented));
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn healthy_frame_runs_steps_in_order() {
        let mut ops = Scripted::new(3);
        let mut slot = 1;
        ops.acquire.push_back(Ok((2, false)));
        run_frame(&mut ops, &mut slot).unwrap();
        assert_eq!(
            ops.calls,
            vec![
                Call::Wait(1),
                Call::Acquire(1),
                Call::Reset(1),
                Call::Record(1, 2),
                Call::Submit(1, 2),
                Call::Present(2),
            ]
        );
        assert_eq!(slot, 0);
    }

    #[test]
    fn out_of_date_acquire_on_third_frame_skips_drawing() {
        let mut ops = Scripted::new(3);
        ops.acquire.extend([
            Ok((0, false)),
            Ok((1, false)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
        ]);
        let mut slot = 0;
        run_frame(&mut ops, &mut slot).unwrap();
        run_frame(&mut ops, &mut slot).unwrap();
        assert_eq!(slot, 0);
        let before = ops.calls.len();

        assert_eq!(run_frame(&mut ops, &mut slot), Ok(FrameStatus::Stale { presented: false }));
        assert_eq!(slot, 1);
        assert_eq!(&ops.calls[before..], &[Call::Wait(0), Call::Acquire(0)]);
    }

    #[test]
    fn suboptimal_acquire_still_presents() {
        let mut ops = Scripted::new(2);
        ops.acquire.push_back(Ok((1, true)));
        let mut slot = 0;
        assert_eq!(run_frame(&mut ops, &mut slot), Ok(FrameStatus::Stale { presented: true }));
        assert_eq!(ops.calls.last(), Some(&Call::Present(1)));
        assert_eq!(slot, 1);
    }

    #[test]
    fn suboptimal_or_out_of_date_present_is_stale() {
        let mut ops = Scripted::new(2);
        ops.present.extend([Ok(true), Err(vk::Result::ERROR_OUT_OF_DATE_KHR)]);
        let mut slot = 0;
        assert_eq!(run_frame(&mut ops, &mut slot), Ok(FrameStatus::Stale { presented: true }));
        assert_eq!(run_frame(&mut ops, &mut slot), Ok(FrameStatus::Stale { presented: false }));
        assert_eq!(run_frame(&mut ops, &mut slot), Ok(FrameStatus::Presented));
        assert_eq!(slot, 1);
    }

    #[test]
    fn other_acquire_errors_are_fatal() {
        let mut ops = Scripted::new(2);
        ops.acquire.push_back(Err(vk::Result::ERROR_SURFACE_LOST_KHR));
        let mut slot = 1;
        assert_eq!(
            run_frame(&mut ops, &mut slot),
            Err(FrameError::Acquire(vk::Result::ERROR_SURFACE_LOST_KHR))
        );
        assert_eq!(slot, 1);
        assert_eq!(ops.count(|c| matches!(c, Call::Reset(_))), 0);
    }

    #[test]
    fn record_failure_is_fatal_and_skips_submit() {
        let mut ops = Scripted::new(2);
        ops.record_err = Some(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        let mut slot = 0;
        assert_eq!(
            run_frame(&mut ops, &mut slot),
            Err(FrameError::Record(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
        );
        assert_eq!(slot, 0);
        assert_eq!(ops.count(|c| matches!(c, Call::Submit(..) | Call::Present(_))), 0);
    }

    #[test]
    fn submit_failure_is_fatal_and_skips_present() {
        let mut ops = Scripted::new(2);
        ops.submit_err = Some(vk::Result::ERROR_DEVICE_LOST);
        let mut slot = 0;
        assert_eq!(
            run_frame(&mut ops, &mut slot),
            Err(FrameError::Submit(vk::Result::ERROR_DEVICE_LOST))
        );
        assert_eq!(ops.count(|c| matches!(c, Call::Present(_))), 0);
    }

    #[test]
    fn other_present_errors_are_fatal() {
        let mut ops = Scripted::new(2);
        ops.present.push_back(Err(vk::Result::ERROR_DEVICE_LOST));
        let mut slot = 0;
        assert_eq!(
            run_frame(&mut ops, &mut slot),
            Err(FrameError::Present(vk::Result::ERROR_DEVICE_LOST))
        );
        assert_eq!(slot, 0);
    }

    #[test]
    fn submit_targets_acquired_image_not_slot() {
        let mut ops = Scripted::new(3);
        ops.acquire.extend([Ok((2, false)), Ok((0, false))]);
        let mut slot = 0;
        run_frame(&mut ops, &mut slot).unwrap();
        run_frame(&mut ops, &mut slot).unwrap();
        let submits: Vec<_> = ops
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Submit(..)))
            .copied()
            .collect();
        assert_eq!(submits, vec![Call::Submit(0, 2), Call::Submit(1, 0)]);
    }

    #[test]
    fn many_frames_never_fail() {
        for n in [0usize, 1, 2, 7, 64] {
            let mut ops = Scripted::new(3);
            let mut slot = 0;
            for _ in 0..n {
                assert!(run_frame(&mut ops, &mut slot).is_ok());
            }
            assert_eq!(slot, n % MAX_FRAMES_IN_FLIGHT);
            assert_eq!(ops.count(|c| matches!(c, Call::Present(_))), n);
        }
    }

    #[test]
    fn invalid_engine_never_touches_the_device() {
        let mut ops = Scripted::new(2);
        let mut valid = false;
        let mut slot = 1;
        assert_eq!(
            run_guarded(&mut valid, &mut ops, &mut slot),
            Err(FrameError::InvalidEngine)
        );
        assert!(ops.calls.is_empty());
        assert_eq!(slot, 1);
    }

    #[test]
    fn fatal_frame_invalidates_instead_of_waiting_again() {
        let mut ops = Scripted::new(2);
        ops.submit_err = Some(vk::Result::ERROR_DEVICE_LOST);
        let mut valid = true;
        let mut slot = 0;

        assert_eq!(
            run_guarded(&mut valid, &mut ops, &mut slot),
            Err(FrameError::Submit(vk::Result::ERROR_DEVICE_LOST))
        );
        assert!(!valid);
        let waits = ops.count(|c| matches!(c, Call::Wait(_)));

        assert_eq!(
            run_guarded(&mut valid, &mut ops, &mut slot),
            Err(FrameError::InvalidEngine)
        );
        assert_eq!(ops.count(|c| matches!(c, Call::Wait(_))), waits);
    }

    #[test]
    fn stale_frames_keep_the_engine_valid() {
        let mut ops = Scripted::new(2);
        ops.acquire.push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        let mut valid = true;
        let mut slot = 0;
        assert_eq!(
            run_guarded(&mut valid, &mut ops, &mut slot),
            Ok(FrameStatus::Stale { presented: false })
        );
        assert!(valid);
        assert_eq!(run_guarded(&mut valid, &mut ops, &mut slot), Ok(FrameStatus::Presented));
    }
}
