// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Configuration for [`FrameScheduler`](super::FrameScheduler).

use crate::time::Duration;

/// A configuration value that cannot work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// A refresh or background interval of zero.
    #[error("{name} must be non-zero")]
    ZeroInterval {
        /// Which setting.
        name: &'static str,
    },
    /// A swap budget of zero would block every draw.
    #[error("max_swaps_pending must be at least 1")]
    ZeroSwapBudget,
    /// Forcing a draw after zero failures is meaningless.
    #[error("maximum_failed_draws_before_draw_is_forced must be at least 1")]
    ZeroFailedDrawLimit,
}

/// Behavior switches and limits for the frame scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Drawing is invoked by the embedder through
    /// [`on_draw_for_output_surface`](super::FrameScheduler::on_draw_for_output_surface)
    /// instead of on the scheduler's own deadline.
    pub using_synchronous_renderer_compositor: bool,
    /// Pace frames to the display. When `false` the scheduler runs
    /// back-to-back, limited only by how fast frames finish.
    pub throttle_frame_production: bool,
    /// Pass begin-frame signals on to child schedulers while they ask for
    /// them.
    pub forward_begin_frames_to_children: bool,
    /// After activation, hold the deadline until
    /// [`notify_ready_to_draw`](super::FrameScheduler::notify_ready_to_draw).
    pub wait_for_ready_to_draw: bool,
    /// Force a draw after repeated checkerboarded animation frames.
    pub timeout_and_draw_when_animation_checkerboards: bool,
    /// How many consecutive checkerboarded draws trigger a forced draw.
    pub maximum_failed_draws_before_draw_is_forced: u32,
    /// Tick interval used while invisible.
    pub background_frame_interval: Duration,
    /// Swaps that may await completion before drawing is throttled.
    pub max_swaps_pending: u32,
    /// Consecutive frames without any action before begin frames are no
    /// longer requested.
    pub idle_frames_before_stop: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            using_synchronous_renderer_compositor: false,
            throttle_frame_production: true,
            forward_begin_frames_to_children: false,
            wait_for_ready_to_draw: false,
            timeout_and_draw_when_animation_checkerboards: true,
            maximum_failed_draws_before_draw_is_forced: 3,
            background_frame_interval: Duration::from_secs(1),
            max_swaps_pending: 1,
            idle_frames_before_stop: 2,
        }
    }
}

impl SchedulerSettings {
    /// Settings for an embedder that invokes drawing itself.
    #[must_use]
    pub fn synchronous() -> Self {
        Self {
            using_synchronous_renderer_compositor: true,
            ..Self::default()
        }
    }

    /// Checks that the settings describe a scheduler that can make progress.
    ///
    /// # Errors
    ///
    /// Returns the first offending setting.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.background_frame_interval.is_zero() {
            return Err(SettingsError::ZeroInterval {
                name: "background_frame_interval",
            });
        }
        if self.max_swaps_pending == 0 {
            return Err(SettingsError::ZeroSwapBudget);
        }
        if self.maximum_failed_draws_before_draw_is_forced == 0 {
            return Err(SettingsError::ZeroFailedDrawLimit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SchedulerSettings::default().validate(), Ok(()));
        assert_eq!(SchedulerSettings::synchronous().validate(), Ok(()));
        assert!(SchedulerSettings::synchronous().using_synchronous_renderer_compositor);
    }

    #[test]
    fn rejects_unworkable_values() {
        let s = SchedulerSettings {
            max_swaps_pending: 0,
            ..SchedulerSettings::default()
        };
        assert_eq!(s.validate(), Err(SettingsError::ZeroSwapBudget));

        let s = SchedulerSettings {
            background_frame_interval: Duration::ZERO,
            ..SchedulerSettings::default()
        };
        let err = s.validate().unwrap_err();
        assert_eq!(err.to_string(), "background_frame_interval must be non-zero");
    }
}
