// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Duration estimates for the stages of the frame pipeline.
//!
//! The frame scheduler pulls these estimates to place its deadline and to
//! decide whether skipping work would actually recover latency. How they are
//! measured is up to the embedder: [`FixedTimingHistory`] holds values set by
//! hand, [`SmoothedTimingHistory`] smooths measured samples with an
//! exponential moving average.

use core::cell::Cell;

use crate::time::Duration;

/// Read-only source of pipeline stage estimates.
pub trait CompositorTimingHistory {
    /// From sending a begin-main-frame to the main thread being ready to
    /// commit.
    fn begin_main_frame_to_commit_duration_estimate(&self) -> Duration;

    /// From commit to the pending tree being ready to activate.
    fn commit_to_ready_to_activate_duration_estimate(&self) -> Duration;

    /// Time spent preparing tiles.
    fn prepare_tiles_duration_estimate(&self) -> Duration;

    /// Time spent activating a pending tree.
    fn activate_duration_estimate(&self) -> Duration;

    /// Time spent drawing and submitting a frame.
    fn draw_duration_estimate(&self) -> Duration;
}

/// Estimates set directly. All zero by default.
#[derive(Debug, Default)]
pub struct FixedTimingHistory {
    begin_main_frame_to_commit: Cell<Duration>,
    commit_to_ready_to_activate: Cell<Duration>,
    prepare_tiles: Cell<Duration>,
    activate: Cell<Duration>,
    draw: Cell<Duration>,
}

impl FixedTimingHistory {
    /// Creates a history with every estimate at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the begin-main-frame-to-commit estimate.
    pub fn set_begin_main_frame_to_commit(&self, d: Duration) {
        self.begin_main_frame_to_commit.set(d);
    }

    /// Sets the commit-to-ready-to-activate estimate.
    pub fn set_commit_to_ready_to_activate(&self, d: Duration) {
        self.commit_to_ready_to_activate.set(d);
    }

    /// Sets the prepare-tiles estimate.
    pub fn set_prepare_tiles(&self, d: Duration) {
        self.prepare_tiles.set(d);
    }

    /// Sets the activation estimate.
    pub fn set_activate(&self, d: Duration) {
        self.activate.set(d);
    }

    /// Sets the draw estimate.
    pub fn set_draw(&self, d: Duration) {
        self.draw.set(d);
    }
}

impl CompositorTimingHistory for FixedTimingHistory {
    fn begin_main_frame_to_commit_duration_estimate(&self) -> Duration {
        self.begin_main_frame_to_commit.get()
    }

    fn commit_to_ready_to_activate_duration_estimate(&self) -> Duration {
        self.commit_to_ready_to_activate.get()
    }

    fn prepare_tiles_duration_estimate(&self) -> Duration {
        self.prepare_tiles.get()
    }

    fn activate_duration_estimate(&self) -> Duration {
        self.activate.get()
    }

    fn draw_duration_estimate(&self) -> Duration {
        self.draw.get()
    }
}

/// Exponential moving average tracker.
#[derive(Clone, Copy, Debug)]
struct Ema {
    value: f32,
    alpha: f32,
    initialized: bool,
}

impl Ema {
    const fn new(alpha: f32) -> Self {
        Self {
            value: 0.0,
            alpha,
            initialized: false,
        }
    }

    fn update(&mut self, sample: f32) {
        if self.initialized {
            self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        } else {
            self.value = sample;
            self.initialized = true;
        }
    }

    const fn get(&self) -> f32 {
        self.value
    }
}

/// Smoothing parameters for [`SmoothedTimingHistory`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingConfig {
    /// EMA smoothing factor (0.0 to 1.0). Smaller values = more smoothing.
    pub ema_alpha: f32,
    /// Multiplier applied to the smoothed value to leave headroom.
    pub safety_multiplier: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.2,
            safety_multiplier: 1.5,
        }
    }
}

/// Estimates smoothed from measured samples.
///
/// Each estimate is the EMA of the recorded samples scaled by
/// [`SmoothingConfig::safety_multiplier`]. Stages with no samples estimate
/// zero.
#[derive(Debug)]
pub struct SmoothedTimingHistory {
    config: SmoothingConfig,
    begin_main_frame_to_commit: Cell<Ema>,
    commit_to_ready_to_activate: Cell<Ema>,
    prepare_tiles: Cell<Ema>,
    activate: Cell<Ema>,
    draw: Cell<Ema>,
}

impl Default for SmoothedTimingHistory {
    fn default() -> Self {
        Self::new(SmoothingConfig::default())
    }
}

impl SmoothedTimingHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new(config: SmoothingConfig) -> Self {
        let ema = Cell::new(Ema::new(config.ema_alpha));
        Self {
            config,
            begin_main_frame_to_commit: ema.clone(),
            commit_to_ready_to_activate: ema.clone(),
            prepare_tiles: ema.clone(),
            activate: ema.clone(),
            draw: ema,
        }
    }

    /// Records a begin-main-frame-to-commit sample.
    pub fn record_begin_main_frame_to_commit(&self, d: Duration) {
        record(&self.begin_main_frame_to_commit, d);
    }

    /// Records a commit-to-ready-to-activate sample.
    pub fn record_commit_to_ready_to_activate(&self, d: Duration) {
        record(&self.commit_to_ready_to_activate, d);
    }

    /// Records a prepare-tiles sample.
    pub fn record_prepare_tiles(&self, d: Duration) {
        record(&self.prepare_tiles, d);
    }

    /// Records an activation sample.
    pub fn record_activate(&self, d: Duration) {
        record(&self.activate, d);
    }

    /// Records a draw sample.
    pub fn record_draw(&self, d: Duration) {
        record(&self.draw, d);
    }

    fn estimate(&self, ema: &Cell<Ema>) -> Duration {
        let scaled = ema.get().get() * self.config.safety_multiplier;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "smoothed microsecond durations fit in u64; negative values saturate to 0"
        )]
        let micros = scaled as u64;
        Duration(micros)
    }
}

fn record(ema: &Cell<Ema>, d: Duration) {
    let mut e = ema.get();
    e.update(d.micros() as f32);
    ema.set(e);
}

impl CompositorTimingHistory for SmoothedTimingHistory {
    fn begin_main_frame_to_commit_duration_estimate(&self) -> Duration {
        self.estimate(&self.begin_main_frame_to_commit)
    }

    fn commit_to_ready_to_activate_duration_estimate(&self) -> Duration {
        self.estimate(&self.commit_to_ready_to_activate)
    }

    fn prepare_tiles_duration_estimate(&self) -> Duration {
        self.estimate(&self.prepare_tiles)
    }

    fn activate_duration_estimate(&self) -> Duration {
        self.estimate(&self.activate)
    }

    fn draw_duration_estimate(&self) -> Duration {
        self.estimate(&self.draw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_history_reports_what_was_set() {
        let h = FixedTimingHistory::new();
        assert_eq!(h.draw_duration_estimate(), Duration::ZERO);
        h.set_draw(Duration(2_000));
        h.set_activate(Duration(500));
        assert_eq!(h.draw_duration_estimate(), Duration(2_000));
        assert_eq!(h.activate_duration_estimate(), Duration(500));
        assert_eq!(h.begin_main_frame_to_commit_duration_estimate(), Duration::ZERO);
    }

    #[test]
    fn first_sample_seeds_the_average() {
        let h = SmoothedTimingHistory::new(SmoothingConfig {
            ema_alpha: 0.5,
            safety_multiplier: 1.0,
        });
        h.record_draw(Duration(1_000));
        assert_eq!(h.draw_duration_estimate(), Duration(1_000));
        h.record_draw(Duration(3_000));
        assert_eq!(h.draw_duration_estimate(), Duration(2_000));
        assert_eq!(h.prepare_tiles_duration_estimate(), Duration::ZERO);
    }

    #[test]
    fn safety_multiplier_scales_estimate() {
        let h = SmoothedTimingHistory::default();
        h.record_commit_to_ready_to_activate(Duration(4_000));
        assert_eq!(
            h.commit_to_ready_to_activate_duration_estimate(),
            Duration(6_000)
        );
    }
}
