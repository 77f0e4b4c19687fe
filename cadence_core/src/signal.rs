// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Begin-frame signals.
//!
//! A [`FrameSignal`] announces that a new display refresh period has started
//! and carries the timing the consumer should honor for it:
//!
//! - `frame_time`: the start of the refresh period (animation time).
//! - `deadline`: the latest time work for this period may be submitted.
//! - `interval`: the refresh period.
//!
//! Signals are plain values. Per source, `frame_time` strictly increases;
//! consumers compare against the last signal they used to reject stale or
//! duplicate deliveries.

use crate::surface::SourceId;
use crate::time::{Duration, HostTime};

/// Whether a signal is a live refresh or a catch-up for one that elapsed
/// before the consumer was listening.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FrameSignalKind {
    /// A refresh delivered on time.
    #[default]
    Normal,
    /// A synthesized catch-up for a refresh that already elapsed.
    Missed,
}

/// A begin-frame signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameSignal {
    /// The source that produced the signal.
    pub source_id: SourceId,
    /// Start of the refresh period.
    pub frame_time: HostTime,
    /// Latest submission time for this period.
    pub deadline: HostTime,
    /// Length of the refresh period.
    pub interval: Duration,
    /// Live or catch-up.
    pub kind: FrameSignalKind,
}

impl FrameSignal {
    /// 60 Hz, the interval assumed when nothing better is known.
    pub const DEFAULT_INTERVAL: Duration = Duration(16_666);

    /// Creates a [`FrameSignalKind::Normal`] signal.
    #[must_use]
    pub const fn new(
        source_id: SourceId,
        frame_time: HostTime,
        deadline: HostTime,
        interval: Duration,
    ) -> Self {
        Self {
            source_id,
            frame_time,
            deadline,
            interval,
            kind: FrameSignalKind::Normal,
        }
    }

    /// Creates a [`FrameSignalKind::Missed`] signal.
    #[must_use]
    pub const fn missed(
        source_id: SourceId,
        frame_time: HostTime,
        deadline: HostTime,
        interval: Duration,
    ) -> Self {
        Self {
            source_id,
            frame_time,
            deadline,
            interval,
            kind: FrameSignalKind::Missed,
        }
    }

    /// Returns `true` for a catch-up signal.
    #[must_use]
    pub const fn is_missed(&self) -> bool {
        matches!(self.kind, FrameSignalKind::Missed)
    }

    /// The default share of the interval reserved for the parent compositor
    /// to draw after this frame's deadline.
    #[must_use]
    pub const fn default_estimated_parent_draw_time(interval: Duration) -> Duration {
        Duration(interval.0 / 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind() {
        let a = FrameSignal::new(SourceId(1), HostTime(100), HostTime(200), Duration(100));
        let b = FrameSignal::missed(SourceId(1), HostTime(100), HostTime(200), Duration(100));
        assert!(!a.is_missed());
        assert!(b.is_missed());
        assert_ne!(a, b);
    }

    #[test]
    fn default_parent_draw_time_is_a_third() {
        assert_eq!(
            FrameSignal::default_estimated_parent_draw_time(FrameSignal::DEFAULT_INTERVAL),
            Duration(5_555)
        );
    }
}
