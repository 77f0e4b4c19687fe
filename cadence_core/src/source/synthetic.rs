// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::rc::{Rc, Weak};
use core::fmt;

use super::{BeginFrameSource, SourceCore};
use crate::signal::FrameSignal;
use crate::task::TaskRunner;
use crate::tick::{PeriodicTickSource, TickClient};
use crate::time::{Duration, HostTime};

/// A source driven by a phase-locked [`PeriodicTickSource`].
///
/// Each tick becomes a signal with `frame_time` at the tick and `deadline` at
/// the following tick. When demand resumes after the timer missed a tick, a
/// [`Missed`](crate::signal::FrameSignalKind::Missed) signal for that tick is
/// delivered right away.
pub struct SyntheticBeginFrameSource {
    core: SourceCore,
    ticks: Rc<PeriodicTickSource>,
}

impl fmt::Debug for SyntheticBeginFrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticBeginFrameSource")
            .field("core", &self.core)
            .field("ticks", &self.ticks)
            .finish()
    }
}

impl SyntheticBeginFrameSource {
    /// Creates a source ticking every `interval`.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn new(runner: Rc<dyn TaskRunner>, interval: Duration) -> Rc<Self> {
        let ticks = PeriodicTickSource::new(runner, interval);
        Rc::new_cyclic(|this: &Weak<Self>| {
            let client: Weak<dyn TickClient> = this.clone();
            ticks.set_client(client);
            Self {
                core: SourceCore::new(),
                ticks,
            }
        })
    }

    /// Re-phases the underlying timer.
    pub fn on_update_vsync_parameters(&self, timebase: HostTime, interval: Duration) {
        self.ticks.set_timebase_and_interval(timebase, interval);
    }

    /// Current tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.ticks.interval()
    }

    fn signal_for(&self, frame_time: HostTime, missed: bool) -> FrameSignal {
        let interval = self.ticks.interval();
        let deadline = self.ticks.next_tick_time().unwrap_or(frame_time + interval);
        if missed {
            FrameSignal::missed(self.source_id(), frame_time, deadline, interval)
        } else {
            FrameSignal::new(self.source_id(), frame_time, deadline, interval)
        }
    }
}

impl TickClient for SyntheticBeginFrameSource {
    fn on_tick(&self) {
        let signal = self.signal_for(self.ticks.last_tick_time(), false);
        self.core.emit(&signal);
    }
}

impl BeginFrameSource for SyntheticBeginFrameSource {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn on_needs_begin_frames_change(&self, needs: bool) {
        if let Some(missed_at) = self.ticks.set_active(needs) {
            let signal = self.signal_for(missed_at, true);
            log::trace!("synthetic source catching up on {missed_at:?}");
            self.core.emit(&signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::FrameSignalKind;
    use crate::source::testing::RecordingObserver;
    use crate::task::VirtualTaskRunner;

    #[test]
    fn ticks_become_normal_signals() {
        let runner = Rc::new(VirtualTaskRunner::default());
        let source = SyntheticBeginFrameSource::new(runner.clone(), Duration(10_000));
        let observer = RecordingObserver::new();
        source.add_observer(observer.weak());

        source.set_needs_begin_frames(true);
        assert!(observer.take().is_empty(), "no catch-up at time zero");

        runner.run_until_time(HostTime(20_000));
        let signals = observer.take();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].frame_time, HostTime(10_000));
        assert_eq!(signals[0].deadline, HostTime(20_000));
        assert_eq!(signals[0].kind, FrameSignalKind::Normal);
        assert_eq!(signals[1].frame_time, HostTime(20_000));
        assert_eq!(signals[1].deadline, HostTime(30_000));
    }

    #[test]
    fn late_activation_emits_missed_signal() {
        let runner = Rc::new(VirtualTaskRunner::new(HostTime(10_010)));
        let source = SyntheticBeginFrameSource::new(runner.clone(), Duration(10_000));
        let observer = RecordingObserver::new();
        source.add_observer(observer.weak());

        source.set_needs_begin_frames(true);
        let signals = observer.take();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, FrameSignalKind::Missed);
        assert_eq!(signals[0].frame_time, HostTime(10_000));
        assert_eq!(signals[0].deadline, HostTime(20_000));
        assert_eq!(signals[0].interval, Duration(10_000));
    }

    #[test]
    fn stopping_cancels_timer() {
        let runner = Rc::new(VirtualTaskRunner::default());
        let source = SyntheticBeginFrameSource::new(runner.clone(), Duration(10_000));
        let observer = RecordingObserver::new();
        source.add_observer(observer.weak());

        source.set_needs_begin_frames(true);
        source.set_needs_begin_frames(false);
        runner.run_for_period(Duration(50_000));
        assert!(observer.take().is_empty());
    }

    #[test]
    fn vsync_update_rephases_ticks() {
        let runner = Rc::new(VirtualTaskRunner::default());
        let source = SyntheticBeginFrameSource::new(runner.clone(), Duration(10_000));
        let observer = RecordingObserver::new();
        source.add_observer(observer.weak());

        source.set_needs_begin_frames(true);
        source.on_update_vsync_parameters(HostTime::ZERO, Duration(20_000));
        runner.run_until_time(HostTime(40_000));
        let times: alloc::vec::Vec<_> = observer.take().iter().map(|s| s.frame_time).collect();
        assert_eq!(times, [HostTime(20_000), HostTime(40_000)]);
    }
}
