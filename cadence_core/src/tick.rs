// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Phase-locked periodic timer.
//!
//! [`PeriodicTickSource`] fires its [`TickClient`] once per interval, aligned
//! to a timebase: every tick lands on `timebase + k * interval` for some
//! integer `k`. Each tick is rescheduled from the current clock reading rather
//! than from the previous target, so a late task never accumulates drift.
//!
//! Two guards keep the tick stream stable:
//!
//! - A computed target within half an interval of the last tick is pushed out
//!   one more interval. This absorbs jitter in timebase updates and
//!   stop/start cycles without ever producing two ticks less than half an
//!   interval apart.
//! - A timebase or interval update is absorbed silently unless it moves the
//!   next target by more than half an interval or changes the interval by
//!   more than a quarter. Larger changes cancel the pending task and
//!   reschedule immediately.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use core::cell::RefCell;
use core::fmt;

use crate::task::{TaskHandle, TaskRunner};
use crate::time::{Duration, HostTime};

/// Receives ticks from a [`PeriodicTickSource`].
pub trait TickClient {
    /// Called once per tick, after the next tick has been scheduled.
    fn on_tick(&self);
}

struct TickState {
    active: bool,
    timebase: HostTime,
    interval: Duration,
    last_tick_time: HostTime,
    next_tick_target: HostTime,
    pending: Option<TaskHandle>,
}

/// A timer that ticks at `timebase + k * interval`.
pub struct PeriodicTickSource {
    runner: Rc<dyn TaskRunner>,
    client: RefCell<Option<Weak<dyn TickClient>>>,
    state: RefCell<TickState>,
    this: Weak<Self>,
}

impl fmt::Debug for PeriodicTickSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("PeriodicTickSource")
            .field("active", &s.active)
            .field("timebase", &s.timebase)
            .field("interval", &s.interval)
            .field("last_tick_time", &s.last_tick_time)
            .field("next_tick_target", &s.next_tick_target)
            .finish_non_exhaustive()
    }
}

impl PeriodicTickSource {
    /// Creates an inactive tick source with a zero timebase.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn new(runner: Rc<dyn TaskRunner>, interval: Duration) -> Rc<Self> {
        assert!(!interval.is_zero(), "tick interval must be non-zero");
        Rc::new_cyclic(|this| Self {
            runner,
            client: RefCell::new(None),
            state: RefCell::new(TickState {
                active: false,
                timebase: HostTime::ZERO,
                interval,
                last_tick_time: HostTime::ZERO,
                next_tick_target: HostTime::ZERO,
                pending: None,
            }),
            this: this.clone(),
        })
    }

    /// Sets the receiver of ticks. Only a weak reference is kept.
    pub fn set_client(&self, client: Weak<dyn TickClient>) {
        *self.client.borrow_mut() = Some(client);
    }

    /// Returns `true` while ticks are being scheduled.
    #[must_use]
    pub fn active(&self) -> bool {
        self.state.borrow().active
    }

    /// Current tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.state.borrow().interval
    }

    /// Time of the most recent tick (or missed tick reported by
    /// [`set_active`](Self::set_active)).
    #[must_use]
    pub fn last_tick_time(&self) -> HostTime {
        self.state.borrow().last_tick_time
    }

    /// Target time of the scheduled tick, or `None` while inactive.
    #[must_use]
    pub fn next_tick_time(&self) -> Option<HostTime> {
        let s = self.state.borrow();
        s.active.then_some(s.next_tick_target)
    }

    /// Starts or stops the timer.
    ///
    /// When activating, returns the time of a tick that would have fired
    /// while the timer was inactive, if one was missed. Reactivating before
    /// the previously computed target re-targets that same time.
    pub fn set_active(&self, active: bool) -> Option<HostTime> {
        {
            let mut s = self.state.borrow_mut();
            if s.active == active {
                return None;
            }
            s.active = active;
        }
        if !active {
            self.cancel_pending();
            return None;
        }

        self.reset_tick_task();

        let mut s = self.state.borrow_mut();
        let last_if_always_active = s.next_tick_target.saturating_sub(s.interval);
        let threshold = s.last_tick_time + s.interval / 2;
        if last_if_always_active > threshold {
            s.last_tick_time = last_if_always_active;
            log::trace!("tick source reactivated after missing tick at {last_if_always_active:?}");
            Some(last_if_always_active)
        } else {
            None
        }
    }

    /// Updates the phase anchor and period.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn set_timebase_and_interval(&self, timebase: HostTime, interval: Duration) {
        assert!(!interval.is_zero(), "tick interval must be non-zero");
        let (old_interval, scheduled) = {
            let mut s = self.state.borrow_mut();
            let old = s.interval;
            s.timebase = timebase;
            s.interval = interval;
            if !s.active {
                return;
            }
            (old, s.next_tick_target)
        };

        let interval_delta = old_interval.micros().abs_diff(interval.micros());
        if interval_delta * 4 > interval.micros() {
            log::debug!("tick interval changed {old_interval:?} -> {interval:?}; resetting");
            self.reset_tick_task();
            return;
        }

        let candidate = self.next_tick_target(self.runner.now());
        if candidate.micros().abs_diff(scheduled.micros()) > interval.micros() / 2 {
            log::debug!("tick phase moved {scheduled:?} -> {candidate:?}; resetting");
            self.reset_tick_task();
        }
    }

    /// Smallest aligned time at or after `now`, pushed one interval further
    /// if it would land within half an interval of the last tick.
    fn next_tick_target(&self, now: HostTime) -> HostTime {
        let s = self.state.borrow();
        let interval = i128::from(s.interval.micros());
        let phase = i128::from(s.timebase.micros()) - i128::from(now.micros());
        let offset = phase.rem_euclid(interval);
        // `offset` is in [0, interval), which always fits in u64.
        let mut target = now + Duration(u64::try_from(offset).unwrap_or(0));
        if target.saturating_duration_since(s.last_tick_time) <= s.interval / 2 {
            target += s.interval;
        }
        target
    }

    fn reset_tick_task(&self) {
        self.cancel_pending();
        self.post_next_tick_task(self.runner.now());
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self.state.borrow_mut().pending.take() {
            self.runner.cancel(handle);
        }
    }

    fn post_next_tick_task(&self, now: HostTime) {
        let target = self.next_tick_target(now);
        let weak = self.this.clone();
        let handle = self.runner.post_delayed_task(
            target.saturating_duration_since(now),
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.on_timer_tick();
                }
            }),
        );
        let mut s = self.state.borrow_mut();
        s.next_tick_target = target;
        s.pending = Some(handle);
    }

    /// The next tick is placed from the current time, not from the tick's
    /// target, so a late timer skips the ticks it missed instead of bursting.
    fn on_timer_tick(&self) {
        {
            let mut s = self.state.borrow_mut();
            s.pending = None;
            s.last_tick_time = s.next_tick_target;
        }
        self.post_next_tick_task(self.runner.now());

        let client = self.client.borrow().as_ref().and_then(Weak::upgrade);
        if let Some(client) = client {
            client.on_tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::VirtualTaskRunner;
    use core::cell::Cell;

    const INTERVAL: Duration = Duration::from_millis(16);

    #[derive(Default)]
    struct CountingClient {
        ticks: Cell<u32>,
    }

    impl TickClient for CountingClient {
        fn on_tick(&self) {
            self.ticks.set(self.ticks.get() + 1);
        }
    }

    fn setup(runner: &Rc<VirtualTaskRunner>) -> (Rc<PeriodicTickSource>, Rc<CountingClient>) {
        let source = PeriodicTickSource::new(runner.clone(), INTERVAL);
        let client = Rc::new(CountingClient::default());
        let weak: Weak<dyn TickClient> = Rc::downgrade(&client) as Weak<dyn TickClient>;
        source.set_client(weak);
        (source, client)
    }

    fn next_delay_ms(runner: &VirtualTaskRunner) -> u64 {
        runner
            .delay_to_next_task()
            .map(|d| d.micros() / 1_000)
            .unwrap_or(u64::MAX)
    }

    #[test]
    fn activating_posts_one_task_and_ticks() {
        let runner = Rc::new(VirtualTaskRunner::manual(HostTime::ZERO));
        let (source, client) = setup(&runner);

        source.set_active(true);
        source.set_active(true);
        assert_eq!(runner.pending_task_count(), 1);

        runner.set_now(HostTime::ZERO + INTERVAL);
        runner.run_pending_tasks();
        assert_eq!(client.ticks.get(), 1);
        assert!(runner.has_pending_tasks(), "next tick should be scheduled");
    }

    #[test]
    fn deactivating_cancels_pending_tick() {
        let runner = Rc::new(VirtualTaskRunner::manual(HostTime::ZERO));
        let (source, client) = setup(&runner);

        source.set_active(true);
        source.set_active(false);
        assert!(!runner.has_pending_tasks(), "tick task should be cancelled");
        runner.run_pending_tasks();
        assert_eq!(client.ticks.get(), 0);
    }

    #[test]
    fn jittery_timebases_never_double_tick() {
        let runner = Rc::new(VirtualTaskRunner::manual(HostTime::ZERO));
        let (source, _client) = setup(&runner);

        source.set_active(true);
        runner.run_pending_tasks();
        assert_eq!(next_delay_ms(&runner), 16);

        let mut future_timebase = runner.now() + INTERVAL * 10;
        // (jitter applied to the clock, expected next delay in ms)
        let steps: [(i64, u64); 12] = [
            (1, 15),
            (-1, 16),
            (-1, 17),
            (1, 16),
            (8, 8),
            (-8, 16),
            (-8, 24),
            (8, 16),
            (15, 1),
            (-15, 16),
            (-15, 31),
            (15, 16),
        ];
        for (jitter_ms, expected) in steps {
            future_timebase += INTERVAL;
            source.set_timebase_and_interval(future_timebase, INTERVAL);
            let step = i64::try_from(INTERVAL.micros()).unwrap() + jitter_ms * 1_000;
            runner.advance_now(Duration(u64::try_from(step).unwrap()));
            runner.run_pending_tasks();
            assert_eq!(next_delay_ms(&runner), expected, "jitter {jitter_ms}ms");
        }
    }

    #[test]
    fn tick_two_intervals_late_posts_zero_delay() {
        let runner = Rc::new(VirtualTaskRunner::manual(HostTime::ZERO));
        let (source, _client) = setup(&runner);

        source.set_active(true);
        assert_eq!(next_delay_ms(&runner), 16);
        runner.set_now(HostTime::ZERO + INTERVAL * 3);
        runner.run_pending_tasks();
        assert_eq!(runner.delay_to_next_task(), Some(Duration::ZERO));
    }

    #[test]
    fn reactivating_before_target_keeps_original_tick() {
        let runner = Rc::new(VirtualTaskRunner::manual(HostTime::ZERO));
        let (source, _client) = setup(&runner);

        source.set_active(true);
        runner.set_now(HostTime::ZERO + INTERVAL);
        runner.run_pending_tasks();
        // Last tick at 16ms, next target 32ms.
        runner.set_now(HostTime::from_micros(20_000));
        source.set_active(false);
        let missed = source.set_active(true);
        assert_eq!(missed, None);
        assert_eq!(source.next_tick_time(), Some(HostTime::from_micros(32_000)));
        assert_eq!(next_delay_ms(&runner), 12);
    }

    #[test]
    fn reactivating_after_gap_reports_missed_tick() {
        let runner = Rc::new(VirtualTaskRunner::manual(HostTime::ZERO));
        let source = PeriodicTickSource::new(runner.clone(), Duration(10_000));

        runner.set_now(HostTime(10_010));
        let missed = source.set_active(true);
        assert_eq!(missed, Some(HostTime(10_000)));
        assert_eq!(source.last_tick_time(), HostTime(10_000));
        assert_eq!(source.next_tick_time(), Some(HostTime(20_000)));
    }

    #[test]
    fn large_phase_change_resets_immediately() {
        let runner = Rc::new(VirtualTaskRunner::manual(HostTime::ZERO));
        let (source, _client) = setup(&runner);

        source.set_active(true);
        runner.set_now(HostTime::ZERO + INTERVAL);
        runner.run_pending_tasks();
        assert_eq!(source.next_tick_time(), Some(HostTime(32_000)));

        // The new phase puts the next aligned tick 11ms past the scheduled one.
        runner.set_now(HostTime(30_000));
        source.set_timebase_and_interval(HostTime(43_000), INTERVAL);
        assert_eq!(source.next_tick_time(), Some(HostTime(43_000)));
        assert_eq!(runner.pending_task_count(), 1);
        assert_eq!(next_delay_ms(&runner), 13);
    }

    #[test]
    fn small_phase_change_is_absorbed() {
        let runner = Rc::new(VirtualTaskRunner::manual(HostTime::ZERO));
        let (source, _client) = setup(&runner);

        source.set_active(true);
        source.set_timebase_and_interval(HostTime(2_000), INTERVAL);
        assert_eq!(source.next_tick_time(), Some(HostTime(16_000)));
    }

    #[test]
    fn interval_change_resets() {
        let runner = Rc::new(VirtualTaskRunner::manual(HostTime::ZERO));
        let (source, _client) = setup(&runner);

        source.set_active(true);
        source.set_timebase_and_interval(HostTime::ZERO, Duration::from_millis(33));
        assert_eq!(source.next_tick_time(), Some(HostTime(33_000)));
        assert_eq!(source.interval(), Duration::from_millis(33));
    }

    #[test]
    fn steady_ticks_on_auto_advancing_clock() {
        let runner = Rc::new(VirtualTaskRunner::default());
        let (source, client) = setup(&runner);

        source.set_active(true);
        runner.run_for_period(INTERVAL * 10);
        assert_eq!(client.ticks.get(), 10);
        assert_eq!(source.last_tick_time(), HostTime(160_000));
    }
}
