// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Randomized checks of the ordering and spacing guarantees.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use proptest::prelude::*;

use cadence_core::signal::FrameSignal;
use cadence_core::source::{
    BeginFrameObserver, BeginFrameSource, BeginFrameSourceMultiplexer, ExternalBeginFrameSource,
};
use cadence_core::surface::SourceId;
use cadence_core::task::{TaskRunner, VirtualTaskRunner};
use cadence_core::tick::{PeriodicTickSource, TickClient};
use cadence_core::time::{Duration, HostTime};

#[derive(Default)]
struct Recorder {
    signals: RefCell<Vec<FrameSignal>>,
}

impl BeginFrameObserver for Recorder {
    fn on_begin_frame(&self, signal: &FrameSignal) {
        self.signals.borrow_mut().push(*signal);
    }

    fn last_used_begin_frame_signal(&self) -> Option<FrameSignal> {
        self.signals.borrow().last().copied()
    }
}

struct TickLog {
    runner: Rc<VirtualTaskRunner>,
    times: RefCell<Vec<HostTime>>,
}

impl TickClient for TickLog {
    fn on_tick(&self) {
        self.times.borrow_mut().push(self.runner.now());
    }
}

fn ticking(
    runner: &Rc<VirtualTaskRunner>,
    interval: Duration,
) -> (Rc<PeriodicTickSource>, Rc<TickLog>) {
    let task_runner: Rc<dyn TaskRunner> = runner.clone();
    let ticks = PeriodicTickSource::new(task_runner, interval);
    let log = Rc::new(TickLog {
        runner: runner.clone(),
        times: RefCell::new(Vec::new()),
    });
    let client: Weak<dyn TickClient> = Rc::<TickLog>::downgrade(&log);
    ticks.set_client(client);
    (ticks, log)
}

proptest! {
    #[test]
    fn multiplexer_output_is_monotonic_and_spaced(
        times in prop::collection::vec(0_u64..200_000, 1..64),
        min_interval in 0_u64..20_000,
        switch_at in prop::collection::vec(any::<bool>(), 64),
    ) {
        let mux = BeginFrameSourceMultiplexer::new();
        let a = ExternalBeginFrameSource::new();
        let b = ExternalBeginFrameSource::new();
        let a_dyn: Rc<dyn BeginFrameSource> = a.clone();
        let b_dyn: Rc<dyn BeginFrameSource> = b.clone();
        mux.add_source(a_dyn.clone());
        mux.add_source(b_dyn.clone());
        mux.set_minimum_interval(Duration(min_interval));

        let recorder = Rc::new(Recorder::default());
        let observer: Weak<dyn BeginFrameObserver> = Rc::<Recorder>::downgrade(&recorder);
        mux.add_observer(observer);
        mux.set_needs_begin_frames(true);

        for (i, t) in times.iter().enumerate() {
            if switch_at[i] {
                let next = if mux.is_active(&a_dyn) { b_dyn.clone() } else { a_dyn.clone() };
                mux.set_active_source(Some(next));
            }
            let signal = FrameSignal::new(
                SourceId(0),
                HostTime(*t),
                HostTime(*t + 16_666),
                FrameSignal::DEFAULT_INTERVAL,
            );
            if mux.is_active(&a_dyn) {
                a.emit(signal);
            } else {
                b.emit(signal);
            }
        }

        let seen = recorder.signals.borrow();
        prop_assert!(!seen.is_empty());
        for pair in seen.windows(2) {
            prop_assert!(pair[1].frame_time > pair[0].frame_time);
            prop_assert!(pair[1].frame_time.0 - pair[0].frame_time.0 >= min_interval);
        }
        let forwarded = u64::try_from(seen.len()).unwrap();
        prop_assert_eq!(forwarded + mux.dropped_count(), u64::try_from(times.len()).unwrap());
    }

    #[test]
    fn ticks_stay_on_phase(
        interval in 1_000_u64..50_000,
        timebase in 0_u64..100_000,
        start in 0_u64..100_000,
        count in 2_u64..40,
    ) {
        let runner = Rc::new(VirtualTaskRunner::new(HostTime(start)));
        let (ticks, log) = ticking(&runner, Duration(interval));
        ticks.set_timebase_and_interval(HostTime(timebase), Duration(interval));
        _ = ticks.set_active(true);
        runner.run_until_time(HostTime(start + interval * count));

        let times = log.times.borrow();
        prop_assert!(times.len() as u64 + 1 >= count);
        for t in times.iter() {
            prop_assert_eq!(t.0 % interval, timebase % interval);
        }
        for pair in times.windows(2) {
            prop_assert_eq!(pair[1].0 - pair[0].0, interval);
        }
    }

    #[test]
    fn timebase_jitter_never_crowds_ticks(
        interval in 4_000_u64..40_000,
        updates in prop::collection::vec((0_u64..40_000, 0_u64..80_000), 1..20),
    ) {
        let runner = Rc::new(VirtualTaskRunner::new(HostTime(100_000)));
        let (ticks, log) = ticking(&runner, Duration(interval));
        _ = ticks.set_active(true);
        for (wait, timebase) in &updates {
            runner.run_for_period(Duration(*wait));
            ticks.set_timebase_and_interval(HostTime(*timebase), Duration(interval));
        }
        runner.run_for_period(Duration(interval * 3));

        let times = log.times.borrow();
        for pair in times.windows(2) {
            prop_assert!((pair[1].0 - pair[0].0) * 2 > interval);
        }
    }

    #[test]
    fn tasks_run_by_due_time_then_post_order(
        delays in prop::collection::vec(0_u64..8, 1..48),
    ) {
        let runner = Rc::new(VirtualTaskRunner::new(HostTime(1_000)));
        let order = Rc::new(RefCell::new(Vec::new()));
        for (i, delay) in delays.iter().enumerate() {
            let order = order.clone();
            let clock = runner.clone();
            runner.post_delayed_task(
                Duration(delay * 1_000),
                Box::new(move || order.borrow_mut().push((i, clock.now()))),
            );
        }
        runner.run_until_idle();

        let mut expected: Vec<usize> = (0..delays.len()).collect();
        expected.sort_by_key(|i| delays[*i]);
        let order = order.borrow();
        let ran: Vec<usize> = order.iter().map(|(i, _)| *i).collect();
        prop_assert_eq!(ran, expected);
        for (i, at) in order.iter() {
            prop_assert_eq!(at.0, 1_000 + delays[*i] * 1_000);
        }
    }
}
