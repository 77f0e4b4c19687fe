// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use super::{BeginFrameObserver, BeginFrameSource, SourceCore};
use crate::signal::FrameSignal;
use crate::time::Duration;

/// Selects one of several sources and forwards its signals.
///
/// Only the active source sees demand changes and frame completions. Every
/// forwarded signal must have a `frame_time` strictly after the last forwarded
/// one, and at least [`minimum_interval`](Self::set_minimum_interval) later;
/// anything else is dropped. These guards persist across changes of the
/// active source.
pub struct BeginFrameSourceMultiplexer {
    core: SourceCore,
    sources: RefCell<Vec<Rc<dyn BeginFrameSource>>>,
    active: RefCell<Option<Rc<dyn BeginFrameSource>>>,
    minimum_interval: Cell<Duration>,
    last_forwarded: Cell<Option<FrameSignal>>,
    dropped: Cell<u64>,
    this: Weak<Self>,
}

impl fmt::Debug for BeginFrameSourceMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeginFrameSourceMultiplexer")
            .field("core", &self.core)
            .field("sources", &self.sources.borrow().len())
            .field("active", &self.active.borrow().as_ref().map(|s| s.source_id()))
            .field("minimum_interval", &self.minimum_interval.get())
            .field("last_forwarded", &self.last_forwarded.get())
            .finish_non_exhaustive()
    }
}

fn same_source(a: &Rc<dyn BeginFrameSource>, b: &Rc<dyn BeginFrameSource>) -> bool {
    core::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

impl BeginFrameSourceMultiplexer {
    /// Creates an empty multiplexer with no minimum interval.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            core: SourceCore::new(),
            sources: RefCell::new(Vec::new()),
            active: RefCell::new(None),
            minimum_interval: Cell::new(Duration::ZERO),
            last_forwarded: Cell::new(None),
            dropped: Cell::new(0),
            this: this.clone(),
        })
    }

    fn as_observer(&self) -> Weak<dyn BeginFrameObserver> {
        let weak: Weak<dyn BeginFrameObserver> = self.this.clone();
        weak
    }

    /// Returns `true` if `source` is a member.
    #[must_use]
    pub fn has_source(&self, source: &Rc<dyn BeginFrameSource>) -> bool {
        self.sources.borrow().iter().any(|s| same_source(s, source))
    }

    /// Adds a member. The first member added becomes active.
    ///
    /// # Panics
    ///
    /// Panics if `source` is already a member.
    pub fn add_source(&self, source: Rc<dyn BeginFrameSource>) {
        assert!(!self.has_source(&source), "source added twice");
        self.sources.borrow_mut().push(source.clone());
        if self.active.borrow().is_none() {
            self.set_active_source(Some(source));
        }
    }

    /// Removes a member.
    ///
    /// # Panics
    ///
    /// Panics if `source` is not a member or is the active source.
    pub fn remove_source(&self, source: &Rc<dyn BeginFrameSource>) {
        assert!(self.has_source(source), "removing a source that was never added");
        assert!(
            !self.is_active(source),
            "cannot remove the active source"
        );
        self.sources.borrow_mut().retain(|s| !same_source(s, source));
    }

    /// Returns `true` if `source` is the active source.
    #[must_use]
    pub fn is_active(&self, source: &Rc<dyn BeginFrameSource>) -> bool {
        self.active
            .borrow()
            .as_ref()
            .is_some_and(|a| same_source(a, source))
    }

    /// The active source.
    #[must_use]
    pub fn active_source(&self) -> Option<Rc<dyn BeginFrameSource>> {
        self.active.borrow().clone()
    }

    /// Switches the active source, carrying current demand over to it.
    ///
    /// # Panics
    ///
    /// Panics if `source` is not a member.
    pub fn set_active_source(&self, source: Option<Rc<dyn BeginFrameSource>>) {
        if let Some(new) = &source {
            assert!(self.has_source(new), "active source must be a member");
            if self.is_active(new) {
                return;
            }
        }
        let needs = self.needs_begin_frames();
        let observer = self.as_observer();

        let old = self.active.borrow_mut().take();
        if let Some(old) = old {
            if needs {
                old.set_needs_begin_frames(false);
            }
            old.remove_observer(&observer);
        }

        *self.active.borrow_mut() = source.clone();
        if let Some(new) = source {
            log::debug!("multiplexer switching to {:?}", new.source_id());
            new.add_observer(observer);
            if needs {
                new.set_needs_begin_frames(true);
            }
        }
    }

    /// Sets the minimum spacing between forwarded signals.
    pub fn set_minimum_interval(&self, interval: Duration) {
        self.minimum_interval.set(interval);
    }

    /// The most recently forwarded signal.
    #[must_use]
    pub fn last_forwarded_signal(&self) -> Option<FrameSignal> {
        self.last_forwarded.get()
    }

    /// Number of signals dropped by the monotonicity or spacing guards.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.get()
    }

    fn is_increasing(&self, signal: &FrameSignal) -> bool {
        match self.last_forwarded.get() {
            None => true,
            Some(last) => {
                signal.frame_time > last.frame_time
                    && signal.frame_time >= last.frame_time + self.minimum_interval.get()
            }
        }
    }
}

impl BeginFrameObserver for BeginFrameSourceMultiplexer {
    fn on_begin_frame(&self, signal: &FrameSignal) {
        if !self.is_increasing(signal) {
            self.dropped.set(self.dropped.get() + 1);
            log::trace!("multiplexer dropped signal at {:?}", signal.frame_time);
            return;
        }
        self.last_forwarded.set(Some(*signal));
        self.core.emit(signal);
    }

    fn last_used_begin_frame_signal(&self) -> Option<FrameSignal> {
        self.core
            .observer()
            .and_then(|o| o.last_used_begin_frame_signal())
    }
}

impl BeginFrameSource for BeginFrameSourceMultiplexer {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn on_needs_begin_frames_change(&self, needs: bool) {
        if let Some(active) = self.active_source() {
            active.set_needs_begin_frames(needs);
        }
    }

    fn did_finish_frame(&self, remaining_frames: usize) {
        if let Some(active) = self.active_source() {
            active.did_finish_frame(remaining_frames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ExternalBeginFrameSource;
    use crate::source::testing::RecordingObserver;
    use crate::surface::SourceId;
    use crate::time::HostTime;

    fn signal(at: u64) -> FrameSignal {
        FrameSignal::new(SourceId(0), HostTime(at), HostTime(at + 100), Duration(100))
    }

    struct Fixture {
        mux: Rc<BeginFrameSourceMultiplexer>,
        a: Rc<ExternalBeginFrameSource>,
        b: Rc<ExternalBeginFrameSource>,
        observer: Rc<RecordingObserver>,
    }

    impl Fixture {
        fn new() -> Self {
            let mux = BeginFrameSourceMultiplexer::new();
            let a = ExternalBeginFrameSource::new();
            let b = ExternalBeginFrameSource::new();
            mux.add_source(a.clone());
            mux.add_source(b.clone());
            let observer = RecordingObserver::new();
            mux.add_observer(observer.weak());
            mux.set_needs_begin_frames(true);
            Self { mux, a, b, observer }
        }

        fn dyn_b(&self) -> Rc<dyn BeginFrameSource> {
            self.b.clone()
        }

        fn dyn_a(&self) -> Rc<dyn BeginFrameSource> {
            self.a.clone()
        }

        fn times(&self) -> Vec<u64> {
            self.observer.take().iter().map(|s| s.frame_time.micros()).collect()
        }
    }

    #[test]
    fn first_source_becomes_active_and_receives_demand() {
        let f = Fixture::new();
        assert!(f.mux.is_active(&f.dyn_a()));
        assert!(f.a.needs_begin_frames());
        assert!(!f.b.needs_begin_frames());
    }

    #[test]
    fn switching_moves_demand() {
        let f = Fixture::new();
        f.mux.set_active_source(Some(f.dyn_b()));
        assert!(!f.a.needs_begin_frames());
        assert!(f.b.needs_begin_frames());

        // The inactive source no longer has demand, so it cannot deliver.
        assert!(!f.a.emit(signal(100)));
        assert!(f.b.emit(signal(200)));
        assert_eq!(f.times(), [200]);
    }

    #[test]
    fn monotonicity_survives_source_switch() {
        let f = Fixture::new();
        f.a.emit(signal(1000));
        f.a.emit(signal(1000));
        f.a.emit(signal(900));
        f.mux.set_active_source(Some(f.dyn_b()));
        f.b.emit(signal(950));
        f.b.emit(signal(1001));
        assert_eq!(f.times(), [1000, 1001]);
        assert_eq!(f.mux.dropped_count(), 3);
    }

    #[test]
    fn minimum_interval_drops_close_signals() {
        let f = Fixture::new();
        f.mux.set_minimum_interval(Duration(100));
        for t in [0, 50, 100, 150, 199, 250] {
            f.a.emit(signal(1000 + t));
        }
        assert_eq!(f.times(), [1000, 1100, 1250]);
    }

    #[test]
    fn finish_frame_goes_to_active_only() {
        let runner = Rc::new(crate::task::VirtualTaskRunner::default());
        let mux = BeginFrameSourceMultiplexer::new();
        let b2b = crate::source::BackToBackBeginFrameSource::new(runner.clone());
        let ext = ExternalBeginFrameSource::new();
        mux.add_source(ext.clone());
        mux.add_source(b2b.clone());
        let observer = RecordingObserver::new();
        mux.add_observer(observer.weak());
        mux.set_needs_begin_frames(true);

        mux.did_finish_frame(0);
        assert!(!runner.has_pending_tasks(), "back-to-back source is inactive");

        mux.set_active_source(Some(b2b.clone() as Rc<dyn BeginFrameSource>));
        runner.run_until_idle();
        assert_eq!(observer.take().len(), 1);
    }

    #[test]
    #[should_panic(expected = "cannot remove the active source")]
    fn removing_active_source_is_rejected() {
        let f = Fixture::new();
        f.mux.remove_source(&f.dyn_a());
    }

    #[test]
    #[should_panic(expected = "must be a member")]
    fn activating_non_member_is_rejected() {
        let f = Fixture::new();
        let stranger: Rc<dyn BeginFrameSource> = ExternalBeginFrameSource::new();
        f.mux.set_active_source(Some(stranger));
    }

    #[test]
    fn removing_inactive_source() {
        let f = Fixture::new();
        f.mux.remove_source(&f.dyn_b());
        assert!(!f.mux.has_source(&f.dyn_b()));
        assert!(f.mux.has_source(&f.dyn_a()));
    }
}
