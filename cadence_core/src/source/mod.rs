// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Producers of begin-frame signals.
//!
//! A [`BeginFrameSource`] emits [`FrameSignal`]s to at most one
//! [`BeginFrameObserver`] at a time, and only while that observer has asked
//! for them with [`set_needs_begin_frames(true)`](BeginFrameSource::set_needs_begin_frames).
//!
//! Variants:
//!
//! - [`BackToBackBeginFrameSource`]: no timer; emits the next signal as soon
//!   as the consumer reports it finished the previous frame.
//! - [`SyntheticBeginFrameSource`]: a [`PeriodicTickSource`] turned into
//!   signals, with a catch-up signal when activation misses a tick.
//! - [`ExternalBeginFrameSource`]: the embedder pushes signals in.
//! - [`BeginFrameSourceMultiplexer`]: picks one active source out of several
//!   and filters the merged stream for monotonicity and a minimum spacing.
//!
//! Sources and observers are shared as `Rc` and hold each other weakly, so
//! neither keeps the other alive.
//!
//! [`PeriodicTickSource`]: crate::tick::PeriodicTickSource

mod back_to_back;
mod external;
mod multiplexer;
mod synthetic;

pub use back_to_back::BackToBackBeginFrameSource;
pub use external::ExternalBeginFrameSource;
pub use multiplexer::BeginFrameSourceMultiplexer;
pub use synthetic::SyntheticBeginFrameSource;

use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::signal::FrameSignal;
use crate::surface::SourceId;

/// Consumes begin-frame signals.
pub trait BeginFrameObserver {
    /// Delivers a signal.
    fn on_begin_frame(&self, signal: &FrameSignal);

    /// The most recent signal this observer acted on.
    fn last_used_begin_frame_signal(&self) -> Option<FrameSignal>;
}

/// State shared by every [`BeginFrameSource`] implementation.
pub struct SourceCore {
    id: SourceId,
    observer: RefCell<Option<Weak<dyn BeginFrameObserver>>>,
    needs_begin_frames: Cell<bool>,
}

impl fmt::Debug for SourceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCore")
            .field("id", &self.id)
            .field("has_observer", &self.observer.borrow().is_some())
            .field("needs_begin_frames", &self.needs_begin_frames.get())
            .finish()
    }
}

impl Default for SourceCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceCore {
    /// Creates the core with a freshly allocated [`SourceId`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SourceId::next(),
            observer: RefCell::new(None),
            needs_begin_frames: Cell::new(false),
        }
    }

    /// The bound observer, if it is still alive.
    #[must_use]
    pub fn observer(&self) -> Option<Rc<dyn BeginFrameObserver>> {
        self.observer.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Delivers `signal` to the bound observer, if any.
    pub fn emit(&self, signal: &FrameSignal) {
        // Upgrade first so the observer may rebind during delivery.
        if let Some(observer) = self.observer() {
            observer.on_begin_frame(signal);
        }
    }
}

/// Emits begin-frame signals to a single observer.
///
/// Implementors provide [`core`](Self::core) and override the hooks they need;
/// observer binding and demand tracking come from the default methods.
pub trait BeginFrameSource {
    /// Shared state.
    fn core(&self) -> &SourceCore;

    /// Called when demand flips. Variants start or stop their timers here.
    fn on_needs_begin_frames_change(&self, needs: bool) {
        _ = needs;
    }

    /// Called by the observer after finishing a frame. `remaining_frames` is
    /// the number of signals it still has queued.
    fn did_finish_frame(&self, remaining_frames: usize) {
        _ = remaining_frames;
    }

    /// Identifier stamped onto emitted signals.
    fn source_id(&self) -> SourceId {
        self.core().id
    }

    /// Whether the observer currently wants signals.
    fn needs_begin_frames(&self) -> bool {
        self.core().needs_begin_frames.get()
    }

    /// Starts or stops signal delivery. Repeating the current value is a no-op.
    fn set_needs_begin_frames(&self, needs: bool) {
        let core = self.core();
        if core.needs_begin_frames.replace(needs) != needs {
            self.on_needs_begin_frames_change(needs);
        }
    }

    /// Binds `observer` to this source.
    ///
    /// # Panics
    ///
    /// Panics if another observer is already bound.
    fn add_observer(&self, observer: Weak<dyn BeginFrameObserver>) {
        let mut slot = self.core().observer.borrow_mut();
        assert!(
            slot.is_none(),
            "{:?} already has an observer",
            self.core().id
        );
        *slot = Some(observer);
    }

    /// Unbinds `observer` and stops signal delivery.
    ///
    /// # Panics
    ///
    /// Panics if `observer` is not the bound observer.
    fn remove_observer(&self, observer: &Weak<dyn BeginFrameObserver>) {
        {
            let mut slot = self.core().observer.borrow_mut();
            let bound = slot
                .as_ref()
                .is_some_and(|o| core::ptr::addr_eq(o.as_ptr(), observer.as_ptr()));
            assert!(bound, "observer is not bound to {:?}", self.core().id);
            *slot = None;
        }
        self.set_needs_begin_frames(false);
    }
}

impl fmt::Debug for dyn BeginFrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeginFrameSource")
            .field("id", &self.source_id())
            .field("needs_begin_frames", &self.needs_begin_frames())
            .finish()
    }
}

/// Bookkeeping for observers that reject stale signals.
///
/// A signal is fresh when its `frame_time` is strictly after the last signal
/// the observer used. Dropped signals are counted.
#[derive(Debug, Default)]
pub struct SignalLedger {
    last_used: Cell<Option<FrameSignal>>,
    dropped: Cell<u64>,
}

impl SignalLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_used: Cell::new(None),
            dropped: Cell::new(0),
        }
    }

    /// Returns `true` if `signal` is newer than the last used signal.
    #[must_use]
    pub fn is_fresh(&self, signal: &FrameSignal) -> bool {
        self.last_used
            .get()
            .is_none_or(|last| signal.frame_time > last.frame_time)
    }

    /// Records that `signal` was acted on.
    pub fn record_used(&self, signal: &FrameSignal) {
        self.last_used.set(Some(*signal));
    }

    /// Records that a signal was discarded.
    pub fn record_dropped(&self) {
        self.dropped.set(self.dropped.get() + 1);
    }

    /// The last signal acted on.
    #[must_use]
    pub fn last_used(&self) -> Option<FrameSignal> {
        self.last_used.get()
    }

    /// Number of discarded signals.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.get()
    }
}

/// Observers and helpers shared by the source tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use alloc::vec::Vec;

    /// Records every delivered signal.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub(crate) signals: RefCell<Vec<FrameSignal>>,
        ledger: SignalLedger,
    }

    impl RecordingObserver {
        pub(crate) fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        pub(crate) fn weak(self: &Rc<Self>) -> Weak<dyn BeginFrameObserver> {
            let weak: Weak<dyn BeginFrameObserver> = Rc::downgrade(self) as Weak<dyn BeginFrameObserver>;
            weak
        }

        pub(crate) fn take(&self) -> Vec<FrameSignal> {
            core::mem::take(&mut *self.signals.borrow_mut())
        }
    }

    impl BeginFrameObserver for RecordingObserver {
        fn on_begin_frame(&self, signal: &FrameSignal) {
            self.ledger.record_used(signal);
            self.signals.borrow_mut().push(*signal);
        }

        fn last_used_begin_frame_signal(&self) -> Option<FrameSignal> {
            self.ledger.last_used()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingObserver;
    use super::*;
    use crate::time::{Duration, HostTime};

    #[derive(Default)]
    struct PlainSource {
        core: SourceCore,
        changes: RefCell<alloc::vec::Vec<bool>>,
    }

    impl BeginFrameSource for PlainSource {
        fn core(&self) -> &SourceCore {
            &self.core
        }

        fn on_needs_begin_frames_change(&self, needs: bool) {
            self.changes.borrow_mut().push(needs);
        }
    }

    #[test]
    fn needs_changes_are_deduplicated() {
        let source = PlainSource::default();
        source.set_needs_begin_frames(true);
        source.set_needs_begin_frames(true);
        source.set_needs_begin_frames(false);
        assert_eq!(*source.changes.borrow(), [true, false]);
    }

    #[test]
    fn emit_reaches_bound_observer() {
        let source = PlainSource::default();
        let observer = RecordingObserver::new();
        source.add_observer(observer.weak());
        let signal = FrameSignal::new(
            source.source_id(),
            HostTime(10),
            HostTime(20),
            Duration(10),
        );
        source.core().emit(&signal);
        assert_eq!(observer.take(), [signal]);
        assert_eq!(observer.last_used_begin_frame_signal(), Some(signal));
    }

    #[test]
    fn removing_observer_stops_demand() {
        let source = PlainSource::default();
        let observer = RecordingObserver::new();
        let weak = observer.weak();
        source.add_observer(weak.clone());
        source.set_needs_begin_frames(true);
        source.remove_observer(&weak);
        assert!(!source.needs_begin_frames());
        assert!(source.core().observer().is_none());
    }

    #[test]
    #[should_panic(expected = "already has an observer")]
    fn second_observer_is_rejected() {
        let source = PlainSource::default();
        let a = RecordingObserver::new();
        let b = RecordingObserver::new();
        source.add_observer(a.weak());
        source.add_observer(b.weak());
    }

    #[test]
    #[should_panic(expected = "is not bound")]
    fn removing_unbound_observer_is_rejected() {
        let source = PlainSource::default();
        let a = RecordingObserver::new();
        let b = RecordingObserver::new();
        source.add_observer(a.weak());
        source.remove_observer(&b.weak());
    }

    #[test]
    fn ledger_rejects_stale_signals() {
        let ledger = SignalLedger::new();
        let first = FrameSignal::new(SourceId(0), HostTime(100), HostTime(200), Duration(100));
        assert!(ledger.is_fresh(&first));
        ledger.record_used(&first);
        assert!(!ledger.is_fresh(&first));
        let next = FrameSignal::new(SourceId(0), HostTime(101), HostTime(200), Duration(100));
        assert!(ledger.is_fresh(&next));
        ledger.record_dropped();
        assert_eq!(ledger.dropped_count(), 1);
    }
}
