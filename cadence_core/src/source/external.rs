// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use super::{BeginFrameSource, SourceCore};
use crate::signal::FrameSignal;

/// Callback told whenever the observer's demand for signals changes.
pub type NeedsBeginFramesCallback = Box<dyn Fn(bool)>;

/// A source fed by the embedder.
///
/// The embedder pushes signals with [`emit`](Self::emit), typically from a
/// platform vsync callback or a parent compositor. Signals are delivered only
/// while the observer wants them, and are re-stamped with this source's id.
#[derive(Default)]
pub struct ExternalBeginFrameSource {
    core: SourceCore,
    on_needs_change: RefCell<Option<NeedsBeginFramesCallback>>,
}

impl fmt::Debug for ExternalBeginFrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalBeginFrameSource")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl ExternalBeginFrameSource {
    /// Creates a source with no demand callback.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Installs a callback run whenever demand flips, so the embedder can
    /// start or stop its own vsync subscription.
    pub fn set_needs_begin_frames_callback(&self, callback: NeedsBeginFramesCallback) {
        *self.on_needs_change.borrow_mut() = Some(callback);
    }

    /// Delivers `signal` if the observer currently wants signals.
    ///
    /// Returns `true` if the signal was delivered.
    pub fn emit(&self, signal: FrameSignal) -> bool {
        if !self.needs_begin_frames() {
            log::trace!("external signal at {:?} ignored; no demand", signal.frame_time);
            return false;
        }
        let signal = FrameSignal {
            source_id: self.source_id(),
            ..signal
        };
        self.core.emit(&signal);
        true
    }
}

impl BeginFrameSource for ExternalBeginFrameSource {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn on_needs_begin_frames_change(&self, needs: bool) {
        if let Some(callback) = self.on_needs_change.borrow().as_ref() {
            callback(needs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::RecordingObserver;
    use crate::surface::SourceId;
    use crate::time::{Duration, HostTime};
    use alloc::vec::Vec;

    fn signal(at: u64) -> FrameSignal {
        FrameSignal::new(SourceId(0), HostTime(at), HostTime(at + 16_666), Duration(16_666))
    }

    #[test]
    fn emits_only_while_needed() {
        let source = ExternalBeginFrameSource::new();
        let observer = RecordingObserver::new();
        source.add_observer(observer.weak());

        assert!(!source.emit(signal(100)));
        source.set_needs_begin_frames(true);
        assert!(source.emit(signal(200)));

        let got = observer.take();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].frame_time, HostTime(200));
        assert_eq!(got[0].source_id, source.source_id());
    }

    #[test]
    fn demand_callback_sees_changes() {
        let source = ExternalBeginFrameSource::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        source.set_needs_begin_frames_callback(Box::new(move |needs| sink.borrow_mut().push(needs)));

        source.set_needs_begin_frames(true);
        source.set_needs_begin_frames(true);
        source.set_needs_begin_frames(false);
        assert_eq!(*seen.borrow(), [true, false]);
    }
}
