// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use core::cell::Cell;
use core::fmt;

use super::{BeginFrameSource, SourceCore};
use crate::signal::FrameSignal;
use crate::task::{TaskHandle, TaskRunner};

/// A source that emits the next signal as soon as the previous frame is done.
///
/// There is no timer. Each signal has `frame_time = now` and a deadline one
/// default interval later, so throughput is bounded only by how fast the
/// observer finishes frames. Emission goes through a zero-delay task; repeated
/// [`did_finish_frame(0)`](BeginFrameSource::did_finish_frame) calls before
/// that task runs coalesce into one signal.
pub struct BackToBackBeginFrameSource {
    core: SourceCore,
    runner: Rc<dyn TaskRunner>,
    pending: Cell<Option<TaskHandle>>,
    this: Weak<Self>,
}

impl fmt::Debug for BackToBackBeginFrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackToBackBeginFrameSource")
            .field("core", &self.core)
            .field("posted", &self.pending.get().is_some())
            .finish_non_exhaustive()
    }
}

impl BackToBackBeginFrameSource {
    /// Creates a source posting its signals on `runner`.
    #[must_use]
    pub fn new(runner: Rc<dyn TaskRunner>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            core: SourceCore::new(),
            runner,
            pending: Cell::new(None),
            this: this.clone(),
        })
    }

    fn post_begin_frame(&self) {
        if !self.needs_begin_frames() || self.pending.get().is_some() {
            return;
        }
        let weak = self.this.clone();
        let handle = self.runner.post_task(Box::new(move || {
            if let Some(this) = weak.upgrade() {
                this.begin_frame();
            }
        }));
        self.pending.set(Some(handle));
    }

    fn begin_frame(&self) {
        self.pending.set(None);
        if !self.needs_begin_frames() {
            return;
        }
        let now = self.runner.now();
        let interval = FrameSignal::DEFAULT_INTERVAL;
        let signal = FrameSignal::new(self.source_id(), now, now + interval, interval);
        log::trace!("back-to-back signal at {now:?}");
        self.core.emit(&signal);
    }
}

impl BeginFrameSource for BackToBackBeginFrameSource {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn on_needs_begin_frames_change(&self, needs: bool) {
        if needs {
            self.post_begin_frame();
        } else if let Some(handle) = self.pending.take() {
            self.runner.cancel(handle);
        }
    }

    fn did_finish_frame(&self, remaining_frames: usize) {
        if remaining_frames == 0 {
            self.post_begin_frame();
        }
    }
}
