// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the schedulers.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! [`FrameScheduler`](crate::frame::FrameScheduler) and
//! [`DisplayScheduler`](crate::display::DisplayScheduler) call as they make
//! decisions. All method bodies default to no-ops, so implementing only the
//! events you care about is fine.
//!
//! [`Tracer`] wraps an optional shared sink. When the `trace` feature is
//! **off**, every `Tracer` method compiles to nothing. When **on**, each method
//! performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).

use alloc::rc::Rc;
use core::cell::RefCell;

use crate::frame::{Action, DeadlineMode};
use crate::signal::FrameSignal;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when the frame scheduler begins an impl frame.
#[derive(Clone, Copy, Debug)]
pub struct ImplFrameEvent {
    /// Frame counter after the increment.
    pub frame_number: u64,
    /// The signal, with its deadline already adjusted for the parent draw.
    pub signal: FrameSignal,
    /// Host time when the frame began.
    pub now: HostTime,
}

/// Emitted for each action the frame scheduler performs.
#[derive(Clone, Copy, Debug)]
pub struct ActionEvent {
    /// Frame during which the action ran.
    pub frame_number: u64,
    /// The action.
    pub action: Action,
    /// Host time of the action.
    pub now: HostTime,
}

/// Emitted when the frame scheduler (re)schedules its deadline.
#[derive(Clone, Copy, Debug)]
pub struct DeadlineEvent {
    /// Frame the deadline belongs to.
    pub frame_number: u64,
    /// How the deadline was placed.
    pub mode: DeadlineMode,
    /// When the deadline fires.
    pub deadline: HostTime,
    /// Host time when it was scheduled.
    pub now: HostTime,
}

/// Why a begin-frame signal did not start an impl frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameDropReason {
    /// Not newer than the last signal used.
    Stale,
    /// Begin frames were no longer needed.
    NotNeeded,
    /// Skipped to let the pipeline catch up after swap throttling.
    ImplLatencyRecovery,
    /// A queued signal whose deadline passed before it could run.
    Expired,
}

/// Emitted when the frame scheduler drops a signal.
#[derive(Clone, Copy, Debug)]
pub struct FrameDropEvent {
    /// `frame_time` of the dropped signal.
    pub frame_time: HostTime,
    /// Why it was dropped.
    pub reason: FrameDropReason,
    /// Host time of the drop.
    pub now: HostTime,
}

/// Emitted when the display scheduler moves its deadline.
#[derive(Clone, Copy, Debug)]
pub struct DisplayDeadlineEvent {
    /// The new deadline.
    pub deadline: HostTime,
    /// Host time when it was scheduled.
    pub now: HostTime,
}

/// Emitted after the display scheduler attempts a draw.
#[derive(Clone, Copy, Debug)]
pub struct DisplaySwapEvent {
    /// Whether a frame was submitted.
    pub swapped: bool,
    /// Swaps awaiting completion after the attempt.
    pub pending_swaps: u32,
    /// Host time of the attempt.
    pub now: HostTime,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives scheduler trace events.
///
/// All methods default to no-ops.
pub trait TraceSink {
    /// An impl frame began.
    fn on_impl_frame(&mut self, e: &ImplFrameEvent) {
        _ = e;
    }

    /// An action ran.
    fn on_action(&mut self, e: &ActionEvent) {
        _ = e;
    }

    /// A frame deadline was scheduled.
    fn on_deadline(&mut self, e: &DeadlineEvent) {
        _ = e;
    }

    /// A signal was dropped.
    fn on_frame_drop(&mut self, e: &FrameDropEvent) {
        _ = e;
    }

    /// The display deadline moved.
    fn on_display_deadline(&mut self, e: &DisplayDeadlineEvent) {
        _ = e;
    }

    /// The display attempted a draw.
    fn on_display_swap(&mut self, e: &DisplaySwapEvent) {
        _ = e;
    }
}

/// A sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Shared handle to a trace sink.
pub type SharedSink = Rc<RefCell<dyn TraceSink>>;

/// Zero-overhead wrapper around an optional [`TraceSink`].
///
/// Schedulers own a `Tracer` and outlive any single call, so the sink is
/// shared rather than borrowed.
#[derive(Clone, Default)]
pub struct Tracer {
    #[cfg(feature = "trace")]
    sink: Option<SharedSink>,
}

impl core::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $e:ident) => {
        #[cfg(feature = "trace")]
        if let Some(sink) = &$self.sink {
            sink.borrow_mut().$method($e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = $e;
        }
    };
}

impl Tracer {
    /// Creates a tracer that dispatches to `sink`.
    #[inline]
    #[must_use]
    pub fn new(sink: SharedSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {}
        }
    }

    /// Creates a tracer with no sink.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns `true` if events reach a sink.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.is_some()
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }

    /// Dispatches an [`ImplFrameEvent`].
    #[inline]
    pub fn impl_frame(&self, e: &ImplFrameEvent) {
        dispatch!(self, on_impl_frame, e);
    }

    /// Dispatches an [`ActionEvent`].
    #[inline]
    pub fn action(&self, e: &ActionEvent) {
        dispatch!(self, on_action, e);
    }

    /// Dispatches a [`DeadlineEvent`].
    #[inline]
    pub fn deadline(&self, e: &DeadlineEvent) {
        dispatch!(self, on_deadline, e);
    }

    /// Dispatches a [`FrameDropEvent`].
    #[inline]
    pub fn frame_drop(&self, e: &FrameDropEvent) {
        dispatch!(self, on_frame_drop, e);
    }

    /// Dispatches a [`DisplayDeadlineEvent`].
    #[inline]
    pub fn display_deadline(&self, e: &DisplayDeadlineEvent) {
        dispatch!(self, on_display_deadline, e);
    }

    /// Dispatches a [`DisplaySwapEvent`].
    #[inline]
    pub fn display_swap(&self, e: &DisplaySwapEvent) {
        dispatch!(self, on_display_swap, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SourceId;
    use crate::time::Duration;

    #[derive(Default)]
    struct Counting {
        actions: usize,
        drops: usize,
    }

    impl TraceSink for Counting {
        fn on_action(&mut self, _e: &ActionEvent) {
            self.actions += 1;
        }

        fn on_frame_drop(&mut self, _e: &FrameDropEvent) {
            self.drops += 1;
        }
    }

    #[test]
    fn tracer_none_is_disabled() {
        let tracer = Tracer::none();
        assert!(!tracer.is_enabled());
        tracer.action(&ActionEvent {
            frame_number: 1,
            action: Action::Commit,
            now: HostTime::ZERO,
        });
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let sink: SharedSink = Rc::new(RefCell::new(NoopSink));
        let tracer = Tracer::new(sink);
        tracer.impl_frame(&ImplFrameEvent {
            frame_number: 1,
            signal: FrameSignal::new(
                SourceId(1),
                HostTime(0),
                HostTime(16_666),
                Duration(16_666),
            ),
            now: HostTime(0),
        });
        tracer.display_swap(&DisplaySwapEvent {
            swapped: true,
            pending_swaps: 1,
            now: HostTime(0),
        });
    }

    #[cfg(feature = "trace")]
    #[test]
    fn events_reach_the_sink() {
        let sink = Rc::new(RefCell::new(Counting::default()));
        let tracer = Tracer::new(sink.clone());
        assert!(tracer.is_enabled());
        tracer.action(&ActionEvent {
            frame_number: 1,
            action: Action::Animate,
            now: HostTime(5),
        });
        tracer.frame_drop(&FrameDropEvent {
            frame_time: HostTime(0),
            reason: FrameDropReason::Stale,
            now: HostTime(5),
        });
        assert_eq!(sink.borrow().actions, 1);
        assert_eq!(sink.borrow().drops, 1);
    }

    #[cfg(not(feature = "trace"))]
    #[test]
    fn disabled_tracer_never_dispatches() {
        let sink = Rc::new(RefCell::new(Counting::default()));
        let tracer = Tracer::new(sink.clone());
        assert!(!tracer.is_enabled());
        tracer.action(&ActionEvent {
            frame_number: 1,
            action: Action::Animate,
            now: HostTime(5),
        });
        assert_eq!(sink.borrow().actions, 0);
        assert_eq!(sink.borrow().drops, 0);
    }
}
