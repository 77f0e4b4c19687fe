// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The embedder side of the frame scheduler.

use crate::signal::FrameSignal;

/// Outcome of a draw requested by the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawResult {
    /// The frame was drawn and submitted.
    Success,
    /// Drawing would have shown checkerboarded animated content.
    ///
    /// The redraw demand stays set and a new main frame is requested. After
    /// repeated failures the scheduler forces a draw.
    AbortedCheckerboardAnimations,
    /// High-resolution content was missing. A new main frame is requested.
    AbortedMissingHighResContent,
    /// Drawing was impossible right now. The redraw demand stays set.
    AbortedCantDraw,
}

impl DrawResult {
    /// Returns `true` for [`DrawResult::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Why the main thread gave up on a requested main frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BeginMainFrameAbortReason {
    /// The output surface was lost while the main frame ran.
    OutputSurfaceLost,
    /// The compositor became invisible.
    NotVisible,
    /// Commits are deferred. The main frame is re-requested.
    CommitDeferred,
    /// The main thread had nothing to commit.
    FinishedNoUpdates,
}

/// Receives the actions chosen by a
/// [`FrameScheduler`](super::FrameScheduler).
///
/// Every callback may call back into the scheduler.
pub trait SchedulerClient {
    /// A begin frame was accepted and a new impl frame starts.
    fn will_begin_impl_frame(&self, signal: &FrameSignal);

    /// The impl frame ended.
    fn did_finish_impl_frame(&self) {}

    /// Tick impl-side animations.
    fn scheduled_action_animate(&self);

    /// Ask the main thread to produce a frame.
    fn scheduled_action_send_begin_main_frame(&self);

    /// Commit the main thread's frame into a pending tree.
    fn scheduled_action_commit(&self);

    /// Make the pending tree active.
    fn scheduled_action_activate_sync_tree(&self);

    /// Draw and swap unless content is not ready.
    fn scheduled_action_draw_and_swap_if_possible(&self) -> DrawResult;

    /// Draw and swap even if content is incomplete.
    fn scheduled_action_draw_and_swap_forced(&self) -> DrawResult;

    /// Update tile priorities and schedule rasterization.
    fn scheduled_action_prepare_tiles(&self);

    /// Start creating a new output surface.
    fn scheduled_action_begin_output_surface_creation(&self);

    /// Ask the embedder to invalidate so it will call back to draw
    /// (synchronous mode only).
    fn scheduled_action_invalidate_output_surface(&self) {}

    /// Pass a begin frame on to child schedulers.
    fn send_begin_frames_to_children(&self, signal: &FrameSignal) {
        _ = signal;
    }

    /// Begin frames are no longer being requested; producers can stop
    /// queuing speculative work.
    fn send_begin_main_frame_not_expected_soon(&self) {}
}
