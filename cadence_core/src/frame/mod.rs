// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The compositor frame scheduler.
//!
//! Demand flags (`set_needs_*`) and pipeline acknowledgements
//! (`notify_*`, `did_*`) flow into a [`FrameScheduler`]. Begin-frame signals
//! open impl frames, and the scheduler answers with an ordered sequence of
//! actions delivered to its [`SchedulerClient`]:
//!
//! ```text
//!   signal ──► WillBeginImplFrame ──► Animate / SendBeginMainFrame
//!                     │
//!                     ▼ (deadline task)
//!   Commit ──► ActivateSyncTree ──► DrawAndSwap ──► PrepareTiles
//! ```
//!
//! Commit and activation run whenever the main thread is ready, even between
//! frames. Drawing only happens inside the deadline, and only while fewer
//! than `max_swaps_pending` swaps are in flight.
//!
//! The decision logic lives in [`SchedulerStateMachine`], which has no
//! knowledge of tasks or clocks and can be driven directly in tests.

mod client;
mod scheduler;
mod settings;
mod state;
mod timing_history;

pub use client::{BeginMainFrameAbortReason, DrawResult, SchedulerClient};
pub use scheduler::{FrameScheduler, FrameSourceKind};
pub use settings::{SchedulerSettings, SettingsError};
pub use state::{
    Action, BeginImplFrameState, DeadlineMode, ForcedRedrawState, MainFrameState,
    OutputSurfaceState, PendingTreeState, SchedulerStateMachine,
};
pub use timing_history::{
    CompositorTimingHistory, FixedTimingHistory, SmoothedTimingHistory, SmoothingConfig,
};
