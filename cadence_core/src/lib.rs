// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deadline-driven frame production scheduling for compositors.
//!
//! `cadence_core` decides, on every display refresh, which compositor
//! pipeline actions run and in what order, while honoring backpressure from
//! a slow swap path and a slow main thread. It is `no_std` compatible (with
//! `alloc`) and single-threaded: components share state through `Rc`, and all
//! timing runs on a [`TaskRunner`](task::TaskRunner).
//!
//! # Architecture
//!
//! ```text
//!   TaskRunner (virtual or real time)
//!       │
//!       ▼
//!   PeriodicTickSource ──► BeginFrameSource ──► Multiplexer ──► FrameScheduler
//!                                                                    │
//!                               SchedulerClient ◄── actions ─────────┘
//!
//!   BeginFrameSource ──► DisplayScheduler ──► DisplayClient::draw_and_swap
//! ```
//!
//! **[`task`]**: The [`TaskRunner`](task::TaskRunner) seam and the
//! deterministic [`VirtualTaskRunner`](task::VirtualTaskRunner) that drives
//! every timer in tests and simulations.
//!
//! **[`tick`]**: [`PeriodicTickSource`](tick::PeriodicTickSource), a
//! drift-free timer phase-locked to a timebase.
//!
//! **[`source`]**: Begin-frame sources: back-to-back, synthetic (display
//! rate), external (embedder driven), and a multiplexer that switches among
//! them while keeping delivered frame times monotonic.
//!
//! **[`frame`]**: The [`FrameScheduler`](frame::FrameScheduler) and its pure
//! [`SchedulerStateMachine`](frame::SchedulerStateMachine).
//!
//! **[`display`]**: The [`DisplayScheduler`](display::DisplayScheduler),
//! which waits for surface damage before drawing and swapping.
//!
//! **[`signal`]**, **[`time`]**, **[`surface`]**: Shared value types.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! scheduler instrumentation, with zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod display;
pub mod frame;
pub mod signal;
pub mod source;
pub mod surface;
pub mod task;
pub mod tick;
pub mod time;
pub mod trace;
