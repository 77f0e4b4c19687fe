// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The display-side swap scheduler.
//!
//! [`DisplayScheduler`] sits downstream of every frame producer. It collects
//! damage notifications per [`SurfaceId`] and, once per begin frame, decides
//! how long it can afford to wait for more damage before drawing and
//! swapping the composited output.
//!
//! A child surface counts as *active* once it damaged on two consecutive
//! swaps. The deadline fires immediately once every active child and the
//! root surface have fresh damage. Otherwise it waits for the signal's
//! deadline, or a full interval while a resize, a new root surface, locked
//! root resources, or the swap budget hold drawing back.

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::frame::SettingsError;
use crate::signal::FrameSignal;
use crate::source::{BeginFrameObserver, BeginFrameSource, SignalLedger};
use crate::surface::SurfaceId;
use crate::task::{TaskHandle, TaskRunner};
use crate::time::{Duration, HostTime};
use crate::trace::{DisplayDeadlineEvent, DisplaySwapEvent, Tracer};

/// Draws and swaps the composited output.
pub trait DisplayClient {
    /// Draws every surface and submits the result.
    ///
    /// Returns `false` if nothing was submitted. May call back into the
    /// scheduler, typically [`DisplayScheduler::did_swap_buffers`].
    fn draw_and_swap(&self) -> bool;
}

/// Limits for the [`DisplayScheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplaySchedulerSettings {
    /// Swaps that may await completion before drawing is held back.
    pub max_pending_swaps: u32,
    /// Time reserved for the parent compositor after the display's own
    /// deadline. `None` reserves a third of each signal's interval.
    pub estimated_parent_draw_time: Option<Duration>,
}

impl Default for DisplaySchedulerSettings {
    fn default() -> Self {
        Self {
            max_pending_swaps: 1,
            estimated_parent_draw_time: None,
        }
    }
}

impl DisplaySchedulerSettings {
    /// Checks that the settings allow drawing at all.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::ZeroSwapBudget`] if `max_pending_swaps` is 0.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_pending_swaps == 0 {
            return Err(SettingsError::ZeroSwapBudget);
        }
        Ok(())
    }

    fn parent_draw_time(&self, interval: Duration) -> Duration {
        self.estimated_parent_draw_time
            .unwrap_or_else(|| FrameSignal::default_estimated_parent_draw_time(interval))
    }
}

#[derive(Debug)]
struct DisplayState {
    signal: Option<FrameSignal>,
    inside_deadline_interval: bool,
    output_surface_lost: bool,
    root_surface_resources_locked: bool,
    needs_draw: bool,
    /// Set by a resize or a new root; cleared by the next root damage.
    awaiting_root_damage: bool,
    pending_swaps: u32,
    max_pending_swaps: u32,

    root_surface: Option<SurfaceId>,
    root_surface_damaged: bool,
    expect_damage_from_root_surface: bool,

    child_surfaces_damaged: BTreeSet<SurfaceId>,
    child_surfaces_damaged_prev: BTreeSet<SurfaceId>,
    active_child_surfaces: BTreeSet<SurfaceId>,
    all_active_child_surfaces_ready: bool,
}

impl DisplayState {
    fn new(max_pending_swaps: u32) -> Self {
        Self {
            signal: None,
            inside_deadline_interval: false,
            output_surface_lost: false,
            root_surface_resources_locked: false,
            needs_draw: false,
            awaiting_root_damage: false,
            pending_swaps: 0,
            max_pending_swaps,
            root_surface: None,
            root_surface_damaged: false,
            expect_damage_from_root_surface: false,
            child_surfaces_damaged: BTreeSet::new(),
            child_surfaces_damaged_prev: BTreeSet::new(),
            active_child_surfaces: BTreeSet::new(),
            all_active_child_surfaces_ready: false,
        }
    }

    fn swap_throttled(&self) -> bool {
        self.pending_swaps >= self.max_pending_swaps
    }

    fn refresh_child_readiness(&mut self) {
        self.all_active_child_surfaces_ready = self
            .active_child_surfaces
            .is_subset(&self.child_surfaces_damaged);
    }

    /// Where the deadline should be for the current signal.
    fn desired_deadline(&self, parent_draw_time: Duration) -> HostTime {
        let Some(signal) = self.signal else {
            return HostTime::ZERO;
        };
        let late = signal.frame_time + signal.interval;
        if self.output_surface_lost {
            return HostTime::ZERO;
        }
        if self.swap_throttled() || !self.needs_draw || self.root_surface_resources_locked {
            return late;
        }
        let root_ready = !self.expect_damage_from_root_surface || self.root_surface_damaged;
        if self.all_active_child_surfaces_ready && root_ready {
            return HostTime::ZERO;
        }
        if self.awaiting_root_damage {
            return late;
        }
        // Only the root is missing; leave room in case it never arrives.
        if self.all_active_child_surfaces_ready && self.expect_damage_from_root_surface {
            return signal.deadline.saturating_sub(parent_draw_time);
        }
        signal.deadline
    }

    /// Bookkeeping after a successful draw.
    fn did_draw(&mut self) {
        self.active_child_surfaces = self
            .child_surfaces_damaged
            .intersection(&self.child_surfaces_damaged_prev)
            .copied()
            .collect();
        self.child_surfaces_damaged_prev = core::mem::take(&mut self.child_surfaces_damaged);
        self.needs_draw = false;
        self.all_active_child_surfaces_ready = self.active_child_surfaces.is_empty();
        self.expect_damage_from_root_surface = self.root_surface_damaged;
        self.root_surface_damaged = false;
    }

    /// Nothing to draw this interval: forget damage history.
    fn go_idle(&mut self) {
        self.active_child_surfaces.clear();
        self.child_surfaces_damaged_prev.clear();
        self.child_surfaces_damaged.clear();
        self.all_active_child_surfaces_ready = true;
        self.expect_damage_from_root_surface = false;
    }
}

/// Decides when the display draws and swaps.
///
/// Observes one begin-frame source, requesting frames while there is damage.
/// Every method takes `&self` and may be called from inside
/// [`DisplayClient::draw_and_swap`].
pub struct DisplayScheduler {
    settings: DisplaySchedulerSettings,
    client: Weak<dyn DisplayClient>,
    runner: Rc<dyn TaskRunner>,
    source: Rc<dyn BeginFrameSource>,
    tracer: RefCell<Tracer>,
    state: RefCell<DisplayState>,
    ledger: SignalLedger,
    deadline_task: Cell<Option<TaskHandle>>,
    deadline_time: Cell<HostTime>,
    this: Weak<Self>,
}

impl fmt::Debug for DisplayScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayScheduler")
            .field("state", &self.state.borrow())
            .field("deadline_pending", &self.deadline_pending())
            .field("deadline_time", &self.deadline_time.get())
            .finish_non_exhaustive()
    }
}

impl DisplayScheduler {
    /// Creates a display scheduler bound to `source`.
    ///
    /// # Errors
    ///
    /// Returns the settings error if `settings` do not validate.
    pub fn new(
        client: Weak<dyn DisplayClient>,
        settings: DisplaySchedulerSettings,
        runner: Rc<dyn TaskRunner>,
        source: Rc<dyn BeginFrameSource>,
    ) -> Result<Rc<Self>, SettingsError> {
        settings.validate()?;
        Ok(Rc::new_cyclic(|this: &Weak<Self>| {
            let observer: Weak<dyn BeginFrameObserver> = this.clone();
            source.add_observer(observer);
            Self {
                client,
                runner,
                source,
                tracer: RefCell::new(Tracer::none()),
                state: RefCell::new(DisplayState::new(settings.max_pending_swaps)),
                ledger: SignalLedger::new(),
                deadline_task: Cell::new(None),
                deadline_time: Cell::new(HostTime::ZERO),
                this: this.clone(),
                settings,
            }
        }))
    }

    /// Routes events to `tracer`.
    pub fn set_tracer(&self, tracer: Tracer) {
        *self.tracer.borrow_mut() = tracer;
    }

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> &DisplaySchedulerSettings {
        &self.settings
    }

    /// Records new content from `surface`.
    pub fn surface_damaged(&self, surface: SurfaceId) {
        let lost = {
            let mut state = self.state.borrow_mut();
            state.needs_draw = true;
            if state.root_surface == Some(surface) {
                state.root_surface_damaged = true;
                state.awaiting_root_damage = false;
            } else {
                state.child_surfaces_damaged.insert(surface);
                state.refresh_child_readiness();
            }
            state.output_surface_lost
        };
        log::trace!("{surface:?} damaged");
        self.source.set_needs_begin_frames(!lost);
        self.schedule_deadline();
    }

    /// Switches the root surface. Drawing waits up to a full interval for
    /// the new root's first damage.
    pub fn set_new_root_surface(&self, surface: SurfaceId) {
        let lost = {
            let mut state = self.state.borrow_mut();
            state.root_surface = Some(surface);
            state.child_surfaces_damaged.remove(&surface);
            state.active_child_surfaces.remove(&surface);
            state.refresh_child_readiness();
            state.root_surface_damaged = false;
            state.expect_damage_from_root_surface = true;
            state.awaiting_root_damage = true;
            state.needs_draw = true;
            state.output_surface_lost
        };
        log::debug!("new root surface {surface:?}");
        self.source.set_needs_begin_frames(!lost);
        self.schedule_deadline();
    }

    /// The display changed size. Drawing waits up to a full interval for the
    /// root to redraw at the new size.
    pub fn display_resized(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.awaiting_root_damage = true;
            state.expect_damage_from_root_surface = true;
            state.needs_draw = true;
        }
        self.schedule_deadline();
    }

    /// While locked, the root's resources are in use and drawing is held
    /// back.
    pub fn set_root_surface_resources_locked(&self, locked: bool) {
        self.state.borrow_mut().root_surface_resources_locked = locked;
        self.schedule_deadline();
    }

    /// The output surface is gone. Stops begin frames and ends the current
    /// interval without drawing.
    pub fn output_surface_lost(&self) {
        self.state.borrow_mut().output_surface_lost = true;
        log::debug!("display output surface lost");
        self.source.set_needs_begin_frames(false);
        self.schedule_deadline();
    }

    /// A swap was submitted.
    pub fn did_swap_buffers(&self) {
        self.state.borrow_mut().pending_swaps += 1;
        self.schedule_deadline();
    }

    /// A submitted swap finished.
    pub fn did_swap_buffers_complete(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.pending_swaps = state.pending_swaps.saturating_sub(1);
        }
        self.schedule_deadline();
    }

    /// Sets the swap budget. Values below 1 are raised to 1.
    pub fn set_max_pending_swaps(&self, max: u32) {
        self.state.borrow_mut().max_pending_swaps = max.max(1);
        self.schedule_deadline();
    }

    /// Draws now instead of waiting for the deadline, if drawing is allowed.
    pub fn force_immediate_swap_if_possible(&self) {
        let in_interval = self.state.borrow().inside_deadline_interval;
        self.attempt_draw_and_swap();
        if in_interval {
            self.source.did_finish_frame(0);
        }
    }

    // --- Inspection -------------------------------------------------------

    /// Whether there is damage that has not been swapped.
    #[must_use]
    pub fn needs_draw(&self) -> bool {
        self.state.borrow().needs_draw
    }

    /// Swaps awaiting completion.
    #[must_use]
    pub fn pending_swaps(&self) -> u32 {
        self.state.borrow().pending_swaps
    }

    /// Whether a deadline task is posted.
    #[must_use]
    pub fn deadline_pending(&self) -> bool {
        self.deadline_task.get().is_some()
    }

    /// When the posted deadline fires. Meaningless unless
    /// [`deadline_pending`](Self::deadline_pending).
    #[must_use]
    pub fn deadline_time(&self) -> HostTime {
        self.deadline_time.get()
    }

    /// Whether a begin frame has opened an interval that has not ended.
    #[must_use]
    pub fn inside_begin_frame_deadline_interval(&self) -> bool {
        self.state.borrow().inside_deadline_interval
    }

    /// The current root surface.
    #[must_use]
    pub fn root_surface(&self) -> Option<SurfaceId> {
        self.state.borrow().root_surface
    }

    /// Whether `surface` damaged on each of the last two swaps.
    #[must_use]
    pub fn is_active_surface(&self, surface: SurfaceId) -> bool {
        self.state.borrow().active_child_surfaces.contains(&surface)
    }

    /// Whether the output surface was lost.
    #[must_use]
    pub fn output_surface_is_lost(&self) -> bool {
        self.state.borrow().output_surface_lost
    }

    // --- Internals --------------------------------------------------------

    fn cancel_deadline(&self) {
        if let Some(handle) = self.deadline_task.take() {
            self.runner.cancel(handle);
        }
    }

    fn schedule_deadline(&self) {
        let desired = {
            let state = self.state.borrow();
            if !state.inside_deadline_interval {
                return;
            }
            let interval = state
                .signal
                .map_or(FrameSignal::DEFAULT_INTERVAL, |signal| signal.interval);
            state.desired_deadline(self.settings.parent_draw_time(interval))
        };
        if self.deadline_task.get().is_some() && self.deadline_time.get() == desired {
            return;
        }
        self.cancel_deadline();

        let now = self.runner.now();
        let delay = desired.saturating_duration_since(now);
        let weak = self.this.clone();
        let handle = self.runner.post_delayed_task(
            delay,
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.on_begin_frame_deadline();
                }
            }),
        );
        self.deadline_task.set(Some(handle));
        self.deadline_time.set(desired);
        log::trace!("display deadline in {delay:?}");
        self.tracer.borrow().display_deadline(&DisplayDeadlineEvent {
            deadline: now + delay,
            now,
        });
    }

    fn on_begin_frame_deadline(&self) {
        self.attempt_draw_and_swap();
        self.source.did_finish_frame(0);
    }

    fn attempt_draw_and_swap(&self) {
        self.cancel_deadline();
        self.deadline_time.set(HostTime::ZERO);

        let (draw, idle) = {
            let mut state = self.state.borrow_mut();
            state.inside_deadline_interval = false;
            if state.needs_draw && !state.output_surface_lost {
                let allowed = !state.swap_throttled() && !state.root_surface_resources_locked;
                (allowed, false)
            } else {
                state.go_idle();
                (false, true)
            }
        };

        if idle {
            log::trace!("display idle");
            self.source.set_needs_begin_frames(false);
            return;
        }

        let swapped = draw && self.draw_and_swap();
        let now = self.runner.now();
        self.tracer.borrow().display_swap(&DisplaySwapEvent {
            swapped,
            pending_swaps: self.pending_swaps(),
            now,
        });
    }

    fn draw_and_swap(&self) -> bool {
        let Some(client) = self.client.upgrade() else {
            return false;
        };
        if !client.draw_and_swap() {
            log::debug!("display draw produced no frame");
            return false;
        }
        self.state.borrow_mut().did_draw();
        true
    }
}

impl BeginFrameObserver for DisplayScheduler {
    fn on_begin_frame(&self, signal: &FrameSignal) {
        if !self.ledger.is_fresh(signal) {
            self.ledger.record_dropped();
            return;
        }
        self.ledger.record_used(signal);

        // A new frame before the last deadline ran ends the old interval now.
        if self.state.borrow().inside_deadline_interval {
            self.on_begin_frame_deadline();
        }

        let adjusted = FrameSignal {
            deadline: signal
                .deadline
                .saturating_sub(self.settings.parent_draw_time(signal.interval)),
            ..*signal
        };
        {
            let mut state = self.state.borrow_mut();
            state.signal = Some(adjusted);
            state.inside_deadline_interval = true;
        }
        self.schedule_deadline();
    }

    fn last_used_begin_frame_signal(&self) -> Option<FrameSignal> {
        self.ledger.last_used()
    }
}

impl Drop for DisplayScheduler {
    fn drop(&mut self) {
        self.cancel_deadline();
    }
}
