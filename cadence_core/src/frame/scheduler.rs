// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The task-driven half of the frame scheduler.
//!
//! [`FrameScheduler`] owns a [`SchedulerStateMachine`] and everything the
//! state machine cannot do on its own: it observes a begin-frame source,
//! queues signals that arrive mid-frame, places and fires the deadline task,
//! decides when skipping work recovers latency, and performs each chosen
//! action through the embedder's [`SchedulerClient`].

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};
use core::fmt;

use super::client::{BeginMainFrameAbortReason, SchedulerClient};
use super::settings::{SchedulerSettings, SettingsError};
use super::state::{
    Action, BeginImplFrameState, DeadlineMode, OutputSurfaceState, PendingTreeState,
    SchedulerStateMachine,
};
use super::timing_history::CompositorTimingHistory;
use crate::signal::FrameSignal;
use crate::source::{
    BackToBackBeginFrameSource, BeginFrameObserver, BeginFrameSource,
    BeginFrameSourceMultiplexer, SignalLedger, SyntheticBeginFrameSource,
};
use crate::task::{TaskHandle, TaskRunner};
use crate::time::{Duration, HostTime};
use crate::trace::{
    ActionEvent, DeadlineEvent, FrameDropEvent, FrameDropReason, ImplFrameEvent, Tracer,
};

/// Which of the scheduler's sources is currently driving it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameSourceKind {
    /// The injected external source, or the owned display-rate synthetic one.
    Primary,
    /// The slow synthetic source used while invisible.
    Background,
    /// The back-to-back source used when frame production is unthrottled.
    Unthrottled,
}

/// Deadline-driven frame scheduler.
///
/// Created with [`FrameScheduler::new`] and shared as an `Rc`. Every method
/// takes `&self` and may be called from inside client callbacks.
pub struct FrameScheduler {
    settings: SchedulerSettings,
    client: Weak<dyn SchedulerClient>,
    runner: Rc<dyn TaskRunner>,
    timing: Rc<dyn CompositorTimingHistory>,
    tracer: RefCell<Tracer>,
    state: RefCell<SchedulerStateMachine>,

    frame_source: Rc<BeginFrameSourceMultiplexer>,
    primary_source: Rc<dyn BeginFrameSource>,
    synthetic_source: Option<Rc<SyntheticBeginFrameSource>>,
    background_source: Rc<SyntheticBeginFrameSource>,
    unthrottled_source: Rc<BackToBackBeginFrameSource>,
    throttle_frame_production: Cell<bool>,

    ledger: SignalLedger,
    begin_impl_frame_signal: Cell<Option<FrameSignal>>,
    retro_frames: RefCell<VecDeque<FrameSignal>>,
    retro_task: Cell<Option<TaskHandle>>,
    deadline_task: Cell<Option<TaskHandle>>,
    deadline_mode: Cell<DeadlineMode>,

    last_vsync_timebase: Cell<HostTime>,
    authoritative_vsync_interval: Cell<Duration>,
    estimated_parent_draw_time: Cell<Duration>,

    inside_process: Cell<bool>,
    needs_reprocess: Cell<bool>,
    inside_action: Cell<Action>,
    this: Weak<Self>,
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("state", &self.state.borrow())
            .field("source", &self.frame_source_kind())
            .field("retro_frames", &self.retro_frames.borrow().len())
            .field("deadline_mode", &self.deadline_mode.get())
            .finish_non_exhaustive()
    }
}

impl FrameScheduler {
    /// Creates a scheduler.
    ///
    /// With `external_source` the embedder drives frames; otherwise the
    /// scheduler owns a synthetic source at the display rate, tuned with
    /// [`commit_vsync_parameters`](Self::commit_vsync_parameters).
    ///
    /// The scheduler starts invisible, without an output surface and unable
    /// to draw.
    ///
    /// # Errors
    ///
    /// Returns the settings error if `settings` do not validate.
    pub fn new(
        client: Weak<dyn SchedulerClient>,
        settings: SchedulerSettings,
        runner: Rc<dyn TaskRunner>,
        timing: Rc<dyn CompositorTimingHistory>,
        external_source: Option<Rc<dyn BeginFrameSource>>,
    ) -> Result<Rc<Self>, SettingsError> {
        settings.validate()?;

        let (primary_source, synthetic_source): (Rc<dyn BeginFrameSource>, _) =
            match external_source {
                Some(external) => (external, None),
                None => {
                    let synthetic = SyntheticBeginFrameSource::new(
                        runner.clone(),
                        FrameSignal::DEFAULT_INTERVAL,
                    );
                    let primary: Rc<dyn BeginFrameSource> = synthetic.clone();
                    (primary, Some(synthetic))
                }
            };
        let background_source =
            SyntheticBeginFrameSource::new(runner.clone(), settings.background_frame_interval);
        let unthrottled_source = BackToBackBeginFrameSource::new(runner.clone());

        let frame_source = BeginFrameSourceMultiplexer::new();
        frame_source.add_source(primary_source.clone());
        frame_source.add_source(background_source.clone());
        frame_source.add_source(unthrottled_source.clone());

        let scheduler = Rc::new_cyclic(|this: &Weak<Self>| {
            let observer: Weak<dyn BeginFrameObserver> = this.clone();
            frame_source.add_observer(observer);
            Self {
                client,
                runner,
                timing,
                tracer: RefCell::new(Tracer::none()),
                state: RefCell::new(SchedulerStateMachine::new(settings)),
                frame_source,
                primary_source,
                synthetic_source,
                background_source,
                unthrottled_source,
                throttle_frame_production: Cell::new(settings.throttle_frame_production),
                ledger: SignalLedger::new(),
                begin_impl_frame_signal: Cell::new(None),
                retro_frames: RefCell::new(VecDeque::new()),
                retro_task: Cell::new(None),
                deadline_task: Cell::new(None),
                deadline_mode: Cell::new(DeadlineMode::None),
                last_vsync_timebase: Cell::new(HostTime::ZERO),
                authoritative_vsync_interval: Cell::new(Duration::ZERO),
                estimated_parent_draw_time: Cell::new(Duration::ZERO),
                inside_process: Cell::new(false),
                needs_reprocess: Cell::new(false),
                inside_action: Cell::new(Action::None),
                this: this.clone(),
                settings,
            }
        });
        scheduler.update_active_frame_source();
        Ok(scheduler)
    }

    /// Routes events to `tracer`.
    pub fn set_tracer(&self, tracer: Tracer) {
        *self.tracer.borrow_mut() = tracer;
    }

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    // --- Demand -----------------------------------------------------------

    /// Allows output surface creation.
    pub fn set_can_start(&self) {
        self.state.borrow_mut().set_can_start();
        self.process_scheduled_actions();
    }

    /// Shows or hides the compositor. Invisible compositors run on the
    /// background source.
    pub fn set_visible(&self, visible: bool) {
        self.state.borrow_mut().set_visible(visible);
        self.update_active_frame_source();
        self.process_scheduled_actions();
    }

    /// Sets whether drawing is currently possible.
    pub fn set_can_draw(&self, can_draw: bool) {
        self.state.borrow_mut().set_can_draw(can_draw);
        self.process_scheduled_actions();
    }

    /// Requests an animation tick.
    pub fn set_needs_animate(&self) {
        self.state.borrow_mut().set_needs_animate();
        self.process_scheduled_actions();
    }

    /// Requests a draw.
    pub fn set_needs_redraw(&self) {
        self.state.borrow_mut().set_needs_redraw();
        self.process_scheduled_actions();
    }

    /// Requests tile preparation.
    pub fn set_needs_prepare_tiles(&self) {
        self.state.borrow_mut().set_needs_prepare_tiles();
        self.process_scheduled_actions();
    }

    /// Requests a main frame.
    pub fn set_needs_begin_main_frame(&self) {
        self.state.borrow_mut().set_needs_begin_main_frame();
        self.process_scheduled_actions();
    }

    /// Holds begin-main-frames back while `true`. Demand is kept.
    pub fn set_defer_commits(&self, defer: bool) {
        self.state.borrow_mut().set_defer_commits(defer);
        self.process_scheduled_actions();
    }

    /// Sets the swap budget.
    pub fn set_max_swaps_pending(&self, max: u32) {
        self.state.borrow_mut().set_max_pending_swaps(max);
        self.process_scheduled_actions();
    }

    /// Prefers impl-thread latency over main-thread throughput.
    pub fn set_impl_latency_takes_priority(&self, priority: bool) {
        self.state
            .borrow_mut()
            .set_impl_latency_takes_priority(priority);
        self.process_scheduled_actions();
    }

    /// Sets whether child schedulers want begin frames.
    ///
    /// # Panics
    ///
    /// Panics unless forwarding to children is enabled in the settings.
    pub fn set_children_need_begin_frames(&self, needs: bool) {
        assert!(
            self.settings.forward_begin_frames_to_children,
            "forward_begin_frames_to_children is disabled"
        );
        self.state.borrow_mut().set_children_need_begin_frames(needs);
        self.process_scheduled_actions();
    }

    /// Switches between display-paced and back-to-back frame production.
    pub fn set_throttle_frame_production(&self, throttle: bool) {
        self.throttle_frame_production.set(throttle);
        self.update_active_frame_source();
        self.process_scheduled_actions();
    }

    /// Sets the time reserved for a parent compositor's draw, subtracted from
    /// every signal's deadline.
    pub fn set_estimated_parent_draw_time(&self, draw_time: Duration) {
        self.estimated_parent_draw_time.set(draw_time);
    }

    /// Re-phases the owned synthetic source. A zero interval means the
    /// default; an authoritative interval, once set, wins.
    pub fn commit_vsync_parameters(&self, timebase: HostTime, interval: Duration) {
        let interval = if !self.authoritative_vsync_interval.get().is_zero() {
            self.authoritative_vsync_interval.get()
        } else if interval.is_zero() {
            FrameSignal::DEFAULT_INTERVAL
        } else {
            interval
        };
        self.last_vsync_timebase.set(timebase);
        if let Some(synthetic) = &self.synthetic_source {
            synthetic.on_update_vsync_parameters(timebase, interval);
        }
    }

    /// Overrides the display interval reported through
    /// [`commit_vsync_parameters`](Self::commit_vsync_parameters).
    pub fn set_authoritative_vsync_interval(&self, interval: Duration) {
        self.authoritative_vsync_interval.set(interval);
        self.commit_vsync_parameters(self.last_vsync_timebase.get(), interval);
    }

    // --- Acknowledgements -------------------------------------------------

    /// The main thread started the requested frame.
    pub fn notify_begin_main_frame_started(&self) {
        self.state.borrow_mut().notify_begin_main_frame_started();
    }

    /// The main thread is ready to commit.
    pub fn notify_ready_to_commit(&self) {
        self.state.borrow_mut().notify_ready_to_commit();
        self.process_scheduled_actions();
    }

    /// The main thread gave up on the requested frame.
    pub fn begin_main_frame_aborted(&self, reason: BeginMainFrameAbortReason) {
        log::debug!("begin main frame aborted: {reason:?}");
        self.state.borrow_mut().begin_main_frame_aborted(reason);
        self.process_scheduled_actions();
    }

    /// The pending tree can be activated.
    pub fn notify_ready_to_activate(&self) {
        self.state.borrow_mut().notify_ready_to_activate();
        self.process_scheduled_actions();
    }

    /// The activated tree is ready to draw.
    pub fn notify_ready_to_draw(&self) {
        self.state.borrow_mut().notify_ready_to_draw();
        self.process_scheduled_actions();
    }

    /// Tile preparation is starting. Ignored while the scheduler's own
    /// prepare-tiles action runs.
    pub fn will_prepare_tiles(&self) {
        if self.inside_action.get() == Action::PrepareTiles {
            return;
        }
        self.state.borrow_mut().will_prepare_tiles();
    }

    /// Tile preparation finished. When it happened outside the scheduler's
    /// own action, the scheduler skips preparing tiles for this frame.
    pub fn did_prepare_tiles(&self) {
        if self.inside_action.get() == Action::PrepareTiles {
            return;
        }
        self.state.borrow_mut().did_prepare_tiles();
    }

    /// A frame was submitted.
    pub fn did_swap_buffers(&self) {
        self.state.borrow_mut().did_swap_buffers();
    }

    /// A submitted frame was consumed.
    pub fn did_swap_buffers_complete(&self) {
        self.state.borrow_mut().did_swap_buffers_complete();
        self.process_scheduled_actions();
    }

    /// A requested output surface is ready.
    pub fn did_create_and_initialize_output_surface(&self) {
        log::debug!("output surface initialized");
        self.state
            .borrow_mut()
            .did_create_and_initialize_output_surface();
        self.process_scheduled_actions();
    }

    /// The output surface was lost.
    ///
    /// Queued signals are dropped, staged content is activated and aborted,
    /// the deadline fires right away, and a new surface is requested once the
    /// frame ends.
    pub fn did_lose_output_surface(&self) {
        log::debug!("output surface lost");
        self.retro_frames.borrow_mut().clear();
        if let Some(handle) = self.retro_task.take() {
            self.runner.cancel(handle);
        }
        self.state.borrow_mut().did_lose_output_surface();
        self.process_scheduled_actions();
    }

    /// Draws now, as if the deadline fired (synchronous mode).
    ///
    /// # Panics
    ///
    /// Panics outside synchronous mode, or while an impl frame is open.
    pub fn on_draw_for_output_surface(&self) {
        assert!(
            self.settings.using_synchronous_renderer_compositor,
            "on_draw_for_output_surface requires synchronous mode"
        );
        assert_eq!(
            self.state.borrow().begin_impl_frame_state(),
            BeginImplFrameState::Idle,
            "draw requested inside an impl frame"
        );
        self.state.borrow_mut().on_begin_impl_frame_deadline();
        self.process_scheduled_actions();
        self.state.borrow_mut().on_begin_impl_frame_idle();
        self.process_scheduled_actions();
    }

    // --- Inspection -------------------------------------------------------

    /// A main frame is outstanding.
    #[must_use]
    pub fn commit_pending(&self) -> bool {
        self.state.borrow().commit_pending()
    }

    /// Drawing is throttled by in-flight swaps.
    #[must_use]
    pub fn swap_throttled(&self) -> bool {
        self.state.borrow().swap_throttled()
    }

    /// The main thread's work was outstanding at the last deadline.
    #[must_use]
    pub fn main_thread_missed_last_deadline(&self) -> bool {
        self.state.borrow().main_thread_missed_last_deadline()
    }

    /// A deadline task is posted.
    #[must_use]
    pub fn begin_impl_frame_deadline_pending(&self) -> bool {
        self.deadline_task.get().is_some()
    }

    /// How the current deadline was placed.
    #[must_use]
    pub fn deadline_mode(&self) -> DeadlineMode {
        self.deadline_mode.get()
    }

    /// Signals queued behind the current frame.
    #[must_use]
    pub fn retro_frame_count(&self) -> usize {
        self.retro_frames.borrow().len()
    }

    /// Output surface lifecycle.
    #[must_use]
    pub fn output_surface_state(&self) -> OutputSurfaceState {
        self.state.borrow().output_surface_state()
    }

    /// Pending tree progress.
    #[must_use]
    pub fn pending_tree_state(&self) -> PendingTreeState {
        self.state.borrow().pending_tree_state()
    }

    /// Begin-frame phase.
    #[must_use]
    pub fn begin_impl_frame_state(&self) -> BeginImplFrameState {
        self.state.borrow().begin_impl_frame_state()
    }

    /// Redraw demand.
    #[must_use]
    pub fn needs_redraw(&self) -> bool {
        self.state.borrow().needs_redraw()
    }

    /// Animation demand.
    #[must_use]
    pub fn needs_animate(&self) -> bool {
        self.state.borrow().needs_animate()
    }

    /// Tile preparation demand.
    #[must_use]
    pub fn needs_prepare_tiles(&self) -> bool {
        self.state.borrow().needs_prepare_tiles()
    }

    /// Main-frame demand.
    #[must_use]
    pub fn needs_begin_main_frame(&self) -> bool {
        self.state.borrow().needs_begin_main_frame()
    }

    /// Begin frames are currently requested from the source.
    #[must_use]
    pub fn begin_frames_requested(&self) -> bool {
        self.frame_source.needs_begin_frames()
    }

    /// The signal of the current (or last) impl frame, deadline adjusted.
    #[must_use]
    pub fn begin_impl_frame_signal(&self) -> Option<FrameSignal> {
        self.begin_impl_frame_signal.get()
    }

    /// Signals discarded as stale.
    #[must_use]
    pub fn stale_signal_count(&self) -> u64 {
        self.ledger.dropped_count()
    }

    /// A copy of the state machine.
    #[must_use]
    pub fn state_snapshot(&self) -> SchedulerStateMachine {
        self.state.borrow().clone()
    }

    /// Which source currently drives frames.
    #[must_use]
    pub fn frame_source_kind(&self) -> FrameSourceKind {
        let background: Rc<dyn BeginFrameSource> = self.background_source.clone();
        let unthrottled: Rc<dyn BeginFrameSource> = self.unthrottled_source.clone();
        if self.frame_source.is_active(&background) {
            FrameSourceKind::Background
        } else if self.frame_source.is_active(&unthrottled) {
            FrameSourceKind::Unthrottled
        } else {
            FrameSourceKind::Primary
        }
    }

    // --- Source selection -------------------------------------------------

    fn update_active_frame_source(&self) {
        let target: Rc<dyn BeginFrameSource> = if !self.state.borrow().visible() {
            self.background_source.clone()
        } else if self.throttle_frame_production.get() {
            self.primary_source.clone()
        } else {
            self.unthrottled_source.clone()
        };
        self.frame_source.set_active_source(Some(target));
    }

    // --- Begin frames -----------------------------------------------------

    fn drop_signal(&self, signal: &FrameSignal, reason: FrameDropReason) {
        log::trace!("dropping signal at {:?}: {reason:?}", signal.frame_time);
        self.tracer.borrow().frame_drop(&FrameDropEvent {
            frame_time: signal.frame_time,
            reason,
            now: self.runner.now(),
        });
    }

    fn forward_to_children(&self, signal: &FrameSignal) {
        if !self.settings.forward_begin_frames_to_children
            || !self.state.borrow().children_need_begin_frames()
        {
            return;
        }
        let Some(client) = self.client.upgrade() else {
            return;
        };
        // Children must finish in time for this frame's commit and draw.
        let reserved = self.timing.begin_main_frame_to_commit_duration_estimate()
            + self.timing.commit_to_ready_to_activate_duration_estimate()
            + self.timing.draw_duration_estimate()
            + self.estimated_parent_draw_time.get();
        let child = FrameSignal {
            deadline: signal.deadline.saturating_sub(reserved),
            ..*signal
        };
        client.send_begin_frames_to_children(&child);
    }

    fn begin_impl_frame_with_deadline(&self, signal: FrameSignal) {
        let adjusted = FrameSignal {
            deadline: signal
                .deadline
                .saturating_sub(self.timing.draw_duration_estimate()),
            ..signal
        };
        let main_to_activate = self.timing.begin_main_frame_to_commit_duration_estimate()
            + self.timing.commit_to_ready_to_activate_duration_estimate()
            + self.timing.activate_duration_estimate();
        let can_activate_before_deadline =
            adjusted.frame_time + main_to_activate < adjusted.deadline;

        // Swap throttling at the start of a frame means the impl side is a
        // frame behind, so the whole frame is skipped.
        if self.state.borrow().swap_throttled() {
            log::debug!("skipping begin impl frame to reduce latency");
            self.drop_signal(&signal, FrameDropReason::ImplLatencyRecovery);
            let remaining = self.retro_frames.borrow().len();
            self.frame_source.did_finish_frame(remaining);
            return;
        }
        if self.should_recover_main_latency(can_activate_before_deadline) {
            log::debug!("skipping next begin main frame to reduce latency");
            self.state
                .borrow_mut()
                .set_skip_next_begin_main_frame_to_reduce_latency();
        }
        self.begin_impl_frame(adjusted);
    }

    fn should_recover_main_latency(&self, can_activate_before_deadline: bool) -> bool {
        let state = self.state.borrow();
        state.main_thread_missed_last_deadline()
            && !state.impl_latency_takes_priority()
            && can_activate_before_deadline
    }

    fn begin_impl_frame(&self, signal: FrameSignal) {
        self.begin_impl_frame_signal.set(Some(signal));
        let frame_number = {
            let mut state = self.state.borrow_mut();
            state.on_begin_impl_frame();
            state.current_frame_number()
        };
        log::trace!("begin impl frame {frame_number} at {:?}", signal.frame_time);
        self.tracer.borrow().impl_frame(&ImplFrameEvent {
            frame_number,
            signal,
            now: self.runner.now(),
        });
        if let Some(client) = self.client.upgrade() {
            client.will_begin_impl_frame(&signal);
        }
        self.process_scheduled_actions();
    }

    fn begin_impl_frame_synchronous(&self, signal: FrameSignal) {
        self.begin_impl_frame(signal);
        self.finish_impl_frame();
    }

    fn finish_impl_frame(&self) {
        self.state.borrow_mut().on_begin_impl_frame_idle();
        self.process_scheduled_actions();
        if let Some(client) = self.client.upgrade() {
            client.did_finish_impl_frame();
        }
        let remaining = self.retro_frames.borrow().len();
        self.frame_source.did_finish_frame(remaining);
    }

    fn begin_retro_frame(&self) {
        self.retro_task.set(None);
        let now = self.runner.now();
        loop {
            let Some(front) = self.retro_frames.borrow().front().copied() else {
                break;
            };
            if now <= front.deadline {
                break;
            }
            self.retro_frames.borrow_mut().pop_front();
            self.drop_signal(&front, FrameDropReason::Expired);
            let remaining = self.retro_frames.borrow().len();
            self.frame_source.did_finish_frame(remaining);
        }
        let next = self.retro_frames.borrow_mut().pop_front();
        match next {
            Some(signal) => self.begin_impl_frame_with_deadline(signal),
            None => self.setup_next_begin_frame_if_needed(),
        }
    }

    fn post_begin_retro_frame_if_needed(&self) {
        if !self.frame_source.needs_begin_frames()
            || self.retro_task.get().is_some()
            || self.retro_frames.borrow().is_empty()
            || self.state.borrow().begin_impl_frame_state() != BeginImplFrameState::Idle
        {
            return;
        }
        let weak = self.this.clone();
        let handle = self.runner.post_task(Box::new(move || {
            if let Some(this) = weak.upgrade() {
                this.begin_retro_frame();
            }
        }));
        self.retro_task.set(Some(handle));
    }

    fn setup_next_begin_frame_if_needed(&self) {
        let (needed, idle) = {
            let state = self.state.borrow();
            (
                state.begin_frame_needed(),
                state.begin_impl_frame_state() == BeginImplFrameState::Idle,
            )
        };
        if needed != self.frame_source.needs_begin_frames() {
            if needed {
                self.frame_source.set_needs_begin_frames(true);
            } else if idle {
                // Only stop once the current frame is over.
                log::debug!("no longer requesting begin frames");
                self.frame_source.set_needs_begin_frames(false);
                if let Some(client) = self.client.upgrade() {
                    client.send_begin_main_frame_not_expected_soon();
                }
            }
        }
        self.post_begin_retro_frame_if_needed();
    }

    // --- Deadline ---------------------------------------------------------

    fn cancel_deadline(&self) {
        if let Some(handle) = self.deadline_task.take() {
            self.runner.cancel(handle);
        }
    }

    fn schedule_begin_impl_frame_deadline_if_needed(&self) {
        if self.settings.using_synchronous_renderer_compositor {
            return;
        }
        let mode = {
            let state = self.state.borrow();
            if state.begin_impl_frame_state() != BeginImplFrameState::InsideBeginFrame {
                return;
            }
            state.deadline_mode()
        };
        if self.deadline_mode.get() == mode && self.deadline_task.get().is_some() {
            return;
        }
        self.schedule_begin_impl_frame_deadline(mode);
    }

    fn schedule_begin_impl_frame_deadline(&self, mode: DeadlineMode) {
        self.cancel_deadline();
        self.deadline_mode.set(mode);
        let Some(signal) = self.begin_impl_frame_signal.get() else {
            return;
        };
        let late = signal.frame_time + signal.interval;
        let deadline = match mode {
            DeadlineMode::None | DeadlineMode::BlockedOnReadyToDraw => return,
            DeadlineMode::Immediate => HostTime::ZERO,
            DeadlineMode::Regular => signal.deadline.min(late),
            DeadlineMode::Late => late,
        };
        let now = self.runner.now();
        let delay = deadline.saturating_duration_since(now);
        let weak = self.this.clone();
        let handle = self.runner.post_delayed_task(
            delay,
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.on_begin_impl_frame_deadline();
                }
            }),
        );
        self.deadline_task.set(Some(handle));
        log::trace!("deadline {mode:?} in {delay:?}");
        self.tracer.borrow().deadline(&DeadlineEvent {
            frame_number: self.state.borrow().current_frame_number(),
            mode,
            deadline: now + delay,
            now,
        });
    }

    fn on_begin_impl_frame_deadline(&self) {
        self.deadline_task.set(None);
        self.deadline_mode.set(DeadlineMode::None);
        self.state.borrow_mut().on_begin_impl_frame_deadline();
        self.process_scheduled_actions();
        self.finish_impl_frame();
    }

    // --- Actions ----------------------------------------------------------

    fn process_scheduled_actions(&self) {
        // Callbacks may re-enter; the outermost call repeats the pass.
        if self.inside_process.get() {
            self.needs_reprocess.set(true);
            return;
        }
        self.inside_process.set(true);
        loop {
            self.needs_reprocess.set(false);
            self.run_pending_actions();
            self.schedule_begin_impl_frame_deadline_if_needed();
            self.setup_next_begin_frame_if_needed();
            if !self.needs_reprocess.get() {
                break;
            }
        }
        self.inside_process.set(false);
    }

    fn run_pending_actions(&self) {
        loop {
            let action = self.state.borrow().next_action();
            if action == Action::None {
                return;
            }
            let frame_number = {
                let mut state = self.state.borrow_mut();
                state.update_state(action);
                state.current_frame_number()
            };
            log::trace!("action {}", action.name());
            self.tracer.borrow().action(&ActionEvent {
                frame_number,
                action,
                now: self.runner.now(),
            });
            self.perform(action);
        }
    }

    fn perform(&self, action: Action) {
        let Some(client) = self.client.upgrade() else {
            return;
        };
        self.inside_action.set(action);
        match action {
            // Aborted draws only drop demand; the client is not involved.
            Action::None | Action::DrawAndSwapAbort => {}
            Action::Animate => client.scheduled_action_animate(),
            Action::SendBeginMainFrame => client.scheduled_action_send_begin_main_frame(),
            Action::Commit => client.scheduled_action_commit(),
            Action::ActivateSyncTree => client.scheduled_action_activate_sync_tree(),
            Action::DrawAndSwapIfPossible => {
                let result = client.scheduled_action_draw_and_swap_if_possible();
                self.state
                    .borrow_mut()
                    .did_draw_if_possible_completed(result);
            }
            Action::DrawAndSwapForced => {
                let result = client.scheduled_action_draw_and_swap_forced();
                self.state
                    .borrow_mut()
                    .did_draw_if_possible_completed(result);
            }
            Action::PrepareTiles => client.scheduled_action_prepare_tiles(),
            Action::BeginOutputSurfaceCreation => {
                client.scheduled_action_begin_output_surface_creation();
            }
            Action::InvalidateOutputSurface => {
                client.scheduled_action_invalidate_output_surface();
            }
        }
        self.inside_action.set(Action::None);
    }
}

impl BeginFrameObserver for FrameScheduler {
    fn on_begin_frame(&self, signal: &FrameSignal) {
        if !self.ledger.is_fresh(signal) {
            self.ledger.record_dropped();
            self.drop_signal(signal, FrameDropReason::Stale);
            return;
        }

        let adjusted = FrameSignal {
            deadline: signal
                .deadline
                .saturating_sub(self.estimated_parent_draw_time.get()),
            ..*signal
        };
        self.forward_to_children(signal);

        if self.settings.using_synchronous_renderer_compositor {
            self.ledger.record_used(signal);
            self.begin_impl_frame_synchronous(adjusted);
            return;
        }

        if !self.frame_source.needs_begin_frames() {
            self.drop_signal(signal, FrameDropReason::NotNeeded);
            return;
        }
        self.ledger.record_used(signal);

        let busy = self.state.borrow().begin_impl_frame_state() != BeginImplFrameState::Idle;
        if busy || self.retro_task.get().is_some() || !self.retro_frames.borrow().is_empty() {
            log::trace!("queueing retro frame at {:?}", signal.frame_time);
            self.retro_frames.borrow_mut().push_back(adjusted);
            return;
        }
        if self.runner.now() > adjusted.deadline {
            self.drop_signal(signal, FrameDropReason::Expired);
            self.frame_source.did_finish_frame(0);
            return;
        }
        self.begin_impl_frame_with_deadline(adjusted);
    }

    fn last_used_begin_frame_signal(&self) -> Option<FrameSignal> {
        self.ledger.last_used()
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.cancel_deadline();
        if let Some(handle) = self.retro_task.take() {
            self.runner.cancel(handle);
        }
    }
}
