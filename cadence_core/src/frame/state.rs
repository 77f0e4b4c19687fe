// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The frame scheduler's decision logic, free of tasks and callbacks.
//!
//! [`SchedulerStateMachine`] folds every notification the scheduler receives
//! into a handful of small state enums plus demand flags, and answers one
//! question: which [`Action`] should run next. The owning
//! [`FrameScheduler`](super::FrameScheduler) loops on
//! [`next_action`](SchedulerStateMachine::next_action) /
//! [`update_state`](SchedulerStateMachine::update_state) until the answer is
//! [`Action::None`], performing each action through its client.
//!
//! Actions are chosen in a fixed priority order: activation, commit,
//! animation, draw, tile preparation, begin-main-frame, invalidation, output
//! surface creation. Activation and commit come first so that neither the
//! main-thread pipeline nor swap throttling can starve the other.

use super::client::{BeginMainFrameAbortReason, DrawResult};
use super::settings::SchedulerSettings;

/// Lifecycle of the output surface frames are drawn into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputSurfaceState {
    /// No surface has been requested yet.
    Uninitialized,
    /// Creation has been requested and not yet confirmed.
    Requesting,
    /// A surface is ready for drawing.
    Active,
    /// The surface was lost. A new one will be requested.
    Lost,
}

/// Where the scheduler is within the current begin frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BeginImplFrameState {
    /// Between frames.
    Idle,
    /// A begin frame was accepted; the deadline has not fired.
    InsideBeginFrame,
    /// The deadline fired; drawing is allowed.
    InsideDeadline,
}

/// Progress of the main thread's frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MainFrameState {
    /// No main frame outstanding.
    Idle,
    /// A begin-main-frame was sent.
    Sent,
    /// The main thread started working on it.
    Started,
    /// The main thread is ready to commit.
    ReadyToCommit,
}

/// Content staged between commit and the first draw after activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PendingTreeState {
    /// Nothing staged.
    None,
    /// A commit produced a pending tree that is not ready yet.
    Pending,
    /// The pending tree can be activated.
    ReadyToActivate,
    /// The tree was activated and has not been drawn yet.
    Active,
}

/// Progress toward a draw forced by repeated checkerboarding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForcedRedrawState {
    /// No forced draw pending.
    Idle,
    /// Waiting for fresh content from the main thread.
    WaitingForCommit,
    /// Waiting for that content to activate.
    WaitingForActivation,
    /// The next draw is forced.
    WaitingForDraw,
}

/// How the begin-frame deadline should be placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeadlineMode {
    /// No deadline task (synchronous mode).
    None,
    /// Fire as soon as possible.
    Immediate,
    /// Leave time for the draw before the signal's deadline.
    Regular,
    /// Wait out the whole interval.
    Late,
    /// Wait until the embedder reports it is ready to draw.
    BlockedOnReadyToDraw,
}

/// An action chosen by the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Nothing to do.
    None,
    /// Tick impl-side animations.
    Animate,
    /// Ask the main thread for a frame.
    SendBeginMainFrame,
    /// Commit the main thread's frame.
    Commit,
    /// Activate the pending tree.
    ActivateSyncTree,
    /// Draw unless content is incomplete.
    DrawAndSwapIfPossible,
    /// Draw even if content is incomplete.
    DrawAndSwapForced,
    /// Drop a draw that cannot happen, clearing the redraw demand.
    DrawAndSwapAbort,
    /// Prepare tiles.
    PrepareTiles,
    /// Request a new output surface.
    BeginOutputSurfaceCreation,
    /// Invalidate so the embedder draws (synchronous mode).
    InvalidateOutputSurface,
}

impl Action {
    /// A stable, human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Animate => "Animate",
            Self::SendBeginMainFrame => "SendBeginMainFrame",
            Self::Commit => "Commit",
            Self::ActivateSyncTree => "ActivateSyncTree",
            Self::DrawAndSwapIfPossible => "DrawAndSwapIfPossible",
            Self::DrawAndSwapForced => "DrawAndSwapForced",
            Self::DrawAndSwapAbort => "DrawAndSwapAbort",
            Self::PrepareTiles => "PrepareTiles",
            Self::BeginOutputSurfaceCreation => "BeginOutputSurfaceCreation",
            Self::InvalidateOutputSurface => "InvalidateOutputSurface",
        }
    }
}

/// Pure scheduling state. See the [module docs](self).
#[derive(Clone, Debug)]
pub struct SchedulerStateMachine {
    settings: SchedulerSettings,

    output_surface: OutputSurfaceState,
    impl_frame: BeginImplFrameState,
    main_frame: MainFrameState,
    pending_tree: PendingTreeState,
    forced_redraw: ForcedRedrawState,

    current_frame_number: u64,
    last_frame_number_animate_performed: Option<u64>,
    last_frame_number_begin_main_frame_sent: Option<u64>,
    last_frame_number_prepare_tiles_performed: Option<u64>,
    last_frame_number_invalidate_performed: Option<u64>,
    request_swap_funnel: bool,

    commit_count: u64,
    consecutive_checkerboard_animations: u32,
    max_pending_swaps: u32,
    pending_swaps: u32,

    needs_redraw: bool,
    needs_animate: bool,
    needs_prepare_tiles: bool,
    needs_begin_main_frame: bool,
    defer_commits: bool,

    visible: bool,
    can_start: bool,
    can_draw: bool,
    did_create_first_output_surface: bool,

    impl_latency_takes_priority: bool,
    skip_begin_main_frame_to_reduce_latency: bool,
    skip_next_begin_main_frame_to_reduce_latency: bool,
    main_thread_missed_last_deadline: bool,
    did_commit_after_animating: bool,
    wait_for_ready_to_draw: bool,
    children_need_begin_frames: bool,

    prepare_tiles_funnel: bool,
    external_prepare_tiles_in_progress: bool,

    idle_frames: u32,
    action_this_frame: bool,
}

impl SchedulerStateMachine {
    /// Creates a state machine with no surface, invisible and unable to draw.
    #[must_use]
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            output_surface: OutputSurfaceState::Uninitialized,
            impl_frame: BeginImplFrameState::Idle,
            main_frame: MainFrameState::Idle,
            pending_tree: PendingTreeState::None,
            forced_redraw: ForcedRedrawState::Idle,
            current_frame_number: 0,
            last_frame_number_animate_performed: None,
            last_frame_number_begin_main_frame_sent: None,
            last_frame_number_prepare_tiles_performed: None,
            last_frame_number_invalidate_performed: None,
            request_swap_funnel: false,
            commit_count: 0,
            consecutive_checkerboard_animations: 0,
            max_pending_swaps: settings.max_swaps_pending,
            pending_swaps: 0,
            needs_redraw: false,
            needs_animate: false,
            needs_prepare_tiles: false,
            needs_begin_main_frame: false,
            defer_commits: false,
            visible: false,
            can_start: false,
            can_draw: false,
            did_create_first_output_surface: false,
            impl_latency_takes_priority: false,
            skip_begin_main_frame_to_reduce_latency: false,
            skip_next_begin_main_frame_to_reduce_latency: false,
            main_thread_missed_last_deadline: false,
            did_commit_after_animating: false,
            wait_for_ready_to_draw: false,
            children_need_begin_frames: false,
            prepare_tiles_funnel: false,
            external_prepare_tiles_in_progress: false,
            idle_frames: settings.idle_frames_before_stop,
            action_this_frame: false,
            settings,
        }
    }

    // --- Action selection -------------------------------------------------

    /// The highest-priority action that should run now.
    #[must_use]
    pub fn next_action(&self) -> Action {
        if self.should_activate_pending_tree() {
            return Action::ActivateSyncTree;
        }
        if self.should_commit() {
            return Action::Commit;
        }
        if self.should_animate() {
            return Action::Animate;
        }
        if self.should_draw() {
            if self.pending_draws_should_be_aborted() {
                return Action::DrawAndSwapAbort;
            }
            if self.forced_redraw == ForcedRedrawState::WaitingForDraw {
                return Action::DrawAndSwapForced;
            }
            return Action::DrawAndSwapIfPossible;
        }
        if self.should_prepare_tiles() {
            return Action::PrepareTiles;
        }
        if self.should_send_begin_main_frame() {
            return Action::SendBeginMainFrame;
        }
        if self.should_invalidate_output_surface() {
            return Action::InvalidateOutputSurface;
        }
        if self.should_begin_output_surface_creation() {
            return Action::BeginOutputSurfaceCreation;
        }
        Action::None
    }

    /// Records that `action` is being performed.
    pub fn update_state(&mut self, action: Action) {
        match action {
            Action::None => return,
            Action::ActivateSyncTree => self.update_state_on_activation(),
            Action::Commit => self.update_state_on_commit(false),
            Action::Animate => {
                self.last_frame_number_animate_performed = Some(self.current_frame_number);
                self.needs_animate = false;
                self.did_commit_after_animating = false;
                // Animation output has to reach the screen.
                self.needs_redraw = true;
            }
            Action::SendBeginMainFrame => {
                self.main_frame = MainFrameState::Sent;
                self.needs_begin_main_frame = false;
                self.last_frame_number_begin_main_frame_sent = Some(self.current_frame_number);
            }
            Action::DrawAndSwapIfPossible | Action::DrawAndSwapForced => {
                self.update_state_on_draw(true);
            }
            Action::DrawAndSwapAbort => self.update_state_on_draw(false),
            Action::PrepareTiles => {
                self.needs_prepare_tiles = false;
                self.last_frame_number_prepare_tiles_performed = Some(self.current_frame_number);
            }
            Action::BeginOutputSurfaceCreation => {
                self.output_surface = OutputSurfaceState::Requesting;
            }
            Action::InvalidateOutputSurface => {
                self.last_frame_number_invalidate_performed = Some(self.current_frame_number);
            }
        }
        // Aborts and surface requests produce no frame, so they do not keep
        // begin frames coming.
        if !matches!(
            action,
            Action::DrawAndSwapAbort | Action::BeginOutputSurfaceCreation
        ) {
            self.idle_frames = 0;
            self.action_this_frame = true;
        }
    }

    fn should_activate_pending_tree(&self) -> bool {
        match self.pending_tree {
            PendingTreeState::ReadyToActivate => true,
            PendingTreeState::Pending => self.pending_activations_should_be_forced(),
            PendingTreeState::None | PendingTreeState::Active => false,
        }
    }

    fn pending_activations_should_be_forced(&self) -> bool {
        // Without a surface or visibility nothing will ever mark the tree
        // ready, and the main thread may be blocked on this activation.
        self.output_surface != OutputSurfaceState::Active || !self.visible
    }

    fn pending_draws_should_be_aborted(&self) -> bool {
        let surface_unusable = self.output_surface != OutputSurfaceState::Active;
        if self.settings.using_synchronous_renderer_compositor {
            return surface_unusable || !self.can_draw;
        }
        surface_unusable || !self.can_draw || !self.visible
    }

    fn should_commit(&self) -> bool {
        // A commit only needs the pending slot to be free. Swap throttling
        // does not block it.
        self.main_frame == MainFrameState::ReadyToCommit
            && matches!(
                self.pending_tree,
                PendingTreeState::None | PendingTreeState::Active
            )
    }

    fn has_animated_this_frame(&self) -> bool {
        self.last_frame_number_animate_performed == Some(self.current_frame_number)
    }

    fn should_animate(&self) -> bool {
        if self.output_surface != OutputSurfaceState::Active {
            return false;
        }
        if self.has_animated_this_frame() && !self.did_commit_after_animating {
            return false;
        }
        if self.impl_frame == BeginImplFrameState::Idle {
            return false;
        }
        self.needs_redraw || self.needs_animate
    }

    fn should_draw(&self) -> bool {
        // Aborts come first so a dead surface never blocks activation or
        // surface creation. Only an activated, undrawn tree needs one.
        if self.pending_draws_should_be_aborted() {
            return self.pending_tree == PendingTreeState::Active;
        }
        if self.request_swap_funnel {
            return false;
        }
        if self.output_surface != OutputSurfaceState::Active {
            return false;
        }
        if self.swap_throttled() {
            return false;
        }
        if self.impl_frame != BeginImplFrameState::InsideDeadline {
            return false;
        }
        if self.wait_for_ready_to_draw {
            return false;
        }
        if self.forced_redraw == ForcedRedrawState::WaitingForDraw {
            return true;
        }
        self.needs_redraw
    }

    fn should_prepare_tiles(&self) -> bool {
        if !self.needs_prepare_tiles || self.prepare_tiles_funnel {
            return false;
        }
        // Tiles are prepared after the draw, so only inside the deadline.
        if self.impl_frame != BeginImplFrameState::InsideDeadline {
            return false;
        }
        self.last_frame_number_prepare_tiles_performed != Some(self.current_frame_number)
    }

    fn could_send_begin_main_frame(&self) -> bool {
        self.needs_begin_main_frame && self.visible && !self.defer_commits
    }

    fn should_send_begin_main_frame(&self) -> bool {
        if !self.could_send_begin_main_frame() {
            return false;
        }
        if self.last_frame_number_begin_main_frame_sent == Some(self.current_frame_number) {
            return false;
        }
        if self.main_frame != MainFrameState::Idle {
            return false;
        }
        if self.impl_latency_takes_priority && self.pending_tree != PendingTreeState::None {
            return false;
        }
        if self.impl_frame == BeginImplFrameState::Idle
            && !self.settings.using_synchronous_renderer_compositor
        {
            return false;
        }
        // The forced draw needs fresh content.
        if self.forced_redraw == ForcedRedrawState::WaitingForCommit {
            return true;
        }
        if self.output_surface != OutputSurfaceState::Active {
            return false;
        }
        let just_swapped_in_deadline =
            self.impl_frame == BeginImplFrameState::InsideDeadline && self.request_swap_funnel;
        if self.swap_throttled() && !just_swapped_in_deadline {
            return false;
        }
        !self.skip_begin_main_frame_to_reduce_latency
    }

    fn should_invalidate_output_surface(&self) -> bool {
        if !self.settings.using_synchronous_renderer_compositor {
            return false;
        }
        if self.last_frame_number_invalidate_performed == Some(self.current_frame_number) {
            return false;
        }
        if self.impl_frame != BeginImplFrameState::InsideBeginFrame
            || self.output_surface != OutputSurfaceState::Active
        {
            return false;
        }
        self.needs_redraw || self.needs_prepare_tiles
    }

    fn should_begin_output_surface_creation(&self) -> bool {
        if !self.can_start {
            return false;
        }
        if !matches!(
            self.output_surface,
            OutputSurfaceState::Uninitialized | OutputSurfaceState::Lost
        ) {
            return false;
        }
        // Let the previous surface's frame, commit and draws drain first.
        self.impl_frame == BeginImplFrameState::Idle
            && self.main_frame == MainFrameState::Idle
            && self.pending_tree == PendingTreeState::None
    }

    fn update_state_on_commit(&mut self, commit_had_no_updates: bool) {
        self.commit_count += 1;
        self.main_frame = MainFrameState::Idle;
        if !commit_had_no_updates {
            self.did_commit_after_animating = true;
            self.pending_tree = PendingTreeState::Pending;
        }
        if self.forced_redraw == ForcedRedrawState::WaitingForCommit {
            self.forced_redraw = if commit_had_no_updates {
                ForcedRedrawState::WaitingForDraw
            } else {
                ForcedRedrawState::WaitingForActivation
            };
        }
    }

    fn update_state_on_activation(&mut self) {
        if self.forced_redraw == ForcedRedrawState::WaitingForActivation {
            self.forced_redraw = ForcedRedrawState::WaitingForDraw;
        }
        self.pending_tree = PendingTreeState::Active;
        self.needs_redraw = true;
        if self.settings.wait_for_ready_to_draw {
            self.wait_for_ready_to_draw = true;
        }
    }

    fn update_state_on_draw(&mut self, did_request_swap: bool) {
        if self.forced_redraw == ForcedRedrawState::WaitingForDraw {
            self.forced_redraw = ForcedRedrawState::Idle;
        }
        self.needs_redraw = false;
        if self.pending_tree == PendingTreeState::Active {
            self.pending_tree = PendingTreeState::None;
        }
        if did_request_swap {
            self.request_swap_funnel = true;
        }
    }

    /// Folds the result of a requested draw back in.
    ///
    /// Failures keep the demand that caused the draw, so the draw is retried
    /// on a later frame.
    pub fn did_draw_if_possible_completed(&mut self, result: DrawResult) {
        match result {
            DrawResult::Success => {
                self.consecutive_checkerboard_animations = 0;
                self.forced_redraw = ForcedRedrawState::Idle;
            }
            DrawResult::AbortedCheckerboardAnimations => {
                self.needs_redraw = true;
                // Already on the way to a forced draw.
                if self.forced_redraw != ForcedRedrawState::Idle {
                    return;
                }
                self.needs_begin_main_frame = true;
                self.consecutive_checkerboard_animations += 1;
                if self.settings.timeout_and_draw_when_animation_checkerboards
                    && self.consecutive_checkerboard_animations
                        >= self.settings.maximum_failed_draws_before_draw_is_forced
                {
                    self.consecutive_checkerboard_animations = 0;
                    self.forced_redraw = ForcedRedrawState::WaitingForCommit;
                    log::debug!("forcing a redraw after repeated checkerboarding");
                }
            }
            DrawResult::AbortedMissingHighResContent => {
                // Missing content may need new pictures, so ask for a commit.
                self.needs_redraw = true;
                self.needs_begin_main_frame = true;
            }
            DrawResult::AbortedCantDraw => {
                self.needs_redraw = true;
            }
        }
    }

    // --- Frame lifecycle --------------------------------------------------

    /// A begin frame was accepted.
    pub fn on_begin_impl_frame(&mut self) {
        self.impl_frame = BeginImplFrameState::InsideBeginFrame;
        self.current_frame_number += 1;
        self.action_this_frame = false;
        // Drain the external prepare-tiles funnel.
        self.prepare_tiles_funnel = false;
        self.skip_begin_main_frame_to_reduce_latency =
            self.skip_next_begin_main_frame_to_reduce_latency;
        self.skip_next_begin_main_frame_to_reduce_latency = false;
    }

    /// The frame's deadline fired.
    pub fn on_begin_impl_frame_deadline(&mut self) {
        self.impl_frame = BeginImplFrameState::InsideDeadline;
        self.request_swap_funnel = false;
        self.main_thread_missed_last_deadline = self.commit_pending()
            || matches!(
                self.pending_tree,
                PendingTreeState::Pending | PendingTreeState::ReadyToActivate
            );
    }

    /// The frame is over.
    pub fn on_begin_impl_frame_idle(&mut self) {
        self.impl_frame = BeginImplFrameState::Idle;
        self.skip_next_begin_main_frame_to_reduce_latency = false;
        if !self.action_this_frame {
            self.idle_frames = self.idle_frames.saturating_add(1);
        }
    }

    /// Whether begin frames should be requested from the source.
    #[must_use]
    pub fn begin_frame_needed(&self) -> bool {
        if self.output_surface != OutputSurfaceState::Active {
            return false;
        }
        if !self.visible {
            // Background frames only serve children and tile preparation.
            return self.children_need_begin_frames || self.needs_prepare_tiles;
        }
        self.forced_redraw == ForcedRedrawState::WaitingForDraw
            || self.needs_animate
            || self.needs_redraw
            || (self.needs_begin_main_frame && !self.defer_commits)
            || self.main_frame != MainFrameState::Idle
            || self.pending_tree != PendingTreeState::None
            || self.needs_prepare_tiles
            || self.children_need_begin_frames
            || self.idle_frames < self.settings.idle_frames_before_stop
    }

    /// How the deadline for the current frame should be placed.
    #[must_use]
    pub fn deadline_mode(&self) -> DeadlineMode {
        if self.settings.using_synchronous_renderer_compositor {
            return DeadlineMode::None;
        }
        if self.output_surface != OutputSurfaceState::Active {
            // End the frame quickly so a new surface can be requested.
            return DeadlineMode::Immediate;
        }
        if self.wait_for_ready_to_draw {
            return DeadlineMode::BlockedOnReadyToDraw;
        }
        if self.swap_throttled() {
            return DeadlineMode::Late;
        }
        if self.pending_tree == PendingTreeState::Active {
            return DeadlineMode::Immediate;
        }
        let nothing_outstanding = self.main_frame == MainFrameState::Idle
            && self.pending_tree == PendingTreeState::None
            && !self.external_prepare_tiles_in_progress;
        if nothing_outstanding || (self.needs_redraw && self.impl_latency_takes_priority) {
            return DeadlineMode::Immediate;
        }
        if self.needs_redraw {
            return DeadlineMode::Regular;
        }
        DeadlineMode::Late
    }

    /// Skip sending a begin-main-frame during the next frame.
    pub fn set_skip_next_begin_main_frame_to_reduce_latency(&mut self) {
        self.skip_next_begin_main_frame_to_reduce_latency = true;
    }

    // --- Demand -----------------------------------------------------------

    /// Requests a draw.
    pub fn set_needs_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Requests an animation tick.
    pub fn set_needs_animate(&mut self) {
        self.needs_animate = true;
    }

    /// Requests tile preparation.
    pub fn set_needs_prepare_tiles(&mut self) {
        self.needs_prepare_tiles = true;
    }

    /// Requests a main frame.
    pub fn set_needs_begin_main_frame(&mut self) {
        self.needs_begin_main_frame = true;
    }

    /// Holds back begin-main-frames without dropping the demand.
    pub fn set_defer_commits(&mut self, defer: bool) {
        self.defer_commits = defer;
    }

    /// Allows output surface creation.
    pub fn set_can_start(&mut self) {
        self.can_start = true;
    }

    /// Sets visibility. Toggling resets the prepare-tiles funnel.
    pub fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        if visible {
            self.main_thread_missed_last_deadline = false;
        }
        self.prepare_tiles_funnel = false;
        self.wait_for_ready_to_draw = false;
    }

    /// Sets whether drawing is currently possible.
    pub fn set_can_draw(&mut self, can_draw: bool) {
        self.can_draw = can_draw;
    }

    /// Prefer impl-thread latency over main-thread throughput.
    pub fn set_impl_latency_takes_priority(&mut self, priority: bool) {
        self.impl_latency_takes_priority = priority;
    }

    /// Sets whether child schedulers want begin frames.
    pub fn set_children_need_begin_frames(&mut self, needs: bool) {
        self.children_need_begin_frames = needs;
    }

    /// Sets the swap budget.
    pub fn set_max_pending_swaps(&mut self, max: u32) {
        self.max_pending_swaps = max;
    }

    // --- Acknowledgements -------------------------------------------------

    /// The main thread started its frame.
    pub fn notify_begin_main_frame_started(&mut self) {
        assert_eq!(
            self.main_frame,
            MainFrameState::Sent,
            "main frame started without being sent"
        );
        self.main_frame = MainFrameState::Started;
    }

    /// The main thread is ready to commit.
    pub fn notify_ready_to_commit(&mut self) {
        assert!(
            matches!(self.main_frame, MainFrameState::Sent | MainFrameState::Started),
            "ready to commit without an outstanding main frame ({:?})",
            self.main_frame
        );
        self.main_frame = MainFrameState::ReadyToCommit;
    }

    /// The main thread abandoned its frame.
    pub fn begin_main_frame_aborted(&mut self, reason: BeginMainFrameAbortReason) {
        assert!(
            matches!(self.main_frame, MainFrameState::Sent | MainFrameState::Started),
            "main frame aborted without being sent"
        );
        match reason {
            BeginMainFrameAbortReason::OutputSurfaceLost
            | BeginMainFrameAbortReason::NotVisible
            | BeginMainFrameAbortReason::CommitDeferred => {
                self.main_frame = MainFrameState::Idle;
                self.set_needs_begin_main_frame();
            }
            BeginMainFrameAbortReason::FinishedNoUpdates => self.update_state_on_commit(true),
        }
    }

    /// The pending tree can be activated.
    pub fn notify_ready_to_activate(&mut self) {
        if self.pending_tree == PendingTreeState::Pending {
            self.pending_tree = PendingTreeState::ReadyToActivate;
        }
    }

    /// The activated tree is ready to draw.
    pub fn notify_ready_to_draw(&mut self) {
        self.wait_for_ready_to_draw = false;
    }

    /// Tile preparation started outside the scheduler.
    pub fn will_prepare_tiles(&mut self) {
        self.external_prepare_tiles_in_progress = true;
    }

    /// Tile preparation finished outside the scheduler. Suppresses the
    /// scheduler's own preparation for the rest of this frame.
    pub fn did_prepare_tiles(&mut self) {
        self.external_prepare_tiles_in_progress = false;
        self.needs_prepare_tiles = false;
        self.prepare_tiles_funnel = true;
    }

    /// A frame was submitted.
    pub fn did_swap_buffers(&mut self) {
        self.pending_swaps = self.pending_swaps.saturating_add(1);
    }

    /// A submitted frame was consumed.
    pub fn did_swap_buffers_complete(&mut self) {
        self.pending_swaps = self.pending_swaps.saturating_sub(1);
    }

    /// The output surface was lost.
    pub fn did_lose_output_surface(&mut self) {
        if self.output_surface == OutputSurfaceState::Lost {
            return;
        }
        self.output_surface = OutputSurfaceState::Lost;
        self.needs_redraw = false;
        self.wait_for_ready_to_draw = false;
    }

    /// A requested output surface is ready.
    pub fn did_create_and_initialize_output_surface(&mut self) {
        assert_eq!(
            self.output_surface,
            OutputSurfaceState::Requesting,
            "output surface created without being requested"
        );
        self.output_surface = OutputSurfaceState::Active;
        if self.did_create_first_output_surface {
            // Content must be regenerated for the new surface.
            self.needs_begin_main_frame = true;
        }
        self.did_create_first_output_surface = true;
        self.pending_swaps = 0;
    }

    // --- Getters ----------------------------------------------------------

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Output surface lifecycle.
    #[must_use]
    pub fn output_surface_state(&self) -> OutputSurfaceState {
        self.output_surface
    }

    /// Begin-frame phase.
    #[must_use]
    pub fn begin_impl_frame_state(&self) -> BeginImplFrameState {
        self.impl_frame
    }

    /// Main-frame progress.
    #[must_use]
    pub fn main_frame_state(&self) -> MainFrameState {
        self.main_frame
    }

    /// Pending tree progress.
    #[must_use]
    pub fn pending_tree_state(&self) -> PendingTreeState {
        self.pending_tree
    }

    /// Forced-redraw progress.
    #[must_use]
    pub fn forced_redraw_state(&self) -> ForcedRedrawState {
        self.forced_redraw
    }

    /// A main frame is outstanding.
    #[must_use]
    pub fn commit_pending(&self) -> bool {
        self.main_frame != MainFrameState::Idle
    }

    /// Too many swaps await completion to draw again.
    #[must_use]
    pub fn swap_throttled(&self) -> bool {
        self.pending_swaps >= self.max_pending_swaps
    }

    /// Swaps awaiting completion.
    #[must_use]
    pub fn pending_swaps(&self) -> u32 {
        self.pending_swaps
    }

    /// The main thread's work was still outstanding at the last deadline.
    #[must_use]
    pub fn main_thread_missed_last_deadline(&self) -> bool {
        self.main_thread_missed_last_deadline
    }

    /// Impl-thread latency is prioritized.
    #[must_use]
    pub fn impl_latency_takes_priority(&self) -> bool {
        self.impl_latency_takes_priority
    }

    /// Child schedulers want begin frames.
    #[must_use]
    pub fn children_need_begin_frames(&self) -> bool {
        self.children_need_begin_frames
    }

    /// Visibility.
    #[must_use]
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Redraw demand.
    #[must_use]
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    /// Animation demand.
    #[must_use]
    pub fn needs_animate(&self) -> bool {
        self.needs_animate
    }

    /// Tile preparation demand.
    #[must_use]
    pub fn needs_prepare_tiles(&self) -> bool {
        self.needs_prepare_tiles
    }

    /// Main-frame demand.
    #[must_use]
    pub fn needs_begin_main_frame(&self) -> bool {
        self.needs_begin_main_frame
    }

    /// Commits are deferred.
    #[must_use]
    pub fn defer_commits(&self) -> bool {
        self.defer_commits
    }

    /// Commits performed so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    /// Begin frames accepted so far.
    #[must_use]
    pub fn current_frame_number(&self) -> u64 {
        self.current_frame_number
    }
}
