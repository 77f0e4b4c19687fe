// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated compositor driven by the cadence schedulers.
//!
//! A [`FrameScheduler`] paces a fake compositor whose main thread is
//! occasionally slow and whose GPU sometimes takes longer than a frame to
//! retire a swap. Every compositor draw damages the root surface of a
//! [`DisplayScheduler`], and a 30 Hz video producer damages a child surface.
//! Everything runs on a [`VirtualTaskRunner`], so the output is deterministic.
//!
//! Events are printed with a
//! [`PrettyPrintSink`](cadence_debug::pretty::PrettyPrintSink). Pass
//! `--chrome <path>` to also write a Chrome trace, and `--frames <n>` to change
//! how many main frames the compositor produces. Set `RUST_LOG=debug` for
//! scheduler logging.

use std::cell::{Cell, RefCell};
use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::rc::{Rc, Weak};

use cadence_core::display::{DisplayClient, DisplayScheduler, DisplaySchedulerSettings};
use cadence_core::frame::{
    DrawResult, FrameScheduler, SchedulerClient, SchedulerSettings, SmoothedTimingHistory,
};
use cadence_core::signal::FrameSignal;
use cadence_core::source::SyntheticBeginFrameSource;
use cadence_core::surface::SurfaceId;
use cadence_core::task::{TaskRunner, VirtualTaskRunner};
use cadence_core::tick::{PeriodicTickSource, TickClient};
use cadence_core::time::{Duration, HostTime};
use cadence_core::trace::{
    ActionEvent, DeadlineEvent, DisplayDeadlineEvent, DisplaySwapEvent, FrameDropEvent,
    ImplFrameEvent, SharedSink, TraceSink, Tracer,
};

use cadence_debug::chrome::ChromeTraceSink;
use cadence_debug::pretty::PrettyPrintSink;

const START: HostTime = HostTime(1_000_000);
const INTERVAL: Duration = FrameSignal::DEFAULT_INTERVAL;
const VIDEO_INTERVAL: Duration = Duration(33_333);

const ROOT_SURFACE: SurfaceId = SurfaceId(1);
const VIDEO_SURFACE: SurfaceId = SurfaceId(2);

const MAIN_THREAD_COST: Duration = Duration::from_millis(6);
const SLOW_MAIN_THREAD_COST: Duration = Duration::from_millis(24);
const RASTER_COST: Duration = Duration::from_millis(3);
const SWAP_LATENCY: Duration = Duration::from_millis(4);
const SLOW_SWAP_LATENCY: Duration = Duration::from_millis(21);
const DISPLAY_SWAP_LATENCY: Duration = Duration::from_millis(2);

/// Sends every event to a pretty printer and a Chrome trace collector.
struct TeeSink {
    pretty: PrettyPrintSink,
    chrome: ChromeTraceSink,
}

impl TraceSink for TeeSink {
    fn on_impl_frame(&mut self, e: &ImplFrameEvent) {
        self.pretty.on_impl_frame(e);
        self.chrome.on_impl_frame(e);
    }

    fn on_action(&mut self, e: &ActionEvent) {
        self.pretty.on_action(e);
        self.chrome.on_action(e);
    }

    fn on_deadline(&mut self, e: &DeadlineEvent) {
        self.pretty.on_deadline(e);
        self.chrome.on_deadline(e);
    }

    fn on_frame_drop(&mut self, e: &FrameDropEvent) {
        self.pretty.on_frame_drop(e);
        self.chrome.on_frame_drop(e);
    }

    fn on_display_deadline(&mut self, e: &DisplayDeadlineEvent) {
        self.pretty.on_display_deadline(e);
        self.chrome.on_display_deadline(e);
    }

    fn on_display_swap(&mut self, e: &DisplaySwapEvent) {
        self.pretty.on_display_swap(e);
        self.chrome.on_display_swap(e);
    }
}

#[derive(Debug, Default)]
struct Stats {
    main_frames: u64,
    compositor_draws: u64,
    display_swaps: u64,
    video_frames: u64,
}

/// The fake compositor, GPU, and display.
struct Simulation {
    runner: Rc<VirtualTaskRunner>,
    timing: Rc<SmoothedTimingHistory>,
    scheduler: RefCell<Weak<FrameScheduler>>,
    display: RefCell<Weak<DisplayScheduler>>,
    main_frames_left: Cell<u32>,
    commit_requested_at: Cell<HostTime>,
    stats: RefCell<Stats>,
    this: Weak<Self>,
}

impl Simulation {
    fn new(runner: Rc<VirtualTaskRunner>, main_frames: u32) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            runner,
            timing: Rc::new(SmoothedTimingHistory::default()),
            scheduler: RefCell::new(Weak::new()),
            display: RefCell::new(Weak::new()),
            main_frames_left: Cell::new(main_frames),
            commit_requested_at: Cell::new(START),
            stats: RefCell::new(Stats::default()),
            this: this.clone(),
        })
    }

    fn scheduler(&self) -> Option<Rc<FrameScheduler>> {
        self.scheduler.borrow().upgrade()
    }

    fn display(&self) -> Option<Rc<DisplayScheduler>> {
        self.display.borrow().upgrade()
    }

    /// Runs `f` on the simulation after `delay`.
    fn post(&self, delay: Duration, f: impl FnOnce(&Self) + 'static) {
        let weak = self.this.clone();
        self.runner.post_delayed_task(
            delay,
            Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    f(&this);
                }
            }),
        );
    }
}

impl SchedulerClient for Simulation {
    fn will_begin_impl_frame(&self, signal: &FrameSignal) {
        log::trace!("impl frame at {:?}", signal.frame_time);
    }

    fn scheduled_action_animate(&self) {}

    fn scheduled_action_send_begin_main_frame(&self) {
        let frame = {
            let mut stats = self.stats.borrow_mut();
            stats.main_frames += 1;
            stats.main_frames
        };
        let cost = if frame % 7 == 0 {
            SLOW_MAIN_THREAD_COST
        } else {
            MAIN_THREAD_COST
        };
        let sent_at = self.runner.now();
        self.post(Duration::ZERO, |sim| {
            if let Some(scheduler) = sim.scheduler() {
                scheduler.notify_begin_main_frame_started();
            }
        });
        self.post(cost, move |sim| {
            let elapsed = sim.runner.now().saturating_duration_since(sent_at);
            sim.timing.record_begin_main_frame_to_commit(elapsed);
            if let Some(scheduler) = sim.scheduler() {
                scheduler.notify_ready_to_commit();
            }
        });
    }

    fn scheduled_action_commit(&self) {
        self.commit_requested_at.set(self.runner.now());
        let left = self.main_frames_left.get();
        if left > 0 {
            self.main_frames_left.set(left - 1);
            if let Some(scheduler) = self.scheduler() {
                scheduler.set_needs_begin_main_frame();
            }
        }
        self.post(RASTER_COST, |sim| {
            let elapsed = sim
                .runner
                .now()
                .saturating_duration_since(sim.commit_requested_at.get());
            sim.timing.record_commit_to_ready_to_activate(elapsed);
            if let Some(scheduler) = sim.scheduler() {
                scheduler.notify_ready_to_activate();
            }
        });
    }

    fn scheduled_action_activate_sync_tree(&self) {
        self.timing.record_activate(Duration(500));
    }

    fn scheduled_action_draw_and_swap_if_possible(&self) -> DrawResult {
        let draw = {
            let mut stats = self.stats.borrow_mut();
            stats.compositor_draws += 1;
            stats.compositor_draws
        };
        self.timing.record_draw(Duration(1_500));
        if let Some(scheduler) = self.scheduler() {
            scheduler.did_swap_buffers();
        }
        if let Some(display) = self.display() {
            display.surface_damaged(ROOT_SURFACE);
        }
        let latency = if draw % 11 == 0 {
            SLOW_SWAP_LATENCY
        } else {
            SWAP_LATENCY
        };
        self.post(latency, |sim| {
            if let Some(scheduler) = sim.scheduler() {
                scheduler.did_swap_buffers_complete();
            }
        });
        DrawResult::Success
    }

    fn scheduled_action_draw_and_swap_forced(&self) -> DrawResult {
        self.scheduled_action_draw_and_swap_if_possible()
    }

    fn scheduled_action_prepare_tiles(&self) {
        self.timing.record_prepare_tiles(Duration(800));
    }

    fn scheduled_action_begin_output_surface_creation(&self) {
        self.post(Duration::from_millis(1), |sim| {
            if let Some(scheduler) = sim.scheduler() {
                log::info!("compositor output surface ready");
                scheduler.did_create_and_initialize_output_surface();
            }
        });
    }

    fn send_begin_main_frame_not_expected_soon(&self) {
        log::debug!("main thread may idle");
    }
}

impl DisplayClient for Simulation {
    fn draw_and_swap(&self) -> bool {
        self.stats.borrow_mut().display_swaps += 1;
        if let Some(display) = self.display() {
            display.did_swap_buffers();
        }
        self.post(DISPLAY_SWAP_LATENCY, |sim| {
            if let Some(display) = sim.display() {
                display.did_swap_buffers_complete();
            }
        });
        true
    }
}

/// Damages the video surface at 30 Hz while frames remain.
struct VideoProducer {
    sim: Weak<Simulation>,
    frames_left: Cell<u32>,
}

impl TickClient for VideoProducer {
    fn on_tick(&self) {
        let Some(sim) = self.sim.upgrade() else {
            return;
        };
        let left = self.frames_left.get();
        if left == 0 {
            return;
        }
        self.frames_left.set(left - 1);
        sim.stats.borrow_mut().video_frames += 1;
        if let Some(display) = sim.display() {
            display.surface_damaged(VIDEO_SURFACE);
        }
    }
}

#[derive(Debug)]
struct Args {
    frames: u32,
    chrome: Option<String>,
}

fn parse_args() -> Result<Args, Box<dyn Error>> {
    let mut args = Args {
        frames: 60,
        chrome: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--frames" => {
                let value = iter.next().ok_or("--frames needs a value")?;
                args.frames = value.parse()?;
            }
            "--chrome" => {
                args.chrome = Some(iter.next().ok_or("--chrome needs a path")?);
            }
            other => return Err(format!("unknown argument {other:?}").into()),
        }
    }
    Ok(args)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = parse_args()?;

    let runner = Rc::new(VirtualTaskRunner::new(START));
    let task_runner: Rc<dyn TaskRunner> = runner.clone();

    let sink = Rc::new(RefCell::new(TeeSink {
        pretty: PrettyPrintSink::new(Box::new(std::io::stdout()), START),
        chrome: ChromeTraceSink::new(),
    }));
    let shared: SharedSink = sink.clone();

    // -- compositor --------------------------------------------------------
    let sim = Simulation::new(runner.clone(), args.frames);
    let client: Weak<dyn SchedulerClient> = Rc::<Simulation>::downgrade(&sim);
    let scheduler = FrameScheduler::new(
        client,
        SchedulerSettings::default(),
        task_runner.clone(),
        sim.timing.clone(),
        None,
    )?;
    scheduler.set_tracer(Tracer::new(shared.clone()));
    scheduler.commit_vsync_parameters(START, INTERVAL);
    *sim.scheduler.borrow_mut() = Rc::downgrade(&scheduler);

    // -- display -----------------------------------------------------------
    let display_source = SyntheticBeginFrameSource::new(task_runner.clone(), INTERVAL);
    let display_client: Weak<dyn DisplayClient> = Rc::<Simulation>::downgrade(&sim);
    let display = DisplayScheduler::new(
        display_client,
        DisplaySchedulerSettings::default(),
        task_runner.clone(),
        display_source,
    )?;
    display.set_tracer(Tracer::new(shared));
    display.set_new_root_surface(ROOT_SURFACE);
    *sim.display.borrow_mut() = Rc::downgrade(&display);

    // -- video ---------------------------------------------------------------
    let video = Rc::new(VideoProducer {
        sim: Rc::downgrade(&sim),
        frames_left: Cell::new(args.frames / 2),
    });
    let video_ticks = PeriodicTickSource::new(task_runner, VIDEO_INTERVAL);
    let video_client: Weak<dyn TickClient> = Rc::<VideoProducer>::downgrade(&video);
    video_ticks.set_client(video_client);
    _ = video_ticks.set_active(true);

    // -- run -----------------------------------------------------------------
    scheduler.set_can_start();
    scheduler.set_visible(true);
    scheduler.set_can_draw(true);
    scheduler.set_needs_begin_main_frame();

    let period = INTERVAL * (u64::from(args.frames) + 30);
    runner.run_for_period(period);
    _ = video_ticks.set_active(false);

    let stats = sim.stats.borrow();
    println!(
        "main frames: {}  compositor draws: {}  video frames: {}  display swaps: {}",
        stats.main_frames, stats.compositor_draws, stats.video_frames, stats.display_swaps,
    );
    println!(
        "stale signals: {}  begin frames requested at exit: {}",
        scheduler.stale_signal_count(),
        scheduler.begin_frames_requested(),
    );

    if let Some(path) = args.chrome {
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        sink.borrow().chrome.write(&mut writer)?;
        println!("Wrote {path}");
    }
    Ok(())
}
