// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cooperative delayed-task execution on a virtual clock.
//!
//! Every component in this crate is driven by posted tasks rather than by
//! threads or blocking waits. The [`TaskRunner`] trait is the seam through
//! which components read the clock and post or cancel delayed work;
//! [`VirtualTaskRunner`] is the deterministic, single-threaded implementation
//! used by tests and by simulations.
//!
//! # Ordering
//!
//! Tasks are ordered by `(post_time + delay, id)`. Ids are assigned
//! monotonically at post time, so tasks that become due at the same instant
//! run in the order they were posted.
//!
//! # Run modes
//!
//! - [`run_pending_tasks`](VirtualTaskRunner::run_pending_tasks) runs only the
//!   tasks that existed when it was called. Anything posted while it runs,
//!   even with a zero delay, waits for the next call.
//! - [`run_until_idle`](VirtualTaskRunner::run_until_idle) keeps going until
//!   the queue is empty, including tasks posted along the way.
//! - [`run_until_time`](VirtualTaskRunner::run_until_time) and
//!   [`run_for_period`](VirtualTaskRunner::run_for_period) run everything due
//!   up to a time boundary (inclusive), then leave the clock at that boundary.
//! - [`run_tasks_while`](VirtualTaskRunner::run_tasks_while) runs until a
//!   predicate, checked before each task, returns `false`.
//!
//! With auto-advance enabled (the default) the clock jumps forward to each
//! task's due time as it runs. With auto-advance disabled the clock only moves
//! when the caller moves it, and pending tasks run in order whether or not
//! they are due yet.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::cell::RefCell;
use core::fmt;

use crate::time::{Duration, HostTime};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + 'static>;

/// Handle returned when posting a task, used to cancel it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u64);

/// Posts and cancels delayed work against a monotonic clock.
///
/// Implementations are single-threaded. Posting from inside a running task is
/// always allowed.
pub trait TaskRunner {
    /// The current time on this runner's clock.
    fn now(&self) -> HostTime;

    /// Schedules `task` to run once `delay` has elapsed.
    fn post_delayed_task(&self, delay: Duration, task: Task) -> TaskHandle;

    /// Schedules `task` to run as soon as possible.
    fn post_task(&self, task: Task) -> TaskHandle {
        self.post_delayed_task(Duration::ZERO, task)
    }

    /// Cancels a posted task.
    ///
    /// Returns `false` if the task already ran or was already cancelled. A
    /// cancelled task never runs.
    fn cancel(&self, handle: TaskHandle) -> bool;
}

/// Upper bound on tasks executed by one `run_*` call unless reconfigured.
pub const DEFAULT_MAX_TASKS: usize = 100_000;

/// Ordering key: due time first, then post order.
type TaskKey = (HostTime, u64);

struct State {
    now: HostTime,
    next_id: u64,
    tasks: BTreeMap<TaskKey, Task>,
    due: BTreeMap<u64, HostTime>,
    auto_advance: bool,
    max_tasks: Option<usize>,
}

/// A deterministic task runner driven by a virtual clock.
///
/// Share it as `Rc<VirtualTaskRunner>`; components take it as
/// `Rc<dyn TaskRunner>`.
pub struct VirtualTaskRunner {
    state: RefCell<State>,
}

impl fmt::Debug for VirtualTaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("VirtualTaskRunner")
            .field("now", &state.now)
            .field("pending", &state.tasks.len())
            .field("auto_advance", &state.auto_advance)
            .finish_non_exhaustive()
    }
}

impl Default for VirtualTaskRunner {
    fn default() -> Self {
        Self::new(HostTime::ZERO)
    }
}

impl VirtualTaskRunner {
    /// Creates a runner whose clock starts at `start`, with auto-advance on.
    #[must_use]
    pub fn new(start: HostTime) -> Self {
        Self {
            state: RefCell::new(State {
                now: start,
                next_id: 0,
                tasks: BTreeMap::new(),
                due: BTreeMap::new(),
                auto_advance: true,
                max_tasks: Some(DEFAULT_MAX_TASKS),
            }),
        }
    }

    /// Creates a runner whose clock only moves when the caller moves it.
    #[must_use]
    pub fn manual(start: HostTime) -> Self {
        let runner = Self::new(start);
        runner.set_auto_advance(false);
        runner
    }

    /// Enables or disables advancing the clock to each task's due time.
    pub fn set_auto_advance(&self, auto_advance: bool) {
        self.state.borrow_mut().auto_advance = auto_advance;
    }

    /// Sets the maximum number of tasks a single `run_*` call may execute.
    ///
    /// `None` removes the guard.
    pub fn set_max_tasks(&self, max_tasks: Option<usize>) {
        self.state.borrow_mut().max_tasks = max_tasks;
    }

    /// Moves the clock forward by `delta` without running anything.
    pub fn advance_now(&self, delta: Duration) {
        self.state.borrow_mut().now += delta;
    }

    /// Sets the clock to `now`.
    ///
    /// # Panics
    ///
    /// Panics if `now` is earlier than the current time.
    pub fn set_now(&self, now: HostTime) {
        let mut state = self.state.borrow_mut();
        assert!(
            now >= state.now,
            "virtual clock cannot move backwards ({:?} -> {:?})",
            state.now,
            now
        );
        state.now = now;
    }

    /// Returns `true` if any task is queued.
    #[must_use]
    pub fn has_pending_tasks(&self) -> bool {
        !self.state.borrow().tasks.is_empty()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending_task_count(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    /// Due time of the next task to run.
    #[must_use]
    pub fn next_task_time(&self) -> Option<HostTime> {
        self.peek().map(|(t, _)| t)
    }

    /// Time from now until the next task is due, zero if it is overdue.
    #[must_use]
    pub fn delay_to_next_task(&self) -> Option<Duration> {
        let now = self.now();
        self.next_task_time()
            .map(|t| t.saturating_duration_since(now))
    }

    /// Runs the tasks that were queued when this call started.
    ///
    /// Returns `true` if tasks remain afterwards.
    pub fn run_pending_tasks(&self) -> bool {
        let limit = self.state.borrow().next_id;
        self.run_tasks(|_, (_, id)| id < limit)
    }

    /// Runs tasks until the queue is empty.
    ///
    /// Returns `true` only if the task limit stopped the run early.
    pub fn run_until_idle(&self) -> bool {
        self.run_tasks(|_, _| true)
    }

    /// Runs every task due at or before `time`, then sets the clock to `time`
    /// if it is not already later.
    ///
    /// Returns `true` if tasks remain afterwards.
    pub fn run_until_time(&self, time: HostTime) -> bool {
        let remaining = self.run_tasks(|_, (due, _)| due <= time);
        let mut state = self.state.borrow_mut();
        if state.now < time {
            state.now = time;
        }
        remaining
    }

    /// Runs every task due within `period` of now.
    ///
    /// Returns `true` if tasks remain afterwards.
    pub fn run_for_period(&self, period: Duration) -> bool {
        let end = self.now() + period;
        self.run_until_time(end)
    }

    /// Runs tasks while `predicate` holds, checking it before each task.
    ///
    /// The predicate may inspect or modify the queue. Returns `true` if tasks
    /// remain afterwards.
    pub fn run_tasks_while(&self, mut predicate: impl FnMut() -> bool) -> bool {
        self.run_tasks(|_, _| predicate())
    }

    fn peek(&self) -> Option<TaskKey> {
        self.state.borrow().tasks.keys().next().copied()
    }

    /// Core loop. `should_run` is evaluated with no borrow held, so it may
    /// call back into the runner.
    fn run_tasks(&self, mut should_run: impl FnMut(&Self, TaskKey) -> bool) -> bool {
        let max_tasks = self.state.borrow().max_tasks;
        let mut ran = 0_usize;
        loop {
            let Some(key) = self.peek() else {
                return false;
            };
            if !should_run(self, key) {
                return self.has_pending_tasks();
            }
            if max_tasks.is_some_and(|max| ran >= max) {
                log::warn!("virtual task runner stopped after {ran} tasks; possible repost loop");
                return true;
            }
            let task = {
                let mut state = self.state.borrow_mut();
                let Some(task) = state.tasks.remove(&key) else {
                    // The predicate cancelled it.
                    continue;
                };
                state.due.remove(&key.1);
                if state.auto_advance && state.now < key.0 {
                    state.now = key.0;
                }
                task
            };
            task();
            ran += 1;
        }
    }
}

impl TaskRunner for VirtualTaskRunner {
    fn now(&self) -> HostTime {
        self.state.borrow().now
    }

    fn post_delayed_task(&self, delay: Duration, task: Task) -> TaskHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        let due = state.now + delay;
        state.tasks.insert((due, id), task);
        state.due.insert(id, due);
        TaskHandle(id)
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        let mut state = self.state.borrow_mut();
        match state.due.remove(&handle.0) {
            Some(due) => state.tasks.remove(&(due, handle.0)).is_some(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::vec::Vec;
    use core::cell::Cell;

    fn recorder() -> Rc<RefCell<Vec<i32>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn push(log: &Rc<RefCell<Vec<i32>>>, v: i32) -> Task {
        let log = log.clone();
        Box::new(move || log.borrow_mut().push(v))
    }

    fn joined(log: &Rc<RefCell<Vec<i32>>>) -> String {
        let parts: Vec<String> = log.borrow().iter().map(|v| alloc::format!("{v}")).collect();
        parts.join(" ")
    }

    #[test]
    fn pending_tasks_defer_reposts_to_next_call() {
        let runner = Rc::new(VirtualTaskRunner::default());
        let log = recorder();
        for i in 1..=3 {
            let log = log.clone();
            let r = runner.clone();
            runner.post_task(Box::new(move || {
                log.borrow_mut().push(i);
                r.post_task(push(&log, -i));
            }));
        }

        assert!(runner.run_pending_tasks(), "reposted tasks should remain");
        assert_eq!(joined(&log), "1 2 3");

        log.borrow_mut().clear();
        assert!(!runner.run_pending_tasks(), "queue should be drained");
        assert_eq!(joined(&log), "-1 -2 -3");
    }

    #[test]
    fn run_until_idle_includes_reposts() {
        let runner = Rc::new(VirtualTaskRunner::default());
        let log = recorder();
        for i in 1..=3 {
            let log = log.clone();
            let r = runner.clone();
            runner.post_task(Box::new(move || {
                log.borrow_mut().push(i);
                r.post_task(push(&log, -i));
            }));
        }
        assert!(!runner.run_until_idle(), "queue should be drained");
        assert_eq!(joined(&log), "1 2 3 -1 -2 -3");
    }

    #[test]
    fn equal_deadlines_run_fifo() {
        let runner = VirtualTaskRunner::default();
        let log = recorder();
        runner.post_delayed_task(Duration(10), push(&log, 1));
        runner.post_delayed_task(Duration(5), push(&log, 0));
        runner.post_delayed_task(Duration(10), push(&log, 2));
        runner.post_delayed_task(Duration(10), push(&log, 3));
        runner.run_until_idle();
        assert_eq!(joined(&log), "0 1 2 3");
        assert_eq!(runner.now(), HostTime(10));
    }

    #[test]
    fn nested_equal_deadlines_stay_fifo() {
        let runner = Rc::new(VirtualTaskRunner::default());
        let log = recorder();
        {
            let log = log.clone();
            let r = runner.clone();
            runner.post_delayed_task(
                Duration(5),
                Box::new(move || {
                    log.borrow_mut().push(1);
                    // Due at 10, posted after task 2 below.
                    r.post_delayed_task(Duration(5), push(&log, 3));
                }),
            );
        }
        runner.post_delayed_task(Duration(10), push(&log, 2));
        runner.run_until_idle();
        assert_eq!(joined(&log), "1 2 3");
    }

    #[test]
    fn run_until_time_stops_at_boundary() {
        let runner = VirtualTaskRunner::default();
        let log = recorder();
        runner.post_delayed_task(Duration(100), push(&log, 1));
        runner.post_delayed_task(Duration(200), push(&log, 2));
        runner.post_delayed_task(Duration(201), push(&log, 3));

        assert!(runner.run_until_time(HostTime(200)), "task 3 should remain");
        assert_eq!(joined(&log), "1 2");
        assert_eq!(runner.now(), HostTime(200));
        assert_eq!(runner.delay_to_next_task(), Some(Duration(1)));
    }

    #[test]
    fn run_for_period_advances_clock_even_when_idle() {
        let runner = VirtualTaskRunner::new(HostTime(1000));
        assert!(!runner.run_for_period(Duration(500)), "nothing was queued");
        assert_eq!(runner.now(), HostTime(1500));
    }

    #[test]
    fn run_for_period_runs_reposted_tasks_within_period() {
        let runner = Rc::new(VirtualTaskRunner::default());
        let count = Rc::new(Cell::new(0_u32));

        fn tick(runner: Rc<VirtualTaskRunner>, count: Rc<Cell<u32>>) {
            count.set(count.get() + 1);
            let r = runner.clone();
            runner.post_delayed_task(Duration(10), Box::new(move || tick(r, count)));
        }

        let (r, c) = (runner.clone(), count.clone());
        runner.post_delayed_task(Duration(10), Box::new(move || tick(r, c)));
        assert!(runner.run_for_period(Duration(35)), "repost loop continues");
        assert_eq!(count.get(), 3);
        assert_eq!(runner.now(), HostTime(35));
        assert_eq!(runner.next_task_time(), Some(HostTime(40)));
    }

    #[test]
    fn run_tasks_while_checks_before_each_task() {
        let runner = VirtualTaskRunner::default();
        let log = recorder();
        for i in 0..5 {
            runner.post_task(push(&log, i));
        }
        let budget = Cell::new(2_u32);
        let remaining = runner.run_tasks_while(|| {
            let left = budget.get();
            budget.set(left.saturating_sub(1));
            left > 0
        });
        assert!(remaining, "three tasks should remain");
        assert_eq!(joined(&log), "0 1");
    }

    #[test]
    fn cancelled_task_never_runs() {
        let runner = VirtualTaskRunner::default();
        let log = recorder();
        let h = runner.post_delayed_task(Duration(5), push(&log, 1));
        runner.post_delayed_task(Duration(6), push(&log, 2));
        assert!(runner.cancel(h), "first cancel succeeds");
        assert!(!runner.cancel(h), "second cancel is a no-op");
        runner.run_until_idle();
        assert_eq!(joined(&log), "2");
    }

    #[test]
    fn manual_clock_runs_tasks_without_advancing() {
        let runner = VirtualTaskRunner::manual(HostTime(0));
        let log = recorder();
        runner.post_delayed_task(Duration(1000), push(&log, 1));
        runner.run_pending_tasks();
        assert_eq!(joined(&log), "1");
        assert_eq!(runner.now(), HostTime(0));
    }

    #[test]
    fn task_limit_stops_repost_loop() {
        let runner = Rc::new(VirtualTaskRunner::default());
        runner.set_max_tasks(Some(50));

        fn spin(runner: Rc<VirtualTaskRunner>) {
            let r = runner.clone();
            runner.post_task(Box::new(move || spin(r)));
        }
        spin(runner.clone());

        assert!(runner.run_until_idle(), "limit should leave work queued");
        assert_eq!(runner.pending_task_count(), 1);
    }

    #[test]
    #[should_panic(expected = "cannot move backwards")]
    fn set_now_rejects_going_backwards() {
        let runner = VirtualTaskRunner::new(HostTime(100));
        runner.set_now(HostTime(50));
    }
}
