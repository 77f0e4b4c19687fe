// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are printed in milliseconds relative to an origin.

use std::io::Write;

use cadence_core::time::HostTime;
use cadence_core::trace::{
    ActionEvent, DeadlineEvent, DisplayDeadlineEvent, DisplaySwapEvent, FrameDropEvent,
    ImplFrameEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    origin: HostTime,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(origin: HostTime) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            origin,
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>, origin: HostTime) -> Self {
        Self { writer, origin }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, origin: HostTime) -> Self {
        Self { writer, origin }
    }

    /// Consumes the sink and returns its writer.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn ms(&self, t: HostTime) -> f64 {
        t.saturating_duration_since(self.origin).0 as f64 / 1000.0
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_impl_frame(&mut self, e: &ImplFrameEvent) {
        let kind = if e.signal.is_missed() { " missed" } else { "" };
        let _ = writeln!(
            self.writer,
            "{:>10.3}ms [frame] #{} time={:.3}ms deadline={:.3}ms{kind}",
            self.ms(e.now),
            e.frame_number,
            self.ms(e.signal.frame_time),
            self.ms(e.signal.deadline),
        );
    }

    fn on_action(&mut self, e: &ActionEvent) {
        let _ = writeln!(
            self.writer,
            "{:>10.3}ms [action] #{} {}",
            self.ms(e.now),
            e.frame_number,
            e.action.name(),
        );
    }

    fn on_deadline(&mut self, e: &DeadlineEvent) {
        let _ = writeln!(
            self.writer,
            "{:>10.3}ms [deadline] #{} {:?} at {:.3}ms",
            self.ms(e.now),
            e.frame_number,
            e.mode,
            self.ms(e.deadline),
        );
    }

    fn on_frame_drop(&mut self, e: &FrameDropEvent) {
        let _ = writeln!(
            self.writer,
            "{:>10.3}ms [drop] time={:.3}ms reason={:?}",
            self.ms(e.now),
            self.ms(e.frame_time),
            e.reason,
        );
    }

    fn on_display_deadline(&mut self, e: &DisplayDeadlineEvent) {
        let _ = writeln!(
            self.writer,
            "{:>10.3}ms [display:deadline] at {:.3}ms",
            self.ms(e.now),
            self.ms(e.deadline),
        );
    }

    fn on_display_swap(&mut self, e: &DisplaySwapEvent) {
        let outcome = if e.swapped { "swapped" } else { "skipped" };
        let _ = writeln!(
            self.writer,
            "{:>10.3}ms [display:swap] {outcome} pending={}",
            self.ms(e.now),
            e.pending_swaps,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::frame::{Action, DeadlineMode};

    #[test]
    fn pretty_print_action() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), HostTime(1_000));
        sink.on_action(&ActionEvent {
            frame_number: 3,
            action: Action::SendBeginMainFrame,
            now: HostTime(2_500),
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.contains("[action]"), "got: {output}");
        assert!(output.contains("#3 SendBeginMainFrame"), "got: {output}");
        assert!(output.contains("1.500ms"), "got: {output}");
    }

    #[test]
    fn pretty_print_deadline_and_swap() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), HostTime::ZERO);
        sink.on_deadline(&DeadlineEvent {
            frame_number: 1,
            mode: DeadlineMode::Regular,
            deadline: HostTime(11_111),
            now: HostTime(1_000),
        });
        sink.on_display_swap(&DisplaySwapEvent {
            swapped: false,
            pending_swaps: 1,
            now: HostTime(12_000),
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2, "got: {output}");
        assert!(lines[0].contains("Regular at 11.111ms"), "got: {output}");
        assert!(lines[1].contains("skipped pending=1"), "got: {output}");
    }

    #[test]
    fn times_before_origin_clamp_to_zero() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), HostTime(5_000));
        sink.on_display_deadline(&DisplayDeadlineEvent {
            deadline: HostTime(0),
            now: HostTime(1_000),
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.contains("at 0.000ms"), "got: {output}");
    }
}
