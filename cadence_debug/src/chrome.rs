// Copyright 2026 the Cadence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`ChromeTraceSink`] collects scheduler events as they happen and
//! [`write`](ChromeTraceSink::write) emits them as [Chrome Trace Event
//! Format][format] JSON.
//!
//! The frame scheduler is reported as process 0 and the display scheduler as
//! process 1. Host times are already microseconds and are written unchanged.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use cadence_core::trace::{
    ActionEvent, DeadlineEvent, DisplayDeadlineEvent, DisplaySwapEvent, FrameDropEvent,
    ImplFrameEvent, TraceSink,
};

const FRAME_PID: u32 = 0;
const DISPLAY_PID: u32 = 1;

/// Collects events for Chrome Trace Event Format export.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
#[derive(Debug, Default)]
pub struct ChromeTraceSink {
    events: Vec<Value>,
}

impl ChromeTraceSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The events collected so far.
    #[must_use]
    pub fn events(&self) -> &[Value] {
        &self.events
    }

    /// Writes the collected events as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn write(&self, writer: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(writer, &self.events)?;
        Ok(())
    }
}

impl TraceSink for ChromeTraceSink {
    fn on_impl_frame(&mut self, e: &ImplFrameEvent) {
        self.events.push(json!({
            "ph": "X",
            "name": "ImplFrame",
            "cat": "Scheduler",
            "ts": e.signal.frame_time.0,
            "dur": e.signal.deadline.saturating_duration_since(e.signal.frame_time).0,
            "pid": FRAME_PID,
            "tid": 0,
            "args": {
                "frame_number": e.frame_number,
                "interval_us": e.signal.interval.0,
                "missed": e.signal.is_missed(),
                "began_at": e.now.0,
            }
        }));
    }

    fn on_action(&mut self, e: &ActionEvent) {
        self.events.push(json!({
            "ph": "i",
            "name": e.action.name(),
            "cat": "Action",
            "ts": e.now.0,
            "pid": FRAME_PID,
            "tid": 1,
            "s": "t",
            "args": {
                "frame_number": e.frame_number,
            }
        }));
    }

    fn on_deadline(&mut self, e: &DeadlineEvent) {
        self.events.push(json!({
            "ph": "i",
            "name": "ScheduleDeadline",
            "cat": "Scheduler",
            "ts": e.now.0,
            "pid": FRAME_PID,
            "tid": 0,
            "s": "t",
            "args": {
                "frame_number": e.frame_number,
                "mode": format!("{:?}", e.mode),
                "deadline": e.deadline.0,
            }
        }));
    }

    fn on_frame_drop(&mut self, e: &FrameDropEvent) {
        self.events.push(json!({
            "ph": "i",
            "name": "DropBeginFrame",
            "cat": "Scheduler",
            "ts": e.now.0,
            "pid": FRAME_PID,
            "tid": 0,
            "s": "p",
            "args": {
                "frame_time": e.frame_time.0,
                "reason": format!("{:?}", e.reason),
            }
        }));
    }

    fn on_display_deadline(&mut self, e: &DisplayDeadlineEvent) {
        self.events.push(json!({
            "ph": "i",
            "name": "DisplayDeadline",
            "cat": "Display",
            "ts": e.now.0,
            "pid": DISPLAY_PID,
            "tid": 0,
            "s": "t",
            "args": {
                "deadline": e.deadline.0,
            }
        }));
    }

    fn on_display_swap(&mut self, e: &DisplaySwapEvent) {
        self.events.push(json!({
            "ph": "i",
            "name": if e.swapped { "DrawAndSwap" } else { "SkipSwap" },
            "cat": "Display",
            "ts": e.now.0,
            "pid": DISPLAY_PID,
            "tid": 0,
            "s": "t",
            "args": {
                "pending_swaps": e.pending_swaps,
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::frame::Action;
    use cadence_core::signal::FrameSignal;
    use cadence_core::surface::SourceId;
    use cadence_core::time::{Duration, HostTime};
    use cadence_core::trace::FrameDropReason;

    #[test]
    fn export_produces_valid_json() {
        let mut sink = ChromeTraceSink::new();
        sink.on_impl_frame(&ImplFrameEvent {
            frame_number: 1,
            signal: FrameSignal::new(
                SourceId(1),
                HostTime(1_000),
                HostTime(12_111),
                Duration(16_666),
            ),
            now: HostTime(1_000),
        });
        sink.on_action(&ActionEvent {
            frame_number: 1,
            action: Action::Animate,
            now: HostTime(1_000),
        });
        sink.on_frame_drop(&FrameDropEvent {
            frame_time: HostTime(17_666),
            reason: FrameDropReason::ImplLatencyRecovery,
            now: HostTime(17_666),
        });

        let mut out = Vec::new();
        sink.write(&mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 3);

        assert_eq!(parsed[0]["ph"], "X");
        assert_eq!(parsed[0]["name"], "ImplFrame");
        assert_eq!(parsed[0]["dur"], 11_111);

        assert_eq!(parsed[1]["ph"], "i");
        assert_eq!(parsed[1]["name"], "Animate");
        assert_eq!(parsed[1]["tid"], 1);

        assert_eq!(parsed[2]["args"]["reason"], "ImplLatencyRecovery");
    }

    #[test]
    fn display_events_use_their_own_process() {
        let mut sink = ChromeTraceSink::new();
        sink.on_display_deadline(&DisplayDeadlineEvent {
            deadline: HostTime(5_000),
            now: HostTime(1_000),
        });
        sink.on_display_swap(&DisplaySwapEvent {
            swapped: true,
            pending_swaps: 1,
            now: HostTime(5_000),
        });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e["pid"] == DISPLAY_PID));
        assert_eq!(events[1]["name"], "DrawAndSwap");
    }

    #[test]
    fn export_empty_sink() {
        let mut out = Vec::new();
        ChromeTraceSink::new().write(&mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty());
    }
}
