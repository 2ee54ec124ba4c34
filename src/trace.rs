//! Monotonic simulation clock and the append-only event trace.
//!
//! The clock is anchored when the engine is built; every event snapshots
//! seconds-since-boot as a double. The renderer produces the fixed-point
//! six-digit line format, and `write_trace` routes the rendered text to the
//! monitor, a file, or both.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::LogMode;

/// First rendered line of every trace.
pub const TRACE_HEADER: &str = "0.000000 - Simulator program starting";

/// Wall clock anchored at engine construction.
#[derive(Clone, Copy, Debug)]
pub struct SimClock {
    origin: Instant,
}

impl SimClock {
    /// Anchor the clock at the current instant.
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Seconds elapsed since the anchor.
    #[inline]
    pub fn seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// One time-stamped trace line: who did what, when.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub timestamp: f64,
    pub actor: String,
    pub description: String,
}

/// Append-only event log over a [`SimClock`].
#[derive(Debug)]
pub struct TraceLog {
    clock: SimClock,
    events: Vec<TraceEvent>,
}

impl TraceLog {
    /// Start a fresh log; the clock anchors now.
    pub fn start() -> Self {
        Self {
            clock: SimClock::start(),
            events: Vec::new(),
        }
    }

    /// Seconds elapsed on the underlying clock.
    #[inline]
    pub fn now(&self) -> f64 {
        self.clock.seconds()
    }

    /// Append an event stamped with the current time.
    pub fn emit(&mut self, actor: impl Into<String>, description: impl Into<String>) {
        let timestamp = self.now();
        self.emit_at(timestamp, actor, description);
    }

    /// Append an event with a timestamp snapshotted earlier by the caller.
    /// Used for device operations whose start time is taken before the
    /// blocking acquisition that yields the handle name.
    pub fn emit_at(
        &mut self,
        timestamp: f64,
        actor: impl Into<String>,
        description: impl Into<String>,
    ) {
        self.events.push(TraceEvent {
            timestamp,
            actor: actor.into(),
            description: description.into(),
        });
    }

    /// Events in emission order.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Render the whole trace: header line plus one line per event,
    /// timestamps fixed-point with six fractional digits.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(64 * (self.events.len() + 1));
        out.push_str(TRACE_HEADER);
        out.push('\n');
        for ev in &self.events {
            let _ = writeln!(out, "{:.6} - {}: {}", ev.timestamp, ev.actor, ev.description);
        }
        out
    }
}

/// Route a rendered trace according to the configured log mode.
///
/// `file_path` must be present for the file-backed modes; config validation
/// guarantees that before an engine ever runs.
pub fn write_trace(rendered: &str, mode: LogMode, file_path: Option<&Path>) -> io::Result<()> {
    let to_file = |path: Option<&Path>| -> io::Result<()> {
        let path = path.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "log file path not configured")
        })?;
        fs::write(path, rendered)
    };

    match mode {
        LogMode::Monitor => print!("{rendered}"),
        LogMode::File => to_file(file_path)?,
        LogMode::Both => {
            print!("{rendered}");
            to_file(file_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn events_carry_nondecreasing_timestamps() {
        let mut log = TraceLog::start();
        log.emit("OS", "preparing process 1");
        std::thread::sleep(Duration::from_millis(2));
        log.emit("OS", "starting process 1");
        log.emit("Process 1", "start processing action");

        let events = log.events();
        assert_eq!(events.len(), 3);
        for pair in events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert!(events[1].timestamp >= 0.002);
    }

    #[test]
    fn render_matches_line_format() {
        let mut log = TraceLog::start();
        log.emit_at(0.012345, "OS", "preparing process 1");
        log.emit_at(1.5, "Process 1", "end processing action");

        let rendered = log.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "0.000000 - Simulator program starting");
        assert_eq!(lines[1], "0.012345 - OS: preparing process 1");
        assert_eq!(lines[2], "1.500000 - Process 1: end processing action");
    }

    #[test]
    fn write_trace_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.out");
        let mut log = TraceLog::start();
        log.emit_at(0.25, "OS", "End process 1");

        write_trace(&log.render(), LogMode::File, Some(&path)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(TRACE_HEADER));
        assert!(written.contains("0.250000 - OS: End process 1"));
    }

    #[test]
    fn file_mode_without_path_is_rejected() {
        let log = TraceLog::start();
        let err = write_trace(&log.render(), LogMode::File, None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn trace_events_serialize_for_artifacts() {
        let ev = TraceEvent {
            timestamp: 0.5,
            actor: "Process 2".to_string(),
            description: "allocating memory".to_string(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: TraceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }
}
