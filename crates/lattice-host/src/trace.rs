// Trace capture — Chrome trace-event recording for the host runtime
//
// While a session is active every kernel launch and device transfer is
// recorded as a complete ("X") event with its start offset and duration in
// microseconds. Stopping the session writes `<dir>/trace.json`, which loads
// in chrome://tracing and Perfetto.

use std::cell::Cell;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use lattice_core::error::{Error, Result};

/// File name of the trace written into the capture directory.
pub const TRACE_FILE_NAME: &str = "trace.json";

static NEXT_TRACE_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TRACE_THREAD_ID: Cell<u64> = Cell::new(NEXT_TRACE_THREAD_ID.fetch_add(1, Ordering::Relaxed));
}

fn current_trace_thread_id() -> u64 {
    TRACE_THREAD_ID.with(|tid| tid.get())
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TraceArgs {
    pub device: String,
    pub elements: u64,
}

#[derive(Debug, Clone, Serialize)]
struct ChromeTraceEvent {
    name: String,
    cat: &'static str,
    ph: &'static str,
    ts: u64,
    dur: u64,
    pid: u32,
    tid: u64,
    args: TraceArgs,
}

#[derive(Debug, Clone, Serialize)]
struct ChromeTraceOtherData {
    platforms: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: &'static str,
    #[serde(rename = "otherData")]
    other_data: ChromeTraceOtherData,
}

/// One active capture.
#[derive(Debug)]
pub(crate) struct TraceSession {
    dir: PathBuf,
    epoch: Instant,
    events: Vec<ChromeTraceEvent>,
}

impl TraceSession {
    pub fn new(dir: &Path) -> Self {
        TraceSession {
            dir: dir.to_path_buf(),
            epoch: Instant::now(),
            events: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record an event that started at `start` and ends now.
    pub fn record(&mut self, name: &str, cat: &'static str, start: Instant, args: TraceArgs) {
        let ts = start.saturating_duration_since(self.epoch).as_micros() as u64;
        let dur = start.elapsed().as_micros() as u64;
        self.events.push(ChromeTraceEvent {
            name: name.to_string(),
            cat,
            ph: "X",
            ts,
            dur,
            pid: std::process::id(),
            tid: current_trace_thread_id(),
            args,
        });
    }

    /// Write the session to `<dir>/trace.json` and return that path.
    pub fn flush(self, platforms: Vec<String>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(TRACE_FILE_NAME);
        let trace = ChromeTrace {
            trace_events: self.events,
            display_time_unit: "ms",
            other_data: ChromeTraceOtherData { platforms },
        };
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, &trace)?;
        writer.flush()?;
        Ok(path)
    }
}

pub(crate) fn already_active(dir: &Path) -> Error {
    Error::Trace(format!(
        "a trace is already being captured into {}",
        dir.display()
    ))
}

pub(crate) fn not_active() -> Error {
    Error::Trace("no trace capture is active".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_writes_chrome_trace() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("profile");
        let mut session = TraceSession::new(&dir);
        session.record(
            "add",
            "kernel",
            Instant::now(),
            TraceArgs {
                device: "cpu".into(),
                elements: 4,
            },
        );
        let path = session.flush(vec!["cpu".into()]).unwrap();
        assert_eq!(path, dir.join(TRACE_FILE_NAME));

        let text = fs::read_to_string(path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["displayTimeUnit"], "ms");
        assert_eq!(json["traceEvents"][0]["name"], "add");
        assert_eq!(json["traceEvents"][0]["ph"], "X");
        assert_eq!(json["traceEvents"][0]["args"]["elements"], 4);
        assert_eq!(json["otherData"]["platforms"][0], "cpu");
    }
}
