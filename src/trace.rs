//! Per-call diagnostic trace buffers.
use std::time;

/// One annotation in a [`Trace`](struct.Trace.html).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceEntry {
    /// Time between the creation of the trace and this entry.
    pub elapsed: time::Duration,
    /// The annotation itself.
    pub message: String,
}

/// An append-only log of timestamped annotations for a single call.
///
/// Handlers use it to record where the time for a call went; the transport can dump it once the
/// call has completed. Entries are mirrored as `tracing` events at the `TRACE` level.
#[derive(Debug)]
pub struct Trace {
    started: time::Instant,
    entries: parking_lot::Mutex<Vec<TraceEntry>>,
}

impl Trace {
    /// Creates an empty trace that starts now.
    pub fn new() -> Self {
        Trace {
            started: time::Instant::now(),
            entries: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Appends an annotation.
    pub fn record<S>(&self, message: S)
    where
        S: Into<String>,
    {
        let message = message.into();
        let elapsed = self.started.elapsed();
        tracing::trace!(elapsed_us = elapsed.as_micros() as u64, "{}", message);
        self.entries.lock().push(TraceEntry { elapsed, message });
    }

    /// A copy of all annotations recorded so far, in order.
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries.lock().clone()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Renders the trace, one `<elapsed>us <message>` line per entry.
    pub fn dump(&self) -> String {
        let entries = self.entries.lock();
        let mut out = String::new();
        for entry in entries.iter() {
            out.push_str(&format!("{}us {}\n", entry.elapsed.as_micros(), entry.message));
        }
        out
    }
}

impl Default for Trace {
    fn default() -> Self {
        Trace::new()
    }
}
