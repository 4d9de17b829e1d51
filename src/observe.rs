//! Progress/log sink and debug plotter boundaries.
//!
//! Both collaborators are optional: a missing sink is a silent no-op and the
//! core never blocks on either of them.

use std::fmt;
use std::sync::Arc;

/// Message severity accepted by a progress sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Receiver of leveled progress messages.
pub trait ProgressSink: Send + Sync {
    fn message(&self, severity: Severity, text: &str);

    /// Called once at the start of an execution pass.
    fn reset(&self) {}
}

/// Sink that drops every message.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn message(&self, _severity: Severity, _text: &str) {}
}

/// Sink forwarding messages to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn message(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Info => tracing::info!(target: "arbordoc", "{text}"),
            Severity::Warn => tracing::warn!(target: "arbordoc", "{text}"),
            Severity::Error => tracing::error!(target: "arbordoc", "{text}"),
        }
    }
}

/// Optional debug-visualization sink. Calls are fire-and-forget; correctness
/// never depends on a plotter being present.
pub trait Plotter: Send + Sync {
    fn draw(&self, key: &str, payload: &dyn fmt::Debug);
    fn redraw(&self, key: &str, payload: &dyn fmt::Debug);
}

/// Handle wrapping an optional sink so call sites do not branch.
#[derive(Clone, Default)]
pub struct ProgressEntry {
    sink: Option<Arc<dyn ProgressSink>>,
}

impl ProgressEntry {
    pub fn new(sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self { sink }
    }

    pub fn reset(&self) {
        if let Some(s) = &self.sink {
            s.reset();
        }
    }

    pub fn info(&self, text: &str) {
        self.send(Severity::Info, text);
    }

    pub fn warn(&self, text: &str) {
        self.send(Severity::Warn, text);
    }

    pub fn error(&self, text: &str) {
        self.send(Severity::Error, text);
    }

    fn send(&self, severity: Severity, text: &str) {
        if let Some(s) = &self.sink {
            s.message(severity, text);
        }
    }
}

impl fmt::Debug for ProgressEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressEntry")
            .field("attached", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<String>>);

    impl ProgressSink for Recorder {
        fn message(&self, severity: Severity, text: &str) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{severity:?}: {text}"));
        }
    }

    #[test]
    fn entry_without_sink_is_silent() {
        let entry = ProgressEntry::default();
        entry.info("nobody listens");
        entry.error("still nobody");
    }

    #[test]
    fn entry_forwards_to_sink() {
        let rec = Arc::new(Recorder(Mutex::new(Vec::new())));
        let entry = ProgressEntry::new(Some(rec.clone()));
        entry.warn("watch out");
        assert_eq!(rec.0.lock().unwrap().as_slice(), ["Warn: watch out"]);
    }
}
