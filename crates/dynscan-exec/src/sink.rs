//! Append-only log sinks for build output

use std::io::Write;
use std::sync::Mutex;

use tracing::info;

/// Append-only text stream receiving progress messages and process output
///
/// Everything written here is user-visible; callers hand it masked text only.
pub trait LogSink: Send + Sync {
    /// Append text verbatim
    fn append(&self, text: &str);

    /// Append text followed by a newline
    fn line(&self, text: &str) {
        self.append(text);
        self.append("\n");
    }
}

/// Writes to the process's stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn append(&self, text: &str) {
        write_best_effort(&mut std::io::stdout().lock(), text);
    }
}

/// Write and flush, dropping errors such as a closed pipe
fn write_best_effort(out: &mut impl Write, text: &str) {
    let _ = out.write_all(text.as_bytes()).and_then(|()| out.flush());
}

/// Emits each appended chunk as a `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn append(&self, text: &str) {
        let text = text.trim_end_matches(['\r', '\n']);
        if !text.is_empty() {
            info!(target: "dynscan::build_log", "{text}");
        }
    }

    fn line(&self, text: &str) {
        self.append(text);
    }
}

/// Captures everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: Mutex<String>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far
    #[must_use]
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl LogSink for MemorySink {
    fn append(&self, text: &str) {
        match self.buffer.lock() {
            Ok(mut b) => b.push_str(text),
            Err(poisoned) => poisoned.into_inner().push_str(text),
        }
    }
}
