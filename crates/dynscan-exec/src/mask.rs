//! Redaction of secret values from streamed output

use std::sync::Arc;

use aho_corasick::{AhoCorasick, MatchKind};

use crate::command::{CommandInvocation, MASK};
use crate::error::MaskError;
use crate::sink::LogSink;

/// Replaces every occurrence of a set of secret values with [`MASK`]
#[derive(Debug, Clone)]
pub struct Redactor {
    matcher: Option<AhoCorasick>,
}

impl Redactor {
    /// Build a redactor for the given secret values
    ///
    /// Empty values are ignored. Overlapping secrets redact the longest match.
    /// Every line of a multi-line secret is redacted on its own as well.
    ///
    /// # Errors
    /// Returns `MaskError::Matcher` if the automaton cannot be built
    pub fn new<I, S>(secrets: I) -> Result<Self, MaskError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // Output reaches the redactor one line at a time, so each line of a
        // multi-line secret is also a pattern of its own.
        let mut patterns: Vec<String> = Vec::new();
        for secret in secrets {
            let secret = secret.as_ref();
            let lines = secret.split(['\r', '\n']);
            for pattern in std::iter::once(secret).chain(lines) {
                if !pattern.is_empty() && !patterns.iter().any(|p| p == pattern) {
                    patterns.push(pattern.to_string());
                }
            }
        }

        if patterns.is_empty() {
            return Ok(Self { matcher: None });
        }

        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)
            .map_err(|e| MaskError::Matcher(e.to_string()))?;

        Ok(Self {
            matcher: Some(matcher),
        })
    }

    /// Build a redactor for the masked positions of an invocation
    ///
    /// # Errors
    /// Returns `MaskError::Matcher` if the automaton cannot be built
    pub fn for_invocation(invocation: &CommandInvocation) -> Result<Self, MaskError> {
        Self::new(invocation.secrets())
    }

    /// Redactor that passes text through unchanged
    #[must_use]
    pub fn none() -> Self {
        Self { matcher: None }
    }

    /// Replace every secret in `text`
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        match &self.matcher {
            Some(matcher) => {
                let replacements = vec![MASK; matcher.patterns_len()];
                matcher.replace_all(text, &replacements)
            }
            None => text.to_string(),
        }
    }
}

/// Line-buffered writer that redacts before appending to a [`LogSink`]
///
/// Only complete lines are redacted and forwarded, so a secret split across
/// two reads still matches. Call [`Self::finish`] to flush a trailing partial line.
pub struct MaskingWriter {
    sink: Arc<dyn LogSink>,
    redactor: Arc<Redactor>,
    pending: Vec<u8>,
}

impl MaskingWriter {
    /// Create a writer over `sink`
    pub fn new(sink: Arc<dyn LogSink>, redactor: Arc<Redactor>) -> Self {
        Self {
            sink,
            redactor,
            pending: Vec::new(),
        }
    }

    /// Feed raw process output
    pub fn write(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        if let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') {
            let rest = self.pending.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.pending, rest);
            self.emit(&complete);
        }
    }

    /// Flush any buffered partial line
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest);
        }
    }

    fn emit(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        self.sink.append(&self.redactor.redact(&text));
    }
}

impl Drop for MaskingWriter {
    fn drop(&mut self) {
        self.finish();
    }
}
