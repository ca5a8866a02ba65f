//! Helper command line construction
//!
//! Arguments are formatted into one command string and tokenized back, so the
//! token vector is the single source of truth for argument boundaries and
//! secret positions are always indices into it.

use std::collections::BTreeSet;

use dynscan_exec::error::MaskError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors building a command line
///
/// Never carries the command text, which may hold secrets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// A double quote was opened and never closed
    #[error("unterminated quote starting at byte {0}")]
    UnterminatedQuote(usize),

    /// Nothing to execute
    #[error("command is empty")]
    EmptyCommand,
}

fn needs_quoting(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '"' | '\\' | '\'' | '$' | '`' | ';' | '&' | '|' | '<' | '>' | '*' | '?' | '(' | ')' | '#' | '!'
        )
}

/// Quote an argument value so [`tokenize`] yields it back as exactly one token
///
/// Values without whitespace or shell-significant characters pass through.
/// Everything else, including the empty string, is double-quoted with `"` and
/// `\` backslash-escaped.
#[must_use]
pub fn format_parameter_value(value: &str) -> String {
    if !value.is_empty() && !value.chars().any(needs_quoting) {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Split a command string into tokens
///
/// Whitespace separates tokens outside double quotes. A quoted span is part of
/// the surrounding token, so `""` is an empty token. `\"` and `\\` are escapes
/// everywhere; any other backslash is literal.
///
/// # Errors
/// Returns `CommandError::UnterminatedQuote` if a quote is never closed
pub fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut open_quote: Option<usize> = None;
    let mut chars = line.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                in_token = true;
                open_quote = match open_quote {
                    Some(_) => None,
                    None => Some(i),
                };
            }
            '\\' => {
                in_token = true;
                match chars.peek() {
                    Some(&(_, next @ ('"' | '\\'))) => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                }
            }
            c if c.is_whitespace() && open_quote.is_none() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if let Some(start) = open_quote {
        return Err(CommandError::UnterminatedQuote(start));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// `"<executable> <arg1> <arg2> ..."` with every argument formatted
///
/// The executable string is used as-is and may itself hold several tokens.
#[must_use]
pub fn build_command_line<S: AsRef<str>>(executable: &str, args: &[S]) -> String {
    let mut line = executable.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&format_parameter_value(arg.as_ref()));
    }
    line
}

/// Tokens of [`build_command_line`]
///
/// # Errors
/// Returns `CommandError` if the executable string is malformed or everything is empty
pub fn tokenize_command<S: AsRef<str>>(executable: &str, args: &[S]) -> Result<Vec<String>, CommandError> {
    let tokens = tokenize(&build_command_line(executable, args))?;
    if tokens.is_empty() {
        return Err(CommandError::EmptyCommand);
    }
    Ok(tokens)
}

/// Executable string launching `helper` through `interpreter` (e.g. `java -jar`)
#[must_use]
pub fn launch_prefix<S: AsRef<str>>(interpreter: &[S], helper: &str) -> String {
    interpreter
        .iter()
        .map(|w| format_parameter_value(w.as_ref()))
        .chain(std::iter::once(format_parameter_value(helper)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Indices into a token vector whose values must never be shown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretPositions(BTreeSet<usize>);

impl SecretPositions {
    /// No secret positions
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Mark `position` as secret
    pub fn insert(&mut self, position: usize) {
        self.0.insert(position);
    }

    /// Whether `position` is secret
    #[must_use]
    pub fn contains(&self, position: usize) -> bool {
        self.0.contains(&position)
    }

    /// Number of secret positions
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no secret positions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Secret positions in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Mask vector for a command of `len` tokens
    ///
    /// # Errors
    /// Returns `MaskError::PositionOutOfRange` for any position `>= len`; a
    /// secret that cannot be masked must stop the launch
    pub fn mask(&self, len: usize) -> Result<Vec<bool>, MaskError> {
        if let Some(&position) = self.0.iter().find(|p| **p >= len) {
            return Err(MaskError::PositionOutOfRange { position, len });
        }
        Ok((0..len).map(|i| self.0.contains(&i)).collect())
    }
}

impl FromIterator<usize> for SecretPositions {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How many secret flags are masked per command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMode {
    /// Mask the value of every secret flag present
    #[default]
    All,
    /// Mask only the first secret flag found, in flag order (API key before proxy password)
    Single,
}

/// Flags whose following token is a secret value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretFlags(Vec<String>);

impl Default for SecretFlags {
    fn default() -> Self {
        Self::new(["-vkey", "-ppassword"])
    }
}

impl SecretFlags {
    /// Flags in priority order
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(flags.into_iter().map(Into::into).collect())
    }

    /// Secret positions in a tokenized command
    #[must_use]
    pub fn locate(&self, tokens: &[String], mode: MaskMode) -> SecretPositions {
        let value_of = |flag: &String| -> Vec<usize> {
            tokens
                .iter()
                .enumerate()
                .filter(|(i, t)| *t == flag && i + 1 < tokens.len())
                .map(|(i, _)| i + 1)
                .collect()
        };

        match mode {
            MaskMode::All => self.0.iter().flat_map(value_of).collect(),
            MaskMode::Single => self
                .0
                .iter()
                .find_map(|flag| value_of(flag).first().copied())
                .into_iter()
                .collect(),
        }
    }
}
