//! Error types for dynscan-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while running or launching a command
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// SSH key error
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution or on the remote channel
    #[error("I/O error: {0}")]
    IoError(String),

    /// File upload to the execution host failed
    #[error("upload to {path} failed: {reason}")]
    UploadFailed {
        /// Destination path on the execution host
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Connection not established
    #[error("not connected")]
    NotConnected,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// Secret mask could not be applied to the command
    #[error(transparent)]
    Mask(#[from] MaskError),
}

/// Errors in the secret mask attached to a command
///
/// Always fatal: dropping a mask entry would put a secret into the log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaskError {
    /// Mask vector and token vector differ in length
    #[error("mask has {masks} entries but command has {tokens} tokens")]
    LengthMismatch {
        /// Number of command tokens
        tokens: usize,
        /// Number of mask entries
        masks: usize,
    },

    /// A secret position points past the end of the command
    #[error("secret position {position} is out of range for a command of {len} tokens")]
    PositionOutOfRange {
        /// Offending position
        position: usize,
        /// Number of command tokens
        len: usize,
    },

    /// Redaction matcher could not be built from the secret values
    #[error("cannot build redaction matcher: {0}")]
    Matcher(String),
}
