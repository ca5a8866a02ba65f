//! Scan outcome and build-fail policy

use std::fmt;
use std::time::Duration;

use dynscan_exec::error::{ExecError, MaskError};
use dynscan_stage::error::StageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::CommandError;

/// Operator-configured severity of scan failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPolicy {
    /// Fail the enclosing build when the scan does not succeed
    pub fail_build: bool,
}

/// Why a scan could not produce an exit code
#[derive(Error, Debug, Clone)]
pub enum ScanError {
    /// Helper staging failed
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Command line could not be built
    #[error("invalid helper command: {0}")]
    Command(#[from] CommandError),

    /// Secret positions could not be applied
    #[error("secret masking failed: {0}")]
    Mask(#[from] MaskError),

    /// Process could not be started or its channel failed
    #[error("failed to run helper: {0}")]
    Launch(#[from] ExecError),

    /// Build aborted while the helper was running
    #[error("interrupted while waiting for the helper")]
    Interrupted,

    /// Helper exceeded the configured timeout
    #[error("helper did not finish within {0:?}")]
    TimedOut(Duration),

    /// No workspace to run in
    #[error("failed to locate the build workspace")]
    MissingWorkspace,
}

impl ScanError {
    /// Errors that fail the build whatever the policy says
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Mask(_) | Self::Command(_) | Self::Launch(ExecError::Mask(_))
        )
    }
}

/// Result of one scan attempt
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// Helper exited with code 0
    Success,
    /// Helper exited with another code
    NonZeroExit(i32),
    /// Helper did not produce an exit code
    ExecutionError(ScanError),
}

impl ScanOutcome {
    /// Map a process exit code
    #[must_use]
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            Self::Success
        } else {
            Self::NonZeroExit(code)
        }
    }

    /// Whether the scan succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Exit code, when the helper ran to completion
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Success => Some(0),
            Self::NonZeroExit(code) => Some(*code),
            Self::ExecutionError(_) => None,
        }
    }

    /// Whether this outcome fails the build under `policy`
    #[must_use]
    pub fn fails_build(&self, policy: &BuildPolicy) -> bool {
        match self {
            Self::Success => false,
            Self::ExecutionError(e) if e.is_fatal() => true,
            Self::NonZeroExit(_) | Self::ExecutionError(_) => policy.fail_build,
        }
    }
}

impl From<ScanError> for ScanOutcome {
    fn from(e: ScanError) -> Self {
        Self::ExecutionError(e)
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NonZeroExit(code) => write!(f, "exit code {code}"),
            Self::ExecutionError(e) => write!(f, "execution error: {e}"),
        }
    }
}
