//! dynscan-core: Dynamic rescan build step
//!
//! Formats and tokenizes the helper command line, works out which tokens are
//! secret, launches the helper on the execution target and maps the result
//! onto the build-fail policy. [`RescanStep`] sequences staging and running.

pub mod abort;
pub mod args;
pub mod command;
pub mod config;
pub mod error;
pub mod outcome;
pub mod probe;
pub mod runner;
pub mod step;
pub mod target;

pub use abort::{AbortHandle, AbortSignal, abort_pair};
pub use args::{MaskedArgs, ProxySettings, RescanParams};
pub use command::{CommandError, MaskMode, SecretFlags, SecretPositions};
pub use config::ScanConfig;
pub use error::CoreError;
pub use outcome::{BuildPolicy, ScanError, ScanOutcome};
pub use runner::{RemoteCommandRunner, RunOptions};
pub use step::{BuildContext, RescanStep, StepReport, StepSummary, TargetServices};
pub use target::ExecutionTarget;
