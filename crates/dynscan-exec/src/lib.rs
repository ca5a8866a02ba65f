//! dynscan-exec: Process launch abstraction
//!
//! Runs commands and long-lived processes locally or on a remote worker via SSH,
//! with secret command-line tokens redacted from everything written to a log sink.

pub mod command;
pub mod error;
pub mod keys;
pub mod local;
pub mod mask;
pub mod quote;
pub mod result;
pub mod sink;
pub mod ssh;
pub mod traits;

pub use command::{CommandInvocation, MASK};
pub use error::{ExecError, MaskError};
pub use keys::KeySource;
pub use local::LocalExecutor;
pub use mask::{MaskingWriter, Redactor};
pub use result::{CommandResult, ConnectionInfo};
pub use sink::{LogSink, MemorySink, StdoutSink, TracingSink};
pub use ssh::{SshExecutor, SshExecutorBuilder};
pub use traits::{ProcessLauncher, RemoteExecutor, RunningProcess};
