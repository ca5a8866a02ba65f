//! Executor and launcher traits

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::command::CommandInvocation;
use crate::error::ExecError;
use crate::result::CommandResult;
use crate::sink::LogSink;

/// Runs short shell commands and transfers files on an execution host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a shell command and capture its output
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a shell command, failing with `ExecError::Timeout` after `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Write `contents` to `path` on the execution host, replacing any existing file
    async fn upload(&self, contents: &[u8], path: &str) -> Result<(), ExecError>;

    /// Whether a connection is currently established
    fn is_connected(&self) -> bool {
        true
    }

    /// Short name for logs
    fn executor_type(&self) -> &'static str;
}

/// Starts long-running processes whose output is streamed through the masking layer
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Launch `invocation`, streaming stdout and stderr to `sink`
    ///
    /// Every masked token's value is redacted from streamed output. Unless `quiet`,
    /// the masked command line is echoed to `sink` first.
    async fn launch(
        &self,
        invocation: &CommandInvocation,
        sink: Arc<dyn LogSink>,
        quiet: bool,
    ) -> Result<Box<dyn RunningProcess>, ExecError>;

    /// Short name for logs
    fn launcher_type(&self) -> &'static str;
}

/// Handle to a launched process
#[async_trait]
pub trait RunningProcess: Send {
    /// Wait for the process to exit and return its exit code
    ///
    /// Cancel-safe: dropping the future leaves the process running so it can be killed.
    async fn join(&mut self) -> Result<i32, ExecError>;

    /// Terminate the process
    async fn kill(&mut self) -> Result<(), ExecError>;
}
