//! Masked helper execution on the build's execution target

use std::sync::Arc;
use std::time::Duration;

use dynscan_exec::command::CommandInvocation;
use dynscan_exec::error::ExecError;
use dynscan_exec::sink::LogSink;
use dynscan_exec::traits::{ProcessLauncher, RunningProcess};
use tracing::{debug, info, instrument, warn};

use crate::abort::AbortSignal;
use crate::command::{SecretPositions, tokenize_command};
use crate::outcome::{ScanError, ScanOutcome};
use crate::target::ExecutionTarget;

/// Launch behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Do not echo the command line to the build log
    pub quiet: bool,
    /// Kill the helper after this long
    pub timeout: Option<Duration>,
}

/// Builds, masks and runs one helper invocation
///
/// The launcher is picked by [`ExecutionTarget::is_remote`].
pub struct RemoteCommandRunner {
    local: Arc<dyn ProcessLauncher>,
    remote: Option<Arc<dyn ProcessLauncher>>,
    options: RunOptions,
}

impl RemoteCommandRunner {
    /// Runner for local targets only
    pub fn new(local: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            local,
            remote: None,
            options: RunOptions::default(),
        }
    }

    /// Launcher for remote targets
    #[must_use]
    pub fn with_remote(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.remote = Some(launcher);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// Tokenize `executable` plus formatted `args` and attach the secret mask
    ///
    /// # Errors
    /// Returns `ScanError::Command` for a malformed command line and
    /// `ScanError::Mask` when a secret position is outside the tokens
    pub fn prepare<S: AsRef<str>>(
        &self,
        executable: &str,
        args: &[S],
        secrets: &SecretPositions,
    ) -> Result<CommandInvocation, ScanError> {
        let tokens = tokenize_command(executable, args)?;
        let masks = secrets.mask(tokens.len())?;
        Ok(CommandInvocation::new(tokens, masks)?)
    }

    fn launcher_for(&self, target: &ExecutionTarget) -> Result<&Arc<dyn ProcessLauncher>, ScanError> {
        if !target.is_remote {
            return Ok(&self.local);
        }
        self.remote.as_ref().ok_or_else(|| {
            ScanError::Launch(ExecError::ConfigError(format!(
                "no remote launcher configured for {}",
                target.host
            )))
        })
    }

    /// Run the helper and wait for its exit code
    ///
    /// Failures are returned as [`ScanOutcome::ExecutionError`], never
    /// propagated. On abort or timeout the process is killed before returning.
    #[instrument(skip_all, fields(host = %target.host, remote = target.is_remote))]
    pub async fn run<S: AsRef<str>>(
        &self,
        executable: &str,
        args: &[S],
        target: &ExecutionTarget,
        secrets: &SecretPositions,
        sink: Arc<dyn LogSink>,
        abort: &mut AbortSignal,
    ) -> ScanOutcome {
        match self.try_run(executable, args, target, secrets, sink, abort).await {
            Ok(code) => {
                info!(code, "helper exited");
                ScanOutcome::from_exit_code(code)
            }
            Err(e) => {
                warn!(error = %e, "helper run failed");
                ScanOutcome::ExecutionError(e)
            }
        }
    }

    async fn try_run<S: AsRef<str>>(
        &self,
        executable: &str,
        args: &[S],
        target: &ExecutionTarget,
        secrets: &SecretPositions,
        sink: Arc<dyn LogSink>,
        abort: &mut AbortSignal,
    ) -> Result<i32, ScanError> {
        let invocation = self.prepare(executable, args, secrets)?;
        let launcher = self.launcher_for(target)?;

        if abort.is_aborted() {
            return Err(ScanError::Interrupted);
        }

        if !self.options.quiet && target.is_remote {
            sink.line("");
            sink.line("Invoking the following command in remote workspace:");
        }

        let mut process = launcher.launch(&invocation, sink, self.options.quiet).await?;
        debug!(launcher = launcher.launcher_type(), command = %invocation, "helper launched");

        let limit = self.options.timeout;
        let deadline = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            code = process.join() => Ok(code?),
            () = abort.aborted() => {
                terminate(&mut process).await;
                Err(ScanError::Interrupted)
            }
            () = deadline => {
                terminate(&mut process).await;
                Err(ScanError::TimedOut(limit.unwrap_or_default()))
            }
        }
    }
}

async fn terminate(process: &mut Box<dyn RunningProcess>) {
    if let Err(e) = process.kill().await {
        warn!(error = %e, "failed to kill helper");
    }
}
