//! Local command execution using `tokio::process`

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, instrument, warn};

use crate::command::CommandInvocation;
use crate::error::ExecError;
use crate::mask::{MaskingWriter, Redactor};
use crate::result::CommandResult;
use crate::sink::LogSink;
use crate::traits::{ProcessLauncher, RemoteExecutor, RunningProcess};

/// Local command executor
///
/// Runs probes through `sh -c` and launches processes directly from their tokens.
#[derive(Debug, Clone)]
pub struct LocalExecutor;

impl LocalExecutor {
    /// Create a new local executor
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self), level = "debug")]
    async fn execute(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(command = %cmd, "executing local command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let duration = start.elapsed();
        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!(command = %cmd, status, duration = ?duration, "command completed");

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.execute(cmd).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        match timeout(timeout_duration, self.execute(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    command = %cmd,
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    #[instrument(skip(self, contents), fields(bytes = contents.len()), level = "debug")]
    async fn upload(&self, contents: &[u8], path: &str) -> Result<(), ExecError> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| ExecError::UploadFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}

#[async_trait]
impl ProcessLauncher for LocalExecutor {
    #[instrument(skip_all, fields(program = invocation.program().unwrap_or_default()))]
    async fn launch(
        &self,
        invocation: &CommandInvocation,
        sink: Arc<dyn LogSink>,
        quiet: bool,
    ) -> Result<Box<dyn RunningProcess>, ExecError> {
        let program = invocation
            .program()
            .ok_or_else(|| ExecError::ConfigError("empty command".to_string()))?;
        let redactor = Arc::new(Redactor::for_invocation(invocation)?);

        if !quiet {
            sink.line(&format!("$ {}", invocation.masked_display()));
        }
        debug!(command = %invocation, "launching local process");

        let mut child = Command::new(program)
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(
                stdout,
                MaskingWriter::new(sink.clone(), redactor.clone()),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(
                stderr,
                MaskingWriter::new(sink, redactor),
            )));
        }

        Ok(Box::new(LocalProcess { child, pumps }))
    }

    fn launcher_type(&self) -> &'static str {
        "local"
    }
}

/// A process spawned by [`LocalExecutor`]
struct LocalProcess {
    child: Child,
    pumps: Vec<JoinHandle<()>>,
}

#[async_trait]
impl RunningProcess for LocalProcess {
    async fn join(&mut self) -> Result<i32, ExecError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        for handle in self.pumps.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "output pump task failed");
            }
        }

        Ok(status.code().unwrap_or(-1))
    }

    async fn kill(&mut self) -> Result<(), ExecError> {
        self.child
            .kill()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))
    }
}

async fn pump<R: AsyncRead + Unpin>(reader: R, mut writer: MaskingWriter) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => writer.write(&line),
            Err(e) => {
                warn!(error = %e, "failed reading process output");
                break;
            }
        }
    }
    writer.finish();
}
