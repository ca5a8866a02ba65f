//! SSH command execution using russh crate

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{Channel, ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::command::CommandInvocation;
use crate::error::ExecError;
use crate::keys::{KeySource, ResolvedKey};
use crate::mask::{MaskingWriter, Redactor};
use crate::quote::{posix_join, posix_quote};
use crate::result::{CommandResult, ConnectionInfo};
use crate::sink::LogSink;
use crate::traits::{ProcessLauncher, RemoteExecutor, RunningProcess};

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// SSH executor for a remote build agent
///
/// The session is established on first use and shared by every probe, upload
/// and launched process; each of those gets its own channel.
pub struct SshExecutor {
    conn_info: ConnectionInfo,
    key: ResolvedKey,
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("conn_info", &self.conn_info)
            .field("key", &self.key)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Create a new SSH executor
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if key resolution fails
    pub fn new(conn_info: ConnectionInfo, key_source: &KeySource) -> Result<Self, ExecError> {
        let key = key_source
            .resolve()
            .map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        Ok(Self {
            conn_info,
            key,
            session: Mutex::new(None),
        })
    }

    /// Get connection info
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.conn_info
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn connect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        info!(
            host = %self.conn_info.host,
            port = self.conn_info.port,
            user = %self.conn_info.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());

        let mut session = client::connect(
            config,
            (&self.conn_info.host[..], self.conn_info.port),
            SshClientHandler,
        )
        .await
        .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        let Some(key_path) = self.key.path() else {
            return Err(ExecError::AuthenticationFailed(
                "SSH agent authentication is not supported, configure a key".to_string(),
            ));
        };

        let key_pair =
            load_secret_key(key_path, None).map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let auth_res = session
            .authenticate_publickey(
                &self.conn_info.user,
                PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
            )
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

        if !auth_res.success() {
            return Err(ExecError::AuthenticationFailed(
                "public key authentication failed".to_string(),
            ));
        }

        info!(host = %self.conn_info.host, "SSH connected and authenticated");

        *session_lock = Some(session);
        Ok(())
    }

    /// Open a fresh session channel, connecting first if needed
    async fn open_channel(&self) -> Result<Channel<client::Msg>, ExecError> {
        self.connect().await?;

        let session_lock = self.session.lock().await;
        let session = session_lock.as_ref().ok_or(ExecError::NotConnected)?;

        session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))
    }

    #[instrument(skip(self, cmd), fields(host = %self.conn_info.host))]
    async fn execute_remote(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();
        let mut channel = self.open_channel().await?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // exit-status may arrive after EOF, so read until the channel closes
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    stderr.extend_from_slice(&data);
                }
                ChannelMsg::ExitStatus { exit_status } => status = exit_status.cast_signed(),
                _ => {}
            }
        }

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();

        debug!(command = %cmd, status, duration = ?duration, "remote command completed");

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    /// Disconnect from remote host
    ///
    /// # Errors
    /// Returns `ExecError::IoError` if disconnection fails
    pub async fn disconnect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            info!(host = %self.conn_info.host, "SSH disconnected");
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.execute_remote(cmd).await
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        // connect outside of the timeout
        self.connect().await?;

        match timeout(timeout_duration, self.execute_remote(cmd)).await {
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

    #[instrument(skip(self, contents), fields(host = %self.conn_info.host, bytes = contents.len()))]
    async fn upload(&self, contents: &[u8], path: &str) -> Result<(), ExecError> {
        let upload_err = |reason: String| ExecError::UploadFailed {
            path: path.to_string(),
            reason,
        };

        let mut channel = self.open_channel().await?;
        channel
            .exec(true, format!("cat > {}", posix_quote(path)))
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        channel
            .data(contents)
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        channel.eof().await.map_err(|e| upload_err(e.to_string()))?;

        let mut status = None;
        let mut stderr = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    stderr.extend_from_slice(&data);
                }
                ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status),
                _ => {}
            }
        }

        match status {
            Some(0) => {
                debug!(path, "uploaded file");
                Ok(())
            }
            Some(code) => Err(upload_err(format!(
                "exit status {code}: {}",
                String::from_utf8_lossy(&stderr).trim()
            ))),
            None => Err(upload_err("channel closed without exit status".to_string())),
        }
    }

    fn is_connected(&self) -> bool {
        // Synchronous best effort; a held lock counts as not connected
        self.session
            .try_lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}

#[async_trait]
impl ProcessLauncher for SshExecutor {
    #[instrument(skip_all, fields(host = %self.conn_info.host))]
    async fn launch(
        &self,
        invocation: &CommandInvocation,
        sink: Arc<dyn LogSink>,
        quiet: bool,
    ) -> Result<Box<dyn RunningProcess>, ExecError> {
        if invocation.tokens().is_empty() {
            return Err(ExecError::ConfigError("empty command".to_string()));
        }
        let redactor = Arc::new(Redactor::for_invocation(invocation)?);

        if !quiet {
            sink.line(&format!("$ {}", invocation.masked_display()));
        }
        debug!(command = %invocation, "launching remote process");

        let channel = self.open_channel().await?;
        channel
            .exec(true, posix_join(invocation.tokens()))
            .await
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        Ok(Box::new(SshProcess {
            channel,
            output: MaskingWriter::new(sink, redactor),
            status: None,
        }))
    }

    fn launcher_type(&self) -> &'static str {
        "ssh"
    }
}

/// A process running in an SSH channel
struct SshProcess {
    channel: Channel<client::Msg>,
    output: MaskingWriter,
    status: Option<i32>,
}

#[async_trait]
impl RunningProcess for SshProcess {
    async fn join(&mut self) -> Result<i32, ExecError> {
        while let Some(msg) = self.channel.wait().await {
            match msg {
                ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. } => {
                    self.output.write(&data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    self.status = Some(exit_status.cast_signed());
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    debug!(signal = ?signal_name, "remote process killed by signal");
                    self.status = Some(-1);
                }
                _ => {}
            }
        }
        self.output.finish();

        self.status.ok_or_else(|| {
            ExecError::IoError("remote channel closed without exit status".to_string())
        })
    }

    async fn kill(&mut self) -> Result<(), ExecError> {
        // Closing the channel alone leaves the remote process running under
        // servers that do not hang up on EOF
        if let Err(e) = self.channel.signal(russh::Sig::KILL).await {
            warn!(error = %e, "failed to signal remote process");
        }
        self.channel
            .close()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))
    }
}

/// Builder for `SshExecutor`
pub struct SshExecutorBuilder {
    conn_info: ConnectionInfo,
    key_source: KeySource,
}

impl SshExecutorBuilder {
    /// Create builder with required fields
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            conn_info: ConnectionInfo::new(host, user),
            key_source: KeySource::Agent,
        }
    }

    /// Set SSH key path
    #[must_use]
    pub fn with_key_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.key_source = KeySource::Path(path.into());
        self
    }

    /// Set key from environment variable (base64)
    #[must_use]
    pub fn with_env_key(mut self, var_name: impl Into<String>) -> Self {
        self.key_source = KeySource::Env(var_name.into());
        self
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.conn_info.port = port;
        self
    }

    /// Build the executor
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if key resolution fails
    pub fn build(self) -> Result<SshExecutor, ExecError> {
        SshExecutor::new(self.conn_info, &self.key_source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_without_key_uses_agent() {
        let executor = SshExecutorBuilder::new("agent-1", "jenkins")
            .with_port(2222)
            .build()
            .unwrap();

        assert_eq!(executor.connection_info().port, 2222);
        assert!(!executor.is_connected());
        assert_eq!(executor.executor_type(), "ssh");
    }

    #[tokio::test]
    async fn test_connection_refused_is_reported() {
        // Nothing listens on port 1, so the connection fails before authentication
        let executor = SshExecutorBuilder::new("127.0.0.1", "jenkins")
            .with_port(1)
            .build()
            .unwrap();

        let result = executor.run("true").await;
        assert!(matches!(result, Err(ExecError::ConnectionFailed(_))));
    }

    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_ssh_launch_round_trip() {
        let executor = SshExecutorBuilder::new("localhost", "root")
            .with_env_key("DYNSCAN_TEST_SSH_KEY")
            .build()
            .unwrap();
        let sink = Arc::new(crate::sink::MemorySink::new());
        let inv = CommandInvocation::new(
            vec!["echo".into(), "s3cr3t".into()],
            vec![false, true],
        )
        .unwrap();

        let mut proc = executor.launch(&inv, sink.clone(), true).await.unwrap();
        assert_eq!(proc.join().await.unwrap(), 0);
        assert_eq!(sink.contents(), "****\n");
    }

    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_ssh_kill_stops_remote_process() {
        let executor = SshExecutorBuilder::new("localhost", "root")
            .with_env_key("DYNSCAN_TEST_SSH_KEY")
            .build()
            .unwrap();
        let inv = CommandInvocation::unmasked(vec!["sleep".into(), "4242".into()]);

        let mut proc = executor
            .launch(&inv, Arc::new(crate::sink::MemorySink::new()), true)
            .await
            .unwrap();
        proc.kill().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let survivors = executor.run("pgrep -f 'sleep 4242'").await.unwrap();
        assert!(!survivors.success());
    }
}
