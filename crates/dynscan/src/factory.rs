//! Builds executors, launchers and filesystems for the configured target

use std::sync::Arc;

use dynscan_exec::{KeySource, LocalExecutor, ProcessLauncher, RemoteExecutor, SshExecutor, SshExecutorBuilder};
use dynscan_stage::{LocalFs, RemoteFs, StagingFs};
use eyre::Result;
use tracing::warn;

use crate::config::TargetConfig;

/// Capabilities on one execution host
pub struct HostServices {
    pub executor: Arc<dyn RemoteExecutor>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub fs: Arc<dyn StagingFs>,
    ssh: Option<Arc<SshExecutor>>,
}

impl HostServices {
    /// Local executor, launcher and filesystem
    #[must_use]
    pub fn local() -> Self {
        let local = Arc::new(LocalExecutor::new());
        Self {
            executor: local.clone(),
            launcher: local,
            fs: Arc::new(LocalFs::new()),
            ssh: None,
        }
    }

    /// Services for `config`: local for loopback hosts, SSH otherwise
    ///
    /// # Errors
    /// Returns error if the SSH key cannot be resolved
    pub fn for_target(config: &TargetConfig) -> Result<Self> {
        if config.is_local() {
            return Ok(Self::local());
        }

        let ssh = Arc::new(create_ssh_executor(config)?);
        Ok(Self {
            executor: ssh.clone(),
            launcher: ssh.clone(),
            fs: Arc::new(RemoteFs::new(ssh.clone())),
            ssh: Some(ssh),
        })
    }

    /// Close the SSH session, if one was opened
    pub async fn close(&self) {
        if let Some(ssh) = &self.ssh {
            if let Err(e) = ssh.disconnect().await {
                warn!(host = %ssh.connection_info().host, error = %e, "failed to close SSH session");
            }
        }
    }
}

fn key_source(config: &TargetConfig) -> KeySource {
    if let Some(path) = &config.ssh_key {
        KeySource::Path(path.into())
    } else if let Some(var) = &config.ssh_key_env {
        KeySource::Env(var.clone())
    } else {
        KeySource::Agent
    }
}

fn create_ssh_executor(config: &TargetConfig) -> Result<SshExecutor> {
    let builder = SshExecutorBuilder::new(&config.host, &config.user).with_port(config.port);
    let builder = match key_source(config) {
        KeySource::Path(path) => builder.with_key_path(path),
        KeySource::Env(var) => builder.with_env_key(var),
        KeySource::Agent => builder,
    };

    builder
        .build()
        .map_err(|e| eyre::eyre!("failed to create SSH executor for {}: {e}", config.host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localhost_services() {
        let config = TargetConfig {
            host: "127.0.0.1".to_string(),
            ..TargetConfig::default()
        };

        let services = HostServices::for_target(&config).unwrap();
        assert_eq!(services.executor.executor_type(), "local");
        assert_eq!(services.launcher.launcher_type(), "local");
        assert_eq!(services.fs.fs_type(), "local");
    }

    #[test]
    fn test_key_source_precedence() {
        let mut config = TargetConfig {
            host: "agent-1".to_string(),
            ssh_key_env: Some("AGENT_KEY".to_string()),
            ..TargetConfig::default()
        };
        assert!(matches!(key_source(&config), KeySource::Env(ref v) if v == "AGENT_KEY"));

        config.ssh_key = Some("/keys/id".to_string());
        assert!(matches!(key_source(&config), KeySource::Path(_)));

        config.ssh_key = None;
        config.ssh_key_env = None;
        assert!(matches!(key_source(&config), KeySource::Agent));
    }

    #[tokio::test]
    async fn test_remote_services_use_configured_port() {
        let config = TargetConfig {
            host: "agent-1".to_string(),
            user: "jenkins".to_string(),
            port: 2222,
            ..TargetConfig::default()
        };

        let services = HostServices::for_target(&config).unwrap();
        assert_eq!(services.executor.executor_type(), "ssh");
        assert_eq!(services.fs.fs_type(), "remote");

        let ssh = services.ssh.as_ref().unwrap();
        assert_eq!(ssh.connection_info().port, 2222);
        assert_eq!(ssh.connection_info().user, "jenkins");

        // Never connected, so closing is a no-op
        services.close().await;
        assert!(!ssh.is_connected());
    }

    #[test]
    fn test_missing_env_key_is_error() {
        let config = TargetConfig {
            host: "agent-1".to_string(),
            ssh_key_env: Some("DYNSCAN_TEST_KEY_THAT_IS_NOT_SET".to_string()),
            ..TargetConfig::default()
        };
        assert!(HostServices::for_target(&config).is_err());
    }
}
