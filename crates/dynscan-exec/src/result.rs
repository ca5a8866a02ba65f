//! Result and connection types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Captured result of a short probe command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success, -1 when killed by a signal)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// stderr when present, otherwise stdout, trimmed
    #[must_use]
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit status {}: {}", self.status, self.stdout.trim())
        } else {
            format!("exit status {}: {stderr}", self.status)
        }
    }
}

/// Connection information for an SSH build agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Host address
    pub host: String,
    /// Port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username
    pub user: String,
    /// Optional SSH key path
    pub ssh_key: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: user.into(),
            ssh_key: None,
        }
    }

    /// Set SSH key path
    #[must_use]
    pub fn with_ssh_key(mut self, path: impl Into<String>) -> Self {
        self.ssh_key = Some(path.into());
        self
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_prefers_stderr() {
        let result = CommandResult {
            status: 2,
            stdout: "out".into(),
            stderr: "mkdir: Permission denied\n".into(),
            duration: Duration::ZERO,
        };
        assert!(!result.success());
        assert_eq!(result.failure_reason(), "exit status 2: mkdir: Permission denied");
    }

    #[test]
    fn test_connection_info_default_port() {
        let info: ConnectionInfo =
            serde_json::from_str(r#"{"host":"agent-1","user":"jenkins","ssh_key":null}"#).unwrap();
        assert_eq!(info.port, 22);
        assert_eq!(info.with_port(2222).port, 2222);
    }
}
