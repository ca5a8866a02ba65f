//! Configuration loading and types

use std::fmt;
use std::path::{Path, PathBuf};

use dynscan_core::{BuildContext, CoreError, ExecutionTarget, ProxySettings, RescanParams, ScanConfig};
use dynscan_stage::{ArtifactPattern, ArtifactSource};
use secrecy::SecretString;
use serde::Deserialize;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "DYNSCAN_CONFIG";
/// Environment variable overriding `rescan.api_key`
pub const API_KEY_ENV: &str = "DYNSCAN_API_KEY";
/// Environment variable overriding `rescan.proxy.password`
pub const PROXY_PASSWORD_ENV: &str = "DYNSCAN_PROXY_PASSWORD";

/// Top-level configuration for dynscan
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Global scan settings
    #[serde(default)]
    pub scan: ScanConfig,
    /// Execution host
    #[serde(default)]
    pub target: TargetConfig,
    /// Local helper artifacts
    #[serde(default)]
    pub artifact: ArtifactConfig,
    /// Rescan job parameters
    #[serde(default)]
    pub rescan: RescanConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where the build runs
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// `localhost` runs locally, anything else over SSH
    #[serde(default = "default_host")]
    pub host: String,
    /// SSH user
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to SSH private key
    pub ssh_key: Option<String>,
    /// Environment variable holding a base64 SSH private key
    pub ssh_key_env: Option<String>,
    /// Build workspace on the host
    pub workspace: Option<String>,
    /// Helper cache directory, defaults to `<workspace>/.dynscan`
    pub staging_dir: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            user: default_user(),
            port: default_port(),
            ssh_key: None,
            ssh_key_env: None,
            workspace: None,
            staging_dir: None,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_user() -> String {
    "jenkins".to_string()
}

fn default_port() -> u16 {
    22
}

impl TargetConfig {
    /// Whether the target is this machine
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "::1")
    }
}

/// Local directory of versioned helper artifacts
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Fixed name the newest artifact is also staged under
    pub launch_name: Option<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
            prefix: default_prefix(),
            extension: default_extension(),
            launch_name: None,
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("dynscan/lib"))
        .unwrap_or_else(|| PathBuf::from("lib"))
}

fn default_prefix() -> String {
    "VeracodeJavaAPI".to_string()
}

fn default_extension() -> String {
    "jar".to_string()
}

/// Rescan job parameters as written in the file
#[derive(Clone, Default, Deserialize)]
pub struct RescanConfig {
    #[serde(default)]
    pub job_name: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub dvr_enabled: bool,
    pub api_id: Option<String>,
    pub api_key: Option<String>,
    pub proxy: Option<ProxyConfig>,
}

/// HTTP proxy as written in the file
#[derive(Clone, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

fn redacted(secret: Option<&String>) -> Option<&'static str> {
    secret.map(|_| "****")
}

impl fmt::Debug for RescanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RescanConfig")
            .field("job_name", &self.job_name)
            .field("app_name", &self.app_name)
            .field("dvr_enabled", &self.dvr_enabled)
            .field("api_id", &self.api_id)
            .field("api_key", &redacted(self.api_key.as_ref()))
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &redacted(self.password.as_ref()))
            .finish()
    }
}

/// Diagnostic logging
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a found file cannot be read or parsed
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        let paths = [
            Some(PathBuf::from("dynscan.toml")),
            Some(PathBuf::from("/etc/dynscan/dynscan.toml")),
            dirs::config_dir().map(|p| p.join("dynscan/dynscan.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }

    /// Replace secrets with values from `lookup` (normally the environment)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV) {
            self.rescan.api_key = Some(key);
        }
        if let Some(password) = lookup(PROXY_PASSWORD_ENV)
            && let Some(proxy) = self.rescan.proxy.as_mut()
        {
            proxy.password = Some(password);
        }
    }

    /// Rescan parameters with secrets moved into `SecretString`
    ///
    /// # Errors
    /// Returns `CoreError::MissingSetting` when the API id or key is absent
    pub fn rescan_params(&self) -> Result<RescanParams, CoreError> {
        let rescan = &self.rescan;
        let api_id = rescan
            .api_id
            .clone()
            .ok_or(CoreError::MissingSetting("rescan.api_id"))?;
        let api_key = rescan
            .api_key
            .clone()
            .ok_or(CoreError::MissingSetting("rescan.api_key"))?;

        Ok(RescanParams {
            app_name: rescan.app_name.clone(),
            dvr_enabled: rescan.dvr_enabled,
            api_id,
            api_key: SecretString::from(api_key),
            proxy: rescan.proxy.as_ref().map(|p| ProxySettings {
                host: p.host.clone(),
                port: p.port,
                user: p.user.clone(),
                password: p.password.clone().map(SecretString::from),
            }),
        })
    }

    #[must_use]
    pub fn artifact_source(&self) -> ArtifactSource {
        let a = &self.artifact;
        let source = ArtifactSource::new(&a.dir, ArtifactPattern::new(&a.prefix, &a.extension));
        match &a.launch_name {
            Some(name) => source.with_launch_name(name),
            None => source,
        }
    }

    /// Execution target, `None` when no usable workspace is configured
    ///
    /// Local workspaces must exist; remote ones are taken as given.
    #[must_use]
    pub fn execution_target(&self) -> Option<ExecutionTarget> {
        let workspace = self.target.workspace.as_deref()?.trim();
        if workspace.is_empty() {
            return None;
        }
        if self.target.is_local() {
            Path::new(workspace)
                .is_dir()
                .then(|| ExecutionTarget::local(workspace))
        } else {
            Some(ExecutionTarget::remote(&self.target.host, workspace))
        }
    }

    #[must_use]
    pub fn build_context(&self) -> BuildContext {
        BuildContext {
            job_name: self.rescan.job_name.clone(),
            target: self.execution_target(),
            staging_dir: self.target.staging_dir.clone(),
        }
    }
}
