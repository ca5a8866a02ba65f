//! Rescan wrapper arguments

use dynscan_exec::MASK;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::command::{MaskMode, SecretFlags};
use crate::config::ScanConfig;

/// Wrapper action submitted by every rescan
pub const RESCAN_ACTION: &str = "CreateAndSubmitDynamicRescan";

/// HTTP proxy the helper connects through
#[derive(Debug)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    /// Proxy user; the password is only passed along with a user
    pub user: Option<String>,
    pub password: Option<SecretString>,
}

/// Per-job rescan parameters
#[derive(Debug)]
pub struct RescanParams {
    /// Application profile to rescan
    pub app_name: String,
    /// Enable dynamic vulnerability rescan of the application
    pub dvr_enabled: bool,
    /// API credential id
    pub api_id: String,
    /// API credential key
    pub api_key: SecretString,
    pub proxy: Option<ProxySettings>,
}

/// Masked view of an argument list, safe to log or serialize
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskedArgs(Vec<String>);

impl MaskedArgs {
    /// Mask the value following each secret flag in `args`
    ///
    /// Always masks every secret flag, whatever the launch mask mode.
    #[must_use]
    pub fn new(args: &[String], flags: &SecretFlags) -> Self {
        let positions = flags.locate(args, MaskMode::All);
        Self(
            args.iter()
                .enumerate()
                .map(|(i, a)| if positions.contains(i) { MASK.to_string() } else { a.clone() })
                .collect(),
        )
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for MaskedArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl RescanParams {
    /// Application name used for `job_name` under `config`
    #[must_use]
    pub fn effective_app_name<'a>(&'a self, config: &ScanConfig, job_name: &'a str) -> &'a str {
        if config.auto_app_name && !job_name.is_empty() {
            job_name
        } else {
            &self.app_name
        }
    }

    /// Wrapper argument list, secrets in clear
    ///
    /// `-action CreateAndSubmitDynamicRescan -appname <name> -dvrenabled <bool>
    /// -vid <id> -vkey <key> [-phost <host> -pport <port> [-puser <user> -ppassword <pw>]]`
    #[must_use]
    pub fn build_args(&self, config: &ScanConfig, job_name: &str) -> Vec<String> {
        let mut args = vec![
            "-action".to_string(),
            RESCAN_ACTION.to_string(),
            "-appname".to_string(),
            self.effective_app_name(config, job_name).to_string(),
            "-dvrenabled".to_string(),
            self.dvr_enabled.to_string(),
            "-vid".to_string(),
            self.api_id.clone(),
            "-vkey".to_string(),
            self.api_key.expose_secret().to_string(),
        ];

        if let Some(proxy) = &self.proxy {
            args.extend([
                "-phost".to_string(),
                proxy.host.clone(),
                "-pport".to_string(),
                proxy.port.to_string(),
            ]);
            if let Some(user) = &proxy.user {
                args.extend(["-puser".to_string(), user.clone()]);
                if let Some(password) = &proxy.password {
                    args.extend(["-ppassword".to_string(), password.expose_secret().to_string()]);
                }
            }
        }

        args
    }

    /// [`Self::build_args`] with every secret value replaced by the mask marker
    #[must_use]
    pub fn masked_args(&self, config: &ScanConfig, job_name: &str) -> MaskedArgs {
        MaskedArgs::new(&self.build_args(config, job_name), &config.secret_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(proxy: Option<ProxySettings>) -> RescanParams {
        RescanParams {
            app_name: "Storefront".to_string(),
            dvr_enabled: true,
            api_id: "id-123".to_string(),
            api_key: SecretString::from("k3y"),
            proxy,
        }
    }

    #[test]
    fn test_minimal_args() {
        let args = params(None).build_args(&ScanConfig::default(), "nightly");
        assert_eq!(
            args,
            vec![
                "-action",
                "CreateAndSubmitDynamicRescan",
                "-appname",
                "Storefront",
                "-dvrenabled",
                "true",
                "-vid",
                "id-123",
                "-vkey",
                "k3y"
            ]
        );
    }

    #[test]
    fn test_auto_app_name_uses_job_name() {
        let config = ScanConfig {
            auto_app_name: true,
            ..ScanConfig::default()
        };
        let args = params(None).build_args(&config, "nightly");
        assert_eq!(args[3], "nightly");

        // empty job name keeps the configured name
        let args = params(None).build_args(&config, "");
        assert_eq!(args[3], "Storefront");
    }

    #[test]
    fn test_proxy_args() {
        let proxy = ProxySettings {
            host: "proxy.local".to_string(),
            port: 3128,
            user: Some("svc".to_string()),
            password: Some(SecretString::from("pw")),
        };
        let args = params(Some(proxy)).build_args(&ScanConfig::default(), "job");
        assert_eq!(
            &args[10..],
            &["-phost", "proxy.local", "-pport", "3128", "-puser", "svc", "-ppassword", "pw"]
        );
    }

    #[test]
    fn test_proxy_password_requires_user() {
        let proxy = ProxySettings {
            host: "proxy.local".to_string(),
            port: 8080,
            user: None,
            password: Some(SecretString::from("pw")),
        };
        let args = params(Some(proxy)).build_args(&ScanConfig::default(), "job");
        assert!(!args.iter().any(|a| a == "pw"));
        assert_eq!(args.len(), 14);
    }

    #[test]
    fn test_masked_args_hide_every_secret() {
        let proxy = ProxySettings {
            host: "proxy.local".to_string(),
            port: 3128,
            user: Some("svc".to_string()),
            password: Some(SecretString::from("pw")),
        };
        let config = ScanConfig {
            mask_mode: MaskMode::Single,
            ..ScanConfig::default()
        };
        let masked = params(Some(proxy)).masked_args(&config, "job");
        let text = masked.to_string();

        assert!(!text.contains("k3y"));
        assert!(!text.contains(", pw"));
        assert!(text.starts_with("[-action, CreateAndSubmitDynamicRescan"));
        assert_eq!(masked.as_slice()[9], MASK);
    }

    #[test]
    fn test_debug_does_not_expose_key() {
        let rendered = format!("{:?}", params(None));
        assert!(!rendered.contains("k3y"));
    }
}
