//! Global scan settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{MaskMode, SecretFlags};
use crate::error::CoreError;
use crate::outcome::BuildPolicy;

/// Settings shared by every rescan step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Fail the build when the scan does not succeed
    pub fail_build: bool,
    /// Print the debug preamble and echo the masked command
    pub debug: bool,
    /// Use the job name as the application name
    pub auto_app_name: bool,
    /// How many secret flags are masked per command
    pub mask_mode: MaskMode,
    /// Flags whose value is secret
    pub secret_flags: SecretFlags,
    /// Kill the helper after this many seconds
    pub timeout_secs: Option<u64>,
    /// Program and leading arguments that launch the helper
    #[serde(default = "default_interpreter")]
    pub interpreter: Vec<String>,
}

fn default_interpreter() -> Vec<String> {
    vec!["java".to_string(), "-jar".to_string()]
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            fail_build: false,
            debug: false,
            auto_app_name: false,
            mask_mode: MaskMode::default(),
            secret_flags: SecretFlags::default(),
            timeout_secs: None,
            interpreter: default_interpreter(),
        }
    }
}

impl ScanConfig {
    /// Build-fail policy derived from these settings
    #[must_use]
    pub fn policy(&self) -> BuildPolicy {
        BuildPolicy {
            fail_build: self.fail_build,
        }
    }

    /// Helper timeout, if any
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Check settings that cannot be expressed in the type
    ///
    /// # Errors
    /// Returns `CoreError::ConfigError` for an empty interpreter or a zero timeout
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interpreter.iter().all(|w| w.trim().is_empty()) {
            return Err(CoreError::ConfigError("interpreter must not be empty".to_string()));
        }
        if self.timeout_secs == Some(0) {
            return Err(CoreError::ConfigError("timeout_secs must be greater than 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert!(!config.policy().fail_build);
        assert_eq!(config.mask_mode, MaskMode::All);
        assert_eq!(config.interpreter, vec!["java", "-jar"]);
        assert!(config.timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: ScanConfig = toml::from_str(
            r#"
            fail_build = true
            mask_mode = "single"
            timeout_secs = 600
            "#,
        )
        .unwrap();

        assert!(config.fail_build);
        assert_eq!(config.mask_mode, MaskMode::Single);
        assert_eq!(config.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.interpreter, default_interpreter());
        assert_eq!(config.secret_flags, SecretFlags::default());
    }

    #[test]
    fn test_custom_secret_flags() {
        let config: ScanConfig = toml::from_str(r#"secret_flags = ["-token"]"#).unwrap();
        assert_eq!(config.secret_flags, SecretFlags::new(["-token"]));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ScanConfig {
            interpreter: vec![],
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ScanConfig {
            timeout_secs: Some(0),
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
