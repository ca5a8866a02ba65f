//! Core error types for dynscan-core

use thiserror::Error;

/// Errors in the configuration handed to the build step
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Configuration value is unusable
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A required setting is missing
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),
}
