//! Error types for dynscan-stage

use thiserror::Error;

/// Errors that can occur while staging the helper artifact
#[derive(Error, Debug, Clone)]
pub enum StageError {
    /// The staging directory could not be created
    #[error("failed to create directory {path}: {reason}")]
    DirectoryCreateFailed {
        /// Directory path on the execution host
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Copying an artifact into the staging directory failed
    #[error("failed to copy {file} to {dest}: {reason}")]
    CopyFailed {
        /// Local source file
        file: String,
        /// Destination path on the execution host
        dest: String,
        /// Underlying failure
        reason: String,
    },

    /// Listing a directory failed
    #[error("failed to list {path}: {reason}")]
    ListFailed {
        /// Directory path
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Clearing the staging directory failed
    #[error("failed to clear {path}: {reason}")]
    DeleteFailed {
        /// Directory path on the execution host
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// An existence check could not be carried out
    #[error("failed to check {path}: {reason}")]
    ProbeFailed {
        /// Path that was checked
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// The local source directory holds no helper artifact
    #[error("no helper artifact matching {pattern} in {dir}")]
    NoLocalArtifact {
        /// Local source directory
        dir: String,
        /// Pattern that was searched for
        pattern: String,
    },

    /// The staged executable is missing although the staged version is current
    #[error("staged executable not found at {path}")]
    ExecutableMissing {
        /// Expected executable path
        path: String,
    },
}

/// Non-fatal conditions noticed while staging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageWarning {
    /// No version could be read from the file name; it was ranked lowest
    VersionParseAmbiguous {
        /// File name that was parsed
        file: String,
    },
}

impl std::fmt::Display for StageWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageWarning::VersionParseAmbiguous { file } => {
                write!(f, "could not read a version from {file}, treating it as the lowest")
            }
        }
    }
}
