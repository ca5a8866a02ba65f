//! Type definitions for artifact staging

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StageWarning;
use crate::version::ArtifactVersion;

/// Path conventions of the execution host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    /// `/` separated
    #[default]
    Posix,
    /// `\` separated
    Windows,
}

impl PathStyle {
    /// Infer the style from a path reported by the execution host
    #[must_use]
    pub fn detect(path: &str) -> Self {
        let bytes = path.as_bytes();
        let drive_prefix = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
        if path.contains('\\') || drive_prefix {
            PathStyle::Windows
        } else {
            PathStyle::Posix
        }
    }

    /// Path separator
    #[must_use]
    pub fn separator(self) -> char {
        match self {
            PathStyle::Posix => '/',
            PathStyle::Windows => '\\',
        }
    }

    /// Join `name` onto `base` with exactly one separator
    #[must_use]
    pub fn join(self, base: &str, name: &str) -> String {
        let sep = self.separator();
        let base = base.trim_end_matches(sep);
        let name = name.trim_start_matches(sep);
        format!("{base}{sep}{name}")
    }
}

/// Selects helper artifacts by file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPattern {
    /// Required file name prefix, e.g. `wrapper`
    pub prefix: String,
    /// Required extension without the dot, e.g. `jar`
    pub extension: String,
}

impl ArtifactPattern {
    /// Create a pattern
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// Whether `name` (a bare file name) is a helper artifact
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
            && name
                .strip_suffix(&self.extension)
                .and_then(|rest| rest.strip_suffix('.'))
                .is_some_and(|stem| stem.len() >= self.prefix.len())
    }
}

impl std::fmt::Display for ArtifactPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}*.{}", self.prefix, self.extension)
    }
}

/// Local directory holding the canonical helper artifact(s)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSource {
    /// Directory on the local machine
    pub dir: PathBuf,
    /// Which files in `dir` are helper artifacts
    pub pattern: ArtifactPattern,
    /// Fixed name the newest artifact is also staged under, if any
    ///
    /// When unset the staged executable is the versioned file itself.
    #[serde(default)]
    pub launch_name: Option<String>,
}

impl ArtifactSource {
    /// Create a source without a fixed launch name
    pub fn new(dir: impl Into<PathBuf>, pattern: ArtifactPattern) -> Self {
        Self {
            dir: dir.into(),
            pattern,
            launch_name: None,
        }
    }

    /// Also stage the newest artifact under `name`
    #[must_use]
    pub fn with_launch_name(mut self, name: impl Into<String>) -> Self {
        self.launch_name = Some(name.into());
        self
    }

    /// Whether `name` is a versioned candidate (matches and is not the launch name)
    #[must_use]
    pub fn is_candidate(&self, name: &str) -> bool {
        self.pattern.matches(name) && self.launch_name.as_deref() != Some(name)
    }
}

/// Staging directory on the execution host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingDirectory {
    /// Host the directory lives on (`localhost` for the local machine)
    pub host: String,
    /// Directory path in the host's own path style
    pub path: String,
    /// Path style of the host
    pub style: PathStyle,
}

impl StagingDirectory {
    /// Create a staging directory, inferring the path style from `path`
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            host: host.into(),
            style: PathStyle::detect(&path),
            path,
        }
    }

    /// Path of `name` inside this directory
    #[must_use]
    pub fn join(&self, name: &str) -> String {
        self.style.join(&self.path, name)
    }

    /// Key identifying this directory across concurrent builds
    #[must_use]
    pub fn lock_key(&self) -> String {
        format!("{}:{}", self.host, self.path)
    }
}

/// What staging had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    /// Directory was empty, artifacts copied
    Copied,
    /// Older artifacts cleared and newer ones copied
    Replaced,
    /// Staged artifact already current, nothing copied
    Reused,
    /// Local target, the source artifact is used in place
    InPlace,
}

/// Outcome of a successful staging run
#[derive(Debug, Clone)]
pub struct StagedArtifact {
    /// Path of the executable on the execution host
    pub path: String,
    /// Version of the staged artifact
    pub version: ArtifactVersion,
    /// What was done
    pub action: StageAction,
    /// Non-fatal conditions noticed on the way
    pub warnings: Vec<StageWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_path_style() {
        assert_eq!(PathStyle::detect("/home/jenkins/workspace"), PathStyle::Posix);
        assert_eq!(PathStyle::detect(r"C:\jenkins\workspace"), PathStyle::Windows);
        assert_eq!(PathStyle::detect("D:/jenkins"), PathStyle::Windows);
        assert_eq!(PathStyle::detect("relative/dir"), PathStyle::Posix);
    }

    #[test]
    fn test_join() {
        assert_eq!(PathStyle::Posix.join("/opt/helper/", "wrapper-5.jar"), "/opt/helper/wrapper-5.jar");
        assert_eq!(PathStyle::Windows.join(r"C:\helper", "wrapper-5.jar"), r"C:\helper\wrapper-5.jar");
    }

    #[test]
    fn test_pattern_matches() {
        let pattern = ArtifactPattern::new("wrapper", "jar");
        assert!(pattern.matches("wrapper-5.jar"));
        assert!(pattern.matches("wrapper.jar"));
        assert!(!pattern.matches("wrapper-5.jar.part"));
        assert!(!pattern.matches("other-5.jar"));
        assert!(!pattern.matches("wrapperjar"));
        assert_eq!(pattern.to_string(), "wrapper*.jar");
    }

    #[test]
    fn test_launch_name_is_not_candidate() {
        let source = ArtifactSource::new("/plugin/lib", ArtifactPattern::new("wrapper", "jar"))
            .with_launch_name("wrapper.jar");
        assert!(source.is_candidate("wrapper-5.jar"));
        assert!(!source.is_candidate("wrapper.jar"));
    }

    #[test]
    fn test_staging_directory() {
        let dir = StagingDirectory::new("agent-1", "/var/lib/jenkins/dynscan");
        assert_eq!(dir.style, PathStyle::Posix);
        assert_eq!(dir.join("wrapper-5.jar"), "/var/lib/jenkins/dynscan/wrapper-5.jar");
        assert_eq!(dir.lock_key(), "agent-1:/var/lib/jenkins/dynscan");
    }
}
