//! Where the helper runs

use dynscan_stage::{PathStyle, StagingDirectory};
use serde::{Deserialize, Serialize};

/// Directory name used for the helper cache when none is configured
pub const DEFAULT_STAGING_DIR: &str = ".dynscan";

/// Execution host for one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTarget {
    /// Whether the workspace lives on a remote build agent
    pub is_remote: bool,
    /// Host name, `localhost` for local targets
    pub host: String,
    /// Workspace path in the host's own path style
    pub workspace_path: String,
    /// Path style of the host, inferred from the workspace path
    pub path_style: PathStyle,
}

impl ExecutionTarget {
    /// Workspace on the local machine
    pub fn local(workspace_path: impl Into<String>) -> Self {
        Self::new(false, "localhost", workspace_path)
    }

    /// Workspace on a remote build agent
    pub fn remote(host: impl Into<String>, workspace_path: impl Into<String>) -> Self {
        Self::new(true, host, workspace_path)
    }

    fn new(is_remote: bool, host: impl Into<String>, workspace_path: impl Into<String>) -> Self {
        let workspace_path = workspace_path.into();
        Self {
            is_remote,
            host: host.into(),
            path_style: PathStyle::detect(&workspace_path),
            workspace_path,
        }
    }

    /// Path separator of the host
    #[must_use]
    pub fn separator(&self) -> char {
        self.path_style.separator()
    }

    /// `remote` or `local`, as shown in the build log
    #[must_use]
    pub fn kind(&self) -> &'static str {
        if self.is_remote { "remote" } else { "local" }
    }

    /// Staging directory for the helper: `dir` if given, else inside the workspace
    #[must_use]
    pub fn staging_directory(&self, dir: Option<&str>) -> StagingDirectory {
        let path = match dir {
            Some(dir) => dir.to_string(),
            None => self.path_style.join(&self.workspace_path, DEFAULT_STAGING_DIR),
        };
        StagingDirectory {
            host: self.host.clone(),
            path,
            style: self.path_style,
        }
    }
}
