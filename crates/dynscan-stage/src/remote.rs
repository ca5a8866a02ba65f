//! Staging on a remote build agent through a `RemoteExecutor`

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dynscan_exec::quote::posix_quote;
use dynscan_exec::traits::RemoteExecutor;
use tracing::{debug, instrument, warn};

use crate::error::StageError;
use crate::traits::StagingFs;
use crate::types::ArtifactPattern;

/// [`StagingFs`] implemented with POSIX shell utilities on the remote host
pub struct RemoteFs {
    executor: Arc<dyn RemoteExecutor>,
}

impl RemoteFs {
    /// Create a remote filesystem over `executor`
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    /// Best-effort removal of a leftover partial upload
    async fn discard(&self, path: &str) {
        match self.executor.run(&format!("rm -f {}", posix_quote(path))).await {
            Ok(result) if result.success() => {}
            Ok(result) => warn!(path, reason = %result.failure_reason(), "could not remove partial upload"),
            Err(e) => warn!(path, error = %e, "could not remove partial upload"),
        }
    }
}

#[async_trait]
impl StagingFs for RemoteFs {
    async fn exists(&self, path: &str) -> Result<bool, StageError> {
        let result = self
            .executor
            .run(&format!("test -e {}", posix_quote(path)))
            .await
            .map_err(|e| StageError::ProbeFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(result.success())
    }

    #[instrument(skip(self))]
    async fn mkdirs(&self, path: &str) -> Result<(), StageError> {
        let create_err = |reason: String| StageError::DirectoryCreateFailed {
            path: path.to_string(),
            reason,
        };

        let result = self
            .executor
            .run(&format!("mkdir -p {}", posix_quote(path)))
            .await
            .map_err(|e| create_err(e.to_string()))?;

        if !result.success() {
            return Err(create_err(result.failure_reason()));
        }
        Ok(())
    }

    async fn list(&self, dir: &str, pattern: &ArtifactPattern) -> Result<Vec<String>, StageError> {
        let list_err = |reason: String| StageError::ListFailed {
            path: dir.to_string(),
            reason,
        };

        // -p marks directories with a trailing slash so they never match the pattern
        let result = self
            .executor
            .run(&format!("ls -1Ap {}", posix_quote(dir)))
            .await
            .map_err(|e| list_err(e.to_string()))?;

        if !result.success() {
            return Err(list_err(result.failure_reason()));
        }

        let mut names: Vec<String> = result
            .stdout
            .lines()
            .map(str::trim_end)
            .filter(|name| pattern.matches(name))
            .map(ToString::to_string)
            .collect();
        names.sort();
        debug!(dir, count = names.len(), "listed remote directory");
        Ok(names)
    }

    #[instrument(skip(self))]
    async fn delete_contents(&self, dir: &str) -> Result<(), StageError> {
        let delete_err = |reason: String| StageError::DeleteFailed {
            path: dir.to_string(),
            reason,
        };

        let result = self
            .executor
            .run(&format!("find {} -mindepth 1 -delete", posix_quote(dir)))
            .await
            .map_err(|e| delete_err(e.to_string()))?;

        if !result.success() {
            return Err(delete_err(result.failure_reason()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy_from_local(&self, source: &Path, dest: &str) -> Result<(), StageError> {
        let copy_err = |reason: String| StageError::CopyFailed {
            file: source.display().to_string(),
            dest: dest.to_string(),
            reason,
        };

        let contents = tokio::fs::read(source)
            .await
            .map_err(|e| copy_err(e.to_string()))?;

        // Upload beside the destination and move it into place once complete
        let part = format!("{dest}.part");
        if let Err(e) = self.executor.upload(&contents, &part).await {
            self.discard(&part).await;
            return Err(copy_err(e.to_string()));
        }

        let result = self
            .executor
            .run(&format!("mv -f {} {}", posix_quote(&part), posix_quote(dest)))
            .await
            .map_err(|e| copy_err(e.to_string()))?;
        if !result.success() {
            self.discard(&part).await;
            return Err(copy_err(result.failure_reason()));
        }
        Ok(())
    }

    fn fs_type(&self) -> &'static str {
        "remote"
    }
}
