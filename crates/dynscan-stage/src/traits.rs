//! Filesystem capability used by the stager

use std::path::Path;

use async_trait::async_trait;

use crate::error::StageError;
use crate::types::ArtifactPattern;

/// Filesystem operations on the execution host
///
/// Paths are strings in the host's own path style.
#[async_trait]
pub trait StagingFs: Send + Sync {
    /// Whether `path` exists
    async fn exists(&self, path: &str) -> Result<bool, StageError>;

    /// Create `path` and any missing parents
    async fn mkdirs(&self, path: &str) -> Result<(), StageError>;

    /// File names in `dir` matching `pattern`, sorted
    async fn list(&self, dir: &str, pattern: &ArtifactPattern) -> Result<Vec<String>, StageError>;

    /// Remove everything inside `dir`, keeping `dir` itself
    async fn delete_contents(&self, dir: &str) -> Result<(), StageError>;

    /// Copy a local file to `dest` on the execution host
    async fn copy_from_local(&self, source: &Path, dest: &str) -> Result<(), StageError>;

    /// Short name for logs
    fn fs_type(&self) -> &'static str;
}
