//! Staging on the local filesystem

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::error::StageError;
use crate::traits::StagingFs;
use crate::types::ArtifactPattern;

/// [`StagingFs`] backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    /// Create a local filesystem handle
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Matching file names in a local directory, sorted
///
/// # Errors
/// Returns `StageError::ListFailed` if the directory cannot be read
pub async fn list_matching(dir: &Path, pattern: &ArtifactPattern) -> Result<Vec<String>, StageError> {
    let list_err = |e: std::io::Error| StageError::ListFailed {
        path: dir.display().to_string(),
        reason: e.to_string(),
    };

    let mut entries = fs::read_dir(dir).await.map_err(list_err)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
        let is_file = entry.file_type().await.map_err(list_err)?.is_file();
        let file_name = entry.file_name();
        if let Some(name) = file_name.to_str()
            && is_file
            && pattern.matches(name)
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl StagingFs for LocalFs {
    async fn exists(&self, path: &str) -> Result<bool, StageError> {
        fs::try_exists(path)
            .await
            .map_err(|e| StageError::ProbeFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn mkdirs(&self, path: &str) -> Result<(), StageError> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| StageError::DirectoryCreateFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    async fn list(&self, dir: &str, pattern: &ArtifactPattern) -> Result<Vec<String>, StageError> {
        list_matching(Path::new(dir), pattern).await
    }

    #[instrument(skip(self))]
    async fn delete_contents(&self, dir: &str) -> Result<(), StageError> {
        let delete_err = |e: std::io::Error| StageError::DeleteFailed {
            path: dir.to_string(),
            reason: e.to_string(),
        };

        let mut entries = fs::read_dir(dir).await.map_err(delete_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(delete_err)? {
            let path = entry.path();
            if entry.file_type().await.map_err(delete_err)?.is_dir() {
                fs::remove_dir_all(&path).await.map_err(delete_err)?;
            } else {
                fs::remove_file(&path).await.map_err(delete_err)?;
            }
            debug!(path = %path.display(), "removed");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy_from_local(&self, source: &Path, dest: &str) -> Result<(), StageError> {
        let copy_err = |e: std::io::Error| StageError::CopyFailed {
            file: source.display().to_string(),
            dest: dest.to_string(),
            reason: e.to_string(),
        };

        // Copy beside the destination and rename once complete
        let part = format!("{dest}.part");
        let copied = match fs::copy(source, &part).await {
            Ok(_) => fs::rename(&part, dest).await,
            Err(e) => Err(e),
        };
        if let Err(e) = copied {
            if let Err(cleanup) = fs::remove_file(&part).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %part, error = %cleanup, "could not remove partial copy");
                }
            }
            return Err(copy_err(e));
        }
        Ok(())
    }

    fn fs_type(&self) -> &'static str {
        "local"
    }
}
