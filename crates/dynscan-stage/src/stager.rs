//! Helper artifact staging
//!
//! `ensure_staged` keeps exactly one current helper in the staging directory:
//! an empty directory gets a fresh copy, an older one is cleared and replaced,
//! and a current one is left alone after an existence check.

use std::sync::Arc;

use dynscan_exec::sink::LogSink;
use tracing::{debug, info, instrument, warn};

use crate::error::{StageError, StageWarning};
use crate::local::list_matching;
use crate::lock::StagingLocks;
use crate::traits::StagingFs;
use crate::types::{ArtifactSource, StageAction, StagedArtifact, StagingDirectory};
use crate::version::ArtifactVersion;

/// A versioned artifact file name
#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    version: ArtifactVersion,
}

impl Candidate {
    fn parse(name: String, warnings: &mut Vec<StageWarning>) -> Self {
        let version = match ArtifactVersion::try_from_file_name(&name) {
            Some(v) => v,
            None => {
                warn!(file = %name, "no version in artifact name, ranking it lowest");
                warnings.push(StageWarning::VersionParseAmbiguous { file: name.clone() });
                ArtifactVersion::LOWEST
            }
        };
        Self { name, version }
    }
}

/// Highest-versioned candidate; later names win ties
fn newest(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().max_by_key(|c| c.version)
}

/// Stages the helper executable onto execution hosts
#[derive(Clone, Default)]
pub struct ArtifactStager {
    locks: StagingLocks,
    build_log: Option<Arc<dyn LogSink>>,
}

impl std::fmt::Debug for ArtifactStager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStager")
            .field("locks", &self.locks.len())
            .field("build_log", &self.build_log.is_some())
            .finish()
    }
}

impl ArtifactStager {
    /// Create a stager with its own lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share a lock table with other stagers in the process
    #[must_use]
    pub fn with_locks(mut self, locks: StagingLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Echo staging progress to a build log
    #[must_use]
    pub fn with_build_log(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.build_log = Some(sink);
        self
    }

    fn progress(&self, message: &str) {
        if let Some(sink) = &self.build_log {
            sink.line(message);
        }
    }

    /// Make sure the newest helper from `source` is present in `target`
    ///
    /// Holds the lock for `target` for the whole check-clear-copy sequence.
    ///
    /// # Errors
    /// Returns `StageError` if the source has no artifact, the directory cannot
    /// be created, listed, cleared or copied into, or the current staged
    /// executable is missing
    #[instrument(skip(self, source, target, fs), fields(staging = %target.lock_key(), fs = fs.fs_type()))]
    pub async fn ensure_staged(
        &self,
        source: &ArtifactSource,
        target: &StagingDirectory,
        fs: &dyn StagingFs,
    ) -> Result<StagedArtifact, StageError> {
        let _guard = self.locks.acquire(&target.lock_key()).await;
        let mut warnings = Vec::new();

        let local = local_candidates(source, &mut warnings).await?;
        let Some(fresh) = newest(&local) else {
            return Err(no_local_artifact(source));
        };

        if !fs.exists(&target.path).await? {
            debug!(path = %target.path, "creating staging directory");
            self.progress("Making remote dir");
            fs.mkdirs(&target.path).await?;
        }

        let staged: Vec<Candidate> = fs
            .list(&target.path, &source.pattern)
            .await?
            .into_iter()
            .filter(|name| source.is_candidate(name))
            .map(|name| Candidate::parse(name, &mut warnings))
            .collect();

        let Some(current) = newest(&staged) else {
            let path = self.copy_all(source, &local, fresh, target, fs).await?;
            info!(path = %path, version = %fresh.version, "staged helper");
            return Ok(StagedArtifact {
                path,
                version: fresh.version,
                action: StageAction::Copied,
                warnings,
            });
        };

        if fresh.version > current.version {
            info!(
                staged = %current.version,
                local = %fresh.version,
                "newer helper available, replacing staged copy"
            );
            self.progress("Newer veracode library version, copying it to remote machine");

            fs.delete_contents(&target.path).await?;
            let path = self.copy_all(source, &local, fresh, target, fs).await?;
            return Ok(StagedArtifact {
                path,
                version: fresh.version,
                action: StageAction::Replaced,
                warnings,
            });
        }

        let expected = target.join(source.launch_name.as_deref().unwrap_or(&current.name));
        if !fs.exists(&expected).await? {
            warn!(path = %expected, "staged helper is current but executable is missing");
            return Err(StageError::ExecutableMissing { path: expected });
        }

        debug!(path = %expected, version = %current.version, "staged helper is current");
        Ok(StagedArtifact {
            path: expected,
            version: current.version,
            action: StageAction::Reused,
            warnings,
        })
    }

    /// Newest helper in `source`, used where it is (local execution)
    ///
    /// # Errors
    /// Returns `StageError` if the source cannot be listed or holds no artifact
    pub async fn resolve_local(&self, source: &ArtifactSource) -> Result<StagedArtifact, StageError> {
        let mut warnings = Vec::new();
        let local = local_candidates(source, &mut warnings).await?;
        let fresh = newest(&local).ok_or_else(|| no_local_artifact(source))?;

        Ok(StagedArtifact {
            path: source.dir.join(&fresh.name).display().to_string(),
            version: fresh.version,
            action: StageAction::InPlace,
            warnings,
        })
    }

    /// Copy every local candidate, plus the newest under the launch name
    ///
    /// Returns the staged executable path. A failed copy clears the staging
    /// directory so the next run copies again instead of reusing a partial file.
    async fn copy_all(
        &self,
        source: &ArtifactSource,
        local: &[Candidate],
        fresh: &Candidate,
        target: &StagingDirectory,
        fs: &dyn StagingFs,
    ) -> Result<String, StageError> {
        match self.copy_each(source, local, fresh, target, fs).await {
            Ok(path) => Ok(path),
            Err(err) => {
                if let Err(cleanup) = fs.delete_contents(&target.path).await {
                    warn!(path = %target.path, error = %cleanup, "failed to clear staging directory after copy error");
                }
                Err(err)
            }
        }
    }

    async fn copy_each(
        &self,
        source: &ArtifactSource,
        local: &[Candidate],
        fresh: &Candidate,
        target: &StagingDirectory,
        fs: &dyn StagingFs,
    ) -> Result<String, StageError> {
        for candidate in local {
            let dest = target.join(&candidate.name);
            fs.copy_from_local(&source.dir.join(&candidate.name), &dest)
                .await?;
            debug!(file = %candidate.name, dest = %dest, "copied helper");
        }

        match &source.launch_name {
            Some(launch_name) => {
                let dest = target.join(launch_name);
                fs.copy_from_local(&source.dir.join(&fresh.name), &dest)
                    .await?;
                Ok(dest)
            }
            None => Ok(target.join(&fresh.name)),
        }
    }
}

async fn local_candidates(
    source: &ArtifactSource,
    warnings: &mut Vec<StageWarning>,
) -> Result<Vec<Candidate>, StageError> {
    Ok(list_matching(&source.dir, &source.pattern)
        .await?
        .into_iter()
        .filter(|name| source.is_candidate(name))
        .map(|name| Candidate::parse(name, warnings))
        .collect())
}

fn no_local_artifact(source: &ArtifactSource) -> StageError {
    StageError::NoLocalArtifact {
        dir: source.dir.display().to_string(),
        pattern: source.pattern.to_string(),
    }
}
