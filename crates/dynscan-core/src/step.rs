//! The dynamic rescan build step
//!
//! Sequences staging (remote) or local resolution of the helper, argument
//! building, secret location and the masked run, then applies the build-fail
//! policy. All user-visible progress goes to the build log sink.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dynscan_exec::sink::LogSink;
use dynscan_exec::traits::RemoteExecutor;
use dynscan_stage::error::StageError;
use dynscan_stage::stager::ArtifactStager;
use dynscan_stage::traits::StagingFs;
use dynscan_stage::types::{ArtifactSource, StageAction, StagedArtifact};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::abort::AbortSignal;
use crate::args::RescanParams;
use crate::command::{launch_prefix, tokenize_command};
use crate::config::ScanConfig;
use crate::outcome::{ScanError, ScanOutcome};
use crate::probe::helper_version;
use crate::runner::{RemoteCommandRunner, RunOptions};
use crate::target::ExecutionTarget;

/// Title printed in the step banner
pub const STEP_TITLE: &str = "Dynamic Rescan with Veracode";

const RULE: &str = "------------------------------------------------------------------------";
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-build inputs
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    /// Job name, used as the application name when `auto_app_name` is set
    pub job_name: String,
    /// Where the build runs; `None` when the workspace could not be located
    pub target: Option<ExecutionTarget>,
    /// Staging directory override on the execution host
    pub staging_dir: Option<String>,
}

/// Capabilities on the execution host
#[derive(Clone)]
pub struct TargetServices {
    /// Filesystem for staging
    pub fs: Arc<dyn StagingFs>,
    /// Short commands, used for the version probe
    pub executor: Arc<dyn RemoteExecutor>,
}

/// What one step run did
#[derive(Debug, Clone)]
pub struct StepReport {
    pub outcome: ScanOutcome,
    /// Whether the enclosing build should be marked failed
    pub build_failed: bool,
    pub staged: Option<StagedArtifact>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Serializable summary of a [`StepReport`]
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub outcome: String,
    pub exit_code: Option<i32>,
    pub build_failed: bool,
    pub staged_path: Option<String>,
    pub staged_version: Option<u64>,
    pub stage_action: Option<StageAction>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl StepReport {
    #[must_use]
    pub fn summary(&self) -> StepSummary {
        StepSummary {
            outcome: self.outcome.to_string(),
            exit_code: self.outcome.exit_code(),
            build_failed: self.build_failed,
            staged_path: self.staged.as_ref().map(|s| s.path.clone()),
            staged_version: self.staged.as_ref().map(|s| s.version.0),
            stage_action: self.staged.as_ref().map(|s| s.action),
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: (self.finished_at - self.started_at).num_milliseconds(),
        }
    }
}

/// Stages the helper and runs a dynamic rescan with it
pub struct RescanStep {
    config: ScanConfig,
    params: RescanParams,
    source: ArtifactSource,
    runner: RemoteCommandRunner,
    stager: ArtifactStager,
}

impl RescanStep {
    /// Create a step; the runner's options are taken from `config`
    pub fn new(
        config: ScanConfig,
        params: RescanParams,
        source: ArtifactSource,
        runner: RemoteCommandRunner,
        stager: ArtifactStager,
    ) -> Self {
        let runner = runner.with_options(RunOptions {
            quiet: !config.debug,
            timeout: config.timeout(),
        });
        Self {
            config,
            params,
            source,
            runner,
            stager,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run the step once
    ///
    /// Never fails: every problem ends up in [`StepReport::outcome`].
    #[instrument(skip_all, fields(job = %ctx.job_name))]
    pub async fn run(
        &self,
        ctx: &BuildContext,
        services: &TargetServices,
        sink: Arc<dyn LogSink>,
        abort: &mut AbortSignal,
    ) -> StepReport {
        let started_at = Utc::now();
        let debug = self.config.debug;

        sink.line(RULE);
        sink.line(STEP_TITLE);
        sink.line(RULE);

        if debug {
            sink.line("");
            sink.line("[Debug mode is on]");
            sink.line("");
            sink.line("Can Fail Build?");
            sink.line(&self.config.fail_build.to_string());
            sink.line("");
        }

        let mut staged = None;
        let outcome = match &ctx.target {
            None => {
                sink.line("");
                sink.line("Failed to locate the build workspace.");
                ScanOutcome::ExecutionError(ScanError::MissingWorkspace)
            }
            Some(target) => {
                self.run_on(target, ctx, services, &sink, abort, &mut staged)
                    .await
            }
        };

        let policy = self.config.policy();
        let build_failed = outcome.fails_build(&policy);
        match &outcome {
            ScanOutcome::NonZeroExit(code) if policy.fail_build => {
                sink.line("");
                sink.line(&format!("Error- Returned code from wrapper:{code}"));
            }
            ScanOutcome::ExecutionError(e) if build_failed && !matches!(e, ScanError::MissingWorkspace) => {
                sink.line(&e.to_string());
            }
            _ => {}
        }

        info!(outcome = %outcome, build_failed, "rescan step finished");
        StepReport {
            outcome,
            build_failed,
            staged,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn run_on(
        &self,
        target: &ExecutionTarget,
        ctx: &BuildContext,
        services: &TargetServices,
        sink: &Arc<dyn LogSink>,
        abort: &mut AbortSignal,
        staged_out: &mut Option<StagedArtifact>,
    ) -> ScanOutcome {
        let debug = self.config.debug;

        if debug {
            sink.line("");
            sink.line(&format!("Processing files in [{}] workspace: ", target.kind()));
            sink.line(&target.workspace_path.replace('\\', "/"));
        }

        let staged = match self.stage(target, ctx, services, sink).await {
            Ok(staged) => staged,
            Err(e) => return ScanOutcome::ExecutionError(ScanError::Stage(e)),
        };
        let helper = staged.path.clone();
        *staged_out = Some(staged);

        if debug {
            match helper_version(
                services.executor.as_ref(),
                &self.config.interpreter,
                &helper,
                PROBE_TIMEOUT,
            )
            .await
            {
                Some(version) => {
                    sink.line("Version information:");
                    sink.line(&version);
                }
                None => sink.line("Could not retrieve API wrapper's version information."),
            }
            sink.line("");
            sink.line("Building arguments. ");
        }

        let args = self.params.build_args(&self.config, &ctx.job_name);
        if debug {
            sink.line("Calling wrapper with arguments:");
            sink.line(&self.params.masked_args(&self.config, &ctx.job_name).to_string());
            sink.line("");
        }

        let executable = launch_prefix(&self.config.interpreter, &helper);
        let tokens = match tokenize_command(&executable, &args) {
            Ok(tokens) => tokens,
            Err(e) => return ScanOutcome::ExecutionError(ScanError::Command(e)),
        };
        let secrets = self
            .config
            .secret_flags
            .locate(&tokens, self.config.mask_mode);

        self.runner
            .run(&executable, &args, target, &secrets, sink.clone(), abort)
            .await
    }

    async fn stage(
        &self,
        target: &ExecutionTarget,
        ctx: &BuildContext,
        services: &TargetServices,
        sink: &Arc<dyn LogSink>,
    ) -> Result<StagedArtifact, StageError> {
        let result = if target.is_remote {
            let stager = if self.config.debug {
                self.stager.clone().with_build_log(sink.clone())
            } else {
                self.stager.clone()
            };
            let dir = target.staging_directory(ctx.staging_dir.as_deref());
            stager
                .ensure_staged(&self.source, &dir, services.fs.as_ref())
                .await
        } else {
            self.stager.resolve_local(&self.source).await
        };

        match &result {
            Ok(staged) => {
                for warning in &staged.warnings {
                    warn!(%warning, "staging warning");
                }
            }
            Err(e) => warn!(error = %e, "staging failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use dynscan_exec::local::LocalExecutor;
    use dynscan_exec::sink::MemorySink;
    use dynscan_stage::local::LocalFs;
    use dynscan_stage::types::ArtifactPattern;
    use secrecy::SecretString;

    use super::*;

    fn params() -> RescanParams {
        RescanParams {
            app_name: "Storefront".to_string(),
            dvr_enabled: false,
            api_id: "id".to_string(),
            api_key: SecretString::from("k3y"),
            proxy: None,
        }
    }

    fn services() -> TargetServices {
        TargetServices {
            fs: Arc::new(LocalFs::new()),
            executor: Arc::new(LocalExecutor::new()),
        }
    }

    fn step(config: ScanConfig, dir: &std::path::Path) -> RescanStep {
        RescanStep::new(
            config,
            params(),
            ArtifactSource::new(dir, ArtifactPattern::new("wrapper", "jar")),
            RemoteCommandRunner::new(Arc::new(LocalExecutor::new())),
            ArtifactStager::new(),
        )
    }

    #[tokio::test]
    async fn test_missing_workspace_follows_policy() {
        let dir = tempfile::tempdir().unwrap();
        for fail_build in [true, false] {
            let config = ScanConfig {
                fail_build,
                ..ScanConfig::default()
            };
            let sink = Arc::new(MemorySink::new());
            let report = step(config, dir.path())
                .run(&BuildContext::default(), &services(), sink.clone(), &mut AbortSignal::never())
                .await;

            assert!(matches!(
                report.outcome,
                ScanOutcome::ExecutionError(ScanError::MissingWorkspace)
            ));
            assert_eq!(report.build_failed, fail_build);
            let log = sink.contents();
            assert!(log.contains(STEP_TITLE));
            assert!(log.contains("Failed to locate the build workspace."));
        }
    }

    #[tokio::test]
    async fn test_local_run_with_shell_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wrapper-4.jar"), "exit 3\n").unwrap();

        let config = ScanConfig {
            fail_build: true,
            debug: true,
            interpreter: vec!["sh".to_string()],
            ..ScanConfig::default()
        };
        let ctx = BuildContext {
            job_name: "nightly".to_string(),
            target: Some(ExecutionTarget::local(dir.path().display().to_string())),
            staging_dir: None,
        };
        let sink = Arc::new(MemorySink::new());

        let report = step(config, dir.path())
            .run(&ctx, &services(), sink.clone(), &mut AbortSignal::never())
            .await;

        assert!(matches!(report.outcome, ScanOutcome::NonZeroExit(3)));
        assert!(report.build_failed);
        let staged = report.staged.as_ref().unwrap();
        assert_eq!(staged.action, StageAction::InPlace);
        assert_eq!(staged.version.0, 4);

        let log = sink.contents();
        assert!(log.contains("[Debug mode is on]"));
        assert!(log.contains("Can Fail Build?\ntrue"));
        assert!(log.contains("Processing files in [local] workspace: "));
        assert!(log.contains("Calling wrapper with arguments:"));
        assert!(log.contains("Error- Returned code from wrapper:3"));
        assert!(!log.contains("k3y"));

        let summary = report.summary();
        assert_eq!(summary.exit_code, Some(3));
        assert!(summary.duration_ms >= 0);
    }

    #[tokio::test]
    async fn test_no_helper_is_stage_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = BuildContext {
            job_name: "nightly".to_string(),
            target: Some(ExecutionTarget::local(dir.path().display().to_string())),
            staging_dir: None,
        };

        let report = step(ScanConfig::default(), dir.path())
            .run(&ctx, &services(), Arc::new(MemorySink::new()), &mut AbortSignal::never())
            .await;

        assert!(matches!(report.outcome, ScanOutcome::ExecutionError(ScanError::Stage(_))));
        assert!(!report.build_failed);
        assert!(report.staged.is_none());
    }
}
