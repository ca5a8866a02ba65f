use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use dynscan_core::*;
use dynscan_exec::command::CommandInvocation;
use dynscan_exec::error::ExecError;
use dynscan_exec::mask::{MaskingWriter, Redactor};
use dynscan_exec::result::CommandResult;
use dynscan_exec::sink::{LogSink, MemorySink};
use dynscan_exec::traits::{ProcessLauncher, RemoteExecutor, RunningProcess};
use dynscan_stage::error::StageError;
use dynscan_stage::stager::ArtifactStager;
use dynscan_stage::traits::StagingFs;
use dynscan_stage::types::{ArtifactPattern, ArtifactSource, StageAction};

// Mock implementations
struct MockExecutor;

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn run(&self, _cmd: &str) -> Result<CommandResult, ExecError> {
        Ok(CommandResult {
            status: 0,
            stdout: "21.2.7.1\n".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    async fn upload(&self, _contents: &[u8], _path: &str) -> Result<(), ExecError> {
        Ok(())
    }

    fn executor_type(&self) -> &'static str {
        "mock"
    }
}

/// Launcher that prints every argument back and exits with a fixed code
struct MockLauncher {
    exit_code: i32,
    launched: Mutex<Vec<CommandInvocation>>,
}

impl MockLauncher {
    fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            launched: Mutex::new(Vec::new()),
        }
    }

    fn last(&self) -> CommandInvocation {
        self.launched.lock().unwrap().last().cloned().unwrap()
    }
}

struct MockProcess {
    exit_code: i32,
}

#[async_trait]
impl ProcessLauncher for MockLauncher {
    async fn launch(
        &self,
        invocation: &CommandInvocation,
        sink: Arc<dyn LogSink>,
        quiet: bool,
    ) -> Result<Box<dyn RunningProcess>, ExecError> {
        self.launched.lock().unwrap().push(invocation.clone());
        if !quiet {
            sink.line(&format!("$ {}", invocation.masked_display()));
        }

        let redactor = Arc::new(Redactor::for_invocation(invocation).unwrap());
        let mut writer = MaskingWriter::new(sink, redactor);
        for arg in invocation.args() {
            writer.write(format!("got {arg}\n").as_bytes());
        }
        writer.finish();

        Ok(Box::new(MockProcess {
            exit_code: self.exit_code,
        }))
    }

    fn launcher_type(&self) -> &'static str {
        "mock"
    }
}

#[async_trait]
impl RunningProcess for MockProcess {
    async fn join(&mut self) -> Result<i32, ExecError> {
        Ok(self.exit_code)
    }

    async fn kill(&mut self) -> Result<(), ExecError> {
        Ok(())
    }
}

/// Remote staging host kept in memory
#[derive(Default)]
struct MockFs {
    files: Mutex<BTreeSet<String>>,
    dirs: Mutex<BTreeSet<String>>,
    copies: Mutex<Vec<String>>,
}

impl MockFs {
    fn with_files(dir: &str, names: &[&str]) -> Self {
        let fs = Self::default();
        fs.dirs.lock().unwrap().insert(dir.to_string());
        for name in names {
            fs.files.lock().unwrap().insert(format!("{dir}/{name}"));
        }
        fs
    }

    fn copies(&self) -> Vec<String> {
        self.copies.lock().unwrap().clone()
    }
}

#[async_trait]
impl StagingFs for MockFs {
    async fn exists(&self, path: &str) -> Result<bool, StageError> {
        Ok(self.dirs.lock().unwrap().contains(path) || self.files.lock().unwrap().contains(path))
    }

    async fn mkdirs(&self, path: &str) -> Result<(), StageError> {
        self.dirs.lock().unwrap().insert(path.to_string());
        Ok(())
    }

    async fn list(&self, dir: &str, pattern: &ArtifactPattern) -> Result<Vec<String>, StageError> {
        let prefix = format!("{dir}/");
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter_map(|f| f.strip_prefix(&prefix))
            .filter(|name| pattern.matches(name))
            .map(ToString::to_string)
            .collect())
    }

    async fn delete_contents(&self, dir: &str) -> Result<(), StageError> {
        let prefix = format!("{dir}/");
        self.files.lock().unwrap().retain(|f| !f.starts_with(&prefix));
        Ok(())
    }

    async fn copy_from_local(&self, _source: &Path, dest: &str) -> Result<(), StageError> {
        self.copies.lock().unwrap().push(dest.to_string());
        self.files.lock().unwrap().insert(dest.to_string());
        Ok(())
    }

    fn fs_type(&self) -> &'static str {
        "mock"
    }
}

fn params(proxy: bool) -> RescanParams {
    RescanParams {
        app_name: "Storefront".to_string(),
        dvr_enabled: true,
        api_id: "vid-1".to_string(),
        api_key: SecretString::from("k3y-value"),
        proxy: proxy.then(|| ProxySettings {
            host: "proxy.local".to_string(),
            port: 3128,
            user: Some("svc".to_string()),
            password: Some(SecretString::from("pr0xy-pw")),
        }),
    }
}

fn local_helpers(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), b"jar").unwrap();
    }
    dir
}

fn remote_ctx() -> BuildContext {
    BuildContext {
        job_name: "nightly-dast".to_string(),
        target: Some(ExecutionTarget::remote("agent-1", "/ws")),
        staging_dir: None,
    }
}

struct Harness {
    step: RescanStep,
    launcher: Arc<MockLauncher>,
    fs: Arc<MockFs>,
    sink: Arc<MemorySink>,
}

impl Harness {
    fn new(config: ScanConfig, local: &Path, remote_files: &[&str], exit_code: i32, proxy: bool) -> Self {
        let launcher = Arc::new(MockLauncher::new(exit_code));
        let runner = RemoteCommandRunner::new(Arc::new(MockLauncher::new(0))).with_remote(launcher.clone());
        let source = ArtifactSource::new(local, ArtifactPattern::new("wrapper", "jar"));
        Self {
            step: RescanStep::new(config, params(proxy), source, runner, ArtifactStager::new()),
            launcher,
            fs: Arc::new(MockFs::with_files("/ws/.dynscan", remote_files)),
            sink: Arc::new(MemorySink::new()),
        }
    }

    async fn run(&self) -> StepReport {
        let services = TargetServices {
            fs: self.fs.clone(),
            executor: Arc::new(MockExecutor),
        };
        self.step
            .run(&remote_ctx(), &services, self.sink.clone(), &mut AbortSignal::never())
            .await
    }
}

#[tokio::test]
async fn test_remote_rescan_replaces_older_helper() {
    let local = local_helpers(&["wrapper-5.jar"]);
    let harness = Harness::new(ScanConfig::default(), local.path(), &["wrapper-3.jar"], 0, false);

    let report = harness.run().await;

    assert!(report.outcome.is_success());
    assert!(!report.build_failed);
    let staged = report.staged.as_ref().unwrap();
    assert_eq!(staged.action, StageAction::Replaced);
    assert_eq!(staged.path, "/ws/.dynscan/wrapper-5.jar");
    assert_eq!(harness.fs.copies(), vec!["/ws/.dynscan/wrapper-5.jar"]);

    let invocation = harness.launcher.last();
    assert_eq!(
        &invocation.tokens()[..3],
        &["java", "-jar", "/ws/.dynscan/wrapper-5.jar"]
    );
    let secrets: Vec<&str> = invocation.secrets().collect();
    assert_eq!(secrets, vec!["k3y-value"]);
    assert!(!harness.sink.contents().contains("k3y-value"));
}

#[tokio::test]
async fn test_remote_rescan_reuses_current_helper() {
    let local = local_helpers(&["wrapper-3.jar"]);
    let harness = Harness::new(ScanConfig::default(), local.path(), &["wrapper-5.jar"], 0, false);

    let report = harness.run().await;

    assert!(report.outcome.is_success());
    let staged = report.staged.as_ref().unwrap();
    assert_eq!(staged.action, StageAction::Reused);
    assert_eq!(staged.path, "/ws/.dynscan/wrapper-5.jar");
    assert!(harness.fs.copies().is_empty());
}

#[tokio::test]
async fn test_non_zero_exit_fails_build_when_configured() {
    let local = local_helpers(&["wrapper-5.jar"]);
    let config = ScanConfig {
        fail_build: true,
        ..ScanConfig::default()
    };
    let harness = Harness::new(config, local.path(), &[], 1, false);

    let report = harness.run().await;

    assert!(matches!(report.outcome, ScanOutcome::NonZeroExit(1)));
    assert!(report.build_failed);
    assert!(harness.sink.contents().contains("Error- Returned code from wrapper:1"));
    assert_eq!(report.staged.as_ref().unwrap().action, StageAction::Copied);
}

#[tokio::test]
async fn test_non_zero_exit_passes_without_fail_build() {
    let local = local_helpers(&["wrapper-5.jar"]);
    let harness = Harness::new(ScanConfig::default(), local.path(), &[], 2, false);

    let report = harness.run().await;

    assert!(matches!(report.outcome, ScanOutcome::NonZeroExit(2)));
    assert!(!report.build_failed);
    assert!(!harness.sink.contents().contains("Error- Returned code"));
}

#[tokio::test]
async fn test_every_secret_masked_by_default() {
    let local = local_helpers(&["wrapper-5.jar"]);
    let config = ScanConfig {
        debug: true,
        ..ScanConfig::default()
    };
    let harness = Harness::new(config, local.path(), &[], 0, true);

    harness.run().await;

    let invocation = harness.launcher.last();
    let secrets: Vec<&str> = invocation.secrets().collect();
    assert_eq!(secrets, vec!["k3y-value", "pr0xy-pw"]);

    let log = harness.sink.contents();
    assert!(!log.contains("k3y-value"));
    assert!(!log.contains("pr0xy-pw"));
    assert!(log.contains("-vkey ****"));
    assert!(log.contains("-ppassword ****"));
    assert!(log.contains("Invoking the following command in remote workspace:"));
    assert!(log.contains("Version information:\n21.2.7.1"));
    assert!(log.contains("Processing files in [remote] workspace: \n/ws"));
}

#[tokio::test]
async fn test_single_mask_mode_masks_key_only() {
    let local = local_helpers(&["wrapper-5.jar"]);
    let config = ScanConfig {
        mask_mode: MaskMode::Single,
        ..ScanConfig::default()
    };
    let harness = Harness::new(config, local.path(), &[], 0, true);

    harness.run().await;

    let invocation = harness.launcher.last();
    let secrets: Vec<&str> = invocation.secrets().collect();
    assert_eq!(secrets, vec!["k3y-value"]);
}

#[tokio::test]
async fn test_summary_serializes() {
    let local = local_helpers(&["wrapper-5.jar"]);
    let harness = Harness::new(ScanConfig::default(), local.path(), &[], 0, false);

    let report = harness.run().await;
    let json = serde_json::to_value(report.summary()).unwrap();

    assert_eq!(json["outcome"], "success");
    assert_eq!(json["exit_code"], 0);
    assert_eq!(json["stage_action"], "copied");
    assert_eq!(json["staged_version"], 5);
}
