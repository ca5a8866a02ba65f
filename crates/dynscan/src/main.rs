//! dynscan
//!
//! Stages the scanner helper onto the build's execution host and submits a
//! dynamic rescan with it, keeping API credentials out of the build log.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use dynscan_core::probe::helper_version;
use dynscan_core::{AbortHandle, RemoteCommandRunner, RescanStep, TargetServices, abort_pair};
use dynscan_exec::{LocalExecutor, LogSink, StdoutSink};
use dynscan_stage::{ArtifactStager, StagedArtifact};
use eyre::{WrapErr, eyre};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod factory;

use config::{Config, LogConfig};
use factory::HostServices;

const PROBE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "dynscan", version)]
#[command(about = "Stage the scanner helper and submit a dynamic rescan", long_about = None)]
struct Cli {
    /// Config file (defaults to $DYNSCAN_CONFIG, ./dynscan.toml, /etc/dynscan/dynscan.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the debug preamble and echo the masked command
    #[arg(long, global = true)]
    debug: bool,

    /// Exit non-zero when the scan does not succeed
    #[arg(long, global = true)]
    fail_build: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage the helper and submit a dynamic rescan
    Rescan,
    /// Only stage the helper on the execution host
    Stage,
    /// Print the version of the staged helper
    Probe {
        /// Helper path on the execution host instead of the staged one
        #[arg(long)]
        helper: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path).wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => Config::load_default()?,
    };
    config.apply_env(|name| std::env::var(name).ok());
    config.scan.debug |= cli.debug;
    config.scan.fail_build |= cli.fail_build;
    config.scan.validate()?;

    init_tracing(&config.log);

    match cli.command {
        Commands::Rescan => rescan(&config, cli.json).await,
        Commands::Stage => stage(&config, cli.json).await,
        Commands::Probe { helper } => probe(&config, helper, cli.json).await,
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn spawn_ctrl_c(handle: AbortHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, aborting build");
            handle.abort();
        }
    });
}

async fn rescan(config: &Config, json: bool) -> Result<ExitCode> {
    let params = config.rescan_params()?;
    let host = HostServices::for_target(&config.target)?;

    let runner = RemoteCommandRunner::new(Arc::new(LocalExecutor::new())).with_remote(host.launcher.clone());
    let step = RescanStep::new(
        config.scan.clone(),
        params,
        config.artifact_source(),
        runner,
        ArtifactStager::new(),
    );
    let services = TargetServices {
        fs: host.fs.clone(),
        executor: host.executor.clone(),
    };

    let (handle, mut signal) = abort_pair();
    spawn_ctrl_c(handle);

    let sink: Arc<dyn LogSink> = Arc::new(StdoutSink);
    let report = step.run(&config.build_context(), &services, sink, &mut signal).await;
    host.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
    }
    info!(outcome = %report.outcome, build_failed = report.build_failed, "rescan finished");

    Ok(if report.build_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn staged_helper(config: &Config, host: &HostServices) -> Result<StagedArtifact> {
    let target = config
        .execution_target()
        .ok_or_else(|| eyre!("failed to locate the build workspace"))?;
    let source = config.artifact_source();
    let stager = ArtifactStager::new();

    let staged = if target.is_remote {
        let dir = target.staging_directory(config.target.staging_dir.as_deref());
        stager.ensure_staged(&source, &dir, host.fs.as_ref()).await?
    } else {
        stager.resolve_local(&source).await?
    };
    Ok(staged)
}

async fn stage(config: &Config, json: bool) -> Result<ExitCode> {
    let host = HostServices::for_target(&config.target)?;
    let staged = staged_helper(config, &host).await;
    host.close().await;
    let staged = staged?;

    for warning in &staged.warnings {
        warn!(%warning, "staging warning");
    }
    if json {
        let value = serde_json::json!({
            "path": staged.path,
            "version": staged.version,
            "action": staged.action,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{} ({:?}, version {})", staged.path, staged.action, staged.version);
    }
    Ok(ExitCode::SUCCESS)
}

async fn probe(config: &Config, helper: Option<String>, json: bool) -> Result<ExitCode> {
    let host = HostServices::for_target(&config.target)?;
    let helper = match helper {
        Some(helper) => helper,
        None => match staged_helper(config, &host).await {
            Ok(staged) => staged.path,
            Err(e) => {
                host.close().await;
                return Err(e);
            }
        },
    };

    let version = helper_version(host.executor.as_ref(), &config.scan.interpreter, &helper, PROBE_TIMEOUT).await;
    host.close().await;
    if json {
        println!("{}", serde_json::json!({ "helper": helper, "version": version }));
    } else {
        println!("{}", version.as_deref().unwrap_or("not available"));
    }
    Ok(ExitCode::SUCCESS)
}
