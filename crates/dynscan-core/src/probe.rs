//! Best-effort helper version lookup

use std::time::Duration;

use dynscan_exec::quote::posix_join;
use dynscan_exec::traits::RemoteExecutor;
use tracing::{debug, instrument};

/// Flag that makes the helper print its version and exit
pub const VERSION_FLAG: &str = "-wrapperversion";

/// Ask the helper for its version string
///
/// Returns `None` when the helper cannot be run, exits non-zero or prints
/// nothing. Never an error: the version is informational only.
#[instrument(skip(executor, interpreter), fields(executor = executor.executor_type()))]
pub async fn helper_version(
    executor: &dyn RemoteExecutor,
    interpreter: &[String],
    helper: &str,
    timeout: Duration,
) -> Option<String> {
    let mut words: Vec<&str> = interpreter.iter().map(String::as_str).collect();
    words.extend([helper, VERSION_FLAG]);
    let cmd = posix_join(&words);

    match executor.run_with_timeout(&cmd, timeout).await {
        Ok(result) if result.success() => {
            let version = result.stdout.trim();
            if version.is_empty() {
                debug!("helper printed no version");
                None
            } else {
                Some(version.to_string())
            }
        }
        Ok(result) => {
            debug!(reason = %result.failure_reason(), "helper version probe failed");
            None
        }
        Err(e) => {
            debug!(error = %e, "helper version probe failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use dynscan_exec::error::ExecError;
    use dynscan_exec::result::CommandResult;

    use super::*;

    struct FixedExecutor {
        reply: Result<CommandResult, ExecError>,
        seen: Mutex<Vec<String>>,
    }

    impl FixedExecutor {
        fn new(status: i32, stdout: &str) -> Self {
            Self {
                reply: Ok(CommandResult {
                    status,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    duration: Duration::from_millis(1),
                }),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteExecutor for FixedExecutor {
        async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
            self.seen.lock().unwrap().push(cmd.to_string());
            self.reply.clone()
        }

        async fn run_with_timeout(&self, cmd: &str, _timeout: Duration) -> Result<CommandResult, ExecError> {
            self.run(cmd).await
        }

        async fn upload(&self, _contents: &[u8], _path: &str) -> Result<(), ExecError> {
            Ok(())
        }

        fn executor_type(&self) -> &'static str {
            "fixed"
        }
    }

    fn java() -> Vec<String> {
        vec!["java".to_string(), "-jar".to_string()]
    }

    #[tokio::test]
    async fn test_version_reported() {
        let executor = FixedExecutor::new(0, "22.4.10.0\n");
        let version = helper_version(&executor, &java(), "/opt/my tools/w.jar", Duration::from_secs(5)).await;

        assert_eq!(version.as_deref(), Some("22.4.10.0"));
        assert_eq!(
            executor.seen.lock().unwrap()[0],
            "java -jar '/opt/my tools/w.jar' -wrapperversion"
        );
    }

    #[tokio::test]
    async fn test_failure_is_absent() {
        let executor = FixedExecutor::new(1, "");
        assert!(helper_version(&executor, &java(), "w.jar", Duration::from_secs(5)).await.is_none());

        let executor = FixedExecutor::new(0, "  \n");
        assert!(helper_version(&executor, &java(), "w.jar", Duration::from_secs(5)).await.is_none());

        let executor = FixedExecutor {
            reply: Err(ExecError::Timeout {
                timeout: Duration::from_secs(5),
            }),
            seen: Mutex::new(Vec::new()),
        };
        assert!(helper_version(&executor, &java(), "w.jar", Duration::from_secs(5)).await.is_none());
    }
}
