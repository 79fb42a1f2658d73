use crate::error::{Error, Result};
use crate::runner::{CommandOutput, CommandRunner};

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Matches the cluster id line of `debug gossip-values`.
static CLUSTER_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^"cluster-id": (?P<uuid>[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})$"#,
    )
    .expect("Invalid regex pattern")
});

/// stderr marker of a node that is up but not yet initialized.
const WAITING_FOR_INIT: &str = "code = Unavailable desc = node waiting for init";

/// How often and how fast to retry while the node waits for init.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,

    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_millis(125),
        }
    }
}

/// Extracts the cluster id from `debug gossip-values` output.
#[must_use]
pub fn parse_cluster_id(stdout: &str) -> Option<Uuid> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .find_map(|line| CLUSTER_ID_REGEX.captures(line))
        .and_then(|caps| caps.name("uuid"))
        .and_then(|m| Uuid::parse_str(m.as_str()).ok())
}

/// Administrative commands of the `cockroach` binary.
#[derive(Clone, Debug)]
pub struct CockroachCli<R>
where
    R: CommandRunner,
{
    binary_path: PathBuf,
    retry: RetryPolicy,
    runner: R,
}

impl<R> CockroachCli<R>
where
    R: CommandRunner,
{
    /// Creates a new `CockroachCli` invoking the binary at `binary_path`.
    pub fn new(binary_path: impl Into<PathBuf>, runner: R, retry: RetryPolicy) -> Self {
        Self {
            binary_path: binary_path.into(),
            retry,
            runner,
        }
    }

    /// Path to the binary.
    #[must_use]
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        debug!("running {} {}", self.binary_path.display(), args.join(" "));

        self.runner
            .run(&self.binary_path, args)
            .await
            .map_err(|e| Error::Io("failed to spawn cockroach", e))
    }

    /// Runs `cockroach init --insecure`. Not retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] if the command exits unsuccessfully.
    pub async fn init(&self) -> Result<()> {
        let output = self.run(&["init", "--insecure"]).await?;

        for line in output.stdout.lines() {
            info!(target: "cockroach", "{}", line);
        }

        if !output.success() {
            error!(target: "cockroach", "{}", output.stderr.trim());

            return Err(Error::Init {
                code: output.code,
                stderr: output.stderr,
            });
        }

        info!("cluster initialized");

        Ok(())
    }

    /// Reads the cluster id from `cockroach debug gossip-values --insecure`.
    ///
    /// While the node reports that it is waiting for init the command is
    /// retried according to the [`RetryPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClusterIdUnavailable`] when every attempt reported
    /// "waiting for init", [`Error::UnexpectedGateway`] on any other failure
    /// and [`Error::ClusterIdNotFound`] when the output has no cluster id.
    pub async fn fetch_cluster_id(&self) -> Result<Uuid> {
        for attempt in 1..=self.retry.max_attempts {
            let output = self
                .run(&["debug", "gossip-values", "--insecure"])
                .await?;

            if output.success() {
                return parse_cluster_id(&output.stdout).ok_or(Error::ClusterIdNotFound);
            }

            if !output.stderr.contains(WAITING_FOR_INIT) {
                return Err(Error::UnexpectedGateway(output.stderr.trim().to_string()));
            }

            warn!(
                "node waiting for init (attempt {}/{})",
                attempt, self.retry.max_attempts
            );

            if attempt < self.retry.max_attempts {
                tokio::time::sleep(self.retry.backoff).await;
            }
        }

        Err(Error::ClusterIdUnavailable(self.retry.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tracing_test::traced_test;

    const CLUSTER_ID: &str = "123e4567-e89b-12d3-a456-426614174000";

    #[derive(Clone, Default)]
    struct ScriptedRunner {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        outputs: Arc<Mutex<VecDeque<CommandOutput>>>,
    }

    impl ScriptedRunner {
        fn new(outputs: impl IntoIterator<Item = CommandOutput>) -> Self {
            Self {
                calls: Arc::default(),
                outputs: Arc::new(Mutex::new(outputs.into_iter().collect())),
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, _program: &Path, args: &[&str]) -> std::io::Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(args.iter().map(ToString::to_string).collect());

            Ok(self
                .outputs
                .lock()
                .unwrap()
                .pop_front()
                .expect("runner called more often than scripted"))
        }
    }

    fn waiting() -> CommandOutput {
        CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: format!("Error: rpc error: {WAITING_FOR_INIT}\nFailed running \"debug gossip-values\""),
        }
    }

    fn gossip(cluster_id: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: format!(
                "\"cluster-id\": {cluster_id}\n\"first-range\": 1\n\"node:1\": {{}}\n"
            ),
            stderr: String::new(),
        }
    }

    fn cli(runner: ScriptedRunner) -> CockroachCli<ScriptedRunner> {
        CockroachCli::new(
            "/usr/local/bin/cockroach",
            runner,
            RetryPolicy {
                max_attempts: 10,
                backoff: Duration::from_millis(1),
            },
        )
    }

    #[test]
    fn test_parse_cluster_id() {
        let output = format!("\"node:1\": {{}}\r\n\"cluster-id\": {CLUSTER_ID}\r\n");

        assert_eq!(
            parse_cluster_id(&output),
            Some(Uuid::parse_str(CLUSTER_ID).unwrap())
        );
    }

    #[test]
    fn test_parse_cluster_id_requires_line_start() {
        let output = format!("  \"cluster-id\": {CLUSTER_ID}\n");

        assert_eq!(parse_cluster_id(&output), None);
        assert_eq!(parse_cluster_id("\"cluster-id\": not-a-uuid\n"), None);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_cluster_id_retries_until_available() {
        let runner = ScriptedRunner::new([waiting(), waiting(), gossip(CLUSTER_ID)]);
        let cli = cli(runner.clone());

        let cluster_id = cli.fetch_cluster_id().await.unwrap();

        assert_eq!(cluster_id, Uuid::parse_str(CLUSTER_ID).unwrap());
        assert_eq!(runner.calls(), 3);
        assert!(logs_contain("node waiting for init (attempt 2/10)"));
        assert_eq!(
            runner.calls.lock().unwrap()[0],
            vec!["debug", "gossip-values", "--insecure"]
        );
    }

    #[tokio::test]
    async fn test_fetch_cluster_id_gives_up_after_max_attempts() {
        let runner = ScriptedRunner::new(std::iter::repeat_with(waiting).take(10));
        let cli = cli(runner.clone());

        let result = cli.fetch_cluster_id().await;

        assert!(matches!(result, Err(Error::ClusterIdUnavailable(10))));
        assert_eq!(runner.calls(), 10);
    }

    #[tokio::test]
    async fn test_fetch_cluster_id_unexpected_error_is_not_retried() {
        let runner = ScriptedRunner::new([CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "Error: connection refused".to_string(),
        }]);
        let cli = cli(runner.clone());

        let result = cli.fetch_cluster_id().await;

        assert!(matches!(result, Err(Error::UnexpectedGateway(ref s)) if s.contains("connection refused")));
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_cluster_id_not_found_is_not_retried() {
        let runner = ScriptedRunner::new([CommandOutput {
            code: Some(0),
            stdout: "\"first-range\": 1\n".to_string(),
            stderr: String::new(),
        }]);
        let cli = cli(runner.clone());

        assert!(matches!(
            cli.fetch_cluster_id().await,
            Err(Error::ClusterIdNotFound)
        ));
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_is_fatal() {
        let runner = ScriptedRunner::new([CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "ERROR: cluster has already been initialized".to_string(),
        }]);
        let cli = cli(runner.clone());

        let result = cli.init().await;

        assert!(matches!(result, Err(Error::Init { code: Some(1), .. })));
        assert_eq!(runner.calls(), 1);
        assert_eq!(runner.calls.lock().unwrap()[0], vec!["init", "--insecure"]);
    }
}
