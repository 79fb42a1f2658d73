use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

/// Captured result of a finished process.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,

    /// Captured stdout, lossily decoded.
    pub stdout: String,

    /// Captured stderr, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Runs external programs to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Runs `program` with `args` and captures its output.
    async fn run(&self, program: &Path, args: &[&str]) -> std::io::Result<CommandOutput>;
}

/// [`CommandRunner`] spawning real processes with tokio.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &Path, args: &[&str]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output().await?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
