use std::fmt::Debug;
use std::process::Stdio;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// CommandOutput is what a finished external command wrote.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// body is the captured standard output, or standard error when nothing went to stdout.
    pub fn body(self) -> Vec<u8> {
        if self.stdout.is_empty() {
            self.stderr
        } else {
            self.stdout
        }
    }
}

/// Executor runs operator supplied command lines for `bin:` rules and evaluation directives.
#[async_trait]
pub trait Executor: Debug + Send + Sync {
    async fn exec(&self, command: &str) -> Result<CommandOutput>;
}

/// ShellExecutor hands the command line to `sh -c`. The command is neither validated nor
/// sanitized.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

#[async_trait]
impl Executor for ShellExecutor {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        debug!("executing `{}`", command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| anyhow!("failed to launch `{}`: {}", command, e))?;

        if !output.status.success() {
            return Err(anyhow!(
                "`{}` failed with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
