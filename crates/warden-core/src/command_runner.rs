use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;
use wait_timeout::ChildExt;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Captured result of one finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Command-execution capability. A non-zero exit status is reported as an error.
pub trait CommandRunner: Send + Sync {
    fn run_command(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// [`CommandRunner`] that spawns real processes and kills them after `timeout`.
#[derive(Debug, Clone)]
pub struct ExecCommandRunner {
    timeout: Duration,
}

impl ExecCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ExecCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl CommandRunner for ExecCommandRunner {
    fn run_command(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!(program, ?args, "running command");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn '{program}'"))?;

        if child
            .wait_timeout(self.timeout)
            .with_context(|| format!("failed while waiting for '{program}'"))?
            .is_none()
        {
            let _ = child.kill();
            let _ = child.wait();
            bail!(
                "'{program}' timed out after {} ms",
                self.timeout.as_millis()
            );
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to collect output of '{program}'"))?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        if !output.status.success() {
            return Err(anyhow!(
                "'{program} {}' exited with status {}: {}",
                args.join(" "),
                result.exit_code,
                result.stderr.trim()
            ));
        }
        Ok(result)
    }
}
