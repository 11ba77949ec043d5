use std::future::Future;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use warden_core::{append_line_with_rotation, LogRotationPolicy};
use warden_jobs::{NOTIFY_HTTP_ENV, NOTIFY_LOG_DIR_ENV, NOTIFY_PROCESS_NAME_ENV};
use warden_supervisor::{FailureEvent, PROCESS_FAILED_EVENT};

const REPORT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// Pipe-mode settings injected into the service environment at install time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeConfig {
    pub process_name: String,
    pub log_dir: PathBuf,
    /// No failure reports are sent when unset.
    pub notify_endpoint: Option<String>,
    pub rotation: LogRotationPolicy,
    /// How long a non-zero exit waits for a SIGTERM before it is reported.
    pub stop_grace: Duration,
}

impl PipeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), LogRotationPolicy::from_env())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        rotation: LogRotationPolicy,
    ) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("{name} is not set"))
        };
        Ok(Self {
            process_name: required(NOTIFY_PROCESS_NAME_ENV)?,
            log_dir: PathBuf::from(required(NOTIFY_LOG_DIR_ENV)?),
            notify_endpoint: lookup(NOTIFY_HTTP_ENV).filter(|value| !value.trim().is_empty()),
            rotation,
            stop_grace: DEFAULT_STOP_GRACE,
        })
    }

    pub fn stdout_log_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.stdout.log", self.process_name))
    }

    pub fn stderr_log_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.stderr.log", self.process_name))
    }
}

/// Runs `executable` to completion and returns the exit code the shim should exit with.
///
/// An unsuccessful exit is reported to the failure listener unless the shim
/// itself received SIGTERM, which marks a planned stop. A SIGTERM arriving
/// within `stop_grace` of the exit also counts: systemd runs `ExecStop`
/// before it signals the shim.
pub async fn run_pipe(config: &PipeConfig, executable: &str, args: &[String]) -> Result<i32> {
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut child = Command::new(executable)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {executable}"))?;
    info!(process = %config.process_name, executable, pid = child.id(), "process started");

    let stdout = child.stdout.take().context("child stdout was not captured")?;
    let stderr = child.stderr.take().context("child stderr was not captured")?;
    let stdout_pump = tokio::spawn(pump_lines(stdout, config.stdout_log_path(), config.rotation));
    let stderr_pump = tokio::spawn(pump_lines(stderr, config.stderr_log_path(), config.rotation));

    let (status, mut planned_stop) = tokio::select! {
        status = child.wait() => (status.context("failed to wait for process")?, false),
        _ = terminate.recv() => {
            info!(process = %config.process_name, "received SIGTERM, waiting for process to exit");
            (child.wait().await.context("failed to wait for process")?, true)
        }
    };

    for pump in [stdout_pump, stderr_pump] {
        match pump.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(error = %format!("{error:#}"), "log capture failed"),
            Err(error) => warn!(%error, "log capture task panicked"),
        }
    }

    if !planned_stop && !status.success() {
        planned_stop = await_planned_stop(terminate.recv(), config.stop_grace).await;
    }

    let exit_code = exit_code(status);
    info!(process = %config.process_name, exit_code, planned_stop, "process exited");
    if planned_stop || status.success() {
        return Ok(exit_code);
    }
    if let Some(endpoint) = config.notify_endpoint.as_deref() {
        if let Err(error) = report_failure(endpoint, &config.process_name, exit_code).await {
            warn!(error = %format!("{error:#}"), "failed to report process failure");
        }
    }
    Ok(exit_code)
}

/// POSTs one failure event to the agent's listener.
pub async fn report_failure(endpoint: &str, process_name: &str, exit_code: i32) -> Result<()> {
    let event = FailureEvent {
        event: PROCESS_FAILED_EVENT.to_string(),
        process_name: process_name.to_string(),
        exit_code: i64::from(exit_code),
    };
    let response = reqwest::Client::new()
        .post(endpoint)
        .timeout(REPORT_TIMEOUT)
        .json(&event)
        .send()
        .await
        .with_context(|| format!("failed to post failure event to {endpoint}"))?;
    if !response.status().is_success() {
        bail!(
            "failure listener at {endpoint} rejected event with status {}",
            response.status()
        );
    }
    Ok(())
}

async fn await_planned_stop<F: Future>(stop_signal: F, grace: Duration) -> bool {
    tokio::time::timeout(grace, stop_signal).await.is_ok()
}

async fn pump_lines<R>(reader: R, path: PathBuf, policy: LogRotationPolicy) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .await
            .with_context(|| format!("failed to read output for {}", path.display()))?;
        if read == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buffer);
        append_line_with_rotation(&path, line.trim_end_matches(['\n', '\r']), policy)?;
    }
}

/// Signal-terminated processes map to `128 + signal`, as shells report them.
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}
