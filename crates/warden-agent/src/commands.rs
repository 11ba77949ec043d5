use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::info;
use warden_supervisor::{Alert, JobFailureHandler, JobSupervisor};

use crate::cli::AgentCommand;

/// Runs one synchronous lifecycle command, writing its report to `out`.
pub fn execute_lifecycle_command(
    supervisor: &JobSupervisor,
    command: &AgentCommand,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        AgentCommand::AddJob {
            job_name,
            job_index,
            config_path,
        } => {
            supervisor.add_job(job_name, *job_index, config_path)?;
            writeln!(out, "job '{job_name}' installed")?;
        }
        AgentCommand::Start => {
            supervisor.start()?;
            writeln!(out, "jobs started")?;
        }
        AgentCommand::Stop => {
            supervisor.stop()?;
            writeln!(out, "jobs stopped")?;
        }
        AgentCommand::StopAndWait => {
            supervisor.stop_and_wait()?;
            writeln!(out, "jobs stopped")?;
        }
        AgentCommand::Unmonitor => {
            supervisor.unmonitor()?;
            writeln!(out, "jobs unmonitored")?;
        }
        AgentCommand::Reload => {
            supervisor.reload()?;
            writeln!(out, "reload is not needed; re-run add-job to update services")?;
        }
        AgentCommand::RemoveAllJobs => {
            supervisor.remove_all_jobs()?;
            writeln!(out, "jobs removed")?;
        }
        AgentCommand::Status { json } => {
            let status = supervisor.status();
            supervisor.health_recorder(status.as_str());
            if *json {
                writeln!(out, "{}", serde_json::json!({ "status": status }))?;
            } else {
                writeln!(out, "{status}")?;
            }
        }
        AgentCommand::Processes { json } => {
            let processes = supervisor.processes()?;
            if *json {
                writeln!(
                    out,
                    "{}",
                    serde_json::to_string(&processes).context("failed to render processes")?
                )?;
            } else {
                for process in &processes {
                    writeln!(out, "{}\t{}", process.name, process.state)?;
                }
            }
        }
        AgentCommand::Monitor => {
            anyhow::bail!("monitor runs through run_monitor");
        }
    }
    Ok(())
}

/// Handler printing each alert as one JSON line to `out`.
pub fn json_line_alert_handler(out: Arc<Mutex<dyn Write + Send>>) -> JobFailureHandler {
    Arc::new(move |alert: Alert| {
        let line = serde_json::to_string(&alert).context("failed to render alert")?;
        let mut out = out
            .lock()
            .map_err(|_| anyhow::anyhow!("alert output lock is poisoned"))?;
        writeln!(out, "{line}").context("failed to write alert")?;
        out.flush().context("failed to flush alert output")?;
        Ok(())
    })
}

/// Runs the failure listener until ctrl-c.
pub async fn run_monitor(supervisor: &JobSupervisor) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping failure listener");
        }
        let _ = shutdown_tx.send(());
    });
    let handler = json_line_alert_handler(Arc::new(Mutex::new(std::io::stdout())));
    supervisor.monitor_job_failures(handler, shutdown_rx).await?;
    Ok(())
}
