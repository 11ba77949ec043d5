mod cli;
mod commands;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use warden_core::{ExecCommandRunner, OsFileSystem};
use warden_service::SystemdServiceControl;
use warden_supervisor::JobSupervisor;

use crate::cli::{AgentCli, AgentCommand};
use crate::commands::{execute_lifecycle_command, run_monitor};

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn build_supervisor(cli: &AgentCli) -> JobSupervisor {
    let fs = Arc::new(OsFileSystem);
    let runner = Arc::new(ExecCommandRunner::default());
    let service_control = SystemdServiceControl::new(
        cli.settings.service_control_config(),
        fs.clone(),
        runner.clone(),
    );
    JobSupervisor::new(
        cli.settings.supervisor_config(),
        Arc::new(service_control),
        fs,
        runner,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = AgentCli::parse();
    let supervisor = build_supervisor(&cli);
    if cli.command == AgentCommand::Monitor {
        return run_monitor(&supervisor).await;
    }
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute_lifecycle_command(&supervisor, &cli.command, &mut out)
}
