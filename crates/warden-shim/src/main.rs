use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use warden_shim::{run_install, run_pipe, run_uninstall, PipeConfig, ShimCli, ShimCommand};

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

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = ShimCli::parse();
    match cli.command {
        ShimCommand::Install { process_dir } => {
            run_install(process_dir.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        ShimCommand::Uninstall { process_dir } => {
            run_uninstall(process_dir.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        ShimCommand::Pipe(invocation) => {
            let (executable, args) = invocation
                .split_first()
                .context("pipe mode requires an executable")?;
            let config = PipeConfig::from_env()?;
            let code = run_pipe(&config, executable, args).await?;
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
    }
}
