use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "warden-shim",
    about = "Supervising shim for Warden job processes",
    version
)]
pub struct ShimCli {
    #[command(subcommand)]
    pub command: ShimCommand,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum ShimCommand {
    /// Register the unit staged next to this binary.
    Install {
        #[arg(
            long = "process-dir",
            env = "WARDEN_SHIM_PROCESS_DIR",
            help = "Directory holding the staged unit and runtime config. Defaults to the shim's own directory."
        )]
        process_dir: Option<PathBuf>,
    },
    /// Remove the registration created by `install`.
    Uninstall {
        #[arg(long = "process-dir", env = "WARDEN_SHIM_PROCESS_DIR")]
        process_dir: Option<PathBuf>,
    },
    /// `warden-shim <executable> [args...]` runs and supervises one process.
    #[command(external_subcommand)]
    Pipe(Vec<String>),
}
