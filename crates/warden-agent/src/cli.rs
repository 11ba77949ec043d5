use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use warden_core::{AgentDirectories, DEFAULT_BASE_DIR};
use warden_service::{
    SystemdServiceControlConfig, DEFAULT_AGENT_UNIT, DEFAULT_RUNTIME_UNIT_DIR, DEFAULT_SYSTEMCTL,
    DEFAULT_UNIT_DIR,
};
use warden_supervisor::{JobSupervisorConfig, DEFAULT_HOST_ADDRESS, DEFAULT_JOB_FAILURES_PORT};

#[derive(Debug, Parser)]
#[command(
    name = "warden-agent",
    about = "Supervises the job processes placed on this machine",
    version
)]
pub struct AgentCli {
    #[command(flatten)]
    pub settings: AgentSettings,

    #[command(subcommand)]
    pub command: AgentCommand,
}

#[derive(Debug, Clone, Args)]
pub struct AgentSettings {
    #[arg(
        long = "base-dir",
        env = "WARDEN_BASE_DIR",
        default_value = DEFAULT_BASE_DIR,
        global = true,
        help = "Agent base directory holding jobs, logs, binaries and the stopped marker"
    )]
    pub base_dir: PathBuf,

    #[arg(
        long = "job-failures-port",
        env = "WARDEN_JOB_FAILURES_PORT",
        default_value_t = DEFAULT_JOB_FAILURES_PORT,
        global = true,
        help = "Local port the failure listener binds and supervised processes report to"
    )]
    pub job_failures_port: u16,

    #[arg(
        long = "host-address",
        env = "WARDEN_HOST_ADDRESS",
        default_value = DEFAULT_HOST_ADDRESS,
        global = true,
        help = "Address advertised to supervised processes"
    )]
    pub host_address: String,

    #[arg(
        long = "unit-dir",
        env = "WARDEN_UNIT_DIR",
        default_value = DEFAULT_UNIT_DIR,
        global = true
    )]
    pub unit_dir: PathBuf,

    #[arg(
        long = "runtime-unit-dir",
        env = "WARDEN_RUNTIME_UNIT_DIR",
        default_value = DEFAULT_RUNTIME_UNIT_DIR,
        global = true,
        help = "Volatile unit directory used for unmonitor drop-ins"
    )]
    pub runtime_unit_dir: PathBuf,

    #[arg(
        long = "agent-unit",
        env = "WARDEN_AGENT_UNIT",
        default_value = DEFAULT_AGENT_UNIT,
        global = true,
        help = "Unit of the agent itself; start disables its boot-time auto-start"
    )]
    pub agent_unit: String,

    #[arg(
        long = "systemctl",
        env = "WARDEN_SYSTEMCTL",
        default_value = DEFAULT_SYSTEMCTL,
        global = true
    )]
    pub systemctl: String,
}

impl AgentSettings {
    pub fn supervisor_config(&self) -> JobSupervisorConfig {
        JobSupervisorConfig {
            directories: AgentDirectories::new(&self.base_dir),
            job_failures_port: self.job_failures_port,
            host_address: self.host_address.clone(),
            unit_dir: self.unit_dir.clone(),
            systemctl: self.systemctl.clone(),
        }
    }

    pub fn service_control_config(&self) -> SystemdServiceControlConfig {
        SystemdServiceControlConfig {
            unit_dir: self.unit_dir.clone(),
            runtime_unit_dir: self.runtime_unit_dir.clone(),
            agent_unit: self.agent_unit.clone(),
            systemctl: self.systemctl.clone(),
            ..SystemdServiceControlConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum AgentCommand {
    /// Install one service per process in a job manifest.
    AddJob {
        #[arg(long = "job-name")]
        job_name: String,
        #[arg(long = "job-index", default_value_t = 0)]
        job_index: u32,
        #[arg(long = "config-path")]
        config_path: PathBuf,
    },
    /// Start every owned service and resume failure alerts.
    Start,
    Stop,
    StopAndWait,
    /// Silence failure alerts, including a running `monitor`, and stop systemd from restarting owned services.
    Unmonitor,
    Reload,
    /// Delete every owned service registration.
    RemoveAllJobs,
    Status {
        #[arg(long)]
        json: bool,
    },
    Processes {
        #[arg(long)]
        json: bool,
    },
    /// Run the failure listener until interrupted, printing one JSON alert per line.
    Monitor,
}
