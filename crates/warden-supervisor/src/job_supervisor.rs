use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use warden_core::{AgentDirectories, CommandRunner, FileSystem};
use warden_jobs::{
    notify_endpoint_for_port, parse_job_manifest, translate, Process, TranslationContext,
};
use warden_service::{
    render_systemd_unit, ServiceControl, ShimRuntimeConfig, DEFAULT_SYSTEMCTL, DEFAULT_UNIT_DIR,
    SHIM_EXECUTABLE_FILE_NAME, SHIM_RUNTIME_CONFIG_FILE_NAME, SHIM_UNIT_FILE_NAME,
};

use crate::error::JobSupervisorError;
use crate::failure_listener::{
    bind_job_failure_listener, job_failure_listener_addr, JobFailureHandler,
};
use crate::supervision_state::{AtomicSupervisionState, SupervisionState};

pub const DEFAULT_JOB_FAILURES_PORT: u16 = 2825;
pub const DEFAULT_HOST_ADDRESS: &str = "127.0.0.1";
pub const STOPPED_MARKER_FILE_NAME: &str = "stopped";
pub const UNMONITORED_MARKER_FILE_NAME: &str = "unmonitored";
const SHIM_INSTALL_SUBCOMMAND: &str = "install";

/// Aggregate health of every owned service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Failing,
    Stopped,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Failing => "failing",
            JobStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSupervisorConfig {
    pub directories: AgentDirectories,
    pub job_failures_port: u16,
    /// Address advertised to supervised processes through `__NOTIFY_HOST`.
    pub host_address: String,
    /// Written into each staged shim runtime config.
    pub unit_dir: PathBuf,
    pub systemctl: String,
}

impl Default for JobSupervisorConfig {
    fn default() -> Self {
        Self {
            directories: AgentDirectories::default(),
            job_failures_port: DEFAULT_JOB_FAILURES_PORT,
            host_address: DEFAULT_HOST_ADDRESS.to_string(),
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            systemctl: DEFAULT_SYSTEMCTL.to_string(),
        }
    }
}

/// Installs, drives and monitors the services backing the jobs on this machine.
///
/// Owned services are always rediscovered through
/// [`ServiceControl::enumerate_owned`], so a fresh instance picks up services
/// installed by an earlier agent process.
pub struct JobSupervisor {
    config: JobSupervisorConfig,
    service_control: Arc<dyn ServiceControl>,
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CommandRunner>,
    supervision: Arc<AtomicSupervisionState>,
}

impl JobSupervisor {
    pub fn new(
        config: JobSupervisorConfig,
        service_control: Arc<dyn ServiceControl>,
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            service_control,
            fs,
            runner,
            supervision: Arc::new(AtomicSupervisionState::default()),
        }
    }

    pub fn config(&self) -> &JobSupervisorConfig {
        &self.config
    }

    /// Unmonitored when this instance or any other one over the same base dir has unmonitored.
    pub fn supervision_state(&self) -> SupervisionState {
        if self.fs.file_exists(&self.unmonitored_marker_path()) {
            return SupervisionState::Unmonitored;
        }
        self.supervision.load()
    }

    pub fn stopped_marker_path(&self) -> PathBuf {
        self.config
            .directories
            .monit_dir()
            .join(STOPPED_MARKER_FILE_NAME)
    }

    pub fn unmonitored_marker_path(&self) -> PathBuf {
        self.config
            .directories
            .monit_dir()
            .join(UNMONITORED_MARKER_FILE_NAME)
    }

    /// Installs one service per process in the manifest at `config_path`.
    ///
    /// An empty manifest installs nothing. The first failing process aborts the
    /// call; processes installed before it stay installed.
    pub fn add_job(
        &self,
        job_name: &str,
        job_index: u32,
        config_path: &Path,
    ) -> Result<(), JobSupervisorError> {
        let raw = self.fs.read_file(config_path).map_err(|source| {
            JobSupervisorError::filesystem(format!("reading manifest for job '{job_name}'"), source)
        })?;
        if raw.is_empty() {
            debug!(job = job_name, "empty job manifest, nothing to install");
            return Ok(());
        }

        let manifest = parse_job_manifest(&raw).map_err(|source| JobSupervisorError::Manifest {
            job: job_name.to_string(),
            source,
        })?;
        let job_dir = config_path.parent().ok_or_else(|| {
            JobSupervisorError::filesystem(
                format!("resolving job directory for job '{job_name}'"),
                anyhow!("manifest path {} has no parent", config_path.display()),
            )
        })?;

        for process in &manifest.processes {
            self.install_process(job_name, job_dir, process)?;
        }
        info!(
            job = job_name,
            index = job_index,
            processes = manifest.processes.len(),
            "job installed"
        );
        Ok(())
    }

    fn install_process(
        &self,
        job_name: &str,
        job_dir: &Path,
        process: &Process,
    ) -> Result<(), JobSupervisorError> {
        let name = process.name.as_str();
        let log_dir = self.config.directories.logs_dir().join(job_name).join(name);
        self.fs.mkdir_all(&log_dir).map_err(|source| {
            JobSupervisorError::filesystem(format!("creating log directory for process '{name}'"), source)
        })?;

        let process_dir = job_dir.join(name);
        let shim_path = process_dir.join(SHIM_EXECUTABLE_FILE_NAME);
        let context = TranslationContext::new(
            &log_dir,
            notify_endpoint_for_port(self.config.job_failures_port),
            self.config.host_address.as_str(),
        )
        .with_shim_executable(&shim_path);
        let descriptor = translate(process, &context);

        let runtime_config =
            ShimRuntimeConfig::new(name, &self.config.unit_dir, &self.config.systemctl)
                .render()
                .map_err(|source| {
                    JobSupervisorError::filesystem(
                        format!("rendering shim runtime config for process '{name}'"),
                        source,
                    )
                })?;

        let stage = || -> anyhow::Result<()> {
            self.fs.mkdir_all(&process_dir)?;
            self.fs.write_file_string(
                &process_dir.join(SHIM_UNIT_FILE_NAME),
                &render_systemd_unit(&descriptor),
            )?;
            self.fs.write_file_string(
                &process_dir.join(SHIM_RUNTIME_CONFIG_FILE_NAME),
                &runtime_config,
            )?;
            self.fs.copy_file(
                &self.config.directories.bin_dir().join(SHIM_EXECUTABLE_FILE_NAME),
                &shim_path,
            )?;
            Ok(())
        };
        stage().map_err(|source| {
            JobSupervisorError::filesystem(format!("staging service files for process '{name}'"), source)
        })?;

        let shim = shim_path.display().to_string();
        self.runner
            .run_command(&shim, &[SHIM_INSTALL_SUBCOMMAND])
            .map_err(|source| {
                JobSupervisorError::service_control(
                    format!("installing service for process '{name}'"),
                    source,
                )
            })?;
        debug!(job = job_name, process = name, "process service installed");
        Ok(())
    }

    fn owned_services(&self, operation: &str) -> Result<Vec<String>, JobSupervisorError> {
        self.service_control.enumerate_owned().map_err(|source| {
            JobSupervisorError::service_control(
                format!("enumerating owned services to {operation}"),
                source,
            )
        })
    }

    /// Starts every owned service and resumes failure dispatch.
    pub fn start(&self) -> Result<(), JobSupervisorError> {
        if let Err(auto_start_error) = self.service_control.set_agent_auto_start(false) {
            warn!(
                error = %format!("{auto_start_error:#}"),
                "failed to disable agent auto-start"
            );
        }
        let services = self.owned_services("start")?;
        self.service_control.start(&services).map_err(|source| {
            JobSupervisorError::service_control("starting owned services", source)
        })?;
        self.fs
            .remove_all(&self.stopped_marker_path())
            .map_err(|source| JobSupervisorError::filesystem("removing stopped marker", source))?;
        self.fs
            .remove_all(&self.unmonitored_marker_path())
            .map_err(|source| {
                JobSupervisorError::filesystem("removing unmonitored marker", source)
            })?;
        self.supervision.store(SupervisionState::Monitored);
        info!(services = services.len(), "jobs started");
        Ok(())
    }

    /// Stops every owned service and records the stopped marker.
    pub fn stop(&self) -> Result<(), JobSupervisorError> {
        let services = self.owned_services("stop")?;
        self.service_control.stop(&services).map_err(|source| {
            JobSupervisorError::service_control("stopping owned services", source)
        })?;
        let marker = self.stopped_marker_path();
        let write_marker = || -> anyhow::Result<()> {
            self.fs.mkdir_all(&self.config.directories.monit_dir())?;
            self.fs.write_file(&marker, &[])
        };
        write_marker()
            .map_err(|source| JobSupervisorError::filesystem("writing stopped marker", source))?;
        info!(services = services.len(), "jobs stopped");
        Ok(())
    }

    /// Same as [`JobSupervisor::stop`]; the native stop call already blocks.
    pub fn stop_and_wait(&self) -> Result<(), JobSupervisorError> {
        self.stop()
    }

    /// Silences failure dispatch, then asks the service manager to stop restarting owned services.
    pub fn unmonitor(&self) -> Result<(), JobSupervisorError> {
        self.supervision.store(SupervisionState::Unmonitored);
        let marker = self.unmonitored_marker_path();
        let write_marker = || -> anyhow::Result<()> {
            self.fs.mkdir_all(&self.config.directories.monit_dir())?;
            self.fs.write_file(&marker, &[])
        };
        write_marker().map_err(|source| {
            JobSupervisorError::filesystem("writing unmonitored marker", source)
        })?;
        let services = self.owned_services("unmonitor")?;
        self.service_control
            .set_unmonitored(&services)
            .map_err(|source| {
                JobSupervisorError::service_control("unmonitoring owned services", source)
            })?;
        info!(services = services.len(), "jobs unmonitored");
        Ok(())
    }

    pub fn status(&self) -> JobStatus {
        if self.fs.file_exists(&self.stopped_marker_path()) {
            return JobStatus::Stopped;
        }
        let services = match self.owned_services("query status") {
            Ok(services) => services,
            Err(error) => {
                warn!(%error, "job status unavailable");
                return JobStatus::Failing;
            }
        };
        if services.is_empty() {
            return JobStatus::Running;
        }
        match self.service_control.query(&services) {
            Ok(statuses) if statuses.iter().all(|status| status.state.is_running()) => {
                JobStatus::Running
            }
            Ok(_) => JobStatus::Failing,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "querying owned services failed");
                JobStatus::Failing
            }
        }
    }

    pub fn processes(&self) -> Result<Vec<ProcessInfo>, JobSupervisorError> {
        let services = self.owned_services("list processes")?;
        let statuses = self.service_control.query(&services).map_err(|source| {
            JobSupervisorError::service_control("querying owned services", source)
        })?;
        Ok(statuses
            .into_iter()
            .map(|status| ProcessInfo {
                name: status.name,
                state: status.state.as_str().to_string(),
            })
            .collect())
    }

    /// Deletes every owned service registration. Staged files stay on disk.
    pub fn remove_all_jobs(&self) -> Result<(), JobSupervisorError> {
        let services = self.owned_services("remove jobs")?;
        self.service_control.delete(&services).map_err(|source| {
            JobSupervisorError::service_control("deleting owned services", source)
        })?;
        info!(services = services.len(), "jobs removed");
        Ok(())
    }

    /// Services are re-materialized through [`JobSupervisor::add_job`]; nothing to reload.
    pub fn reload(&self) -> Result<(), JobSupervisorError> {
        Ok(())
    }

    /// Runs the failure listener on the configured port until `shutdown` fires.
    pub async fn monitor_job_failures(
        &self,
        handler: JobFailureHandler,
        shutdown: oneshot::Receiver<()>,
    ) -> Result<(), JobSupervisorError> {
        let addr = job_failure_listener_addr(self.config.job_failures_port);
        let listener = bind_job_failure_listener(addr, Arc::clone(&self.supervision), handler)
            .await?
            .with_unmonitored_marker(Arc::clone(&self.fs), self.unmonitored_marker_path());
        listener.serve(shutdown).await
    }

    pub fn health_recorder(&self, status: &str) {
        debug!(status, "health recorder invoked");
    }
}
