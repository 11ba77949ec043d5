use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use warden_core::{CommandRunner, FileSystem};
use warden_jobs::SERVICE_OWNERSHIP_TAG;

use crate::control::ServiceControl;
use crate::service_state::{ServiceState, ServiceStatus};
use crate::shim_runtime::{DEFAULT_SYSTEMCTL, DEFAULT_UNIT_DIR};
use crate::systemd_unit::{parse_unit_description, systemd_unit_name, SYSTEMD_UNIT_SUFFIX};

pub const DEFAULT_RUNTIME_UNIT_DIR: &str = "/run/systemd/system";
pub const DEFAULT_AGENT_UNIT: &str = "warden-agent.service";
const UNMONITORED_DROP_IN_FILE_NAME: &str = "unmonitored.conf";
const UNMONITORED_DROP_IN_BODY: &str = "[Service]\nRestart=no\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemdServiceControlConfig {
    /// Persistent unit directory the shim installs into.
    pub unit_dir: PathBuf,
    /// Volatile directory for drop-ins that must not survive a reboot.
    pub runtime_unit_dir: PathBuf,
    pub agent_unit: String,
    pub systemctl: String,
    pub ownership_tag: String,
}

impl Default for SystemdServiceControlConfig {
    fn default() -> Self {
        Self {
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            runtime_unit_dir: PathBuf::from(DEFAULT_RUNTIME_UNIT_DIR),
            agent_unit: DEFAULT_AGENT_UNIT.to_string(),
            systemctl: DEFAULT_SYSTEMCTL.to_string(),
            ownership_tag: SERVICE_OWNERSHIP_TAG.to_string(),
        }
    }
}

/// [`ServiceControl`] driving systemd through `systemctl`.
pub struct SystemdServiceControl {
    config: SystemdServiceControlConfig,
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CommandRunner>,
}

impl SystemdServiceControl {
    pub fn new(
        config: SystemdServiceControlConfig,
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self { config, fs, runner }
    }

    pub fn config(&self) -> &SystemdServiceControlConfig {
        &self.config
    }

    fn systemctl(&self, verb: &str, services: &[String]) -> Result<String> {
        let units: Vec<String> = services
            .iter()
            .map(|service| systemd_unit_name(service))
            .collect();
        let mut args = vec![verb];
        args.extend(units.iter().map(String::as_str));
        let output = self
            .runner
            .run_command(&self.config.systemctl, &args)
            .with_context(|| format!("systemctl {verb} failed for {}", units.join(",")))?;
        Ok(output.stdout)
    }

    fn daemon_reload(&self) -> Result<()> {
        self.runner
            .run_command(&self.config.systemctl, &["daemon-reload"])
            .context("systemctl daemon-reload failed")?;
        Ok(())
    }

    fn unmonitored_drop_in_dir(&self, service: &str) -> PathBuf {
        self.config
            .runtime_unit_dir
            .join(format!("{}.d", systemd_unit_name(service)))
    }

    /// Removes unmonitored drop-ins, returning whether any existed.
    fn clear_unmonitored(&self, services: &[String]) -> Result<bool> {
        let mut removed_any = false;
        for service in services {
            let drop_in = self
                .unmonitored_drop_in_dir(service)
                .join(UNMONITORED_DROP_IN_FILE_NAME);
            if self.fs.file_exists(&drop_in) {
                self.fs.remove_all(&drop_in)?;
                removed_any = true;
            }
        }
        Ok(removed_any)
    }
}

impl ServiceControl for SystemdServiceControl {
    fn enumerate_owned(&self) -> Result<Vec<String>> {
        let mut owned = Vec::new();
        let names = self.fs.read_dir_names(&self.config.unit_dir).with_context(|| {
            format!("failed to enumerate units in {}", self.config.unit_dir.display())
        })?;
        for file_name in names {
            let Some(service) = file_name.strip_suffix(SYSTEMD_UNIT_SUFFIX) else {
                continue;
            };
            let path = self.config.unit_dir.join(&file_name);
            let unit = match self.fs.read_file_string(&path) {
                Ok(unit) => unit,
                Err(error) => {
                    warn!(unit = %path.display(), %error, "skipping unreadable unit file");
                    continue;
                }
            };
            if parse_unit_description(&unit) == Some(self.config.ownership_tag.as_str()) {
                owned.push(service.to_string());
            }
        }
        debug!(count = owned.len(), "enumerated owned services");
        Ok(owned)
    }

    fn start(&self, services: &[String]) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }
        if self.clear_unmonitored(services)? {
            self.daemon_reload()?;
        }
        self.systemctl("start", services)?;
        Ok(())
    }

    fn stop(&self, services: &[String]) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }
        self.systemctl("stop", services)?;
        Ok(())
    }

    fn query(&self, services: &[String]) -> Result<Vec<ServiceStatus>> {
        if services.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec![
            "show".to_string(),
            "--property=Id,ActiveState,FreezerState".to_string(),
        ];
        args.extend(services.iter().map(|service| systemd_unit_name(service)));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .runner
            .run_command(&self.config.systemctl, &args)
            .context("systemctl show failed")?;

        let records = parse_systemctl_show(&output.stdout);
        Ok(services
            .iter()
            .map(|service| {
                let state = records
                    .get(&systemd_unit_name(service))
                    .map(|record| {
                        service_state_from_systemd(
                            record.get("ActiveState").map(String::as_str).unwrap_or_default(),
                            record.get("FreezerState").map(String::as_str).unwrap_or_default(),
                        )
                    })
                    .unwrap_or(ServiceState::Stopped);
                ServiceStatus {
                    name: service.clone(),
                    state,
                }
            })
            .collect())
    }

    fn delete(&self, services: &[String]) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }
        if let Err(error) = self.systemctl("disable", services) {
            warn!(%error, "ignoring disable failure while deleting services");
        }
        for service in services {
            let unit_name = systemd_unit_name(service);
            let unit_path = self.config.unit_dir.join(&unit_name);
            self.fs
                .remove_all(&unit_path)
                .with_context(|| format!("failed to delete service '{service}'"))?;
            self.fs
                .remove_all(&self.config.unit_dir.join(format!("{unit_name}.d")))?;
            self.fs.remove_all(&self.unmonitored_drop_in_dir(service))?;
        }
        self.daemon_reload()
    }

    fn set_agent_auto_start(&self, enabled: bool) -> Result<()> {
        let verb = if enabled { "enable" } else { "disable" };
        self.systemctl(verb, std::slice::from_ref(&self.config.agent_unit))?;
        Ok(())
    }

    fn set_unmonitored(&self, services: &[String]) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }
        for service in services {
            let drop_in_dir = self.unmonitored_drop_in_dir(service);
            self.fs.mkdir_all(&drop_in_dir)?;
            self.fs
                .write_file_string(
                    &drop_in_dir.join(UNMONITORED_DROP_IN_FILE_NAME),
                    UNMONITORED_DROP_IN_BODY,
                )
                .with_context(|| format!("failed to unmonitor service '{service}'"))?;
        }
        self.daemon_reload()
    }
}

/// Maps systemd `ActiveState`/`FreezerState` onto [`ServiceState`].
pub fn service_state_from_systemd(active_state: &str, freezer_state: &str) -> ServiceState {
    match freezer_state.trim() {
        "freezing" => return ServiceState::PausePending,
        "frozen" => return ServiceState::Paused,
        "thawing" => return ServiceState::ContinuePending,
        _ => {}
    }
    match active_state.trim() {
        "active" => ServiceState::Running,
        "activating" => ServiceState::StartPending,
        "deactivating" => ServiceState::StopPending,
        "reloading" => ServiceState::ContinuePending,
        _ => ServiceState::Stopped,
    }
}

/// Splits `systemctl show` output into per-unit property maps keyed by `Id`.
fn parse_systemctl_show(raw: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut records = BTreeMap::new();
    for block in raw.split("\n\n") {
        let properties: BTreeMap<String, String> = block
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();
        if let Some(id) = properties.get("Id").cloned() {
            records.insert(id, properties);
        }
    }
    records
}
