use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use warden_core::{CommandRunner, FileSystem};

use crate::systemd_unit::systemd_unit_name;

const SHIM_RUNTIME_SCHEMA_VERSION: u32 = 1;
pub const SHIM_EXECUTABLE_FILE_NAME: &str = "warden-shim";
pub const SHIM_UNIT_FILE_NAME: &str = "warden-shim.service";
pub const SHIM_RUNTIME_CONFIG_FILE_NAME: &str = "warden-shim.runtime.json";
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";
pub const DEFAULT_SYSTEMCTL: &str = "systemctl";

fn shim_runtime_schema_version() -> u32 {
    SHIM_RUNTIME_SCHEMA_VERSION
}

fn default_systemctl() -> String {
    DEFAULT_SYSTEMCTL.to_string()
}

/// Staged next to the shim copy; tells `warden-shim install` what to register and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimRuntimeConfig {
    #[serde(default = "shim_runtime_schema_version")]
    pub schema_version: u32,
    pub service_name: String,
    pub unit_file: String,
    pub unit_dir: PathBuf,
    #[serde(default = "default_systemctl")]
    pub systemctl: String,
}

impl ShimRuntimeConfig {
    pub fn new(service_name: &str, unit_dir: &Path, systemctl: &str) -> Self {
        Self {
            schema_version: SHIM_RUNTIME_SCHEMA_VERSION,
            service_name: service_name.to_string(),
            unit_file: SHIM_UNIT_FILE_NAME.to_string(),
            unit_dir: unit_dir.to_path_buf(),
            systemctl: systemctl.to_string(),
        }
    }

    pub fn installed_unit_path(&self) -> PathBuf {
        self.unit_dir.join(systemd_unit_name(&self.service_name))
    }

    pub fn render(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize shim runtime config")
    }
}

pub fn load_shim_runtime_config(fs: &dyn FileSystem, process_dir: &Path) -> Result<ShimRuntimeConfig> {
    let path = process_dir.join(SHIM_RUNTIME_CONFIG_FILE_NAME);
    let raw = fs
        .read_file(&path)
        .with_context(|| format!("failed to read shim runtime config {}", path.display()))?;
    let config = serde_json::from_slice::<ShimRuntimeConfig>(&raw)
        .with_context(|| format!("failed to parse shim runtime config {}", path.display()))?;
    if config.schema_version != SHIM_RUNTIME_SCHEMA_VERSION {
        bail!(
            "unsupported shim runtime config schema version {} (expected {})",
            config.schema_version,
            SHIM_RUNTIME_SCHEMA_VERSION
        );
    }
    if config.service_name.trim().is_empty() {
        bail!("shim runtime config {} has an empty service_name", path.display());
    }
    Ok(config)
}

/// Registers the unit staged in `process_dir`. Re-running overwrites the registration.
pub fn install_staged_service(
    fs: &dyn FileSystem,
    runner: &dyn CommandRunner,
    process_dir: &Path,
) -> Result<PathBuf> {
    let config = load_shim_runtime_config(fs, process_dir)?;
    let staged_unit = process_dir.join(&config.unit_file);
    let unit = fs
        .read_file(&staged_unit)
        .with_context(|| format!("failed to read staged unit {}", staged_unit.display()))?;
    let installed_unit = config.installed_unit_path();
    fs.mkdir_all(&config.unit_dir)?;
    fs.write_file(&installed_unit, &unit)
        .with_context(|| format!("failed to write unit {}", installed_unit.display()))?;
    runner
        .run_command(&config.systemctl, &["daemon-reload"])
        .context("failed to reload systemd after install")?;
    info!(service = %config.service_name, unit = %installed_unit.display(), "installed service");
    Ok(installed_unit)
}

pub fn uninstall_staged_service(
    fs: &dyn FileSystem,
    runner: &dyn CommandRunner,
    process_dir: &Path,
) -> Result<()> {
    let config = load_shim_runtime_config(fs, process_dir)?;
    let installed_unit = config.installed_unit_path();
    fs.remove_all(&installed_unit)?;
    runner
        .run_command(&config.systemctl, &["daemon-reload"])
        .context("failed to reload systemd after uninstall")?;
    info!(service = %config.service_name, "uninstalled service");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use warden_core::{CommandOutput, OsFileSystem};

    use super::*;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run_command(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("{program} {}", args.join(" ")));
            Ok(CommandOutput::default())
        }
    }

    fn stage(process_dir: &Path, unit_dir: &Path) {
        let fs = OsFileSystem;
        let config = ShimRuntimeConfig::new("worker-1", unit_dir, "systemctl");
        fs.write_file_string(
            &process_dir.join(SHIM_RUNTIME_CONFIG_FILE_NAME),
            &config.render().expect("render config"),
        )
        .expect("write runtime config");
        fs.write_file_string(
            &process_dir.join(SHIM_UNIT_FILE_NAME),
            "[Unit]\nDescription=warden\n",
        )
        .expect("write unit");
    }

    #[test]
    fn functional_install_and_uninstall_staged_service_roundtrip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let process_dir = temp.path().join("jobs/web/worker-1");
        let unit_dir = temp.path().join("systemd");
        stage(&process_dir, &unit_dir);
        let runner = RecordingRunner::default();

        let installed =
            install_staged_service(&OsFileSystem, &runner, &process_dir).expect("install");
        assert_eq!(installed, unit_dir.join("worker-1.service"));
        assert_eq!(
            std::fs::read_to_string(&installed).expect("read unit"),
            "[Unit]\nDescription=warden\n"
        );

        install_staged_service(&OsFileSystem, &runner, &process_dir).expect("reinstall");
        uninstall_staged_service(&OsFileSystem, &runner, &process_dir).expect("uninstall");
        assert!(!installed.exists());
        assert_eq!(
            runner.calls.lock().expect("calls lock").as_slice(),
            ["systemctl daemon-reload"; 3]
        );
    }

    #[test]
    fn regression_load_shim_runtime_config_rejects_unknown_schema() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            temp.path().join(SHIM_RUNTIME_CONFIG_FILE_NAME),
            r#"{"schema_version":9,"service_name":"a","unit_file":"u","unit_dir":"/tmp"}"#,
        )
        .expect("write config");
        let error = load_shim_runtime_config(&OsFileSystem, temp.path()).expect_err("schema");
        assert!(error.to_string().contains("unsupported shim runtime config schema"));
    }
}
