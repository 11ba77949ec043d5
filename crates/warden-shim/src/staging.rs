use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use warden_core::{ExecCommandRunner, OsFileSystem};
use warden_service::{install_staged_service, uninstall_staged_service};

/// Explicit directory, or the directory the running shim binary was copied into.
pub fn resolve_process_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    let executable = std::env::current_exe().context("failed to resolve shim executable path")?;
    executable
        .parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("shim executable {} has no parent", executable.display()))
}

pub fn run_install(explicit: Option<&Path>) -> Result<()> {
    let process_dir = resolve_process_dir(explicit)?;
    let unit = install_staged_service(&OsFileSystem, &ExecCommandRunner::default(), &process_dir)?;
    info!(unit = %unit.display(), "shim install complete");
    println!("installed {}", unit.display());
    Ok(())
}

pub fn run_uninstall(explicit: Option<&Path>) -> Result<()> {
    let process_dir = resolve_process_dir(explicit)?;
    uninstall_staged_service(&OsFileSystem, &ExecCommandRunner::default(), &process_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_resolve_process_dir_prefers_explicit_path() {
        let dir = resolve_process_dir(Some(Path::new("/jobs/web/worker"))).expect("resolve");
        assert_eq!(dir, PathBuf::from("/jobs/web/worker"));
    }

    #[test]
    fn unit_resolve_process_dir_defaults_to_executable_parent() {
        let dir = resolve_process_dir(None).expect("resolve");
        let executable = std::env::current_exe().expect("current exe");
        assert_eq!(Some(dir.as_path()), executable.parent());
    }
}
