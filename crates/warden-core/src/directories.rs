use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_DIR: &str = "/var/vcap";

/// Fixed directory layout under the agent base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDirectories {
    base_dir: PathBuf,
}

impl AgentDirectories {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        self.base_dir.as_path()
    }

    /// Root for per-job, per-process log directories.
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("sys").join("log")
    }

    /// Where the agent keeps its own binaries, including the shim master copy.
    pub fn bin_dir(&self) -> PathBuf {
        self.base_dir.join("bosh").join("bin")
    }

    /// Supervision bookkeeping such as the stopped marker.
    pub fn monit_dir(&self) -> PathBuf {
        self.base_dir.join("monit")
    }
}

impl Default for AgentDirectories {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}
