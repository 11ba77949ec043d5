use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use warden_core::log_rotation::{DEFAULT_LOG_ROTATION_MAX_BYTES, DEFAULT_LOG_ROTATION_MAX_FILES};

use crate::manifest::Process;

/// Description value stamped on every service this agent installs.
pub const SERVICE_OWNERSHIP_TAG: &str = "warden";
pub const DEFAULT_SHIM_EXECUTABLE: &str = "/var/vcap/bosh/bin/warden-shim";

pub const NOTIFY_PROCESS_NAME_ENV: &str = "__NOTIFY_PROCESS_NAME";
pub const NOTIFY_LOG_DIR_ENV: &str = "__NOTIFY_LOG_DIR";
pub const NOTIFY_HTTP_ENV: &str = "__NOTIFY_HTTP";
pub const NOTIFY_HOST_ENV: &str = "__NOTIFY_HOST";
pub const RESERVED_ENV_NAMES: [&str; 4] = [
    NOTIFY_PROCESS_NAME_ENV,
    NOTIFY_LOG_DIR_ENV,
    NOTIFY_HTTP_ENV,
    NOTIFY_HOST_ENV,
];

const LOG_MODE_ROLL_BY_SIZE: &str = "roll-by-size";
const FAILURE_RESTART_DELAY_SECONDS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMode {
    pub mode: String,
    pub size_threshold: u64,
    pub keep_files: usize,
}

impl Default for LogMode {
    fn default() -> Self {
        Self {
            mode: LOG_MODE_ROLL_BY_SIZE.to_string(),
            size_threshold: DEFAULT_LOG_ROTATION_MAX_BYTES,
            keep_files: DEFAULT_LOG_ROTATION_MAX_FILES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    Restart,
    None,
}

impl FailureAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureAction::Restart => "restart",
            FailureAction::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePolicy {
    pub action: FailureAction,
    pub delay_seconds: u64,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            action: FailureAction::Restart,
            delay_seconds: FAILURE_RESTART_DELAY_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    pub name: String,
    pub value: String,
}

impl EnvironmentEntry {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Installable form of a [`Process`].
///
/// When `start_arguments` is non-empty the native manager must launch with it
/// and ignore `arguments`; the two are never populated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub executable: String,
    pub arguments: Vec<String>,
    pub start_arguments: Vec<String>,
    pub stop_executable: Option<String>,
    pub stop_arguments: Vec<String>,
    pub log_path: String,
    pub log_mode: LogMode,
    pub on_failure: FailurePolicy,
    pub env: Vec<EnvironmentEntry>,
    pub stop_parent_process_first: bool,
}

impl ServiceDescriptor {
    /// Arguments the service is launched with, whichever field holds them.
    pub fn launch_arguments(&self) -> &[String] {
        if self.start_arguments.is_empty() {
            &self.arguments
        } else {
            &self.start_arguments
        }
    }

    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value.as_str())
    }
}

/// Runtime values a process is translated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationContext {
    pub log_path: PathBuf,
    pub notify_endpoint: String,
    pub host_address: String,
    pub shim_executable: PathBuf,
}

impl TranslationContext {
    pub fn new(
        log_path: impl Into<PathBuf>,
        notify_endpoint: impl Into<String>,
        host_address: impl Into<String>,
    ) -> Self {
        Self {
            log_path: log_path.into(),
            notify_endpoint: notify_endpoint.into(),
            host_address: host_address.into(),
            shim_executable: PathBuf::from(DEFAULT_SHIM_EXECUTABLE),
        }
    }

    pub fn with_shim_executable(mut self, shim_executable: impl Into<PathBuf>) -> Self {
        self.shim_executable = shim_executable.into();
        self
    }
}

/// `http://localhost:<port>`, the endpoint supervised processes report failures to.
pub fn notify_endpoint_for_port(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Translates one process into its service descriptor.
///
/// Caller environment is emitted in key order followed by the four reserved
/// `__NOTIFY_*` entries. A caller entry that reuses a reserved name is dropped.
pub fn translate(process: &Process, context: &TranslationContext) -> ServiceDescriptor {
    let log_path = context.log_path.display().to_string();
    let start_invocation = process.start_invocation();

    let mut arguments = Vec::new();
    let mut start_arguments = Vec::new();
    let mut stop_executable = None;
    let mut stop_arguments = Vec::new();
    match process.stop.as_ref() {
        Some(stop) if !stop.args.is_empty() => {
            start_arguments = start_invocation;
            stop_arguments = stop.args.clone();
            stop_executable = Some(stop_executable_or_process(&stop.executable, process));
        }
        Some(stop) => {
            arguments = start_invocation;
            stop_executable = Some(stop_executable_or_process(&stop.executable, process));
        }
        None => arguments = start_invocation,
    }

    let mut env: Vec<EnvironmentEntry> = process
        .env
        .iter()
        .filter(|(name, _)| !RESERVED_ENV_NAMES.contains(&name.as_str()))
        .map(|(name, value)| EnvironmentEntry::new(name, value.clone()))
        .collect();
    env.push(EnvironmentEntry::new(
        NOTIFY_PROCESS_NAME_ENV,
        process.name.clone(),
    ));
    env.push(EnvironmentEntry::new(NOTIFY_LOG_DIR_ENV, log_path.clone()));
    env.push(EnvironmentEntry::new(
        NOTIFY_HTTP_ENV,
        context.notify_endpoint.clone(),
    ));
    env.push(EnvironmentEntry::new(
        NOTIFY_HOST_ENV,
        context.host_address.clone(),
    ));

    ServiceDescriptor {
        id: process.name.clone(),
        name: process.name.clone(),
        description: SERVICE_OWNERSHIP_TAG.to_string(),
        executable: context.shim_executable.display().to_string(),
        arguments,
        start_arguments,
        stop_executable,
        stop_arguments,
        log_path,
        log_mode: LogMode::default(),
        on_failure: FailurePolicy::default(),
        env,
        stop_parent_process_first: false,
    }
}

// Never the shim: an explicit stop runs the user's own binary.
fn stop_executable_or_process(stop_executable: &str, process: &Process) -> String {
    if stop_executable.trim().is_empty() {
        process.executable.clone()
    } else {
        stop_executable.to_string()
    }
}
