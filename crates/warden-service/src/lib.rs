//! Native service management for supervised job processes.
//!
//! Renders systemd units from [`warden_jobs::ServiceDescriptor`] values,
//! installs staged units through the shim, and exposes the
//! [`ServiceControl`] capability with systemd and in-memory backends.

pub mod control;
pub mod in_memory;
pub mod service_state;
pub mod shim_runtime;
pub mod systemd;
pub mod systemd_unit;

pub use control::ServiceControl;
pub use in_memory::{InMemoryServiceControl, ServiceOperation};
pub use service_state::{ServiceState, ServiceStatus};
pub use shim_runtime::{
    install_staged_service, load_shim_runtime_config, uninstall_staged_service,
    ShimRuntimeConfig, DEFAULT_SYSTEMCTL, DEFAULT_UNIT_DIR, SHIM_EXECUTABLE_FILE_NAME,
    SHIM_RUNTIME_CONFIG_FILE_NAME, SHIM_UNIT_FILE_NAME,
};
pub use systemd::{
    service_state_from_systemd, SystemdServiceControl, SystemdServiceControlConfig,
    DEFAULT_AGENT_UNIT, DEFAULT_RUNTIME_UNIT_DIR,
};
pub use systemd_unit::{parse_unit_description, render_systemd_unit, systemd_unit_name};
