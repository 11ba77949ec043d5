use anyhow::Result;

use crate::service_state::ServiceStatus;

/// OS service-control capability.
///
/// Every bulk operation takes the service names it applies to; callers obtain
/// them from [`ServiceControl::enumerate_owned`] rather than a local list.
pub trait ServiceControl: Send + Sync {
    /// Names of the installed services carrying this agent's ownership tag.
    fn enumerate_owned(&self) -> Result<Vec<String>>;
    fn start(&self, services: &[String]) -> Result<()>;
    /// Returns once the manager reports every service stopped or its stop timeout elapsed.
    fn stop(&self, services: &[String]) -> Result<()>;
    fn query(&self, services: &[String]) -> Result<Vec<ServiceStatus>>;
    fn delete(&self, services: &[String]) -> Result<()>;
    /// Toggles boot-time start of the agent's own service.
    fn set_agent_auto_start(&self, enabled: bool) -> Result<()>;
    /// Stops the manager from restarting the services without stopping or deleting them.
    fn set_unmonitored(&self, services: &[String]) -> Result<()>;
}
