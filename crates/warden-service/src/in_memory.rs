use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};

use crate::control::ServiceControl;
use crate::service_state::{ServiceState, ServiceStatus};

/// Operations of [`ServiceControl`], used to inject failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServiceOperation {
    EnumerateOwned,
    Start,
    Stop,
    Query,
    Delete,
    SetAgentAutoStart,
    SetUnmonitored,
}

#[derive(Debug, Clone, Copy)]
struct RegisteredService {
    state: ServiceState,
    unmonitored: bool,
}

#[derive(Debug)]
struct InMemoryState {
    services: BTreeMap<String, RegisteredService>,
    failures: BTreeMap<ServiceOperation, String>,
    calls: BTreeMap<ServiceOperation, usize>,
    agent_auto_start: bool,
}

/// Process-local [`ServiceControl`] used by tests and dry runs.
#[derive(Debug)]
pub struct InMemoryServiceControl {
    state: Mutex<InMemoryState>,
}

impl Default for InMemoryServiceControl {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryServiceControl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                services: BTreeMap::new(),
                failures: BTreeMap::new(),
                calls: BTreeMap::new(),
                agent_auto_start: true,
            }),
        }
    }

    /// Registers an owned, stopped service. Re-registering resets its state.
    pub fn register(&self, name: &str) -> Result<()> {
        self.register_with_state(name, ServiceState::Stopped)
    }

    pub fn register_with_state(&self, name: &str, state: ServiceState) -> Result<()> {
        self.lock()?.services.insert(
            name.to_string(),
            RegisteredService {
                state,
                unmonitored: false,
            },
        );
        Ok(())
    }

    pub fn set_service_state(&self, name: &str, state: ServiceState) -> Result<()> {
        let mut guard = self.lock()?;
        let service = guard
            .services
            .get_mut(name)
            .ok_or_else(|| anyhow!("service '{name}' is not registered"))?;
        service.state = state;
        Ok(())
    }

    /// Makes every later call of `operation` fail with `message`.
    pub fn fail(&self, operation: ServiceOperation, message: &str) -> Result<()> {
        self.lock()?.failures.insert(operation, message.to_string());
        Ok(())
    }

    pub fn recover(&self, operation: ServiceOperation) -> Result<()> {
        self.lock()?.failures.remove(&operation);
        Ok(())
    }

    pub fn call_count(&self, operation: ServiceOperation) -> Result<usize> {
        Ok(self.lock()?.calls.get(&operation).copied().unwrap_or(0))
    }

    pub fn service_state(&self, name: &str) -> Result<Option<ServiceState>> {
        Ok(self.lock()?.services.get(name).map(|service| service.state))
    }

    pub fn is_unmonitored(&self, name: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .services
            .get(name)
            .is_some_and(|service| service.unmonitored))
    }

    pub fn agent_auto_start(&self) -> Result<bool> {
        Ok(self.lock()?.agent_auto_start)
    }

    pub fn service_names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.services.keys().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, InMemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("in-memory service control state is poisoned"))
    }

    /// Counts the call and returns the guard unless a failure is injected.
    fn begin(&self, operation: ServiceOperation) -> Result<MutexGuard<'_, InMemoryState>> {
        let mut guard = self.lock()?;
        *guard.calls.entry(operation).or_insert(0) += 1;
        if let Some(message) = guard.failures.get(&operation) {
            bail!("{message}");
        }
        Ok(guard)
    }
}

fn ensure_registered(state: &InMemoryState, services: &[String]) -> Result<()> {
    for name in services {
        if !state.services.contains_key(name) {
            bail!("service '{name}' does not exist");
        }
    }
    Ok(())
}

fn update_all(
    state: &mut InMemoryState,
    services: &[String],
    apply: impl Fn(&mut RegisteredService),
) -> Result<()> {
    ensure_registered(state, services)?;
    for name in services {
        if let Some(service) = state.services.get_mut(name) {
            apply(service);
        }
    }
    Ok(())
}

impl ServiceControl for InMemoryServiceControl {
    fn enumerate_owned(&self) -> Result<Vec<String>> {
        let guard = self.begin(ServiceOperation::EnumerateOwned)?;
        Ok(guard.services.keys().cloned().collect())
    }

    fn start(&self, services: &[String]) -> Result<()> {
        let mut guard = self.begin(ServiceOperation::Start)?;
        update_all(&mut guard, services, |service| {
            service.state = ServiceState::Running;
            service.unmonitored = false;
        })
    }

    fn stop(&self, services: &[String]) -> Result<()> {
        let mut guard = self.begin(ServiceOperation::Stop)?;
        update_all(&mut guard, services, |service| {
            service.state = ServiceState::Stopped;
        })
    }

    fn query(&self, services: &[String]) -> Result<Vec<ServiceStatus>> {
        let guard = self.begin(ServiceOperation::Query)?;
        services
            .iter()
            .map(|name| {
                guard
                    .services
                    .get(name)
                    .map(|service| ServiceStatus {
                        name: name.clone(),
                        state: service.state,
                    })
                    .ok_or_else(|| anyhow!("service '{name}' does not exist"))
            })
            .collect()
    }

    fn delete(&self, services: &[String]) -> Result<()> {
        let mut guard = self.begin(ServiceOperation::Delete)?;
        ensure_registered(&guard, services)?;
        for name in services {
            guard.services.remove(name);
        }
        Ok(())
    }

    fn set_agent_auto_start(&self, enabled: bool) -> Result<()> {
        let mut guard = self.begin(ServiceOperation::SetAgentAutoStart)?;
        guard.agent_auto_start = enabled;
        Ok(())
    }

    fn set_unmonitored(&self, services: &[String]) -> Result<()> {
        let mut guard = self.begin(ServiceOperation::SetUnmonitored)?;
        update_all(&mut guard, services, |service| {
            service.unmonitored = true;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn functional_in_memory_control_tracks_service_lifecycle() {
        let control = InMemoryServiceControl::new();
        control.register("nats").expect("register");
        control.register("worker").expect("register");

        let owned = control.enumerate_owned().expect("enumerate");
        assert_eq!(owned, names(&["nats", "worker"]));

        control.start(&owned).expect("start");
        assert!(control
            .query(&owned)
            .expect("query")
            .iter()
            .all(|status| status.state.is_running()));

        control.set_unmonitored(&owned).expect("unmonitor");
        assert!(control.is_unmonitored("nats").expect("flag"));
        assert_eq!(
            control.service_state("nats").expect("state"),
            Some(ServiceState::Running)
        );

        control.stop(&owned).expect("stop");
        control.delete(&owned).expect("delete");
        assert!(control.service_names().expect("names").is_empty());
    }

    #[test]
    fn unit_injected_failures_are_counted_and_recoverable() {
        let control = InMemoryServiceControl::new();
        control.register("nats").expect("register");
        control
            .fail(ServiceOperation::Start, "access denied")
            .expect("inject");

        let error = control.start(&names(&["nats"])).expect_err("injected failure");
        assert_eq!(error.to_string(), "access denied");
        assert_eq!(
            control.service_state("nats").expect("state"),
            Some(ServiceState::Stopped)
        );

        control.recover(ServiceOperation::Start).expect("recover");
        control.start(&names(&["nats"])).expect("start");
        assert_eq!(control.call_count(ServiceOperation::Start).expect("count"), 2);
    }

    #[test]
    fn regression_unknown_service_is_rejected_without_partial_updates() {
        let control = InMemoryServiceControl::new();
        control.register("nats").expect("register");
        let error = control
            .start(&names(&["nats", "ghost"]))
            .expect_err("unknown service");
        assert!(error.to_string().contains("ghost"));
        assert_eq!(
            control.service_state("nats").expect("state"),
            Some(ServiceState::Stopped)
        );
    }

    #[test]
    fn unit_agent_auto_start_defaults_to_enabled() {
        let control = InMemoryServiceControl::default();
        assert!(control.agent_auto_start().expect("flag"));
        control.set_agent_auto_start(false).expect("disable");
        assert!(!control.agent_auto_start().expect("flag"));
    }
}
