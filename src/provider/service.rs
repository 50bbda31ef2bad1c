//! Services

use anyhow::Result;
use declarative::{
    Action, ApplyResult, Attributes, Provider, Resource, ResourceKind, ResourceState, RunContext,
    ServiceManager, ServiceSpec,
};
use std::sync::Arc;

/// Drives a service through the init system
///
/// `start`/`stop` converge on the running state and `enable`/`disable` on
/// the boot-time state; `restart` and `reload` always act.
pub struct ServiceProvider {
    services: Arc<dyn ServiceManager>,
}

impl ServiceProvider {
    pub fn new(services: Arc<dyn ServiceManager>) -> Self {
        Self { services }
    }
}

/// Build the init-system view of a service resource
pub fn service_spec(resource: &Resource) -> ServiceSpec {
    let command = |key: &str| resource.attribute(key).map(str::to_string);
    ServiceSpec {
        name: resource
            .attribute("service_name")
            .unwrap_or(resource.name())
            .to_string(),
        start_command: command("start_command"),
        stop_command: command("stop_command"),
        restart_command: command("restart_command"),
        status_command: command("status_command"),
        supports_status: resource.flag("supports_status"),
        supports_restart: resource.flag("supports_restart"),
    }
}

fn wanted(key: &str, value: bool) -> ResourceState {
    ResourceState::with_attributes(Attributes::from([(key.to_string(), value.to_string())]))
}

impl Provider for ServiceProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }

    fn supported_actions(&self) -> &'static [Action] {
        &[
            Action::Start,
            Action::Stop,
            Action::Restart,
            Action::Reload,
            Action::Enable,
            Action::Disable,
        ]
    }

    fn query_state(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ResourceState> {
        if matches!(action, Action::Restart | Action::Reload) {
            return Ok(ResourceState::Unknown);
        }
        let status = self.services.status(&service_spec(resource))?;
        Ok(ResourceState::with_attributes(Attributes::from([
            ("running".to_string(), status.running.to_string()),
            ("enabled".to_string(), status.enabled.to_string()),
        ])))
    }

    fn desired_state(&self, _: &Resource, action: Action, _: &RunContext) -> Result<ResourceState> {
        Ok(match action {
            Action::Start => wanted("running", true),
            Action::Stop => wanted("running", false),
            Action::Enable => wanted("enabled", true),
            Action::Disable => wanted("enabled", false),
            _ => ResourceState::Unknown,
        })
    }

    fn apply_action(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ApplyResult> {
        let spec = service_spec(resource);
        log::info!("{} service {}", action, spec.name);
        match action {
            Action::Start => self.services.start(&spec)?,
            Action::Stop => self.services.stop(&spec)?,
            Action::Restart => self.services.restart(&spec)?,
            Action::Reload => self.services.reload(&spec)?,
            Action::Enable => self.services.enable(&spec)?,
            Action::Disable => self.services.disable(&spec)?,
            other => anyhow::bail!("service does not support :{other}"),
        }
        Ok(ApplyResult::Modified)
    }
}
