//! Commands
//!
//! An execute resource runs its `command` through an interpreter (`sh` by
//! default) on every evaluation that passes its guards. Success is an exit
//! code in the resource's `returns` set.

use anyhow::Result;
use declarative::{
    Action, ApplyResult, CommandRunner, CommandSpec, Provider, Resource, ResourceKind,
    ResourceState, RunContext,
};
use std::sync::Arc;

pub struct ExecuteProvider {
    runner: Arc<dyn CommandRunner>,
}

impl ExecuteProvider {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn command_spec(resource: &Resource) -> CommandSpec {
        let command = resource.attribute("command").unwrap_or(resource.name());
        let interpreter = resource.attribute("interpreter").unwrap_or("sh");

        let mut spec = CommandSpec::new(interpreter)
            .args(["-c", command])
            .sensitive(resource.flag("sensitive"));
        if let Some(cwd) = resource.attribute("cwd") {
            spec = spec.cwd(cwd);
        }
        for (key, value) in resource.prefixed("env.") {
            spec = spec.env(key, value);
        }
        spec
    }
}

impl Provider for ExecuteProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Execute
    }

    fn supported_actions(&self) -> &'static [Action] {
        &[Action::Run]
    }

    fn query_state(&self, _: &Resource, _: Action, _: &RunContext) -> Result<ResourceState> {
        Ok(ResourceState::Unknown)
    }

    fn apply_action(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ApplyResult> {
        if action != Action::Run {
            anyhow::bail!("execute does not support :{action}");
        }

        let spec = Self::command_spec(resource);
        // sensitive commands carry credentials; name the resource instead
        let shown = if resource.flag("sensitive") {
            resource.id.to_string()
        } else {
            format!("`{}`", spec.display())
        };
        let output = self.runner.run(&spec)?;
        let Some(code) = output.code else {
            anyhow::bail!("{shown} was killed by a signal");
        };

        if !resource.accepts_exit_code(code) {
            let expected: Vec<String> = resource.returns.iter().map(ToString::to_string).collect();
            anyhow::bail!(
                "{shown} returned {code}, expected one of [{}]: {}",
                expected.join(", "),
                output.stderr_str().trim()
            );
        }
        Ok(ApplyResult::Ran { exit_code: code })
    }
}
