//! System packages

use anyhow::Result;
use declarative::{
    Action, ApplyResult, Attributes, PackageManager, Provider, Resource, ResourceKind,
    ResourceState, RunContext,
};
use std::path::Path;
use std::sync::Arc;

/// Installs and removes packages through the platform's package manager
///
/// Attributes: `package_name` (defaults to the resource name), `version`
/// (exact installed version string), `source` (local package file).
pub struct PackageProvider {
    packages: Arc<dyn PackageManager>,
}

impl PackageProvider {
    pub fn new(packages: Arc<dyn PackageManager>) -> Self {
        Self { packages }
    }
}

fn package_name(resource: &Resource) -> &str {
    resource.attribute("package_name").unwrap_or(resource.name())
}

impl Provider for PackageProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Package
    }

    fn supported_actions(&self) -> &'static [Action] {
        &[Action::Install, Action::Remove]
    }

    fn query_state(&self, resource: &Resource, _: Action, _: &RunContext) -> Result<ResourceState> {
        Ok(match self.packages.query_installed(package_name(resource))? {
            Some(version) => ResourceState::with_attributes(Attributes::from([(
                "version".to_string(),
                version,
            )])),
            None => ResourceState::Absent,
        })
    }

    fn desired_state(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ResourceState> {
        Ok(match action {
            Action::Remove => ResourceState::Absent,
            _ => match resource.attribute("version") {
                Some(version) => ResourceState::with_attributes(Attributes::from([(
                    "version".to_string(),
                    version.to_string(),
                )])),
                None => ResourceState::present(),
            },
        })
    }

    fn apply_action(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ApplyResult> {
        let name = package_name(resource);
        let installed = self.packages.query_installed(name)?;

        match action {
            Action::Install => {
                let version = resource.attribute("version");
                if installed.is_some() && (version.is_none() || installed.as_deref() == version) {
                    return Ok(ApplyResult::NoChange);
                }
                log::info!("Installing package {name}");
                self.packages
                    .install(name, version, resource.attribute("source").map(Path::new))?;
                Ok(if installed.is_some() {
                    ApplyResult::Modified
                } else {
                    ApplyResult::Created
                })
            }
            Action::Remove => {
                if installed.is_none() {
                    return Ok(ApplyResult::NoChange);
                }
                log::info!("Removing package {name}");
                self.packages.remove(name)?;
                Ok(ApplyResult::Removed)
            }
            other => anyhow::bail!("package does not support :{other}"),
        }
    }
}
