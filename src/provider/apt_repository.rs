//! Third-party apt repositories
//!
//! A repository is a one-line `<name>.list` file in the sources directory
//! plus, when a `key` URL is declared, the ASCII-armoured signing key in the
//! trusted keyring directory. Any change is followed by `apt-get update`;
//! if that fails the list is withdrawn so the next run refreshes again.

use anyhow::{Context, Result};
use declarative::{
    Action, ApplyResult, Attributes, CommandRunner, CommandSpec, Fetcher, Provider, Resource,
    ResourceKind, ResourceState, RunContext,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use super::write_atomic;

pub struct AptRepositoryProvider {
    runner: Arc<dyn CommandRunner>,
    fetcher: Arc<dyn Fetcher>,
    sources_dir: PathBuf,
    keyring_dir: PathBuf,
}

impl AptRepositoryProvider {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn Fetcher>,
        sources_dir: PathBuf,
        keyring_dir: PathBuf,
    ) -> Self {
        Self {
            runner,
            fetcher,
            sources_dir,
            keyring_dir,
        }
    }

    fn list_path(&self, resource: &Resource) -> PathBuf {
        self.sources_dir.join(format!("{}.list", resource.name()))
    }

    fn key_path(&self, resource: &Resource) -> PathBuf {
        self.keyring_dir.join(format!("{}.asc", resource.name()))
    }

    fn apt_update(&self) -> Result<()> {
        self.runner.run_checked(
            &CommandSpec::new("apt-get")
                .env("DEBIAN_FRONTEND", "noninteractive")
                .args(["-q", "update"]),
        )?;
        Ok(())
    }
}

/// The `deb` line a repository declaration stands for
pub fn source_line(resource: &Resource) -> Result<String> {
    let uri = resource
        .attribute("uri")
        .with_context(|| format!("{} has no uri", resource.id))?;
    let distribution = resource
        .attribute("distribution")
        .with_context(|| format!("{} has no distribution", resource.id))?;
    let components = resource.attribute("components").unwrap_or("main");
    Ok(format!("deb {uri} {distribution} {components}"))
}

impl Provider for AptRepositoryProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::AptRepository
    }

    fn supported_actions(&self) -> &'static [Action] {
        &[Action::Add, Action::Remove]
    }

    fn query_state(&self, resource: &Resource, _: Action, _: &RunContext) -> Result<ResourceState> {
        let list = self.list_path(resource);
        if !list.is_file() {
            return Ok(ResourceState::Absent);
        }
        let line = fs::read_to_string(&list)
            .with_context(|| format!("Failed to read {}", list.display()))?;
        let mut attrs = Attributes::from([("line".to_string(), line.trim().to_string())]);
        if self.key_path(resource).is_file() {
            attrs.insert("key".to_string(), "installed".to_string());
        }
        Ok(ResourceState::with_attributes(attrs))
    }

    fn desired_state(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ResourceState> {
        if action == Action::Remove {
            return Ok(ResourceState::Absent);
        }
        let mut attrs = Attributes::from([("line".to_string(), source_line(resource)?)]);
        if resource.attribute("key").is_some() {
            attrs.insert("key".to_string(), "installed".to_string());
        }
        Ok(ResourceState::with_attributes(attrs))
    }

    fn apply_action(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ApplyResult> {
        let list = self.list_path(resource);
        let key = self.key_path(resource);

        match action {
            Action::Add => {
                let existed = list.is_file();
                let mut changed = false;

                if let Some(url) = resource.attribute("key")
                    && !key.is_file()
                {
                    let body = self.fetcher.fetch(url)?;
                    fs::create_dir_all(&self.keyring_dir).with_context(|| {
                        format!("Failed to create {}", self.keyring_dir.display())
                    })?;
                    write_atomic(&key, &body, None)?;
                    log::info!("Installed signing key for {} from {url}", resource.name());
                    changed = true;
                }

                let line = format!("{}\n", source_line(resource)?);
                let current = fs::read_to_string(&list).unwrap_or_default();
                if current != line {
                    fs::create_dir_all(&self.sources_dir).with_context(|| {
                        format!("Failed to create {}", self.sources_dir.display())
                    })?;
                    write_atomic(&list, line.as_bytes(), None)?;
                    changed = true;
                }

                if !changed {
                    return Ok(ApplyResult::NoChange);
                }
                if let Err(e) = self.apt_update() {
                    // without the list the next run sees drift and updates again
                    if let Err(cleanup) = fs::remove_file(&list) {
                        log::warn!("Failed to remove {}: {cleanup}", list.display());
                    }
                    return Err(e.context(format!(
                        "Package index not refreshed for {}",
                        resource.id
                    )));
                }
                Ok(if existed {
                    ApplyResult::Modified
                } else {
                    ApplyResult::Created
                })
            }
            Action::Remove => {
                let mut removed = false;
                for path in [&list, &key] {
                    if path.is_file() {
                        fs::remove_file(path)
                            .with_context(|| format!("Failed to remove {}", path.display()))?;
                        removed = true;
                    }
                }
                if !removed {
                    return Ok(ApplyResult::NoChange);
                }
                self.apt_update()?;
                Ok(ApplyResult::Removed)
            }
            other => anyhow::bail!("apt_repository does not support :{other}"),
        }
    }
}
