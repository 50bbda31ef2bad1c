//! Directory provider

use anyhow::{Context, Result};
use declarative::{
    Action, ApplyResult, Provider, Resource, ResourceKind, ResourceState, RunContext,
};
use std::fs;
use std::path::Path;

use super::file_attrs;

/// Creates and removes directories; `recursive` creates missing parents
/// and removes non-empty trees
pub struct DirectoryProvider;

impl Provider for DirectoryProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Directory
    }

    fn supported_actions(&self) -> &'static [Action] {
        &[Action::Create, Action::Delete]
    }

    fn query_state(&self, resource: &Resource, _: Action, _: &RunContext) -> Result<ResourceState> {
        let path = Path::new(resource.name());
        if !path.exists() {
            return Ok(ResourceState::Absent);
        }
        if !path.is_dir() {
            anyhow::bail!("{} exists and is not a directory", path.display());
        }
        Ok(ResourceState::with_attributes(file_attrs::observe(path)?))
    }

    fn desired_state(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ResourceState> {
        match action {
            Action::Delete => Ok(ResourceState::Absent),
            _ => Ok(ResourceState::with_attributes(file_attrs::declared(resource)?)),
        }
    }

    fn apply_action(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ApplyResult> {
        let path = Path::new(resource.name());
        let recursive = resource.flag("recursive");

        match action {
            Action::Create => {
                let created = !path.exists();
                if created {
                    let result = if recursive {
                        fs::create_dir_all(path)
                    } else {
                        fs::create_dir(path)
                    };
                    result
                        .with_context(|| format!("Failed to create directory {}", path.display()))?;
                }
                let adjusted = file_attrs::enforce(path, resource)?;
                Ok(match (created, adjusted) {
                    (true, _) => ApplyResult::Created,
                    (false, true) => ApplyResult::Modified,
                    (false, false) => ApplyResult::NoChange,
                })
            }
            Action::Delete => {
                if !path.exists() {
                    return Ok(ApplyResult::NoChange);
                }
                let result = if recursive {
                    fs::remove_dir_all(path)
                } else {
                    fs::remove_dir(path)
                };
                result.with_context(|| format!("Failed to remove directory {}", path.display()))?;
                Ok(ApplyResult::Removed)
            }
            other => anyhow::bail!("directory does not support :{other}"),
        }
    }
}
