//! Files whose content warren owns: templates and cookbook files
//!
//! Both kinds converge the same way and differ only in where the content
//! comes from, so one provider is generic over a [`ContentSource`].
//! Content is compared by BLAKE3 digest and written atomically.

use anyhow::{Context, Result};
use declarative::{
    Action, ApplyResult, Attributes, Provider, Resource, ResourceKind, ResourceState, RunContext,
    TemplateRenderer,
};
use similar::TextDiff;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::{digest, file_attrs, write_atomic};
use crate::system::AssetStore;

/// Produces the desired content of a managed file
pub trait ContentSource: Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn content(&self, resource: &Resource, ctx: &RunContext) -> Result<Vec<u8>>;
}

/// The `source` attribute, or the file name of the managed path
fn source_id(resource: &Resource) -> String {
    resource.attribute("source").map_or_else(
        || {
            Path::new(resource.name())
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| resource.name().to_string())
        },
        str::to_string,
    )
}

/// Renders a named template with node attributes plus `var.*` attributes
pub struct TemplateSource {
    renderer: Arc<dyn TemplateRenderer>,
}

impl TemplateSource {
    pub fn new(renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self { renderer }
    }
}

impl ContentSource for TemplateSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Template
    }

    fn content(&self, resource: &Resource, ctx: &RunContext) -> Result<Vec<u8>> {
        let mut variables: Attributes = ctx.variables();
        variables.extend(resource.prefixed("var."));
        self.renderer.render(&source_id(resource), &variables)
    }
}

/// Static content shipped with warren or found in the files directory
pub struct CookbookFileSource {
    store: AssetStore,
}

impl CookbookFileSource {
    pub fn new(store: AssetStore) -> Self {
        Self { store }
    }
}

impl ContentSource for CookbookFileSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::File
    }

    fn content(&self, resource: &Resource, _: &RunContext) -> Result<Vec<u8>> {
        self.store.load(&source_id(resource))
    }
}

pub struct ManagedFile<S> {
    source: S,
}

impl<S: ContentSource> ManagedFile<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    fn render(&self, resource: &Resource, ctx: &RunContext) -> Result<Vec<u8>> {
        self.source
            .content(resource, ctx)
            .with_context(|| format!("Failed to produce content for {}", resource.id))
    }
}

impl<S: ContentSource> Provider for ManagedFile<S> {
    fn kind(&self) -> ResourceKind {
        self.source.kind()
    }

    fn supported_actions(&self) -> &'static [Action] {
        &[Action::Create, Action::CreateIfMissing, Action::Delete]
    }

    fn query_state(&self, resource: &Resource, _: Action, _: &RunContext) -> Result<ResourceState> {
        let path = Path::new(resource.name());
        if !path.exists() {
            return Ok(ResourceState::Absent);
        }
        if path.is_dir() {
            anyhow::bail!("{} is a directory", path.display());
        }
        let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let mut attrs = file_attrs::observe(path)?;
        attrs.insert("digest".to_string(), digest(&content));
        Ok(ResourceState::with_attributes(attrs))
    }

    fn desired_state(&self, resource: &Resource, action: Action, ctx: &RunContext) -> Result<ResourceState> {
        match action {
            Action::Delete => Ok(ResourceState::Absent),
            Action::CreateIfMissing => Ok(ResourceState::with_attributes(file_attrs::declared(
                resource,
            )?)),
            _ => {
                let mut attrs = file_attrs::declared(resource)?;
                attrs.insert("digest".to_string(), digest(&self.render(resource, ctx)?));
                Ok(ResourceState::with_attributes(attrs))
            }
        }
    }

    fn apply_action(&self, resource: &Resource, action: Action, ctx: &RunContext) -> Result<ApplyResult> {
        let path = Path::new(resource.name());

        match action {
            Action::Create | Action::CreateIfMissing => {
                let existed = path.exists();
                if existed && action == Action::CreateIfMissing {
                    return Ok(ApplyResult::NoChange);
                }

                let content = self.render(resource, ctx)?;
                let rewritten = if existed {
                    let current = fs::read(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    digest(&current) != digest(&content)
                } else {
                    true
                };
                if rewritten {
                    write_atomic(path, &content, file_attrs::declared_mode(resource)?)?;
                }
                let adjusted = file_attrs::enforce(path, resource)?;

                Ok(if !existed {
                    ApplyResult::Created
                } else if rewritten || adjusted {
                    ApplyResult::Modified
                } else {
                    ApplyResult::NoChange
                })
            }
            Action::Delete => {
                if !path.exists() {
                    return Ok(ApplyResult::NoChange);
                }
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                Ok(ApplyResult::Removed)
            }
            other => anyhow::bail!("{} does not support :{other}", self.kind()),
        }
    }

    fn content_diff(&self, resource: &Resource, ctx: &RunContext) -> Result<Option<String>> {
        if resource.flag("sensitive") {
            return Ok(None);
        }
        let path = Path::new(resource.name());
        let new = self.render(resource, ctx)?;
        let old = if path.is_file() {
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
        } else {
            Vec::new()
        };
        if old == new {
            return Ok(None);
        }

        let (Ok(old), Ok(new)) = (std::str::from_utf8(&old), std::str::from_utf8(&new)) else {
            return Ok(Some("Binary content differs\n".to_string()));
        };
        let name = path.display().to_string();
        Ok(Some(
            TextDiff::from_lines(old, new)
                .unified_diff()
                .context_radius(3)
                .header(&name, &name)
                .to_string(),
        ))
    }
}
