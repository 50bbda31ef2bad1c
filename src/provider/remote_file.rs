//! Downloaded files
//!
//! Without a `checksum` an existing file is taken as converged and is never
//! downloaded again; with one, the content digest must match it.

use anyhow::{Context, Result};
use declarative::{
    Action, ApplyResult, Fetcher, Provider, Resource, ResourceKind, ResourceState, RunContext,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::{digest, file_attrs, write_atomic};

pub struct RemoteFileProvider {
    fetcher: Arc<dyn Fetcher>,
}

impl RemoteFileProvider {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    fn download(&self, resource: &Resource) -> Result<Vec<u8>> {
        let url = resource
            .attribute("source")
            .with_context(|| format!("{} has no source URL", resource.id))?;
        let body = self.fetcher.fetch(url)?;

        if let Some(expected) = resource.attribute("checksum") {
            let actual = digest(&body);
            if !actual.eq_ignore_ascii_case(expected) {
                anyhow::bail!("Checksum mismatch for {url}: expected {expected}, got {actual}");
            }
        }
        Ok(body)
    }
}

impl Provider for RemoteFileProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::RemoteFile
    }

    fn supported_actions(&self) -> &'static [Action] {
        &[Action::Create, Action::CreateIfMissing, Action::Delete]
    }

    fn query_state(&self, resource: &Resource, _: Action, _: &RunContext) -> Result<ResourceState> {
        let path = Path::new(resource.name());
        if !path.is_file() {
            return Ok(ResourceState::Absent);
        }
        let mut attrs = file_attrs::observe(path)?;
        if resource.attribute("checksum").is_some() {
            let content =
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            attrs.insert("checksum".to_string(), digest(&content));
        }
        Ok(ResourceState::with_attributes(attrs))
    }

    fn desired_state(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ResourceState> {
        if action == Action::Delete {
            return Ok(ResourceState::Absent);
        }
        let mut attrs = file_attrs::declared(resource)?;
        if let Some(checksum) = resource.attribute("checksum") {
            attrs.insert("checksum".to_string(), checksum.to_ascii_lowercase());
        }
        Ok(ResourceState::with_attributes(attrs))
    }

    fn apply_action(&self, resource: &Resource, action: Action, _: &RunContext) -> Result<ApplyResult> {
        let path = Path::new(resource.name());

        match action {
            Action::Create | Action::CreateIfMissing => {
                let existed = path.is_file();
                if existed && action == Action::CreateIfMissing {
                    return Ok(ApplyResult::NoChange);
                }

                let stale = match resource.attribute("checksum") {
                    Some(expected) if existed => {
                        let current = fs::read(path)
                            .with_context(|| format!("Failed to read {}", path.display()))?;
                        !digest(&current).eq_ignore_ascii_case(expected)
                    }
                    _ => !existed,
                };
                if stale {
                    let body = self.download(resource)?;
                    write_atomic(path, &body, file_attrs::declared_mode(resource)?)?;
                    log::debug!("Wrote {} bytes to {}", body.len(), path.display());
                }
                let adjusted = file_attrs::enforce(path, resource)?;

                Ok(if !existed {
                    ApplyResult::Created
                } else if stale || adjusted {
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
            other => anyhow::bail!("remote_file does not support :{other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{FakeFetcher, ctx, debian};
    use declarative::{Attributes, Engine, NoProgress, ProviderRegistry, RunList};
    use tempfile::TempDir;

    const RPM_URL: &str =
        "https://www.rabbitmq.com/releases/rabbitmq-server/v2.8.7/rabbitmq-server-2.8.7-1.noarch.rpm";

    #[test]
    fn test_create_if_missing_downloads_once() {
        let out = TempDir::new().unwrap();
        let target = out.path().join("rabbitmq-server-2.8.7-1.noarch.rpm");
        let fetcher = Arc::new(FakeFetcher::serving(RPM_URL, b"rpm-bytes"));
        let registry = ProviderRegistry::new().with(RemoteFileProvider::new(fetcher.clone()));
        let list = RunList::build([Resource::remote_file(target.display().to_string())
            .source(RPM_URL)
            .action(Action::CreateIfMissing)])
        .unwrap();

        let facts = debian();
        let attrs = Attributes::new();
        let ctx = ctx(&facts, &attrs);
        let engine = Engine::new(&registry);

        assert_eq!(engine.converge(&list, &ctx, &mut NoProgress).unwrap().changed_count(), 1);
        assert_eq!(engine.converge(&list, &ctx, &mut NoProgress).unwrap().changed_count(), 0);
        assert_eq!(fetcher.request_count(), 1);
        assert_eq!(fs::read(&target).unwrap(), b"rpm-bytes");
    }

    #[test]
    fn test_checksum_mismatch_fails_and_writes_nothing() {
        let out = TempDir::new().unwrap();
        let target = out.path().join("key.asc");
        let provider = RemoteFileProvider::new(Arc::new(FakeFetcher::serving(RPM_URL, b"tampered")));
        let r = Resource::remote_file(target.display().to_string())
            .source(RPM_URL)
            .attr("checksum", digest(b"genuine"));

        let facts = debian();
        let attrs = Attributes::new();
        let err = provider
            .apply_action(&r, Action::Create, &ctx(&facts, &attrs))
            .unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
        assert!(!target.exists());
    }

    #[test]
    fn test_checksum_drift_redownloads() {
        let out = TempDir::new().unwrap();
        let target = out.path().join("rabbitmqadmin");
        fs::write(&target, "old").unwrap();
        let fetcher = Arc::new(FakeFetcher::serving(RPM_URL, b"new"));
        let provider = RemoteFileProvider::new(fetcher.clone());
        let r = Resource::remote_file(target.display().to_string())
            .source(RPM_URL)
            .attr("checksum", digest(b"new"));

        let facts = debian();
        let attrs = Attributes::new();
        let ctx = ctx(&facts, &attrs);
        let current = provider.query_state(&r, Action::Create, &ctx).unwrap();
        let desired = provider.desired_state(&r, Action::Create, &ctx).unwrap();
        assert!(declarative::ResourceDiff::compute(&r, Action::Create, &current, &desired).has_changes());

        assert_eq!(
            provider.apply_action(&r, Action::Create, &ctx).unwrap(),
            ApplyResult::Modified
        );
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn test_download_error_propagates() {
        let out = TempDir::new().unwrap();
        let provider = RemoteFileProvider::new(Arc::new(FakeFetcher::default()));
        let r = Resource::remote_file(out.path().join("x").display().to_string()).source(RPM_URL);
        let facts = debian();
        let attrs = Attributes::new();
        let err = provider
            .apply_action(&r, Action::Create, &ctx(&facts, &attrs))
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
