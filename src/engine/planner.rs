//! Dry-run planning

use anyhow::Result;
use declarative::{
    DiffSummary, Engine, NoProgress, ProviderRegistry, ResourceDiff, ResourceId, ResourceKind,
    RunContext, RunList, RunReport,
};
use std::collections::BTreeMap;

/// What a run would do, without doing it
#[derive(Debug)]
pub struct Plan {
    pub report: RunReport,
    /// Unified content diffs for managed files, by resource
    pub content_diffs: BTreeMap<ResourceId, String>,
}

impl Plan {
    /// Diffs of every action that would be applied
    pub fn diffs(&self) -> Vec<&ResourceDiff> {
        self.report.diffs().filter(|d| d.has_changes()).collect()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diffs(self.report.diffs())
    }

    pub fn has_changes(&self) -> bool {
        self.summary().has_changes()
    }
}

/// Dry-run `run_list` and collect what would change
///
/// Guards are evaluated against the live host, so a guard that depends on
/// an earlier resource's side effect is judged on the current state.
pub fn plan(registry: &ProviderRegistry, run_list: &RunList, ctx: &RunContext) -> Result<Plan> {
    let dry = RunContext::new(ctx.facts, ctx.attributes, ctx.host).dry_run(true);
    let report = Engine::new(registry)
        .converge(run_list, &dry, &mut NoProgress)
        .map_err(|failure| anyhow::Error::new(*failure).context("Planning failed"))?;

    let mut content_diffs = BTreeMap::new();
    for record in report.records.iter().filter(|r| r.changed) {
        if !matches!(
            record.resource_id.kind,
            ResourceKind::Template | ResourceKind::File
        ) {
            continue;
        }
        let Some(resource) = run_list.handle(&record.resource_id).map(|h| run_list.get(h)) else {
            continue;
        };
        let Some(provider) = registry.get(resource.kind()) else {
            continue;
        };
        if let Some(diff) = provider.content_diff(resource, &dry)? {
            content_diffs.insert(record.resource_id.clone(), diff);
        }
    }

    log::debug!(
        "Planned {} resources, {} with content diffs",
        report.records.len(),
        content_diffs.len()
    );
    Ok(Plan {
        report,
        content_diffs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{ctx, debian};
    use crate::provider::{DirectoryProvider, ManagedFile, TemplateSource};
    use crate::system::{AssetStore, TemplateEngine};
    use declarative::{Attributes, Resource};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn registry(templates: &TempDir) -> ProviderRegistry {
        let engine = TemplateEngine::new(AssetStore::templates(Some(templates.path().into())));
        ProviderRegistry::new()
            .with(DirectoryProvider)
            .with(ManagedFile::new(TemplateSource::new(Arc::new(engine))))
    }

    #[test]
    fn test_plan_touches_nothing() {
        let root = TempDir::new().unwrap();
        let templates = TempDir::new().unwrap();
        fs::write(
            templates.path().join("env.conf"),
            "NODENAME={{ rabbitmq.nodename }}\n",
        )
        .unwrap();
        let config_dir = root.path().join("rabbitmq");
        let env_file = root.path().join("env.conf");
        fs::write(&env_file, "NODENAME=old\n").unwrap();

        let list = RunList::build([
            Resource::directory(config_dir.to_str().unwrap()),
            Resource::template(env_file.to_str().unwrap()).source("env.conf"),
        ])
        .unwrap();

        let facts = debian();
        let attrs = Attributes::from([("rabbitmq.nodename".to_string(), "rabbit".to_string())]);
        let plan = plan(&registry(&templates), &list, &ctx(&facts, &attrs)).unwrap();

        assert!(!config_dir.exists());
        assert_eq!(fs::read_to_string(&env_file).unwrap(), "NODENAME=old\n");
        assert!(plan.report.dry_run);
        assert!(plan.has_changes());
        assert_eq!(plan.diffs().len(), 2);

        let content = plan.content_diffs.values().next().unwrap();
        assert!(content.contains("-NODENAME=old"));
        assert!(content.contains("+NODENAME=rabbit"));
    }

    #[test]
    fn test_converged_plan_is_empty() {
        let root = TempDir::new().unwrap();
        let templates = TempDir::new().unwrap();
        let list = RunList::build([Resource::directory(root.path().to_str().unwrap())]).unwrap();

        let facts = debian();
        let attrs = Attributes::new();
        let plan = plan(&registry(&templates), &list, &ctx(&facts, &attrs)).unwrap();
        assert!(!plan.has_changes());
        assert!(plan.content_diffs.is_empty());
    }
}
