//! `warren validate`

use anyhow::{Context as AnyhowContext, Result};
use declarative::{PlatformFacts, ProviderRegistry};
use std::path::Path;

use super::{Session, load_script};
use crate::Context;
use crate::cli::{TargetArgs, ValidateArgs};
use crate::config::WarrenConfig;
use crate::ui;

/// One representative platform per family, plus an unsupported one
const PLATFORMS: [(&str, &str); 3] = [("debian", "12"), ("centos", "7"), ("unknown", "")];

pub fn run(ctx: &Context, args: ValidateArgs) -> Result<()> {
    let target = TargetArgs {
        script: args.script,
        platform: Some("debian".to_string()),
        strict_platform: false,
    };
    let session = Session::load(ctx, &target)?;
    ui::header("Validating");
    match &session.config_path {
        Some(path) => ui::kv("config", &path.display().to_string()),
        None => ui::kv("config", "(defaults)"),
    }
    ui::kv("script", &session.script_label);
    println!();

    let registry = session.registry();
    let results = check_platforms(&session.config, target.script.as_deref(), &registry);
    let mut failures = 0;
    for (platform, result) in &results {
        match result {
            Ok(count) => ui::success(&format!("{platform}: {count} resources")),
            Err(e) => {
                failures += 1;
                ui::error(&format!("{platform}: {e:#}"));
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} platforms failed validation", results.len());
    }
    Ok(())
}

/// Resolve and validate the script for every platform family
pub fn check_platforms(
    config: &WarrenConfig,
    script: Option<&Path>,
    registry: &ProviderRegistry,
) -> Vec<(String, Result<usize>)> {
    PLATFORMS
        .iter()
        .map(|(id, version)| {
            let facts = PlatformFacts::new(*id, *version).with_hostname("validate");
            let label = format!("{id} ({})", facts.family.as_str());
            (label, check(config, &facts, script, registry))
        })
        .collect()
}

fn check(
    config: &WarrenConfig,
    facts: &PlatformFacts,
    script: Option<&Path>,
    registry: &ProviderRegistry,
) -> Result<usize> {
    let attributes = config.node_attributes();
    let (script, _) = load_script(config, facts, &attributes, script)?;
    let run_list = script
        .resolve(facts, config.run.strict_platform)
        .context("Could not resolve the script")?;
    run_list.validate_with(registry)?;
    Ok(run_list.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{DirectoryProvider, ExecuteProvider};
    use crate::system::testing::RecordingRunner;
    use std::fs;
    use tempfile::TempDir;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new()
            .with(DirectoryProvider)
            .with(ExecuteProvider::new(RecordingRunner::new()))
    }

    #[test]
    fn test_script_valid_everywhere() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("node.toml");
        fs::write(
            &script,
            r#"
            [[step]]
            type = "directory"
            name = "/etc/rabbitmq"

            [[step]]
            [step.platform]
            debian = [{ type = "execute", name = "apt marker", attributes = { command = "true" } }]
            "#,
        )
        .unwrap();

        let results = check_platforms(&WarrenConfig::default(), Some(&script), &registry());
        let counts: Vec<usize> = results.iter().map(|(_, r)| *r.as_ref().unwrap()).collect();
        assert_eq!(counts, vec![2, 1, 1]);
    }

    #[test]
    fn test_unsupported_action_reported_per_platform() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("node.toml");
        fs::write(
            &script,
            r#"
            [[step]]
            [step.platform]
            redhat = [{ type = "directory", name = "/opt/x", action = "run" }]
            "#,
        )
        .unwrap();

        let results = check_platforms(&WarrenConfig::default(), Some(&script), &registry());
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert!(results[2].1.is_ok());
    }

    #[test]
    fn test_missing_provider_is_reported() {
        let results = check_platforms(&WarrenConfig::default(), None, &registry());
        assert!(results.iter().all(|(_, r)| r.is_err()));
    }
}
