//! Subcommand implementations
//!
//! Every subcommand starts from a [`Session`]: the loaded config, the
//! host's platform facts, the node attributes derived from both, and the
//! script to run (the built-in broker recipe or a TOML script file).

pub mod converge;
pub mod facts;
pub mod resources;
pub mod validate;

use anyhow::{Context as AnyhowContext, Result};
use declarative::{Attributes, PlatformFacts, ProviderRegistry, RunList, Script};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::Context;
use crate::cli::TargetArgs;
use crate::config::WarrenConfig;
use crate::provider::{self, Collaborators};
use crate::runner::ShellRunner;
use crate::system::{AssetStore, HttpFetcher, InitServices, TemplateEngine, package_manager_for};
use crate::{recipe, script_file};

/// Label recorded for runs of the built-in recipe
pub const RECIPE_LABEL: &str = "recipe";

/// Everything a subcommand needs to resolve and converge a script
pub struct Session {
    pub config: WarrenConfig,
    pub config_path: Option<PathBuf>,
    pub facts: PlatformFacts,
    /// Node attributes derived from the config
    pub attributes: Attributes,
    pub script: Script,
    /// `recipe`, or the script file path
    pub script_label: String,
    pub strict: bool,
}

impl Session {
    pub fn load(ctx: &Context, target: &TargetArgs) -> Result<Self> {
        let (config, config_path) = WarrenConfig::load(ctx.config.as_deref())?;
        let facts = detect_facts(target.platform.as_deref())?;
        log::info!(
            "Platform {} {} ({})",
            facts.platform,
            facts.version,
            facts.family.as_str()
        );

        let attributes = config.node_attributes();
        let (script, script_label) =
            load_script(&config, &facts, &attributes, target.script.as_deref())?;
        let strict = target.strict_platform || config.run.strict_platform;

        Ok(Self {
            config,
            config_path,
            facts,
            attributes,
            script,
            script_label,
            strict,
        })
    }

    /// Resolve the script for this host's platform
    pub fn run_list(&self) -> Result<RunList> {
        let run_list = self
            .script
            .resolve(&self.facts, self.strict)
            .context("Could not resolve the script for this platform")?;
        log::debug!("Run list has {} resources", run_list.len());
        Ok(run_list)
    }

    /// Providers wired to the live host
    pub fn registry(&self) -> ProviderRegistry {
        let runner = Arc::new(ShellRunner);
        let paths = &self.config.paths;
        provider::build_registry(Collaborators {
            runner: runner.clone(),
            packages: Arc::from(package_manager_for(self.facts.family, runner.clone())),
            services: Arc::new(InitServices::new(runner.clone(), self.facts.family)),
            templates: Arc::new(TemplateEngine::new(AssetStore::templates(
                paths.templates_dir(),
            ))),
            files: AssetStore::files(paths.files_dir()),
            fetcher: Arc::new(HttpFetcher::new()),
            apt_sources_dir: paths.apt_sources_dir(),
            apt_keyring_dir: paths.apt_keyring_dir(),
        })
    }
}

/// Split a `--platform` value into platform id and version
pub fn parse_platform(value: &str) -> Result<(String, String)> {
    let (id, version) = value.split_once(':').unwrap_or((value, ""));
    let id = id.trim();
    if id.is_empty() {
        anyhow::bail!("Invalid platform '{value}': expected ID[:VERSION]");
    }
    Ok((id.to_lowercase(), version.trim().to_string()))
}

/// Detect the host's facts, with the platform optionally overridden
pub fn detect_facts(platform: Option<&str>) -> Result<PlatformFacts> {
    let detected = PlatformFacts::detect();
    let Some(value) = platform else {
        return Ok(detected);
    };
    let (id, version) = parse_platform(value)?;
    log::debug!(
        "Platform overridden: {} {} -> {id} {version}",
        detected.platform,
        detected.version
    );
    Ok(PlatformFacts::new(id, version).with_hostname(detected.hostname))
}

/// The script to run and its label
pub fn load_script(
    config: &WarrenConfig,
    facts: &PlatformFacts,
    attributes: &Attributes,
    path: Option<&Path>,
) -> Result<(Script, String)> {
    let Some(path) = path else {
        return Ok((recipe::broker(config), RECIPE_LABEL.to_string()));
    };
    let mut variables = facts.as_attributes();
    variables.extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
    let script = script_file::load(path, &variables)?;
    Ok((script, path.display().to_string()))
}
