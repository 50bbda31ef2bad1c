//! TOML script files
//!
//! A script file is an ordered `[[step]]` array. Each step is either a
//! resource or a `[step.platform]` table with `debian` and `redhat`
//! resource lists:
//!
//! ```toml
//! [[step]]
//! type = "template"
//! name = "/etc/rabbitmq/rabbitmq.config"
//! attributes = { source = "rabbitmq.config", mode = "0644" }
//! notifies = [{ action = "restart", resource = "service[rabbitmq-server]", timing = "immediately" }]
//!
//! [[step]]
//! [step.platform]
//! debian = [{ type = "package", name = "erlang-nox" }]
//! redhat = [{ type = "package", name = "erlang" }]
//! ```
//!
//! String values may contain `{{ key }}` placeholders, expanded against the
//! node attributes when the file is loaded.

use anyhow::{Context, Result};
use declarative::{
    Action, Attributes, Condition, PlatformBranches, Resource, ResourceId, ResourceKind, Script,
    Timing, Trigger,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::system::render_str;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    #[serde(default)]
    step: Vec<StepDef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AttrValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

impl AttrValue {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Integer(n) => n.to_string(),
            Self::Flag(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NotifyDef {
    action: String,
    resource: String,
    #[serde(default)]
    timing: Timing,
    #[serde(default)]
    trigger: Trigger,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BranchDef {
    #[serde(default)]
    debian: Vec<StepDef>,
    #[serde(default)]
    redhat: Vec<StepDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepDef {
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    action: Option<OneOrMany<String>>,
    #[serde(default)]
    attributes: BTreeMap<String, AttrValue>,
    only_if: Option<OneOrMany<Condition>>,
    not_if: Option<OneOrMany<Condition>>,
    creates: Option<String>,
    returns: Option<OneOrMany<i32>>,
    #[serde(default)]
    ignore_failure: bool,
    #[serde(default)]
    notifies: Vec<NotifyDef>,
    #[serde(default)]
    subscribes: Vec<NotifyDef>,
    platform: Option<BranchDef>,
}

/// Load a script file, expanding placeholders against `variables`
pub fn load(path: &Path, variables: &Attributes) -> Result<Script> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read script file: {}", path.display()))?;
    parse(&content, variables).with_context(|| format!("Invalid script file: {}", path.display()))
}

pub fn parse(content: &str, variables: &Attributes) -> Result<Script> {
    let file: ScriptFile = toml::from_str(content).context("Invalid TOML format in script")?;
    let expander = Expander { variables };

    let mut script = Script::new();
    for (index, step) in file.step.into_iter().enumerate() {
        let position = index + 1;
        if let Some(branch) = step.platform {
            if step.kind.is_some() || step.name.is_some() {
                anyhow::bail!("step {position}: a platform step cannot also declare a resource");
            }
            let debian = expander
                .resources(branch.debian)
                .with_context(|| format!("step {position} (debian branch)"))?;
            let redhat = expander
                .resources(branch.redhat)
                .with_context(|| format!("step {position} (redhat branch)"))?;
            script.add_platform(PlatformBranches::new().debian(debian).redhat(redhat));
        } else {
            let resource = expander
                .resource(step)
                .with_context(|| format!("step {position}"))?;
            script.add(resource);
        }
    }
    Ok(script)
}

/// Derive a package name from a package file name
///
/// `rabbitmq-server-2.8.7-1.noarch.rpm` becomes `rabbitmq-server`.
fn package_name_from_file(path: &str) -> Option<String> {
    let file = Path::new(path).file_name()?.to_str()?;
    let bytes = file.as_bytes();
    let cut = (1..bytes.len()).find(|&i| bytes[i - 1] == b'-' && bytes[i].is_ascii_digit())?;
    Some(file[..cut - 1].to_string())
}

struct Expander<'a> {
    variables: &'a Attributes,
}

impl Expander<'_> {
    fn expand(&self, value: &str) -> Result<String> {
        render_str(value, self.variables)
    }

    fn condition(&self, condition: Condition) -> Result<Condition> {
        Ok(match condition {
            Condition::PathExists(path) => {
                Condition::PathExists(PathBuf::from(self.expand(&path.to_string_lossy())?))
            }
            Condition::AttributeEquals { key, value } => Condition::AttributeEquals {
                key,
                value: self.expand(&value)?,
            },
            other => other,
        })
    }

    fn notify(&self, def: NotifyDef) -> Result<(Action, ResourceId, Timing, Trigger)> {
        let action: Action = def.action.parse()?;
        let target: ResourceId = self.expand(&def.resource)?.parse()?;
        Ok((action, target, def.timing, def.trigger))
    }

    fn resources(&self, steps: Vec<StepDef>) -> Result<Vec<Resource>> {
        steps.into_iter().map(|s| self.resource(s)).collect()
    }

    fn resource(&self, step: StepDef) -> Result<Resource> {
        if step.platform.is_some() {
            anyhow::bail!("platform branches cannot be nested");
        }
        let raw_kind = step.kind.context("missing `type`")?;
        let kind: ResourceKind = raw_kind.parse()?;
        let name = self.expand(&step.name.context("missing `name`")?)?;

        let mut resource = Resource::new(kind, name);
        for (key, value) in step.attributes {
            let value = self.expand(&value.into_string())?;
            resource = resource.attr(key, value);
        }

        // recipe-dialect kinds imply attributes
        match raw_kind.as_str() {
            "bash" if resource.attribute("interpreter").is_none() => {
                resource = resource.attr("interpreter", "bash");
            }
            "rpm_package" | "dpkg_package" if resource.attribute("source").is_none() => {
                let file = resource.name().to_string();
                if resource.attribute("package_name").is_none()
                    && let Some(package) = package_name_from_file(&file)
                {
                    resource = resource.attr("package_name", package);
                }
                resource = resource.source(file);
            }
            _ => {}
        }

        if let Some(actions) = step.action {
            let actions = actions
                .into_vec()
                .iter()
                .map(|a| a.parse::<Action>())
                .collect::<Result<Vec<_>, _>>()?;
            resource = resource.actions(actions);
        }
        for condition in step.only_if.map(OneOrMany::into_vec).unwrap_or_default() {
            resource = resource.only_if(self.condition(condition)?);
        }
        for condition in step.not_if.map(OneOrMany::into_vec).unwrap_or_default() {
            resource = resource.not_if(self.condition(condition)?);
        }
        if let Some(path) = step.creates {
            resource = resource.creates(self.expand(&path)?);
        }
        if let Some(codes) = step.returns {
            resource = resource.returns(codes.into_vec());
        }
        if step.ignore_failure {
            resource = resource.ignore_failure();
        }
        for def in step.notifies {
            let (action, target, timing, trigger) = self.notify(def)?;
            resource = resource.notifies(action, target, timing, trigger);
        }
        for def in step.subscribes {
            let (action, source, timing, _) = self.notify(def)?;
            resource = resource.subscribes(action, source, timing);
        }
        Ok(resource)
    }
}
