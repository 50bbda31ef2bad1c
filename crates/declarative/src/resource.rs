//! Resource declarations
//!
//! A [`Resource`] is plain data: an identity, the attributes it should have,
//! the actions to take, and the guards and notifications around them.
//! Providers interpret that data against the real system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::context::RunContext;
use crate::error::Error;
use crate::notify::{Timing, Trigger};
use crate::types::{Action, Attributes, ResourceKind};

/// Identity of a resource: its kind plus a name unique within that kind
///
/// Written and parsed as `kind[name]`, e.g. `service[rabbitmq-server]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidReference(s.to_string());
        let (kind, rest) = s.split_once('[').ok_or_else(invalid)?;
        let name = rest.strip_suffix(']').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(kind.trim().parse()?, name))
    }
}

/// A condition evaluated against the run context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// A path exists on the host
    PathExists(PathBuf),
    /// A node attribute is set to a truthy value
    AttributeTrue(String),
    /// A node attribute equals the given value
    AttributeEquals { key: String, value: String },
}

impl Condition {
    pub fn holds(&self, ctx: &RunContext) -> bool {
        match self {
            Self::PathExists(path) => ctx.host.path_exists(path),
            Self::AttributeTrue(key) => ctx
                .attribute(key)
                .is_some_and(|v| matches!(v, "true" | "yes" | "1")),
            Self::AttributeEquals { key, value } => ctx.attribute(key) == Some(value.as_str()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathExists(path) => write!(f, "{} exists", path.display()),
            Self::AttributeTrue(key) => write!(f, "{key} is set"),
            Self::AttributeEquals { key, value } => write!(f, "{key} == {value}"),
        }
    }
}

/// Whether a guard runs the resource when its condition holds or when it doesn't
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    OnlyIf,
    NotIf,
}

/// A precondition; a resource with any failing guard is skipped entirely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    pub mode: GuardMode,
    pub condition: Condition,
}

impl Guard {
    pub fn only_if(condition: Condition) -> Self {
        Self {
            mode: GuardMode::OnlyIf,
            condition,
        }
    }

    pub fn not_if(condition: Condition) -> Self {
        Self {
            mode: GuardMode::NotIf,
            condition,
        }
    }

    /// Whether the guarded resource should be evaluated
    pub fn allows(&self, ctx: &RunContext) -> bool {
        let holds = self.condition.holds(ctx);
        match self.mode {
            GuardMode::OnlyIf => holds,
            GuardMode::NotIf => !holds,
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            GuardMode::OnlyIf => write!(f, "only_if {}", self.condition),
            GuardMode::NotIf => write!(f, "not_if {}", self.condition),
        }
    }
}

/// A notification declared on a resource
///
/// On a `notifies` entry `resource` is the target; on a `subscribes` entry it
/// is the resource being watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifySpec {
    pub action: Action,
    pub resource: ResourceId,
    pub timing: Timing,
    pub trigger: Trigger,
}

/// A declared unit of desired system state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: Attributes,
    pub actions: Vec<Action>,
    pub guards: Vec<Guard>,
    /// Exit codes treated as success for command resources
    pub returns: BTreeSet<i32>,
    /// Absorb any provider error instead of halting the run
    pub ignore_failure: bool,
    pub notifies: Vec<NotifySpec>,
    pub subscribes: Vec<NotifySpec>,
    #[serde(skip)]
    explicit_actions: bool,
}

impl Resource {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(kind, name),
            attributes: Attributes::new(),
            actions: vec![kind.default_action()],
            guards: Vec::new(),
            returns: BTreeSet::from([0]),
            ignore_failure: false,
            notifies: Vec::new(),
            subscribes: Vec::new(),
            explicit_actions: false,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self::new(ResourceKind::Directory, path)
    }

    pub fn template(path: impl Into<String>) -> Self {
        Self::new(ResourceKind::Template, path)
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self::new(ResourceKind::File, path)
    }

    pub fn remote_file(path: impl Into<String>) -> Self {
        Self::new(ResourceKind::RemoteFile, path)
    }

    pub fn package(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Package, name)
    }

    pub fn execute(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Execute, name)
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Service, name)
    }

    pub fn apt_repository(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::AptRepository, name)
    }

    pub fn kind(&self) -> ResourceKind {
        self.id.kind
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Set an attribute
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn owner(self, owner: &str) -> Self {
        self.attr("owner", owner)
    }

    pub fn group(self, group: &str) -> Self {
        self.attr("group", group)
    }

    /// File mode, written in octal (`0755`)
    pub fn mode(self, mode: &str) -> Self {
        self.attr("mode", mode)
    }

    pub fn source(self, source: impl Into<String>) -> Self {
        self.attr("source", source)
    }

    pub fn command(self, command: impl Into<String>) -> Self {
        self.attr("command", command)
    }

    /// Replace the default action with a single action
    pub fn action(self, action: Action) -> Self {
        self.actions([action])
    }

    /// Replace the default action with an ordered list of actions
    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions = actions.into_iter().collect();
        self.explicit_actions = true;
        self
    }

    pub fn only_if(mut self, condition: Condition) -> Self {
        self.guards.push(Guard::only_if(condition));
        self
    }

    pub fn not_if(mut self, condition: Condition) -> Self {
        self.guards.push(Guard::not_if(condition));
        self
    }

    /// Skip the resource when `path` already exists
    pub fn creates(self, path: impl Into<PathBuf>) -> Self {
        self.not_if(Condition::PathExists(path.into()))
    }

    /// Exit codes accepted as success
    pub fn returns(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.returns = codes.into_iter().collect();
        self
    }

    pub fn ignore_failure(mut self) -> Self {
        self.ignore_failure = true;
        self
    }

    /// Run `action` on `target` right after this resource changes
    pub fn notifies_immediately(self, action: Action, target: ResourceId) -> Self {
        self.notifies(action, target, Timing::Immediate, Trigger::Changed)
    }

    /// Run `action` on `target` once at the end of the run if this resource changed
    pub fn notifies_delayed(self, action: Action, target: ResourceId) -> Self {
        self.notifies(action, target, Timing::Delayed, Trigger::Changed)
    }

    pub fn notifies(
        mut self,
        action: Action,
        target: ResourceId,
        timing: Timing,
        trigger: Trigger,
    ) -> Self {
        self.notifies.push(NotifySpec {
            action,
            resource: target,
            timing,
            trigger,
        });
        self
    }

    /// Run `action` on this resource when `source` changes
    pub fn subscribes(mut self, action: Action, source: ResourceId, timing: Timing) -> Self {
        self.subscribes.push(NotifySpec {
            action,
            resource: source,
            timing,
            trigger: Trigger::Changed,
        });
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Boolean attribute; absent means `false`
    pub fn flag(&self, key: &str) -> bool {
        self.attribute(key)
            .is_some_and(|v| matches!(v, "true" | "yes" | "1"))
    }

    /// Attributes whose keys start with `prefix`, with the prefix stripped
    pub fn prefixed(&self, prefix: &str) -> Attributes {
        self.attributes
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix).map(|k| (k.to_string(), v.clone())))
            .collect()
    }

    pub fn accepts_exit_code(&self, code: i32) -> bool {
        self.returns.contains(&code)
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        let actions: Vec<&str> = self.actions.iter().map(|a| a.as_str()).collect();
        format!("{} ({})", self.id, actions.join(", "))
    }

    /// Fold a re-declaration of the same identity into this one
    ///
    /// Attributes are overlaid, explicit actions replace ours, guards and
    /// notifications accumulate.
    pub fn merge(&mut self, other: Resource) {
        debug_assert_eq!(self.id, other.id);
        self.attributes.extend(other.attributes);
        if other.explicit_actions {
            self.actions = other.actions;
            self.explicit_actions = true;
        }
        self.guards.extend(other.guards);
        if other.returns != BTreeSet::from([0]) {
            self.returns = other.returns;
        }
        self.ignore_failure |= other.ignore_failure;
        self.notifies.extend(other.notifies);
        self.subscribes.extend(other.subscribes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{HostProbe, RunContext};
    use crate::platform::PlatformFacts;
    use std::path::Path;

    struct FakeHost(Vec<PathBuf>);

    impl HostProbe for FakeHost {
        fn path_exists(&self, path: &Path) -> bool {
            self.0.iter().any(|p| p == path)
        }
    }

    #[test]
    fn test_resource_id_round_trip() {
        let id: ResourceId = "service[rabbitmq-server]".parse().unwrap();
        assert_eq!(id.kind, ResourceKind::Service);
        assert_eq!(id.name, "rabbitmq-server");
        assert_eq!(id.to_string(), "service[rabbitmq-server]");
    }

    #[test]
    fn test_resource_id_rejects_malformed() {
        assert!("service".parse::<ResourceId>().is_err());
        assert!("service[]".parse::<ResourceId>().is_err());
        assert!("widget[x]".parse::<ResourceId>().is_err());
    }

    #[test]
    fn test_default_actions() {
        assert_eq!(Resource::directory("/etc/x").actions, vec![Action::Create]);
        assert_eq!(Resource::package("erlang").actions, vec![Action::Install]);
        assert_eq!(Resource::execute("x").actions, vec![Action::Run]);
        assert_eq!(Resource::service("x").actions, vec![Action::Nothing]);
    }

    #[test]
    fn test_guards_are_pure_over_context() {
        let facts = PlatformFacts::new("debian", "12");
        let host = FakeHost(vec![PathBuf::from("/var/lib/rabbitmq/.erlang.cookie")]);
        let mut attrs = Attributes::new();
        attrs.insert("rabbitmq.cluster".into(), "true".into());
        let ctx = RunContext::new(&facts, &attrs, &host);

        let cookie = Guard::not_if(Condition::PathExists(
            "/var/lib/rabbitmq/.erlang.cookie".into(),
        ));
        assert!(!cookie.allows(&ctx));

        let clustered = Guard::only_if(Condition::AttributeTrue("rabbitmq.cluster".into()));
        assert!(clustered.allows(&ctx));

        let debian = Guard::only_if(Condition::AttributeEquals {
            key: "platform_family".into(),
            value: "debian".into(),
        });
        assert!(debian.allows(&ctx));
    }

    #[test]
    fn test_merge_redeclaration() {
        let mut first = Resource::directory("/etc/rabbitmq").owner("root").mode("0755");
        let second = Resource::directory("/etc/rabbitmq")
            .mode("0750")
            .action(Action::Delete);
        first.merge(second);

        assert_eq!(first.attribute("owner"), Some("root"));
        assert_eq!(first.attribute("mode"), Some("0750"));
        assert_eq!(first.actions, vec![Action::Delete]);
    }

    #[test]
    fn test_merge_keeps_actions_when_redeclared_without_any() {
        let mut first = Resource::service("rabbitmq-server").actions([Action::Enable, Action::Restart]);
        first.merge(Resource::service("rabbitmq-server").attr("supports_status", "true"));
        assert_eq!(first.actions, vec![Action::Enable, Action::Restart]);
        assert!(first.flag("supports_status"));
    }

    #[test]
    fn test_returns_and_prefixed() {
        let r = Resource::execute("create user")
            .returns([0, 2])
            .attr("env.HOME", "/root")
            .attr("env.LANG", "C");
        assert!(r.accepts_exit_code(2));
        assert!(!r.accepts_exit_code(1));
        assert_eq!(r.prefixed("env.").len(), 2);
    }
}
