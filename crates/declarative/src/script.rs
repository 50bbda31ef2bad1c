//! Scripts and run lists
//!
//! A [`Script`] is what a recipe declares: resources and platform branches
//! in order. Resolving it against [`PlatformFacts`] flattens the branches,
//! folds re-declared identities into their first declaration, and resolves
//! every notification to a [`ResourceHandle`]. The result is a [`RunList`],
//! which is fully validated before anything runs.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::notify::{ResourceHandle, Subscription};
use crate::platform::{PlatformBranches, PlatformFacts, select_branch};
use crate::provider::ProviderRegistry;
use crate::resource::{Resource, ResourceId};
use crate::types::Action;

/// One entry of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Resource(Resource),
    Platform(PlatformBranches),
}

/// An ordered declaration of resources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: Resource) {
        self.steps.push(Step::Resource(resource));
    }

    pub fn add_platform(&mut self, branches: PlatformBranches) {
        self.steps.push(Step::Platform(branches));
    }

    /// Builder-style [`add`](Self::add)
    pub fn resource(mut self, resource: Resource) -> Self {
        self.add(resource);
        self
    }

    /// Builder-style [`add_platform`](Self::add_platform)
    pub fn platform(mut self, branches: PlatformBranches) -> Self {
        self.add_platform(branches);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Flatten the script for the host described by `facts`
    ///
    /// On an unsupported platform the branches contribute nothing, unless
    /// `strict` is set, in which case resolution fails.
    pub fn resolve(&self, facts: &PlatformFacts, strict: bool) -> Result<RunList> {
        let has_branches = self.steps.iter().any(|s| matches!(s, Step::Platform(_)));
        if has_branches && !facts.family.is_supported() {
            if strict {
                return Err(Error::UnsupportedPlatform(facts.platform.clone()));
            }
            log::warn!(
                "Platform '{}' is not supported; skipping platform-specific resources",
                facts.platform
            );
        }

        let mut resources = Vec::new();
        for step in &self.steps {
            match step {
                Step::Resource(resource) => resources.push(resource.clone()),
                Step::Platform(branches) => {
                    resources.extend(select_branch(facts, branches).iter().cloned());
                }
            }
        }
        RunList::build(resources)
    }
}

/// The flattened, validated list of resources for one run
#[derive(Debug, Clone, Default)]
pub struct RunList {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, ResourceHandle>,
    subscriptions: Vec<Subscription>,
}

impl RunList {
    /// Build a run list from resources in declaration order
    ///
    /// A re-declared identity is merged into the first declaration and keeps
    /// its position. Every `notifies` target and `subscribes` source must be
    /// declared somewhere in the list.
    pub fn build(declared: impl IntoIterator<Item = Resource>) -> Result<Self> {
        let mut resources: Vec<Resource> = Vec::new();
        let mut index: HashMap<ResourceId, ResourceHandle> = HashMap::new();

        for resource in declared {
            if let Some(handle) = index.get(&resource.id).copied() {
                log::debug!("Merging re-declared {}", resource.id);
                let existing = &mut resources[handle.index()];
                existing.merge(resource);
            } else {
                index.insert(resource.id.clone(), ResourceHandle(resources.len()));
                resources.push(resource);
            }
        }

        let mut subscriptions = Vec::new();
        for (position, resource) in resources.iter().enumerate() {
            let this = ResourceHandle(position);
            if resource.actions.is_empty() {
                return Err(Error::NoActions(resource.id.clone()));
            }

            for spec in &resource.notifies {
                let target = index.get(&spec.resource).copied().ok_or_else(|| {
                    Error::DanglingNotification {
                        source_id: resource.id.clone(),
                        target: spec.resource.clone(),
                    }
                })?;
                subscriptions.push(Subscription {
                    source: this,
                    trigger: spec.trigger,
                    target,
                    action: spec.action,
                    timing: spec.timing,
                });
            }

            for spec in &resource.subscribes {
                let source = index.get(&spec.resource).copied().ok_or_else(|| {
                    Error::DanglingSubscription {
                        subscriber: resource.id.clone(),
                        source_id: spec.resource.clone(),
                    }
                })?;
                subscriptions.push(Subscription {
                    source,
                    trigger: spec.trigger,
                    target: this,
                    action: spec.action,
                    timing: spec.timing,
                });
            }
        }

        Ok(Self {
            resources,
            index,
            subscriptions,
        })
    }

    /// Check that a provider exists for every resource and supports every
    /// declared or notified action
    pub fn validate_with(&self, registry: &ProviderRegistry) -> Result<()> {
        for resource in &self.resources {
            if registry.get(resource.kind()).is_none() {
                return Err(Error::NoProvider(resource.kind()));
            }
            for &action in &resource.actions {
                self.check_action(registry, resource, action)?;
            }
        }
        for sub in &self.subscriptions {
            self.check_action(registry, self.get(sub.target), sub.action)?;
        }
        Ok(())
    }

    fn check_action(
        &self,
        registry: &ProviderRegistry,
        resource: &Resource,
        action: Action,
    ) -> Result<()> {
        if registry.supports(resource.kind(), action) {
            Ok(())
        } else {
            Err(Error::UnsupportedAction {
                resource: resource.id.clone(),
                action,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resource at `handle`
    ///
    /// Handles are only ever produced by this run list, so they are always
    /// in bounds.
    pub fn get(&self, handle: ResourceHandle) -> &Resource {
        &self.resources[handle.index()]
    }

    pub fn handle(&self, id: &ResourceId) -> Option<ResourceHandle> {
        self.index.get(id).copied()
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Resources with their handles, in run order
    pub fn iter(&self) -> impl Iterator<Item = (ResourceHandle, &Resource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(i, r)| (ResourceHandle(i), r))
    }

    /// Resolved notification edges, in registration order
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Timing;
    use crate::types::ResourceKind;

    fn service_id() -> ResourceId {
        ResourceId::new(ResourceKind::Service, "rabbitmq-server")
    }

    fn broker_script() -> Script {
        Script::new()
            .resource(Resource::directory("/etc/rabbitmq"))
            .platform(
                PlatformBranches::new()
                    .debian([Resource::apt_repository("rabbitmq"), Resource::package("rabbitmq-server")])
                    .redhat([
                        Resource::remote_file("/tmp/rabbitmq-server.rpm"),
                        Resource::package("rabbitmq-server"),
                    ]),
            )
            .resource(Resource::service("rabbitmq-server"))
    }

    #[test]
    fn test_resolve_debian_branch() {
        let list = broker_script()
            .resolve(&PlatformFacts::new("ubuntu", "22.04"), false)
            .unwrap();
        let ids: Vec<String> = list.resources().iter().map(|r| r.id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "directory[/etc/rabbitmq]",
                "apt_repository[rabbitmq]",
                "package[rabbitmq-server]",
                "service[rabbitmq-server]",
            ]
        );
    }

    #[test]
    fn test_resolve_unsupported_platform() {
        let facts = PlatformFacts::new("freebsd", "14");
        let list = broker_script().resolve(&facts, false).unwrap();
        assert_eq!(list.len(), 2);

        let err = broker_script().resolve(&facts, true).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform(p) if p == "freebsd"));
    }

    #[test]
    fn test_redeclaration_keeps_first_position() {
        let list = RunList::build([
            Resource::directory("/etc/rabbitmq").mode("0755"),
            Resource::package("erlang"),
            Resource::directory("/etc/rabbitmq").owner("rabbitmq"),
        ])
        .unwrap();

        assert_eq!(list.len(), 2);
        let dir = list.get(ResourceHandle(0));
        assert_eq!(dir.attribute("mode"), Some("0755"));
        assert_eq!(dir.attribute("owner"), Some("rabbitmq"));
    }

    #[test]
    fn test_notifications_resolve_to_handles() {
        let list = RunList::build([
            Resource::service("rabbitmq-server"),
            Resource::template("/etc/rabbitmq/rabbitmq.config")
                .notifies_immediately(Action::Restart, service_id()),
            Resource::execute("rabbitmq-plugins enable").subscribes(
                Action::Run,
                ResourceId::new(ResourceKind::Package, "rabbitmq-server"),
                Timing::Delayed,
            ),
            Resource::package("rabbitmq-server"),
        ])
        .unwrap();

        let subs = list.subscriptions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].source, ResourceHandle(1));
        assert_eq!(subs[0].target, ResourceHandle(0));
        assert_eq!(subs[1].source, ResourceHandle(3));
        assert_eq!(subs[1].target, ResourceHandle(2));
        assert_eq!(list.handle(&service_id()), Some(ResourceHandle(0)));
    }

    #[test]
    fn test_dangling_notification_rejected() {
        let err = RunList::build([Resource::template("/etc/rabbitmq/rabbitmq.config")
            .notifies_delayed(Action::Restart, service_id())])
        .unwrap_err();
        assert!(matches!(err, Error::DanglingNotification { .. }));
        assert!(err.to_string().contains("service[rabbitmq-server]"));
    }

    #[test]
    fn test_dangling_subscription_rejected() {
        let err = RunList::build([Resource::service("rabbitmq-server").subscribes(
            Action::Restart,
            ResourceId::new(ResourceKind::Template, "/etc/missing"),
            Timing::Delayed,
        )])
        .unwrap_err();
        assert!(matches!(err, Error::DanglingSubscription { .. }));
    }

    #[test]
    fn test_empty_actions_rejected() {
        let err = RunList::build([Resource::package("erlang").actions([])]).unwrap_err();
        assert!(matches!(err, Error::NoActions(_)));
    }
}
