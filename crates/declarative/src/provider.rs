//! Provider trait and registry
//!
//! A Provider knows how to observe and change one kind of resource.
//! Providers are stateless across resources: everything they need comes
//! from the [`Resource`] they are handed and the [`RunContext`].

use anyhow::Result;
use std::collections::HashMap;

use crate::context::RunContext;
use crate::resource::Resource;
use crate::types::{Action, ApplyResult, ResourceKind, ResourceState};

/// Core trait for resource providers
///
/// The engine drives every declared action through the same three calls:
///
/// 1. [`query_state`](Provider::query_state) observes the system
/// 2. [`desired_state`](Provider::desired_state) states what the action wants
/// 3. [`apply_action`](Provider::apply_action) converges, only when needed
///
/// Notified actions skip the first two and call `apply_action` directly.
///
/// # Example
///
/// ```ignore
/// use declarative::{Action, ApplyResult, Provider, Resource, ResourceKind, ResourceState, RunContext};
///
/// struct MarkerProvider;
///
/// impl Provider for MarkerProvider {
///     fn kind(&self) -> ResourceKind {
///         ResourceKind::File
///     }
///
///     fn supported_actions(&self) -> &'static [Action] {
///         &[Action::Create]
///     }
///
///     fn query_state(&self, r: &Resource, _: Action, _: &RunContext) -> anyhow::Result<ResourceState> {
///         if std::path::Path::new(r.name()).exists() {
///             Ok(ResourceState::present())
///         } else {
///             Ok(ResourceState::Absent)
///         }
///     }
///
///     fn apply_action(&self, r: &Resource, _: Action, _: &RunContext) -> anyhow::Result<ApplyResult> {
///         std::fs::write(r.name(), b"")?;
///         Ok(ApplyResult::Created)
///     }
/// }
/// ```
pub trait Provider: Send + Sync {
    /// Resource kind this provider serves
    fn kind(&self) -> ResourceKind;

    /// Actions this provider implements, besides `nothing`
    fn supported_actions(&self) -> &'static [Action];

    /// Observe the current state of `resource` as it matters to `action`
    fn query_state(
        &self,
        resource: &Resource,
        action: Action,
        ctx: &RunContext,
    ) -> Result<ResourceState>;

    /// The state `action` should leave behind
    ///
    /// The default covers providers that only track existence: removal
    /// actions want the resource absent, unconditional actions have no
    /// observable target, and everything else wants it present.
    /// Providers that compare attributes override this.
    fn desired_state(
        &self,
        _resource: &Resource,
        action: Action,
        _ctx: &RunContext,
    ) -> Result<ResourceState> {
        Ok(match action {
            Action::Delete | Action::Remove => ResourceState::Absent,
            Action::Run | Action::Restart | Action::Reload => ResourceState::Unknown,
            _ => ResourceState::present(),
        })
    }

    /// Perform `action`
    ///
    /// Called only when the engine decided the action is needed, or when
    /// the action was notified. Never called during a dry run.
    fn apply_action(
        &self,
        resource: &Resource,
        action: Action,
        ctx: &RunContext,
    ) -> Result<ApplyResult>;

    /// Unified diff of managed content, for providers that write files
    fn content_diff(&self, _resource: &Resource, _ctx: &RunContext) -> Result<Option<String>> {
        Ok(None)
    }

    /// Whether this provider implements `action`
    fn supports(&self, action: Action) -> bool {
        action == Action::Nothing || self.supported_actions().contains(&action)
    }
}

/// Providers indexed by the resource kind they serve
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ResourceKind, Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any earlier one for the same kind
    pub fn register(&mut self, provider: Box<dyn Provider>) {
        let kind = provider.kind();
        if self.providers.insert(kind, provider).is_some() {
            log::debug!("Replaced provider for {kind}");
        }
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, provider: impl Provider + 'static) -> Self {
        self.register(Box::new(provider));
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&dyn Provider> {
        self.providers.get(&kind).map(AsRef::as_ref)
    }

    /// Whether some provider implements `action` for `kind`
    pub fn supports(&self, kind: ResourceKind, action: Action) -> bool {
        self.get(kind).is_some_and(|p| p.supports(action))
    }

    /// Registered kinds in declaration order of [`ResourceKind::ALL`]
    pub fn kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .filter(|k| self.providers.contains_key(k))
            .collect()
    }
}
