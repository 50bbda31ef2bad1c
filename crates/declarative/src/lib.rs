//! # Declarative
//!
//! An idempotent convergence engine for declared system state.
//!
//! A script declares resources in order. The engine walks them once: for
//! every action it asks the resource's provider for the current state,
//! diffs it against the desired state, and applies only what is missing.
//! Changes are routed to dependent resources through notifications.
//!
//! ## Core Concepts
//!
//! - **Resource**: a declared unit of state (directory, template, package, service...)
//! - **Provider**: observes and converges one kind of resource
//! - **Script / RunList**: ordered declarations, resolved per platform and validated
//! - **NotificationBus**: immediate and deduplicated delayed notified actions
//! - **Engine**: the single fail-fast pass over a run list
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     Action, Engine, LocalHost, NoProgress, PlatformBranches, PlatformFacts,
//!     ProviderRegistry, Resource, ResourceId, ResourceKind, RunContext, Script,
//! };
//!
//! let service = ResourceId::new(ResourceKind::Service, "rabbitmq-server");
//! let script = Script::new()
//!     .resource(Resource::directory("/etc/rabbitmq").mode("0755"))
//!     .platform(PlatformBranches::new().debian([Resource::package("rabbitmq-server")]))
//!     .resource(Resource::service("rabbitmq-server"))
//!     .resource(
//!         Resource::template("/etc/rabbitmq/rabbitmq.config")
//!             .source("rabbitmq.config")
//!             .notifies_immediately(Action::Restart, service),
//!     );
//!
//! let facts = PlatformFacts::detect();
//! let run_list = script.resolve(&facts, false)?;
//! run_list.validate_with(&registry)?;
//!
//! let attrs = Default::default();
//! let ctx = RunContext::new(&facts, &attrs, &LocalHost);
//! let report = Engine::new(&registry).converge(&run_list, &ctx, &mut NoProgress)?;
//! ```
//!
//! ## Collaborator Traits
//!
//! Providers reach the system only through traits, so the engine and every
//! provider can be tested with doubles:
//!
//! - [`CommandRunner`]: runs external commands
//! - [`PackageManager`]: queries, installs and removes packages
//! - [`ServiceManager`]: drives the init system
//! - [`TemplateRenderer`] and [`Fetcher`]: produce file content
//! - [`HostProbe`]: read-only host checks used by guards
//! - [`ProgressCallback`]: receives progress updates

pub mod context;
pub mod diff;
pub mod engine;
pub mod error;
pub mod notify;
pub mod platform;
pub mod provider;
pub mod resource;
pub mod script;
pub mod types;

// Re-export main types at crate root
pub use context::{
    CommandRunner, CommandSpec, Fetcher, HostProbe, LocalHost, NoProgress, PackageManager,
    ProgressCallback, RunContext, ServiceManager, ServiceSpec, ServiceStatus, TemplateRenderer,
};
pub use diff::{AttributeChange, DiffSummary, ResourceDiff, group_by_kind};
pub use engine::{Engine, ResourceFailure, RunFailure, RunReport};
pub use error::Error;
pub use notify::{
    Delivery, FiredNotification, NotificationBus, ResourceHandle, Subscription, Timing, Trigger,
};
pub use platform::{PlatformBranches, PlatformFacts, PlatformFamily, select_branch};
pub use provider::{Provider, ProviderRegistry};
pub use resource::{Condition, Guard, GuardMode, NotifySpec, Resource, ResourceId};
pub use script::{RunList, Script, Step};
pub use types::{
    Action, ActionStep, ApplyResult, Attributes, ChangeRecord, CommandOutput, Convergence,
    RecordStatus, ResourceKind, ResourceState, RunSummary,
};
