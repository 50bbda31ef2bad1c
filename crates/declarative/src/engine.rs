//! Convergence engine
//!
//! Walks a [`RunList`] once, top to bottom. Each resource is evaluated on
//! its own: guards first, then per action query, diff and (if needed) apply.
//! Change records are posted to the [`NotificationBus`] as they are
//! produced; delayed notifications run once after the last resource.
//!
//! The first error that is neither tolerated by its action nor absorbed by
//! `ignore_failure` halts the run. Nothing is rolled back.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{ProgressCallback, RunContext};
use crate::diff::ResourceDiff;
use crate::error::Error as ScriptError;
use crate::notify::{Delivery, FiredNotification, NotificationBus};
use crate::provider::{Provider, ProviderRegistry};
use crate::resource::{Resource, ResourceId};
use crate::script::RunList;
use crate::types::{
    Action, ActionStep, ApplyResult, ChangeRecord, Convergence, RunSummary,
};

/// A provider error that halted the run
#[derive(Error, Debug)]
#[error("{resource} failed to :{action}: {error:#}")]
pub struct ResourceFailure {
    pub resource: ResourceId,
    pub action: Action,
    pub error: anyhow::Error,
}

/// A halted run, with everything recorded before the failure
#[derive(Error, Debug)]
#[error("run halted: {failure}")]
pub struct RunFailure {
    pub failure: ResourceFailure,
    pub report: RunReport,
}

/// Everything a run did, in order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub records: Vec<ChangeRecord>,
    pub notifications: Vec<FiredNotification>,
    pub dry_run: bool,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for record in &self.records {
            summary.add_record(record);
        }
        summary.notifications = self.notifications.len();
        summary
    }

    /// Number of resources that changed (or would change)
    pub fn changed_count(&self) -> usize {
        self.records.iter().filter(|r| r.changed).count()
    }

    /// Diffs of every action that reached the apply step
    pub fn diffs(&self) -> impl Iterator<Item = &ResourceDiff> {
        self.records
            .iter()
            .flat_map(|r| r.steps.iter().map(|s| &s.diff))
    }
}

/// Drives providers over a run list
pub struct Engine<'a> {
    registry: &'a ProviderRegistry,
}

impl<'a> Engine<'a> {
    pub fn new(registry: &'a ProviderRegistry) -> Self {
        Self { registry }
    }

    fn provider(&self, resource: &Resource, action: Action) -> Result<&dyn Provider, ResourceFailure> {
        self.registry
            .get(resource.kind())
            .ok_or_else(|| ResourceFailure {
                resource: resource.id.clone(),
                action,
                error: ScriptError::NoProvider(resource.kind()).into(),
            })
    }

    /// Evaluate one resource: guards, then each declared action in order
    pub fn evaluate(
        &self,
        resource: &Resource,
        ctx: &RunContext,
    ) -> Result<ChangeRecord, ResourceFailure> {
        if let Some(guard) = resource.guards.iter().find(|g| !g.allows(ctx)) {
            log::info!("{} skipped due to {guard}", resource.id);
            return Ok(ChangeRecord::guard_skipped(
                resource.id.clone(),
                guard.to_string(),
            ));
        }

        let mut record = ChangeRecord::new(resource.id.clone());
        for &action in &resource.actions {
            if action.convergence() == Convergence::Never {
                continue;
            }
            let provider = self.provider(resource, action)?;

            match Self::converge_action(provider, resource, action, ctx) {
                Ok(Some(step)) => {
                    log::info!("{} :{action} {}", resource.id, step.result);
                    record.push_step(step, ctx.dry_run);
                }
                Ok(None) => log::debug!("{} :{action} up to date", resource.id),
                Err(error) if action.tolerates(&error) || resource.ignore_failure => {
                    log::warn!("{} :{action} failed (ignored): {error:#}", resource.id);
                    record.tolerate(action, &error);
                }
                Err(error) => {
                    return Err(ResourceFailure {
                        resource: resource.id.clone(),
                        action,
                        error,
                    });
                }
            }
        }
        Ok(record)
    }

    /// Query, diff, and apply one action when it is needed
    fn converge_action(
        provider: &dyn Provider,
        resource: &Resource,
        action: Action,
        ctx: &RunContext,
    ) -> anyhow::Result<Option<ActionStep>> {
        let current = provider.query_state(resource, action, ctx)?;
        let desired = provider.desired_state(resource, action, ctx)?;
        let diff = ResourceDiff::compute(resource, action, &current, &desired);

        let needed = match action.convergence() {
            Convergence::Never => false,
            Convergence::Always => true,
            Convergence::WhenAbsent => current.is_absent(),
            Convergence::WhenDiffers => diff.has_changes(),
        };
        if !needed {
            return Ok(None);
        }

        let result = if ctx.dry_run {
            ApplyResult::Skipped {
                reason: "dry run".to_string(),
            }
        } else {
            provider.apply_action(resource, action, ctx)?
        };
        Ok(Some(ActionStep {
            action,
            result,
            diff,
        }))
    }

    /// Perform a notified action on `target`, bypassing query and diff
    pub fn perform_notified(
        &self,
        target: &Resource,
        action: Action,
        ctx: &RunContext,
    ) -> Result<ApplyResult, ResourceFailure> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "dry run".to_string(),
            });
        }
        let provider = self.provider(target, action)?;
        match provider.apply_action(target, action, ctx) {
            Ok(result) => Ok(result),
            Err(error) if action.tolerates(&error) || target.ignore_failure => {
                log::warn!("{} :{action} failed (ignored): {error:#}", target.id);
                Ok(ApplyResult::Skipped {
                    reason: format!("failed: {error:#}"),
                })
            }
            Err(error) => Err(ResourceFailure {
                resource: target.id.clone(),
                action,
                error,
            }),
        }
    }

    fn deliver<P: ProgressCallback + ?Sized>(
        &self,
        run_list: &RunList,
        delivery: Delivery,
        ctx: &RunContext,
        report: &mut RunReport,
        progress: &mut P,
    ) -> Result<(), ResourceFailure> {
        let source = run_list.get(delivery.source);
        let target = run_list.get(delivery.target);
        log::info!(
            "{} notified {} :{} ({})",
            source.id,
            target.id,
            delivery.action,
            delivery.timing
        );

        let result = self.perform_notified(target, delivery.action, ctx)?;
        let fired = FiredNotification {
            source: source.id.clone(),
            target: target.id.clone(),
            action: delivery.action,
            timing: delivery.timing,
            result,
        };
        progress.on_notification(&fired);
        report.notifications.push(fired);
        Ok(())
    }

    /// Converge every resource in `run_list`, then drain delayed notifications
    pub fn converge<P: ProgressCallback + ?Sized>(
        &self,
        run_list: &RunList,
        ctx: &RunContext,
        progress: &mut P,
    ) -> Result<RunReport, Box<RunFailure>> {
        let mut bus = NotificationBus::new(run_list.subscriptions().iter().copied());
        let mut report = RunReport::new(ctx.dry_run);
        progress.on_run_start(run_list.len());

        for (handle, resource) in run_list.iter() {
            progress.on_resource_start(&resource.id, &resource.description());

            let record = match self.evaluate(resource, ctx) {
                Ok(record) => record,
                Err(failure) => {
                    progress.on_resource_failed(&failure);
                    return Err(Box::new(RunFailure { failure, report }));
                }
            };
            progress.on_resource_complete(&record);
            let changed = record.changed;
            report.records.push(record);

            if let Err(failure) = bus.notify(handle, changed, |delivery| {
                self.deliver(run_list, delivery, ctx, &mut report, progress)
            }) {
                progress.on_resource_failed(&failure);
                return Err(Box::new(RunFailure { failure, report }));
            }
        }

        if !bus.pending().is_empty() {
            log::debug!("Running {} delayed notifications", bus.pending().len());
        }
        if let Err(failure) =
            bus.drain(|delivery| self.deliver(run_list, delivery, ctx, &mut report, progress))
        {
            progress.on_resource_failed(&failure);
            return Err(Box::new(RunFailure { failure, report }));
        }

        Ok(report)
    }
}
