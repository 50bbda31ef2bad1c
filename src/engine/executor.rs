//! Apply flow: plan, confirm, converge

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{Engine, ProviderRegistry, RunContext, RunFailure, RunList, RunReport, RunSummary};

use super::differ::display_plan;
use super::planner::{Plan, plan};
use crate::progress::ConsoleProgress;

/// Options for an apply run
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// No plan or progress output
    pub quiet: bool,
}

/// How an apply run ended
#[derive(Debug)]
pub enum Outcome {
    /// Dry run: nothing was applied
    Planned(Plan),
    /// The user declined the plan
    Aborted,
    Converged(RunReport),
    /// A resource failed and halted the run
    Failed(Box<RunFailure>),
}

impl Outcome {
    /// The report to persist, if the run reached the engine
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Planned(plan) => Some(&plan.report),
            Self::Aborted => None,
            Self::Converged(report) => Some(report),
            Self::Failed(failure) => Some(&failure.report),
        }
    }
}

/// Plan, confirm (unless `yes`), and converge `run_list`
pub fn execute(
    registry: &ProviderRegistry,
    run_list: &RunList,
    ctx: &RunContext,
    opts: &ApplyOptions,
) -> Result<Outcome> {
    let plan = plan(registry, run_list, ctx)?;
    if !opts.quiet {
        display_plan(&plan);
    }

    if opts.dry_run {
        if !opts.quiet {
            println!();
            println!("  {} Dry run - no changes made", "ℹ".blue());
        }
        return Ok(Outcome::Planned(plan));
    }

    if !plan.has_changes() {
        let mut report = plan.report;
        report.dry_run = false;
        return Ok(Outcome::Converged(report));
    }

    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(Outcome::Aborted);
    }

    if !opts.quiet {
        println!();
        println!(
            "  {} Converging {} resources...",
            "→".cyan(),
            run_list.len()
        );
    }

    let live = RunContext::new(ctx.facts, ctx.attributes, ctx.host);
    let mut progress = ConsoleProgress::new(opts.quiet);
    let result = Engine::new(registry).converge(run_list, &live, &mut progress);
    progress.finish();

    Ok(match result {
        Ok(report) => {
            if !opts.quiet {
                print_summary(&report.summary(), true);
            }
            Outcome::Converged(report)
        }
        Err(failure) => {
            if !opts.quiet {
                print_summary(&failure.report.summary(), false);
            }
            Outcome::Failed(failure)
        }
    })
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Apply these changes?")
        .default(true)
        .interact()
        .context("Could not read confirmation (pass --yes to skip it)")?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(summary: &RunSummary, success: bool) {
    println!();
    if success {
        println!("  {} Node converged", "✓".green().bold());
    } else {
        println!("  {} Run halted by a failing resource", "✗".red().bold());
    }

    if summary.updated > 0 {
        println!("    • {} resources updated", summary.updated);
    }
    if summary.up_to_date > 0 {
        println!("    • {} resources up to date", summary.up_to_date);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped by guards", summary.skipped);
    }
    if summary.tolerated > 0 {
        println!("    • {} {} ignored", summary.tolerated, "failures".yellow());
    }
    if summary.notifications > 0 {
        println!("    • {} notifications delivered", summary.notifications);
    }
}
