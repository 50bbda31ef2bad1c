//! `warren apply` and `warren plan`

use anyhow::Result;
use chrono::Utc;
use declarative::{LocalHost, RunContext};

use super::Session;
use crate::Context;
use crate::cli::{ApplyArgs, TargetArgs};
use crate::engine::{self, ApplyOptions, Outcome};
use crate::state::RunRecord;
use crate::ui;

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let started_at = Utc::now();
    let session = Session::load(ctx, &args.target)?;
    let run_list = session.run_list()?;
    let registry = session.registry();
    run_list.validate_with(&registry)?;

    if !ctx.quiet {
        ui::header(&format!(
            "Converging {} ({} {})",
            session.facts.hostname, session.facts.platform, session.facts.version
        ));
        ui::kv("script", &session.script_label);
        ui::kv("resources", &run_list.len().to_string());
    }

    let run_ctx = RunContext::new(&session.facts, &session.attributes, &LocalHost);
    let opts = ApplyOptions {
        dry_run: args.dry_run,
        yes: args.yes,
        quiet: ctx.quiet,
    };
    let outcome = engine::execute(&registry, &run_list, &run_ctx, &opts)?;

    if let Some(record) =
        RunRecord::from_outcome(&outcome, &session.facts, &session.script_label, started_at)
    {
        // dry runs never replace the last real run
        if !args.dry_run
            && let Err(e) = RunRecord::last_run_path().and_then(|path| record.save(&path))
        {
            log::warn!("Could not save the last-run report: {e:#}");
        }
        if let Some(path) = &args.report {
            record.save(path)?;
            if !ctx.quiet {
                ui::dim(&format!("Report written to {}", path.display()));
            }
        }
    }

    match outcome {
        Outcome::Failed(failure) => Err(anyhow::Error::new(failure.failure)),
        Outcome::Planned(_) | Outcome::Aborted | Outcome::Converged(_) => Ok(()),
    }
}

pub fn plan(ctx: &Context, target: TargetArgs) -> Result<()> {
    apply(
        ctx,
        ApplyArgs {
            target,
            dry_run: true,
            yes: true,
            report: None,
        },
    )
}
