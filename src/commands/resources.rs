//! `warren resources`

use anyhow::Result;
use colored::Colorize;
use declarative::{Resource, RunList};

use super::Session;
use crate::Context;
use crate::cli::TargetArgs;
use crate::ui;

const COMMAND_WIDTH: usize = 60;

pub fn run(ctx: &Context, target: TargetArgs) -> Result<()> {
    let session = Session::load(ctx, &target)?;
    let run_list = session.run_list()?;

    ui::header(&format!(
        "Run list for {} {} ({} resources)",
        session.facts.platform,
        session.facts.version,
        run_list.len()
    ));
    for line in describe_run_list(&run_list) {
        println!("{line}");
    }
    Ok(())
}

/// Display lines for every resource, in run order
pub fn describe_run_list(run_list: &RunList) -> Vec<String> {
    let mut lines = Vec::new();
    for (handle, resource) in run_list.iter() {
        let actions: Vec<String> = resource.actions.iter().map(|a| format!(":{a}")).collect();
        lines.push(format!(
            "{:>3}. {} {}",
            handle.index() + 1,
            resource.id.to_string().bold(),
            actions.join(" ").cyan()
        ));
        lines.extend(details(resource).into_iter().map(|d| format!("       {}", d.dimmed())));

        for sub in run_list.subscriptions().iter().filter(|s| s.source == handle) {
            lines.push(format!(
                "       {} {} :{} ({})",
                "notifies".yellow(),
                run_list.get(sub.target).id,
                sub.action,
                sub.timing
            ));
        }
    }
    lines
}

fn details(resource: &Resource) -> Vec<String> {
    let mut details: Vec<String> = resource.guards.iter().map(ToString::to_string).collect();
    if let Some(command) = resource.attribute("command")
        && !resource.flag("sensitive")
    {
        details.push(format!("command: {}", ui::truncate_end(command, COMMAND_WIDTH)));
    }
    if resource.returns.len() > 1 {
        let codes: Vec<String> = resource.returns.iter().map(ToString::to_string).collect();
        details.push(format!("returns: {}", codes.join(", ")));
    }
    if resource.ignore_failure {
        details.push("ignore_failure".to_string());
    }
    details
}
