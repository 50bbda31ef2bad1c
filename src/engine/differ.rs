//! Plan display

use colored::{ColoredString, Colorize};
use declarative::{ResourceDiff, ResourceKind, ResourceState, group_by_kind};

use super::planner::Plan;

/// Display a plan in a user-friendly format
pub fn display_plan(plan: &Plan) {
    let diffs = plan.diffs();
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Convergence Plan".bold()
    );
    println!("│");

    for (kind, kind_diffs) in group_by_kind(diffs.iter().copied()) {
        println!("│ {}", kind_heading(kind).bold());
        for diff in kind_diffs {
            println!(
                "│   {} {:<40} {}",
                change_symbol(diff),
                diff.resource_id.name,
                describe(diff).dimmed()
            );
            if diff.is_modification() {
                for change in &diff.changes {
                    println!("│       {}", change.to_string().dimmed());
                }
            }
            if let Some(content) = plan.content_diffs.get(&diff.resource_id) {
                for line in content.lines() {
                    println!("│       {}", colorize_diff_line(line));
                }
            }
        }
        println!("│");
    }

    let fired = &plan.report.notifications;
    if !fired.is_empty() {
        println!("│ {}", "Notifications".bold());
        for n in fired {
            println!(
                "│   {} {} :{} ({}, from {})",
                "↳".cyan(),
                n.target,
                n.action,
                n.timing,
                n.source
            );
        }
        println!("│");
    }

    let summary = plan.summary();
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to add, {} to change, {} to remove, {} to run)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red(),
        summary.unconditional.to_string().cyan()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn kind_heading(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Directory => "Directories",
        ResourceKind::Template => "Templates",
        ResourceKind::File => "Files",
        ResourceKind::RemoteFile => "Downloads",
        ResourceKind::Package => "Packages",
        ResourceKind::Execute => "Commands",
        ResourceKind::Service => "Services",
        ResourceKind::AptRepository => "Apt repositories",
    }
}

fn change_symbol(diff: &ResourceDiff) -> ColoredString {
    if diff.is_addition() {
        "+".green()
    } else if diff.is_removal() {
        "-".red()
    } else if diff.is_modification() {
        "~".yellow()
    } else {
        "!".cyan()
    }
}

/// Short description of the transition a diff represents
pub fn describe(diff: &ResourceDiff) -> String {
    match (&diff.current, &diff.desired) {
        (ResourceState::Absent, ResourceState::Present { attributes }) => {
            let version = attributes
                .get("version")
                .map(|v| format!(" → {v}"))
                .unwrap_or_default();
            format!("(missing){version}")
        }
        (ResourceState::Present { .. }, ResourceState::Absent) => {
            format!(":{} (will remove)", diff.action)
        }
        (ResourceState::Present { .. }, ResourceState::Present { .. }) => {
            let keys: Vec<&str> = diff.changes.iter().map(|c| c.key.as_str()).collect();
            format!("({})", keys.join(", "))
        }
        _ => format!(":{}", diff.action),
    }
}

fn colorize_diff_line(line: &str) -> ColoredString {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold()
    } else if line.starts_with('+') {
        line.green()
    } else if line.starts_with('-') {
        line.red()
    } else if line.starts_with("@@") {
        line.cyan()
    } else {
        line.dimmed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Action, Attributes, Resource};

    fn diff(resource: &Resource, action: Action, current: ResourceState, desired: ResourceState) -> ResourceDiff {
        ResourceDiff::compute(resource, action, &current, &desired)
    }

    fn present(pairs: &[(&str, &str)]) -> ResourceState {
        ResourceState::with_attributes(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Attributes>(),
        )
    }

    #[test]
    fn test_describe_install_shows_version() {
        let package = Resource::package("rabbitmq-server");
        let d = diff(
            &package,
            Action::Install,
            ResourceState::Absent,
            present(&[("version", "2.8.7-1")]),
        );
        assert_eq!(describe(&d), "(missing) → 2.8.7-1");
    }

    #[test]
    fn test_describe_modification_lists_keys() {
        let dir = Resource::directory("/etc/rabbitmq");
        let d = diff(
            &dir,
            Action::Create,
            present(&[("mode", "0700"), ("owner", "root")]),
            present(&[("mode", "0755"), ("owner", "root")]),
        );
        assert_eq!(describe(&d), "(mode)");
    }

    #[test]
    fn test_describe_removal_and_commands() {
        let dir = Resource::directory("/tmp/old");
        let removal = diff(&dir, Action::Delete, present(&[]), ResourceState::Absent);
        assert_eq!(describe(&removal), ":delete (will remove)");

        let exec = Resource::execute("create admin user");
        let run = diff(&exec, Action::Run, ResourceState::Unknown, ResourceState::Unknown);
        assert_eq!(describe(&run), ":run");
    }

    #[test]
    fn test_every_kind_has_a_heading() {
        for kind in ResourceKind::ALL {
            assert!(!kind_heading(kind).is_empty());
        }
    }
}
