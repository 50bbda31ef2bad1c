//! `warren facts`

use anyhow::Result;
use declarative::PlatformFamily;

use super::Session;
use crate::Context;
use crate::cli::TargetArgs;
use crate::runner::command_exists;
use crate::state::RunRecord;
use crate::system::AssetStore;
use crate::ui;

pub fn run(ctx: &Context, target: TargetArgs) -> Result<()> {
    let session = Session::load(ctx, &target)?;

    ui::header("Platform");
    for (key, value) in session.facts.as_attributes() {
        ui::kv(&key, &value);
    }

    ui::section("Config");
    match &session.config_path {
        Some(path) => ui::kv("file", &path.display().to_string()),
        None => ui::kv("file", "(none, using defaults)"),
    }

    ui::section("Node attributes");
    for (key, value) in &session.attributes {
        ui::kv(key, &ui::redact(key, value));
    }

    ui::section("Tools");
    for tool in tools_for(session.facts.family) {
        let found = if command_exists(tool) { "found" } else { "missing" };
        ui::kv(tool, found);
    }

    ui::section("Built-in assets");
    let paths = &session.config.paths;
    let templates: Vec<&str> = AssetStore::templates(paths.templates_dir())
        .builtin_names()
        .collect();
    let files: Vec<&str> = AssetStore::files(paths.files_dir()).builtin_names().collect();
    ui::kv("templates", &templates.join(", "));
    ui::kv("files", &files.join(", "));

    ui::section("Last run");
    match RunRecord::last_run_path().and_then(|path| RunRecord::load(&path)) {
        Ok(record) => {
            ui::kv("finished", &record.finished_at.to_rfc3339());
            ui::kv("status", &record.status.to_string());
            ui::kv("duration", &format!("{}s", record.duration().num_seconds()));
            ui::kv(
                "resources",
                &format!(
                    "{} updated, {} up to date, {} skipped",
                    record.summary.updated, record.summary.up_to_date, record.summary.skipped
                ),
            );
        }
        Err(e) => {
            log::debug!("No last run: {e:#}");
            ui::dim("no recorded run");
        }
    }
    Ok(())
}

/// External tools the providers rely on for a platform family
fn tools_for(family: PlatformFamily) -> Vec<&'static str> {
    let mut tools = match family {
        PlatformFamily::Debian => vec!["dpkg-query", "apt-get", "update-rc.d"],
        PlatformFamily::RedHat => vec!["rpm", "yum", "chkconfig"],
        PlatformFamily::Unsupported => Vec::new(),
    };
    tools.extend(["systemctl", "service", "rabbitmqctl"]);
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tools_for_family() {
        assert!(tools_for(PlatformFamily::Debian).contains(&"apt-get"));
        assert!(tools_for(PlatformFamily::RedHat).contains(&"chkconfig"));
        assert_eq!(tools_for(PlatformFamily::Unsupported).len(), 3);
    }
}
