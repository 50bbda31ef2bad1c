//! Console progress for convergence runs
//!
//! A bar tracks resources as the engine walks the run list; finished
//! resources and fired notifications are printed above it.

use colored::Colorize;
use declarative::{
    ChangeRecord, FiredNotification, ProgressCallback, RecordStatus, ResourceFailure, ResourceId,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Renders engine progress on the terminal
pub struct ConsoleProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            quiet,
        }
    }

    /// Clear the bar once the run is over
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn print(&self, line: String) {
        if !self.quiet {
            self.bar.println(line);
        }
    }
}

impl ProgressCallback for ConsoleProgress {
    fn on_run_start(&mut self, total: usize) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} ({pos}/{len}) [{bar:30.green/dim}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bar = bar;
    }

    fn on_resource_start(&mut self, _id: &ResourceId, description: &str) {
        self.bar.set_message(description.to_string());
    }

    fn on_resource_complete(&mut self, record: &ChangeRecord) {
        self.bar.inc(1);
        self.print(record_line(record));
    }

    fn on_notification(&mut self, fired: &FiredNotification) {
        self.print(notification_line(fired));
    }

    fn on_resource_failed(&mut self, failure: &ResourceFailure) {
        self.bar.abandon();
        self.print(format!(
            "  {} {} :{}",
            "✗".red(),
            failure.resource,
            failure.action
        ));
    }
}

/// One output line for a finished resource
pub fn record_line(record: &ChangeRecord) -> String {
    let (symbol, label) = match record.status {
        RecordStatus::Updated => ("✓".green(), "updated".green()),
        RecordStatus::WouldUpdate => ("~".yellow(), "would update".yellow()),
        RecordStatus::UpToDate => ("○".dimmed(), "up to date".dimmed()),
        RecordStatus::GuardSkipped => ("⊘".blue(), "skipped".blue()),
        RecordStatus::Tolerated => ("⚠".yellow(), "failed (ignored)".yellow()),
    };
    let actions: Vec<String> = record
        .steps
        .iter()
        .map(|s| format!(":{} {}", s.action, s.result))
        .collect();

    let mut line = format!("  {symbol} {} {label}", record.resource_id);
    if !actions.is_empty() {
        line.push_str(&format!(" ({})", actions.join(", ")).dimmed().to_string());
    }
    if let Some(reason) = &record.error {
        line.push_str(&format!(" [{reason}]").dimmed().to_string());
    }
    line
}

pub fn notification_line(fired: &FiredNotification) -> String {
    format!(
        "    {} {} :{} ({}, from {}): {}",
        "↳".cyan(),
        fired.target,
        fired.action,
        fired.timing,
        fired.source,
        fired.result
    )
}
