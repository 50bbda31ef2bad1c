//! Persisted run reports
//!
//! Every apply writes what it did to `last-run.json` in the state
//! directory, so the last convergence can be inspected after the fact.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{Action, PlatformFacts, ResourceId, RunReport, RunSummary};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::Outcome;
use crate::paths;

/// File name of the last report inside the state directory
pub const LAST_RUN_FILE: &str = "last-run.json";

/// How a recorded run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunStatus {
    Planned,
    Converged,
    Failed {
        resource: ResourceId,
        action: Action,
        error: String,
    },
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planned => f.write_str("planned"),
            Self::Converged => f.write_str("converged"),
            Self::Failed {
                resource, action, ..
            } => write!(f, "failed at {resource} :{action}"),
        }
    }
}

/// One apply run, as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub hostname: String,
    pub platform: String,
    pub platform_version: String,
    /// `recipe` or the path of the script file
    pub script: String,
    #[serde(flatten)]
    pub status: RunStatus,
    pub summary: RunSummary,
    pub report: RunReport,
}

impl RunRecord {
    /// Build a record from a finished run; `None` when the run was aborted
    pub fn from_outcome(
        outcome: &Outcome,
        facts: &PlatformFacts,
        script: &str,
        started_at: DateTime<Utc>,
    ) -> Option<Self> {
        let status = match outcome {
            Outcome::Aborted => return None,
            Outcome::Planned(_) => RunStatus::Planned,
            Outcome::Converged(_) => RunStatus::Converged,
            Outcome::Failed(failure) => RunStatus::Failed {
                resource: failure.failure.resource.clone(),
                action: failure.failure.action,
                error: format!("{:#}", failure.failure.error),
            },
        };
        let report = outcome.report()?.clone();
        Some(Self {
            started_at,
            finished_at: Utc::now(),
            hostname: facts.hostname.clone(),
            platform: facts.platform.clone(),
            platform_version: facts.version.clone(),
            script: script.to_string(),
            status,
            summary: report.summary(),
            report,
        })
    }

    /// Path of the last-run report
    pub fn last_run_path() -> Result<PathBuf> {
        Ok(paths::state_dir()?.join(LAST_RUN_FILE))
    }

    /// Write the record as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
        log::debug!("Saved run report to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run report: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run report: {}", path.display()))
    }

    /// Wall-clock duration of the run
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
