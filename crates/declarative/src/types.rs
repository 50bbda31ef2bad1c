//! Core types for declarative resource convergence

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::process::Output;
use std::str::FromStr;

use crate::diff::ResourceDiff;
use crate::error::Error;
use crate::resource::ResourceId;

/// Declared or observed attributes of a resource, keyed by attribute name
pub type Attributes = BTreeMap<String, String>;

/// Kind of a resource; each kind is served by exactly one provider
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Directory,
    Template,
    File,
    RemoteFile,
    Package,
    Execute,
    Service,
    AptRepository,
}

impl ResourceKind {
    pub const ALL: [Self; 8] = [
        Self::Directory,
        Self::Template,
        Self::File,
        Self::RemoteFile,
        Self::Package,
        Self::Execute,
        Self::Service,
        Self::AptRepository,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Template => "template",
            Self::File => "file",
            Self::RemoteFile => "remote_file",
            Self::Package => "package",
            Self::Execute => "execute",
            Self::Service => "service",
            Self::AptRepository => "apt_repository",
        }
    }

    /// Action used when a declaration names none
    pub fn default_action(self) -> Action {
        match self {
            Self::Directory | Self::Template | Self::File | Self::RemoteFile => Action::Create,
            Self::Package => Action::Install,
            Self::Execute => Action::Run,
            Self::Service => Action::Nothing,
            Self::AptRepository => Action::Add,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directory" => Ok(Self::Directory),
            "template" => Ok(Self::Template),
            "file" | "cookbook_file" => Ok(Self::File),
            "remote_file" => Ok(Self::RemoteFile),
            "package" | "rpm_package" | "apt_package" | "dpkg_package" => Ok(Self::Package),
            "execute" | "bash" | "script" => Ok(Self::Execute),
            "service" => Ok(Self::Service),
            "apt_repository" => Ok(Self::AptRepository),
            other => Err(Error::UnknownKind(other.to_string())),
        }
    }
}

/// Action a resource (or a notification) asks its provider to perform
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Nothing,
    Create,
    CreateIfMissing,
    Delete,
    Install,
    Remove,
    Add,
    Run,
    Start,
    Stop,
    Restart,
    Reload,
    Enable,
    Disable,
}

/// When the engine hands an action to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// Never applied (`nothing`)
    Never,
    /// Applied when current state differs from the desired state
    WhenDiffers,
    /// Applied only when the target does not exist yet
    WhenAbsent,
    /// Applied on every evaluation (commands, restarts)
    Always,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::Create => "create",
            Self::CreateIfMissing => "create_if_missing",
            Self::Delete => "delete",
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Add => "add",
            Self::Run => "run",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }

    pub fn convergence(self) -> Convergence {
        match self {
            Self::Nothing => Convergence::Never,
            Self::CreateIfMissing => Convergence::WhenAbsent,
            Self::Run | Self::Restart | Self::Reload => Convergence::Always,
            Self::Create
            | Self::Delete
            | Self::Install
            | Self::Remove
            | Self::Add
            | Self::Start
            | Self::Stop
            | Self::Enable
            | Self::Disable => Convergence::WhenDiffers,
        }
    }

    /// Whether a provider error is an expected outcome of this action
    ///
    /// Creating something that already exists is the only tolerated case.
    pub fn tolerates(self, error: &anyhow::Error) -> bool {
        matches!(self, Self::Create | Self::CreateIfMissing)
            && error.chain().any(|cause| {
                cause
                    .downcast_ref::<io::Error>()
                    .is_some_and(|e| e.kind() == io::ErrorKind::AlreadyExists)
            })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s.trim_start_matches(':') {
            "nothing" => Self::Nothing,
            "create" => Self::Create,
            "create_if_missing" => Self::CreateIfMissing,
            "delete" => Self::Delete,
            "install" => Self::Install,
            "remove" => Self::Remove,
            "add" => Self::Add,
            "run" => Self::Run,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "restart" => Self::Restart,
            "reload" => Self::Reload,
            "enable" => Self::Enable,
            "disable" => Self::Disable,
            other => return Err(Error::UnknownAction(other.to_string())),
        };
        Ok(action)
    }
}

/// Current or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Resource exists with the given observable attributes
    Present { attributes: Attributes },
    /// Resource does not exist
    Absent,
    /// State cannot be observed (commands, restarts)
    Unknown,
}

impl ResourceState {
    /// Present with no attributes worth comparing
    pub fn present() -> Self {
        Self::Present {
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(attributes: Attributes) -> Self {
        Self::Present { attributes }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        match self {
            Self::Present { attributes } => attributes.get(key).map(String::as_str),
            _ => None,
        }
    }
}

/// Result of applying one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// Already converged
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Command executed with an accepted exit code
    Ran { exit_code: i32 },
    /// Apply was skipped (dry run, tolerated failure)
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Modified | Self::Removed | Self::Ran { .. }
        )
    }
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChange => f.write_str("up to date"),
            Self::Created => f.write_str("created"),
            Self::Modified => f.write_str("modified"),
            Self::Removed => f.write_str("removed"),
            Self::Ran { exit_code } => write!(f, "ran (exit {exit_code})"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// How a resource's evaluation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Every action found the resource converged
    UpToDate,
    /// At least one action changed the system
    Updated,
    /// Dry run: at least one action would change the system
    WouldUpdate,
    /// A guard rejected the resource; no provider was called
    GuardSkipped,
    /// A provider error was absorbed (tolerated by the action or `ignore_failure`)
    Tolerated,
}

/// One action evaluated against a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStep {
    pub action: Action,
    pub result: ApplyResult,
    pub diff: ResourceDiff,
}

/// Outcome of evaluating one resource in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub resource_id: ResourceId,
    pub changed: bool,
    pub status: RecordStatus,
    /// Actions that reached the provider's apply step (or would have, in a dry run)
    pub steps: Vec<ActionStep>,
    /// Tolerated error text, or the guard that skipped the resource
    pub error: Option<String>,
}

impl ChangeRecord {
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            changed: false,
            status: RecordStatus::UpToDate,
            steps: Vec::new(),
            error: None,
        }
    }

    pub fn guard_skipped(resource_id: ResourceId, guard: String) -> Self {
        Self {
            status: RecordStatus::GuardSkipped,
            error: Some(guard),
            ..Self::new(resource_id)
        }
    }

    /// Record an applied (or planned) action
    pub fn push_step(&mut self, step: ActionStep, dry_run: bool) {
        if dry_run {
            self.changed = true;
            if self.status == RecordStatus::UpToDate {
                self.status = RecordStatus::WouldUpdate;
            }
        } else if step.result.is_change() {
            self.changed = true;
            if matches!(self.status, RecordStatus::UpToDate | RecordStatus::Tolerated) {
                self.status = RecordStatus::Updated;
            }
        }
        self.steps.push(step);
    }

    /// Record an absorbed provider error
    pub fn tolerate(&mut self, action: Action, error: &anyhow::Error) {
        self.error = Some(format!("{action}: {error:#}"));
        if self.status == RecordStatus::UpToDate {
            self.status = RecordStatus::Tolerated;
        }
    }
}

/// Summary counters for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub updated: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub tolerated: usize,
    pub notifications: usize,
}

impl RunSummary {
    /// Total number of resources evaluated
    pub fn total(&self) -> usize {
        self.updated + self.up_to_date + self.skipped + self.tolerated
    }

    /// Add a record to the summary
    pub fn add_record(&mut self, record: &ChangeRecord) {
        match record.status {
            RecordStatus::Updated | RecordStatus::WouldUpdate => self.updated += 1,
            RecordStatus::UpToDate => self.up_to_date += 1,
            RecordStatus::GuardSkipped => self.skipped += 1,
            RecordStatus::Tolerated => self.tolerated += 1,
        }
    }
}

/// Output from an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Convenience constructor for tests and doubles
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        assert_eq!("cookbook_file".parse::<ResourceKind>().unwrap(), ResourceKind::File);
        assert_eq!("rpm_package".parse::<ResourceKind>().unwrap(), ResourceKind::Package);
        assert_eq!("bash".parse::<ResourceKind>().unwrap(), ResourceKind::Execute);
        assert!("user".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_action_parse_accepts_symbol_prefix() {
        assert_eq!(":restart".parse::<Action>().unwrap(), Action::Restart);
        assert_eq!(
            "create_if_missing".parse::<Action>().unwrap(),
            Action::CreateIfMissing
        );
        assert!("explode".parse::<Action>().is_err());
    }

    #[test]
    fn test_action_convergence() {
        assert_eq!(Action::Run.convergence(), Convergence::Always);
        assert_eq!(Action::Restart.convergence(), Convergence::Always);
        assert_eq!(Action::CreateIfMissing.convergence(), Convergence::WhenAbsent);
        assert_eq!(Action::Install.convergence(), Convergence::WhenDiffers);
        assert_eq!(Action::Nothing.convergence(), Convergence::Never);
    }

    #[test]
    fn test_create_tolerates_already_exists() {
        let err = anyhow::Error::new(io::Error::from(io::ErrorKind::AlreadyExists))
            .context("creating /etc/rabbitmq");
        assert!(Action::CreateIfMissing.tolerates(&err));
        assert!(Action::Create.tolerates(&err));
        assert!(!Action::Run.tolerates(&err));

        let denied = anyhow::Error::new(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!Action::CreateIfMissing.tolerates(&denied));
    }

    #[test]
    fn test_command_output_success() {
        assert!(CommandOutput::with_code(0).success());
        assert!(!CommandOutput::with_code(2).success());
        assert!(!CommandOutput::default().success());
    }
}
